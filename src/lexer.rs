//! Lexical table and lexer (spec.md §4.1).
//!
//! Grounded on the teacher's Windjammer lexer's hand-written `Vec<char>` state
//! machine (`advance`/`peek`/`skip_whitespace`/`read_number`/`read_string`/
//! `read_identifier`), generalized per spec.md §4.1 into a registrable
//! keyword/separator table instead of a hardcoded `match`, and extended with
//! line/column tracking the teacher's lexer omits — spec.md §3 requires every
//! token to carry an exact source range.

use crate::error::{Diagnostic, SourceRange};
use std::collections::HashMap;

/// Reserved words. `Keyword::True`/`Keyword::False` double as boolean
/// literals, matching spec.md §4.1 ("a default table preloads `true`/`false`").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Keyword {
    If,
    Else,
    While,
    Switch,
    Case,
    Default,
    Return,
    True,
    False,
}

/// Single-character separators. `Lt`/`Gt` are intentionally not separators —
/// they are operators the parser reinterprets contextually (relational op in
/// infix position, string-concat delimiter in primary-expression position).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Separator {
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Semicolon,
    Colon,
}

/// Which parallel variable stack a sigil-prefixed identifier addresses,
/// matching spec.md §3's `Variable` domain enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VariableSigil {
    Local,        // $name
    Player,       // %name
    PlayerBit,    // &name
    ClientInt,    // @name
    ClientString, // #name
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    Assign,
    Tilde, // gosub sigil: ~proc_name(args)
    Caret, // constant sigil: ^const_name
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Keyword(Keyword),
    Separator(Separator),
    Operator(Operator),
    Ident(String),
    Variable(VariableSigil, String),
    IntLiteral(i32),
    LongLiteral(i64),
    StringLiteral(String),
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub range: SourceRange,
}

/// Registrable keyword/separator tables, per spec.md §4.1. Registration of an
/// already-present key is a hard error — the table never silently overwrites.
#[derive(Debug, Clone, Default)]
pub struct LexicalTable {
    keywords: HashMap<String, Keyword>,
    separators: HashMap<char, Separator>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("lexical table entry already registered: {0:?}")]
pub struct DuplicateEntry(pub String);

impl LexicalTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_keyword(&mut self, text: &str, kind: Keyword) -> Result<(), DuplicateEntry> {
        let key = text.to_ascii_lowercase();
        if self.keywords.contains_key(&key) {
            return Err(DuplicateEntry(key));
        }
        self.keywords.insert(key, kind);
        Ok(())
    }

    pub fn register_separator(&mut self, ch: char, kind: Separator) -> Result<(), DuplicateEntry> {
        if self.separators.contains_key(&ch) {
            return Err(DuplicateEntry(ch.to_string()));
        }
        self.separators.insert(ch, kind);
        Ok(())
    }

    /// Case-insensitive keyword lookup, per spec.md §4.1.
    pub fn lookup_keyword(&self, text: &str) -> Option<Keyword> {
        self.keywords.get(&text.to_ascii_lowercase()).copied()
    }

    pub fn lookup_separator(&self, ch: char) -> Option<Separator> {
        self.separators.get(&ch).copied()
    }

    /// The bare default table spec.md §4.1 describes: only `true`/`false`
    /// plus the bracket/paren/brace/comma/semicolon/colon separators.
    pub fn minimal_default() -> Self {
        let mut table = Self::new();
        table.register_keyword("true", Keyword::True).unwrap();
        table.register_keyword("false", Keyword::False).unwrap();
        for (ch, kind) in [
            ('(', Separator::LParen),
            (')', Separator::RParen),
            ('[', Separator::LBracket),
            (']', Separator::RBracket),
            ('{', Separator::LBrace),
            ('}', Separator::RBrace),
            (',', Separator::Comma),
            (';', Separator::Semicolon),
            (':', Separator::Colon),
        ] {
            table.register_separator(ch, kind).unwrap();
        }
        table
    }

    /// The full RuneScript keyword set layered on top of the minimal default.
    pub fn runescript() -> Self {
        let mut table = Self::minimal_default();
        for (text, kind) in [
            ("if", Keyword::If),
            ("else", Keyword::Else),
            ("while", Keyword::While),
            ("switch", Keyword::Switch),
            ("case", Keyword::Case),
            ("default", Keyword::Default),
            ("return", Keyword::Return),
        ] {
            table.register_keyword(text, kind).unwrap();
        }
        table
    }
}

pub struct Lexer<'a> {
    table: &'a LexicalTable,
    chars: Vec<char>,
    pos: usize,
    line: u32,
    col: u32,
    pub diagnostics: Vec<Diagnostic>,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &str, table: &'a LexicalTable) -> Self {
        Self {
            table,
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            col: 1,
            diagnostics: Vec::new(),
        }
    }

    fn current(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn here(&self) -> (u32, u32) {
        (self.line, self.col)
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.current()?;
        self.pos += 1;
        if ch == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(ch)
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.current() {
                Some(c) if c.is_whitespace() => {
                    self.advance();
                }
                Some('/') if self.peek_at(1) == Some('/') => {
                    while let Some(c) = self.current() {
                        if c == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                _ => break,
            }
        }
    }

    /// Skip characters until the next registered separator, per spec.md
    /// §4.1's resynchronization rule for malformed input.
    fn resync(&mut self) {
        while let Some(c) = self.current() {
            if self.table.lookup_separator(c).is_some() {
                break;
            }
            self.advance();
        }
    }

    fn read_while<F: Fn(char) -> bool>(&mut self, pred: F) -> String {
        let mut s = String::new();
        while let Some(c) = self.current() {
            if pred(c) {
                s.push(c);
                self.advance();
            } else {
                break;
            }
        }
        s
    }

    fn read_number(&mut self, start: (u32, u32)) -> Token {
        let digits = self.read_while(|c| c.is_ascii_digit());
        let is_long = matches!(self.current(), Some('L') | Some('l'));
        if is_long {
            self.advance();
        }
        let (line, col) = start;
        let range = SourceRange::new(line, col, self.line, self.col);
        if is_long {
            match digits.parse::<i64>() {
                Ok(v) => Token {
                    kind: TokenKind::LongLiteral(v),
                    lexeme: format!("{digits}L"),
                    range,
                },
                Err(_) => {
                    self.diagnostics
                        .push(Diagnostic::lexical(format!("bad long literal `{digits}L`"), range));
                    Token {
                        kind: TokenKind::LongLiteral(0),
                        lexeme: digits,
                        range,
                    }
                }
            }
        } else {
            match digits.parse::<i32>() {
                Ok(v) => Token {
                    kind: TokenKind::IntLiteral(v),
                    lexeme: digits,
                    range,
                },
                Err(_) => {
                    self.diagnostics
                        .push(Diagnostic::lexical(format!("bad int literal `{digits}`"), range));
                    Token {
                        kind: TokenKind::IntLiteral(0),
                        lexeme: digits,
                        range,
                    }
                }
            }
        }
    }

    fn read_string(&mut self, start: (u32, u32)) -> Token {
        self.advance(); // opening quote
        let mut value = String::new();
        let mut terminated = false;
        while let Some(c) = self.current() {
            match c {
                '"' => {
                    self.advance();
                    terminated = true;
                    break;
                }
                '\\' => {
                    self.advance();
                    match self.advance() {
                        Some('n') => value.push('\n'),
                        Some('t') => value.push('\t'),
                        Some('"') => value.push('"'),
                        Some('\\') => value.push('\\'),
                        Some(other) => value.push(other),
                        None => break,
                    }
                }
                '\n' => break, // unterminated: newline ends the attempt
                _ => {
                    value.push(c);
                    self.advance();
                }
            }
        }
        let (line, col) = start;
        let range = SourceRange::new(line, col, self.line, self.col);
        if !terminated {
            self.diagnostics
                .push(Diagnostic::lexical("unterminated string literal", range));
            self.resync();
        }
        Token {
            kind: TokenKind::StringLiteral(value),
            lexeme: String::new(),
            range,
        }
    }

    fn read_sigil_variable(&mut self, sigil: VariableSigil, start: (u32, u32)) -> Token {
        self.advance(); // sigil char
        let name = self.read_while(|c| c.is_alphanumeric() || c == '_');
        let (line, col) = start;
        let range = SourceRange::new(line, col, self.line, self.col);
        if name.is_empty() {
            self.diagnostics
                .push(Diagnostic::lexical("expected identifier after sigil", range));
        }
        Token {
            kind: TokenKind::Variable(sigil, name.clone()),
            lexeme: name,
            range,
        }
    }

    pub fn next_token(&mut self) -> Token {
        self.skip_trivia();
        let start = self.here();
        let Some(c) = self.current() else {
            return Token {
                kind: TokenKind::Eof,
                lexeme: String::new(),
                range: SourceRange::point(start.0, start.1),
            };
        };

        if c.is_ascii_digit() {
            return self.read_number(start);
        }
        if c == '"' {
            return self.read_string(start);
        }
        if c == '$' {
            return self.read_sigil_variable(VariableSigil::Local, start);
        }
        if c == '%' {
            return self.read_sigil_variable(VariableSigil::Player, start);
        }
        if c == '&' {
            return self.read_sigil_variable(VariableSigil::PlayerBit, start);
        }
        if c == '@' {
            return self.read_sigil_variable(VariableSigil::ClientInt, start);
        }
        if c == '#' {
            return self.read_sigil_variable(VariableSigil::ClientString, start);
        }
        if c.is_alphabetic() || c == '_' {
            let ident = self.read_while(|c| c.is_alphanumeric() || c == '_');
            let range = SourceRange::new(start.0, start.1, self.line, self.col);
            let kind = match self.table.lookup_keyword(&ident) {
                Some(Keyword::True) => TokenKind::Keyword(Keyword::True),
                Some(Keyword::False) => TokenKind::Keyword(Keyword::False),
                Some(kw) => TokenKind::Keyword(kw),
                None => TokenKind::Ident(ident.clone()),
            };
            return Token {
                kind,
                lexeme: ident,
                range,
            };
        }
        if let Some(sep) = self.table.lookup_separator(c) {
            self.advance();
            let range = SourceRange::new(start.0, start.1, self.line, self.col);
            return Token {
                kind: TokenKind::Separator(sep),
                lexeme: c.to_string(),
                range,
            };
        }

        let op = self.read_operator(c, start);
        if let Some(tok) = op {
            return tok;
        }

        self.advance();
        let range = SourceRange::new(start.0, start.1, self.line, self.col);
        self.diagnostics
            .push(Diagnostic::lexical(format!("unexpected character `{c}`"), range));
        self.resync();
        Token {
            kind: TokenKind::Ident(String::new()),
            lexeme: c.to_string(),
            range,
        }
    }

    fn read_operator(&mut self, c: char, start: (u32, u32)) -> Option<Token> {
        let two_char = |first: char, second: char| -> bool {
            c == first && self.peek_at(1) == Some(second)
        };
        let (op, width) = match c {
            '+' => (Operator::Plus, 1),
            '-' => (Operator::Minus, 1),
            '*' => (Operator::Star, 1),
            '/' => (Operator::Slash, 1),
            '%' => (Operator::Percent, 1),
            '~' => (Operator::Tilde, 1),
            '^' => (Operator::Caret, 1),
            '=' if two_char('=', '=') => (Operator::EqEq, 2),
            '=' => (Operator::Assign, 1),
            '!' if two_char('!', '=') => (Operator::NotEq, 2),
            '<' if two_char('<', '=') => (Operator::Le, 2),
            '<' => (Operator::Lt, 1),
            '>' if two_char('>', '=') => (Operator::Ge, 2),
            '>' => (Operator::Gt, 1),
            _ => return None,
        };
        for _ in 0..width {
            self.advance();
        }
        let range = SourceRange::new(start.0, start.1, self.line, self.col);
        Some(Token {
            lexeme: match op {
                Operator::EqEq => "==".to_string(),
                Operator::NotEq => "!=".to_string(),
                Operator::Le => "<=".to_string(),
                Operator::Ge => ">=".to_string(),
                _ => c.to_string(),
            },
            kind: TokenKind::Operator(op),
            range,
        })
    }

    pub fn tokenize(mut self) -> (Vec<Token>, Vec<Diagnostic>) {
        let mut tokens = Vec::new();
        loop {
            let tok = self.next_token();
            let is_eof = tok.kind == TokenKind::Eof;
            tokens.push(tok);
            if is_eof {
                break;
            }
        }
        (tokens, self.diagnostics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(src: &str) -> Vec<TokenKind> {
        let table = LexicalTable::runescript();
        let (tokens, diags) = Lexer::new(src, &table).tokenize();
        assert!(diags.is_empty(), "unexpected diagnostics: {diags:?}");
        tokens.into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn tokenizes_script_header() {
        let kinds = lex("[proc,foo](int $x)(int)");
        assert_eq!(
            kinds,
            vec![
                TokenKind::Separator(Separator::LBracket),
                TokenKind::Ident("proc".into()),
                TokenKind::Separator(Separator::Comma),
                TokenKind::Ident("foo".into()),
                TokenKind::Separator(Separator::RBracket),
                TokenKind::Separator(Separator::LParen),
                TokenKind::Ident("int".into()),
                TokenKind::Variable(VariableSigil::Local, "x".into()),
                TokenKind::Separator(Separator::RParen),
                TokenKind::Separator(Separator::LParen),
                TokenKind::Ident("int".into()),
                TokenKind::Separator(Separator::RParen),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn keyword_lookup_is_case_insensitive() {
        let table = LexicalTable::runescript();
        assert_eq!(table.lookup_keyword("IF"), Some(Keyword::If));
        assert_eq!(table.lookup_keyword("If"), Some(Keyword::If));
    }

    #[test]
    fn duplicate_registration_fails() {
        let mut table = LexicalTable::new();
        table.register_keyword("true", Keyword::True).unwrap();
        assert!(table.register_keyword("true", Keyword::False).is_err());
    }

    #[test]
    fn unterminated_string_emits_diagnostic_and_resyncs() {
        let table = LexicalTable::runescript();
        let (tokens, diags) = Lexer::new("\"abc; 1", &table).tokenize();
        assert_eq!(diags.len(), 1);
        assert!(matches!(tokens[1].kind, TokenKind::Separator(Separator::Semicolon)));
    }

    #[test]
    fn long_literal_suffix() {
        let kinds = lex("123L");
        assert_eq!(kinds, vec![TokenKind::LongLiteral(123), TokenKind::Eof]);
    }
}
