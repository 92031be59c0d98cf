//! Recursive-descent parser (spec.md §4.3).
//!
//! Grounded on the teacher's `Parser` struct in `parser_impl.rs`
//! (`tokens`/`position`, `current_token`/`advance`/`expect` helpers,
//! `Result`-returning sub-parsers dispatched from a top-level loop), adapted
//! to recover at statement boundaries instead of aborting on first error,
//! per spec.md §4.3's "errors are recovery points at statement boundaries".

use crate::ast::*;
use crate::error::{Diagnostic, SourceRange};
use crate::lexer::{Keyword, Operator, Separator, Token, TokenKind, VariableSigil};
use crate::types::Primitive;

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    pub diagnostics: Vec<Diagnostic>,
}

/// Marks a sub-parse as having failed after already recording a diagnostic;
/// callers recover by resynchronizing rather than propagating a message.
struct Recover;

type PResult<T> = Result<T, Recover>;

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            diagnostics: Vec::new(),
        }
    }

    fn current(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or_else(|| self.tokens.last().unwrap())
    }

    fn at_eof(&self) -> bool {
        matches!(self.current().kind, TokenKind::Eof)
    }

    fn advance(&mut self) -> Token {
        let tok = self.current().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn error(&mut self, message: impl Into<String>) -> Recover {
        let range = self.current().range;
        self.diagnostics.push(Diagnostic::syntactic(message, range));
        Recover
    }

    fn expect_separator(&mut self, sep: Separator) -> PResult<Token> {
        if self.current().kind == TokenKind::Separator(sep) {
            Ok(self.advance())
        } else {
            Err(self.error(format!(
                "expected `{}`, found `{}`",
                separator_text(sep),
                self.current().lexeme
            )))
        }
    }

    fn eat_separator(&mut self, sep: Separator) -> bool {
        if self.current().kind == TokenKind::Separator(sep) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, kw: Keyword) -> bool {
        if self.current().kind == TokenKind::Keyword(kw) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_ident(&mut self) -> PResult<String> {
        if let TokenKind::Ident(name) = self.current().kind.clone() {
            self.advance();
            Ok(name)
        } else {
            Err(self.error(format!("expected identifier, found `{}`", self.current().lexeme)))
        }
    }

    fn expect_primitive(&mut self) -> PResult<Primitive> {
        let name = self.expect_ident()?;
        Primitive::from_name(&name).ok_or_else(|| {
            let range = self.current().range;
            self.diagnostics
                .push(Diagnostic::syntactic(format!("unknown type `{name}`"), range));
            Recover
        })
    }

    /// Skip tokens until a statement boundary: `;`, `}`, the start of the
    /// next script (`[`), or end of input. Matches spec.md §4.3's recovery
    /// rule and the lexer's own separator-based resync in spirit.
    fn resync_to_statement_boundary(&mut self) {
        loop {
            match self.current().kind {
                TokenKind::Eof => return,
                TokenKind::Separator(Separator::Semicolon) => {
                    self.advance();
                    return;
                }
                TokenKind::Separator(Separator::RBrace) | TokenKind::Separator(Separator::LBracket) => {
                    return;
                }
                _ => {
                    self.advance();
                }
            }
        }
    }

    pub fn parse_program(&mut self) -> Program {
        let mut scripts = Vec::new();
        while !self.at_eof() {
            match self.parse_script() {
                Ok(script) => scripts.push(script),
                Err(Recover) => self.resync_to_statement_boundary(),
            }
        }
        Program { scripts }
    }

    fn parse_script(&mut self) -> PResult<ScriptDecl> {
        let start = self.current().range;
        self.expect_separator(Separator::LBracket)?;
        let trigger = self.expect_ident()?;
        self.expect_separator(Separator::Comma)?;
        let name = self.expect_ident()?;
        self.expect_separator(Separator::RBracket)?;

        self.expect_separator(Separator::LParen)?;
        let mut params = Vec::new();
        if self.current().kind != TokenKind::Separator(Separator::RParen) {
            loop {
                params.push(self.parse_param()?);
                if !self.eat_separator(Separator::Comma) {
                    break;
                }
            }
        }
        self.expect_separator(Separator::RParen)?;

        self.expect_separator(Separator::LParen)?;
        let mut return_types = Vec::new();
        if self.current().kind != TokenKind::Separator(Separator::RParen) {
            loop {
                return_types.push(self.expect_primitive()?);
                if !self.eat_separator(Separator::Comma) {
                    break;
                }
            }
        }
        self.expect_separator(Separator::RParen)?;

        let body = self.parse_block()?;
        let end = self.tokens[self.pos.saturating_sub(1)].range;
        Ok(ScriptDecl {
            trigger,
            name,
            params,
            return_types,
            body,
            range: start.join(end),
        })
    }

    fn parse_param(&mut self) -> PResult<Param> {
        let start = self.current().range;
        let ty = self.expect_primitive()?;
        let (sigil, name) = self.expect_variable()?;
        Ok(Param {
            sigil,
            ty,
            name,
            range: start.join(self.tokens[self.pos.saturating_sub(1)].range),
        })
    }

    fn expect_variable(&mut self) -> PResult<(VariableSigil, String)> {
        if let TokenKind::Variable(sigil, name) = self.current().kind.clone() {
            self.advance();
            Ok((sigil, name))
        } else {
            Err(self.error(format!("expected a variable, found `{}`", self.current().lexeme)))
        }
    }

    fn parse_block(&mut self) -> PResult<Vec<Statement>> {
        self.expect_separator(Separator::LBrace)?;
        let mut stmts = Vec::new();
        while self.current().kind != TokenKind::Separator(Separator::RBrace) && !self.at_eof() {
            match self.parse_statement() {
                Ok(stmt) => stmts.push(stmt),
                Err(Recover) => self.resync_to_statement_boundary(),
            }
        }
        self.expect_separator(Separator::RBrace)?;
        Ok(stmts)
    }

    fn parse_statement(&mut self) -> PResult<Statement> {
        let start = self.current().range;
        match self.current().kind.clone() {
            TokenKind::Separator(Separator::LBrace) => {
                let stmts = self.parse_block()?;
                let end = self.tokens[self.pos.saturating_sub(1)].range;
                Ok(Statement::Block(stmts, start.join(end)))
            }
            TokenKind::Keyword(Keyword::If) => self.parse_if(start),
            TokenKind::Keyword(Keyword::While) => self.parse_while(start),
            TokenKind::Keyword(Keyword::Switch) => self.parse_switch(start),
            TokenKind::Keyword(Keyword::Return) => self.parse_return(start),
            TokenKind::Ident(name) if Primitive::from_name(&name).is_some() => {
                self.parse_variable_decl(start)
            }
            _ => {
                let expr = self.parse_expression()?;
                let end = self.current().range;
                self.expect_separator(Separator::Semicolon)?;
                Ok(Statement::ExpressionStatement(expr, start.join(end)))
            }
        }
    }

    fn parse_variable_decl(&mut self, start: SourceRange) -> PResult<Statement> {
        let ty = self.expect_primitive()?;
        let (sigil, name) = self.expect_variable()?;
        if self.eat_separator(Separator::Colon) {
            return Err(self.error("unexpected `:` in variable declaration"));
        }
        if self.current().kind == TokenKind::Operator(Operator::Assign) {
            self.advance();
            let value = self.parse_expression()?;
            let end = self.current().range;
            self.expect_separator(Separator::Semicolon)?;
            Ok(Statement::VariableInit {
                sigil,
                ty,
                name,
                value,
                range: start.join(end),
            })
        } else {
            let end = self.current().range;
            self.expect_separator(Separator::Semicolon)?;
            Ok(Statement::VariableDecl {
                sigil,
                ty,
                name,
                range: start.join(end),
            })
        }
    }

    fn parse_if(&mut self, start: SourceRange) -> PResult<Statement> {
        self.advance(); // `if`
        self.expect_separator(Separator::LParen)?;
        let condition = self.parse_expression()?;
        self.expect_separator(Separator::RParen)?;
        let then_branch = self.parse_block()?;
        let else_branch = if self.eat_keyword(Keyword::Else) {
            Some(self.parse_block()?)
        } else {
            None
        };
        let end = self.tokens[self.pos.saturating_sub(1)].range;
        Ok(Statement::If {
            condition,
            then_branch,
            else_branch,
            range: start.join(end),
        })
    }

    fn parse_while(&mut self, start: SourceRange) -> PResult<Statement> {
        self.advance(); // `while`
        self.expect_separator(Separator::LParen)?;
        let condition = self.parse_expression()?;
        self.expect_separator(Separator::RParen)?;
        let body = self.parse_block()?;
        let end = self.tokens[self.pos.saturating_sub(1)].range;
        Ok(Statement::While {
            condition,
            body,
            range: start.join(end),
        })
    }

    fn parse_switch(&mut self, start: SourceRange) -> PResult<Statement> {
        self.advance(); // `switch`
        self.expect_separator(Separator::LParen)?;
        let scrutinee = self.parse_expression()?;
        self.expect_separator(Separator::RParen)?;
        self.expect_separator(Separator::LBrace)?;

        let mut cases = Vec::new();
        let mut default_case = None;
        while self.current().kind != TokenKind::Separator(Separator::RBrace) && !self.at_eof() {
            let case_start = self.current().range;
            if self.eat_keyword(Keyword::Default) {
                self.expect_separator(Separator::Colon)?;
                default_case = Some(self.parse_case_body()?);
            } else if self.eat_keyword(Keyword::Case) {
                let mut values = vec![self.parse_expression()?];
                while self.eat_separator(Separator::Comma) {
                    values.push(self.parse_expression()?);
                }
                self.expect_separator(Separator::Colon)?;
                let body = self.parse_case_body()?;
                let end = self.tokens[self.pos.saturating_sub(1)].range;
                cases.push(SwitchCase {
                    values,
                    body,
                    range: case_start.join(end),
                });
            } else {
                return Err(self.error("expected `case` or `default` in switch body"));
            }
        }
        self.expect_separator(Separator::RBrace)?;
        let end = self.tokens[self.pos.saturating_sub(1)].range;
        Ok(Statement::Switch {
            scrutinee,
            cases,
            default_case,
            range: start.join(end),
        })
    }

    fn parse_case_body(&mut self) -> PResult<Vec<Statement>> {
        let mut stmts = Vec::new();
        loop {
            match self.current().kind {
                TokenKind::Keyword(Keyword::Case)
                | TokenKind::Keyword(Keyword::Default)
                | TokenKind::Separator(Separator::RBrace) => break,
                TokenKind::Eof => break,
                _ => match self.parse_statement() {
                    Ok(stmt) => stmts.push(stmt),
                    Err(Recover) => {
                        self.resync_to_statement_boundary();
                    }
                },
            }
        }
        Ok(stmts)
    }

    fn parse_return(&mut self, start: SourceRange) -> PResult<Statement> {
        self.advance(); // `return`
        let mut values = Vec::new();
        if self.eat_separator(Separator::LParen) {
            if self.current().kind != TokenKind::Separator(Separator::RParen) {
                loop {
                    values.push(self.parse_expression()?);
                    if !self.eat_separator(Separator::Comma) {
                        break;
                    }
                }
            }
            self.expect_separator(Separator::RParen)?;
        }
        let end = self.current().range;
        self.expect_separator(Separator::Semicolon)?;
        Ok(Statement::Return(values, start.join(end)))
    }

    // ------------------------------------------------------------------
    // Expressions — precedence-climbing recursive descent.
    // ------------------------------------------------------------------

    fn parse_expression(&mut self) -> PResult<Expression> {
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> PResult<Expression> {
        let mut lhs = self.parse_additive()?;
        while let Some(op) = comparison_op(&self.current().kind) {
            let start = lhs.range();
            self.advance();
            let rhs = self.parse_additive()?;
            let range = start.join(rhs.range());
            lhs = Expression::BinaryOp {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                range,
            };
        }
        Ok(lhs)
    }

    fn parse_additive(&mut self) -> PResult<Expression> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.current().kind {
                TokenKind::Operator(Operator::Plus) => BinaryOp::Add,
                TokenKind::Operator(Operator::Minus) => BinaryOp::Sub,
                _ => break,
            };
            let start = lhs.range();
            self.advance();
            let rhs = self.parse_multiplicative()?;
            let range = start.join(rhs.range());
            lhs = Expression::BinaryOp {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                range,
            };
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> PResult<Expression> {
        let mut lhs = self.parse_primary()?;
        loop {
            let op = match self.current().kind {
                TokenKind::Operator(Operator::Star) => BinaryOp::Mul,
                TokenKind::Operator(Operator::Slash) => BinaryOp::Div,
                TokenKind::Operator(Operator::Percent) => BinaryOp::Mod,
                _ => break,
            };
            let start = lhs.range();
            self.advance();
            let rhs = self.parse_primary()?;
            let range = start.join(rhs.range());
            lhs = Expression::BinaryOp {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                range,
            };
        }
        Ok(lhs)
    }

    fn parse_primary(&mut self) -> PResult<Expression> {
        let start = self.current().range;
        match self.current().kind.clone() {
            TokenKind::IntLiteral(v) => {
                self.advance();
                Ok(Expression::LiteralInt(v, start))
            }
            TokenKind::LongLiteral(v) => {
                self.advance();
                Ok(Expression::LiteralLong(v, start))
            }
            TokenKind::StringLiteral(s) => {
                self.advance();
                Ok(Expression::LiteralString(s, start))
            }
            TokenKind::Keyword(Keyword::True) => {
                self.advance();
                Ok(Expression::LiteralBool(true, start))
            }
            TokenKind::Keyword(Keyword::False) => {
                self.advance();
                Ok(Expression::LiteralBool(false, start))
            }
            TokenKind::Variable(sigil, name) => {
                self.advance();
                Ok(Expression::VariableRef(sigil, name, start))
            }
            TokenKind::Operator(Operator::Caret) => {
                self.advance();
                let name = self.expect_ident()?;
                let end = self.tokens[self.pos.saturating_sub(1)].range;
                Ok(Expression::ConstantRef(name, start.join(end)))
            }
            TokenKind::Operator(Operator::Tilde) => {
                self.advance();
                let name = self.expect_ident()?;
                let args = self.parse_arg_list()?;
                let end = self.tokens[self.pos.saturating_sub(1)].range;
                Ok(Expression::Gosub {
                    name,
                    args,
                    range: start.join(end),
                })
            }
            TokenKind::Operator(Operator::Lt) => self.parse_string_concat(start),
            TokenKind::Separator(Separator::LParen) => {
                self.advance();
                let inner = self.parse_expression()?;
                self.expect_separator(Separator::RParen)?;
                Ok(inner)
            }
            TokenKind::Ident(name) => {
                self.advance();
                if self.current().kind == TokenKind::Separator(Separator::LParen) {
                    let args = self.parse_arg_list()?;
                    let end = self.tokens[self.pos.saturating_sub(1)].range;
                    Ok(Expression::CommandCall {
                        name,
                        args,
                        range: start.join(end),
                    })
                } else {
                    Ok(Expression::Dynamic(name, start))
                }
            }
            _ => Err(self.error(format!("unexpected token `{}` in expression", self.current().lexeme))),
        }
    }

    fn parse_arg_list(&mut self) -> PResult<Vec<Expression>> {
        self.expect_separator(Separator::LParen)?;
        let mut args = Vec::new();
        if self.current().kind != TokenKind::Separator(Separator::RParen) {
            loop {
                args.push(self.parse_expression()?);
                if !self.eat_separator(Separator::Comma) {
                    break;
                }
            }
        }
        self.expect_separator(Separator::RParen)?;
        Ok(args)
    }

    fn parse_string_concat(&mut self, start: SourceRange) -> PResult<Expression> {
        self.advance(); // `<`
        let mut parts = Vec::new();
        if self.current().kind != TokenKind::Operator(Operator::Gt) {
            loop {
                parts.push(self.parse_expression()?);
                if !self.eat_separator(Separator::Comma) {
                    break;
                }
            }
        }
        if self.current().kind != TokenKind::Operator(Operator::Gt) {
            return Err(self.error("expected `>` to close string concatenation"));
        }
        self.advance();
        let end = self.tokens[self.pos.saturating_sub(1)].range;
        Ok(Expression::StringConcat(parts, start.join(end)))
    }
}

fn comparison_op(kind: &TokenKind) -> Option<BinaryOp> {
    match kind {
        TokenKind::Operator(Operator::EqEq) => Some(BinaryOp::Eq),
        TokenKind::Operator(Operator::NotEq) => Some(BinaryOp::Ne),
        TokenKind::Operator(Operator::Lt) => Some(BinaryOp::Lt),
        TokenKind::Operator(Operator::Le) => Some(BinaryOp::Le),
        TokenKind::Operator(Operator::Gt) => Some(BinaryOp::Gt),
        TokenKind::Operator(Operator::Ge) => Some(BinaryOp::Ge),
        _ => None,
    }
}

fn separator_text(sep: Separator) -> &'static str {
    match sep {
        Separator::LParen => "(",
        Separator::RParen => ")",
        Separator::LBracket => "[",
        Separator::RBracket => "]",
        Separator::LBrace => "{",
        Separator::RBrace => "}",
        Separator::Comma => ",",
        Separator::Semicolon => ";",
        Separator::Colon => ":",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::{LexicalTable, Lexer};

    fn parse(src: &str) -> (Program, Vec<Diagnostic>) {
        let table = LexicalTable::runescript();
        let (tokens, lex_diags) = Lexer::new(src, &table).tokenize();
        assert!(lex_diags.is_empty(), "lexer diagnostics: {lex_diags:?}");
        let mut parser = Parser::new(tokens);
        let program = parser.parse_program();
        (program, parser.diagnostics)
    }

    #[test]
    fn parses_simple_proc() {
        let (program, diags) = parse("[proc,foo](int $x)(int) { return($x); }");
        assert!(diags.is_empty(), "unexpected diagnostics: {diags:?}");
        assert_eq!(program.scripts.len(), 1);
        let script = &program.scripts[0];
        assert_eq!(script.trigger, "proc");
        assert_eq!(script.name, "foo");
        assert_eq!(script.params.len(), 1);
        assert_eq!(script.return_types, vec![Primitive::Int]);
        assert_eq!(script.body.len(), 1);
    }

    #[test]
    fn parses_gosub_call_statement() {
        let (program, diags) = parse("[proc,bar]() { ~foo(1); }");
        assert!(diags.is_empty());
        let Statement::ExpressionStatement(Expression::Gosub { name, args, .. }, _) =
            &program.scripts[0].body[0]
        else {
            panic!("expected gosub statement");
        };
        assert_eq!(name, "foo");
        assert_eq!(args.len(), 1);
    }

    #[test]
    fn parses_if_else_with_comparison() {
        let (program, diags) =
            parse("[proc,p]() { if (1 < 2) { return; } else { return; } }");
        assert!(diags.is_empty());
        let Statement::If {
            condition,
            then_branch,
            else_branch,
            ..
        } = &program.scripts[0].body[0]
        else {
            panic!("expected if statement");
        };
        assert!(matches!(
            condition,
            Expression::BinaryOp { op: BinaryOp::Lt, .. }
        ));
        assert_eq!(then_branch.len(), 1);
        assert!(else_branch.is_some());
    }

    #[test]
    fn recovers_after_missing_semicolon() {
        let (program, diags) = parse("[proc,a]() { int $x = 1 int $y = 2; }");
        assert_eq!(diags.len(), 1);
        assert_eq!(program.scripts.len(), 1);
    }

    #[test]
    fn parses_string_concat() {
        let (program, diags) = parse(r#"[proc,a]() { string $s = <"a", $s, "b">; }"#);
        assert!(diags.is_empty(), "{diags:?}");
        let Statement::VariableInit { value, .. } = &program.scripts[0].body[0] else {
            panic!("expected variable init");
        };
        assert!(matches!(value, Expression::StringConcat(parts, _) if parts.len() == 3));
    }

    #[test]
    fn parses_switch_with_default() {
        let src = "[proc,a]() { switch ($x) { case 1, 2: { return; } default: { return; } } }";
        let (program, diags) = parse(src);
        assert!(diags.is_empty(), "{diags:?}");
        let Statement::Switch { cases, default_case, .. } = &program.scripts[0].body[0] else {
            panic!("expected switch");
        };
        assert_eq!(cases.len(), 1);
        assert_eq!(cases[0].values.len(), 2);
        assert!(default_case.is_some());
    }
}
