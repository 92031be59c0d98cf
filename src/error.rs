//! Diagnostics shared by every pipeline stage.
//!
//! Mirrors the teacher's `CompileError`/`ErrorLevel`/`SourceLocation` shape
//! (`error.rs`), migrated onto `thiserror` and specialized to the five error
//! kinds spec.md §7 enumerates: lexical, syntactic, semantic, codegen
//! invariant, and I/O.

use std::fmt;
use std::path::PathBuf;

/// Half-open span of a token or AST node within one source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct SourceRange {
    pub start_line: u32,
    pub start_col: u32,
    pub end_line: u32,
    pub end_col: u32,
}

impl SourceRange {
    pub fn new(start_line: u32, start_col: u32, end_line: u32, end_col: u32) -> Self {
        Self {
            start_line,
            start_col,
            end_line,
            end_col,
        }
    }

    pub fn point(line: u32, col: u32) -> Self {
        Self::new(line, col, line, col)
    }

    /// Smallest range enclosing both `self` and `other`.
    pub fn join(self, other: SourceRange) -> SourceRange {
        let (start_line, start_col) = if (self.start_line, self.start_col)
            <= (other.start_line, other.start_col)
        {
            (self.start_line, self.start_col)
        } else {
            (other.start_line, other.start_col)
        };
        let (end_line, end_col) = if (self.end_line, self.end_col) >= (other.end_line, other.end_col)
        {
            (self.end_line, self.end_col)
        } else {
            (other.end_line, other.end_col)
        };
        SourceRange::new(start_line, start_col, end_line, end_col)
    }
}

/// Severity of a diagnostic. Only `Error` blocks a compile from declaring its
/// scripts; `Warning` is informational.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorLevel {
    Error,
    Warning,
}

/// Which pipeline stage raised the diagnostic, per spec.md §7.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    Lexical,
    Syntactic,
    Semantic,
    CodegenInvariant,
    Io,
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DiagnosticKind::Lexical => "lexical",
            DiagnosticKind::Syntactic => "syntax",
            DiagnosticKind::Semantic => "semantic",
            DiagnosticKind::CodegenInvariant => "codegen",
            DiagnosticKind::Io => "io",
        };
        f.write_str(s)
    }
}

/// A single accumulated compiler diagnostic, attached to a range within one
/// file. This is the "CachedError" of spec.md §3 plus the kind/level the
/// teacher's richer `CompileError` carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub level: ErrorLevel,
    pub message: String,
    pub range: SourceRange,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, message: impl Into<String>, range: SourceRange) -> Self {
        Self {
            kind,
            level: ErrorLevel::Error,
            message: message.into(),
            range,
        }
    }

    pub fn lexical(message: impl Into<String>, range: SourceRange) -> Self {
        Self::new(DiagnosticKind::Lexical, message, range)
    }

    pub fn syntactic(message: impl Into<String>, range: SourceRange) -> Self {
        Self::new(DiagnosticKind::Syntactic, message, range)
    }

    pub fn semantic(message: impl Into<String>, range: SourceRange) -> Self {
        Self::new(DiagnosticKind::Semantic, message, range)
    }

    pub fn warning(mut self) -> Self {
        self.level = ErrorLevel::Warning;
        self
    }

    /// Render in the teacher's `error: msg\n --> file:line:col` style.
    pub fn display(&self, file: &str) -> String {
        let level_str = match self.level {
            ErrorLevel::Error => "error",
            ErrorLevel::Warning => "warning",
        };
        format!(
            "{}[{}]: {}\n  --> {}:{}:{}",
            level_str, self.kind, self.message, file, self.range.start_line, self.range.start_col
        )
    }
}

/// Fatal errors raised outside the accumulate-and-continue diagnostic list:
/// I/O during cache operations and codegen invariant violations, per
/// spec.md §7 ("Codegen invariant violations abort that file's codegen and
/// surface as an internal error").
#[derive(Debug, thiserror::Error)]
pub enum CompilerError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("codegen invariant violated: {0}")]
    CodegenInvariant(String),

    #[error("malformed cache file: {0}")]
    CorruptCache(String),
}

pub type Result<T> = std::result::Result<T, CompilerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_join_expands_to_cover_both() {
        let a = SourceRange::new(1, 1, 1, 5);
        let b = SourceRange::new(2, 1, 2, 3);
        let joined = a.join(b);
        assert_eq!(joined, SourceRange::new(1, 1, 2, 3));
    }

    #[test]
    fn diagnostic_display_contains_location() {
        let d = Diagnostic::semantic("undeclared symbol `foo`", SourceRange::point(3, 10));
        let rendered = d.display("a.rs2");
        assert!(rendered.contains("a.rs2:3:10"));
        assert!(rendered.contains("semantic"));
    }
}
