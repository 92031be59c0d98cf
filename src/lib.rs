//! `rsc` — an incremental project compiler for RuneScript: lexing, parsing,
//! semantic analysis and stack-based bytecode generation, wired into a
//! project-wide cache that recompiles only what changed.

pub mod analyzer;
pub mod ast;
pub mod bytecode;
pub mod cache;
pub mod cli;
pub mod codegen;
pub mod compiler;
pub mod config;
pub mod depgraph;
pub mod error;
pub mod flusher;
pub mod lexer;
pub mod parser;
pub mod symbols;
pub mod types;

pub use cache::{CachedError, ProjectCache};
pub use error::{CompilerError, Diagnostic};
