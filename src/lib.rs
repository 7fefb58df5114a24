//! A standalone C preprocessor: scan → assemble lines/groups → expand
//! macros → evaluate constant expressions, with a structured diagnostics
//! stream running alongside every stage instead of `panic!`/`eprintln!`.
//!
//! `token` and `scanner` are the lexer; `input` generalizes the source into
//! a stack of frames so expansions can be rescanned; `macros`/`expander`/
//! `expr` implement substitution and constant-expression evaluation; and
//! `directive` is the top-level driver tying the group/conditional state
//! machine to all of the above.

pub mod diagnostics;
pub mod directive;
pub mod expander;
pub mod expr;
pub mod input;
pub mod macros;
pub mod pragma;
pub mod resolver;
pub mod scanner;
pub mod token;

pub use diagnostics::{DiagKind, DiagLevel, Diagnostic, Diagnostics, PreprocessorError, TextRenderer};
pub use directive::{Options, Preprocessor};
pub use resolver::{FsResolver, IncludeResolver};
