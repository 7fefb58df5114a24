//! Structured diagnostics: a wire format decoupled from message rendering.
//!
//! The core never formats a localized message — it records a `DiagKind`
//! with whatever arguments the catalog entry needs and leaves rendering
//! to [`TextRenderer`], the one place this crate allows itself to hardcode
//! English text.

use std::fmt;
use std::path::PathBuf;

/// Severity, ordered so comparisons can filter "at least this bad".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DiagLevel {
    Debug,
    Info,
    Warning,
    Error,
    Fatal,
}

/// The closed set of diagnostic kinds. Each variant's fields are exactly
/// the structured "arguments" the wire format promises; no variant embeds
/// a formatted string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiagKind {
    // Lexical
    InvalidUcn { text: String },
    UnterminatedLiteral,
    UnterminatedComment,
    InvalidHeaderName,

    // Directive
    UnknownDirective { name: String },
    MisplacedElif,
    MisplacedElse,
    MisplacedEndif,
    UnterminatedIf,
    RedundantTokens,
    InvalidLineDirective,
    InvalidMacroName { name: String },
    PredefinedMacroRedefined { name: String },
    IncompatibleMacroRedefinition { name: String },
    UndefOfUndefinedName { name: String },
    UnrecognizedPragma { text: String },
    UserError { message: String },

    // Macro
    BadParameterList,
    DuplicateParameter { name: String },
    BadEllipsisPosition,
    BadStringizeOperand,
    BadConcatPosition,
    GeneratedInvalidPpToken { lexeme: String },
    UnmatchedArgCount { expected: usize, got: usize },
    VariadicNeedsOneArg,
    FunctionMacroNotInvoked { name: String },
    UnterminatedArgumentList,
    PragmaOperandNotString,

    // Expression
    NotAnInteger { text: String },
    UnknownOperator { text: String },
    DivideByZero,
    MalformedExpression,

    // IO
    NoInput,
    NoSuchFile { header: String },
    FileOutputError { path: String },
    InclusionDepthExceeded { limit: usize },

    // Reserved-identifier warnings
    ReservedStdcMacro { name: String },
    ReservedDoubleUnderscore { name: String },
    ReservedUnderscoreUppercase { name: String },
}

/// One diagnostic event: (level, file, line, column, kind).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub level: DiagLevel,
    pub file: PathBuf,
    pub line: u32,
    pub column: u32,
    pub kind: DiagKind,
}

/// Collects diagnostics for a run and tracks the process-wide error count.
#[derive(Debug, Default)]
pub struct Diagnostics {
    pub entries: Vec<Diagnostic>,
    pub error_count: usize,
}

impl Diagnostics {
    pub fn new() -> Self {
        Diagnostics::default()
    }

    pub fn push(&mut self, level: DiagLevel, file: PathBuf, line: u32, column: u32, kind: DiagKind) {
        if matches!(level, DiagLevel::Error | DiagLevel::Fatal) {
            self.error_count += 1;
        }
        tracing::debug!(target: "diagnostics", ?level, ?kind, "diagnostic recorded");
        self.entries.push(Diagnostic {
            level,
            file,
            line,
            column,
            kind,
        });
    }

    pub fn has_errors(&self) -> bool {
        self.error_count > 0
    }
}

/// Renders the structured stream to text. This is the only place this
/// crate produces human-facing English; an embedder substitutes their own
/// catalog by not using this type.
pub struct TextRenderer;

impl TextRenderer {
    pub fn render(diag: &Diagnostic) -> String {
        format!(
            "{}:{}:{}: {}: {}",
            diag.file.display(),
            diag.line,
            diag.column,
            level_label(diag.level),
            describe(&diag.kind)
        )
    }

    pub fn render_all(diags: &Diagnostics) -> String {
        let mut out = String::new();
        for d in &diags.entries {
            out.push_str(&Self::render(d));
            out.push('\n');
        }
        out
    }
}

fn level_label(level: DiagLevel) -> &'static str {
    match level {
        DiagLevel::Debug => "debug",
        DiagLevel::Info => "note",
        DiagLevel::Warning => "warning",
        DiagLevel::Error => "error",
        DiagLevel::Fatal => "fatal error",
    }
}

fn describe(kind: &DiagKind) -> String {
    match kind {
        DiagKind::InvalidUcn { text } => format!("invalid universal character name '{text}'"),
        DiagKind::UnterminatedLiteral => "unterminated character or string literal".to_string(),
        DiagKind::UnterminatedComment => "unterminated block comment".to_string(),
        DiagKind::InvalidHeaderName => "invalid header name".to_string(),
        DiagKind::UnknownDirective { name } => format!("unknown directive '#{name}'"),
        DiagKind::MisplacedElif => "#elif without matching #if".to_string(),
        DiagKind::MisplacedElse => "#else without matching #if".to_string(),
        DiagKind::MisplacedEndif => "#endif without matching #if".to_string(),
        DiagKind::UnterminatedIf => "unterminated #if".to_string(),
        DiagKind::RedundantTokens => "extra tokens at end of directive".to_string(),
        DiagKind::InvalidLineDirective => "invalid #line directive".to_string(),
        DiagKind::InvalidMacroName { name } => format!("'{name}' is not a valid macro name"),
        DiagKind::PredefinedMacroRedefined { name } => {
            format!("'{name}' is a predefined macro and cannot be redefined or undefined")
        }
        DiagKind::IncompatibleMacroRedefinition { name } => {
            format!("'{name}' redefined incompatibly with its previous definition")
        }
        DiagKind::UndefOfUndefinedName { name } => {
            format!("'{name}' is not defined; #undef has no effect")
        }
        DiagKind::UnrecognizedPragma { text } => format!("ignoring unrecognized pragma '{text}'"),
        DiagKind::UserError { message } => message.clone(),
        DiagKind::BadParameterList => "malformed macro parameter list".to_string(),
        DiagKind::DuplicateParameter { name } => format!("duplicate macro parameter '{name}'"),
        DiagKind::BadEllipsisPosition => "'...' must be the last macro parameter".to_string(),
        DiagKind::BadStringizeOperand => "'#' is not followed by a macro parameter".to_string(),
        DiagKind::BadConcatPosition => "'##' cannot appear at the start or end of a replacement list".to_string(),
        DiagKind::GeneratedInvalidPpToken { lexeme } => {
            format!("pasting produced an invalid preprocessing token '{lexeme}'")
        }
        DiagKind::UnmatchedArgCount { expected, got } => {
            format!("macro expects {expected} argument(s), got {got}")
        }
        DiagKind::VariadicNeedsOneArg => "variadic macro called with no trailing arguments".to_string(),
        DiagKind::FunctionMacroNotInvoked { name } => {
            format!("function-like macro '{name}' used without an argument list")
        }
        DiagKind::UnterminatedArgumentList => "unterminated macro argument list".to_string(),
        DiagKind::PragmaOperandNotString => {
            "_Pragma requires a single string literal operand".to_string()
        }
        DiagKind::NotAnInteger { text } => format!("'{text}' is not an integer constant"),
        DiagKind::UnknownOperator { text } => format!("unknown operator '{text}' in constant expression"),
        DiagKind::DivideByZero => "division by zero in constant expression".to_string(),
        DiagKind::MalformedExpression => "malformed constant expression".to_string(),
        DiagKind::NoInput => "no input file".to_string(),
        DiagKind::NoSuchFile { header } => format!("cannot find include file '{header}'"),
        DiagKind::FileOutputError { path } => format!("cannot write output file '{path}'"),
        DiagKind::InclusionDepthExceeded { limit } => format!("#include nested more than {limit} levels deep"),
        DiagKind::ReservedStdcMacro { name } => format!("'{name}' is reserved for the standard library"),
        DiagKind::ReservedDoubleUnderscore { name } => format!("'{name}' is a reserved identifier"),
        DiagKind::ReservedUnderscoreUppercase { name } => format!("'{name}' is a reserved identifier"),
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", TextRenderer::render(self))
    }
}

/// Fatal, unwinding errors — "truly unrecoverable conditions".
/// Everything else flows through [`Diagnostics`] instead of `Result`.
#[derive(Debug, thiserror::Error)]
pub enum PreprocessorError {
    #[error("no input file specified")]
    NoInput,
    #[error("cannot open input file '{0}'")]
    CannotOpenInput(PathBuf),
    #[error("cannot open output file '{0}'")]
    CannotOpenOutput(PathBuf),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_count_tracks_error_and_fatal_only() {
        let mut d = Diagnostics::new();
        d.push(DiagLevel::Warning, PathBuf::from("a.c"), 1, 1, DiagKind::RedundantTokens);
        d.push(DiagLevel::Error, PathBuf::from("a.c"), 2, 1, DiagKind::MisplacedElif);
        assert_eq!(d.error_count, 1);
        assert!(d.has_errors());
    }

    #[test]
    fn render_includes_position_and_level() {
        let d = Diagnostic {
            level: DiagLevel::Error,
            file: PathBuf::from("a.c"),
            line: 3,
            column: 5,
            kind: DiagKind::DivideByZero,
        };
        let text = TextRenderer::render(&d);
        assert!(text.starts_with("a.c:3:5: error:"));
    }
}
