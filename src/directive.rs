//! Directive/group driver: the top-level loop over a source frame's lines,
//! dispatching to a directive handler when a line opens with `#` and to the
//! expander otherwise.
//!
//! The conditional-inclusion stack (`Group`) lives directly on `SourceFrame`
//! (input.rs) rather than threaded through recursive calls, so an
//! `#include`'d file's own conditional nesting can't leak into its includer.

use crate::diagnostics::{DiagKind, DiagLevel, Diagnostics, PreprocessorError};
use crate::expander::Expander;
use crate::expr;
use crate::input::{skip_ws, Group, GroupKind, InputStack, SourceFrame};
use crate::macros::{self, DefineOutcome, Macro, MacroForm, MacroTable, VARIADIC_SENTINEL};
use crate::pragma;
use crate::resolver::IncludeResolver;
use crate::scanner::{Hint, Scanner};
use crate::token::{collapse_whitespace, concat_lexemes, Token, TokenKind};
use std::path::{Path, PathBuf};

/// The maximum `#include` nesting depth.
const MAX_INCLUDE_DEPTH: usize = 15;

/// CLI-independent configuration: everything a [`Preprocessor`] needs
/// besides its input/output streams.
#[derive(Debug, Clone, Default)]
pub struct Options {
    pub include_dirs: Vec<PathBuf>,
    /// `-D name[=definition]`, applied in command-line order.
    pub defines: Vec<String>,
    /// `-U name`, applied after every `-D` regardless of ordering on the
    /// command line.
    pub undefines: Vec<String>,
    pub trigraphs: bool,
}

/// Owns the macro table, the hide-set-tracking expander, the diagnostics
/// sink, and the include resolver across one run. One `Preprocessor` is
/// built per invocation; it is not meant to be reused across unrelated
/// translation units.
pub struct Preprocessor {
    macros: MacroTable,
    expander: Expander,
    resolver: Box<dyn IncludeResolver>,
    options: Options,
    diags: Diagnostics,
}

impl Preprocessor {
    pub fn new(options: Options, resolver: Box<dyn IncludeResolver>) -> Self {
        let mut pp = Preprocessor {
            macros: MacroTable::new(),
            expander: Expander::new(),
            resolver,
            options,
            diags: Diagnostics::new(),
        };
        pp.install_predefined_macros();
        let defines = pp.options.defines.clone();
        for d in &defines {
            pp.apply_define_option(d);
        }
        let undefines = pp.options.undefines.clone();
        for name in &undefines {
            pp.macros.undef(name);
        }
        pp
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diags
    }

    pub fn into_diagnostics(self) -> Diagnostics {
        self.diags
    }

    /// Preprocesses one top-level translation unit, returning the
    /// preprocessed text. `path` need not exist on disk for `#include`
    /// resolution of nested files relative to it — only its parent
    /// directory is consulted by the quoted-form lookup.
    pub fn run(&mut self, path: PathBuf, content: &str) -> String {
        let mut input = InputStack::new();
        let mut out = String::new();
        tracing::info!(target: "source", file = %path.display(), "push_source");
        input.push_source(SourceFrame::new(path, content, self.options.trigraphs));
        self.process_source(&mut input, &mut out);
        input.pop_source();
        out
    }

    /// Reads an input file from disk and returns a fatal error rather than a
    /// diagnostic if it cannot be opened, matching the split between
    /// non-fatal `Diagnostics` and truly unrecoverable conditions.
    pub fn run_file(&mut self, path: &Path) -> Result<String, PreprocessorError> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| PreprocessorError::CannotOpenInput(path.to_path_buf()))?;
        Ok(self.run(path.to_path_buf(), &content))
    }

    fn install_predefined_macros(&mut self) {
        let now = chrono::Local::now();
        let date = now.format("%b %e %Y").to_string();
        let time = now.format("%H:%M:%S").to_string();
        self.macros
            .set_predefined_value("__DATE__", vec![str_lit(&date)]);
        self.macros
            .set_predefined_value("__TIME__", vec![str_lit(&time)]);
        self.macros
            .set_predefined_value("__STDC__", vec![pp_num("1")]);
        self.macros
            .set_predefined_value("__STDC_HOSTED__", vec![pp_num("0")]);
        self.macros
            .set_predefined_value("__STDC_VERSION__", vec![pp_num("201112L")]);
        for name in [
            "__STDC_NO_ATOMICS__",
            "__STDC_NO_COMPLEX__",
            "__STDC_NO_THREADS__",
            "__STDC_NO_VLA__",
        ] {
            self.macros.set_predefined_value(name, vec![pp_num("1")]);
        }
        self.macros.define(Macro::new(
            "_Pragma".to_string(),
            MacroForm::Function,
            vec!["x".to_string()],
            false,
            vec![],
            (PathBuf::from("<built-in>"), 0, 0),
            true,
        ));
    }

    /// Refreshes `__FILE__`/`__LINE__` to the position of the token about to
    /// be read, so a use anywhere on this line sees the right values.
    fn refresh_dynamic_macros(&mut self, display_path: &str, line: u32) {
        self.macros
            .set_predefined_value("__FILE__", vec![Token::new(TokenKind::StringLiteral, format!("\"{display_path}\""), line, 1)]);
        self.macros
            .set_predefined_value("__LINE__", vec![Token::new(TokenKind::PpNumber, line.to_string(), line, 1)]);
    }

    /// Applies a `-D name[=definition]` option by rewriting it as a
    /// `#define` line and running it through the same directive handler the
    /// body of a translation unit uses, so object-like, function-like, and
    /// bare (`-Dname` meaning `-Dname=1`) forms are all handled identically.
    fn apply_define_option(&mut self, raw: &str) {
        let directive_body = match raw.split_once('=') {
            Some((name, val)) => format!("{name} {val}"),
            None => format!("{raw} 1"),
        };
        let content = format!("#define {directive_body}\n");
        let file = PathBuf::from("<command-line>");
        let mut input = InputStack::new();
        input.push_source(SourceFrame::new(file.clone(), &content, self.options.trigraphs));
        skip_ws(&mut input, &mut self.diags);
        input.consume(&mut self.diags); // '#'
        skip_ws(&mut input, &mut self.diags);
        input.consume(&mut self.diags); // 'define'
        let mut discard = String::new();
        self.handle_define(&mut input, &file, &mut discard);
    }

    /// Drains the top source frame of `input` until it reports end-of-file,
    /// recursing into `#include`d frames as they're pushed. Does not pop
    /// the frame it's called for — the caller (either [`run`](Self::run) or
    /// this function's own `#include` handling) does that.
    fn process_source(&mut self, input: &mut InputStack, out: &mut String) {
        loop {
            let peeked_line = input.peek(1, &mut self.diags).line;
            let display_path = input.current_source().unwrap().display_path.clone();
            self.refresh_dynamic_macros(&display_path, peeked_line);

            if input.peek(1, &mut self.diags).kind == TokenKind::EndOfFile {
                break;
            }

            let leading_ws = skip_ws(input, &mut self.diags);
            let next = input.peek(1, &mut self.diags);

            if next.kind == TokenKind::Punctuator && next.lexeme == "#" {
                input.consume(&mut self.diags);
                self.handle_directive(input, out);
                continue;
            }

            let processing = input.current_source().unwrap().current_processing();
            if next.kind == TokenKind::EndOfFile {
                break;
            }
            if processing {
                for t in &leading_ws {
                    out.push_str(&t.lexeme);
                }
                let file = input.current_source().unwrap().path.clone();
                let trigraphs = self.options.trigraphs;
                let toks = self
                    .expander
                    .scan_to_eol(input, &self.macros, &file, &mut self.diags, trigraphs, true);
                for t in &toks {
                    out.push_str(&t.lexeme);
                }
            } else {
                skip_to_eol(input, &mut self.diags);
            }

            let nl = consume_eol(input, &mut self.diags);
            if nl.kind == TokenKind::NewLine {
                out.push('\n');
            }
            if nl.kind == TokenKind::EndOfFile {
                break;
            }
        }

        if input.current_source().unwrap().groups.len() > 1 {
            let line = input.current_source().unwrap().groups[1].start_line;
            let file = input.current_source().unwrap().path.clone();
            self.diags.push(DiagLevel::Error, file, line, 1, DiagKind::UnterminatedIf);
        }
    }

    fn handle_directive(&mut self, input: &mut InputStack, out: &mut String) {
        let file = input.current_source().unwrap().path.clone();
        skip_ws(input, &mut self.diags);
        let next = input.peek(1, &mut self.diags);

        if next.is_eol() {
            // Null directive: "#" alone on a line.
            let nl = consume_eol(input, &mut self.diags);
            if nl.kind == TokenKind::NewLine {
                out.push('\n');
            }
            return;
        }

        if next.kind != TokenKind::Identifier {
            self.diags.push(
                DiagLevel::Warning,
                file,
                next.line,
                next.column,
                DiagKind::UnknownDirective { name: next.lexeme.clone() },
            );
            skip_to_eol(input, &mut self.diags);
            self.finish_directive_line(input, out);
            return;
        }

        let at_line = next.line;
        // Conditional-inclusion directives must be recognized regardless of
        // whether the enclosing group is being skipped, so nesting stays in
        // sync; every other directive is a no-op while skipped.
        let structural = matches!(
            next.lexeme.as_str(),
            "if" | "ifdef" | "ifndef" | "elif" | "else" | "endif"
        );
        let processing = input.current_source().unwrap().current_processing();
        if !structural && !processing {
            // A non-conditional directive inside a skipped group has no
            // effect; its name is never looked up or diagnosed.
            input.consume(&mut self.diags);
            skip_to_eol(input, &mut self.diags);
            self.finish_directive_line(input, out);
            return;
        }

        tracing::debug!(target: "directive", name = %next.lexeme, line = at_line, "dispatch");
        match next.lexeme.as_str() {
            "include" => {
                input.consume(&mut self.diags);
                self.handle_include(input, &file, at_line, out);
            }
            "define" => {
                input.consume(&mut self.diags);
                self.handle_define(input, &file, out);
            }
            "undef" => {
                input.consume(&mut self.diags);
                self.handle_undef(input, &file, out);
            }
            "if" => {
                input.consume(&mut self.diags);
                self.handle_if(input, &file, at_line, out);
            }
            "ifdef" => {
                input.consume(&mut self.diags);
                self.handle_ifdef(input, &file, at_line, false, out);
            }
            "ifndef" => {
                input.consume(&mut self.diags);
                self.handle_ifdef(input, &file, at_line, true, out);
            }
            "elif" => {
                input.consume(&mut self.diags);
                self.handle_elif(input, &file, at_line, out);
            }
            "else" => {
                input.consume(&mut self.diags);
                self.handle_else(input, &file, at_line, out);
            }
            "endif" => {
                input.consume(&mut self.diags);
                self.handle_endif(input, &file, at_line, out);
            }
            "error" => {
                input.consume(&mut self.diags);
                self.handle_error(input, &file, at_line, out);
            }
            "line" => {
                input.consume(&mut self.diags);
                self.handle_line(input, &file, at_line, out);
            }
            "pragma" => {
                input.consume(&mut self.diags);
                self.handle_pragma(input, &file, at_line, out);
            }
            other => {
                self.diags.push(
                    DiagLevel::Warning,
                    file,
                    at_line,
                    next.column,
                    DiagKind::UnknownDirective { name: other.to_string() },
                );
                skip_to_eol(input, &mut self.diags);
                self.finish_directive_line(input, out);
            }
        }
    }

    /// Consumes the newline (or EOF) ending the current logical line,
    /// pushing it to `out` so removed directive text still leaves its line
    /// number's worth of newlines in the output.
    fn finish_directive_line(&mut self, input: &mut InputStack, out: &mut String) {
        let nl = consume_eol(input, &mut self.diags);
        if nl.kind == TokenKind::NewLine {
            out.push('\n');
        }
    }

    // ---- #include --------------------------------------------------

    fn handle_include(&mut self, input: &mut InputStack, file: &Path, at_line: u32, out: &mut String) {
        skip_ws(input, &mut self.diags);
        input.current_source_mut().unwrap().set_hint(Hint::HeaderName);
        let next = input.peek(1, &mut self.diags);

        let header = if next.kind == TokenKind::HeaderName {
            input.consume(&mut self.diags);
            input.current_source_mut().unwrap().set_hint(Hint::None);
            parse_header_lexeme(&next.lexeme)
        } else {
            input.current_source_mut().unwrap().set_hint(Hint::None);
            let trigraphs = self.options.trigraphs;
            let toks = self
                .expander
                .scan_to_eol(input, &self.macros, file, &mut self.diags, trigraphs, true);
            let joined = concat_lexemes(toks.iter().filter(|t| !t.is_ws()));
            let mut scanner = Scanner::new(&joined, self.options.trigraphs);
            scanner.set_hint(Hint::HeaderName);
            let tok = scanner.next_token(file, &mut self.diags);
            if tok.kind == TokenKind::HeaderName {
                parse_header_lexeme(&tok.lexeme)
            } else {
                None
            }
        };

        if header.is_none() {
            self.diags.push(
                DiagLevel::Error,
                file.to_path_buf(),
                at_line,
                1,
                DiagKind::InvalidHeaderName,
            );
        }

        skip_ws(input, &mut self.diags);
        if !input.peek(1, &mut self.diags).is_eol() {
            self.diags.push(DiagLevel::Warning, file.to_path_buf(), at_line, 1, DiagKind::RedundantTokens);
            skip_to_eol(input, &mut self.diags);
        }
        self.finish_directive_line(input, out);

        let Some((name, angled)) = header else { return };

        if input.source_depth() >= MAX_INCLUDE_DEPTH {
            self.diags.push(
                DiagLevel::Error,
                file.to_path_buf(),
                at_line,
                1,
                DiagKind::InclusionDepthExceeded { limit: MAX_INCLUDE_DEPTH },
            );
            return;
        }

        let current_dir = file.parent().unwrap_or_else(|| Path::new(".")).to_path_buf();
        let resolved = self.resolver.resolve(&name, angled, &current_dir, &self.options.include_dirs);
        let Some(resolved) = resolved else {
            self.diags.push(
                DiagLevel::Error,
                file.to_path_buf(),
                at_line,
                1,
                DiagKind::NoSuchFile { header: name },
            );
            return;
        };

        let content = match std::fs::read_to_string(&resolved) {
            Ok(c) => c,
            Err(_) => {
                self.diags.push(
                    DiagLevel::Error,
                    file.to_path_buf(),
                    at_line,
                    1,
                    DiagKind::NoSuchFile { header: name },
                );
                return;
            }
        };

        tracing::info!(target: "source", file = %resolved.display(), depth = input.source_depth() + 1, "push_source");
        input.push_source(SourceFrame::new(resolved, &content, self.options.trigraphs));
        self.process_source(input, out);
        input.pop_source();
        tracing::debug!(target: "source", "pop_source");
    }

    // ---- #define ----------------------------------------------------

    fn handle_define(&mut self, input: &mut InputStack, file: &Path, out: &mut String) {
        skip_ws(input, &mut self.diags);
        let name_tok = input.consume(&mut self.diags);
        if name_tok.kind != TokenKind::Identifier {
            self.diags.push(
                DiagLevel::Error,
                file.to_path_buf(),
                name_tok.line,
                name_tok.column,
                DiagKind::InvalidMacroName { name: name_tok.lexeme.clone() },
            );
            skip_to_eol(input, &mut self.diags);
            self.finish_directive_line(input, out);
            return;
        }

        let is_function = {
            let next = input.peek(1, &mut self.diags);
            next.kind == TokenKind::Punctuator && next.lexeme == "("
        };

        let (form, params, has_variadic) = if is_function {
            input.consume(&mut self.diags); // '('
            let (params, variadic) = self.read_params(input, file);
            (MacroForm::Function, params, variadic)
        } else {
            (MacroForm::Object, vec![], false)
        };

        skip_ws(input, &mut self.diags);
        let raw_body = read_to_eol_raw(input, &mut self.diags);
        self.finish_directive_line(input, out);
        let body = collapse_whitespace(raw_body);

        if let Some(first) = body.first() {
            if first.kind == TokenKind::Punctuator && first.lexeme == "##" {
                self.diags.push(DiagLevel::Error, file.to_path_buf(), name_tok.line, name_tok.column, DiagKind::BadConcatPosition);
            }
        }
        if let Some(last) = body.last() {
            if last.kind == TokenKind::Punctuator && last.lexeme == "##" {
                self.diags.push(DiagLevel::Error, file.to_path_buf(), name_tok.line, name_tok.column, DiagKind::BadConcatPosition);
            }
        }

        let name = name_tok.lexeme.clone();
        if macros::is_predefined_name(&name) {
            self.diags.push(
                DiagLevel::Warning,
                file.to_path_buf(),
                name_tok.line,
                name_tok.column,
                DiagKind::PredefinedMacroRedefined { name },
            );
            return;
        }
        if macros::is_reserved_name(&name) {
            self.diags.push(
                DiagLevel::Error,
                file.to_path_buf(),
                name_tok.line,
                name_tok.column,
                DiagKind::InvalidMacroName { name },
            );
            return;
        }
        self.check_reserved_name_warnings(&name, &name_tok, file);

        let m = Macro::new(name, form, params, has_variadic, body, (file.to_path_buf(), name_tok.line, name_tok.column), false);
        if let DefineOutcome::IncompatibleRedefinition(_) = self.macros.define(m) {
            self.diags.push(
                DiagLevel::Warning,
                file.to_path_buf(),
                name_tok.line,
                name_tok.column,
                DiagKind::IncompatibleMacroRedefinition { name: name_tok.lexeme },
            );
        }
    }

    fn check_reserved_name_warnings(&mut self, name: &str, at: &Token, file: &Path) {
        if name.starts_with("__STDC_") {
            self.diags.push(
                DiagLevel::Warning,
                file.to_path_buf(),
                at.line,
                at.column,
                DiagKind::ReservedStdcMacro { name: name.to_string() },
            );
        } else if name.starts_with("__") {
            self.diags.push(
                DiagLevel::Warning,
                file.to_path_buf(),
                at.line,
                at.column,
                DiagKind::ReservedDoubleUnderscore { name: name.to_string() },
            );
        } else if name.starts_with('_') && name.chars().nth(1).is_some_and(|c| c.is_ascii_uppercase()) {
            self.diags.push(
                DiagLevel::Warning,
                file.to_path_buf(),
                at.line,
                at.column,
                DiagKind::ReservedUnderscoreUppercase { name: name.to_string() },
            );
        }
    }

    fn read_params(&mut self, input: &mut InputStack, file: &Path) -> (Vec<String>, bool) {
        let mut params: Vec<String> = Vec::new();
        let mut has_variadic = false;
        loop {
            skip_ws(input, &mut self.diags);
            let next = input.peek(1, &mut self.diags);
            if next.kind == TokenKind::Punctuator && next.lexeme == ")" {
                input.consume(&mut self.diags);
                break;
            }
            if next.kind == TokenKind::Punctuator && next.lexeme == "..." {
                input.consume(&mut self.diags);
                has_variadic = true;
                params.push(VARIADIC_SENTINEL.to_string());
                skip_ws(input, &mut self.diags);
                let close = input.peek(1, &mut self.diags);
                if close.kind == TokenKind::Punctuator && close.lexeme == ")" {
                    input.consume(&mut self.diags);
                } else {
                    self.diags.push(DiagLevel::Error, file.to_path_buf(), next.line, next.column, DiagKind::BadEllipsisPosition);
                    skip_to_eol(input, &mut self.diags);
                }
                break;
            }
            if next.kind == TokenKind::Identifier {
                input.consume(&mut self.diags);
                if params.iter().any(|p| p == &next.lexeme) {
                    self.diags.push(
                        DiagLevel::Error,
                        file.to_path_buf(),
                        next.line,
                        next.column,
                        DiagKind::DuplicateParameter { name: next.lexeme.clone() },
                    );
                } else {
                    params.push(next.lexeme.clone());
                }
                skip_ws(input, &mut self.diags);
                let after = input.peek(1, &mut self.diags);
                if after.kind == TokenKind::Punctuator && after.lexeme == "," {
                    input.consume(&mut self.diags);
                    continue;
                } else if after.kind == TokenKind::Punctuator && after.lexeme == ")" {
                    input.consume(&mut self.diags);
                    break;
                } else {
                    self.diags.push(DiagLevel::Error, file.to_path_buf(), after.line, after.column, DiagKind::BadParameterList);
                    break;
                }
            } else {
                self.diags.push(DiagLevel::Error, file.to_path_buf(), next.line, next.column, DiagKind::BadParameterList);
                if !next.is_eol() {
                    input.consume(&mut self.diags);
                }
                break;
            }
        }
        (params, has_variadic)
    }

    // ---- #undef -------------------------------------------------------

    fn handle_undef(&mut self, input: &mut InputStack, file: &Path, out: &mut String) {
        skip_ws(input, &mut self.diags);
        let name_tok = input.consume(&mut self.diags);
        if name_tok.kind != TokenKind::Identifier {
            self.diags.push(
                DiagLevel::Error,
                file.to_path_buf(),
                name_tok.line,
                name_tok.column,
                DiagKind::InvalidMacroName { name: name_tok.lexeme.clone() },
            );
            skip_to_eol(input, &mut self.diags);
            self.finish_directive_line(input, out);
            return;
        }
        skip_ws(input, &mut self.diags);
        if !input.peek(1, &mut self.diags).is_eol() {
            self.diags.push(DiagLevel::Warning, file.to_path_buf(), name_tok.line, name_tok.column, DiagKind::RedundantTokens);
            skip_to_eol(input, &mut self.diags);
        }
        self.finish_directive_line(input, out);

        if macros::is_predefined_name(&name_tok.lexeme) {
            self.diags.push(
                DiagLevel::Warning,
                file.to_path_buf(),
                name_tok.line,
                name_tok.column,
                DiagKind::PredefinedMacroRedefined { name: name_tok.lexeme },
            );
            return;
        }
        if !self.macros.undef(&name_tok.lexeme) {
            self.diags.push(
                DiagLevel::Warning,
                file.to_path_buf(),
                name_tok.line,
                name_tok.column,
                DiagKind::UndefOfUndefinedName { name: name_tok.lexeme },
            );
        }
    }

    // ---- #if / #ifdef / #ifndef / #elif / #else / #endif --------------

    fn eval_raw_condition(&mut self, raw: &[Token], input: &mut InputStack, file: &Path) -> expr::TargetInt {
        let after_defined = expr::substitute_defined(raw, &self.macros);
        input.push_stream(after_defined, Some("#if".to_string()));
        let trigraphs = self.options.trigraphs;
        let expanded = self
            .expander
            .scan_to_eol(input, &self.macros, file, &mut self.diags, trigraphs, false);
        input.pop_stream();
        let filled = expr::zero_fill_identifiers(&expanded);
        expr::evaluate(&filled, file, &mut self.diags)
    }

    fn handle_if(&mut self, input: &mut InputStack, file: &Path, at_line: u32, out: &mut String) {
        let parent_processing = input.current_source().unwrap().current_processing();
        let raw = read_to_eol_raw(input, &mut self.diags);
        self.finish_directive_line(input, out);
        let processing = parent_processing && self.eval_raw_condition(&raw, input, file) != 0;
        input.current_source_mut().unwrap().groups.push(Group {
            processing,
            kind: GroupKind::If,
            start_line: at_line,
            any_arm_processed: processing,
            parent_processing,
            else_seen: false,
        });
    }

    fn handle_ifdef(&mut self, input: &mut InputStack, file: &Path, at_line: u32, invert: bool, out: &mut String) {
        let parent_processing = input.current_source().unwrap().current_processing();
        skip_ws(input, &mut self.diags);
        let name_tok = input.consume(&mut self.diags);
        let name_ok = name_tok.kind == TokenKind::Identifier;
        if !name_ok {
            self.diags.push(
                DiagLevel::Error,
                file.to_path_buf(),
                name_tok.line,
                name_tok.column,
                DiagKind::InvalidMacroName { name: name_tok.lexeme.clone() },
            );
        }
        skip_ws(input, &mut self.diags);
        if !input.peek(1, &mut self.diags).is_eol() {
            self.diags.push(DiagLevel::Warning, file.to_path_buf(), at_line, 1, DiagKind::RedundantTokens);
            skip_to_eol(input, &mut self.diags);
        }
        self.finish_directive_line(input, out);

        let defined = name_ok && (self.macros.is_defined(&name_tok.lexeme) || self.macros.is_predefined(&name_tok.lexeme));
        let processing = parent_processing && (defined != invert);
        input.current_source_mut().unwrap().groups.push(Group {
            processing,
            kind: if invert { GroupKind::Ifndef } else { GroupKind::Ifdef },
            start_line: at_line,
            any_arm_processed: processing,
            parent_processing,
            else_seen: false,
        });
    }

    fn handle_elif(&mut self, input: &mut InputStack, file: &Path, at_line: u32, out: &mut String) {
        let raw = read_to_eol_raw(input, &mut self.diags);
        self.finish_directive_line(input, out);

        let frame = input.current_source_mut().unwrap();
        if frame.groups.len() <= 1 {
            self.diags.push(DiagLevel::Error, file.to_path_buf(), at_line, 1, DiagKind::MisplacedElif);
            return;
        }
        let g = frame.groups.last().unwrap().clone();
        if g.else_seen {
            self.diags.push(DiagLevel::Error, file.to_path_buf(), at_line, 1, DiagKind::MisplacedElif);
            return;
        }

        let should_eval = g.parent_processing && !g.any_arm_processed;
        let cond = if should_eval { self.eval_raw_condition(&raw, input, file) != 0 } else { false };
        let processing = should_eval && cond;

        let top = input.current_source_mut().unwrap().groups.last_mut().unwrap();
        top.processing = processing;
        top.kind = GroupKind::Elif;
        if processing {
            top.any_arm_processed = true;
        }
    }

    fn handle_else(&mut self, input: &mut InputStack, file: &Path, at_line: u32, out: &mut String) {
        skip_ws(input, &mut self.diags);
        if !input.peek(1, &mut self.diags).is_eol() {
            self.diags.push(DiagLevel::Warning, file.to_path_buf(), at_line, 1, DiagKind::RedundantTokens);
            skip_to_eol(input, &mut self.diags);
        }
        self.finish_directive_line(input, out);

        let frame = input.current_source_mut().unwrap();
        if frame.groups.len() <= 1 {
            self.diags.push(DiagLevel::Error, file.to_path_buf(), at_line, 1, DiagKind::MisplacedElse);
            return;
        }
        let g = frame.groups.last().unwrap().clone();
        if g.else_seen {
            self.diags.push(DiagLevel::Error, file.to_path_buf(), at_line, 1, DiagKind::MisplacedElse);
            return;
        }
        let processing = g.parent_processing && !g.any_arm_processed;
        let top = input.current_source_mut().unwrap().groups.last_mut().unwrap();
        top.processing = processing;
        top.kind = GroupKind::Else;
        top.else_seen = true;
        if processing {
            top.any_arm_processed = true;
        }
    }

    fn handle_endif(&mut self, input: &mut InputStack, file: &Path, at_line: u32, out: &mut String) {
        skip_ws(input, &mut self.diags);
        if !input.peek(1, &mut self.diags).is_eol() {
            self.diags.push(DiagLevel::Warning, file.to_path_buf(), at_line, 1, DiagKind::RedundantTokens);
            skip_to_eol(input, &mut self.diags);
        }
        self.finish_directive_line(input, out);

        let frame = input.current_source_mut().unwrap();
        if frame.groups.len() <= 1 {
            self.diags.push(DiagLevel::Error, file.to_path_buf(), at_line, 1, DiagKind::MisplacedEndif);
            return;
        }
        frame.groups.pop();
    }

    // ---- #error / #line / #pragma --------------------------------------

    fn handle_error(&mut self, input: &mut InputStack, file: &Path, at_line: u32, out: &mut String) {
        let raw = read_to_eol_raw(input, &mut self.diags);
        self.finish_directive_line(input, out);
        let message = concat_lexemes(&raw).trim().to_string();
        self.diags.push(DiagLevel::Error, file.to_path_buf(), at_line, 1, DiagKind::UserError { message });
    }

    fn handle_line(&mut self, input: &mut InputStack, file: &Path, at_line: u32, out: &mut String) {
        skip_ws(input, &mut self.diags);
        let trigraphs = self.options.trigraphs;
        let toks = self
            .expander
            .scan_to_eol(input, &self.macros, file, &mut self.diags, trigraphs, true);
        self.finish_directive_line(input, out);

        let mut it = toks.iter().filter(|t| !t.is_ws());
        let new_line = match it.next() {
            Some(t) if t.kind == TokenKind::PpNumber => t.lexeme.trim_end_matches(|c: char| c.is_ascii_alphabetic()).parse::<u32>().ok(),
            _ => None,
        };
        let Some(new_line) = new_line else {
            self.diags.push(DiagLevel::Error, file.to_path_buf(), at_line, 1, DiagKind::InvalidLineDirective);
            return;
        };
        let new_path = match it.next() {
            Some(t) if t.kind == TokenKind::StringLiteral => {
                Some(t.lexeme.trim_matches('"').to_string())
            }
            None => None,
            Some(_) => {
                self.diags.push(DiagLevel::Error, file.to_path_buf(), at_line, 1, DiagKind::InvalidLineDirective);
                None
            }
        };

        let frame = input.current_source_mut().unwrap();
        frame.set_line_override(at_line, new_line);
        if let Some(p) = new_path {
            frame.set_display_path(p);
        }
    }

    fn handle_pragma(&mut self, input: &mut InputStack, file: &Path, at_line: u32, out: &mut String) {
        skip_ws(input, &mut self.diags);
        let site = input.peek(1, &mut self.diags);
        let raw = read_to_eol_raw(input, &mut self.diags);
        self.finish_directive_line(input, out);
        let tokens = collapse_whitespace(raw);
        let site = if site.is_eol() { Token::new(TokenKind::Identifier, "", at_line, 1) } else { site };
        pragma::execute_pragma(&tokens, &site, file, &mut self.diags);
    }
}

fn str_lit(s: &str) -> Token {
    Token::new(TokenKind::StringLiteral, format!("\"{s}\""), 0, 0)
}

fn pp_num(s: &str) -> Token {
    Token::new(TokenKind::PpNumber, s, 0, 0)
}

/// Splits a header-name token's lexeme into (name, angled). The scanner
/// always produces the delimiters as part of the lexeme.
fn parse_header_lexeme(lexeme: &str) -> Option<(String, bool)> {
    if lexeme.len() < 2 {
        return None;
    }
    let bytes = lexeme.as_bytes();
    match (bytes[0], bytes[bytes.len() - 1]) {
        (b'"', b'"') => Some((lexeme[1..lexeme.len() - 1].to_string(), false)),
        (b'<', b'>') => Some((lexeme[1..lexeme.len() - 1].to_string(), true)),
        _ => None,
    }
}

fn read_to_eol_raw(input: &mut InputStack, diags: &mut Diagnostics) -> Vec<Token> {
    let mut out = Vec::new();
    loop {
        let t = input.peek(1, diags);
        if t.is_eol() {
            break;
        }
        out.push(input.consume(diags));
    }
    out
}

fn skip_to_eol(input: &mut InputStack, diags: &mut Diagnostics) {
    while !input.peek(1, diags).is_eol() {
        input.consume(diags);
    }
}

fn consume_eol(input: &mut InputStack, diags: &mut Diagnostics) -> Token {
    let t = input.peek(1, diags);
    if t.kind == TokenKind::NewLine {
        return input.consume(diags);
    }
    t
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::FsResolver;

    fn pp() -> Preprocessor {
        Preprocessor::new(Options::default(), Box::new(FsResolver))
    }

    fn run(src: &str) -> (String, Preprocessor) {
        let mut p = pp();
        let out = p.run(PathBuf::from("t.c"), src);
        (out, p)
    }

    #[test]
    fn object_macro_expansion_rescans_into_another_macro() {
        let (out, p) = run("#define A B\n#define B 2\nA\n");
        assert!(!p.diagnostics().has_errors());
        assert_eq!(out, "\n\n2\n");
    }

    #[test]
    fn function_macro_stringize_and_paste() {
        let (out, p) = run("#define GLUE(a, b) a ## b\n#define STR(x) #x\nGLUE(fo, o)\nSTR(hi)\n");
        assert!(!p.diagnostics().has_errors());
        assert_eq!(out, "\n\nfoo\n\"hi\"\n");
    }

    #[test]
    fn self_referential_macro_does_not_recurse_forever() {
        let (out, p) = run("#define A A + 1\nA\n");
        assert!(!p.diagnostics().has_errors());
        assert_eq!(out, "\nA + 1\n");
    }

    #[test]
    fn variadic_macro_expands_va_args() {
        let (out, p) = run("#define LOG(fmt, ...) fmt __VA_ARGS__\nLOG(\"x\", 1, 2)\n");
        assert!(!p.diagnostics().has_errors());
        assert_eq!(out, "\n\"x\" 1, 2\n");
    }

    #[test]
    fn conditional_group_takes_first_true_branch() {
        let (out, p) = run("#if 0\nskipped\n#elif 1\ntaken\n#else\nunreached\n#endif\n");
        assert!(!p.diagnostics().has_errors());
        assert_eq!(out, "\n\n\ntaken\n\n\n\n");
    }

    #[test]
    fn conditional_group_falls_through_to_else() {
        let (out, p) = run("#if 0\nskipped\n#else\ntaken\n#endif\n");
        assert!(!p.diagnostics().has_errors());
        assert_eq!(out, "\n\n\ntaken\n\n");
    }

    #[test]
    fn stdc_hosted_is_zero() {
        let (out, p) = run("__STDC_HOSTED__\n");
        assert!(!p.diagnostics().has_errors());
        assert_eq!(out, "0\n");
    }

    #[test]
    fn defined_operator_does_not_expand_its_operand() {
        let (out, p) = run("#define FOO 1\n#if defined(FOO)\nyes\n#endif\n");
        assert!(!p.diagnostics().has_errors());
        assert_eq!(out, "\nyes\n\n");
    }

    #[test]
    fn undef_then_use_leaves_identifier_unexpanded() {
        let (out, p) = run("#define A 1\n#undef A\nA\n");
        assert!(!p.diagnostics().has_errors());
        assert_eq!(out, "\n\nA\n");
    }

    #[test]
    fn command_line_define_and_undefine_apply_before_the_body_runs() {
        let options = Options {
            defines: vec!["A=1".to_string(), "B".to_string()],
            undefines: vec!["B".to_string()],
            ..Options::default()
        };
        let mut p = Preprocessor::new(options, Box::new(FsResolver));
        let out = p.run(PathBuf::from("t.c"), "A\nB\n");
        assert!(!p.diagnostics().has_errors());
        assert_eq!(out, "1\nB\n");
    }

    #[test]
    fn unterminated_if_is_reported_at_end_of_file() {
        let (_, p) = run("#if 1\nx\n");
        assert!(p.diagnostics().has_errors());
    }

    #[test]
    fn include_resolves_relative_to_search_directory() {
        let dir = std::env::temp_dir().join("redsea_pp_directive_test_include");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("h.h"), "#define X 9\n").unwrap();

        let options = Options {
            include_dirs: vec![dir.clone()],
            ..Options::default()
        };
        let mut p = Preprocessor::new(options, Box::new(FsResolver));
        let out = p.run(PathBuf::from("t.c"), "#include <h.h>\nX\n");
        assert!(!p.diagnostics().has_errors());
        assert_eq!(out, "\nX\n".replace("X", "9"));

        std::fs::remove_dir_all(&dir).ok();
    }
}
