//! Macro expansion: argument reading, the three substitution passes
//! (argument substitution, stringize, paste) and the hide-set-guarded
//! rescan loop.
//!
//! [`Expander::invoke`] returns the finished, rescanned token sequence
//! directly: the substituted body is pushed as a stream (so a self-reference
//! inside it is masked by the hide set while rescanning happens) and popped
//! as soon as the rescan completes, rather than left for the caller to drain.

use crate::diagnostics::{DiagKind, DiagLevel, Diagnostics};
use crate::input::{skip_ws, skip_ws_and_nl, InputStack};
use crate::macros::{ExpansionMethod, Macro, MacroForm, MacroTable};
use crate::pragma;
use crate::scanner::Scanner;
use crate::token::{collapse_whitespace, Token, TokenKind};
use std::collections::HashSet;
use std::path::Path;

/// The result of attempting to invoke an identifier that named a macro.
pub enum Invocation {
    /// The macro fired; these are its (already rescanned) output tokens.
    Replaced(Vec<Token>),
    /// A function-like macro's name wasn't followed by `(`: the name
    /// stands for itself, and any whitespace consumed while looking for
    /// the `(` is re-emitted unchanged.
    NotInvoked(Vec<Token>),
}

/// Drives rescanning and tracks which macro names are currently "hot"
/// (mid-expansion), so a macro body that mentions its own name is emitted
/// literally instead of expanding forever.
#[derive(Debug, Default)]
pub struct Expander {
    used: HashSet<String>,
}

impl Expander {
    pub fn new() -> Self {
        Expander { used: HashSet::new() }
    }

    /// How many macro names are currently being expanded (nesting depth);
    /// exposed mainly so callers/tests can assert the hide set unwinds.
    pub fn used_depth(&self) -> usize {
        self.used.len()
    }

    /// Reads tokens from `input`, expanding macro invocations as they're
    /// found, until `input` reports end-of-line or end-of-file (without
    /// consuming that terminator). Used both for the top-level per-line
    /// scan (`allow_newline = true`) and for rescanning a pushed expansion
    /// stream (`allow_newline = false`, since pushed streams carry no
    /// embedded newlines — arguments are whitespace-collapsed before being
    /// pushed). `allow_newline` itself only affects whether a function-like
    /// macro's `(` lookahead is permitted to cross a physical newline.
    pub fn scan_to_eol(
        &mut self,
        input: &mut InputStack,
        macros: &MacroTable,
        file: &Path,
        diags: &mut Diagnostics,
        trigraphs: bool,
        allow_newline: bool,
    ) -> Vec<Token> {
        let mut out = Vec::new();
        loop {
            let next = input.peek(1, diags);
            if next.is_eol() {
                break;
            }
            let tok = input.consume(diags);
            if tok.kind != TokenKind::Identifier {
                out.push(tok);
                continue;
            }
            if self.used.contains(&tok.lexeme) {
                out.push(Token::new(
                    TokenKind::NonReplacementTarget,
                    tok.lexeme.clone(),
                    tok.line,
                    tok.column,
                ));
                continue;
            }
            let Some(m) = macros.get(&tok.lexeme).cloned() else {
                out.push(tok);
                continue;
            };
            match self.invoke(&m, &tok, input, macros, file, diags, trigraphs, allow_newline) {
                Invocation::Replaced(toks) => out.extend(toks),
                Invocation::NotInvoked(extra) => {
                    out.push(tok);
                    out.extend(extra);
                }
            }
        }
        out
    }

    fn invoke(
        &mut self,
        m: &Macro,
        name_tok: &Token,
        input: &mut InputStack,
        macros: &MacroTable,
        file: &Path,
        diags: &mut Diagnostics,
        trigraphs: bool,
        allow_newline: bool,
    ) -> Invocation {
        let args = if m.form == MacroForm::Function {
            let skipped = if allow_newline {
                skip_ws_and_nl(input, diags).0
            } else {
                skip_ws(input, diags)
            };
            let next = input.peek(1, diags);
            if !(next.kind == TokenKind::Punctuator && next.lexeme == "(") {
                diags.push(
                    DiagLevel::Warning,
                    file.to_path_buf(),
                    name_tok.line,
                    name_tok.column,
                    DiagKind::FunctionMacroNotInvoked { name: m.name.clone() },
                );
                return Invocation::NotInvoked(skipped);
            }
            input.consume(diags); // the '('
            read_macro_args(m, input, diags, file, name_tok)
        } else {
            Vec::new()
        };

        self.used.insert(m.name.clone());
        tracing::debug!(target: "expand", name = %m.name, depth = self.used.len(), "enter");
        let result = match m.method {
            ExpansionMethod::DirectlyCopyable => m.replacement.clone(),
            ExpansionMethod::OpPragma => self.expand_op_pragma(&args, name_tok, input, macros, file, diags, trigraphs),
            ExpansionMethod::Normal => self.expand_normal(m, &args, input, macros, file, diags, trigraphs),
        };
        self.used.remove(&m.name);
        tracing::debug!(target: "expand", name = %m.name, depth = self.used.len(), "exit");
        Invocation::Replaced(result)
    }

    fn expand_normal(
        &mut self,
        m: &Macro,
        args: &[Vec<Token>],
        input: &mut InputStack,
        macros: &MacroTable,
        file: &Path,
        diags: &mut Diagnostics,
        trigraphs: bool,
    ) -> Vec<Token> {
        let mut cache: Vec<Option<Vec<Token>>> = vec![None; args.len()];
        let substituted = self.substitute(m, args, &mut cache, input, macros, file, diags, trigraphs);
        let stringized = apply_stringize(m, substituted, args, file, diags);
        let pasted = apply_concat(m, stringized, args, file, diags, trigraphs);
        if pasted.is_empty() {
            return Vec::new();
        }
        input.push_stream(pasted, Some(m.name.clone()));
        let result = self.scan_to_eol(input, macros, file, diags, trigraphs, false);
        input.pop_stream();
        result
    }

    /// Pass A: walk the replacement list, substituting each parameter with
    /// its (expanded, cached) argument except where it sits next to `#` or
    /// `##` (skipping over intervening whitespace tokens) — those positions
    /// are left as the raw parameter identifier for
    /// [`apply_stringize`]/[`apply_concat`] to consume with the unexpanded
    /// argument instead.
    fn substitute(
        &mut self,
        m: &Macro,
        args: &[Vec<Token>],
        cache: &mut [Option<Vec<Token>>],
        input: &mut InputStack,
        macros: &MacroTable,
        file: &Path,
        diags: &mut Diagnostics,
        trigraphs: bool,
    ) -> Vec<Token> {
        let body = &m.replacement;
        let mut out = Vec::with_capacity(body.len());
        let mut i = 0;
        while i < body.len() {
            let t = &body[i];
            if t.kind == TokenKind::Identifier {
                if let Some(idx) = param_slot(m, &t.lexeme) {
                    let next_is_paste = next_significant(body, i).map(is_paste_tok).unwrap_or(false);
                    let prev_is_paste = prev_significant(body, i).map(is_paste_tok).unwrap_or(false);
                    let prev_is_hash = m.form == MacroForm::Function
                        && prev_significant(body, i).map(is_hash_tok).unwrap_or(false);
                    if next_is_paste || prev_is_paste || prev_is_hash {
                        out.push(t.clone());
                    } else {
                        let expanded = self.get_expanded_arg(idx, args, cache, input, macros, file, diags, trigraphs);
                        out.extend(expanded);
                    }
                    i += 1;
                    continue;
                }
            }
            out.push(t.clone());
            i += 1;
        }
        out
    }

    fn get_expanded_arg(
        &mut self,
        idx: usize,
        args: &[Vec<Token>],
        cache: &mut [Option<Vec<Token>>],
        input: &mut InputStack,
        macros: &MacroTable,
        file: &Path,
        diags: &mut Diagnostics,
        trigraphs: bool,
    ) -> Vec<Token> {
        if let Some(cached) = cache.get(idx).and_then(|c| c.clone()) {
            return cached;
        }
        let raw = args.get(idx).cloned().unwrap_or_default();
        let expanded = if raw.is_empty() {
            Vec::new()
        } else {
            input.push_stream(raw, None);
            let r = self.scan_to_eol(input, macros, file, diags, trigraphs, false);
            input.pop_stream();
            r
        };
        if let Some(slot) = cache.get_mut(idx) {
            *slot = Some(expanded.clone());
        }
        expanded
    }

    fn expand_op_pragma(
        &mut self,
        args: &[Vec<Token>],
        name_tok: &Token,
        input: &mut InputStack,
        macros: &MacroTable,
        file: &Path,
        diags: &mut Diagnostics,
        trigraphs: bool,
    ) -> Vec<Token> {
        if args.is_empty() || args[0].is_empty() {
            diags.push(
                DiagLevel::Error,
                file.to_path_buf(),
                name_tok.line,
                name_tok.column,
                DiagKind::PragmaOperandNotString,
            );
            return Vec::new();
        }
        let mut cache: Vec<Option<Vec<Token>>> = vec![None; args.len()];
        let expanded = self.get_expanded_arg(0, args, &mut cache, input, macros, file, diags, trigraphs);
        if expanded.len() != 1 || expanded[0].kind != TokenKind::StringLiteral {
            diags.push(
                DiagLevel::Error,
                file.to_path_buf(),
                name_tok.line,
                name_tok.column,
                DiagKind::PragmaOperandNotString,
            );
            return Vec::new();
        }
        let destringized = destringize(&expanded[0].lexeme);
        let mut scanner = Scanner::new(&destringized, trigraphs);
        let mut tokens = Vec::new();
        loop {
            let t = scanner.next_token(file, diags);
            if t.kind == TokenKind::EndOfFile {
                break;
            }
            tokens.push(t);
        }
        let tokens = collapse_whitespace(tokens);
        pragma::execute_pragma(&tokens, name_tok, file, diags);
        Vec::new()
    }
}

pub(crate) fn is_paste_tok(t: &Token) -> bool {
    t.kind == TokenKind::Punctuator && t.lexeme == "##"
}

pub(crate) fn is_hash_tok(t: &Token) -> bool {
    t.kind == TokenKind::Punctuator && t.lexeme == "#"
}

/// The nearest non-whitespace token after index `i`, if any.
fn next_significant(body: &[Token], i: usize) -> Option<&Token> {
    body[i + 1..].iter().find(|t| !t.is_ws())
}

/// The nearest non-whitespace token before index `i`, if any.
fn prev_significant(body: &[Token], i: usize) -> Option<&Token> {
    body[..i].iter().rev().find(|t| !t.is_ws())
}

/// `Some(index)` into `args` if `name` names a parameter or `__VA_ARGS__`.
fn param_slot(m: &Macro, name: &str) -> Option<usize> {
    if name == "__VA_ARGS__" && m.has_variadic {
        return Some(m.named_param_count());
    }
    m.param_index(name)
}

fn raw_arg_for(m: &Macro, args: &[Vec<Token>], token: &Token) -> Option<Vec<Token>> {
    if token.kind != TokenKind::Identifier {
        return None;
    }
    param_slot(m, &token.lexeme).map(|idx| args.get(idx).cloned().unwrap_or_default())
}

fn substitute_by_arg_raw(m: &Macro, args: &[Vec<Token>], token: &Token) -> Vec<Token> {
    raw_arg_for(m, args, token).unwrap_or_else(|| vec![token.clone()])
}

/// Reads a function-like macro's argument list, with the opening `(`
/// already consumed. Paren-balances within each argument; once all named
/// slots are filled, a variadic macro's remaining commas become literal
/// tokens inside one trailing argument instead of separators.
fn read_macro_args(m: &Macro, input: &mut InputStack, diags: &mut Diagnostics, file: &Path, site: &Token) -> Vec<Vec<Token>> {
    let mut args: Vec<Vec<Token>> = vec![Vec::new()];
    let mut depth: i32 = 0;
    let mut comma_count = 0usize;
    loop {
        let tok = input.peek(1, diags);
        if tok.kind == TokenKind::EndOfFile {
            diags.push(
                DiagLevel::Error,
                file.to_path_buf(),
                tok.line,
                tok.column,
                DiagKind::UnterminatedArgumentList,
            );
            break;
        }
        if tok.kind == TokenKind::Punctuator && tok.lexeme == "(" {
            depth += 1;
            args.last_mut().unwrap().push(input.consume(diags));
            continue;
        }
        if tok.kind == TokenKind::Punctuator && tok.lexeme == ")" {
            if depth == 0 {
                input.consume(diags);
                break;
            }
            depth -= 1;
            args.last_mut().unwrap().push(input.consume(diags));
            continue;
        }
        if tok.kind == TokenKind::Punctuator && tok.lexeme == "," && depth == 0 {
            let in_variadic_tail = m.has_variadic && args.len() > m.named_param_count();
            input.consume(diags);
            if in_variadic_tail {
                args.last_mut().unwrap().push(tok);
            } else {
                comma_count += 1;
                args.push(Vec::new());
            }
            continue;
        }
        args.last_mut().unwrap().push(input.consume(diags));
    }
    let _ = comma_count;

    // `F()` against a zero-parameter, non-variadic macro means zero
    // arguments, not one empty argument.
    if m.params.is_empty() && !m.has_variadic && args.len() == 1 && args[0].is_empty() {
        args.clear();
    }

    let expected = m.named_param_count();
    let got = args.len();
    if m.has_variadic {
        if got < expected {
            diags.push(
                DiagLevel::Error,
                file.to_path_buf(),
                site.line,
                site.column,
                DiagKind::UnmatchedArgCount { expected, got },
            );
        } else if got == expected {
            diags.push(
                DiagLevel::Warning,
                file.to_path_buf(),
                site.line,
                site.column,
                DiagKind::VariadicNeedsOneArg,
            );
            args.push(Vec::new());
        }
    } else if got != expected {
        diags.push(
            DiagLevel::Error,
            file.to_path_buf(),
            site.line,
            site.column,
            DiagKind::UnmatchedArgCount { expected, got },
        );
    }

    args.into_iter().map(collapse_whitespace).collect()
}

/// Pass B: `#param` → a string literal of `param`'s raw (unexpanded)
/// argument. Only meaningful for function-like macros; object-like bodies
/// never reach here with a stray `#` since `#define` validates that at
/// definition time.
fn apply_stringize(m: &Macro, tokens: Vec<Token>, args: &[Vec<Token>], file: &Path, diags: &mut Diagnostics) -> Vec<Token> {
    if m.form != MacroForm::Function {
        return tokens;
    }
    let mut out = Vec::with_capacity(tokens.len());
    let mut i = 0;
    while i < tokens.len() {
        let t = &tokens[i];
        if t.kind == TokenKind::Punctuator && t.lexeme == "#" {
            let mut j = i + 1;
            while tokens.get(j).map(|x| x.is_ws()).unwrap_or(false) {
                j += 1;
            }
            if let Some(raw) = tokens.get(j).and_then(|p| raw_arg_for(m, args, p)) {
                out.push(Token::at(TokenKind::StringLiteral, stringize(&raw), t));
                i = j + 1;
                continue;
            }
            diags.push(
                DiagLevel::Error,
                file.to_path_buf(),
                t.line,
                t.column,
                DiagKind::BadStringizeOperand,
            );
            i += 1;
            continue;
        }
        out.push(t.clone());
        i += 1;
    }
    out
}

/// Renders an argument's raw tokens as a C string literal: whitespace runs
/// collapse to one space, and `\`/`"` inside a string or character literal
/// sub-token are escaped.
fn stringize(raw: &[Token]) -> String {
    let mut body = String::new();
    for t in raw {
        if t.is_ws() {
            if !body.is_empty() && !body.ends_with(' ') {
                body.push(' ');
            }
            continue;
        }
        if matches!(t.kind, TokenKind::StringLiteral | TokenKind::CharacterConstant) {
            for c in t.lexeme.chars() {
                if c == '\\' || c == '"' {
                    body.push('\\');
                }
                body.push(c);
            }
        } else {
            body.push_str(&t.lexeme);
        }
    }
    format!("\"{}\"", body.trim())
}

/// Pass C: `a ## b` pastes the last token of (the raw substitution of) `a`
/// with the first token of (the raw substitution of) `b`, re-tokenizing the
/// joined text through a fresh scanner.
fn apply_concat(m: &Macro, tokens: Vec<Token>, args: &[Vec<Token>], file: &Path, diags: &mut Diagnostics, trigraphs: bool) -> Vec<Token> {
    let mut out: Vec<Token> = Vec::with_capacity(tokens.len());
    let mut i = 0;
    while i < tokens.len() {
        if tokens[i].kind == TokenKind::Punctuator && tokens[i].lexeme == "##" {
            let site = tokens[i].clone();
            while matches!(out.last(), Some(t) if t.is_ws()) {
                out.pop();
            }
            let left_full = out.pop().map(|t| substitute_by_arg_raw(m, args, &t)).unwrap_or_default();
            let mut j = i + 1;
            while tokens.get(j).map(|t| t.is_ws()).unwrap_or(false) {
                j += 1;
            }
            let right_full = tokens.get(j).map(|t| substitute_by_arg_raw(m, args, t)).unwrap_or_default();
            out.extend(concat_and_retokenize(&left_full, &right_full, &site, file, diags, trigraphs));
            i = if tokens.get(j).is_some() { j + 1 } else { j };
            continue;
        }
        out.push(tokens[i].clone());
        i += 1;
    }
    out
}

fn concat_and_retokenize(
    left: &[Token],
    right: &[Token],
    site: &Token,
    file: &Path,
    diags: &mut Diagnostics,
    trigraphs: bool,
) -> Vec<Token> {
    let mut out = Vec::new();
    if left.len() > 1 {
        out.extend_from_slice(&left[..left.len() - 1]);
    }
    let left_lexeme = left.last().map(|t| t.lexeme.as_str()).unwrap_or("");
    let right_lexeme = right.first().map(|t| t.lexeme.as_str()).unwrap_or("");
    let combined = format!("{left_lexeme}{right_lexeme}");

    if combined.is_empty() {
        out.push(Token::at(TokenKind::PlaceMarker, "", site));
    } else {
        let mut scanner = Scanner::new(&combined, trigraphs);
        let mut produced = Vec::new();
        loop {
            let t = scanner.next_token(file, diags);
            if t.kind == TokenKind::EndOfFile {
                break;
            }
            produced.push(t);
        }
        match produced.len() {
            0 => out.push(Token::at(TokenKind::PlaceMarker, "", site)),
            1 => {
                let mut t = produced.into_iter().next().unwrap();
                t.line = site.line;
                t.column = site.column;
                if t.is_ws() || (t.kind == TokenKind::Punctuator && t.lexeme == "##") {
                    diags.push(
                        DiagLevel::Warning,
                        file.to_path_buf(),
                        site.line,
                        site.column,
                        DiagKind::GeneratedInvalidPpToken { lexeme: t.lexeme.clone() },
                    );
                    t.kind = TokenKind::NonReplacementTarget;
                }
                out.push(t);
            }
            _ => {
                diags.push(
                    DiagLevel::Warning,
                    file.to_path_buf(),
                    site.line,
                    site.column,
                    DiagKind::GeneratedInvalidPpToken { lexeme: combined },
                );
                for mut t in produced {
                    t.line = site.line;
                    t.column = site.column;
                    out.push(t);
                }
            }
        }
    }

    if right.len() > 1 {
        out.extend_from_slice(&right[1..]);
    }
    out
}

/// Strips `_Pragma`'s string-literal operand down to its body: an optional
/// encoding prefix, the surrounding quotes, and `\"`/`\\` unescaped.
fn destringize(lexeme: &str) -> String {
    let mut s = lexeme;
    for prefix in ["u8", "u", "U", "L"] {
        if let Some(rest) = s.strip_prefix(prefix) {
            if rest.starts_with('"') {
                s = rest;
                break;
            }
        }
    }
    let inner = s.strip_prefix('"').and_then(|r| r.strip_suffix('"')).unwrap_or(s);
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(&next) = chars.peek() {
                if next == '"' || next == '\\' {
                    out.push(next);
                    chars.next();
                    continue;
                }
            }
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::SourceFrame;
    use crate::macros::{Macro, MacroForm};
    use crate::token::concat_lexemes;
    use std::path::PathBuf;

    fn run(src: &str, defs: Vec<Macro>) -> (Vec<Token>, Diagnostics) {
        let mut table = MacroTable::new();
        for m in defs {
            table.define(m);
        }
        let mut input = InputStack::new();
        input.push_source(SourceFrame::new(PathBuf::from("a.c"), src, false));
        let mut diags = Diagnostics::new();
        let mut expander = Expander::new();
        let out = expander.scan_to_eol(&mut input, &table, &PathBuf::from("a.c"), &mut diags, false, true);
        (out, diags)
    }

    fn object_macro(name: &str, body_src: &str) -> Macro {
        let mut scanner = Scanner::new(body_src, false);
        let mut diags = Diagnostics::new();
        let mut toks = Vec::new();
        loop {
            let t = scanner.next_token(&PathBuf::from("a.c"), &mut diags);
            if t.kind == TokenKind::EndOfFile {
                break;
            }
            toks.push(t);
        }
        Macro::new(
            name.into(),
            MacroForm::Object,
            vec![],
            false,
            collapse_whitespace(toks),
            (PathBuf::from("a.c"), 1, 1),
            false,
        )
    }

    #[test]
    fn object_macro_rescans_its_own_expansion() {
        let a = object_macro("A", "B + 1");
        let b = object_macro("B", "2");
        let (out, diags) = run("A\n", vec![a, b]);
        assert!(!diags.has_errors());
        assert_eq!(concat_lexemes(&out), "2+1".replace('+', " + "));
    }

    #[test]
    fn self_referential_macro_does_not_loop() {
        let a = object_macro("A", "A + 1");
        let (out, diags) = run("A\n", vec![a]);
        assert!(!diags.has_errors());
        assert_eq!(out.first().unwrap().lexeme, "A");
        assert_eq!(out.first().unwrap().kind, TokenKind::NonReplacementTarget);
    }

    fn function_macro(name: &str, params: Vec<&str>, has_variadic: bool, body_src: &str) -> Macro {
        let mut scanner = Scanner::new(body_src, false);
        let mut diags = Diagnostics::new();
        let mut toks = Vec::new();
        loop {
            let t = scanner.next_token(&PathBuf::from("a.c"), &mut diags);
            if t.kind == TokenKind::EndOfFile {
                break;
            }
            toks.push(t);
        }
        Macro::new(
            name.into(),
            MacroForm::Function,
            params.into_iter().map(String::from).collect(),
            has_variadic,
            collapse_whitespace(toks),
            (PathBuf::from("a.c"), 1, 1),
            false,
        )
    }

    #[test]
    fn stringize_then_concat() {
        let m = function_macro("CAT", vec!["a", "b"], false, "a ## b");
        let (out, diags) = run("CAT(fo,o)\n", vec![m]);
        assert!(!diags.has_errors());
        assert_eq!(concat_lexemes(&out), "foo");
    }

    #[test]
    fn stringize_wraps_argument_in_quotes() {
        let m = function_macro("STR", vec!["x"], false, "#x");
        let (out, diags) = run("STR(hello)\n", vec![m]);
        assert!(!diags.has_errors());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].kind, TokenKind::StringLiteral);
        assert_eq!(out[0].lexeme, "\"hello\"");
    }

    #[test]
    fn variadic_macro_collects_all_trailing_tokens_as_one_argument() {
        let m = function_macro("LOG", vec!["fmt", "..."], true, "fmt: __VA_ARGS__");
        let (out, diags) = run("LOG(\"x\", a, b)\n", vec![m]);
        assert!(!diags.has_errors());
        assert_eq!(concat_lexemes(&out), "\"x\": a, b");
    }

    #[test]
    fn function_macro_without_parens_is_left_unexpanded() {
        let m = function_macro("F", vec!["x"], false, "x");
        let (out, diags) = run("F + 1\n", vec![m]);
        assert!(diags.entries.iter().any(|d| matches!(d.kind, DiagKind::FunctionMacroNotInvoked { .. })));
        assert_eq!(out.first().unwrap().lexeme, "F");
    }

    #[test]
    fn empty_concat_operands_yield_placemarker() {
        let m = function_macro("EMPTYCAT", vec!["a", "b"], false, "a ## b");
        let (out, diags) = run("EMPTYCAT(,)\n", vec![m]);
        assert!(!diags.has_errors());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].kind, TokenKind::PlaceMarker);
    }
}
