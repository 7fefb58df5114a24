//! Byte stream to preprocessing-token state machine.
//!
//! Trigraph substitution happens per raw physical line, before
//! line-splicing; the scanner then walks a single flattened logical buffer
//! with mark/reset for backtracking out of a punctuator prefix that can't
//! continue (the `<<=`-before-`<<`-before-`<` maximal-munch rule). Each
//! character keeps the physical line it came from so a diagnostic inside a
//! spliced sequence still points at the right line.

use crate::diagnostics::{DiagKind, DiagLevel, Diagnostics};
use crate::token::{Token, TokenKind};
use std::path::Path;

const TRIGRAPHS: &[(char, char)] = &[
    ('=', '#'),
    (')', ']'),
    ('!', '|'),
    ('(', '['),
    ('\\', '^'),
    ('>', '}'),
    ('/', '\\'),
    ('<', '{'),
    ('-', '~'),
];

fn substitute_trigraphs(line: &str) -> String {
    let chars: Vec<char> = line.chars().collect();
    let mut out = String::with_capacity(chars.len());
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '?' && i + 2 < chars.len() && chars[i + 1] == '?' {
            if let Some(&(_, repl)) = TRIGRAPHS.iter().find(|&&(t, _)| t == chars[i + 2]) {
                out.push(repl);
                i += 3;
                continue;
            }
        }
        out.push(chars[i]);
        i += 1;
    }
    out
}

/// Flattens raw source into (chars, physical line per char), applying
/// trigraphs and removing backslash-newline splices. Line numbers are
/// 1-based.
fn flatten(source: &str, trigraphs: bool) -> (Vec<char>, Vec<u32>) {
    let mut buf = Vec::new();
    let mut lines = Vec::new();
    let ends_with_newline = source.ends_with('\n');
    let mut raw_lines: Vec<&str> = source.split('\n').collect();
    if ends_with_newline {
        // split('\n') yields a spurious empty trailing element for "a\n".
        raw_lines.pop();
    }
    let n = raw_lines.len();
    for (idx, raw_line) in raw_lines.into_iter().enumerate() {
        let line_no = (idx + 1) as u32;
        let had_trailing_nl = ends_with_newline || idx + 1 < n;
        let mut content = raw_line.strip_suffix('\r').unwrap_or(raw_line).to_string();
        if trigraphs {
            content = substitute_trigraphs(&content);
        }
        if let Some(stripped) = content.strip_suffix('\\') {
            for c in stripped.chars() {
                buf.push(c);
                lines.push(line_no);
            }
            // splice: no separating newline emitted.
        } else {
            for c in content.chars() {
                buf.push(c);
                lines.push(line_no);
            }
            if had_trailing_nl {
                buf.push('\n');
                lines.push(line_no);
            }
        }
    }
    (buf, lines)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hint {
    None,
    /// The caller is about to read the operand of `#include`; `"..."` and
    /// `<...>` are header-names rather than a string literal / punctuator.
    HeaderName,
}

pub struct Scanner {
    chars: Vec<char>,
    phys_line: Vec<u32>,
    pos: usize,
    mark_pos: usize,
    hint: Hint,
    at_eof: bool,
}

const ENCODING_PREFIXES: &[&str] = &["u8", "u", "U", "L"];

impl Scanner {
    pub fn new(source: &str, trigraphs: bool) -> Self {
        let (chars, phys_line) = flatten(source, trigraphs);
        Scanner {
            chars,
            phys_line,
            pos: 0,
            mark_pos: 0,
            hint: Hint::None,
            at_eof: false,
        }
    }

    pub fn set_hint(&mut self, hint: Hint) {
        self.hint = hint;
    }

    fn mark(&mut self) {
        self.mark_pos = self.pos;
    }

    fn reset(&mut self) {
        self.pos = self.mark_pos;
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.chars.get(self.pos).copied();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn position(&self) -> (u32, u32) {
        let line = self.phys_line.get(self.pos).copied().unwrap_or_else(|| {
            self.phys_line.last().copied().unwrap_or(1)
        });
        // Column is the offset within the current logical (spliced) buffer
        // region: count back to the nearest preceding '\n'.
        let mut col = 1u32;
        let mut i = self.pos;
        while i > 0 {
            i -= 1;
            if self.chars[i] == '\n' {
                break;
            }
            col += 1;
        }
        (line, col)
    }

    fn eats(&mut self, s: &str) -> bool {
        let n = s.chars().count();
        let matches = s
            .chars()
            .enumerate()
            .all(|(i, c)| self.peek_at(i) == Some(c));
        if matches {
            for _ in 0..n {
                self.advance();
            }
        }
        matches
    }

    /// Produces exactly one token, reporting its starting line/column.
    pub fn next_token(&mut self, file: &Path, diags: &mut Diagnostics) -> Token {
        if self.at_eof || self.pos >= self.chars.len() {
            let (line, col) = self.position();
            return Token::eof(line, col);
        }
        let (line, col) = self.position();
        let c = self.chars[self.pos];

        if c == '\n' {
            self.advance();
            return Token::new(TokenKind::NewLine, "\n", line, col);
        }
        if c == ' ' || c == '\t' || c == '\u{0B}' || c == '\u{0C}' {
            return self.scan_whitespace(line, col);
        }
        if c == '/' && self.peek_at(1) == Some('/') {
            return self.scan_line_comment(line, col);
        }
        if c == '/' && self.peek_at(1) == Some('*') {
            return self.scan_block_comment(file, diags, line, col);
        }
        if self.hint == Hint::HeaderName && (c == '"' || c == '<') {
            return self.scan_header_name(file, diags, line, col);
        }
        if c == '"' {
            return self.scan_quoted(file, diags, line, col, TokenKind::StringLiteral, '"');
        }
        if c == '\'' {
            return self.scan_quoted(file, diags, line, col, TokenKind::CharacterConstant, '\'');
        }
        if let Some(tok) = self.try_scan_prefixed_literal(file, diags, line, col) {
            return tok;
        }
        if is_ident_start(c) || (c == '\\' && matches!(self.peek_at(1), Some('u') | Some('U'))) {
            return self.scan_identifier(file, diags, line, col);
        }
        if c.is_ascii_digit() || (c == '.' && self.peek_at(1).map(|d| d.is_ascii_digit()).unwrap_or(false)) {
            return self.scan_pp_number(file, diags, line, col);
        }
        if let Some(tok) = self.scan_punctuator(line, col) {
            return tok;
        }
        self.advance();
        Token::new(TokenKind::NonWhiteSpaceCharacter, c.to_string(), line, col)
    }

    fn scan_whitespace(&mut self, line: u32, col: u32) -> Token {
        let mut lexeme = String::new();
        while let Some(c) = self.chars.get(self.pos).copied() {
            if c == ' ' || c == '\t' || c == '\u{0B}' || c == '\u{0C}' {
                lexeme.push(c);
                self.pos += 1;
            } else {
                break;
            }
        }
        Token::new(TokenKind::WhiteSpace, lexeme, line, col)
    }

    fn scan_line_comment(&mut self, line: u32, col: u32) -> Token {
        let mut lexeme = String::new();
        while let Some(c) = self.chars.get(self.pos).copied() {
            if c == '\n' {
                break;
            }
            lexeme.push(c);
            self.pos += 1;
        }
        Token::new(TokenKind::Comment, lexeme, line, col)
    }

    fn scan_block_comment(
        &mut self,
        file: &Path,
        diags: &mut Diagnostics,
        line: u32,
        col: u32,
    ) -> Token {
        let mut lexeme = String::new();
        lexeme.push_str("/*");
        self.pos += 2;
        loop {
            match self.chars.get(self.pos).copied() {
                None => {
                    diags.push(
                        DiagLevel::Error,
                        file.to_path_buf(),
                        line,
                        col,
                        DiagKind::UnterminatedComment,
                    );
                    self.at_eof = true;
                    break;
                }
                Some('*') if self.peek_at(1) == Some('/') => {
                    lexeme.push_str("*/");
                    self.pos += 2;
                    break;
                }
                Some(c) => {
                    lexeme.push(c);
                    self.pos += 1;
                }
            }
        }
        Token::new(TokenKind::Comment, lexeme, line, col)
    }

    fn scan_header_name(
        &mut self,
        file: &Path,
        diags: &mut Diagnostics,
        line: u32,
        col: u32,
    ) -> Token {
        let closing = if self.chars[self.pos] == '"' { '"' } else { '>' };
        let mut lexeme = String::new();
        lexeme.push(self.chars[self.pos]);
        self.pos += 1;
        loop {
            match self.chars.get(self.pos).copied() {
                None | Some('\n') => {
                    diags.push(
                        DiagLevel::Error,
                        file.to_path_buf(),
                        line,
                        col,
                        DiagKind::InvalidHeaderName,
                    );
                    break;
                }
                Some(c) if c == closing => {
                    lexeme.push(c);
                    self.pos += 1;
                    break;
                }
                Some(c) => {
                    lexeme.push(c);
                    self.pos += 1;
                }
            }
        }
        self.hint = Hint::None;
        Token::new(TokenKind::HeaderName, lexeme, line, col)
    }

    fn scan_quoted(
        &mut self,
        file: &Path,
        diags: &mut Diagnostics,
        line: u32,
        col: u32,
        kind: TokenKind,
        quote: char,
    ) -> Token {
        let mut lexeme = String::new();
        lexeme.push(quote);
        self.pos += 1;
        loop {
            match self.chars.get(self.pos).copied() {
                None | Some('\n') => {
                    diags.push(
                        DiagLevel::Error,
                        file.to_path_buf(),
                        line,
                        col,
                        DiagKind::UnterminatedLiteral,
                    );
                    break;
                }
                Some('\\') => {
                    lexeme.push('\\');
                    self.pos += 1;
                    if let Some(escaped) = self.chars.get(self.pos).copied() {
                        if escaped != '\n' {
                            lexeme.push(escaped);
                            self.pos += 1;
                        }
                    }
                }
                Some(c) if c == quote => {
                    lexeme.push(c);
                    self.pos += 1;
                    break;
                }
                Some(c) => {
                    lexeme.push(c);
                    self.pos += 1;
                }
            }
        }
        Token::new(kind, lexeme, line, col)
    }

    fn try_scan_prefixed_literal(
        &mut self,
        file: &Path,
        diags: &mut Diagnostics,
        line: u32,
        col: u32,
    ) -> Option<Token> {
        for prefix in ENCODING_PREFIXES {
            let len = prefix.chars().count();
            if (0..len).all(|i| self.peek_at(i) == prefix.chars().nth(i)) {
                match self.peek_at(len) {
                    Some('"') => {
                        self.pos += len;
                        let mut tok =
                            self.scan_quoted(file, diags, line, col, TokenKind::StringLiteral, '"');
                        tok.lexeme = format!("{prefix}{}", tok.lexeme);
                        return Some(tok);
                    }
                    Some('\'') => {
                        self.pos += len;
                        let mut tok = self.scan_quoted(
                            file,
                            diags,
                            line,
                            col,
                            TokenKind::CharacterConstant,
                            '\'',
                        );
                        tok.lexeme = format!("{prefix}{}", tok.lexeme);
                        return Some(tok);
                    }
                    _ => {}
                }
            }
        }
        None
    }

    fn scan_identifier(&mut self, file: &Path, diags: &mut Diagnostics, line: u32, col: u32) -> Token {
        let mut lexeme = String::new();
        let mut at_start = true;
        loop {
            match self.chars.get(self.pos).copied() {
                Some(c) if is_ident_continue(c) => {
                    lexeme.push(c);
                    self.pos += 1;
                    at_start = false;
                }
                Some('\\') if matches!(self.peek_at(1), Some('u') | Some('U')) => {
                    match self.scan_ucn(file, diags, line, col, at_start) {
                        Some(text) => {
                            lexeme.push_str(&text);
                            at_start = false;
                        }
                        None => break,
                    }
                }
                _ => break,
            }
        }
        if lexeme.is_empty() {
            // Reached with no identifier character consumed (a stray `\` not
            // followed by a valid UCN lead-in). Advance past it so the
            // scanner always makes progress instead of re-reading the same
            // byte forever.
            if let Some(c) = self.advance() {
                return Token::new(TokenKind::NonWhiteSpaceCharacter, c.to_string(), line, col);
            }
        }
        Token::new(TokenKind::Identifier, lexeme, line, col)
    }

    /// Scans one `\uXXXX`/`\UXXXXXXXX` escape, validating its code point
    /// against D.1 (allowed in an identifier at all) and, when `at_start` is
    /// set, D.2 (disallowed as the very first character).
    fn scan_ucn(&mut self, file: &Path, diags: &mut Diagnostics, line: u32, col: u32, at_start: bool) -> Option<String> {
        let start = self.pos;
        let digits = if self.peek_at(1) == Some('u') { 4 } else { 8 };
        let mut text = String::new();
        text.push('\\');
        text.push(self.chars[self.pos + 1]);
        let hex_start = self.pos + 2;
        for i in 0..digits {
            match self.chars.get(hex_start + i) {
                Some(c) if c.is_ascii_hexdigit() => text.push(*c),
                _ => {
                    diags.push(
                        DiagLevel::Error,
                        file.to_path_buf(),
                        line,
                        col,
                        DiagKind::InvalidUcn { text: text.clone() },
                    );
                    self.pos = start + 2;
                    return None;
                }
            }
        }
        let hex = &text[2..];
        let value = u32::from_str_radix(hex, 16).ok();
        let valid = value
            .filter(|&n| is_valid_ucn_codepoint(n))
            .filter(|&n| is_ucn_allowed_in_identifier(n))
            .filter(|&n| !at_start || !is_ucn_disallowed_initially(n))
            .is_some();
        if valid {
            self.pos = hex_start + digits;
            Some(text)
        } else {
            diags.push(
                DiagLevel::Error,
                file.to_path_buf(),
                line,
                col,
                DiagKind::InvalidUcn { text },
            );
            self.pos = start + 2;
            None
        }
    }

    fn scan_pp_number(&mut self, file: &Path, diags: &mut Diagnostics, line: u32, col: u32) -> Token {
        let mut lexeme = String::new();
        lexeme.push(self.chars[self.pos]);
        self.pos += 1;
        loop {
            match self.chars.get(self.pos).copied() {
                Some(c) if c.is_ascii_digit() || is_ident_continue(c) || c == '.' => {
                    lexeme.push(c);
                    self.pos += 1;
                }
                Some(e @ ('e' | 'E' | 'p' | 'P'))
                    if matches!(self.peek_at(1), Some('+') | Some('-')) =>
                {
                    lexeme.push(e);
                    lexeme.push(self.chars[self.pos + 1]);
                    self.pos += 2;
                }
                Some('\\') if matches!(self.peek_at(1), Some('u') | Some('U')) => {
                    match self.scan_ucn(file, diags, line, col, false) {
                        Some(text) => lexeme.push_str(&text),
                        None => break,
                    }
                }
                _ => break,
            }
        }
        Token::new(TokenKind::PpNumber, lexeme, line, col)
    }

    /// Maximal-munch punctuator scan, longest candidate first; digraphs
    /// and trigraph-derived forms are normalized to their canonical
    /// punctuator spelling
    fn scan_punctuator(&mut self, line: u32, col: u32) -> Option<Token> {
        const FOUR: &[&str] = &["%:%:"];
        const THREE: &[&str] = &["<<=", ">>=", "..."];
        const TWO: &[(&str, &str)] = &[
            ("<<", "<<"),
            (">>", ">>"),
            ("<=", "<="),
            (">=", ">="),
            ("==", "=="),
            ("!=", "!="),
            ("&&", "&&"),
            ("||", "||"),
            ("++", "++"),
            ("--", "--"),
            ("->", "->"),
            ("+=", "+="),
            ("-=", "-="),
            ("*=", "*="),
            ("/=", "/="),
            ("%=", "%="),
            ("&=", "&="),
            ("^=", "^="),
            ("|=", "|="),
            ("##", "##"),
            ("<:", "["),
            (":>", "]"),
            ("<%", "{"),
            ("%>", "}"),
            ("%:", "#"),
        ];
        const ONE: &str = "[](){}.&*+-~!/%<>^|?:;=,#";

        self.mark();
        for cand in FOUR {
            if self.eats(cand) {
                return Some(Token::new(TokenKind::Punctuator, "##", line, col));
            }
        }
        self.reset();
        for cand in THREE {
            if self.eats(cand) {
                return Some(Token::new(TokenKind::Punctuator, *cand, line, col));
            }
        }
        self.reset();
        for (raw, canon) in TWO {
            if self.eats(raw) {
                return Some(Token::new(TokenKind::Punctuator, *canon, line, col));
            }
        }
        self.reset();
        if let Some(c) = self.chars.get(self.pos).copied() {
            if ONE.contains(c) {
                self.pos += 1;
                return Some(Token::new(TokenKind::Punctuator, c.to_string(), line, col));
            }
        }
        None
    }
}

/// D.1: ranges of characters a universal character name may name inside an
/// identifier.
const UCN_ALLOWED: &[(u32, u32)] = &[
    (0x00A8, 0x00A8),
    (0x00AA, 0x00AA),
    (0x00AD, 0x00AD),
    (0x00AF, 0x00AF),
    (0x00B2, 0x00B5),
    (0x00B7, 0x00BA),
    (0x00BC, 0x00BE),
    (0x00C0, 0x00D6),
    (0x00D8, 0x00F6),
    (0x00F8, 0x00FF),
    (0x0100, 0x167F),
    (0x1681, 0x180D),
    (0x180F, 0x1FFF),
    (0x200B, 0x200D),
    (0x202A, 0x202E),
    (0x203F, 0x2040),
    (0x2054, 0x2054),
    (0x2060, 0x206F),
    (0x2070, 0x218F),
    (0x2460, 0x24FF),
    (0x2776, 0x2793),
    (0x2C00, 0x2DFF),
    (0x2E80, 0x2FFF),
    (0x3004, 0x3007),
    (0x3021, 0x302F),
    (0x3031, 0x303F),
    (0x3040, 0xD7FF),
    (0xF900, 0xFD3D),
    (0xFD40, 0xFDCF),
    (0xFDF0, 0xFE44),
    (0xFE47, 0xFFFD),
    (0x10000, 0x1FFFD),
    (0x20000, 0x2FFFD),
    (0x30000, 0x3FFFD),
    (0x40000, 0x4FFFD),
    (0x50000, 0x5FFFD),
    (0x60000, 0x6FFFD),
    (0x70000, 0x7FFFD),
    (0x80000, 0x8FFFD),
    (0x90000, 0x9FFFD),
    (0xA0000, 0xAFFFD),
    (0xB0000, 0xBFFFD),
    (0xC0000, 0xCFFFD),
    (0xD0000, 0xDFFFD),
    (0xE0000, 0xEFFFD),
];

/// D.2: ranges disallowed as the *first* character of an identifier
/// (combining marks that would otherwise attach to nothing).
const UCN_INITIAL_DISALLOWED: &[(u32, u32)] = &[
    (0x0300, 0x036F),
    (0x1DC0, 0x1DFF),
    (0x20D0, 0x20FF),
    (0xFE20, 0xFE2F),
];

fn in_ranges(n: u32, ranges: &[(u32, u32)]) -> bool {
    ranges.iter().any(|&(lo, hi)| n >= lo && n <= hi)
}

fn is_ucn_allowed_in_identifier(n: u32) -> bool {
    in_ranges(n, UCN_ALLOWED)
}

fn is_ucn_disallowed_initially(n: u32) -> bool {
    in_ranges(n, UCN_INITIAL_DISALLOWED)
}

/// A UCN may not name a codepoint below 0xA0 (other than `$`, `@`, `` ` ``)
/// or a UTF-16 surrogate.
fn is_valid_ucn_codepoint(n: u32) -> bool {
    if n < 0xA0 && n != 0x24 && n != 0x40 && n != 0x60 {
        return false;
    }
    if (0xD800..=0xDFFF).contains(&n) {
        return false;
    }
    char::from_u32(n).is_some()
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn tokens(src: &str) -> Vec<Token> {
        let mut diags = Diagnostics::new();
        let mut s = Scanner::new(src, false);
        let file = PathBuf::from("t.c");
        let mut out = Vec::new();
        loop {
            let t = s.next_token(&file, &mut diags);
            let done = matches!(t.kind, TokenKind::EndOfFile);
            out.push(t);
            if done {
                break;
            }
        }
        out
    }

    #[test]
    fn scanner_totality_reaches_eof() {
        let toks = tokens("int x = 1;\n");
        assert!(matches!(toks.last().unwrap().kind, TokenKind::EndOfFile));
    }

    #[test]
    fn round_trip_concatenates_to_input() {
        let src = "#define A 1\nA + A\n";
        let toks = tokens(src);
        let joined: String = toks
            .iter()
            .filter(|t| !matches!(t.kind, TokenKind::EndOfFile))
            .map(|t| t.lexeme.as_str())
            .collect();
        assert_eq!(joined, src);
    }

    #[test]
    fn maximal_munch_prefers_longest_punctuator() {
        let toks = tokens("a <<= b\n");
        let puncts: Vec<_> = toks
            .iter()
            .filter(|t| matches!(t.kind, TokenKind::Punctuator))
            .map(|t| t.lexeme.as_str())
            .collect();
        assert_eq!(puncts, vec!["<<="]);
    }

    #[test]
    fn digraphs_normalize_to_canonical_punctuators() {
        let toks = tokens("<: :> <% %> %:\n");
        let puncts: Vec<_> = toks
            .iter()
            .filter(|t| matches!(t.kind, TokenKind::Punctuator))
            .map(|t| t.lexeme.as_str())
            .collect();
        assert_eq!(puncts, vec!["[", "]", "{", "}", "#"]);
    }

    #[test]
    fn trigraphs_substitute_before_scanning() {
        let mut diags = Diagnostics::new();
        let mut s = Scanner::new("??=define A 1\n", true);
        let file = PathBuf::from("t.c");
        let t = s.next_token(&file, &mut diags);
        assert_eq!(t.lexeme, "#");
    }

    #[test]
    fn line_splice_joins_continuation() {
        let toks = tokens("#def\\\nine A 1\n");
        let joined: String = toks
            .iter()
            .filter(|t| !matches!(t.kind, TokenKind::EndOfFile))
            .map(|t| t.lexeme.as_str())
            .collect();
        assert_eq!(joined, "#define A 1\n");
    }

    #[test]
    fn ucn_in_d1_allowed_range_extends_identifier() {
        // U+0100 (LATIN CAPITAL LETTER A WITH MACRON) is in the D.1 allowed
        // range and not in the D.2 initial-disallowed range.
        let toks = tokens("a\\u0100b\n");
        assert_eq!(toks[0].kind, TokenKind::Identifier);
        assert_eq!(toks[0].lexeme, "a\\u0100b");
    }

    #[test]
    fn stray_backslash_advances_instead_of_looping() {
        // A `\` not followed by `u`/`U` names no UCN and no identifier; the
        // scanner must still make progress (regression for an infinite loop
        // on valid-looking input).
        let toks = tokens("a \\ b\n");
        assert!(toks.len() > 2, "expected more than an immediate EOF");
        let stray = toks.iter().find(|t| t.lexeme == "\\").unwrap();
        assert_eq!(stray.kind, TokenKind::NonWhiteSpaceCharacter);
        assert!(matches!(toks.last().unwrap().kind, TokenKind::EndOfFile));
    }

    #[test]
    fn ucn_outside_d1_allowed_range_is_rejected() {
        // U+0041 ('A') is a plain ASCII codepoint, not in any D.1 range.
        let mut diags = Diagnostics::new();
        let mut s = Scanner::new("a\\u0041\n", false);
        let file = PathBuf::from("t.c");
        let t = s.next_token(&file, &mut diags);
        assert_eq!(t.kind, TokenKind::Identifier);
        assert_eq!(t.lexeme, "a");
        assert_eq!(diags.error_count, 1);
    }

    #[test]
    fn ucn_disallowed_as_initial_character() {
        // U+0300 (COMBINING GRAVE ACCENT) is D.1-allowed but D.2 forbids it
        // as an identifier's first character.
        let mut diags = Diagnostics::new();
        let mut s = Scanner::new("\\u0300x\n", false);
        let file = PathBuf::from("t.c");
        let t = s.next_token(&file, &mut diags);
        assert_eq!(t.kind, TokenKind::Identifier);
        assert_eq!(t.lexeme, "");
        assert_eq!(diags.error_count, 1);
    }

    #[test]
    fn encoding_prefixed_string_literal() {
        let toks = tokens("u8\"hi\"\n");
        assert_eq!(toks[0].kind as u8, TokenKind::StringLiteral as u8);
        assert_eq!(toks[0].lexeme, "u8\"hi\"");
    }

    #[test]
    fn header_name_only_recognized_with_hint() {
        let mut diags = Diagnostics::new();
        let mut s = Scanner::new("<stdio.h>\n", false);
        let file = PathBuf::from("t.c");
        s.set_hint(Hint::HeaderName);
        let t = s.next_token(&file, &mut diags);
        assert!(matches!(t.kind, TokenKind::HeaderName));
        assert_eq!(t.lexeme, "<stdio.h>");
    }

    #[test]
    fn unterminated_block_comment_reports_error_and_eofs() {
        let mut diags = Diagnostics::new();
        let mut s = Scanner::new("/* never closes", false);
        let file = PathBuf::from("t.c");
        let _ = s.next_token(&file, &mut diags);
        assert_eq!(diags.error_count, 1);
        let t = s.next_token(&file, &mut diags);
        assert!(matches!(t.kind, TokenKind::EndOfFile));
    }
}
