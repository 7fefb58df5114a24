//! Constant-expression evaluator for `#if`/`#elif`.
//!
//! Implemented as precedence-climbing recursive descent over the C
//! conditional-expression grammar (ternary lowest, unary `+ - ! ~` highest),
//! which gets the same associativity as an explicit operator/value stack
//! without hand-rolling one.

use crate::diagnostics::{DiagKind, DiagLevel, Diagnostics};
use crate::macros::MacroTable;
use crate::token::{Token, TokenKind};
use std::path::Path;

/// `target_intmax_t`: the signed 32-bit type constant expressions evaluate in.
pub type TargetInt = i32;

/// Phase 1: replace `defined NAME` / `defined(NAME)` with `1`/`0` before
/// any macro expansion touches the operand.
pub fn substitute_defined(tokens: &[Token], table: &MacroTable) -> Vec<Token> {
    let mut out = Vec::with_capacity(tokens.len());
    let mut i = 0;
    while i < tokens.len() {
        let t = &tokens[i];
        if t.kind == TokenKind::Identifier && t.lexeme == "defined" {
            let mut j = i + 1;
            while j < tokens.len() && tokens[j].is_ws() {
                j += 1;
            }
            let (name, next) = if j < tokens.len() && tokens[j].kind == TokenKind::Punctuator && tokens[j].lexeme == "(" {
                let mut k = j + 1;
                while k < tokens.len() && tokens[k].is_ws() {
                    k += 1;
                }
                let name = tokens.get(k).map(|t| t.lexeme.clone());
                let mut m = k + 1;
                while m < tokens.len() && tokens[m].is_ws() {
                    m += 1;
                }
                if m < tokens.len() && tokens[m].kind == TokenKind::Punctuator && tokens[m].lexeme == ")" {
                    (name, m + 1)
                } else {
                    (None, i + 1)
                }
            } else if j < tokens.len() && tokens[j].is_identifier_like() {
                (Some(tokens[j].lexeme.clone()), j + 1)
            } else {
                (None, i + 1)
            };
            if let Some(name) = name {
                let value = if table.is_defined(&name) || table.is_predefined(&name) { "1" } else { "0" };
                out.push(Token::new(TokenKind::PpNumber, value, t.line, t.column));
                i = next;
                continue;
            }
        }
        out.push(t.clone());
        i += 1;
    }
    out
}

/// Phase 1 tail: any identifier surviving macro expansion is replaced by
/// `0`.
pub fn zero_fill_identifiers(tokens: &[Token]) -> Vec<Token> {
    tokens
        .iter()
        .filter(|t| !t.is_ws())
        .map(|t| {
            if t.is_identifier_like() {
                Token::new(TokenKind::PpNumber, "0", t.line, t.column)
            } else {
                t.clone()
            }
        })
        .collect()
}

pub fn evaluate(tokens: &[Token], file: &Path, diags: &mut Diagnostics) -> TargetInt {
    let filtered: Vec<Token> = tokens.iter().filter(|t| !t.is_ws()).cloned().collect();
    let mut p = Parser {
        tokens: filtered,
        pos: 0,
        file,
        diags,
    };
    let value = p.conditional();
    if p.pos < p.tokens.len() {
        p.error(DiagKind::MalformedExpression);
    }
    value
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    file: &'a Path,
    diags: &'a mut Diagnostics,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn error(&mut self, kind: DiagKind) {
        let (line, col) = self
            .peek()
            .map(|t| (t.line, t.column))
            .unwrap_or((0, 0));
        self.diags
            .push(DiagLevel::Error, self.file.to_path_buf(), line, col, kind);
    }

    fn conditional(&mut self) -> TargetInt {
        let cond = self.binary(0);
        if let Some(t) = self.peek() {
            if t.kind == TokenKind::Punctuator && t.lexeme == "?" {
                self.bump();
                let then_val = self.conditional();
                if let Some(colon) = self.peek() {
                    if colon.kind == TokenKind::Punctuator && colon.lexeme == ":" {
                        self.bump();
                    } else {
                        self.error(DiagKind::MalformedExpression);
                    }
                } else {
                    self.error(DiagKind::MalformedExpression);
                }
                let else_val = self.conditional();
                return if cond != 0 { then_val } else { else_val };
            }
        }
        cond
    }

    // Precedence table, low to high; index = level.
    fn level_ops(level: usize) -> &'static [&'static str] {
        match level {
            0 => &["||"],
            1 => &["&&"],
            2 => &["|"],
            3 => &["^"],
            4 => &["&"],
            5 => &["==", "!="],
            6 => &["<", ">", "<=", ">="],
            7 => &["<<", ">>"],
            8 => &["+", "-"],
            9 => &["*", "/", "%"],
            _ => &[],
        }
    }

    const MAX_LEVEL: usize = 9;

    fn binary(&mut self, level: usize) -> TargetInt {
        if level > Self::MAX_LEVEL {
            return self.unary();
        }
        let mut lhs = self.binary(level + 1);
        loop {
            let op = match self.peek() {
                Some(t) if t.kind == TokenKind::Punctuator => {
                    if Self::level_ops(level).contains(&t.lexeme.as_str()) {
                        Some(t.lexeme.clone())
                    } else {
                        None
                    }
                }
                _ => None,
            };
            let Some(op) = op else { break };
            self.bump();
            let rhs = self.binary(level + 1);
            lhs = apply_binary(&op, lhs, rhs, self.file, self.diags, self.pos_line_col());
        }
        lhs
    }

    fn pos_line_col(&self) -> (u32, u32) {
        self.tokens
            .get(self.pos.saturating_sub(1))
            .map(|t| (t.line, t.column))
            .unwrap_or((0, 0))
    }

    fn unary(&mut self) -> TargetInt {
        if let Some(t) = self.peek() {
            if t.kind == TokenKind::Punctuator
                && matches!(t.lexeme.as_str(), "+" | "-" | "!" | "~")
            {
                let op = t.lexeme.clone();
                self.bump();
                let v = self.unary();
                return match op.as_str() {
                    "+" => v,
                    "-" => v.wrapping_neg(),
                    "!" => (v == 0) as TargetInt,
                    "~" => !v,
                    _ => unreachable!(),
                };
            }
        }
        self.primary()
    }

    fn primary(&mut self) -> TargetInt {
        match self.bump() {
            Some(t) if t.kind == TokenKind::Punctuator && t.lexeme == "(" => {
                let v = self.conditional();
                match self.peek() {
                    Some(c) if c.kind == TokenKind::Punctuator && c.lexeme == ")" => {
                        self.bump();
                    }
                    _ => self.error(DiagKind::MalformedExpression),
                }
                v
            }
            Some(t) if t.kind == TokenKind::PpNumber => parse_pp_number(&t, self.file, self.diags),
            Some(t) if t.kind == TokenKind::CharacterConstant => parse_char_constant(&t),
            Some(t) => {
                let (line, col) = (t.line, t.column);
                self.diags.push(
                    DiagLevel::Error,
                    self.file.to_path_buf(),
                    line,
                    col,
                    DiagKind::NotAnInteger { text: t.lexeme.clone() },
                );
                0
            }
            None => {
                self.error(DiagKind::MalformedExpression);
                0
            }
        }
    }
}

fn apply_binary(
    op: &str,
    lhs: TargetInt,
    rhs: TargetInt,
    file: &Path,
    diags: &mut Diagnostics,
    (line, col): (u32, u32),
) -> TargetInt {
    match op {
        "||" => ((lhs != 0) || (rhs != 0)) as TargetInt,
        "&&" => ((lhs != 0) && (rhs != 0)) as TargetInt,
        "|" => lhs | rhs,
        "^" => lhs ^ rhs,
        "&" => lhs & rhs,
        "==" => (lhs == rhs) as TargetInt,
        "!=" => (lhs != rhs) as TargetInt,
        "<" => (lhs < rhs) as TargetInt,
        ">" => (lhs > rhs) as TargetInt,
        "<=" => (lhs <= rhs) as TargetInt,
        ">=" => (lhs >= rhs) as TargetInt,
        // Least-significant-bits shift semantics: mask the
        // shift amount to the bit width instead of UB on out-of-range.
        "<<" => lhs.wrapping_shl((rhs as u32) & 31),
        ">>" => lhs.wrapping_shr((rhs as u32) & 31),
        "+" => lhs.wrapping_add(rhs),
        "-" => lhs.wrapping_sub(rhs),
        "*" => lhs.wrapping_mul(rhs),
        "/" => {
            if rhs == 0 {
                diags.push(DiagLevel::Warning, file.to_path_buf(), line, col, DiagKind::DivideByZero);
                0
            } else {
                lhs.wrapping_div(rhs)
            }
        }
        "%" => {
            if rhs == 0 {
                diags.push(DiagLevel::Warning, file.to_path_buf(), line, col, DiagKind::DivideByZero);
                0
            } else {
                lhs.wrapping_rem(rhs)
            }
        }
        _ => {
            diags.push(
                DiagLevel::Error,
                file.to_path_buf(),
                line,
                col,
                DiagKind::UnknownOperator { text: op.to_string() },
            );
            0
        }
    }
}

const INTEGER_SUFFIXES: &[&str] = &[
    "u", "U", "l", "L", "ul", "uL", "Ul", "UL", "lu", "lU", "Lu", "LU", "ll", "LL", "ull", "uLL",
    "Ull", "ULL", "llu", "llU", "LLu", "LLU",
];

/// Parses a `PpNumber` lexeme as an integer: base 16 for
/// `0x`/`0X`, base 8 for a leading `0`, base 10 otherwise; a trailing
/// unsigned/long suffix is accepted and ignored.
fn parse_pp_number(t: &Token, file: &Path, diags: &mut Diagnostics) -> TargetInt {
    let text = t.lexeme.as_str();
    // Match the *longest* suffix, not the first one the list happens to name
    // (e.g. "ll"/"LL" must win over "l"/"L", or "1ll" mis-strips to "1l").
    let suffix_len = INTEGER_SUFFIXES
        .iter()
        .filter(|suffix| text.ends_with(**suffix))
        .map(|suffix| suffix.len())
        .max()
        .unwrap_or(0);
    let digits = &text[..text.len() - suffix_len];
    let (radix, digits) = if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        (16, hex)
    } else if digits.len() > 1 && digits.starts_with('0') {
        (8, digits)
    } else {
        (10, digits)
    };
    match TargetInt::from_str_radix(digits, radix).or_else(|_| u32::from_str_radix(digits, radix).map(|v| v as TargetInt)) {
        Ok(v) => v,
        Err(_) => {
            diags.push(
                DiagLevel::Error,
                file.to_path_buf(),
                t.line,
                t.column,
                DiagKind::NotAnInteger { text: t.lexeme.clone() },
            );
            0
        }
    }
}

/// A known non-conforming simplification: the numeric value
/// of a character constant in `#if` is the ASCII value of the first byte
/// after the opening quote; escape sequences are not interpreted.
fn parse_char_constant(t: &Token) -> TargetInt {
    let inner = t
        .lexeme
        .trim_start_matches(|c| c != '\'')
        .trim_start_matches('\'');
    inner.bytes().next().map(|b| b as TargetInt).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn toks(src: &[(&str, TokenKind)]) -> Vec<Token> {
        src.iter()
            .map(|(s, k)| Token::new(*k, *s, 1, 1))
            .collect()
    }

    fn eval(src: &[(&str, TokenKind)]) -> TargetInt {
        let mut diags = Diagnostics::new();
        evaluate(&toks(src), &PathBuf::from("a.c"), &mut diags)
    }

    #[test]
    fn precedence_and_parens() {
        use TokenKind::*;
        let v = eval(&[
            ("1", PpNumber),
            ("+", Punctuator),
            ("2", PpNumber),
            ("*", Punctuator),
            ("3", PpNumber),
        ]);
        assert_eq!(v, 7);
    }

    #[test]
    fn ternary_selects_branch() {
        use TokenKind::*;
        let v = eval(&[
            ("1", PpNumber),
            ("?", Punctuator),
            ("10", PpNumber),
            (":", Punctuator),
            ("20", PpNumber),
        ]);
        assert_eq!(v, 10);
    }

    #[test]
    fn divide_by_zero_yields_zero_and_warns() {
        use TokenKind::*;
        let mut diags = Diagnostics::new();
        let v = evaluate(&toks(&[("1", PpNumber), ("/", Punctuator), ("0", PpNumber)]), &PathBuf::from("a.c"), &mut diags);
        assert_eq!(v, 0);
        assert_eq!(diags.error_count, 0);
        assert_eq!(diags.entries.len(), 1);
    }

    #[test]
    fn hex_and_octal_literals() {
        use TokenKind::*;
        assert_eq!(eval(&[("0x10", PpNumber)]), 16);
        assert_eq!(eval(&[("010", PpNumber)]), 8);
        assert_eq!(eval(&[("10u", PpNumber)]), 10);
    }

    #[test]
    fn long_long_suffix_is_matched_before_single_l() {
        use TokenKind::*;
        let mut diags = Diagnostics::new();
        let v = evaluate(&toks(&[("1ll", PpNumber)]), &PathBuf::from("a.c"), &mut diags);
        assert_eq!(v, 1);
        assert_eq!(diags.error_count, 0);
        assert_eq!(eval(&[("1LL", PpNumber)]), 1);
        assert_eq!(eval(&[("1ull", PpNumber)]), 1);
    }

    #[test]
    fn defined_without_expansion() {
        let mut table = MacroTable::new();
        table.define(crate::macros::Macro::new(
            "A".into(),
            crate::macros::MacroForm::Object,
            vec![],
            false,
            vec![],
            (PathBuf::from("a.c"), 1, 1),
            false,
        ));
        let input = vec![
            Token::new(TokenKind::Identifier, "defined", 1, 1),
            Token::new(TokenKind::Punctuator, "(", 1, 1),
            Token::new(TokenKind::Identifier, "A", 1, 1),
            Token::new(TokenKind::Punctuator, ")", 1, 1),
        ];
        let out = substitute_defined(&input, &table);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].lexeme, "1");
    }
}
