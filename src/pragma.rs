//! Shared `#pragma` handling: reached both from the directive driver's
//! `#pragma` line and the expander's `_Pragma` operator, since both reduce
//! to "the same pragma tokens, read from different sources". `STDC`
//! pragmas no-op; anything else is ignored with an informational diagnostic.

use crate::diagnostics::{DiagKind, DiagLevel, Diagnostics};
use crate::token::{concat_lexemes, Token};
use std::path::Path;

/// Executes one pragma's token sequence (the tokens after `pragma`, or the
/// destringized operand of `_Pragma`, with surrounding whitespace already
/// collapsed). This crate recognizes no pragmas beyond the standard `STDC`
/// namespace, which it silently accepts without effect.
pub fn execute_pragma(tokens: &[Token], site: &Token, file: &Path, diags: &mut Diagnostics) {
    if tokens.is_empty() {
        return;
    }
    if tokens[0].lexeme == "STDC" {
        return;
    }
    let text = concat_lexemes(tokens);
    diags.push(
        DiagLevel::Info,
        file.to_path_buf(),
        site.line,
        site.column,
        DiagKind::UnrecognizedPragma { text },
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::TokenKind;
    use std::path::PathBuf;

    fn tok(kind: TokenKind, lexeme: &str) -> Token {
        Token::new(kind, lexeme, 1, 1)
    }

    #[test]
    fn stdc_namespace_is_silently_accepted() {
        let mut diags = Diagnostics::new();
        let toks = vec![tok(TokenKind::Identifier, "STDC"), tok(TokenKind::Identifier, "FP_CONTRACT")];
        execute_pragma(&toks, &toks[0].clone(), &PathBuf::from("a.c"), &mut diags);
        assert!(diags.entries.is_empty());
    }

    #[test]
    fn unrecognized_pragma_is_noted_not_errored() {
        let mut diags = Diagnostics::new();
        let toks = vec![tok(TokenKind::Identifier, "once")];
        execute_pragma(&toks, &toks[0].clone(), &PathBuf::from("a.c"), &mut diags);
        assert_eq!(diags.entries.len(), 1);
        assert_eq!(diags.entries[0].level, DiagLevel::Info);
        assert_eq!(diags.error_count, 0);
    }
}
