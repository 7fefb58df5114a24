//! Preprocessing token: the value type shared by every other component.
//!
//! One Rust enum carries its own lexeme directly, rather than indirecting
//! through a shared value table keyed by token type.

use std::fmt;

/// The closed set of preprocessing-token kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Null,
    HeaderName,
    Identifier,
    PpNumber,
    CharacterConstant,
    StringLiteral,
    Punctuator,
    NonWhiteSpaceCharacter,
    NewLine,
    WhiteSpace,
    Comment,
    Include,
    Define,
    Undef,
    If,
    Ifdef,
    Ifndef,
    Elif,
    Else,
    Endif,
    Error,
    Line,
    Pragma,
    /// Synthetic: produced only by the expander when a `##` concatenation
    /// of two empty arguments occurs, or a parameter with an empty
    /// argument is substituted with nothing.
    PlaceMarker,
    /// Synthetic: an identifier frozen by the hide-set discipline. Carries
    /// the original lexeme but is never looked up in the macro table again.
    NonReplacementTarget,
    EndOfFile,
}

/// A single preprocessing token: (kind, lexeme, position). Equality is
/// (kind, lexeme) only — position is metadata.
#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub line: u32,
    pub column: u32,
}

impl Token {
    pub fn new(kind: TokenKind, lexeme: impl Into<String>, line: u32, column: u32) -> Self {
        Token {
            kind,
            lexeme: lexeme.into(),
            line,
            column,
        }
    }

    /// A token carrying the given kind/lexeme at the position of `site`,
    /// used by the expander so tokens produced by expansion keep the
    /// position of the invocation site rather than the replacement list.
    pub fn at(kind: TokenKind, lexeme: impl Into<String>, site: &Token) -> Self {
        Token::new(kind, lexeme, site.line, site.column)
    }

    pub fn eof(line: u32, column: u32) -> Self {
        Token::new(TokenKind::EndOfFile, "", line, column)
    }

    pub fn is_eol(&self) -> bool {
        matches!(self.kind, TokenKind::NewLine | TokenKind::EndOfFile)
    }

    pub fn is_ws(&self) -> bool {
        matches!(self.kind, TokenKind::WhiteSpace | TokenKind::Comment)
    }

    pub fn is_ws_nl(&self) -> bool {
        matches!(
            self.kind,
            TokenKind::WhiteSpace | TokenKind::Comment | TokenKind::NewLine
        )
    }

    pub fn is_identifier_like(&self) -> bool {
        matches!(
            self.kind,
            TokenKind::Identifier | TokenKind::NonReplacementTarget
        )
    }

    /// Directive-keyword tokens the directive driver recognizes a leading
    /// identifier as, after a `#` at logical-line start.
    pub fn directive_kind_for(name: &str) -> Option<TokenKind> {
        Some(match name {
            "include" => TokenKind::Include,
            "define" => TokenKind::Define,
            "undef" => TokenKind::Undef,
            "if" => TokenKind::If,
            "ifdef" => TokenKind::Ifdef,
            "ifndef" => TokenKind::Ifndef,
            "elif" => TokenKind::Elif,
            "else" => TokenKind::Else,
            "endif" => TokenKind::Endif,
            "error" => TokenKind::Error,
            "line" => TokenKind::Line,
            "pragma" => TokenKind::Pragma,
            _ => return None,
        })
    }
}

impl PartialEq for Token {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.lexeme == other.lexeme
    }
}
impl Eq for Token {}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.lexeme)
    }
}

/// Concatenate the lexemes of a token sequence into one string.
pub fn concat_lexemes<'a, I: IntoIterator<Item = &'a Token>>(tokens: I) -> String {
    let mut out = String::new();
    for t in tokens {
        out.push_str(&t.lexeme);
    }
    out
}

/// Trims leading/trailing whitespace-or-comment-or-newline tokens and
/// collapses any interior run of them into a single `WhiteSpace` token with
/// lexeme `" "`. Shared by `#define`'s replacement-list reader and
/// macro-argument reading, both of which need the "internal whitespace
/// becomes one space" rule — newlines are included so a macro argument
/// spanning several physical lines collapses to the same shape as one
/// written on a single line.
pub fn collapse_whitespace(tokens: Vec<Token>) -> Vec<Token> {
    let mut out = Vec::with_capacity(tokens.len());
    let mut pending_ws = false;
    for t in tokens {
        if t.is_ws_nl() {
            if !out.is_empty() {
                pending_ws = true;
            }
            continue;
        }
        if pending_ws {
            out.push(Token::new(TokenKind::WhiteSpace, " ", t.line, t.column));
            pending_ws = false;
        }
        out.push(t);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_ignores_position() {
        let a = Token::new(TokenKind::Identifier, "foo", 1, 1);
        let b = Token::new(TokenKind::Identifier, "foo", 99, 7);
        assert_eq!(a, b);
    }

    #[test]
    fn eol_predicates() {
        assert!(Token::new(TokenKind::NewLine, "\n", 1, 1).is_eol());
        assert!(Token::eof(2, 1).is_eol());
        assert!(!Token::new(TokenKind::Identifier, "x", 1, 1).is_eol());
    }

    #[test]
    fn concat_roundtrips_lexemes() {
        let toks = vec![
            Token::new(TokenKind::Identifier, "foo", 1, 1),
            Token::new(TokenKind::Punctuator, "+", 1, 4),
            Token::new(TokenKind::PpNumber, "1", 1, 5),
        ];
        assert_eq!(concat_lexemes(&toks), "foo+1");
    }

    #[test]
    fn collapse_whitespace_trims_ends_and_merges_interior_runs() {
        let toks = vec![
            Token::new(TokenKind::WhiteSpace, " ", 1, 1),
            Token::new(TokenKind::Identifier, "a", 1, 2),
            Token::new(TokenKind::WhiteSpace, "  ", 1, 3),
            Token::new(TokenKind::Comment, "/* x */", 1, 5),
            Token::new(TokenKind::Identifier, "b", 1, 12),
            Token::new(TokenKind::WhiteSpace, " ", 1, 13),
        ];
        let out = collapse_whitespace(toks);
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].lexeme, "a");
        assert_eq!(out[1].kind, TokenKind::WhiteSpace);
        assert_eq!(out[1].lexeme, " ");
        assert_eq!(out[2].lexeme, "b");
    }
}
