//! Macro storage: the name → definition table, with provenance and a
//! precomputed `ExpansionMethod` tag for the expander's fast path.

use crate::token::{Token, TokenKind};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

pub const VARIADIC_SENTINEL: &str = "...";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacroForm {
    Object,
    Function,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpansionMethod {
    /// Replacement list has no identifier, `#`, or `##` — emit verbatim,
    /// no rescan.
    DirectlyCopyable,
    Normal,
    /// The built-in `_Pragma` operator.
    OpPragma,
}

#[derive(Debug, Clone)]
pub struct Macro {
    pub name: String,
    pub form: MacroForm,
    pub params: Vec<String>,
    pub has_variadic: bool,
    pub replacement: Vec<Token>,
    pub defined_at: (PathBuf, u32, u32),
    pub predefined: bool,
    pub method: ExpansionMethod,
}

impl Macro {
    pub fn new(
        name: String,
        form: MacroForm,
        params: Vec<String>,
        has_variadic: bool,
        replacement: Vec<Token>,
        defined_at: (PathBuf, u32, u32),
        predefined: bool,
    ) -> Self {
        let method = if name == "_Pragma" {
            ExpansionMethod::OpPragma
        } else if replacement.iter().any(|t| {
            t.is_identifier_like()
                || (t.kind == TokenKind::Punctuator && (t.lexeme == "#" || t.lexeme == "##"))
        }) {
            ExpansionMethod::Normal
        } else {
            ExpansionMethod::DirectlyCopyable
        };
        Macro {
            name,
            form,
            params,
            has_variadic,
            replacement,
            defined_at,
            predefined,
            method,
        }
    }

    /// Number of named (non-variadic) parameters: `params.len()` minus one
    /// when the trailing entry is the variadic sentinel.
    pub fn named_param_count(&self) -> usize {
        if self.has_variadic {
            self.params.len().saturating_sub(1)
        } else {
            self.params.len()
        }
    }

    /// Index of `name` among the named parameters, or `None` if `name`
    /// isn't one (including when it's the variadic sentinel itself).
    pub fn param_index(&self, name: &str) -> Option<usize> {
        self.params[..self.named_param_count()]
            .iter()
            .position(|p| p == name)
    }

    /// Token-wise equality of form/params/replacement, used by redefinition
    /// checking.
    pub fn compatible_with(&self, other: &Macro) -> bool {
        self.form == other.form
            && self.has_variadic == other.has_variadic
            && self.params == other.params
            && self.replacement.len() == other.replacement.len()
            && self
                .replacement
                .iter()
                .zip(other.replacement.iter())
                .all(|(a, b)| a == b)
    }
}

pub fn is_predefined_name(name: &str) -> bool {
    PREDEFINED_NAMES.contains(&name)
}

pub const PREDEFINED_NAMES: &[&str] = &[
    "__DATE__",
    "__TIME__",
    "__FILE__",
    "__LINE__",
    "__STDC__",
    "__STDC_HOSTED__",
    "__STDC_VERSION__",
    "__STDC_NO_ATOMICS__",
    "__STDC_NO_COMPLEX__",
    "__STDC_NO_THREADS__",
    "__STDC_NO_VLA__",
];

pub fn is_reserved_name(name: &str) -> bool {
    name == "defined" || name == "_Pragma" || name == "__VA_ARGS__" || name == "__VA_OPT__"
}

#[derive(Debug, Default)]
pub struct MacroTable {
    definitions: HashMap<String, Macro>,
    predefined_set: HashSet<&'static str>,
}

impl MacroTable {
    pub fn new() -> Self {
        MacroTable {
            definitions: HashMap::new(),
            predefined_set: PREDEFINED_NAMES.iter().copied().collect(),
        }
    }

    pub fn is_predefined(&self, name: &str) -> bool {
        self.predefined_set.contains(name)
    }

    pub fn get(&self, name: &str) -> Option<&Macro> {
        self.definitions.get(name)
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.definitions.contains_key(name)
    }

    /// Inserts or replaces a macro. Returns `Some(previous)` when the
    /// redefinition was incompatible and a warning should be raised by the
    /// caller (which has the diagnostic position).
    pub fn define(&mut self, new_macro: Macro) -> DefineOutcome {
        if let Some(existing) = self.definitions.get(&new_macro.name) {
            if existing.compatible_with(&new_macro) {
                self.definitions.insert(new_macro.name.clone(), new_macro);
                return DefineOutcome::IdenticalRedefinition;
            }
            let old = existing.clone();
            self.definitions.insert(new_macro.name.clone(), new_macro);
            return DefineOutcome::IncompatibleRedefinition(old);
        }
        self.definitions.insert(new_macro.name.clone(), new_macro);
        DefineOutcome::New
    }

    pub fn undef(&mut self, name: &str) -> bool {
        self.definitions.remove(name).is_some()
    }

    /// Installs or refreshes a predefined object-like macro, bypassing the
    /// compatibility check `define` applies to user macros. Used once at
    /// startup for `__STDC__` and friends, and on every source line for
    /// `__FILE__`/`__LINE__`, which need to be re-materialized at each
    /// lookup rather than fixed at definition time.
    pub fn set_predefined_value(&mut self, name: &str, replacement: Vec<Token>) {
        let defined_at = self
            .definitions
            .get(name)
            .map(|m| m.defined_at.clone())
            .unwrap_or_else(|| (PathBuf::from("<built-in>"), 0, 0));
        let m = Macro::new(
            name.to_string(),
            MacroForm::Object,
            vec![],
            false,
            replacement,
            defined_at,
            true,
        );
        self.definitions.insert(name.to_string(), m);
    }
}

pub enum DefineOutcome {
    New,
    IdenticalRedefinition,
    IncompatibleRedefinition(Macro),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::TokenKind;

    fn tok(kind: TokenKind, lexeme: &str) -> Token {
        Token::new(kind, lexeme, 1, 1)
    }

    #[test]
    fn directly_copyable_when_no_identifiers_or_operators() {
        let m = Macro::new(
            "FORTY_TWO".into(),
            MacroForm::Object,
            vec![],
            false,
            vec![tok(TokenKind::PpNumber, "42")],
            (PathBuf::from("a.c"), 1, 1),
            false,
        );
        assert_eq!(m.method, ExpansionMethod::DirectlyCopyable);
    }

    #[test]
    fn normal_when_body_has_identifier() {
        let m = Macro::new(
            "A".into(),
            MacroForm::Object,
            vec![],
            false,
            vec![tok(TokenKind::Identifier, "B")],
            (PathBuf::from("a.c"), 1, 1),
            false,
        );
        assert_eq!(m.method, ExpansionMethod::Normal);
    }

    #[test]
    fn redefinition_with_identical_body_is_allowed() {
        let mut table = MacroTable::new();
        let make = || {
            Macro::new(
                "A".into(),
                MacroForm::Object,
                vec![],
                false,
                vec![tok(TokenKind::PpNumber, "1")],
                (PathBuf::from("a.c"), 1, 1),
                false,
            )
        };
        table.define(make());
        assert!(matches!(table.define(make()), DefineOutcome::IdenticalRedefinition));
    }

    #[test]
    fn param_index_excludes_variadic_sentinel() {
        let m = Macro::new(
            "LOG".into(),
            MacroForm::Function,
            vec!["fmt".into(), VARIADIC_SENTINEL.into()],
            true,
            vec![],
            (PathBuf::from("a.c"), 1, 1),
            false,
        );
        assert_eq!(m.param_index("fmt"), Some(0));
        assert_eq!(m.param_index(VARIADIC_SENTINEL), None);
        assert_eq!(m.named_param_count(), 1);
    }

    #[test]
    fn redefinition_with_different_body_is_flagged() {
        let mut table = MacroTable::new();
        table.define(Macro::new(
            "A".into(),
            MacroForm::Object,
            vec![],
            false,
            vec![tok(TokenKind::PpNumber, "1")],
            (PathBuf::from("a.c"), 1, 1),
            false,
        ));
        let outcome = table.define(Macro::new(
            "A".into(),
            MacroForm::Object,
            vec![],
            false,
            vec![tok(TokenKind::PpNumber, "2")],
            (PathBuf::from("a.c"), 2, 1),
            false,
        ));
        assert!(matches!(outcome, DefineOutcome::IncompatibleRedefinition(_)));
    }
}
