//! Composable element predicates.
//!
//! [`Selector`] is a tagged set of leaf predicates (role, name, title,
//! value, state) plus the boolean combinators `And`, `Or` and `Not`, and an
//! escape hatch for arbitrary closures.  Every variant is pure, so one
//! selector can be shared across concurrent walks.
//!
//! [`SelectorSpec`] is the serde form of the value variants, used where a
//! selector crosses a language boundary as JSON.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::element::Element;
use crate::role::Role;

/// Boxed user predicate.
pub type Predicate = Arc<dyn Fn(&Element) -> bool + Send + Sync>;

/// A predicate over [`Element`]s.
#[derive(Clone)]
pub enum Selector {
    Role(Role),
    /// Exact, case-sensitive name.
    Name(String),
    /// ASCII-case-insensitive substring of the name.
    NameContains(String),
    Title(String),
    TitleContains(String),
    Value(String),
    Enabled,
    Focused,
    /// Conjunction; empty matches everything.
    And(Vec<Selector>),
    /// Disjunction; empty matches nothing.
    Or(Vec<Selector>),
    Not(Box<Selector>),
    Predicate(Predicate),
}

impl Selector {
    pub fn by_role(role: Role) -> Self {
        Selector::Role(role)
    }

    pub fn by_name(name: impl Into<String>) -> Self {
        Selector::Name(name.into())
    }

    pub fn by_name_contains(fragment: impl Into<String>) -> Self {
        Selector::NameContains(fragment.into())
    }

    pub fn by_title(title: impl Into<String>) -> Self {
        Selector::Title(title.into())
    }

    pub fn by_title_contains(fragment: impl Into<String>) -> Self {
        Selector::TitleContains(fragment.into())
    }

    pub fn by_value(value: impl Into<String>) -> Self {
        Selector::Value(value.into())
    }

    pub fn by_enabled() -> Self {
        Selector::Enabled
    }

    pub fn by_focused() -> Self {
        Selector::Focused
    }

    pub fn and(selectors: impl IntoIterator<Item = Selector>) -> Self {
        Selector::And(selectors.into_iter().collect())
    }

    pub fn or(selectors: impl IntoIterator<Item = Selector>) -> Self {
        Selector::Or(selectors.into_iter().collect())
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(selector: Selector) -> Self {
        Selector::Not(Box::new(selector))
    }

    pub fn by_predicate<F>(f: F) -> Self
    where
        F: Fn(&Element) -> bool + Send + Sync + 'static,
    {
        Selector::Predicate(Arc::new(f))
    }

    /// Evaluate against one element.  `And` stops at the first `false`,
    /// `Or` at the first `true`.
    pub fn matches(&self, e: &Element) -> bool {
        match self {
            Selector::Role(role) => e.role() == *role,
            Selector::Name(name) => e.name() == name,
            Selector::NameContains(fragment) => contains_ignore_ascii_case(e.name(), fragment),
            Selector::Title(title) => e.title() == title,
            Selector::TitleContains(fragment) => contains_ignore_ascii_case(e.title(), fragment),
            Selector::Value(value) => e.value() == value,
            Selector::Enabled => e.is_enabled(),
            Selector::Focused => e.is_focused(),
            Selector::And(all) => all.iter().all(|s| s.matches(e)),
            Selector::Or(any) => any.iter().any(|s| s.matches(e)),
            Selector::Not(inner) => !inner.matches(e),
            Selector::Predicate(f) => f(e),
        }
    }
}

fn contains_ignore_ascii_case(haystack: &str, needle: &str) -> bool {
    haystack
        .to_ascii_lowercase()
        .contains(&needle.to_ascii_lowercase())
}

impl fmt::Debug for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::Role(r) => write!(f, "Role({r})"),
            Selector::Name(s) => write!(f, "Name({s:?})"),
            Selector::NameContains(s) => write!(f, "NameContains({s:?})"),
            Selector::Title(s) => write!(f, "Title({s:?})"),
            Selector::TitleContains(s) => write!(f, "TitleContains({s:?})"),
            Selector::Value(s) => write!(f, "Value({s:?})"),
            Selector::Enabled => f.write_str("Enabled"),
            Selector::Focused => f.write_str("Focused"),
            Selector::And(all) => f.debug_tuple("And").field(all).finish(),
            Selector::Or(any) => f.debug_tuple("Or").field(any).finish(),
            Selector::Not(inner) => f.debug_tuple("Not").field(inner).finish(),
            Selector::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

// ---------------------------------------------------------------------------
// Serializable form
// ---------------------------------------------------------------------------

/// JSON-friendly mirror of the value variants of [`Selector`].
///
/// ```json
/// {"and": [{"role": "Button"}, {"name_contains": "save"}, "enabled"]}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectorSpec {
    Role(Role),
    Name(String),
    NameContains(String),
    Title(String),
    TitleContains(String),
    Value(String),
    Enabled,
    Focused,
    And(Vec<SelectorSpec>),
    Or(Vec<SelectorSpec>),
    Not(Box<SelectorSpec>),
}

impl From<SelectorSpec> for Selector {
    fn from(spec: SelectorSpec) -> Self {
        match spec {
            SelectorSpec::Role(r) => Selector::Role(r),
            SelectorSpec::Name(s) => Selector::Name(s),
            SelectorSpec::NameContains(s) => Selector::NameContains(s),
            SelectorSpec::Title(s) => Selector::Title(s),
            SelectorSpec::TitleContains(s) => Selector::TitleContains(s),
            SelectorSpec::Value(s) => Selector::Value(s),
            SelectorSpec::Enabled => Selector::Enabled,
            SelectorSpec::Focused => Selector::Focused,
            SelectorSpec::And(all) => Selector::And(all.into_iter().map(Selector::from).collect()),
            SelectorSpec::Or(any) => Selector::Or(any.into_iter().map(Selector::from).collect()),
            SelectorSpec::Not(inner) => Selector::Not(Box::new(Selector::from(*inner))),
        }
    }
}
