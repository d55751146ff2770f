//! Deterministic, filesystem-safe identifiers derived from names and titles.

use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

fn non_word() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^A-Za-z0-9]+").expect("static regex"))
}

/// Collapse every run of non-alphanumeric characters to `_`, then lowercase.
/// No collision detection: "Tacos!" and "Tacos?" both become `tacos_`.
#[inline]
pub fn normalize(s: &str) -> String {
    non_word().replace_all(s, "_").to_lowercase()
}

/// Key of a stored category, `category:<normalized-name>`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CategoryKey(String);

/// Key of a stored knowledge-base section, `section:<normalized-title>`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SectionKey(String);

impl CategoryKey {
    pub const PREFIX: &'static str = "category:";

    pub fn from_name(name: &str) -> Self {
        Self(normalize(name))
    }
    /// Full key, e.g. `category:tacos_`.
    pub fn as_key(&self) -> String {
        format!("{}{}", Self::PREFIX, self.0)
    }
    /// Normalized id used for file and directory names.
    pub fn id(&self) -> &str {
        &self.0
    }
}

impl SectionKey {
    pub const PREFIX: &'static str = "section:";

    pub fn from_title(title: &str) -> Self {
        Self(normalize(title))
    }
    pub fn as_key(&self) -> String {
        format!("{}{}", Self::PREFIX, self.0)
    }
    pub fn id(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CategoryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", Self::PREFIX, self.0)
    }
}

impl fmt::Display for SectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", Self::PREFIX, self.0)
    }
}
