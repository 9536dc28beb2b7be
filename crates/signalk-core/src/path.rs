//! SignalK path selectors used by export rules.
//!
//! SignalK paths are dot-separated strings like "navigation.speedOverGround".
//! Export rules select paths with a deliberately small syntax:
//!
//! - `*` alone matches every path
//! - a trailing `*` matches by plain string prefix ("navigation*" matches
//!   "navigation.speedOverGround" and also "navigationLights")
//! - anything else must match exactly
//!
//! Prefix matching is character based, not segment based, so operators can
//! write either "navigation.*" or "navigation*".

/// A compiled path selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSelector {
    /// `*` - every path.
    All,
    /// `prefix*` - any path starting with `prefix`.
    Prefix(String),
    /// Exact path.
    Exact(String),
}

impl PathSelector {
    /// Compile a selector from its rule text.
    pub fn new(selector: &str) -> Self {
        if selector == "*" {
            PathSelector::All
        } else if let Some(prefix) = selector.strip_suffix('*') {
            PathSelector::Prefix(prefix.to_string())
        } else {
            PathSelector::Exact(selector.to_string())
        }
    }

    /// Check if a path is selected.
    pub fn matches(&self, path: &str) -> bool {
        match self {
            PathSelector::All => true,
            PathSelector::Exact(exact) => exact == path,
            PathSelector::Prefix(prefix) => path.starts_with(prefix.as_str()),
        }
    }
}

impl From<&str> for PathSelector {
    fn from(s: &str) -> Self {
        PathSelector::new(s)
    }
}

/// Match a rule path against an update path without compiling a selector.
pub fn path_matches(selector: &str, path: &str) -> bool {
    if selector == "*" || selector == path {
        return true;
    }
    match selector.strip_suffix('*') {
        Some(prefix) => path.starts_with(prefix),
        None => false,
    }
}
