//! The active export rule list.

use std::sync::Arc;

use signalk_core::ExportRule;

/// Ordered list of export rules.
///
/// The list is replaced wholesale, never patched. Readers hold an `Arc`
/// snapshot, so a replacement can never be observed half done.
#[derive(Debug, Clone, Default)]
pub struct RuleStore {
    rules: Arc<Vec<ExportRule>>,
}

impl RuleStore {
    pub fn new(rules: Vec<ExportRule>) -> Self {
        Self {
            rules: Arc::new(rules),
        }
    }

    /// Install a new rule list.
    pub fn replace_all(&mut self, rules: Vec<ExportRule>) {
        self.rules = Arc::new(rules);
    }

    /// Snapshot of every rule, enabled or not.
    pub fn all(&self) -> Arc<Vec<ExportRule>> {
        Arc::clone(&self.rules)
    }

    /// Enabled rules in their configured order.
    pub fn enabled_rules(&self) -> Vec<ExportRule> {
        self.rules.iter().filter(|r| r.enabled).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
