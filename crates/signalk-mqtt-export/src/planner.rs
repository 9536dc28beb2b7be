//! Subscription planning.
//!
//! Enabled rules are grouped by context so the bus sees one subscription
//! per distinct context instead of one per rule. The plan is a pure
//! function of the enabled rule list and is rebuilt from scratch on every
//! rule change.

use std::collections::HashMap;
use std::sync::Arc;

use signalk_core::ExportRule;
use signalk_protocol::{SubscribeRequest, Subscription};

/// Rules sharing one context, plus the request that subscribes them.
#[derive(Debug, Clone)]
pub struct ContextGroup {
    pub context: String,
    /// Candidate rules for deltas delivered to this group, in rule order.
    pub rules: Arc<Vec<ExportRule>>,
    pub request: SubscribeRequest,
}

/// One subscription request per context, in order of first appearance.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionPlan {
    groups: Vec<ContextGroup>,
}

impl SubscriptionPlan {
    pub fn groups(&self) -> &[ContextGroup] {
        &self.groups
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Total number of rules covered by the plan.
    pub fn rule_count(&self) -> usize {
        self.groups.iter().map(|g| g.rules.len()).sum()
    }
}

/// Build the subscription plan for a list of rules.
///
/// Disabled rules are skipped. Each `(path, period)` pair is requested
/// once per context even when several rules share it.
pub fn plan_subscriptions(rules: &[ExportRule]) -> SubscriptionPlan {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut grouped: Vec<(&str, Vec<ExportRule>)> = Vec::new();

    for rule in rules.iter().filter(|r| r.enabled) {
        let context = rule.context_or_self();
        let slot = *index.entry(context).or_insert_with(|| {
            grouped.push((context, Vec::new()));
            grouped.len() - 1
        });
        grouped[slot].1.push(rule.clone());
    }

    let groups = grouped
        .into_iter()
        .map(|(context, rules)| {
            let mut subscribe: Vec<Subscription> = Vec::with_capacity(rules.len());
            for rule in &rules {
                let sub = Subscription::new(rule.path.as_str(), rule.effective_period());
                if !subscribe.contains(&sub) {
                    subscribe.push(sub);
                }
            }

            ContextGroup {
                context: context.to_string(),
                rules: Arc::new(rules),
                request: SubscribeRequest {
                    context: context.to_string(),
                    subscribe,
                },
            }
        })
        .collect();

    SubscriptionPlan { groups }
}

#[cfg(test)]
mod tests {
    use super::*;
    use signalk_core::default_export_rules;

    #[test]
    fn test_groups_by_context_in_first_seen_order() {
        let rules = vec![
            ExportRule::new("vessels.self", "navigation*").with_id("nav", ""),
            ExportRule::new("vessels.*", "*").with_id("ais", ""),
            ExportRule::new("vessels.self", "environment.wind*").with_id("wind", ""),
        ];

        let plan = plan_subscriptions(&rules);
        assert_eq!(plan.len(), 2);

        let first = &plan.groups()[0];
        assert_eq!(first.context, "vessels.self");
        let ids: Vec<&str> = first.rules.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["nav", "wind"]);
        assert_eq!(
            first.request.subscribe,
            vec![
                Subscription::new("navigation*", 1000),
                Subscription::new("environment.wind*", 1000),
            ]
        );

        assert_eq!(plan.groups()[1].context, "vessels.*");
        assert_eq!(plan.rule_count(), 3);
    }

    #[test]
    fn test_skips_disabled_rules() {
        let rules = vec![
            ExportRule::new("vessels.self", "a").with_enabled(false),
            ExportRule::new("vessels.other", "b").with_enabled(false),
            ExportRule::new("vessels.self", "c"),
        ];

        let plan = plan_subscriptions(&rules);
        assert_eq!(plan.len(), 1);
        assert_eq!(plan.groups()[0].rules.len(), 1);
        assert_eq!(plan.groups()[0].request.subscribe[0].path, "c");
    }

    #[test]
    fn test_missing_context_defaults_to_self() {
        let mut rule = ExportRule::new("ignored", "navigation*");
        rule.context = None;
        rule.period = None;

        let plan = plan_subscriptions(&[rule]);
        assert_eq!(plan.groups()[0].context, "vessels.self");
        assert_eq!(plan.groups()[0].request.subscribe[0].period, Some(1000));
    }

    #[test]
    fn test_shared_paths_requested_once() {
        let plan = plan_subscriptions(&default_export_rules());

        let contexts: Vec<&str> = plan.groups().iter().map(|g| g.context.as_str()).collect();
        assert_eq!(contexts, vec!["vessels.self", "vessels.*", "vessels.urn:*"]);

        let own = &plan.groups()[0];
        assert_eq!(own.rules.len(), 4);
        assert_eq!(own.request.subscribe, vec![Subscription::new("*", 1000)]);
    }

    #[test]
    fn test_distinct_periods_are_kept() {
        let mut fast = ExportRule::new("vessels.self", "navigation*");
        fast.period = Some(100);
        let slow = ExportRule::new("vessels.self", "navigation*");

        let plan = plan_subscriptions(&[fast, slow]);
        assert_eq!(plan.groups()[0].request.subscribe.len(), 2);
    }

    #[test]
    fn test_no_enabled_rules_empty_plan() {
        let plan = plan_subscriptions(&[ExportRule::new("vessels.self", "*").with_enabled(false)]);
        assert!(plan.is_empty());
    }
}
