//! Rule matching.
//!
//! Rules are evaluated in list order and the first rule that accepts a
//! value wins, even when a later rule is more specific. Operators express
//! priority by ordering rules.

use signalk_core::{ExportRule, PathValue};

/// Find the first rule accepting a value.
///
/// A rule accepts a value when, checked in this order:
/// 1. it is enabled,
/// 2. its path selector matches the value path,
/// 3. its source filter is blank or equals `update_source`,
/// 4. no excluded MMSI fragment occurs in `delta_context`.
///
/// `delta_context` is the raw context of the delta; a delta without one
/// skips the exclusion check.
pub fn find_matching_rule<'a>(
    rules: &'a [ExportRule],
    value: &PathValue,
    delta_context: Option<&str>,
    update_source: Option<&str>,
) -> Option<&'a ExportRule> {
    rules.iter().find(|rule| {
        rule.enabled
            && rule.matches_path(&value.path)
            && source_matches(rule, update_source)
            && !is_excluded(rule, delta_context)
    })
}

fn source_matches(rule: &ExportRule, update_source: Option<&str>) -> bool {
    match rule.source_filter() {
        None => true,
        Some(source) => update_source == Some(source),
    }
}

/// Substring test on the raw context; "368396230" also excludes a context
/// that merely contains those digits.
fn is_excluded(rule: &ExportRule, delta_context: Option<&str>) -> bool {
    let Some(context) = delta_context else {
        return false;
    };
    rule.excluded_mmsis()
        .iter()
        .any(|mmsi| context.contains(mmsi))
}
