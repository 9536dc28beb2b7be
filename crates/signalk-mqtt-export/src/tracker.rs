//! Change detection for `sendOnChange` rules.

use std::collections::HashMap;

use signalk_core::value_text;

/// Last published value per `(context, path)`.
///
/// The slot is keyed by context and path, not by rule, so two rules that
/// export the same path share it. Only `sendOnChange` rules create slots.
#[derive(Debug, Default)]
pub struct ChangeTracker {
    last_sent: HashMap<(String, String), String>,
}

impl ChangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide whether a value should be published, recording it if so.
    ///
    /// Values are compared by their text form (see [`value_text`]); the
    /// first observation of a slot always publishes.
    pub fn should_publish(
        &mut self,
        context: &str,
        path: &str,
        value: &serde_json::Value,
        send_on_change: bool,
    ) -> bool {
        if !send_on_change {
            return true;
        }

        let current = value_text(value);
        let key = (context.to_string(), path.to_string());
        match self.last_sent.get(&key) {
            Some(last) if *last == current => false,
            _ => {
                self.last_sent.insert(key, current);
                true
            }
        }
    }

    /// Forget every recorded value.
    pub fn reset(&mut self) {
        self.last_sent.clear();
    }

    pub fn len(&self) -> usize {
        self.last_sent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_sent.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_suppresses_repeated_value() {
        let mut tracker = ChangeTracker::new();
        let sog = "navigation.speedOverGround";

        assert!(tracker.should_publish("vessels.self", sog, &json!(3.5), true));
        assert!(!tracker.should_publish("vessels.self", sog, &json!(3.5), true));
        assert!(tracker.should_publish("vessels.self", sog, &json!(3.6), true));
        assert!(!tracker.should_publish("vessels.self", sog, &json!(3.6), true));
    }

    #[test]
    fn test_pass_through_keeps_no_state() {
        let mut tracker = ChangeTracker::new();

        assert!(tracker.should_publish("vessels.self", "a", &json!(1), false));
        assert!(tracker.should_publish("vessels.self", "a", &json!(1), false));
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_slots_are_per_context_and_path() {
        let mut tracker = ChangeTracker::new();

        assert!(tracker.should_publish("vessels.self", "a", &json!(1), true));
        assert!(tracker.should_publish("vessels.other", "a", &json!(1), true));
        assert!(tracker.should_publish("vessels.self", "b", &json!(1), true));
        assert_eq!(tracker.len(), 3);
    }

    #[test]
    fn test_objects_compare_by_content() {
        let mut tracker = ChangeTracker::new();
        let pos = json!({"latitude": 52.1, "longitude": 4.9});
        let same = json!({"longitude": 4.9, "latitude": 52.1});

        assert!(tracker.should_publish("vessels.self", "navigation.position", &pos, true));
        assert!(!tracker.should_publish("vessels.self", "navigation.position", &same, true));
    }

    #[test]
    fn test_string_and_number_with_same_text_are_equal() {
        let mut tracker = ChangeTracker::new();

        assert!(tracker.should_publish("vessels.self", "a", &json!(42), true));
        assert!(!tracker.should_publish("vessels.self", "a", &json!("42"), true));
    }

    #[test]
    fn test_whole_float_equals_integer() {
        let mut tracker = ChangeTracker::new();

        assert!(tracker.should_publish("vessels.self", "a", &json!(2), true));
        assert!(!tracker.should_publish("vessels.self", "a", &json!(2.0), true));
    }

    #[test]
    fn test_reset_forgets_values() {
        let mut tracker = ChangeTracker::new();
        assert!(tracker.should_publish("vessels.self", "a", &json!(1), true));

        tracker.reset();
        assert!(tracker.is_empty());
        assert!(tracker.should_publish("vessels.self", "a", &json!(1), true));
    }
}
