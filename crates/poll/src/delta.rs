//! Delta detection between successive payloads of one session
//!
//! List-shaped payloads (a bare JSON array, or an object carrying the array
//! under [`DeltaConfig::list_field`]) are matched item by item on
//! [`DeltaConfig::id_field`]. Everything else, including lists with items that
//! carry no id, falls back to structural equality.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::Instant;
use tracing::trace;

use crate::error::{ConfigError, ConfigResult};

/// Field names the detector relies on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeltaConfig {
    /// Stable identifier of a list item
    pub id_field: String,
    /// Field whose change marks an item as updated
    pub status_field: String,
    /// Object field holding the list, for enveloped payloads
    pub list_field: Option<String>,
}

impl Default for DeltaConfig {
    fn default() -> Self {
        Self {
            id_field: "id".to_string(),
            status_field: "status".to_string(),
            list_field: Some("data".to_string()),
        }
    }
}

impl DeltaConfig {
    /// Validate field names.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.id_field.is_empty() {
            return Err(ConfigError::new("delta.id_field", "cannot be empty"));
        }
        if self.status_field.is_empty() {
            return Err(ConfigError::new("delta.status_field", "cannot be empty"));
        }
        Ok(())
    }
}

/// Classified difference between two payloads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Delta {
    /// Items only present in the new payload
    pub added: Vec<Value>,
    /// Items only present in the old payload
    pub removed: Vec<Value>,
    /// Items present in both whose status changed (new version)
    pub updated: Vec<Value>,
    /// Whether anything changed at all
    pub has_changes: bool,
}

/// Compares successive payloads.
#[derive(Debug, Clone, Default)]
pub struct DeltaDetector {
    config: DeltaConfig,
}

impl DeltaDetector {
    /// Create a detector with the given field names.
    #[must_use]
    pub const fn new(config: DeltaConfig) -> Self {
        Self { config }
    }

    /// Diff `previous` against `next` for the session `key`.
    #[must_use]
    pub fn diff(&self, key: &str, previous: &Value, next: &Value) -> Delta {
        let delta = match (self.items(previous), self.items(next)) {
            (Some(before), Some(after)) => self.diff_lists(before, after),
            _ => Delta {
                has_changes: previous != next,
                ..Delta::default()
            },
        };

        trace!(
            key,
            added = delta.added.len(),
            removed = delta.removed.len(),
            updated = delta.updated.len(),
            changed = delta.has_changes,
            "payload diff"
        );
        delta
    }

    fn items<'a>(&self, payload: &'a Value) -> Option<&'a [Value]> {
        match payload {
            Value::Array(items) => Some(items.as_slice()),
            Value::Object(map) => self
                .config
                .list_field
                .as_deref()
                .and_then(|field| map.get(field))
                .and_then(Value::as_array)
                .map(Vec::as_slice),
            _ => None,
        }
    }

    fn identity(&self, item: &Value) -> Option<String> {
        item.get(&self.config.id_field)
            .filter(|id| !id.is_null())
            .map(Value::to_string)
    }

    fn diff_lists(&self, before: &[Value], after: &[Value]) -> Delta {
        let index = |items: &[Value]| -> HashMap<String, usize> {
            items
                .iter()
                .enumerate()
                .filter_map(|(pos, item)| self.identity(item).map(|id| (id, pos)))
                .collect()
        };
        let old_index = index(before);
        let new_index = index(after);

        let mut delta = Delta::default();
        for item in after {
            let Some(id) = self.identity(item) else {
                continue;
            };
            match old_index.get(&id) {
                None => delta.added.push(item.clone()),
                Some(&pos) => {
                    let status = &self.config.status_field;
                    if before[pos].get(status) != item.get(status) {
                        delta.updated.push(item.clone());
                    }
                }
            }
        }
        for item in before {
            if let Some(id) = self.identity(item)
                && !new_index.contains_key(&id)
            {
                delta.removed.push(item.clone());
            }
        }

        // Items without an id cannot be matched, so any edit to them only shows
        // up structurally.
        let unmatched = before.len() != old_index.len() || after.len() != new_index.len();
        delta.has_changes = !delta.added.is_empty()
            || !delta.removed.is_empty()
            || !delta.updated.is_empty()
            || (unmatched && before != after);
        delta
    }
}

/// A detected change between two successive payloads, used to drive UI animation.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionRecord {
    /// Session key
    pub key: String,
    /// Payload before the change
    pub previous: Value,
    /// Payload after the change
    pub next: Value,
    /// Classified difference
    pub delta: Delta,
    /// When the change was observed
    pub started_at: Instant,
}

impl TransitionRecord {
    /// Animation progress in `[0, 1]` at `now`.
    #[must_use]
    pub fn progress(&self, now: Instant, window: Duration) -> f64 {
        if window.is_zero() {
            return 1.0;
        }
        let elapsed = now.saturating_duration_since(self.started_at);
        (elapsed.as_secs_f64() / window.as_secs_f64()).min(1.0)
    }

    /// Whether the animation window has passed.
    #[must_use]
    pub fn is_expired(&self, now: Instant, window: Duration) -> bool {
        now.saturating_duration_since(self.started_at) >= window
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn detector() -> DeltaDetector {
        DeltaDetector::default()
    }

    #[test]
    fn classifies_added_and_updated_orders() {
        let previous = json!([{"id": 1, "status": "pending"}]);
        let next = json!([
            {"id": 1, "status": "accepted"},
            {"id": 2, "status": "pending"}
        ]);

        let delta = detector().diff("cashier-orders", &previous, &next);

        assert_eq!(delta.added, vec![json!({"id": 2, "status": "pending"})]);
        assert_eq!(delta.updated, vec![json!({"id": 1, "status": "accepted"})]);
        assert!(delta.removed.is_empty());
        assert!(delta.has_changes);
    }

    #[test]
    fn detects_removed_orders_in_envelope() {
        let previous = json!({"success": true, "data": [
            {"id": 7, "status": "ready"},
            {"id": 8, "status": "brewing"}
        ]});
        let next = json!({"success": true, "data": [{"id": 8, "status": "brewing"}]});

        let delta = detector().diff("barista-queue", &previous, &next);

        assert_eq!(delta.removed, vec![json!({"id": 7, "status": "ready"})]);
        assert!(delta.added.is_empty());
        assert!(delta.updated.is_empty());
        assert!(delta.has_changes);
    }

    #[test]
    fn non_status_edits_are_not_updates() {
        let previous = json!([{"id": 1, "status": "pending", "note": "oat milk"}]);
        let next = json!([{"id": 1, "status": "pending", "note": "soy milk"}]);

        let delta = detector().diff("k", &previous, &next);
        assert!(!delta.has_changes);
    }

    #[test]
    fn generic_payloads_use_structural_equality() {
        let detector = detector();
        let a = json!({"open": true, "queue": 3});
        let b = json!({"open": true, "queue": 4});

        assert!(!detector.diff("status", &a, &a.clone()).has_changes);
        let delta = detector.diff("status", &a, &b);
        assert!(delta.has_changes);
        assert!(delta.added.is_empty() && delta.updated.is_empty());
    }

    #[test]
    fn custom_fields_are_honoured() {
        let detector = DeltaDetector::new(DeltaConfig {
            id_field: "order_no".to_string(),
            status_field: "state".to_string(),
            list_field: Some("orders".to_string()),
        });
        let previous = json!({"orders": [{"order_no": "A1", "state": "new"}]});
        let next = json!({"orders": [{"order_no": "A1", "state": "done"}]});

        let delta = detector.diff("k", &previous, &next);
        assert_eq!(delta.updated.len(), 1);
    }

    #[test]
    fn items_without_identity_compare_structurally() {
        let detector = detector();
        let previous = json!([{"status": "pending"}]);
        let next = json!([{"status": "accepted"}]);

        let delta = detector.diff("k", &previous, &next);
        assert!(delta.has_changes);
        assert!(delta.added.is_empty() && delta.removed.is_empty() && delta.updated.is_empty());
        assert!(!detector.diff("k", &previous, &previous.clone()).has_changes);
    }

    #[test]
    fn scalar_lists_compare_structurally() {
        let previous = json!(["pending", "pending"]);
        let next = json!(["pending", "accepted", "ready"]);

        assert!(detector().diff("k", &previous, &next).has_changes);
    }

    #[test]
    fn envelope_with_foreign_id_field_still_changes() {
        let previous = json!({"data": [{"order_no": 1, "status": "pending"}]});
        let next = json!({"data": [{"order_no": 1, "status": "accepted"}]});

        assert!(detector().diff("k", &previous, &next).has_changes);
    }

    #[test]
    fn identified_items_are_classified_alongside_anonymous_ones() {
        let previous = json!([{"id": 1, "status": "pending"}, "note"]);
        let next = json!([{"id": 1, "status": "pending"}, {"id": 2, "status": "pending"}, "note"]);

        let delta = detector().diff("k", &previous, &next);
        assert_eq!(delta.added, vec![json!({"id": 2, "status": "pending"})]);
        assert!(delta.has_changes);
    }

    #[tokio::test(start_paused = true)]
    async fn transition_progress_saturates() {
        let record = TransitionRecord {
            key: "k".to_string(),
            previous: json!(1),
            next: json!(2),
            delta: Delta::default(),
            started_at: Instant::now(),
        };
        let window = Duration::from_millis(300);

        tokio::time::advance(Duration::from_millis(150)).await;
        let half = record.progress(Instant::now(), window);
        assert!((half - 0.5).abs() < 1e-9);
        assert!(!record.is_expired(Instant::now(), window));

        tokio::time::advance(Duration::from_millis(200)).await;
        assert_eq!(record.progress(Instant::now(), window), 1.0);
        assert!(record.is_expired(Instant::now(), window));
    }
}
