//! The spec review envelope.
//!
//! Every plugin-extracted spec crosses the trust boundary wrapped in a
//! [`SpecReview`]. After policy has run, exactly one of `approved_spec`
//! or `blocked_spec` is populated, and a blocked entry always carries a
//! reason. The constructors enforce that shape; [`SpecReview::normalize`]
//! repairs anything that arrives malformed off the wire.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use smol_str::SmolStr;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecReview {
    pub plugin_name: SmolStr,
    pub container_id: SmolStr,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_spec: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked_spec: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl SpecReview {
    pub fn approved(
        plugin_name: impl Into<SmolStr>,
        container_id: impl Into<SmolStr>,
        spec: Value,
    ) -> Self {
        Self {
            plugin_name: plugin_name.into(),
            container_id: container_id.into(),
            approved_spec: Some(spec),
            blocked_spec: None,
            reason: None,
        }
    }

    pub fn blocked(
        plugin_name: impl Into<SmolStr>,
        container_id: impl Into<SmolStr>,
        spec: Value,
        reason: impl Into<String>,
    ) -> Self {
        let reason = reason.into();
        debug_assert!(!reason.is_empty());
        Self {
            plugin_name: plugin_name.into(),
            container_id: container_id.into(),
            approved_spec: None,
            blocked_spec: Some(spec),
            reason: Some(reason),
        }
    }

    pub fn is_approved(&self) -> bool {
        self.approved_spec.is_some()
    }

    /// Convert an approved entry into a blocked one, keeping the spec
    /// visible for the blocked-notice rendering.
    pub fn block(&mut self, reason: impl Into<String>) {
        if let Some(spec) = self.approved_spec.take() {
            self.blocked_spec = Some(spec);
        }
        let reason = reason.into();
        self.reason = Some(if reason.is_empty() {
            "blocked".to_string()
        } else {
            reason
        });
    }

    /// Enforce the exactly-one invariant on an entry that came off the
    /// wire. Ambiguous or empty entries are resolved to blocked, never
    /// to approved.
    pub fn normalize(mut self) -> Self {
        match (&self.approved_spec, &self.blocked_spec) {
            (Some(_), None) => {
                self.reason = None;
                self
            }
            (None, Some(_)) => {
                if self.reason.as_deref().is_none_or(str::is_empty) {
                    self.reason = Some("blocked by policy".to_string());
                }
                self
            }
            (Some(_), Some(_)) => {
                self.approved_spec = None;
                if self.reason.as_deref().is_none_or(str::is_empty) {
                    self.reason = Some("ambiguous review entry".to_string());
                }
                self
            }
            (None, None) => {
                self.blocked_spec = Some(Value::Null);
                if self.reason.as_deref().is_none_or(str::is_empty) {
                    self.reason = Some("empty review entry".to_string());
                }
                self
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn exactly_one_side_after_normalize() {
        let ambiguous = SpecReview {
            plugin_name: "vega".into(),
            container_id: "c0".into(),
            approved_spec: Some(json!({})),
            blocked_spec: Some(json!({})),
            reason: None,
        };
        let fixed = ambiguous.normalize();
        assert!(fixed.approved_spec.is_none());
        assert!(fixed.blocked_spec.is_some());
        assert!(!fixed.reason.unwrap().is_empty());
    }

    #[test]
    fn blocking_keeps_spec_and_requires_reason() {
        let mut review = SpecReview::approved("slider", "c1", json!({"variableId": "x"}));
        review.block("policy says no");
        assert!(!review.is_approved());
        assert_eq!(review.blocked_spec, Some(json!({"variableId": "x"})));
        assert_eq!(review.reason.as_deref(), Some("policy says no"));
    }
}
