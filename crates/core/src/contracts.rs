//! Inbound payload contracts: per-provider, per-event-type shape checks.
//!
//! A contract is looked up by `(provider, payload.type)`. Payloads whose
//! type has no registered contract pass unchecked.

use serde::Serialize;
use serde_json::Value;

/// How a contract constrains one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRule {
    /// Present, not null and, for strings, not empty.
    Required,
    /// When present, must be a JSON string.
    String,
}

impl FieldRule {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Required => "required",
            Self::String => "type_check",
        }
    }
}

/// One constraint on a named top-level field.
#[derive(Debug, Clone, Copy)]
pub struct FieldConstraint {
    pub field: &'static str,
    pub rule: FieldRule,
}

/// The constraints applying to one provider event type.
#[derive(Debug, Clone, Copy)]
pub struct Contract {
    pub provider: &'static str,
    pub event_type: &'static str,
    pub constraints: &'static [FieldConstraint],
}

/// A single field-level contract violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldViolation {
    pub field: String,
    pub rule_type: String,
    pub message: String,
}

const SIGNING_EVENT: &[FieldConstraint] = &[
    FieldConstraint { field: "id", rule: FieldRule::Required },
    FieldConstraint { field: "id", rule: FieldRule::String },
    FieldConstraint { field: "documentId", rule: FieldRule::Required },
    FieldConstraint { field: "documentId", rule: FieldRule::String },
];

/// Built-in contracts.
pub const CONTRACTS: &[Contract] = &[
    Contract {
        provider: "clicksign",
        event_type: "signing.completed",
        constraints: SIGNING_EVENT,
    },
    Contract {
        provider: "clicksign",
        event_type: "signing.refused",
        constraints: SIGNING_EVENT,
    },
];

/// Find the contract for a provider and declared event type.
pub fn find_contract(provider: &str, event_type: &str) -> Option<&'static Contract> {
    CONTRACTS
        .iter()
        .find(|c| c.provider == provider && c.event_type == event_type)
}

/// Validate `payload` against the contract for its declared `type`.
///
/// Returns an empty list when the payload is valid or no contract applies.
/// A non-object payload under a known contract fails every `Required` field.
pub fn validate_payload(provider: &str, payload: &Value) -> Vec<FieldViolation> {
    let Some(event_type) = payload.get("type").and_then(Value::as_str) else {
        return Vec::new();
    };
    let Some(contract) = find_contract(provider, event_type) else {
        return Vec::new();
    };

    contract
        .constraints
        .iter()
        .filter_map(|c| check(c, payload.get(c.field)))
        .collect()
}

fn check(constraint: &FieldConstraint, value: Option<&Value>) -> Option<FieldViolation> {
    let failed = match constraint.rule {
        FieldRule::Required => match value {
            None | Some(Value::Null) => true,
            Some(Value::String(s)) => s.is_empty(),
            Some(_) => false,
        },
        FieldRule::String => matches!(value, Some(v) if !v.is_null() && !v.is_string()),
    };

    failed.then(|| FieldViolation {
        field: constraint.field.to_string(),
        rule_type: constraint.rule.as_str().to_string(),
        message: match constraint.rule {
            FieldRule::Required => format!("{} is required", constraint.field),
            FieldRule::String => format!("{} must be a string", constraint.field),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_document_id_is_rejected() {
        let violations =
            validate_payload("clicksign", &json!({"type": "signing.completed", "id": "sig-1"}));
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].field, "documentId");
        assert_eq!(violations[0].rule_type, "required");
    }

    #[test]
    fn complete_payload_passes() {
        let payload = json!({"type": "signing.refused", "id": "sig-1", "documentId": "doc-9"});
        assert!(validate_payload("clicksign", &payload).is_empty());
    }

    #[test]
    fn wrong_types_are_reported() {
        let payload = json!({"type": "signing.completed", "id": 42, "documentId": ""});
        let violations = validate_payload("clicksign", &payload);
        let rules: Vec<_> = violations
            .iter()
            .map(|v| (v.field.as_str(), v.rule_type.as_str()))
            .collect();
        assert_eq!(rules, vec![("id", "type_check"), ("documentId", "required")]);
    }

    #[test]
    fn unknown_event_types_and_providers_pass() {
        assert!(validate_payload("clicksign", &json!({"type": "envelope.opened"})).is_empty());
        assert!(validate_payload("docusign", &json!({"type": "signing.completed"})).is_empty());
        assert!(validate_payload("clicksign", &json!({"id": "no-type"})).is_empty());
    }

    #[test]
    fn violations_serialize_in_camel_case() {
        let v = FieldViolation {
            field: "id".into(),
            rule_type: "required".into(),
            message: "id is required".into(),
        };
        assert_eq!(
            serde_json::to_value(v).unwrap(),
            json!({"field": "id", "ruleType": "required", "message": "id is required"})
        );
    }
}
