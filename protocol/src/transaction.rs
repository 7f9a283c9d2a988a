//! Transaction record passed through hooks
//!
//! The HTTP engine owns the semantics of `request`, `expected` and `real`;
//! this crate only carries them as opaque JSON so hooks (and workers) can
//! read and rewrite them.

use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

/// Failure message used when a hook sets `fail` to `true` instead of a reason.
pub const DEFAULT_FAIL_MESSAGE: &str = "Failed in hook";

/// One API test case.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Display name, `"<group> > <resource> > <action>"`. Used as the
    /// lookup key for named hooks.
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Where the transaction came from in the API description
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub origin: Value,

    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub request: Value,

    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub expected: Value,

    /// Actual response, filled in by the HTTP engine after the exchange
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub real: Value,

    #[serde(default, skip_serializing_if = "is_false")]
    pub skip: bool,

    /// Failure marker. Accepts a reason string, `true`, `false` or `null`.
    #[serde(
        default,
        deserialize_with = "deserialize_fail",
        skip_serializing_if = "Option::is_none"
    )]
    pub fail: Option<String>,

    /// Fields this crate does not model. Kept so that mutations made by
    /// hooks round-trip untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Transaction {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn is_failed(&self) -> bool {
        self.fail.is_some()
    }

    /// Mark the transaction failed. The first recorded reason wins; later
    /// reasons are dropped so reporters see the root cause.
    pub fn mark_failed(&mut self, reason: impl Into<String>) {
        if self.fail.is_none() {
            self.fail = Some(reason.into());
        }
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

fn deserialize_fail<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum FailMarker {
        Flag(bool),
        Reason(String),
    }

    Ok(match Option::<FailMarker>::deserialize(deserializer)? {
        None | Some(FailMarker::Flag(false)) => None,
        Some(FailMarker::Flag(true)) => Some(DEFAULT_FAIL_MESSAGE.to_string()),
        Some(FailMarker::Reason(reason)) => Some(reason),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_fail_marker_variants() {
        let tx: Transaction = serde_json::from_value(json!({"name": "A", "fail": true})).unwrap();
        assert_eq!(tx.fail.as_deref(), Some(DEFAULT_FAIL_MESSAGE));

        let tx: Transaction = serde_json::from_value(json!({"name": "A", "fail": false})).unwrap();
        assert_eq!(tx.fail, None);

        let tx: Transaction = serde_json::from_value(json!({"name": "A", "fail": null})).unwrap();
        assert_eq!(tx.fail, None);

        let tx: Transaction =
            serde_json::from_value(json!({"name": "A", "fail": "bad status"})).unwrap();
        assert_eq!(tx.fail.as_deref(), Some("bad status"));
    }

    #[test]
    fn test_unknown_fields_are_preserved() {
        let input = json!({
            "name": "Machines > Machines collection > Get Machines",
            "request": {"method": "GET", "uri": "/machines"},
            "customField": {"token": "abc"},
        });

        let tx: Transaction = serde_json::from_value(input.clone()).unwrap();
        assert_eq!(tx.extra.get("customField"), Some(&json!({"token": "abc"})));
        assert_eq!(serde_json::to_value(&tx).unwrap(), input);
    }

    #[test]
    fn test_mark_failed_keeps_first_reason() {
        let mut tx = Transaction::new("A");
        assert!(!tx.is_failed());

        tx.mark_failed("first");
        tx.mark_failed("second");
        assert_eq!(tx.fail.as_deref(), Some("first"));
    }
}
