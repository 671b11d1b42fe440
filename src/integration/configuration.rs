//! Per-integration configuration document.
//!
//! A flat, opaque key/value bag with dotted key names. Credentials, feature
//! flags, and integration-specific settings all live here; the engine never
//! enumerates the full key space. Every accessor tolerates absent keys and
//! the stringly-typed values that older frontends still send.

use crate::types::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// Well-known keys. Everything else is integration-specific.
pub const KEY_ACCESS_TOKEN: &str = "access_token";
pub const KEY_REFRESH_TOKEN: &str = "refresh_token";
pub const KEY_TOKEN_EXPIRES_AT: &str = "token_expires_at";
pub const KEY_INSTANCE_URL: &str = "instance_url";
pub const KEY_SERVICE_USER: &str = "service_user";
pub const KEY_HANGUP_ON_INVALID_CALL: &str = "invalidcall.hangup";
pub const KEY_SMART_ROUTING: &str = "smartrouting.enabled";
pub const KEY_OMNICHANNEL_CHANNELS: &str = "omnichannel.channels";

/// Keys carried over from the stored document when an update omits them.
/// Frontends post settings forms without credentials; losing tokens on
/// every save would force a re-auth.
pub const PRESERVED_KEYS: &[&str] = &[
    KEY_ACCESS_TOKEN,
    KEY_REFRESH_TOKEN,
    KEY_TOKEN_EXPIRES_AT,
    KEY_INSTANCE_URL,
    KEY_SERVICE_USER,
];

/// Opaque per-integration configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigDocument(Map<String, Value>);

impl ConfigDocument {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Build from a JSON value; anything but an object is rejected.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(Error::validation(format!(
                "configuration must be a JSON object, got {}",
                json_type_name(&other)
            ))),
        }
    }

    pub fn as_value(&self) -> Value {
        Value::Object(self.0.clone())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    // =========================================================================
    // Typed accessors
    // =========================================================================

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn str_or(&self, key: &str, default: &str) -> String {
        self.get_str(key).unwrap_or(default).to_string()
    }

    /// Boolean with tolerant coercion: accepts `true`, `"true"`, `"1"`, `1`.
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.0.get(key)? {
            Value::Bool(b) => Some(*b),
            Value::String(s) => match s.to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => Some(true),
                "false" | "0" | "no" => Some(false),
                _ => None,
            },
            Value::Number(n) => n.as_i64().map(|n| n != 0),
            _ => None,
        }
    }

    pub fn bool_or(&self, key: &str, default: bool) -> bool {
        self.get_bool(key).unwrap_or(default)
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        match self.0.get(key)? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// String list: accepts a JSON array of strings or a comma-separated
    /// string.
    pub fn get_str_list(&self, key: &str) -> Option<Vec<String>> {
        match self.0.get(key)? {
            Value::Array(items) => Some(
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect(),
            ),
            Value::String(s) => Some(
                s.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect(),
            ),
            _ => None,
        }
    }

    // =========================================================================
    // Update normalization
    // =========================================================================

    /// Coerce `"true"`/`"false"` string values to real booleans, in place.
    ///
    /// Only exact boolean words are touched; `"1"` could be a legitimate
    /// setting value and is left alone (readers coerce it via [`get_bool`]).
    ///
    /// [`get_bool`]: ConfigDocument::get_bool
    pub fn normalize_bool_strings(&mut self) {
        for value in self.0.values_mut() {
            if let Value::String(s) = value {
                if s.eq_ignore_ascii_case("true") {
                    *value = Value::Bool(true);
                } else if s.eq_ignore_ascii_case("false") {
                    *value = Value::Bool(false);
                }
            }
        }
    }

    /// Copy the named keys from `other` when this document lacks them.
    pub fn merge_missing_from(&mut self, other: &ConfigDocument, keys: &[&str]) {
        for key in keys {
            if !self.0.contains_key(*key) {
                if let Some(value) = other.0.get(*key) {
                    self.0.insert((*key).to_string(), value.clone());
                }
            }
        }
    }

    // =========================================================================
    // Token helpers
    // =========================================================================

    pub fn access_token(&self) -> Option<&str> {
        self.get_str(KEY_ACCESS_TOKEN)
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.get_str(KEY_REFRESH_TOKEN)
    }

    /// Whether the stored access token has expired as of `now`.
    ///
    /// Absent or unparseable expiry means "not known to be expired".
    pub fn token_expired(&self, now: DateTime<Utc>) -> bool {
        match self.get_str(KEY_TOKEN_EXPIRES_AT) {
            Some(raw) => DateTime::parse_from_rfc3339(raw)
                .map(|expiry| expiry.with_timezone(&Utc) <= now)
                .unwrap_or(false),
            None => false,
        }
    }
}

fn json_type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use pretty_assertions::assert_eq;

    fn doc(json: Value) -> ConfigDocument {
        ConfigDocument::from_value(json).unwrap()
    }

    #[test]
    fn test_from_value_rejects_non_objects() {
        assert!(ConfigDocument::from_value(serde_json::json!([1, 2])).is_err());
        assert!(ConfigDocument::from_value(serde_json::json!("nope")).is_err());
        assert!(ConfigDocument::from_value(serde_json::json!({})).is_ok());
    }

    #[test]
    fn test_bool_coercion() {
        let config = doc(serde_json::json!({
            "a": true,
            "b": "true",
            "c": "1",
            "d": "no",
            "e": 0,
            "f": "maybe",
        }));
        assert_eq!(config.get_bool("a"), Some(true));
        assert_eq!(config.get_bool("b"), Some(true));
        assert_eq!(config.get_bool("c"), Some(true));
        assert_eq!(config.get_bool("d"), Some(false));
        assert_eq!(config.get_bool("e"), Some(false));
        assert_eq!(config.get_bool("f"), None);
        assert!(config.bool_or("missing", true));
    }

    #[test]
    fn test_normalize_bool_strings() {
        let mut config = doc(serde_json::json!({
            "smartrouting.enabled": "True",
            "invalidcall.hangup": "false",
            "note": "true story",
            "count": "1",
        }));
        config.normalize_bool_strings();
        assert_eq!(config.get("smartrouting.enabled"), Some(&Value::Bool(true)));
        assert_eq!(config.get("invalidcall.hangup"), Some(&Value::Bool(false)));
        // Non-boolean strings untouched
        assert_eq!(config.get_str("note"), Some("true story"));
        assert_eq!(config.get_str("count"), Some("1"));
    }

    #[test]
    fn test_merge_missing_preserves_credentials() {
        let stored = doc(serde_json::json!({
            "access_token": "at-1",
            "refresh_token": "rt-1",
            "instance_url": "https://example.crm",
            "smartrouting.enabled": true,
        }));
        let mut incoming = doc(serde_json::json!({
            "smartrouting.enabled": false,
            "access_token": "at-2",
        }));

        incoming.merge_missing_from(&stored, PRESERVED_KEYS);

        // Provided keys win, absent preserved keys are carried over
        assert_eq!(incoming.get_str("access_token"), Some("at-2"));
        assert_eq!(incoming.get_str("refresh_token"), Some("rt-1"));
        assert_eq!(incoming.get_str("instance_url"), Some("https://example.crm"));
        assert_eq!(incoming.get_bool("smartrouting.enabled"), Some(false));
    }

    #[test]
    fn test_str_list_both_shapes() {
        let config = doc(serde_json::json!({
            "omnichannel.channels": ["sms", "whatsapp"],
            "csv": "sms, whatsapp , ",
        }));
        assert_eq!(
            config.get_str_list("omnichannel.channels").unwrap(),
            vec!["sms", "whatsapp"]
        );
        assert_eq!(config.get_str_list("csv").unwrap(), vec!["sms", "whatsapp"]);
        assert_eq!(config.get_str_list("missing"), None);
    }

    #[test]
    fn test_token_expiry() {
        let now = Utc::now();
        let mut config = ConfigDocument::new();
        assert!(!config.token_expired(now));

        config.set(
            KEY_TOKEN_EXPIRES_AT,
            (now - Duration::minutes(1)).to_rfc3339(),
        );
        assert!(config.token_expired(now));

        config.set(
            KEY_TOKEN_EXPIRES_AT,
            (now + Duration::minutes(10)).to_rfc3339(),
        );
        assert!(!config.token_expired(now));

        config.set(KEY_TOKEN_EXPIRES_AT, "not-a-date");
        assert!(!config.token_expired(now));
    }
}
