//! Inbound payload parsing — raw webhook JSON → immutable [`Event`].
//!
//! This is the only place raw payloads are touched. Parsing is fail-fast:
//! a malformed payload fails the whole request with a validation error
//! before any integration is considered. After this point the event is
//! immutable and every field access is typed.

use super::enums::TargetRole;
use super::{CallEvent, Event, EventTarget, OmnichannelEvent, PresenceEvent, SmsEvent};
use crate::integration::alias::resolve_canonical_name;
use crate::types::{AgentId, CallId, ConversationId, Error, MessageId, Result, TeamId};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Parse a raw webhook payload into an event.
pub fn parse_event(payload: &Value) -> Result<Event> {
    let kind = str_field(payload, "kind")?;
    match kind {
        "call" => parse_call(payload).map(Event::Call),
        "sms" => parse_sms(payload).map(Event::Sms),
        "presence" => parse_presence(payload).map(Event::Presence),
        "omnichannel" => parse_omnichannel(payload).map(Event::Omnichannel),
        other => Err(Error::validation(format!(
            "unknown event kind '{}', expected one of: call, sms, presence, omnichannel",
            other
        ))),
    }
}

fn parse_call(payload: &Value) -> Result<CallEvent> {
    Ok(CallEvent {
        call_id: id_field(payload, "call_id", CallId::from_string)?,
        team: id_field(payload, "team", TeamId::from_string)?,
        direction: enum_field(payload, "direction")?,
        state: enum_field(payload, "state")?,
        from: str_field(payload, "from")?.to_string(),
        to: str_field(payload, "to")?.to_string(),
        agent: opt_id_field(payload, "agent", AgentId::from_string)?,
        started_at: timestamp_field(payload, "started_at")?,
        targets: parse_targets(payload)?,
    })
}

fn parse_sms(payload: &Value) -> Result<SmsEvent> {
    Ok(SmsEvent {
        message_id: id_field(payload, "message_id", MessageId::from_string)?,
        team: id_field(payload, "team", TeamId::from_string)?,
        direction: enum_field(payload, "direction")?,
        state: enum_field(payload, "state")?,
        from: str_field(payload, "from")?.to_string(),
        to: str_field(payload, "to")?.to_string(),
        text: opt_str_field(payload, "text").unwrap_or_default().to_string(),
        sent_at: timestamp_field(payload, "sent_at")?,
        targets: parse_targets(payload)?,
    })
}

fn parse_presence(payload: &Value) -> Result<PresenceEvent> {
    Ok(PresenceEvent {
        team: id_field(payload, "team", TeamId::from_string)?,
        agent: id_field(payload, "agent", AgentId::from_string)?,
        state: enum_field(payload, "state")?,
        changed_at: timestamp_field(payload, "changed_at")?,
        targets: parse_targets(payload)?,
    })
}

fn parse_omnichannel(payload: &Value) -> Result<OmnichannelEvent> {
    Ok(OmnichannelEvent {
        conversation_id: id_field(payload, "conversation_id", ConversationId::from_string)?,
        team: id_field(payload, "team", TeamId::from_string)?,
        channel: enum_field(payload, "channel")?,
        direction: enum_field(payload, "direction")?,
        from: str_field(payload, "from")?.to_string(),
        to: str_field(payload, "to")?.to_string(),
        text: opt_str_field(payload, "text").unwrap_or_default().to_string(),
        received_at: timestamp_field(payload, "received_at")?,
        targets: parse_targets(payload)?,
    })
}

/// Parse the `integrations` target list.
///
/// Target names are alias-resolved here so everything downstream sees
/// canonical names only. A missing list means "all enabled integrations".
fn parse_targets(payload: &Value) -> Result<Vec<EventTarget>> {
    let raw = match payload.get("integrations") {
        Some(raw) => raw,
        None => return Ok(Vec::new()),
    };
    let entries = raw
        .as_array()
        .ok_or_else(|| Error::validation("integrations must be an array"))?;

    let mut targets = Vec::with_capacity(entries.len());
    for entry in entries {
        let name = str_field(entry, "name")?;
        let role = match entry.get("role") {
            Some(_) => enum_field(entry, "role")?,
            None => TargetRole::Agent,
        };
        targets.push(EventTarget {
            integration: resolve_canonical_name(name),
            role,
        });
    }
    Ok(targets)
}

// =============================================================================
// Field helpers
// =============================================================================

fn str_field<'a>(payload: &'a Value, key: &str) -> Result<&'a str> {
    payload
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| Error::validation(format!("missing required field: {}", key)))
}

fn opt_str_field<'a>(payload: &'a Value, key: &str) -> Option<&'a str> {
    payload.get(key).and_then(|v| v.as_str())
}

fn id_field<T>(
    payload: &Value,
    key: &str,
    ctor: impl FnOnce(String) -> std::result::Result<T, &'static str>,
) -> Result<T> {
    let raw = str_field(payload, key)?;
    ctor(raw.to_string()).map_err(Error::validation)
}

fn opt_id_field<T>(
    payload: &Value,
    key: &str,
    ctor: impl FnOnce(String) -> std::result::Result<T, &'static str>,
) -> Result<Option<T>> {
    match opt_str_field(payload, key) {
        Some(raw) if !raw.is_empty() => Ok(Some(ctor(raw.to_string()).map_err(Error::validation)?)),
        _ => Ok(None),
    }
}

/// Deserialize a wire enum field through its serde renames.
fn enum_field<T: DeserializeOwned>(payload: &Value, key: &str) -> Result<T> {
    let raw = str_field(payload, key)?;
    serde_json::from_value(Value::String(raw.to_string()))
        .map_err(|_| Error::validation(format!("invalid value '{}' for field {}", raw, key)))
}

/// RFC 3339 timestamp; absent means arrival time, malformed is an error.
fn timestamp_field(payload: &Value, key: &str) -> Result<DateTime<Utc>> {
    match opt_str_field(payload, key) {
        None => Ok(Utc::now()),
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|_| Error::validation(format!("invalid timestamp '{}' for field {}", raw, key))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::enums::{CallState, Direction, MessageChannel, MessageState, PresenceState};

    #[test]
    fn test_parse_call() {
        let payload = serde_json::json!({
            "kind": "call",
            "call_id": "c-42",
            "team": "team-9",
            "direction": "inbound",
            "state": "RINGING",
            "from": "+15550100",
            "to": "+15550199",
            "agent": "a-3",
            "started_at": "2026-08-20T14:00:00Z",
            "integrations": [
                {"name": "copper", "role": "callee"},
                {"name": "ZOHO"}
            ],
        });

        let event = parse_event(&payload).unwrap();
        let call = match &event {
            Event::Call(call) => call,
            other => panic!("expected call event, got {:?}", other),
        };
        assert_eq!(call.call_id.as_str(), "c-42");
        assert_eq!(call.direction, Direction::Inbound);
        assert_eq!(call.state, CallState::Ringing);
        assert_eq!(call.agent.as_ref().unwrap().as_str(), "a-3");
        // Alias resolved at the boundary, role defaults to agent
        assert_eq!(call.targets[0].integration, "PROSPERWORKS");
        assert_eq!(call.targets[0].role, TargetRole::Callee);
        assert_eq!(call.targets[1].integration, "ZOHO");
        assert_eq!(call.targets[1].role, TargetRole::Agent);
    }

    #[test]
    fn test_parse_sms_defaults() {
        let payload = serde_json::json!({
            "kind": "sms",
            "message_id": "m-1",
            "team": "team-9",
            "direction": "outbound",
            "state": "sent",
            "from": "+15550100",
            "to": "+15550199",
        });

        let event = parse_event(&payload).unwrap();
        let sms = match &event {
            Event::Sms(sms) => sms,
            other => panic!("expected sms event, got {:?}", other),
        };
        assert_eq!(sms.state, MessageState::Sent);
        assert_eq!(sms.text, "");
        assert!(sms.targets.is_empty());
    }

    #[test]
    fn test_parse_presence() {
        let payload = serde_json::json!({
            "kind": "presence",
            "team": "team-9",
            "agent": "a-3",
            "state": "dnd",
        });

        let event = parse_event(&payload).unwrap();
        let presence = match &event {
            Event::Presence(presence) => presence,
            other => panic!("expected presence event, got {:?}", other),
        };
        assert_eq!(presence.state, PresenceState::Dnd);
    }

    #[test]
    fn test_parse_omnichannel() {
        let payload = serde_json::json!({
            "kind": "omnichannel",
            "conversation_id": "conv-5",
            "team": "team-9",
            "channel": "whatsapp",
            "direction": "inbound",
            "from": "customer-1",
            "to": "line-2",
            "text": "hello",
        });

        let event = parse_event(&payload).unwrap();
        let omni = match &event {
            Event::Omnichannel(omni) => omni,
            other => panic!("expected omnichannel event, got {:?}", other),
        };
        assert_eq!(omni.channel, MessageChannel::Whatsapp);
        assert_eq!(omni.text, "hello");
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let payload = serde_json::json!({"kind": "fax"});
        let err = parse_event(&payload).unwrap_err();
        assert!(err.to_string().contains("unknown event kind"));
    }

    #[test]
    fn test_missing_required_field_rejected() {
        let payload = serde_json::json!({
            "kind": "call",
            "call_id": "c-42",
            "direction": "inbound",
            "state": "RINGING",
            "from": "+15550100",
            "to": "+15550199",
        });
        let err = parse_event(&payload).unwrap_err();
        assert!(err.to_string().contains("missing required field: team"));
    }

    #[test]
    fn test_invalid_enum_rejected() {
        let payload = serde_json::json!({
            "kind": "call",
            "call_id": "c-42",
            "team": "team-9",
            "direction": "sideways",
            "state": "RINGING",
            "from": "+15550100",
            "to": "+15550199",
        });
        let err = parse_event(&payload).unwrap_err();
        assert!(err.to_string().contains("invalid value 'sideways'"));
    }

    #[test]
    fn test_invalid_timestamp_rejected() {
        let payload = serde_json::json!({
            "kind": "presence",
            "team": "team-9",
            "agent": "a-3",
            "state": "busy",
            "changed_at": "yesterday-ish",
        });
        assert!(parse_event(&payload).is_err());
    }

    #[test]
    fn test_targets_must_be_array() {
        let payload = serde_json::json!({
            "kind": "presence",
            "team": "team-9",
            "agent": "a-3",
            "state": "busy",
            "integrations": "PROSPERWORKS",
        });
        let err = parse_event(&payload).unwrap_err();
        assert!(err.to_string().contains("integrations must be an array"));
    }
}
