//! Core enumerations for the event family.
//!
//! Canonical definitions for the inbound telephony wire format.

use serde::{Deserialize, Serialize};

/// Which event family a payload belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Call,
    Sms,
    Presence,
    Omnichannel,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Call => "call",
            EventKind::Sms => "sms",
            EventKind::Presence => "presence",
            EventKind::Omnichannel => "omnichannel",
        }
    }
}

/// Direction of a call or message relative to the tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Inbound,
    Outbound,
}

/// Call leg state as reported by the PBX.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CallState {
    Ringing,
    Answered,
    Completed,
    Missed,
    Voicemail,
}

impl CallState {
    /// Terminal states close out the call's history row.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            CallState::Completed | CallState::Missed | CallState::Voicemail
        )
    }
}

/// Message delivery state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageState {
    Queued,
    Sent,
    Delivered,
    Received,
    Failed,
}

/// Agent availability state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceState {
    Available,
    Busy,
    Away,
    Dnd,
    Offline,
}

/// Channel an omnichannel conversation arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageChannel {
    Sms,
    Mms,
    Whatsapp,
    Facebook,
    Webchat,
    Email,
}

impl MessageChannel {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageChannel::Sms => "sms",
            MessageChannel::Mms => "mms",
            MessageChannel::Whatsapp => "whatsapp",
            MessageChannel::Facebook => "facebook",
            MessageChannel::Webchat => "webchat",
            MessageChannel::Email => "email",
        }
    }
}

/// Role an integration target plays relative to the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetRole {
    Caller,
    Callee,
    Sender,
    Recipient,
    Agent,
}
