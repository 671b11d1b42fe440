//! Inbound telephony event family.
//!
//! One immutable value per inbound request, constructed exactly once by
//! [`parse::parse_event`] and shared read-only across the fan-out:
//!   - **Call**: PBX call leg updates (ringing, answered, completed, ...)
//!   - **Sms**: text message traffic on tenant numbers
//!   - **Presence**: agent availability changes
//!   - **Omnichannel**: conversations from non-telephony channels
//!
//! Events carry the integration target pairs the PBX resolved for the
//! involved lines; an empty target list means "every enabled integration
//! of the team".

pub mod enums;
pub mod parse;

use crate::types::{AgentId, CallId, ConversationId, MessageId, TeamId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use enums::{
    CallState, Direction, EventKind, MessageChannel, MessageState, PresenceState, TargetRole,
};

// =============================================================================
// Targets
// =============================================================================

/// One integration the event is relevant to, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventTarget {
    /// Canonical integration name (already alias-resolved).
    pub integration: String,
    /// Which party of the event the integration is attached to.
    pub role: TargetRole,
}

impl EventTarget {
    pub fn new(integration: impl Into<String>, role: TargetRole) -> Self {
        Self {
            integration: integration.into(),
            role,
        }
    }
}

// =============================================================================
// Event variants
// =============================================================================

/// A call leg update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallEvent {
    pub call_id: CallId,
    pub team: TeamId,
    pub direction: Direction,
    pub state: CallState,
    pub from: String,
    pub to: String,
    /// Agent handling the leg, when known.
    pub agent: Option<AgentId>,
    pub started_at: DateTime<Utc>,
    pub targets: Vec<EventTarget>,
}

/// A text message on a tenant number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmsEvent {
    pub message_id: MessageId,
    pub team: TeamId,
    pub direction: Direction,
    pub state: MessageState,
    pub from: String,
    pub to: String,
    pub text: String,
    pub sent_at: DateTime<Utc>,
    pub targets: Vec<EventTarget>,
}

/// An agent availability change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceEvent {
    pub team: TeamId,
    pub agent: AgentId,
    pub state: PresenceState,
    pub changed_at: DateTime<Utc>,
    pub targets: Vec<EventTarget>,
}

/// A message from a non-telephony channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OmnichannelEvent {
    pub conversation_id: ConversationId,
    pub team: TeamId,
    pub channel: MessageChannel,
    pub direction: Direction,
    pub from: String,
    pub to: String,
    pub text: String,
    pub received_at: DateTime<Utc>,
    pub targets: Vec<EventTarget>,
}

// =============================================================================
// Event
// =============================================================================

/// The polymorphic inbound event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Event {
    Call(CallEvent),
    Sms(SmsEvent),
    Presence(PresenceEvent),
    Omnichannel(OmnichannelEvent),
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Call(_) => EventKind::Call,
            Event::Sms(_) => EventKind::Sms,
            Event::Presence(_) => EventKind::Presence,
            Event::Omnichannel(_) => EventKind::Omnichannel,
        }
    }

    pub fn team(&self) -> &TeamId {
        match self {
            Event::Call(e) => &e.team,
            Event::Sms(e) => &e.team,
            Event::Presence(e) => &e.team,
            Event::Omnichannel(e) => &e.team,
        }
    }

    pub fn targets(&self) -> &[EventTarget] {
        match self {
            Event::Call(e) => &e.targets,
            Event::Sms(e) => &e.targets,
            Event::Presence(e) => &e.targets,
            Event::Omnichannel(e) => &e.targets,
        }
    }

    /// Canonical names of the targeted integrations, in payload order.
    pub fn target_names(&self) -> Vec<String> {
        self.targets()
            .iter()
            .map(|t| t.integration.clone())
            .collect()
    }

    /// Key under which artifacts for this event are stored in history.
    ///
    /// Events that describe the same external object (e.g. two legs of one
    /// call) share a key, which is what makes the history upsert idempotent.
    pub fn object_key(&self) -> String {
        match self {
            Event::Call(e) => e.call_id.to_string(),
            Event::Sms(e) => e.message_id.to_string(),
            Event::Presence(e) => format!("presence-{}", e.agent),
            Event::Omnichannel(e) => e.conversation_id.to_string(),
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Event::Call(e) => e.started_at,
            Event::Sms(e) => e.sent_at,
            Event::Presence(e) => e.changed_at,
            Event::Omnichannel(e) => e.received_at,
        }
    }
}
