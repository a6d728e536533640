//! Wire envelopes exchanged with the Jarvix backend
//!
//! The backend speaks a single ad-hoc JSON envelope in each direction over
//! the WebSocket. Nothing is versioned or negotiated.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Client-generated identifier linking a prompt to every event about it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CorrelationId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Generates `cmd-<unix millis>` ids, strictly increasing within a session.
#[derive(Debug, Default)]
pub struct IdGenerator {
    last: i64,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next id from the wall clock.
    pub fn next_id(&mut self) -> CorrelationId {
        self.next_at(chrono::Utc::now().timestamp_millis())
    }

    /// Next id for a given timestamp. If the clock has not moved past the
    /// last issued value the last value plus one is used instead.
    pub fn next_at(&mut self, millis: i64) -> CorrelationId {
        let stamp = if millis > self.last { millis } else { self.last + 1 };
        self.last = stamp;
        CorrelationId(format!("cmd-{stamp}"))
    }
}

/// Client -> server: one prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundRequest {
    pub id: CorrelationId,
    pub prompt: String,
}

impl OutboundRequest {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Server -> client envelope as it appears on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundEnvelope {
    pub id: CorrelationId,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Structured outcome on `end_processing`. Older backends omit it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// Event kinds the backend emits
pub mod kinds {
    pub const STREAM: &str = "stream";
    pub const LOG: &str = "log";
    pub const START_PROCESSING: &str = "start_processing";
    pub const END_PROCESSING: &str = "end_processing";
}

/// Structured task outcome reported on `end_processing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportedOutcome {
    Completed,
    Failed,
}

impl ReportedOutcome {
    fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "completed" | "success" | "ok" => Some(Self::Completed),
            "failed" | "failure" | "error" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Typed inbound event, one variant per kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    StartProcessing {
        id: CorrelationId,
    },
    Stream {
        id: CorrelationId,
        message: Option<String>,
    },
    Log {
        id: CorrelationId,
        message: Option<String>,
    },
    EndProcessing {
        id: CorrelationId,
        outcome: Option<ReportedOutcome>,
    },
}

impl InboundEvent {
    pub fn id(&self) -> &CorrelationId {
        match self {
            InboundEvent::StartProcessing { id }
            | InboundEvent::Stream { id, .. }
            | InboundEvent::Log { id, .. }
            | InboundEvent::EndProcessing { id, .. } => id,
        }
    }

    /// Decode a text frame. Malformed JSON and unknown kinds yield `None`.
    pub fn from_json(text: &str) -> Option<Self> {
        let envelope: InboundEnvelope = serde_json::from_str(text).ok()?;
        Self::from_envelope(envelope)
    }

    pub fn from_envelope(envelope: InboundEnvelope) -> Option<Self> {
        let InboundEnvelope {
            id,
            kind,
            message,
            status,
        } = envelope;
        match kind.as_str() {
            kinds::START_PROCESSING => Some(InboundEvent::StartProcessing { id }),
            kinds::STREAM => Some(InboundEvent::Stream { id, message }),
            kinds::LOG => Some(InboundEvent::Log { id, message }),
            kinds::END_PROCESSING => Some(InboundEvent::EndProcessing {
                id,
                outcome: status.as_deref().and_then(ReportedOutcome::parse),
            }),
            _ => None,
        }
    }
}
