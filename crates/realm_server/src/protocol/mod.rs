//! Wire protocol: envelope, inbound event validation, outbound events.
//!
//! Every message on the channel is a JSON envelope `{"event": <name>,
//! "data": <payload>}` in both directions. Inbound payloads are validated
//! into typed [`ClientEvent`]s by a pure function; outbound [`ServerEvent`]s
//! encode themselves back into envelopes.

pub mod events;
pub mod validation;

pub use events::{ErrorCode, ServerEvent, TerminationCode, WirePlayer, WireRealm};
pub use validation::{ClientEvent, EventKind, ValidationError};

use serde::Deserialize;

/// Inbound message envelope as received from the client.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    /// The event name, e.g. `"movePlayer"`.
    pub event: String,
    /// The event payload; shape depends on the event.
    #[serde(default)]
    pub data: serde_json::Value,
}

impl Envelope {
    /// Parses a raw text frame into an envelope.
    pub fn parse(text: &str) -> Result<Self, ValidationError> {
        serde_json::from_str(text).map_err(|e| ValidationError {
            path: "$".to_string(),
            reason: format!("invalid envelope: {e}"),
        })
    }
}
