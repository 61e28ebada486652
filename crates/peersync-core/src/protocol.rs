//! Wire protocol shared by every peer.
//!
//! Frames are JSON text. Every message carries the sender's id so a peer can
//! drop its own frames when the relay echoes them back.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::PeerId;

/// Caller-defined object state. Passed through untouched.
pub type StatePayload = Value;

/// Frame decode/encode error.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// A message on the shared channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WireMessage {
    /// Current state of the sender's object.
    #[serde(rename = "update.object")]
    UpdateObject { id: PeerId, data: StatePayload },
    /// The sender's object is gone.
    #[serde(rename = "kill.object")]
    KillObject { id: PeerId },
    /// An action involving the listed objects started.
    #[serde(rename = "action.start")]
    ActionStart {
        id: PeerId,
        #[serde(rename = "actionType")]
        action_type: String,
        objects: Vec<PeerId>,
    },
    /// An action stopped.
    #[serde(rename = "action.stop")]
    ActionStop {
        id: PeerId,
        #[serde(rename = "actionType")]
        action_type: String,
    },
}

impl WireMessage {
    /// Id of the peer that sent this message.
    #[must_use]
    pub const fn sender(&self) -> &PeerId {
        match self {
            Self::UpdateObject { id, .. }
            | Self::KillObject { id }
            | Self::ActionStart { id, .. }
            | Self::ActionStop { id, .. } => id,
        }
    }

    /// Wire name of the message type.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::UpdateObject { .. } => "update.object",
            Self::KillObject { .. } => "kill.object",
            Self::ActionStart { .. } => "action.start",
            Self::ActionStop { .. } => "action.stop",
        }
    }

    /// Encode to a text frame.
    ///
    /// # Errors
    /// Returns error if the payload cannot be serialized.
    pub fn encode(&self) -> Result<String, CodecError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode a text frame.
    ///
    /// Unknown message types and frames with missing fields are errors;
    /// callers are expected to drop them.
    ///
    /// # Errors
    /// Returns error if the frame is not a known message.
    pub fn decode(frame: &str) -> Result<Self, CodecError> {
        Ok(serde_json::from_str(frame)?)
    }
}
