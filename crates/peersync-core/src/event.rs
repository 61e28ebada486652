//! Events surfaced to the host.

use std::fmt;

use crate::{PeerId, StatePayload};

/// A state change the host must react to.
///
/// `H` is the host's opaque handle for a proxy object.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent<H> {
    /// The channel opened.
    SocketOpen,
    /// The transport reported a failure.
    SocketError { message: String },
    /// The channel closed. Terminal for that channel.
    SocketClose,
    /// First update from an unknown peer. The host should build a proxy
    /// and register it with `register_object`.
    ObjectCreate { id: PeerId, payload: StatePayload },
    /// Subsequent update for a registered proxy.
    ObjectUpdate {
        id: PeerId,
        handle: H,
        payload: StatePayload,
    },
    /// The peer has been silent past the pause timeout.
    ObjectPause { id: PeerId, handle: H },
    /// The peer left or timed out. Last chance to dispose the handle.
    ObjectKill { id: PeerId, handle: H },
    /// A peer started an action. Unknown ids are already filtered out.
    ActionStart {
        action_type: String,
        sender: PeerId,
        handles: Vec<H>,
    },
    /// A peer stopped an action.
    ActionStop { action_type: String, sender: PeerId },
}

impl<H> SyncEvent<H> {
    /// Topic this event is published on.
    #[must_use]
    pub fn topic(&self) -> Topic {
        match self {
            Self::SocketOpen => Topic::SocketOpen,
            Self::SocketError { .. } => Topic::SocketError,
            Self::SocketClose => Topic::SocketClose,
            Self::ObjectCreate { .. } => Topic::ObjectCreate,
            Self::ObjectUpdate { .. } => Topic::ObjectUpdate,
            Self::ObjectPause { .. } => Topic::ObjectPause,
            Self::ObjectKill { .. } => Topic::ObjectKill,
            Self::ActionStart { action_type, .. } => Topic::ActionStart(action_type.clone()),
            Self::ActionStop { action_type, .. } => Topic::ActionStop(action_type.clone()),
        }
    }

    /// Peer the event concerns, if any.
    #[must_use]
    pub const fn peer(&self) -> Option<&PeerId> {
        match self {
            Self::ObjectCreate { id, .. }
            | Self::ObjectUpdate { id, .. }
            | Self::ObjectPause { id, .. }
            | Self::ObjectKill { id, .. } => Some(id),
            Self::ActionStart { sender, .. } | Self::ActionStop { sender, .. } => Some(sender),
            Self::SocketOpen | Self::SocketError { .. } | Self::SocketClose => None,
        }
    }
}

/// Subscription topic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Topic {
    SocketOpen,
    SocketError,
    SocketClose,
    ObjectCreate,
    ObjectUpdate,
    ObjectPause,
    ObjectKill,
    /// `action.start.<type>`
    ActionStart(String),
    /// `action.stop.<type>`
    ActionStop(String),
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SocketOpen => f.write_str("socket.open"),
            Self::SocketError => f.write_str("socket.error"),
            Self::SocketClose => f.write_str("socket.close"),
            Self::ObjectCreate => f.write_str("object.create"),
            Self::ObjectUpdate => f.write_str("object.update"),
            Self::ObjectPause => f.write_str("object.pause"),
            Self::ObjectKill => f.write_str("object.kill"),
            Self::ActionStart(action_type) => write!(f, "action.start.{action_type}"),
            Self::ActionStop(action_type) => write!(f, "action.stop.{action_type}"),
        }
    }
}
