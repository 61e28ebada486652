//! In-process relay.
//!
//! Useful for tests and single-process demos. Endpoints name rooms; every
//! frame sent into a room is delivered to every member, the sender included,
//! which is how the reference WebSocket relay behaves.

use std::{
    collections::{HashMap, HashSet},
    sync::{
        Arc, PoisonError, RwLock,
        atomic::{AtomicBool, Ordering},
    },
};

use async_trait::async_trait;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::channel::{Channel, ChannelEvent, FrameSink, Transport, TransportError};

struct Member {
    id: Uuid,
    tx: mpsc::UnboundedSender<ChannelEvent>,
}

#[derive(Default)]
struct Inner {
    rooms: HashMap<String, Vec<Member>>,
    refused: HashSet<String>,
}

/// In-memory relay hub. Cheap to clone; clones share rooms.
#[derive(Clone)]
pub struct MemoryHub {
    inner: Arc<RwLock<Inner>>,
    echo_to_sender: bool,
}

impl Default for MemoryHub {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryHub {
    /// Create a hub that echoes frames back to their sender.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner::default())),
            echo_to_sender: true,
        }
    }

    /// Create a hub that does not echo frames back to their sender.
    #[must_use]
    pub fn without_echo() -> Self {
        Self {
            echo_to_sender: false,
            ..Self::new()
        }
    }

    /// Join a room and get a channel to it.
    #[must_use]
    pub fn join(&self, room: &str) -> Channel {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .rooms
            .entry(room.to_owned())
            .or_default()
            .push(Member { id, tx });

        let sink = MemorySink {
            hub: self.clone(),
            room: room.to_owned(),
            id,
            closed: AtomicBool::new(false),
        };
        Channel::new(sink, rx)
    }

    /// Make future `open` calls for `endpoint` fail.
    pub fn refuse(&self, endpoint: &str) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .refused
            .insert(endpoint.to_owned());
    }

    /// Deliver a transport error to every member of a room.
    pub fn inject_error(&self, room: &str, message: &str) {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        for member in inner.rooms.get(room).into_iter().flatten() {
            let _ = member.tx.send(ChannelEvent::Error(message.to_owned()));
        }
    }

    /// Close every channel in a room. Returns how many were closed.
    pub fn close_room(&self, room: &str) -> usize {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .rooms
            .remove(room)
            .map_or(0, |members| members.len())
    }

    /// Number of open channels in a room.
    #[must_use]
    pub fn member_count(&self, room: &str) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .rooms
            .get(room)
            .map_or(0, Vec::len)
    }

    fn publish(&self, room: &str, from: Uuid, frame: &str) -> Result<usize, TransportError> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let members = inner.rooms.get_mut(room).ok_or(TransportError::Closed)?;
        if !members.iter().any(|m| m.id == from) {
            return Err(TransportError::Closed);
        }

        let mut delivered = 0;
        members.retain(|member| {
            if member.id == from && !self.echo_to_sender {
                return true;
            }
            let alive = member.tx.send(ChannelEvent::Frame(frame.to_owned())).is_ok();
            if alive {
                delivered += 1;
            }
            alive
        });
        Ok(delivered)
    }

    fn leave(&self, room: &str, id: Uuid) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(members) = inner.rooms.get_mut(room) {
            members.retain(|m| m.id != id);
            if members.is_empty() {
                inner.rooms.remove(room);
            }
        }
    }
}

#[async_trait]
impl Transport for MemoryHub {
    async fn open(&self, endpoint: &str) -> Result<Channel, TransportError> {
        let refused = self
            .inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .refused
            .contains(endpoint);
        if refused {
            return Err(TransportError::Connect {
                endpoint: endpoint.to_owned(),
                reason: "connection refused".into(),
            });
        }
        Ok(self.join(endpoint))
    }
}

struct MemorySink {
    hub: MemoryHub,
    room: String,
    id: Uuid,
    closed: AtomicBool,
}

impl FrameSink for MemorySink {
    fn send_frame(&self, frame: String) -> Result<(), TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        self.hub.publish(&self.room, self.id, &frame).map(|_| ())
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.hub.leave(&self.room, self.id);
        }
    }
}
