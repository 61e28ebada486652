//! Sync engine for one local object and its remote peers.

use std::{collections::VecDeque, sync::Arc, time::Duration};

use peersync_core::{
    ConfigError, Identity, Lifecycle, PeerId, Registry, StatePayload, SyncConfig, SyncEvent,
    WireMessage,
};
use peersync_transport::{Channel, ChannelEvent, Transport};
use serde::Serialize;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};

use crate::EventBus;

/// Diagnostic log, gated on `debug_logging`.
macro_rules! diag {
    ($engine:expr, $($arg:tt)+) => {
        if $engine.config.debug_logging {
            tracing::debug!($($arg)+);
        }
    };
}

/// Turns the local handle into the payload broadcast to peers.
pub type Extractor<H> = Box<dyn Fn(&H) -> Result<StatePayload, serde_json::Error> + Send + Sync>;

struct LocalTrack<H> {
    handle: H,
    extractor: Extractor<H>,
}

/// Peer sync engine.
///
/// Owns the channel, the remote registry and both timers. Single owner, no
/// locks: the host drives it by awaiting [`SyncEngine::next_event`] (or
/// [`SyncEngine::run`]) and reacts to each event before pulling the next,
/// so a handle registered while handling `ObjectCreate` is in place before
/// the next frame is dispatched.
///
/// `H` is the host's handle type: a cheap, clonable reference to a proxy
/// object (an index, a key, an `Arc`). The host owns the objects.
pub struct SyncEngine<H> {
    config: SyncConfig,
    identity: Identity,
    transport: Arc<dyn Transport>,
    channel: Option<Channel>,
    registry: Registry<H>,
    local: Option<LocalTrack<H>>,
    broadcast_timer: Option<Interval>,
    liveness_timer: Option<Interval>,
    pending: VecDeque<SyncEvent<H>>,
}

impl<H> std::fmt::Debug for SyncEngine<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("id", self.identity.id())
            .field("connected", &self.channel.is_some())
            .field("broadcasting", &self.broadcast_timer.is_some())
            .field("entries", &self.registry.len())
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

impl<H: Clone + 'static> SyncEngine<H> {
    /// Create an engine with a fresh peer id.
    ///
    /// # Errors
    /// Returns error if the config is invalid. No timer is started.
    pub fn new(
        config: SyncConfig,
        transport: impl Transport + 'static,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            identity: Identity::new(),
            transport: Arc::new(transport),
            channel: None,
            registry: Registry::new(),
            local: None,
            broadcast_timer: None,
            liveness_timer: None,
            pending: VecDeque::new(),
        })
    }

    /// Create an engine and connect right away if `auto_connect` is set.
    ///
    /// # Errors
    /// Returns error if the config is invalid.
    pub async fn init(
        config: SyncConfig,
        transport: impl Transport + 'static,
    ) -> Result<Self, ConfigError> {
        let mut engine = Self::new(config, transport)?;
        if engine.config.auto_connect {
            engine.connect(None).await;
        }
        Ok(engine)
    }

    /// Replace the generated identity. Call before `track`.
    #[must_use]
    pub fn with_identity(mut self, identity: Identity) -> Self {
        self.identity = identity;
        self
    }

    /// The local peer id.
    #[must_use]
    pub const fn id(&self) -> &PeerId {
        self.identity.id()
    }

    /// The display name, if set.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.identity.name()
    }

    /// Set the display name. Not transmitted.
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.identity.set_name(name);
    }

    /// The engine config.
    #[must_use]
    pub const fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// The remote registry.
    #[must_use]
    pub const fn registry(&self) -> &Registry<H> {
        &self.registry
    }

    /// Current lifecycle of a peer's object.
    #[must_use]
    pub fn lifecycle(&self, id: &PeerId) -> Lifecycle {
        self.registry
            .lifecycle(id, Instant::now(), self.config.timeouts())
    }

    /// Whether a channel is open.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.channel.is_some()
    }

    /// Whether the broadcast loop is running.
    #[must_use]
    pub const fn is_broadcasting(&self) -> bool {
        self.broadcast_timer.is_some()
    }

    /// Whether a local object is tracked.
    #[must_use]
    pub const fn is_tracking(&self) -> bool {
        self.local.is_some()
    }

    /// Open a channel to `endpoint`, or to the configured endpoint.
    ///
    /// Never fails: success queues `SocketOpen` and starts the liveness
    /// sweep, failure queues `SocketError`. An already open channel is
    /// closed first and gets its own `SocketClose`.
    pub async fn connect(&mut self, endpoint: Option<&str>) {
        let endpoint = endpoint.map_or_else(|| self.config.endpoint.clone(), str::to_owned);
        if self.channel.is_some() {
            self.close_channel();
        }
        diag!(self, %endpoint, "connecting");

        match self.transport.open(&endpoint).await {
            Ok(channel) => {
                tracing::info!(peer = %self.identity.id(), %endpoint, "channel open");
                self.channel = Some(channel);
                self.liveness_timer = Some(periodic(self.config.check_interval()));
                self.pending.push_back(SyncEvent::SocketOpen);
            }
            Err(e) => {
                tracing::warn!(%endpoint, "connect failed: {e}");
                self.pending.push_back(SyncEvent::SocketError {
                    message: e.to_string(),
                });
            }
        }
    }

    /// Close the channel. Queues `SocketClose` and stops both timers.
    /// No-op when not connected.
    pub fn disconnect(&mut self) {
        self.close_channel();
    }

    /// Tell peers the local object is gone, then disconnect.
    pub fn leave(&mut self) {
        self.send_kill();
        self.disconnect();
    }

    /// Track the local object. Replaces any previous tracking.
    ///
    /// `extractor` runs on every broadcast, so payloads always reflect the
    /// object's current state. The local id is registered to `handle` so
    /// actions addressing it resolve.
    pub fn track<F, T>(&mut self, handle: H, extractor: F)
    where
        F: Fn(&H) -> T + Send + Sync + 'static,
        T: Serialize,
    {
        self.registry
            .register_local(self.identity.id().clone(), handle.clone(), Instant::now());
        self.local = Some(LocalTrack {
            handle,
            extractor: Box::new(move |h: &H| serde_json::to_value(extractor(h))),
        });
    }

    /// Attach a host-created proxy to a peer id.
    pub fn register_object(&mut self, id: impl Into<PeerId>, handle: H) {
        let id = id.into();
        diag!(self, peer = %id, "object registered");
        self.registry.register(id, handle, Instant::now());
    }

    /// Start sending the local object's state every broadcast interval.
    /// Already running: no-op.
    pub fn start_broadcast(&mut self) {
        if self.broadcast_timer.is_none() {
            self.broadcast_timer = Some(periodic(self.config.broadcast_interval()));
        }
    }

    /// Stop the broadcast loop. Not running: no-op.
    pub fn stop_broadcast(&mut self) {
        self.broadcast_timer = None;
    }

    /// Send one object-update now.
    ///
    /// Returns false, without sending, when nothing is tracked, the channel
    /// is not open, or the payload cannot be serialized.
    pub fn broadcast_now(&self) -> bool {
        if self.channel.is_none() {
            diag!(self, "no open channel, skipping broadcast");
            return false;
        }
        let Some(local) = &self.local else {
            diag!(self, "nothing tracked, skipping broadcast");
            return false;
        };
        let data = match (local.extractor)(&local.handle) {
            Ok(data) => data,
            Err(e) => {
                tracing::warn!("Failed to extract local state: {e}");
                return false;
            }
        };
        self.send(&WireMessage::UpdateObject {
            id: self.identity.id().clone(),
            data,
        })
    }

    /// Tell peers to kill the local object's proxies.
    pub fn send_kill(&self) -> bool {
        self.send(&WireMessage::KillObject {
            id: self.identity.id().clone(),
        })
    }

    /// Broadcast the start of an action involving `objects`.
    pub fn start_action<I>(&self, action_type: impl Into<String>, objects: I) -> bool
    where
        I: IntoIterator,
        I::Item: Into<PeerId>,
    {
        self.send(&WireMessage::ActionStart {
            id: self.identity.id().clone(),
            action_type: action_type.into(),
            objects: objects.into_iter().map(Into::into).collect(),
        })
    }

    /// Broadcast the end of an action.
    pub fn stop_action(&self, action_type: impl Into<String>) -> bool {
        self.send(&WireMessage::ActionStop {
            id: self.identity.id().clone(),
            action_type: action_type.into(),
        })
    }

    /// Wait for the next event.
    ///
    /// Drives the channel and both timers while waiting. Returns `None`
    /// once no channel is open and every queued event has been taken.
    /// Cancel safe.
    pub async fn next_event(&mut self) -> Option<SyncEvent<H>> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }
            let channel = self.channel.as_mut()?;

            tokio::select! {
                incoming = channel.recv() => self.on_channel_event(incoming),
                () = tick(self.broadcast_timer.as_mut()) => {
                    self.broadcast_now();
                }
                () = tick(self.liveness_timer.as_mut()) => self.sweep(),
            }
        }
    }

    /// Pump events into `bus` until the channel closes.
    pub async fn run(&mut self, bus: &mut EventBus<H>) {
        while let Some(event) = self.next_event().await {
            bus.dispatch(self, &event);
        }
    }

    /// Dispatch one inbound text frame, queueing the resulting events.
    ///
    /// Frames from the local id, unknown message types and malformed frames
    /// are dropped without an event.
    pub fn dispatch_frame(&mut self, frame: &str) {
        let msg = match WireMessage::decode(frame) {
            Ok(msg) => msg,
            Err(e) => {
                diag!(self, "dropping frame: {e}");
                return;
            }
        };
        if msg.sender() == self.identity.id() {
            return;
        }

        match msg {
            WireMessage::UpdateObject { id, data } => {
                if let Some(event) = self.registry.observe_update(&id, data, Instant::now()) {
                    if matches!(event, SyncEvent::ObjectCreate { .. }) {
                        diag!(self, peer = %id, "remote object created");
                    }
                    self.pending.push_back(event);
                }
            }
            WireMessage::KillObject { id } => {
                if let Some(event) = self.registry.kill(&id) {
                    diag!(self, peer = %id, "remote object killed by peer");
                    self.pending.push_back(event);
                }
            }
            WireMessage::ActionStart {
                id,
                action_type,
                objects,
            } => {
                let handles = self.registry.resolve(&objects);
                diag!(
                    self,
                    peer = %id,
                    %action_type,
                    requested = objects.len(),
                    resolved = handles.len(),
                    "action started"
                );
                self.pending.push_back(SyncEvent::ActionStart {
                    action_type,
                    sender: id,
                    handles,
                });
            }
            WireMessage::ActionStop { id, action_type } => {
                diag!(self, peer = %id, %action_type, "action stopped");
                self.pending.push_back(SyncEvent::ActionStop {
                    action_type,
                    sender: id,
                });
            }
        }
    }

    fn on_channel_event(&mut self, incoming: Option<ChannelEvent>) {
        match incoming {
            Some(ChannelEvent::Frame(frame)) => self.dispatch_frame(&frame),
            Some(ChannelEvent::Error(message)) => {
                tracing::warn!(peer = %self.identity.id(), "transport error: {message}");
                self.pending.push_back(SyncEvent::SocketError { message });
            }
            None => {
                tracing::info!(peer = %self.identity.id(), "channel closed by remote");
                self.close_channel();
            }
        }
    }

    fn sweep(&mut self) {
        let events = self
            .registry
            .sweep(Instant::now(), self.config.timeouts());
        for event in &events {
            if let SyncEvent::ObjectKill { id, .. } = event {
                diag!(self, peer = %id, "remote object timed out");
            }
        }
        self.pending.extend(events);
    }

    fn send(&self, msg: &WireMessage) -> bool {
        let Some(channel) = &self.channel else {
            diag!(self, kind = msg.kind(), "no open channel, dropping message");
            return false;
        };
        let frame = match msg.encode() {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!("Failed to serialize message: {e}");
                return false;
            }
        };
        match channel.send(frame) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(kind = msg.kind(), "send failed: {e}");
                false
            }
        }
    }

    fn close_channel(&mut self) {
        if let Some(channel) = self.channel.take() {
            channel.close();
            self.broadcast_timer = None;
            self.liveness_timer = None;
            self.pending.push_back(SyncEvent::SocketClose);
            tracing::info!(peer = %self.identity.id(), "channel closed");
        }
    }
}

/// Interval whose first tick is one period from now.
fn periodic(period: Duration) -> Interval {
    let mut interval = time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval
}

async fn tick(timer: Option<&mut Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending().await,
    }
}
