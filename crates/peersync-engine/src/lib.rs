//! Peer object sync engine.
//!
//! Provides:
//! - `SyncEngine` - Broadcast loop, inbound dispatch, liveness sweep, actions
//! - `EventBus` - Topic subscriptions and the `ProxyFactory` hook
//!
//! # Example
//! ```ignore
//! let config = SyncConfig::new("ws://127.0.0.1:3000/ws");
//! let mut engine = SyncEngine::init(config, WsTransport::new()).await?;
//! engine.connect(None).await;
//! engine.track(dot.clone(), |dot| dot.read().map(|d| *d).ok());
//!
//! let mut bus = EventBus::new();
//! bus.on(Topic::SocketOpen, |engine, _| engine.start_broadcast());
//! bus.bind_factory(Proxies::default());
//! engine.run(&mut bus).await;
//! ```

pub mod bus;
pub mod engine;

pub use bus::{EventBus, Handler, ProxyFactory, SubscriptionId};
pub use engine::{Extractor, SyncEngine};

pub use peersync_core::{
    ConfigError, Identity, Lifecycle, PeerId, StatePayload, SyncConfig, SyncEvent, Topic,
};
pub use peersync_transport::{MemoryHub, Transport};

#[cfg(feature = "websocket")]
pub use peersync_transport::WsTransport;
