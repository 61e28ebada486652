//! Transport layer for peersync.
//!
//! Provides:
//! - `Transport` / `Channel` - One text-frame channel per connect
//! - In-memory relay (`MemoryHub`)
//! - WebSocket client transport (feature: websocket)
//! - WebSocket relay server (feature: relay)

pub mod channel;
pub mod memory;

#[cfg(feature = "websocket")]
pub mod websocket;

#[cfg(feature = "relay")]
pub mod relay;

pub use channel::{Channel, ChannelEvent, FrameSink, Transport, TransportError};
pub use memory::MemoryHub;

#[cfg(feature = "websocket")]
pub use websocket::WsTransport;

#[cfg(feature = "relay")]
pub use relay::{RelayState, create_relay_router};
