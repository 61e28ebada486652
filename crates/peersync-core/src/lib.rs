//! Core types for peer object synchronization.
//!
//! This crate provides the transport-independent building blocks:
//! - `PeerId` / `Identity` - Who sent a frame, who owns an object
//! - `WireMessage` - The four JSON frame kinds
//! - `Registry` - Remote proxies and their liveness lifecycle
//! - `SyncEvent` / `Topic` - What the host gets told
//! - `SyncConfig` - Timings and endpoint

pub mod config;
pub mod event;
pub mod identity;
pub mod protocol;
pub mod registry;

pub use config::{ConfigError, SyncConfig, Timeouts};
pub use event::{SyncEvent, Topic};
pub use identity::{Identity, PeerId};
pub use protocol::{CodecError, StatePayload, WireMessage};
pub use registry::{EntrySlot, Lifecycle, Registry, RemoteEntry};
