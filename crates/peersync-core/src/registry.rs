//! Remote object registry and liveness state machine.
//!
//! Maps each known peer to the host's proxy handle and the time its last
//! update arrived. Lifecycle is derived from that timestamp on demand:
//!
//! ```text
//!  update (unknown id)        silence > pause          silence > dead
//! ────────────────────▶ Active ───────────────▶ Stale ───────────────▶ Gone
//!                         ▲                       │
//!                         └────── update ─────────┘
//! ```
//!
//! `Gone` entries are removed; a later update starts over with a new create.

use std::collections::BTreeMap;

use tokio::time::Instant;

use crate::{PeerId, StatePayload, SyncEvent, Timeouts};

/// What the registry holds for a peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntrySlot<H> {
    /// Create was emitted, the host has not registered a handle yet.
    Placeholder,
    /// Host-created proxy.
    Live(H),
}

/// Registry record for one peer.
#[derive(Debug, Clone)]
pub struct RemoteEntry<H> {
    /// Handle state.
    pub slot: EntrySlot<H>,
    /// When the last update arrived.
    pub last_seen: Instant,
    /// Entry for the local object. Never swept.
    pub local: bool,
}

impl<H> RemoteEntry<H> {
    /// The live handle, if registered.
    #[must_use]
    pub const fn handle(&self) -> Option<&H> {
        match &self.slot {
            EntrySlot::Live(handle) => Some(handle),
            EntrySlot::Placeholder => None,
        }
    }
}

/// Liveness of a peer's object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Seen within the pause timeout.
    Active,
    /// Seen within the dead timeout but not the pause timeout.
    Stale,
    /// Not in the registry.
    Gone,
}

/// Registry of remote objects keyed by owning peer.
#[derive(Debug, Clone)]
pub struct Registry<H> {
    entries: BTreeMap<PeerId, RemoteEntry<H>>,
}

impl<H> Default for Registry<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> Registry<H> {
    /// Create an empty registry.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Number of entries, local entry and placeholders included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether an entry exists for `id`.
    #[must_use]
    pub fn contains(&self, id: &PeerId) -> bool {
        self.entries.contains_key(id)
    }

    /// Get the entry for `id`.
    #[must_use]
    pub fn get(&self, id: &PeerId) -> Option<&RemoteEntry<H>> {
        self.entries.get(id)
    }

    /// Get the live handle for `id`.
    #[must_use]
    pub fn handle(&self, id: &PeerId) -> Option<&H> {
        self.entries.get(id).and_then(RemoteEntry::handle)
    }

    /// Ids of all non-local entries, in order.
    pub fn remote_ids(&self) -> impl Iterator<Item = &PeerId> {
        self.entries
            .iter()
            .filter(|(_, entry)| !entry.local)
            .map(|(id, _)| id)
    }

    /// Derive the lifecycle state of `id` at `now`.
    #[must_use]
    pub fn lifecycle(&self, id: &PeerId, now: Instant, timeouts: Timeouts) -> Lifecycle {
        match self.entries.get(id) {
            None => Lifecycle::Gone,
            Some(entry) if entry.local => Lifecycle::Active,
            Some(entry) => {
                let silence = now.saturating_duration_since(entry.last_seen);
                if silence > timeouts.dead {
                    Lifecycle::Gone
                } else if silence > timeouts.pause {
                    Lifecycle::Stale
                } else {
                    Lifecycle::Active
                }
            }
        }
    }

    /// Attach a host handle to `id`.
    ///
    /// Fills a placeholder, replaces an existing handle, or inserts a new
    /// entry seen at `now`. Returns the replaced handle.
    pub fn register(&mut self, id: PeerId, handle: H, now: Instant) -> Option<H> {
        if let Some(entry) = self.entries.get_mut(&id) {
            return match std::mem::replace(&mut entry.slot, EntrySlot::Live(handle)) {
                EntrySlot::Live(previous) => Some(previous),
                EntrySlot::Placeholder => None,
            };
        }
        self.entries.insert(
            id,
            RemoteEntry {
                slot: EntrySlot::Live(handle),
                last_seen: now,
                local: false,
            },
        );
        None
    }

    /// Register the local object under the local id. Exempt from sweeps.
    pub fn register_local(&mut self, id: PeerId, handle: H, now: Instant) {
        self.entries.insert(
            id,
            RemoteEntry {
                slot: EntrySlot::Live(handle),
                last_seen: now,
                local: true,
            },
        );
    }

    /// Drop an entry without emitting anything.
    pub fn remove(&mut self, id: &PeerId) -> Option<RemoteEntry<H>> {
        self.entries.remove(id)
    }
}

impl<H: Clone> Registry<H> {
    /// Apply an object-update from `id`.
    ///
    /// Returns `ObjectCreate` for an unknown id (a placeholder is reserved),
    /// `ObjectUpdate` for a live entry, nothing for a placeholder. The
    /// last-seen time is refreshed in every case.
    pub fn observe_update(
        &mut self,
        id: &PeerId,
        payload: StatePayload,
        now: Instant,
    ) -> Option<SyncEvent<H>> {
        let Some(entry) = self.entries.get_mut(id) else {
            self.entries.insert(
                id.clone(),
                RemoteEntry {
                    slot: EntrySlot::Placeholder,
                    last_seen: now,
                    local: false,
                },
            );
            return Some(SyncEvent::ObjectCreate {
                id: id.clone(),
                payload,
            });
        };

        entry.last_seen = now;
        entry.handle().map(|handle| SyncEvent::ObjectUpdate {
            id: id.clone(),
            handle: handle.clone(),
            payload,
        })
    }

    /// Remove `id`, returning the kill event if it had a live handle.
    pub fn kill(&mut self, id: &PeerId) -> Option<SyncEvent<H>> {
        let entry = self.entries.remove(id)?;
        match entry.slot {
            EntrySlot::Live(handle) => Some(SyncEvent::ObjectKill {
                id: id.clone(),
                handle,
            }),
            EntrySlot::Placeholder => None,
        }
    }

    /// Advance lifecycles at `now`.
    ///
    /// Every live remote entry silent past the pause timeout yields a pause;
    /// past the dead timeout it additionally yields a kill and is removed.
    /// Placeholders past the dead timeout are dropped silently.
    pub fn sweep(&mut self, now: Instant, timeouts: Timeouts) -> Vec<SyncEvent<H>> {
        let mut events = Vec::new();
        let mut dead = Vec::new();

        for (id, entry) in &self.entries {
            if entry.local {
                continue;
            }
            let silence = now.saturating_duration_since(entry.last_seen);
            match &entry.slot {
                EntrySlot::Live(handle) => {
                    if silence > timeouts.pause {
                        events.push(SyncEvent::ObjectPause {
                            id: id.clone(),
                            handle: handle.clone(),
                        });
                    }
                    if silence > timeouts.dead {
                        events.push(SyncEvent::ObjectKill {
                            id: id.clone(),
                            handle: handle.clone(),
                        });
                        dead.push(id.clone());
                    }
                }
                EntrySlot::Placeholder => {
                    if silence > timeouts.dead {
                        tracing::debug!(peer = %id, "dropping unregistered placeholder");
                        dead.push(id.clone());
                    }
                }
            }
        }

        for id in &dead {
            self.entries.remove(id);
        }

        events
    }

    /// Resolve ids to live handles, dropping ids without one.
    #[must_use]
    pub fn resolve(&self, ids: &[PeerId]) -> Vec<H> {
        ids.iter()
            .filter_map(|id| self.handle(id).cloned())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;

    fn timeouts() -> Timeouts {
        Timeouts {
            pause: Duration::from_millis(5_000),
            dead: Duration::from_millis(15_000),
        }
    }

    fn a1() -> PeerId {
        PeerId::from("a1")
    }

    #[test]
    fn test_lifecycle_follows_silence_without_sweep() {
        let t0 = Instant::now();
        let mut registry: Registry<u32> = Registry::new();
        registry.register(a1(), 1, t0);

        let at = |secs| registry.lifecycle(&a1(), t0 + Duration::from_secs(secs), timeouts());
        assert_eq!(at(1), Lifecycle::Active);
        assert_eq!(at(10), Lifecycle::Stale);
        assert_eq!(at(60), Lifecycle::Gone);
        assert!(registry.contains(&a1()));
    }

    #[test]
    fn test_create_then_update() {
        let mut registry = Registry::new();
        let t0 = Instant::now();

        let first = registry.observe_update(&a1(), json!({"x": 1}), t0);
        assert_eq!(
            first,
            Some(SyncEvent::ObjectCreate {
                id: a1(),
                payload: json!({"x": 1})
            })
        );

        registry.register(a1(), 7u32, t0);
        let second = registry.observe_update(&a1(), json!({"x": 3}), t0);
        assert_eq!(
            second,
            Some(SyncEvent::ObjectUpdate {
                id: a1(),
                handle: 7,
                payload: json!({"x": 3})
            })
        );
    }

    #[test]
    fn test_placeholder_never_recreates() {
        let mut registry: Registry<u32> = Registry::new();
        let t0 = Instant::now();

        assert!(registry.observe_update(&a1(), json!({}), t0).is_some());
        assert!(registry.observe_update(&a1(), json!({}), t0).is_none());
        assert!(registry.observe_update(&a1(), json!({}), t0).is_none());
        assert_eq!(registry.get(&a1()).map(|e| &e.slot), Some(&EntrySlot::Placeholder));
    }

    #[test]
    fn test_update_refreshes_last_seen() {
        let mut registry = Registry::new();
        let t0 = Instant::now();
        registry.observe_update(&a1(), json!({}), t0);
        registry.register(a1(), 1u32, t0);

        let later = t0 + Duration::from_millis(6_000);
        assert_eq!(registry.lifecycle(&a1(), later, timeouts()), Lifecycle::Stale);

        registry.observe_update(&a1(), json!({}), later);
        assert_eq!(registry.lifecycle(&a1(), later, timeouts()), Lifecycle::Active);
    }

    #[test]
    fn test_sweep_pauses_without_removing() {
        let mut registry = Registry::new();
        let t0 = Instant::now();
        registry.register(a1(), 1u32, t0);

        assert!(registry.sweep(t0 + Duration::from_millis(5_000), timeouts()).is_empty());

        let events = registry.sweep(t0 + Duration::from_millis(5_001), timeouts());
        assert_eq!(events, vec![SyncEvent::ObjectPause { id: a1(), handle: 1 }]);
        assert!(registry.contains(&a1()));

        // fires again on the next sweep while the condition holds
        let events = registry.sweep(t0 + Duration::from_millis(5_100), timeouts());
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_sweep_kills_once_after_pause() {
        let mut registry = Registry::new();
        let t0 = Instant::now();
        registry.register(a1(), 1u32, t0);
        registry.register(PeerId::from("c3"), 3u32, t0 + Duration::from_millis(14_000));

        let now = t0 + Duration::from_millis(15_001);
        let events = registry.sweep(now, timeouts());
        assert_eq!(
            events,
            vec![
                SyncEvent::ObjectPause { id: a1(), handle: 1 },
                SyncEvent::ObjectKill { id: a1(), handle: 1 },
            ]
        );
        assert!(!registry.contains(&a1()));
        assert_eq!(registry.lifecycle(&a1(), now, timeouts()), Lifecycle::Gone);

        assert!(registry.sweep(now, timeouts()).is_empty());

        // a late update after the kill is a fresh create
        let event = registry.observe_update(&a1(), json!({}), now);
        assert!(matches!(event, Some(SyncEvent::ObjectCreate { .. })));
    }

    #[test]
    fn test_local_entry_is_exempt() {
        let mut registry = Registry::new();
        let t0 = Instant::now();
        registry.register_local(PeerId::from("me"), 0u32, t0);

        let now = t0 + Duration::from_secs(60);
        assert!(registry.sweep(now, timeouts()).is_empty());
        assert_eq!(
            registry.lifecycle(&PeerId::from("me"), now, timeouts()),
            Lifecycle::Active
        );
        assert_eq!(registry.remote_ids().count(), 0);
    }

    #[test]
    fn test_placeholder_expires_silently() {
        let mut registry: Registry<u32> = Registry::new();
        let t0 = Instant::now();
        registry.observe_update(&a1(), json!({}), t0);

        let events = registry.sweep(t0 + Duration::from_millis(15_001), timeouts());
        assert!(events.is_empty());
        assert!(!registry.contains(&a1()));
    }

    #[test]
    fn test_kill_placeholder_has_no_event() {
        let mut registry: Registry<u32> = Registry::new();
        registry.observe_update(&a1(), json!({}), Instant::now());
        assert!(registry.kill(&a1()).is_none());
        assert!(registry.is_empty());
        assert!(registry.kill(&a1()).is_none());
    }

    #[test]
    fn test_resolve_filters_unknown_and_placeholders() {
        let mut registry = Registry::new();
        let t0 = Instant::now();
        registry.register(a1(), 1u32, t0);
        registry.observe_update(&PeerId::from("c3"), json!({}), t0);

        let handles = registry.resolve(&[a1(), PeerId::from("b2"), PeerId::from("c3")]);
        assert_eq!(handles, vec![1]);
    }

    #[test]
    fn test_register_replaces_handle() {
        let mut registry = Registry::new();
        let t0 = Instant::now();
        assert_eq!(registry.register(a1(), 1u32, t0), None);
        assert_eq!(registry.register(a1(), 2u32, t0), Some(1));
        assert_eq!(registry.handle(&a1()), Some(&2));
    }
}
