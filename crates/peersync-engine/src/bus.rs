//! Typed subscription registry for sync events.

use peersync_core::{PeerId, StatePayload, SyncEvent, Topic};

use crate::SyncEngine;

/// Event handler. Gets the engine so it can register proxies or send.
pub type Handler<H> = Box<dyn FnMut(&mut SyncEngine<H>, &SyncEvent<H>) + Send>;

/// Subscription identifier, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

/// Host capability for building and disposing proxy objects.
///
/// Bound with [`EventBus::bind_factory`]: created proxies are registered
/// with the engine immediately, killed ones are handed back for disposal.
pub trait ProxyFactory<H>: Send {
    /// Build a proxy for a newly seen peer.
    fn create(&mut self, id: &PeerId, payload: &StatePayload) -> H;

    /// Dispose a proxy whose peer is gone.
    fn dispose(&mut self, id: &PeerId, handle: H);
}

struct Subscription<H> {
    id: SubscriptionId,
    topic: Option<Topic>,
    handler: Handler<H>,
}

/// Routes events to handlers subscribed by topic.
///
/// Handlers run in subscription order.
pub struct EventBus<H> {
    subscriptions: Vec<Subscription<H>>,
    next_id: u64,
}

impl<H> Default for EventBus<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> std::fmt::Debug for EventBus<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriptions", &self.subscriptions.len())
            .finish()
    }
}

impl<H> EventBus<H> {
    /// Create an empty bus.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            subscriptions: Vec::new(),
            next_id: 0,
        }
    }

    /// Number of subscriptions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    /// Whether there are no subscriptions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    /// Remove a subscription. Returns false if it was not found.
    pub fn off(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|s| s.id != id);
        self.subscriptions.len() != before
    }

    fn insert(&mut self, topic: Option<Topic>, handler: Handler<H>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.subscriptions.push(Subscription { id, topic, handler });
        id
    }
}

impl<H: Clone + 'static> EventBus<H> {
    /// Subscribe to one topic.
    pub fn on<F>(&mut self, topic: Topic, handler: F) -> SubscriptionId
    where
        F: FnMut(&mut SyncEngine<H>, &SyncEvent<H>) + Send + 'static,
    {
        self.insert(Some(topic), Box::new(handler))
    }

    /// Subscribe to every event.
    pub fn on_any<F>(&mut self, handler: F) -> SubscriptionId
    where
        F: FnMut(&mut SyncEngine<H>, &SyncEvent<H>) + Send + 'static,
    {
        self.insert(None, Box::new(handler))
    }

    /// Let `factory` build proxies on create and dispose them on kill.
    pub fn bind_factory(&mut self, mut factory: impl ProxyFactory<H> + 'static) -> SubscriptionId {
        self.on_any(move |engine, event| match event {
            SyncEvent::ObjectCreate { id, payload } => {
                let handle = factory.create(id, payload);
                engine.register_object(id.clone(), handle);
            }
            SyncEvent::ObjectKill { id, handle } => factory.dispose(id, handle.clone()),
            _ => {}
        })
    }

    /// Run every handler subscribed to the event's topic.
    ///
    /// Returns the number of handlers run.
    pub fn dispatch(&mut self, engine: &mut SyncEngine<H>, event: &SyncEvent<H>) -> usize {
        let topic = event.topic();
        let mut handled = 0;
        for subscription in &mut self.subscriptions {
            if subscription.topic.as_ref().is_none_or(|t| *t == topic) {
                (subscription.handler)(engine, event);
                handled += 1;
            }
        }
        handled
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{Arc, Mutex},
        time::Duration,
    };

    use peersync_core::{SyncConfig, WireMessage};
    use peersync_transport::MemoryHub;
    use serde_json::json;

    use super::*;

    const ROOM: &str = "memory://bus";

    fn engine() -> SyncEngine<u32> {
        SyncEngine::new(SyncConfig::new(ROOM), MemoryHub::new()).unwrap()
    }

    #[test]
    fn test_dispatch_by_topic() {
        let mut engine = engine();
        let mut bus: EventBus<u32> = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let log = Arc::clone(&seen);
        bus.on(Topic::ObjectPause, move |_, event| {
            log.lock().unwrap().push(event.topic().to_string());
        });
        let log = Arc::clone(&seen);
        bus.on(Topic::ActionStart("shake".into()), move |_, event| {
            log.lock().unwrap().push(event.topic().to_string());
        });

        let pause = SyncEvent::ObjectPause {
            id: "a1".into(),
            handle: 1,
        };
        let shake = SyncEvent::ActionStart {
            action_type: "shake".into(),
            sender: "a1".into(),
            handles: vec![],
        };
        let wave = SyncEvent::ActionStart {
            action_type: "wave".into(),
            sender: "a1".into(),
            handles: vec![],
        };

        assert_eq!(bus.dispatch(&mut engine, &pause), 1);
        assert_eq!(bus.dispatch(&mut engine, &shake), 1);
        assert_eq!(bus.dispatch(&mut engine, &wave), 0);
        assert_eq!(
            *seen.lock().unwrap(),
            vec!["object.pause".to_string(), "action.start.shake".to_string()]
        );
    }

    #[test]
    fn test_off_removes_handler() {
        let mut engine = engine();
        let mut bus: EventBus<u32> = EventBus::new();
        let id = bus.on_any(|_, _| {});
        assert_eq!(bus.len(), 1);

        assert!(bus.off(id));
        assert!(!bus.off(id));
        assert!(bus.is_empty());
        assert_eq!(bus.dispatch(&mut engine, &SyncEvent::SocketOpen), 0);
    }

    #[test]
    fn test_create_handler_registers_synchronously() {
        let mut engine = engine();
        let mut bus: EventBus<u32> = EventBus::new();
        bus.on(Topic::ObjectCreate, |engine, event| {
            if let SyncEvent::ObjectCreate { id, .. } = event {
                engine.register_object(id.clone(), 42);
            }
        });

        let create = SyncEvent::ObjectCreate {
            id: "a1".into(),
            payload: json!({}),
        };
        bus.dispatch(&mut engine, &create);
        assert_eq!(engine.registry().handle(&"a1".into()), Some(&42));
    }

    struct Recorder {
        next: u32,
        disposed: Arc<Mutex<Vec<(PeerId, u32)>>>,
    }

    impl ProxyFactory<u32> for Recorder {
        fn create(&mut self, _id: &PeerId, _payload: &StatePayload) -> u32 {
            self.next += 1;
            self.next
        }

        fn dispose(&mut self, id: &PeerId, handle: u32) {
            self.disposed.lock().unwrap().push((id.clone(), handle));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_with_factory() {
        let hub = MemoryHub::new();
        let mut engine: SyncEngine<u32> =
            SyncEngine::new(SyncConfig::new(ROOM), hub.clone()).unwrap();
        engine.connect(None).await;

        let disposed = Arc::new(Mutex::new(Vec::new()));
        let mut bus: EventBus<u32> = EventBus::new();
        bus.bind_factory(Recorder {
            next: 0,
            disposed: Arc::clone(&disposed),
        });
        let updates = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&updates);
        bus.on(Topic::ObjectUpdate, move |_, event| {
            if let SyncEvent::ObjectUpdate { handle, payload, .. } = event {
                log.lock().unwrap().push((*handle, payload.clone()));
            }
        });

        let peer = hub.join(ROOM);
        for x in 0..3 {
            let frame = WireMessage::UpdateObject {
                id: "a1".into(),
                data: json!({"x": x}),
            };
            peer.send(frame.encode().unwrap()).unwrap();
        }
        peer.send(WireMessage::KillObject { id: "a1".into() }.encode().unwrap())
            .unwrap();

        let closer = hub.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            closer.close_room(ROOM);
        });
        engine.run(&mut bus).await;

        assert_eq!(
            *updates.lock().unwrap(),
            vec![(1, json!({"x": 1})), (1, json!({"x": 2}))]
        );
        assert_eq!(*disposed.lock().unwrap(), vec![(PeerId::from("a1"), 1)]);
        assert!(!engine.is_connected());
    }
}
