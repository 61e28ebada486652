//! Headless peer that syncs a wandering dot with every other peer.
//!
//! Run with: cargo run -p headless-peer-demo -- --endpoint ws://127.0.0.1:3000/ws
//!
//! Start the relay first (`cargo run -p relay-server-demo`), then run two or
//! more peers. Each logs the proxies it creates, pauses and kills, and every
//! few seconds starts or stops a "wave" action addressed to everyone it sees.

use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock},
    time::Duration,
};

use clap::Parser;
use peersync_engine::{
    EventBus, PeerId, ProxyFactory, StatePayload, SyncConfig, SyncEngine, SyncEvent, Topic,
    WsTransport,
};
use serde::{Deserialize, Serialize};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const WAVE: &str = "wave";

#[derive(Parser, Debug)]
#[command(name = "headless-peer", about = "Sync a wandering dot with other peers")]
struct Cli {
    #[arg(
        long,
        env = "PEERSYNC_ENDPOINT",
        default_value = "ws://127.0.0.1:3000/ws",
        help = "Relay endpoint"
    )]
    endpoint: String,

    #[arg(long, help = "Display name (local only)")]
    name: Option<String>,

    #[arg(long, default_value_t = 5, help = "Seconds between wave start/stop")]
    wave_every: u64,

    #[arg(long, help = "Log engine diagnostics")]
    debug: bool,
}

/// What goes on the wire for a dot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct DotState {
    x: f64,
    y: f64,
    color: String,
}

#[derive(Debug)]
struct Dot {
    state: DotState,
    faded: bool,
}

type DotHandle = Arc<RwLock<Dot>>;

fn new_dot(state: DotState) -> DotHandle {
    Arc::new(RwLock::new(Dot {
        state,
        faded: false,
    }))
}

/// Builds proxy dots for remote peers.
#[derive(Default)]
struct Proxies {
    live: HashMap<PeerId, DotHandle>,
}

impl ProxyFactory<DotHandle> for Proxies {
    fn create(&mut self, id: &PeerId, payload: &StatePayload) -> DotHandle {
        let state = serde_json::from_value::<DotState>(payload.clone()).unwrap_or_else(|e| {
            tracing::warn!(peer = %id, "unexpected dot payload: {e}");
            DotState::default()
        });
        tracing::info!(peer = %id, color = %state.color, "peer joined");
        let dot = new_dot(state);
        self.live.insert(id.clone(), Arc::clone(&dot));
        dot
    }

    fn dispose(&mut self, id: &PeerId, _handle: DotHandle) {
        self.live.remove(id);
        tracing::info!(peer = %id, remaining = self.live.len(), "peer gone");
    }
}

fn seeded_state(id: &PeerId) -> DotState {
    let seed = id
        .as_str()
        .get(..6)
        .and_then(|hex| u32::from_str_radix(hex, 16).ok())
        .unwrap_or(0);
    DotState {
        x: f64::from(seed % 200),
        y: f64::from((seed >> 8) % 200),
        color: format!("#{seed:06x}"),
    }
}

fn subscribe(bus: &mut EventBus<DotHandle>) {
    bus.on(Topic::SocketOpen, |engine, _| {
        tracing::info!(peer = %engine.id(), name = ?engine.name(), "connected");
        engine.start_broadcast();
    });
    bus.on(Topic::SocketError, |_, event| {
        if let SyncEvent::SocketError { message } = event {
            tracing::warn!("socket error: {message}");
        }
    });
    bus.on(Topic::SocketClose, |_, _| tracing::info!("disconnected"));

    bus.bind_factory(Proxies::default());

    bus.on(Topic::ObjectUpdate, |_, event| {
        if let SyncEvent::ObjectUpdate {
            handle, payload, ..
        } = event
        {
            if let Ok(state) = serde_json::from_value::<DotState>(payload.clone()) {
                let mut dot = handle.write().unwrap_or_else(PoisonError::into_inner);
                dot.state = state;
                dot.faded = false;
            }
        }
    });
    bus.on(Topic::ObjectPause, |_, event| {
        if let SyncEvent::ObjectPause { id, handle } = event {
            let mut dot = handle.write().unwrap_or_else(PoisonError::into_inner);
            if !dot.faded {
                dot.faded = true;
                tracing::info!(peer = %id, "peer went quiet");
            }
        }
    });
    bus.on(Topic::ActionStart(WAVE.into()), |_, event| {
        if let SyncEvent::ActionStart {
            sender, handles, ..
        } = event
        {
            tracing::info!(peer = %sender, waving_at = handles.len(), "wave started");
        }
    });
    bus.on(Topic::ActionStop(WAVE.into()), |_, event| {
        if let Some(sender) = event.peer() {
            tracing::info!(peer = %sender, "wave stopped");
        }
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = SyncConfig::new(cli.endpoint).with_debug_logging(cli.debug);
    let mut engine: SyncEngine<DotHandle> = SyncEngine::new(config, WsTransport::new())?;
    if let Some(name) = cli.name {
        engine.set_name(name);
    }

    let local = new_dot(seeded_state(engine.id()));
    engine.track(Arc::clone(&local), |dot| {
        dot.read()
            .unwrap_or_else(PoisonError::into_inner)
            .state
            .clone()
    });

    // Stand-in for dragging: walk the local dot in a circle
    let mover = Arc::clone(&local);
    tokio::spawn(async move {
        let mut step = tokio::time::interval(Duration::from_millis(50));
        let mut angle: f64 = 0.0;
        loop {
            step.tick().await;
            angle += 0.05;
            let mut dot = mover.write().unwrap_or_else(PoisonError::into_inner);
            dot.state.x = 100.0 + 80.0 * angle.cos();
            dot.state.y = 100.0 + 80.0 * angle.sin();
        }
    });

    let mut bus = EventBus::new();
    subscribe(&mut bus);

    engine.connect(None).await;

    let mut wave = tokio::time::interval(Duration::from_secs(cli.wave_every.max(1)));
    wave.tick().await;
    let mut waving = false;

    loop {
        tokio::select! {
            event = engine.next_event() => match event {
                Some(event) => {
                    bus.dispatch(&mut engine, &event);
                }
                None => break,
            },
            _ = wave.tick() => {
                if waving {
                    waving = !engine.stop_action(WAVE);
                } else {
                    let everyone: Vec<PeerId> = std::iter::once(engine.id().clone())
                        .chain(engine.registry().remote_ids().cloned())
                        .collect();
                    waving = engine.start_action(WAVE, everyone);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("leaving");
                engine.leave();
            }
        }
    }

    Ok(())
}
