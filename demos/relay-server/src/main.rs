//! Reference relay for peersync peers.
//!
//! Run with: cargo run -p relay-server-demo
//!
//! Then point peers at ws://127.0.0.1:3000/ws. Every frame is echoed to
//! every peer, the sender included, unless `--no-echo` is given.

use std::net::SocketAddr;

use clap::Parser;
use peersync_transport::{RelayState, create_relay_router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "relay-server", about = "WebSocket relay for peersync peers")]
struct Cli {
    #[arg(
        long,
        env = "PEERSYNC_RELAY_ADDR",
        default_value = "127.0.0.1:3000",
        help = "Address to listen on"
    )]
    addr: SocketAddr,

    #[arg(long, help = "Do not echo frames back to their sender")]
    no_echo: bool,
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

    let app = create_relay_router(RelayState::new(!cli.no_echo))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    tracing::info!(echo = !cli.no_echo, "Relay listening on ws://{}/ws", cli.addr);

    let listener = tokio::net::TcpListener::bind(cli.addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
