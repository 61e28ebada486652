//! WebSocket relay server.
//!
//! Rebroadcasts every text frame to every connected socket. By default the
//! sender gets its own frames back, so peers must filter by sender id.

use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::broadcast;
use tokio_stream::wrappers::{BroadcastStream, errors::BroadcastStreamRecvError};
use uuid::Uuid;

/// Frames buffered per subscriber before a slow socket starts losing them.
const RELAY_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
struct RelayFrame {
    from: Uuid,
    text: String,
}

/// Relay handler state.
#[derive(Clone)]
pub struct RelayState {
    frames: broadcast::Sender<RelayFrame>,
    echo_to_sender: bool,
}

impl Default for RelayState {
    fn default() -> Self {
        Self::new(true)
    }
}

impl RelayState {
    /// Create relay state.
    #[must_use]
    pub fn new(echo_to_sender: bool) -> Self {
        let (frames, _) = broadcast::channel(RELAY_CAPACITY);
        Self {
            frames,
            echo_to_sender,
        }
    }

    /// Number of connected sockets.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.frames.receiver_count()
    }
}

/// WebSocket upgrade handler.
///
/// Use this as an Axum route handler.
pub async fn relay_handler(
    ws: WebSocketUpgrade,
    State(state): State<RelayState>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: RelayState) {
    let connection = Uuid::new_v4();
    let (mut sender, mut receiver) = socket.split();
    let mut frames = BroadcastStream::new(state.frames.subscribe());
    let echo_to_sender = state.echo_to_sender;
    tracing::info!(%connection, "relay connection opened");

    // Forward relayed frames to this socket
    let send_task = tokio::spawn(async move {
        while let Some(next) = frames.next().await {
            let frame = match next {
                Ok(frame) => frame,
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    tracing::warn!(%connection, skipped, "relay subscriber lagged");
                    continue;
                }
            };
            if frame.from == connection && !echo_to_sender {
                continue;
            }
            if sender.send(Message::Text(frame.text.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(msg) = receiver.next().await {
        let text = match msg {
            Ok(Message::Text(text)) => text.as_str().to_owned(),
            Ok(Message::Binary(data)) => match String::from_utf8(data.to_vec()) {
                Ok(s) => s,
                Err(_) => continue,
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                tracing::warn!(%connection, "WebSocket error: {e}");
                break;
            }
        };
        let _ = state.frames.send(RelayFrame {
            from: connection,
            text,
        });
    }

    send_task.abort();
    tracing::info!(%connection, "relay connection closed");
}

/// Create the relay router, serving the relay at `/ws`.
///
/// # Example
/// ```ignore
/// let app = Router::new().merge(create_relay_router(RelayState::default()));
/// ```
#[must_use]
pub fn create_relay_router(state: RelayState) -> axum::Router {
    axum::Router::new()
        .route("/ws", axum::routing::get(relay_handler))
        .with_state(state)
}
