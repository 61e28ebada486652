//! WebSocket client transport.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_tungstenite::tungstenite::Message;

use crate::channel::{Channel, ChannelEvent, FrameSink, Transport, TransportError};

/// Opens WebSocket channels (`ws://` or `wss://`).
#[derive(Debug, Default, Clone, Copy)]
pub struct WsTransport;

impl WsTransport {
    /// Create a WebSocket transport.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn open(&self, endpoint: &str) -> Result<Channel, TransportError> {
        let (stream, _response) = tokio_tungstenite::connect_async(endpoint)
            .await
            .map_err(|e| TransportError::Connect {
                endpoint: endpoint.to_owned(),
                reason: e.to_string(),
            })?;
        tracing::debug!(endpoint, "WebSocket connected");

        let (mut sender, mut receiver) = stream.split();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Message>();
        let (in_tx, in_rx) = mpsc::unbounded_channel::<ChannelEvent>();

        // Forward queued frames to the socket
        tokio::spawn(async move {
            while let Some(msg) = out_rx.recv().await {
                let closing = matches!(msg, Message::Close(_));
                if sender.send(msg).await.is_err() || closing {
                    break;
                }
            }
        });

        // Forward socket frames to the channel; dropping `in_tx` ends it
        let reader = tokio::spawn(async move {
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
                        tracing::warn!("WebSocket error: {e}");
                        let _ = in_tx.send(ChannelEvent::Error(e.to_string()));
                        break;
                    }
                };
                if in_tx.send(ChannelEvent::Frame(text)).is_err() {
                    break;
                }
            }
        });

        Ok(Channel::new(
            WsSink {
                outbound: out_tx,
                reader,
            },
            in_rx,
        ))
    }
}

struct WsSink {
    outbound: mpsc::UnboundedSender<Message>,
    reader: JoinHandle<()>,
}

impl FrameSink for WsSink {
    fn send_frame(&self, frame: String) -> Result<(), TransportError> {
        self.outbound
            .send(Message::text(frame))
            .map_err(|_| TransportError::Closed)
    }

    fn close(&self) {
        let _ = self.outbound.send(Message::Close(None));
        self.reader.abort();
    }
}
