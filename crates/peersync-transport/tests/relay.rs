//! WebSocket clients talking through a live relay.

use std::time::Duration;

use peersync_transport::{
    Channel, ChannelEvent, RelayState, Transport, TransportError, WsTransport,
    create_relay_router,
};
use tokio::{
    net::TcpListener,
    time::{sleep, timeout},
};
use tokio_test::{assert_err, assert_ok};

const WAIT: Duration = Duration::from_secs(5);

async fn serve(state: RelayState) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, create_relay_router(state))
            .await
            .unwrap();
    });
    format!("ws://{addr}/ws")
}

async fn wait_for_connections(state: &RelayState, count: usize) {
    timeout(WAIT, async {
        while state.connection_count() != count {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("relay connection count never settled");
}

async fn next_frame(channel: &mut Channel) -> String {
    match timeout(WAIT, channel.recv()).await {
        Ok(Some(ChannelEvent::Frame(text))) => text,
        other => panic!("expected a frame, got {other:?}"),
    }
}

async fn two_peers(state: &RelayState) -> (Channel, Channel) {
    let endpoint = serve(state.clone()).await;
    let a = assert_ok!(WsTransport::new().open(&endpoint).await);
    let b = assert_ok!(WsTransport::new().open(&endpoint).await);
    wait_for_connections(state, 2).await;
    (a, b)
}

#[tokio::test]
async fn test_frames_reach_peers_and_echo_to_sender() {
    let state = RelayState::default();
    let (mut a, mut b) = two_peers(&state).await;

    assert_ok!(a.send("hello"));
    assert_eq!(next_frame(&mut b).await, "hello");
    assert_eq!(next_frame(&mut a).await, "hello");
}

#[tokio::test]
async fn test_no_echo_skips_sender() {
    let state = RelayState::new(false);
    let (mut a, mut b) = two_peers(&state).await;

    assert_ok!(a.send("hello"));
    assert_eq!(next_frame(&mut b).await, "hello");

    // relay order is per subscriber, so an echoed "hello" would arrive first
    assert_ok!(b.send("ping"));
    assert_eq!(next_frame(&mut a).await, "ping");
    assert!(b.try_recv().is_none());
}

#[tokio::test]
async fn test_close_leaves_relay() {
    let state = RelayState::default();
    let (a, mut b) = two_peers(&state).await;

    a.close();
    wait_for_connections(&state, 1).await;

    assert_ok!(b.send("still here"));
    assert_eq!(next_frame(&mut b).await, "still here");
}

#[tokio::test]
async fn test_connect_refused() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let endpoint = format!("ws://{addr}/ws");
    let err = assert_err!(WsTransport::new().open(&endpoint).await);
    assert!(matches!(&err, TransportError::Connect { endpoint: e, .. } if *e == endpoint));
}
