//! Integration tests for the WebSocket transport
//!
//! A loopback server is started on an ephemeral port for each test.

use futures::{SinkExt, StreamExt};
use segstream_core::*;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_test::assert_ok;
use tokio_tungstenite::{accept_async, tungstenite::Message};

/// Start a server that pushes `outgoing` to the first client and reports
/// every text message it receives.
async fn start_server(outgoing: Vec<Message>) -> (String, mpsc::UnboundedReceiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (seen_tx, seen_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        for message in outgoing {
            ws.send(message).await.unwrap();
        }
        while let Some(Ok(message)) = ws.next().await {
            match message {
                Message::Text(text) => {
                    let _ = seen_tx.send(text);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    (format!("ws://{}/live/mse_ld", addr), seen_rx)
}

#[tokio::test]
async fn test_frames_are_delivered_in_order() {
    let (url, _seen) = start_server(vec![
        Message::Text(r#"{"type":"media","id":1,"payload":"AA=="}"#.to_string()),
        Message::Binary(vec![0, 0, 0, 1, 42]),
        Message::Binary(vec![0, 0, 0, 2, 43]),
    ])
    .await;

    let mut transport = WebSocketTransport::default();
    let mut frames = transport.open(&OpenParams::new(url)).await.unwrap();
    assert!(transport.is_connected());

    let first = frames.recv().await.unwrap();
    assert!(!first.is_binary());
    assert_eq!(
        frames.recv().await.unwrap(),
        Frame::Binary(bytes::Bytes::from_static(&[0, 0, 0, 1, 42]))
    );
    let third = frames.recv().await.unwrap();
    let seg = BinarySegment::parse(match &third {
        Frame::Binary(data) => data,
        other => panic!("expected binary frame, got {:?}", other),
    })
    .unwrap();
    assert_eq!(seg.track_id, 2);

    transport.close().await.unwrap();
    assert!(!transport.is_connected());
}

#[tokio::test]
async fn test_commands_reach_server() {
    let (url, mut seen) = start_server(vec![]).await;

    let mut transport = WebSocketTransport::default();
    let _frames = transport.open(&OpenParams::new(url)).await.unwrap();

    assert_ok!(transport.send(&Command::Resume));
    assert_ok!(transport.send(&Command::Seek(SeekTarget::At("1700000000".to_string()))));

    let first = tokio::time::timeout(Duration::from_secs(5), seen.recv())
        .await
        .unwrap()
        .unwrap();
    let second = tokio::time::timeout(Duration::from_secs(5), seen.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first, "resume");
    assert_eq!(second, "play_from=1700000000");

    transport.close().await.unwrap();
}

#[tokio::test]
async fn test_open_failure_is_transport_error() {
    // Bind and immediately drop to get a port nobody listens on
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let mut transport = WebSocketTransport::new(ConnectionConfig {
        timeout: Duration::from_secs(2),
    });
    let err = transport
        .open(&OpenParams::new(format!("ws://{}/", addr)))
        .await
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Transport);
    assert!(!transport.is_connected());
}

#[tokio::test]
async fn test_close_returns_when_peer_stops_reading() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let _ws = accept_async(stream).await.unwrap();
        // Hold the connection open without ever reading from it
        tokio::time::sleep(Duration::from_secs(30)).await;
    });

    let mut transport = WebSocketTransport::new(ConnectionConfig {
        timeout: Duration::from_millis(200),
    });
    let _frames = transport
        .open(&OpenParams::new(format!("ws://{}/live/mse_ld", addr)))
        .await
        .unwrap();

    // Enough queued data to fill both socket buffers
    let position = "9".repeat(64 * 1024);
    for _ in 0..512 {
        assert_ok!(transport.send(&Command::Seek(SeekTarget::At(position.clone()))));
    }

    let closed = tokio::time::timeout(Duration::from_secs(5), transport.close()).await;
    assert_ok!(assert_ok!(closed));
    assert!(!transport.is_connected());
}
