//! Teardown paths: missed heartbeat, local close idempotence, the terminal
//! error surface.

use std::time::Duration;

use engineio_client::{Error, MessageKind, Session, SessionConfig, TransportType};
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;

mod fixture;
use fixture::{frame, open_packet, spawn_server};

#[tokio::test]
async fn missed_pong_closes_session() {
    let mut server = spawn_server(4201, []).await;
    let url = server.url.clone();

    let server_task = tokio::spawn(async move {
        let mut ws = server.ws.recv().await.unwrap();
        // short heartbeat so the test observes the timeout quickly
        ws.send(Message::text(open_packet("beat", &[], 100, 150)))
            .await
            .unwrap();
        let mut answered = false;
        while let Some(Ok(msg)) = ws.next().await {
            if let Message::Text(t) = msg {
                if t.as_str() == "2" && !answered {
                    answered = true;
                    ws.send(Message::text("3")).await.unwrap();
                }
                // every later ping goes unanswered
            }
        }
    });

    let config = SessionConfig::builder()
        .transports([TransportType::Websocket])
        .build();
    let session = Session::connect(&url, config).await.unwrap();

    let err = tokio::time::timeout(Duration::from_secs(2), session.recv())
        .await
        .expect("session should close within one ping timeout of the missed pong")
        .unwrap_err();
    assert!(matches!(err, Error::Closed));

    let err = session.send(MessageKind::Text).await.unwrap_err();
    assert!(matches!(err, Error::Closed));
    server_task.abort();
}

#[tokio::test]
async fn close_emits_a_single_close_packet() {
    let server = spawn_server(4202, [frame(&open_packet("abc", &[], 25000, 60000))]).await;
    let config = SessionConfig::builder()
        .transports([TransportType::Polling])
        .build();
    let session = Session::connect(&server.url, config).await.unwrap();

    session.close().await.unwrap();
    session.close().await.unwrap();

    server.wait_for_post(|p| p == "1:1").await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    let close_packets = server.posts().iter().filter(|p| *p == "1:1").count();
    assert_eq!(close_packets, 1);

    // the reader task drives the session to its terminal state
    let err = tokio::time::timeout(Duration::from_secs(1), session.recv())
        .await
        .expect("recv should observe the closed session")
        .unwrap_err();
    assert!(matches!(err, Error::Closed));
}

#[tokio::test]
async fn emit_posts_framed_message_payloads() {
    let server = spawn_server(4203, [frame(&open_packet("abc", &[], 25000, 60000))]).await;
    let config = SessionConfig::builder()
        .transports([TransportType::Polling])
        .build();
    let session = Session::connect(&server.url, config).await.unwrap();

    session.emit("hi").await.unwrap();
    server.wait_for_post(|p| p == "3:4hi").await;

    session.emit_binary(vec![1, 2, 3]).await.unwrap();
    server.wait_for_post(|p| p == "6:b4AQID").await;
}
