//! Scripted in-process servers for session tests.
//!
//! [`spawn_server`] binds a TCP listener that speaks just enough HTTP/1.1 for
//! the polling transport: GET requests are answered with pre-scripted payload
//! bodies (parking when the script runs dry, like a real long-poll), POST
//! bodies are recorded for assertions. Requests carrying
//! `transport=websocket` are upgraded with tungstenite and handed to the test
//! body to drive frame by frame.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::StreamExt;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::WebSocketStream;

pub type ServerWs = WebSocketStream<TcpStream>;

/// Frame one packet the way a polling payload does.
pub fn frame(packet: &str) -> String {
    format!("{}:{}", packet.chars().count(), packet)
}

/// A canned open packet, ready to send over websocket or to [`frame`] for
/// polling.
pub fn open_packet(sid: &str, upgrades: &[&str], ping_interval: u64, ping_timeout: u64) -> String {
    let upgrades = upgrades
        .iter()
        .map(|u| format!("\"{u}\""))
        .collect::<Vec<_>>()
        .join(",");
    format!(
        "0{{\"sid\":\"{sid}\",\"upgrades\":[{upgrades}],\
         \"pingInterval\":{ping_interval},\"pingTimeout\":{ping_timeout}}}"
    )
}

pub struct TestServer {
    pub url: String,
    gets: Arc<Mutex<VecDeque<String>>>,
    posts: Arc<Mutex<Vec<String>>>,
    /// Websocket connections accepted by the server, in connection order.
    pub ws: mpsc::UnboundedReceiver<ServerWs>,
}

pub async fn spawn_server(port: u16, get_script: impl IntoIterator<Item = String>) -> TestServer {
    let listener = TcpListener::bind(("127.0.0.1", port)).await.unwrap();
    let gets = Arc::new(Mutex::new(get_script.into_iter().collect::<VecDeque<_>>()));
    let posts = Arc::new(Mutex::new(Vec::new()));
    let (ws_tx, ws_rx) = mpsc::unbounded_channel();
    {
        let gets = gets.clone();
        let posts = posts.clone();
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                tokio::spawn(handle_conn(
                    stream,
                    gets.clone(),
                    posts.clone(),
                    ws_tx.clone(),
                ));
            }
        });
    }
    TestServer {
        url: format!("http://127.0.0.1:{port}/engine.io/"),
        gets,
        posts,
        ws: ws_rx,
    }
}

impl TestServer {
    /// Queue another body for a future polling GET.
    pub fn push_get(&self, body: impl Into<String>) {
        self.gets.lock().unwrap().push_back(body.into());
    }

    /// The POST bodies received so far.
    pub fn posts(&self) -> Vec<String> {
        self.posts.lock().unwrap().clone()
    }

    /// Wait until a POST body satisfying `pred` has been recorded.
    pub async fn wait_for_post(&self, pred: impl Fn(&str) -> bool) {
        for _ in 0..200 {
            if self.posts().iter().any(|p| pred(p)) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected post not received, got: {:?}", self.posts());
    }
}

/// Read the next text frame and assert its content.
pub async fn expect_text(ws: &mut ServerWs, expected: &str) {
    let msg = tokio::time::timeout(Duration::from_secs(1), ws.next())
        .await
        .expect("timed out waiting for a ws frame")
        .expect("ws stream ended")
        .expect("ws stream errored");
    assert_eq!(msg.to_text().unwrap(), expected);
}

async fn handle_conn(
    stream: TcpStream,
    gets: Arc<Mutex<VecDeque<String>>>,
    posts: Arc<Mutex<Vec<String>>>,
    ws_tx: mpsc::UnboundedSender<ServerWs>,
) {
    // Sniff the request line without consuming bytes: websocket upgrades are
    // handed to tungstenite, which reads the whole handshake itself.
    let mut buf = [0u8; 2048];
    let line_len = loop {
        let Ok(n) = stream.peek(&mut buf).await else {
            return;
        };
        if n == 0 {
            return;
        }
        if let Some(i) = buf[..n].windows(2).position(|w| w == b"\r\n") {
            break i;
        }
        if n == buf.len() {
            break n;
        }
    };
    let request_line = String::from_utf8_lossy(&buf[..line_len]).into_owned();
    if request_line.contains("transport=websocket") {
        let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        ws_tx.send(ws).ok();
        return;
    }

    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    loop {
        let Some((method, body)) = read_request(&mut reader).await else {
            return;
        };
        match method.as_str() {
            "GET" => {
                let body = next_get(&gets).await;
                respond(&mut write_half, &body).await;
            }
            "POST" => {
                posts.lock().unwrap().push(body);
                respond(&mut write_half, "ok").await;
            }
            _ => return,
        }
    }
}

async fn read_request(reader: &mut BufReader<OwnedReadHalf>) -> Option<(String, String)> {
    let mut line = String::new();
    if reader.read_line(&mut line).await.ok()? == 0 {
        return None;
    }
    let method = line.split_whitespace().next()?.to_string();
    let mut content_len = 0usize;
    loop {
        let mut header = String::new();
        if reader.read_line(&mut header).await.ok()? == 0 {
            return None;
        }
        let header = header.trim().to_ascii_lowercase();
        if header.is_empty() {
            break;
        }
        if let Some(v) = header.strip_prefix("content-length:") {
            content_len = v.trim().parse().ok()?;
        }
    }
    let mut body = vec![0u8; content_len];
    reader.read_exact(&mut body).await.ok()?;
    Some((method, String::from_utf8(body).ok()?))
}

async fn next_get(gets: &Arc<Mutex<VecDeque<String>>>) -> String {
    loop {
        if let Some(body) = gets.lock().unwrap().pop_front() {
            return body;
        }
        // long-poll: park until the test queues another body
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

async fn respond(writer: &mut OwnedWriteHalf, body: &str) {
    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/plain; charset=UTF-8\r\nContent-Length: {}\r\n\r\n{}",
        body.len(),
        body
    );
    writer.write_all(response.as_bytes()).await.ok();
}
