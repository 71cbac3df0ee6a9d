//! The websocket transport: one packet per frame.
//!
//! String packets travel as text frames. Binary packets travel as binary
//! frames with the packet type as a leading byte, as the v3 protocol frames
//! them.

use bytes::Bytes;
use engineio_client_core::{Packet, Str};
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use tokio::{net::TcpStream, sync::Mutex};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{Message, client::IntoClientRequest},
};

use super::{RequestTemplate, TransportError};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug)]
pub(crate) struct WsTransport {
    tx: Mutex<SplitSink<WsStream, Message>>,
    rx: Mutex<SplitStream<WsStream>>,
}

impl WsTransport {
    /// Perform the websocket protocol handshake against the prepared request.
    pub(crate) async fn connect(req: &RequestTemplate) -> Result<Self, TransportError> {
        let mut request = req.url.as_str().into_client_request()?;
        request.headers_mut().extend(req.headers.clone());
        let (ws, _) = connect_async(request).await?;
        let (tx, rx) = ws.split();
        Ok(Self {
            tx: Mutex::new(tx),
            rx: Mutex::new(rx),
        })
    }

    pub(crate) async fn recv(&self) -> Result<Packet, TransportError> {
        let mut rx = self.rx.lock().await;
        loop {
            return match rx.next().await {
                Some(Ok(Message::Text(msg))) => Ok(Packet::try_from(ws_bytes_to_str(msg))?),
                Some(Ok(Message::Binary(data))) => {
                    // v3 binary frames carry the packet type as the first byte
                    let data = match data.first() {
                        Some(&0x04) => data.slice(1..),
                        _ => data,
                    };
                    Ok(Packet::Binary(data))
                }
                Some(Ok(Message::Close(_))) | None => Err(TransportError::Closed),
                // ws-level ping/pong control frames are not engine.io packets
                Some(Ok(_)) => continue,
                Some(Err(e)) => Err(e.into()),
            };
        }
    }

    pub(crate) async fn send(&self, packet: Packet) -> Result<(), TransportError> {
        let msg = match packet {
            Packet::Binary(data) => {
                let mut buf = Vec::with_capacity(data.len() + 1);
                buf.push(0x04);
                buf.extend_from_slice(&data);
                Message::Binary(buf.into())
            }
            packet => Message::Text(String::from(packet).into()),
        };
        self.tx.lock().await.send(msg).await?;
        Ok(())
    }

    pub(crate) async fn close(&self) {
        let mut tx = self.tx.lock().await;
        tx.send(Message::Close(None)).await.ok();
        tx.close().await.ok();
    }
}

fn ws_bytes_to_str(bytes: tokio_tungstenite::tungstenite::Utf8Bytes) -> Str {
    // SAFETY: the frame payload is guaranteed valid utf8 by tungstenite
    unsafe { Str::from_bytes_unchecked(Bytes::from(bytes)) }
}
