//! The http long-polling transport.
//!
//! One GET is in flight at a time; each response body is a payload holding
//! one or more packets, buffered here and handed out one per
//! [`recv`](PollingTransport::recv) call. Sends POST a single-packet payload.

use std::{
    collections::VecDeque,
    sync::{
        RwLock,
        atomic::{AtomicBool, Ordering},
    },
};

use bytes::Bytes;
use engineio_client_core::{Packet, PacketParseError, Str, payload};
use http::{Method, Request, header::CONTENT_TYPE};
use http_body_util::{BodyExt, Full};
use hyper_util::{
    client::legacy::{Client, connect::HttpConnector},
    rt::TokioExecutor,
};
use tokio::sync::{Mutex, Notify};
use url::Url;

use super::{RequestTemplate, TransportError};

#[derive(Debug)]
pub(crate) struct PollingTransport {
    client: Client<HttpConnector, Full<Bytes>>,
    /// Request URL, re-read on every request: the session binds the
    /// server-assigned `sid` here after the handshake.
    url: RwLock<Url>,
    headers: http::HeaderMap,
    /// Packets decoded from the last poll, drained before polling again.
    packets: Mutex<VecDeque<Packet>>,
    closed: AtomicBool,
    close_notify: Notify,
}

impl PollingTransport {
    pub(crate) fn new(req: &RequestTemplate) -> Self {
        Self {
            client: Client::builder(TokioExecutor::new()).build_http(),
            url: RwLock::new(req.url.clone()),
            headers: req.headers.clone(),
            packets: Mutex::new(VecDeque::new()),
            closed: AtomicBool::new(false),
            close_notify: Notify::new(),
        }
    }

    pub(crate) fn bind_sid(&self, sid: &str) {
        let mut url = self.url.write().unwrap();
        url.query_pairs_mut().append_pair("sid", sid);
    }

    pub(crate) async fn recv(&self) -> Result<Packet, TransportError> {
        let mut packets = self.packets.lock().await;
        loop {
            if let Some(packet) = packets.pop_front() {
                return Ok(packet);
            }
            if self.closed.load(Ordering::Acquire) {
                return Err(TransportError::Closed);
            }

            let request = self.request(Method::GET, Full::default())?;
            let res = tokio::select! {
                res = self.client.request(request) => res?,
                _ = self.close_notify.notified() => return Err(TransportError::Closed),
            };
            if !res.status().is_success() {
                return Err(TransportError::BadStatus(res.status()));
            }
            let body = res.into_body().collect().await?.to_bytes();
            let body = Str::from_bytes(body).map_err(PacketParseError::from)?;
            packets.extend(payload::decode(body)?);
        }
    }

    pub(crate) async fn send(&self, packet: Packet) -> Result<(), TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        let body = payload::encode([packet]);
        let mut request = self.request(Method::POST, Full::new(Bytes::from(body)))?;
        request
            .headers_mut()
            .insert(CONTENT_TYPE, "text/plain;charset=UTF-8".parse().unwrap());
        let res = tokio::select! {
            res = self.client.request(request) => res?,
            _ = self.close_notify.notified() => return Err(TransportError::Closed),
        };
        if !res.status().is_success() {
            return Err(TransportError::BadStatus(res.status()));
        }
        // Drain the `ok` acknowledgment so the connection returns to the pool
        res.into_body().collect().await?;
        Ok(())
    }

    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.close_notify.notify_waiters();
    }

    fn request(&self, method: Method, body: Full<Bytes>) -> Result<Request<Full<Bytes>>, TransportError> {
        let url = self.url.read().unwrap().clone();
        let mut request = Request::builder()
            .method(method)
            .uri(url.as_str())
            .body(body)?;
        request.headers_mut().extend(self.headers.clone());
        Ok(request)
    }
}
