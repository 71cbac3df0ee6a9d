//! ## A [`Session`] is one end-to-end engine.io conversation
//!
//! It owns the current transport and, while an upgrade is in flight, the
//! upgrading one. Two background tasks drive it:
//! * the reader task reads packets from the authoritative transport (the
//!   upgrading one when present, else the current one) and dispatches them;
//! * the heartbeat task emits a ping every interval and closes the session
//!   when the matching pong does not arrive within the timeout.
//!
//! All termination paths converge on the closed state: an explicit
//! [`close`](Session::close), a missed pong, or a terminal transport error.

use std::sync::{Arc, Mutex as StdMutex, RwLock};
use std::time::Duration;

use bytes::Bytes;
use engineio_client_core::{OpenPacket, Packet, Str, TransportType};
use http::request::Parts;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use url::Url;

use crate::{
    Error, MessageKind, MessageReader, MessageWriter, SessionConfig,
    transport::{RequestTemplate, Transport},
};

/// The connection state of a session.
#[derive(Debug, Copy, Clone, PartialEq)]
enum State {
    /// The handshake has not settled yet.
    Unknown,
    /// The session is open on a single transport.
    Normal,
    /// A transport upgrade is in flight; the upgrading slot is occupied.
    Upgrading,
    /// A local close is in progress; waiting for the transports to die.
    Closing,
    /// Terminal. Entered exactly once; both signaling channels are closed
    /// with it.
    Closed,
}

/// An engine.io session.
///
/// Create one with [`Session::connect`]; receive messages with
/// [`recv`](Session::recv) and send them with [`send`](Session::send) or the
/// [`emit`](Session::emit) shorthand.
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    /// The server-assigned session id.
    id: Str,
    /// Snapshot of the prepared http request the session was opened with.
    request: Parts,

    ping_interval: Duration,
    ping_timeout: Duration,
    upgrade_retries: usize,
    upgrade_retry_delay: Duration,

    /// Transport slots; swapped as a unit when an upgrade completes.
    slots: RwLock<TransportSlots>,
    state: RwLock<State>,
    /// Serializes outbound packets. Held for the whole lifetime of a
    /// [`MessageWriter`].
    writer_lock: Arc<Mutex<()>>,

    /// Sender side of the inbound message rendezvous. Dropped on close so
    /// blocked receivers observe the end of the session.
    msg_tx: StdMutex<Option<mpsc::Sender<MessageReader>>>,
    msg_rx: Mutex<mpsc::Receiver<MessageReader>>,
    /// Liveness signal from the dispatcher to the heartbeat task.
    pong_tx: StdMutex<Option<mpsc::Sender<()>>>,

    heartbeat_handle: StdMutex<Option<JoinHandle<()>>>,
}

#[derive(Default)]
struct TransportSlots {
    current: Option<Arc<Transport>>,
    upgrading: Option<Arc<Transport>>,
}

/// What the open handshake settles on before the tasks start.
struct Handshake {
    open: OpenPacket,
    current: Arc<Transport>,
    upgrading: Option<Arc<Transport>>,
    state: State,
    request: Parts,
}

impl Session {
    /// Open a session against `url` (e.g. `http://host:port/engine.io/`).
    ///
    /// Performs the open handshake on the preferred transport and, when both
    /// transports are configured, starts the websocket upgrade probe before
    /// returning. Fails with [`Error::InvalidTransport`] if the transport
    /// preference is empty or not a supported combination.
    pub async fn connect(url: &str, config: SessionConfig) -> Result<Self, Error> {
        let base = Url::parse(url)?;
        if base.scheme() != "http" && base.scheme() != "https" {
            return Err(Error::InvalidScheme);
        }
        let handshake = open_handshake(&base, &config).await?;

        let (msg_tx, msg_rx) = mpsc::channel(1);
        let (pong_tx, pong_rx) = mpsc::channel(1);
        let inner = Arc::new(SessionInner {
            id: handshake.open.sid.clone(),
            request: handshake.request,
            ping_interval: handshake.open.ping_interval(),
            ping_timeout: handshake.open.ping_timeout(),
            upgrade_retries: config.upgrade_retries,
            upgrade_retry_delay: config.upgrade_retry_delay,
            slots: RwLock::new(TransportSlots {
                current: Some(handshake.current),
                upgrading: handshake.upgrading,
            }),
            state: RwLock::new(State::Unknown),
            writer_lock: Arc::new(Mutex::new(())),
            msg_tx: StdMutex::new(Some(msg_tx)),
            msg_rx: Mutex::new(msg_rx),
            pong_tx: StdMutex::new(Some(pong_tx)),
            heartbeat_handle: StdMutex::new(None),
        });
        inner.set_state(handshake.state);
        tracing::debug!(sid = %inner.id, state = ?handshake.state, "session established");

        tokio::spawn(inner.clone().read_task());
        let handle = tokio::spawn(inner.clone().heartbeat_job(pong_rx));
        *inner.heartbeat_handle.lock().unwrap() = Some(handle);

        Ok(Session { inner })
    }

    /// The server-assigned session id.
    pub fn id(&self) -> &Str {
        &self.inner.id
    }

    /// A snapshot of the prepared http request the session was opened with.
    pub fn request(&self) -> &Parts {
        &self.inner.request
    }

    /// Receive the next message.
    ///
    /// Messages are delivered strictly in arrival order, one at a time: the
    /// next one is read from the transport only after the returned
    /// [`MessageReader`] is dropped. Returns [`Error::Closed`] once the
    /// session is closed and all pending messages have been consumed.
    pub async fn recv(&self) -> Result<MessageReader, Error> {
        let mut rx = self.inner.msg_rx.lock().await;
        rx.recv().await.ok_or(Error::Closed)
    }

    /// Start one outbound message.
    ///
    /// The returned [`MessageWriter`] holds the session write lock until it
    /// is closed or dropped. While a transport upgrade is in flight this
    /// waits for the swap to settle (bounded by
    /// [`upgrade_retries`](SessionConfig::upgrade_retries)) and then fails
    /// with the recoverable [`Error::Upgrading`].
    pub async fn send(&self, kind: MessageKind) -> Result<MessageWriter, Error> {
        self.inner.next_writer(kind).await
    }

    /// Send a text message in one call.
    pub async fn emit(&self, msg: impl Into<Str>) -> Result<(), Error> {
        let msg = msg.into();
        let mut writer = self.send(MessageKind::Text).await?;
        writer.write(msg.as_bytes());
        writer.close().await
    }

    /// Send a binary message in one call.
    pub async fn emit_binary(&self, data: impl Into<Bytes>) -> Result<(), Error> {
        let data = data.into();
        let mut writer = self.send(MessageKind::Binary).await?;
        writer.write(&data);
        writer.close().await
    }

    /// Close the session.
    ///
    /// The first call emits a best-effort close packet and closes the
    /// transports; later calls are no-ops. The session reaches its terminal
    /// state once the reader task observes the transport teardown.
    pub async fn close(&self) -> Result<(), Error> {
        self.inner.close_session().await;
        Ok(())
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("sid", &self.inner.id)
            .field("state", &self.inner.state())
            .finish()
    }
}

impl SessionInner {
    fn state(&self) -> State {
        *self.state.read().unwrap()
    }
    fn set_state(&self, state: State) {
        *self.state.write().unwrap() = state;
    }
    fn current(&self) -> Option<Arc<Transport>> {
        self.slots.read().unwrap().current.clone()
    }
    fn upgrading(&self) -> Option<Arc<Transport>> {
        self.slots.read().unwrap().upgrading.clone()
    }

    /// The reader task: read one packet at a time from the authoritative
    /// transport and dispatch it.
    async fn read_task(self: Arc<Self>) {
        loop {
            // the upgrading transport, when present, is authoritative
            let Some(transport) = self.upgrading().or_else(|| self.current()) else {
                break;
            };
            match transport.recv().await {
                Ok(packet) => self.handle_packet(packet).await,
                Err(e) => {
                    tracing::debug!(sid = %self.id, kind = %transport.kind(), "transport read error: {e}");
                    self.on_transport_error(&transport).await;
                    if self.state() == State::Closed {
                        break;
                    }
                }
            }
        }
        tracing::debug!(sid = %self.id, "reader task finished");
    }

    async fn handle_packet(&self, packet: Packet) {
        let state = self.state();
        if state != State::Normal && state != State::Upgrading {
            return;
        }
        tracing::trace!(sid = %self.id, ?packet, "dispatching packet");
        match packet {
            // the handshake consumed the real open packet already
            Packet::Open(_) | Packet::Noop => {}
            Packet::Close => {
                if let Some(current) = self.current() {
                    current.close().await;
                }
            }
            Packet::Ping(payload) => {
                self.answer_ping(payload.clone()).await;
                // a ping proves the link just as a pong does
                self.handle_pong(payload).await;
            }
            Packet::Pong(payload) => self.handle_pong(payload).await,
            Packet::Message(msg) => self.deliver(MessageKind::Text, msg.into()).await,
            Packet::Binary(data) => self.deliver(MessageKind::Binary, data).await,
            Packet::Upgrade => self.finish_upgrade().await,
        }
    }

    /// Answer a server ping, echoing its payload.
    ///
    /// While upgrading, the pong goes out on the upgrading transport, after a
    /// noop on the current one so the server can flush its pending polling
    /// cycle.
    async fn answer_ping(&self, payload: Str) {
        let _guard = self.writer_lock.lock().await;
        if let Some(upgrading) = self.upgrading() {
            if let Some(current) = self.current() {
                current.send(Packet::Noop).await.ok();
            }
            upgrading.send(Packet::Pong(payload)).await.ok();
        } else if let Some(current) = self.current() {
            current.send(Packet::Pong(payload)).await.ok();
        }
    }

    async fn handle_pong(&self, payload: Str) {
        // Non-blocking liveness signal: a signal already pending in the
        // channel satisfies the heartbeat just as well.
        let pong_tx = self.pong_tx.lock().unwrap().clone();
        if let Some(tx) = pong_tx {
            tx.try_send(()).ok();
        }
        if self.state() == State::Upgrading && payload.contains("probe") {
            if let Some(upgrading) = self.upgrading() {
                {
                    let _guard = self.writer_lock.lock().await;
                    upgrading.send(Packet::Upgrade).await.ok();
                }
                self.finish_upgrade().await;
            }
        }
    }

    /// Atomically promote the upgrading transport, then retire the old one.
    async fn finish_upgrade(&self) {
        let retired = {
            let mut slots = self.slots.write().unwrap();
            let Some(upgrading) = slots.upgrading.take() else {
                return;
            };
            slots.current.replace(upgrading)
        };
        self.set_state(State::Normal);
        tracing::debug!(sid = %self.id, "transport upgrade complete");
        if let Some(retired) = retired {
            retired.close().await;
        }
    }

    /// Hand one message to the caller and wait until it is consumed.
    async fn deliver(&self, kind: MessageKind, payload: Bytes) {
        let msg_tx = self.msg_tx.lock().unwrap().clone();
        let Some(tx) = msg_tx else { return };
        let (release_tx, release_rx) = oneshot::channel();
        if tx
            .send(MessageReader::new(kind, payload, release_tx))
            .await
            .is_err()
        {
            return;
        }
        // park until the caller drops the reader: serial delivery
        release_rx.await.ok();
    }

    /// React to a terminal read error on `errored`.
    async fn on_transport_error(&self, errored: &Arc<Transport>) {
        if let Some(upgrading) = self.upgrading() {
            if Arc::ptr_eq(&upgrading, errored) {
                // a failed upgrade candidate: drop it, stay on current
                self.slots.write().unwrap().upgrading = None;
                upgrading.close().await;
                if self.state() == State::Upgrading {
                    self.set_state(State::Normal);
                }
                return;
            }
        }
        let Some(current) = self.current() else { return };
        if !Arc::ptr_eq(&current, errored) {
            // stale error: a transport swap raced the report
            return;
        }
        current.close().await;
        if let Some(upgrading) = self.upgrading() {
            upgrading.close().await;
            self.slots.write().unwrap().upgrading = None;
        }
        // the closed state is entered exactly once; both signaling channels
        // are closed with it
        {
            let mut state = self.state.write().unwrap();
            if *state == State::Closed {
                return;
            }
            *state = State::Closed;
        }
        tracing::debug!(sid = %self.id, "session closed");
        self.msg_tx.lock().unwrap().take();
        self.pong_tx.lock().unwrap().take();
        self.abort_heartbeat();
    }

    fn abort_heartbeat(&self) {
        if let Some(handle) = self.heartbeat_handle.lock().unwrap().take() {
            handle.abort();
        }
    }

    /// The heartbeat task: ping every interval, require a pong within the
    /// timeout, close the session otherwise.
    async fn heartbeat_job(self: Arc<Self>, mut pong_rx: mpsc::Receiver<()>) {
        tracing::debug!(sid = %self.id, "heartbeat routine started");
        let mut interval = tokio::time::interval(self.ping_interval);
        interval.tick().await; // the first tick completes immediately
        loop {
            if self.send_ping().await.is_err() {
                tracing::debug!(sid = %self.id, "heartbeat could not emit ping, closing session");
                break;
            }
            tracing::trace!(sid = %self.id, "waiting for pong");
            match tokio::time::timeout(self.ping_timeout, pong_rx.recv()).await {
                Ok(Some(())) => {}
                Ok(None) => return, // session already closed
                Err(_) => {
                    tracing::debug!(sid = %self.id, "heartbeat timeout, closing session");
                    break;
                }
            }
            // Discard late pongs until the next tick fires, so a stale pong
            // cannot satisfy the next ping.
            loop {
                tokio::select! {
                    _ = interval.tick() => break,
                    pong = pong_rx.recv() => if pong.is_none() { return; },
                }
            }
        }
        self.close_session().await;
    }

    async fn send_ping(&self) -> Result<(), Error> {
        let _guard = self.writer_lock.lock().await;
        let current = self.current().ok_or(Error::Closed)?;
        current.send(Packet::Ping("".into())).await?;
        Ok(())
    }

    async fn next_writer(&self, kind: MessageKind) -> Result<MessageWriter, Error> {
        if self.state() == State::Upgrading {
            // give the transport swap a bounded chance to settle instead of
            // racing it
            for _ in 0..self.upgrade_retries {
                tokio::time::sleep(self.upgrade_retry_delay).await;
                if self.state() != State::Upgrading {
                    break;
                }
            }
            if self.state() == State::Upgrading {
                return Err(Error::Upgrading);
            }
        }
        if self.state() != State::Normal {
            return Err(Error::Closed);
        }
        let guard = self.writer_lock.clone().lock_owned().await;
        let current = self.current().ok_or(Error::Closed)?;
        Ok(MessageWriter::new(kind, current, guard))
    }

    /// Tear the session down locally. Only the first caller emits the close
    /// packet; the reader task drives the transition to the closed state
    /// when the transport reads fail.
    async fn close_session(&self) {
        {
            let mut state = self.state.write().unwrap();
            match *state {
                State::Normal | State::Upgrading => *state = State::Closing,
                _ => return,
            }
        }
        tracing::debug!(sid = %self.id, "closing session");
        if let Some(upgrading) = self.upgrading() {
            upgrading.close().await;
        }
        {
            // best effort: a failed close packet still releases the lock
            let _guard = self.writer_lock.lock().await;
            if let Some(current) = self.current() {
                current.send(Packet::Close).await.ok();
            }
        }
        if let Some(current) = self.current() {
            current.close().await;
        }
    }
}

/// Perform the open handshake for the configured transport preference.
///
/// Three cases: polling first (alone or with a websocket upgrade to probe),
/// websocket alone, anything else is invalid.
async fn open_handshake(base: &Url, config: &SessionConfig) -> Result<Handshake, Error> {
    use TransportType::{Polling, Websocket};

    let prefs = config.transports.as_slice();
    let with_upgrade = matches!(prefs, [Polling, Websocket] | [Websocket, Polling]);

    if with_upgrade || matches!(prefs, [Polling]) {
        let template = RequestTemplate {
            url: prepare_url(base, config, Polling, None),
            headers: config.headers.clone(),
        };
        let polling = Arc::new(Transport::connect(Polling, &template).await?);
        let open = match polling.recv().await? {
            Packet::Open(open) => open,
            _ => return Err(Error::BadHandshake),
        };
        polling.bind_sid(&open.sid);

        if !with_upgrade {
            let request = request_snapshot(&template)?;
            return Ok(Handshake {
                open,
                current: polling,
                upgrading: None,
                state: State::Normal,
                request,
            });
        }

        let template = RequestTemplate {
            url: prepare_url(base, config, Websocket, Some(&open.sid)),
            headers: config.headers.clone(),
        };
        let ws = Arc::new(Transport::connect(Websocket, &template).await?);
        // probe the new transport; its pong completes the upgrade later
        ws.send(Packet::Ping("probe".into())).await?;
        let request = request_snapshot(&template)?;
        Ok(Handshake {
            open,
            current: polling,
            upgrading: Some(ws),
            state: State::Upgrading,
            request,
        })
    } else if matches!(prefs, [Websocket]) {
        let template = RequestTemplate {
            url: prepare_url(base, config, Websocket, None),
            headers: config.headers.clone(),
        };
        // The single-transport case: the open packet arrives directly on the
        // websocket and no probe exchange happens. The socket passes through
        // the upgrading slot only notionally and is promoted to current as
        // soon as the handshake record is read.
        let ws = Arc::new(Transport::connect(Websocket, &template).await?);
        let open = match ws.recv().await? {
            Packet::Open(open) => open,
            _ => return Err(Error::BadHandshake),
        };
        let request = request_snapshot(&template)?;
        Ok(Handshake {
            open,
            current: ws,
            upgrading: None,
            state: State::Normal,
            request,
        })
    } else {
        Err(Error::InvalidTransport)
    }
}

/// Derive a per-transport request URL from the session base URL.
fn prepare_url(base: &Url, config: &SessionConfig, transport: TransportType, sid: Option<&str>) -> Url {
    let mut url = base.clone();
    {
        let mut pairs = url.query_pairs_mut();
        if !config.query.iter().any(|(k, _)| k == "EIO") {
            pairs.append_pair("EIO", "3");
        }
        for (k, v) in &config.query {
            pairs.append_pair(k, v);
        }
        pairs.append_pair("transport", transport.as_str());
        if let Some(sid) = sid {
            pairs.append_pair("sid", sid);
        }
        if transport == TransportType::Polling {
            // keep polling payloads in their string form; binary packets
            // arrive base64-encoded instead of as framed binary bodies
            pairs.append_pair("b64", "1");
        }
    }
    if transport == TransportType::Websocket {
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme)
            .expect("http(s) to ws(s) scheme rewrite cannot fail");
    }
    url
}

fn request_snapshot(template: &RequestTemplate) -> Result<Parts, Error> {
    let mut request = http::Request::builder()
        .method(http::Method::GET)
        .uri(template.url.as_str())
        .body(())?;
    request.headers_mut().extend(template.headers.clone());
    Ok(request.into_parts().0)
}
