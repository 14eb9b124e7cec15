//! Connection lifecycle and message routing for one room

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, ReentrantMutex};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, timeout, Instant};
use tracing::{debug, error, info, warn};
use url::Url;
use uuid::Uuid;

use crate::config::RoomConfig;
use crate::events::RoomEvent;
use crate::room::{PlayerState, RoomCore};

use super::connector::{Connector, Link};
use super::protocol::{decode_server, encode_client, ClientMsg, ServerMsg};

/// Connection phase of a room
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Never connected, or gave up reconnecting
    Idle,
    /// Handshake (or retry backoff) in progress
    Connecting,
    /// Joined and exchanging state
    Connected,
    /// Closed, by request or unexpectedly
    Disconnected,
}

/// Connection failures
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("join handshake timed out after {0:?}")]
    HandshakeTimeout(Duration),

    #[error("invalid join handshake: {0}")]
    InvalidHandshake(String),

    #[error("connection closed before join")]
    ClosedBeforeJoin,

    #[error("gave up after {attempts} connection attempts")]
    RetriesExhausted { attempts: u32 },

    #[error("server error: {0}")]
    Server(String),
}

/// Everything a successful handshake hands over to the reader
struct OpenedSession {
    conn_id: Uuid,
    link: Link,
    local: PlayerState,
    /// Messages that arrived before the handshake, replayed after it
    backlog: Vec<ServerMsg>,
}

struct LinkState {
    phase: ConnectionState,
    /// Bumped on every connect/disconnect; stale tasks compare against it
    session: u64,
    outbound: Option<mpsc::UnboundedSender<String>>,
    reader: Option<JoinHandle<()>>,
    /// Owner dropped; no further connects
    closed: bool,
}

struct TransportInner {
    core: Arc<RoomCore>,
    connector: Arc<dyn Connector>,
    config: RoomConfig,
    url: Url,
    link: Mutex<LinkState>,
    cancel: watch::Sender<u64>,
    /// Held from a phase change until its events are published, so
    /// connect and disconnect racing on two threads publish in phase order
    lifecycle: ReentrantMutex<()>,
}

/// Owns the connection and bridges wire messages to and from the store
#[derive(Clone)]
pub struct RoomTransport {
    inner: Arc<TransportInner>,
}

impl RoomTransport {
    pub(crate) fn new(
        core: Arc<RoomCore>,
        connector: Arc<dyn Connector>,
        config: RoomConfig,
        url: Url,
    ) -> Self {
        let (cancel, _) = watch::channel(0);
        Self {
            inner: Arc::new(TransportInner {
                core,
                connector,
                config,
                url,
                link: Mutex::new(LinkState {
                    phase: ConnectionState::Idle,
                    session: 0,
                    outbound: None,
                    reader: None,
                    closed: false,
                }),
                cancel,
                lifecycle: ReentrantMutex::new(()),
            }),
        }
    }

    pub fn phase(&self) -> ConnectionState {
        self.inner.link.lock().phase
    }

    pub fn is_connected(&self) -> bool {
        self.phase() == ConnectionState::Connected
    }

    /// Connect and join, retrying with backoff
    ///
    /// Returns once joined, cancelled by `disconnect`, or out of retries.
    /// Calling it while connecting or connected is a no-op.
    pub async fn connect(&self) -> ConnectionState {
        let room_id = self.inner.core.room_id();

        let (session, mut cancel) = {
            let mut link = self.inner.link.lock();
            if link.closed {
                return link.phase;
            }
            if matches!(
                link.phase,
                ConnectionState::Connecting | ConnectionState::Connected
            ) {
                debug!(room_id, phase = ?link.phase, "Connect ignored, already active");
                return link.phase;
            }
            link.phase = ConnectionState::Connecting;
            link.session += 1;
            self.inner.cancel.send_replace(link.session);
            (link.session, self.inner.cancel.subscribe())
        };

        let mut backoff = self.inner.config.reconnect.schedule();

        loop {
            let attempt = tokio::select! {
                result = self.open_session() => result,
                _ = cancel.changed() => return self.phase(),
            };

            match attempt {
                Ok(opened) => return self.finish_connect(session, opened),
                Err(e) => {
                    warn!(
                        room_id,
                        attempt = backoff.retries() + 1,
                        error = %e,
                        "Connection attempt failed"
                    );
                    match backoff.next() {
                        Some(delay) => {
                            debug!(room_id, delay_ms = delay.as_millis() as u64, "Retrying");
                            tokio::select! {
                                _ = sleep(delay) => {}
                                _ = cancel.changed() => return self.phase(),
                            }
                        }
                        None => return self.give_up(session, backoff.retries() + 1),
                    }
                }
            }
        }
    }

    /// Close the connection and cancel any retry in progress
    pub fn disconnect(&self) {
        let _order = self.inner.lifecycle.lock();
        let reader = {
            let mut link = self.inner.link.lock();
            if matches!(
                link.phase,
                ConnectionState::Idle | ConnectionState::Disconnected
            ) {
                debug!(room_id = self.inner.core.room_id(), "Disconnect ignored, not connected");
                return;
            }
            link.session += 1;
            self.inner.cancel.send_replace(link.session);
            link.phase = ConnectionState::Disconnected;
            link.outbound = None;
            link.reader.take()
        };

        if let Some(handle) = reader {
            handle.abort();
        }

        info!(room_id = self.inner.core.room_id(), "Disconnected");
        let lost = self.inner.core.connection_lost();
        self.inner.core.emit(RoomEvent::Disconnected);
        self.inner.core.publish(lost);
    }

    /// Close for good once the owning room is gone
    ///
    /// Cancels any connect in progress, closes the link and stops the
    /// reader. Nothing is published since no one is left to listen.
    pub(crate) fn shutdown(&self) {
        let _order = self.inner.lifecycle.lock();
        let reader = {
            let mut link = self.inner.link.lock();
            link.closed = true;
            link.session += 1;
            self.inner.cancel.send_replace(link.session);
            if link.phase != ConnectionState::Idle {
                link.phase = ConnectionState::Disconnected;
            }
            link.outbound = None;
            link.reader.take()
        };

        if let Some(handle) = reader {
            handle.abort();
        }
        debug!(room_id = self.inner.core.room_id(), "Room dropped, connection closed");
    }

    fn downgrade(&self) -> Weak<TransportInner> {
        Arc::downgrade(&self.inner)
    }

    fn upgrade(inner: &Weak<TransportInner>) -> Option<Self> {
        inner.upgrade().map(|inner| Self { inner })
    }

    /// Transmit the local player's state
    ///
    /// Returns false when offline; nothing is queued for later.
    pub fn send(&self, state: &PlayerState) -> bool {
        if !state.is_local {
            warn!(player_id = %state.id, "Refusing to send non-local player state");
            return false;
        }

        let outbound = {
            let link = self.inner.link.lock();
            match link.phase {
                ConnectionState::Connected => link.outbound.clone(),
                _ => None,
            }
        };

        let Some(outbound) = outbound else {
            debug!(player_id = %state.id, "Offline, dropping local state");
            return false;
        };

        let text = match encode_client(&ClientMsg::State(state.clone())) {
            Ok(text) => text,
            Err(e) => {
                error!(player_id = %state.id, error = %e, "Failed to encode player state");
                return false;
            }
        };

        if outbound.send(text.clone()).is_err() {
            debug!(player_id = %state.id, "Outbound channel closed");
            return false;
        }

        self.inner.core.emit(RoomEvent::Tx(text));
        true
    }

    /// Open a link and wait for the join handshake
    async fn open_session(&self) -> Result<OpenedSession, TransportError> {
        let conn_id = Uuid::new_v4();
        info!(room_id = self.inner.core.room_id(), %conn_id, url = %self.inner.url, "Connecting");

        let mut link = self.inner.connector.connect(&self.inner.url).await?;
        let join_timeout = self.inner.config.join_timeout;
        let mut backlog = Vec::new();

        let handshake = async {
            while let Some(text) = link.inbound.recv().await {
                self.inner.core.emit(RoomEvent::Rx(text.clone()));
                match decode_server(&text) {
                    Ok(ServerMsg::Welcome(state)) => return Ok(state),
                    Ok(msg) => backlog.push(msg),
                    Err(e) => warn!(%conn_id, error = %e, "Dropping unrecognized message"),
                }
            }
            Err(TransportError::ClosedBeforeJoin)
        };

        let local = timeout(join_timeout, handshake)
            .await
            .map_err(|_| TransportError::HandshakeTimeout(join_timeout))??;

        local
            .validate()
            .map_err(|e| TransportError::InvalidHandshake(e.to_string()))?;

        Ok(OpenedSession {
            conn_id,
            link,
            local,
            backlog,
        })
    }

    fn finish_connect(&self, session: u64, opened: OpenedSession) -> ConnectionState {
        let OpenedSession {
            conn_id,
            link,
            local,
            backlog,
        } = opened;
        let player_id = local.id.clone();

        let _order = self.inner.lifecycle.lock();
        let joined = {
            let mut link_state = self.inner.link.lock();
            if link_state.session != session {
                debug!(%conn_id, "Handshake finished after cancellation, closing");
                return link_state.phase;
            }
            link_state.phase = ConnectionState::Connected;
            link_state.outbound = Some(link.outbound);
            self.inner.core.install_local(local)
        };

        info!(
            room_id = self.inner.core.room_id(),
            %conn_id,
            %player_id,
            "Joined room"
        );

        let reader = tokio::spawn(read_loop(self.downgrade(), session, link.inbound, backlog));
        self.inner.link.lock().reader = Some(reader);

        self.inner.core.emit(RoomEvent::Connected);
        self.inner.core.publish(joined);
        ConnectionState::Connected
    }

    fn give_up(&self, session: u64, attempts: u32) -> ConnectionState {
        let _order = self.inner.lifecycle.lock();
        {
            let mut link = self.inner.link.lock();
            if link.session != session {
                return link.phase;
            }
            link.phase = ConnectionState::Idle;
            link.outbound = None;
        }

        error!(room_id = self.inner.core.room_id(), attempts, "Giving up on connection");
        self.inner
            .core
            .emit(RoomEvent::Error(TransportError::RetriesExhausted { attempts }));
        ConnectionState::Idle
    }

    fn handle_frame(&self, text: String) {
        let decoded = decode_server(&text);
        self.inner.core.emit(RoomEvent::Rx(text));

        match decoded {
            Ok(msg) => self.route(msg),
            Err(e) => warn!(
                room_id = self.inner.core.room_id(),
                error = %e,
                "Dropping unrecognized message"
            ),
        }
    }

    fn route(&self, msg: ServerMsg) {
        match msg {
            ServerMsg::State(state) | ServerMsg::Joined(state) => {
                if self.inner.core.is_local(&state.id) {
                    debug!(player_id = %state.id, "Ignoring echo of local state");
                    return;
                }
                self.inner.core.apply_remote(state);
            }
            ServerMsg::Leave { id } => {
                self.inner.core.remove_player(&id);
            }
            ServerMsg::Welcome(state) => {
                debug!(player_id = %state.id, "Ignoring repeated handshake");
            }
            ServerMsg::Error { message } => {
                warn!(room_id = self.inner.core.room_id(), %message, "Server reported an error");
                self.inner
                    .core
                    .emit(RoomEvent::Error(TransportError::Server(message)));
            }
        }
    }

    async fn connection_lost(self, session: u64) {
        let reconnect = {
            let _order = self.inner.lifecycle.lock();
            let reconnect = {
                let mut link = self.inner.link.lock();
                if link.session != session {
                    return;
                }
                link.phase = ConnectionState::Disconnected;
                link.outbound = None;
                // This task is the reader; dropping the handle detaches it.
                link.reader = None;
                self.inner.config.auto_reconnect
            };

            warn!(room_id = self.inner.core.room_id(), "Connection lost");
            let lost = self.inner.core.connection_lost();
            self.inner.core.emit(RoomEvent::Disconnected);
            self.inner.core.publish(lost);
            reconnect
        };

        if reconnect {
            self.reconnect().await;
        }
    }

    // Boxed to break the connect -> read_loop -> connect type cycle.
    fn reconnect(self) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        Box::pin(async move {
            self.connect().await;
        })
    }
}

/// Route inbound frames until the link closes
///
/// Holds the transport weakly so a dropped room is not kept alive by its
/// own reader.
async fn read_loop(
    transport: Weak<TransportInner>,
    session: u64,
    mut inbound: mpsc::UnboundedReceiver<String>,
    backlog: Vec<ServerMsg>,
) {
    let Some(this) = RoomTransport::upgrade(&transport) else {
        return;
    };
    for msg in backlog {
        this.route(msg);
    }
    let every = this.inner.config.liveness_sweep;
    let remote_timeout = this.inner.config.remote_timeout;
    drop(this);

    let mut sweep = interval_at(Instant::now() + every, every);

    loop {
        tokio::select! {
            frame = inbound.recv() => {
                let Some(this) = RoomTransport::upgrade(&transport) else {
                    break;
                };
                match frame {
                    Some(text) => this.handle_frame(text),
                    None => {
                        this.connection_lost(session).await;
                        break;
                    }
                }
            }
            _ = sweep.tick() => {
                let Some(this) = RoomTransport::upgrade(&transport) else {
                    break;
                };
                this.inner.core.expire_stale(remote_timeout);
            }
        }
    }
}
