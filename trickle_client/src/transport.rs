//! Channel implementations.
//!
//! A [`Channel`] is one live duplex text-frame link; a [`Connector`] makes new
//! ones. The connection driver only ever talks to these two traits, so the
//! reconnect logic is the same for the real WebSocket and for the in-process
//! loopback used in tests and offline runs.

use std::{
    sync::atomic::{AtomicU32, Ordering},
    time::Duration,
};

use anyhow::{bail, Context};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::{
    net::TcpStream,
    sync::{mpsc, Mutex as AsyncMutex},
    time::Instant,
};
use tokio_tungstenite::{tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::debug;

/// One duplex, message-framed link to the server.
#[async_trait]
pub trait Channel: Send {
    /// Writes one text frame.
    async fn send_text(&mut self, text: String) -> anyhow::Result<()>;

    /// Reads the next text frame. `None` once the link is closed.
    async fn recv_text(&mut self) -> Option<anyhow::Result<String>>;
}

/// Opens channels.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &str) -> anyhow::Result<Box<dyn Channel>>;
}

/// Read silence after which a WebSocket link is considered dead. The server
/// pings every 54s.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// WebSocket connector (`ws://` and `wss://`).
#[derive(Debug, Clone, Copy)]
pub struct WsConnector {
    idle_timeout: Option<Duration>,
}

impl Default for WsConnector {
    fn default() -> Self {
        Self::new(Some(DEFAULT_IDLE_TIMEOUT))
    }
}

impl WsConnector {
    /// `idle_timeout`: any inbound frame (pings included) resets it; `None`
    /// waits forever.
    pub fn new(idle_timeout: Option<Duration>) -> Self {
        Self { idle_timeout }
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> anyhow::Result<Box<dyn Channel>> {
        let (ws, resp) = tokio_tungstenite::connect_async(url)
            .await
            .context("websocket handshake")?;
        debug!(status = %resp.status(), "WebSocket handshake complete");
        Ok(Box::new(WsChannel {
            ws,
            idle_timeout: self.idle_timeout,
            last_inbound: Instant::now(),
        }))
    }
}

struct WsChannel {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    idle_timeout: Option<Duration>,
    /// Survives `recv_text` being cancelled by outbound writes.
    last_inbound: Instant,
}

#[async_trait]
impl Channel for WsChannel {
    async fn send_text(&mut self, text: String) -> anyhow::Result<()> {
        self.ws.send(Message::Text(text)).await.context("ws send")
    }

    async fn recv_text(&mut self) -> Option<anyhow::Result<String>> {
        loop {
            let next = match self.idle_timeout {
                Some(idle) => {
                    let deadline = self.last_inbound + idle;
                    match tokio::time::timeout_at(deadline, self.ws.next()).await {
                        Ok(next) => next,
                        Err(_) => return Some(Err(anyhow::anyhow!("no frames for {idle:?}"))),
                    }
                }
                None => self.ws.next().await,
            };
            self.last_inbound = Instant::now();
            match next? {
                Ok(Message::Text(text)) => return Some(Ok(text)),
                Ok(Message::Close(frame)) => {
                    debug!(?frame, "Close frame received");
                    return None;
                }
                Ok(Message::Binary(data)) => {
                    debug!(len = data.len(), "Ignoring binary frame");
                }
                // Ping/pong are answered by tungstenite itself.
                Ok(_) => {}
                Err(e) => return Some(Err(anyhow::Error::new(e).context("ws recv"))),
            }
        }
    }
}

/// In-process loopback connector.
///
/// Every successful `connect` hands the client a [`MemoryChannel`] and queues
/// the matching [`MemoryPeer`] (the "server" end) for [`MemoryConnector::next_peer`].
/// Dropping the peer closes the channel.
pub struct MemoryConnector {
    peers_tx: mpsc::UnboundedSender<MemoryPeer>,
    peers_rx: AsyncMutex<mpsc::UnboundedReceiver<MemoryPeer>>,
    fail_next: AtomicU32,
    hang_next: AtomicU32,
    stall_next: Mutex<Option<Duration>>,
    attempts: Mutex<Vec<(Instant, String)>>,
}

impl Default for MemoryConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryConnector {
    pub fn new() -> Self {
        let (peers_tx, peers_rx) = mpsc::unbounded_channel();
        Self {
            peers_tx,
            peers_rx: AsyncMutex::new(peers_rx),
            fail_next: AtomicU32::new(0),
            hang_next: AtomicU32::new(0),
            stall_next: Mutex::new(None),
            attempts: Mutex::new(Vec::new()),
        }
    }

    /// Makes the next `n` connect attempts fail.
    pub fn fail_next(&self, n: u32) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Makes the next `n` connect attempts never complete, like a server
    /// that accepts TCP and never answers the upgrade.
    pub fn hang_next(&self, n: u32) {
        self.hang_next.store(n, Ordering::SeqCst);
    }

    /// Makes the next connect attempt take `delay` before it succeeds.
    pub fn stall_next(&self, delay: Duration) {
        *self.stall_next.lock() = Some(delay);
    }

    /// Number of connect attempts so far, failed ones included.
    pub fn attempts(&self) -> usize {
        self.attempts.lock().len()
    }

    /// When each attempt happened (tokio clock), in order.
    pub fn attempt_times(&self) -> Vec<Instant> {
        self.attempts.lock().iter().map(|(at, _)| *at).collect()
    }

    /// URL used by each attempt, in order.
    pub fn attempt_urls(&self) -> Vec<String> {
        self.attempts.lock().iter().map(|(_, url)| url.clone()).collect()
    }

    /// Waits for the server end of the next successful connect.
    pub async fn next_peer(&self) -> Option<MemoryPeer> {
        self.peers_rx.lock().await.recv().await
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, url: &str) -> anyhow::Result<Box<dyn Channel>> {
        self.attempts.lock().push((Instant::now(), url.to_string()));

        let failing = take_one(&self.fail_next);
        if failing {
            bail!("connection refused (simulated)");
        }
        if take_one(&self.hang_next) {
            std::future::pending::<()>().await;
        }
        let stall = self.stall_next.lock().take();
        if let Some(delay) = stall {
            tokio::time::sleep(delay).await;
        }

        let (to_peer, from_client) = mpsc::unbounded_channel();
        let (to_client, from_peer) = mpsc::unbounded_channel();
        self.peers_tx
            .send(MemoryPeer {
                to_client,
                from_client,
            })
            .context("memory connector has no listener")?;
        Ok(Box::new(MemoryChannel { to_peer, from_peer }))
    }
}

/// Decrements `counter` if it is above zero.
fn take_one(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

/// Client end of a loopback link.
pub struct MemoryChannel {
    to_peer: mpsc::UnboundedSender<String>,
    from_peer: mpsc::UnboundedReceiver<String>,
}

#[async_trait]
impl Channel for MemoryChannel {
    async fn send_text(&mut self, text: String) -> anyhow::Result<()> {
        self.to_peer.send(text).context("peer closed")
    }

    async fn recv_text(&mut self) -> Option<anyhow::Result<String>> {
        self.from_peer.recv().await.map(Ok)
    }
}

/// Server end of a loopback link.
pub struct MemoryPeer {
    to_client: mpsc::UnboundedSender<String>,
    from_client: mpsc::UnboundedReceiver<String>,
}

impl MemoryPeer {
    /// Pushes a frame to the client. `false` if the client end is gone.
    pub fn send(&self, text: &str) -> bool {
        self.to_client.send(text.to_string()).is_ok()
    }

    /// Next frame written by the client.
    pub async fn recv(&mut self) -> Option<String> {
        self.from_client.recv().await
    }

    /// Next frame written by the client, if one is already queued.
    pub fn try_recv(&mut self) -> Option<String> {
        self.from_client.try_recv().ok()
    }

    /// Closes the link from the server side.
    pub fn close(self) {}
}
