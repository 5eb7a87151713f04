//! In-process WebSocket relay for integration tests.
//!
//! [`Relay`] listens on an ephemeral localhost port and hands every accepted
//! connection to the test as a [`RelayPeer`], together with the request URI
//! the client asked for. The test plays the server: it pushes frames, reads
//! what the client sent, and closes links to force reconnects.

use std::{future::Future, net::SocketAddr, time::Duration};

use anyhow::{bail, Context};
use futures::{SinkExt, StreamExt};
use tokio::{
    net::{TcpListener, TcpStream},
    sync::mpsc,
    task::JoinHandle,
};
use tokio_tungstenite::{
    accept_hdr_async,
    tungstenite::{
        handshake::server::{ErrorResponse, Request, Response},
        Message,
    },
    WebSocketStream,
};
use tracing::{debug, warn};

/// Path prefix the relay pretends the game is served under.
pub const GAME_PATH: &str = "/game/";

/// Installs a test-writer subscriber once per test binary.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init();
}

/// Polls `cond` every few milliseconds until it holds or `timeout` passes.
pub async fn wait_for<F>(timeout: Duration, mut cond: F) -> anyhow::Result<()>
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while !cond() {
        if tokio::time::Instant::now() >= deadline {
            bail!("condition not met within {timeout:?}");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    Ok(())
}

/// Awaits `fut` with a timeout, as an error instead of a hang.
pub async fn within<T>(timeout: Duration, fut: impl Future<Output = T>) -> anyhow::Result<T> {
    tokio::time::timeout(timeout, fut)
        .await
        .with_context(|| format!("timed out after {timeout:?}"))
}

/// Accepting side.
pub struct Relay {
    addr: SocketAddr,
    peers: mpsc::UnboundedReceiver<RelayPeer>,
    accept_task: JoinHandle<()>,
}

impl Relay {
    pub async fn bind() -> anyhow::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .context("bind relay")?;
        let addr = listener.local_addr().context("relay local_addr")?;
        let (tx, peers) = mpsc::unbounded_channel();

        let accept_task = tokio::spawn(async move {
            loop {
                let (stream, remote) = match listener.accept().await {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!(error = %e, "Relay accept failed");
                        continue;
                    }
                };
                match handshake(stream).await {
                    Ok(peer) => {
                        debug!(%remote, uri = %peer.uri, "Relay accepted client");
                        if tx.send(peer).is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!(%remote, error = %e, "Relay handshake failed"),
                }
            }
        });

        Ok(Self {
            addr,
            peers,
            accept_task,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// HTTP origin a client would have been served from.
    pub fn origin(&self) -> String {
        format!("http://{}{}", self.addr, GAME_PATH)
    }

    /// Next accepted client.
    pub async fn next_peer(&mut self, timeout: Duration) -> anyhow::Result<RelayPeer> {
        within(timeout, self.peers.recv())
            .await?
            .context("relay accept loop stopped")
    }
}

impl Drop for Relay {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

async fn handshake(stream: TcpStream) -> anyhow::Result<RelayPeer> {
    let mut uri = String::new();
    let capture = |req: &Request, resp: Response| {
        uri = req.uri().to_string();
        Ok::<_, ErrorResponse>(resp)
    };
    let ws = accept_hdr_async(stream, capture)
        .await
        .context("websocket accept")?;
    Ok(RelayPeer { uri, ws })
}

/// Server end of one accepted client connection.
pub struct RelayPeer {
    /// Request URI, path and query.
    pub uri: String,
    ws: WebSocketStream<TcpStream>,
}

impl RelayPeer {
    pub async fn send(&mut self, text: &str) -> anyhow::Result<()> {
        self.ws
            .send(Message::Text(text.to_string()))
            .await
            .context("relay send")
    }

    /// Sends a ping. The reply is handled by the client's socket library.
    pub async fn ping(&mut self) -> anyhow::Result<()> {
        self.ws
            .send(Message::Ping(Vec::new()))
            .await
            .context("relay ping")
    }

    /// Next text frame from the client.
    pub async fn recv(&mut self, timeout: Duration) -> anyhow::Result<String> {
        within(timeout, async {
            loop {
                match self.ws.next().await {
                    Some(Ok(Message::Text(text))) => return Ok(text),
                    Some(Ok(Message::Close(_))) | None => bail!("client closed"),
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(anyhow::Error::new(e).context("relay recv")),
                }
            }
        })
        .await?
    }

    /// Sends a close frame and drops the link.
    pub async fn close(mut self) -> anyhow::Result<()> {
        self.ws.close(None).await.context("relay close")
    }
}
