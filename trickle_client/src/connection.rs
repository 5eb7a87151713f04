//! Self-healing event connection.
//!
//! [`Connection::open`] returns two halves:
//! - [`ConnectionHandle`]: cheap to clone, handed to every component that
//!   sends events or subscribes to them.
//! - [`Connection`]: the driver. It owns the single live [`Channel`], and its
//!   [`run`](Connection::run) loop is the only place frames are written, read
//!   and dispatched.
//!
//! Link lifecycle:
//!
//! ```text
//! Connecting ──ok──▶ Connected ──close/error──▶ Reconnecting{n} ──delay──▶ attempt
//!     │                                              ▲                      │
//!     └──fail──────────────────────────────────────────┴──────fail──────────┘
//! ```
//!
//! There is no terminal state: attempts continue until the driver task is
//! dropped. Subscriptions live in a registry shared by the handles, not on the
//! channel, so every reconnect picks them up unchanged.

use std::{
    collections::{HashMap, VecDeque},
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use parking_lot::Mutex;
use rand::Rng;
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tracing::{debug, info, warn};
use trickle_shared::{
    config::{ClientConfig, OutboundMode},
    event::{ClientEvent, EventKind, ServerEvent},
    net::{decode_server_frame, encode_client_event},
};

use crate::transport::{Channel, Connector};

/// Event handler. Runs on the driver task, once per matching frame.
pub type Handler = Arc<dyn Fn(&ServerEvent) -> anyhow::Result<()> + Send + Sync>;

/// Why an outbound event was not accepted.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("not connected, event dropped")]
    NotConnected,
    #[error("connection driver has stopped")]
    Closed,
    #[error("encode event: {0:#}")]
    Encode(anyhow::Error),
}

/// Link state as observed by handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// First attempt in progress.
    Connecting,
    Connected,
    /// Waiting for (or running) reconnect attempt number `attempt`.
    Reconnecting { attempt: u32 },
}

impl LinkState {
    pub fn is_connected(self) -> bool {
        matches!(self, LinkState::Connected)
    }
}

impl std::fmt::Display for LinkState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinkState::Connecting => f.write_str("connecting"),
            LinkState::Connected => f.write_str("connected"),
            LinkState::Reconnecting { attempt } => write!(f, "reconnecting (attempt {attempt})"),
        }
    }
}

/// Delay schedule between a close and the next attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum ReconnectPolicy {
    /// Same delay before every attempt.
    Fixed(Duration),
    /// `base * 2^(attempt-1)`, capped at `max`, with `±jitter` spread.
    Backoff {
        base: Duration,
        max: Duration,
        jitter: f64,
    },
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        ReconnectPolicy::Fixed(Duration::from_millis(200))
    }
}

impl ReconnectPolicy {
    /// Delay to wait before attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match *self {
            ReconnectPolicy::Fixed(delay) => delay,
            ReconnectPolicy::Backoff { base, max, jitter } => {
                let exp = attempt.saturating_sub(1).min(16);
                let raw = base.saturating_mul(1u32 << exp).min(max);
                let jitter = jitter.clamp(0.0, 1.0);
                if jitter == 0.0 {
                    return raw;
                }
                let factor = 1.0 + rand::thread_rng().gen_range(-jitter..=jitter);
                raw.mul_f64(factor).min(max)
            }
        }
    }
}

/// Driver tuning.
#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    pub reconnect: ReconnectPolicy,
    pub outbound: OutboundMode,
    /// Queue bound while disconnected, for [`OutboundMode::Buffer`].
    pub outbound_buffer: usize,
    /// An attempt still pending after this long counts as failed.
    pub connect_timeout: Duration,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            reconnect: ReconnectPolicy::default(),
            outbound: OutboundMode::Drop,
            outbound_buffer: 64,
            connect_timeout: Duration::from_secs(5),
        }
    }
}

impl ConnectionOptions {
    pub fn from_config(cfg: &ClientConfig) -> Self {
        let r = &cfg.reconnect;
        let reconnect = if r.backoff {
            ReconnectPolicy::Backoff {
                base: r.delay(),
                max: r.max_delay(),
                jitter: r.jitter,
            }
        } else {
            ReconnectPolicy::Fixed(r.delay())
        };
        Self {
            reconnect,
            outbound: cfg.outbound,
            outbound_buffer: cfg.outbound_buffer,
            connect_timeout: r.connect_timeout(),
        }
    }
}

/// Per-kind ordered handler lists.
#[derive(Default)]
pub struct Subscriptions {
    handlers: HashMap<EventKind, Vec<Handler>>,
}

impl Subscriptions {
    pub fn add(&mut self, kind: EventKind, handler: Handler) {
        self.handlers.entry(kind).or_default().push(handler);
    }

    /// Handlers for `kind`, in registration order.
    pub fn handlers(&self, kind: EventKind) -> Vec<Handler> {
        self.handlers.get(&kind).cloned().unwrap_or_default()
    }

    pub fn count(&self, kind: EventKind) -> usize {
        self.handlers.get(&kind).map_or(0, Vec::len)
    }
}

/// Runs every handler once. A failing or panicking handler is logged and
/// skipped; the rest still run. Returns the number of failures.
pub fn dispatch(handlers: &[Handler], event: &ServerEvent) -> usize {
    let mut failures = 0;
    for (i, handler) in handlers.iter().enumerate() {
        match catch_unwind(AssertUnwindSafe(|| handler(event))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                failures += 1;
                warn!(kind = %event.kind(), handler = i, error = %format!("{e:#}"), "Handler failed");
            }
            Err(_) => {
                failures += 1;
                warn!(kind = %event.kind(), handler = i, "Handler panicked");
            }
        }
    }
    failures
}

#[derive(Default)]
struct Counters {
    frames_in: AtomicU64,
    frames_out: AtomicU64,
    dropped_out: AtomicU64,
    ignored_in: AtomicU64,
    malformed_in: AtomicU64,
    handler_failures: AtomicU64,
    connects: AtomicU64,
    failed_attempts: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> ConnectionStats {
        ConnectionStats {
            frames_in: self.frames_in.load(Ordering::Relaxed),
            frames_out: self.frames_out.load(Ordering::Relaxed),
            dropped_out: self.dropped_out.load(Ordering::Relaxed),
            ignored_in: self.ignored_in.load(Ordering::Relaxed),
            malformed_in: self.malformed_in.load(Ordering::Relaxed),
            handler_failures: self.handler_failures.load(Ordering::Relaxed),
            connects: self.connects.load(Ordering::Relaxed),
            failed_attempts: self.failed_attempts.load(Ordering::Relaxed),
        }
    }
}

/// Counters since the connection was opened.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionStats {
    /// Text frames read from any channel.
    pub frames_in: u64,
    /// Frames written to a channel.
    pub frames_out: u64,
    /// Outbound events dropped (disconnected, buffer overflow, write failure).
    pub dropped_out: u64,
    /// Inbound frames of unknown kind.
    pub ignored_in: u64,
    /// Inbound frames that failed to decode.
    pub malformed_in: u64,
    pub handler_failures: u64,
    /// Successful connects, first one included.
    pub connects: u64,
    pub failed_attempts: u64,
}

/// Sending and subscribing side of a connection.
#[derive(Clone)]
pub struct ConnectionHandle {
    outbound: mpsc::UnboundedSender<String>,
    subscriptions: Arc<Mutex<Subscriptions>>,
    link: watch::Receiver<LinkState>,
    counters: Arc<Counters>,
    mode: OutboundMode,
}

impl ConnectionHandle {
    /// Registers `handler` for every inbound event of `kind`.
    ///
    /// Handlers must not call `subscribe` themselves from inside a dispatch
    /// expecting to see the current frame; new handlers apply from the next
    /// frame on.
    pub fn subscribe<F>(&self, kind: EventKind, handler: F)
    where
        F: Fn(&ServerEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.subscriptions.lock().add(kind, Arc::new(handler));
    }

    /// Number of handlers registered for `kind`.
    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.subscriptions.lock().count(kind)
    }

    /// Serializes `event` and hands it to the driver.
    ///
    /// With [`OutboundMode::Drop`] the event is refused while the link is not
    /// connected. With [`OutboundMode::Buffer`] it is queued and flushed after
    /// the next successful connect, keeping only the newest `outbound_buffer`
    /// events.
    ///
    /// `Ok` means the driver accepted the event, not that it was written. If
    /// the channel closes before the link state catches up, an accepted event
    /// can still be dropped (counted in [`ConnectionStats::dropped_out`]).
    pub fn send(&self, event: &ClientEvent) -> Result<(), SendError> {
        let text = encode_client_event(event).map_err(SendError::Encode)?;
        if self.mode == OutboundMode::Drop && !self.link_state().is_connected() {
            Counters::bump(&self.counters.dropped_out);
            debug!(kind = %event.kind(), "Dropping event while disconnected");
            return Err(SendError::NotConnected);
        }
        self.outbound.send(text).map_err(|_| SendError::Closed)
    }

    pub fn link_state(&self) -> LinkState {
        *self.link.borrow()
    }

    /// Receiver that sees every link state change.
    pub fn watch_link(&self) -> watch::Receiver<LinkState> {
        self.link.clone()
    }

    /// Resolves once the link is connected. Errors if the driver is gone.
    pub async fn connected(&self) -> anyhow::Result<()> {
        let mut link = self.link.clone();
        loop {
            if link.borrow_and_update().is_connected() {
                return Ok(());
            }
            link.changed()
                .await
                .map_err(|_| anyhow::anyhow!("connection driver stopped"))?;
        }
    }

    pub fn stats(&self) -> ConnectionStats {
        self.counters.snapshot()
    }
}

/// Connection driver. Consumed by [`run`](Connection::run).
pub struct Connection {
    url: String,
    connector: Arc<dyn Connector>,
    options: ConnectionOptions,
    subscriptions: Arc<Mutex<Subscriptions>>,
    outbound_rx: mpsc::UnboundedReceiver<String>,
    outbound_open: bool,
    pending: VecDeque<String>,
    link: watch::Sender<LinkState>,
    counters: Arc<Counters>,
}

impl Connection {
    /// Prepares a connection to `url`. Nothing touches the network until the
    /// driver runs; a failing first attempt is handled like a close.
    pub fn open(
        connector: Arc<dyn Connector>,
        url: String,
        options: ConnectionOptions,
    ) -> (ConnectionHandle, Connection) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (link_tx, link_rx) = watch::channel(LinkState::Connecting);
        let subscriptions = Arc::new(Mutex::new(Subscriptions::default()));
        let counters = Arc::new(Counters::default());

        let handle = ConnectionHandle {
            outbound: outbound_tx,
            subscriptions: Arc::clone(&subscriptions),
            link: link_rx,
            counters: Arc::clone(&counters),
            mode: options.outbound,
        };
        let driver = Connection {
            url,
            connector,
            options,
            subscriptions,
            outbound_rx,
            outbound_open: true,
            pending: VecDeque::new(),
            link: link_tx,
            counters,
        };
        (handle, driver)
    }

    /// Spawns [`run`](Connection::run) on the current runtime.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Connect, pump frames until the channel closes, wait, repeat. Never
    /// returns on its own.
    pub async fn run(mut self) {
        info!(url = %redact(&self.url), "Opening connection");
        let mut attempt: u32 = 0;
        loop {
            let attempted =
                connect_within(self.connector.as_ref(), &self.url, self.options.connect_timeout)
                    .await;
            match attempted {
                Ok(channel) => {
                    Counters::bump(&self.counters.connects);
                    info!(attempt, "Connected");
                    attempt = 0;
                    self.absorb_backlog();
                    self.link.send_replace(LinkState::Connected);
                    self.pump(channel).await;
                    info!("Channel closed, scheduling reconnect");
                }
                Err(e) => {
                    Counters::bump(&self.counters.failed_attempts);
                    warn!(attempt, error = %format!("{e:#}"), "Connect attempt failed");
                }
            }

            attempt = attempt.saturating_add(1);
            self.link.send_replace(LinkState::Reconnecting { attempt });
            let delay = self.options.reconnect.delay_for(attempt);
            debug!(attempt, delay_ms = delay.as_millis() as u64, "Waiting to reconnect");
            self.wait_offline(delay).await;
        }
    }

    /// Moves events queued during the connect attempt under the offline
    /// policy, before the link is reported connected.
    fn absorb_backlog(&mut self) {
        while let Ok(text) = self.outbound_rx.try_recv() {
            self.hold(text);
        }
    }

    /// Serves one live channel until it closes or fails.
    async fn pump(&mut self, mut channel: Box<dyn Channel>) {
        while let Some(text) = self.pending.pop_front() {
            if !self.write(channel.as_mut(), text).await {
                return;
            }
        }

        loop {
            tokio::select! {
                frame = channel.recv_text() => match frame {
                    Some(Ok(text)) => self.on_message(&text),
                    Some(Err(e)) => {
                        warn!(error = %format!("{e:#}"), "Channel error");
                        return;
                    }
                    None => return,
                },
                out = self.outbound_rx.recv(), if self.outbound_open => match out {
                    Some(text) => {
                        if !self.write(channel.as_mut(), text).await {
                            return;
                        }
                    }
                    None => self.outbound_open = false,
                },
            }
        }
    }

    async fn write(&mut self, channel: &mut dyn Channel, text: String) -> bool {
        match channel.send_text(text).await {
            Ok(()) => {
                Counters::bump(&self.counters.frames_out);
                true
            }
            Err(e) => {
                Counters::bump(&self.counters.dropped_out);
                warn!(error = %format!("{e:#}"), "Write failed");
                false
            }
        }
    }

    /// Sleeps out the reconnect delay while still draining outbound events.
    async fn wait_offline(&mut self, delay: Duration) {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => return,
                out = self.outbound_rx.recv(), if self.outbound_open => match out {
                    Some(text) => self.hold(text),
                    None => self.outbound_open = false,
                },
            }
        }
    }

    fn hold(&mut self, text: String) {
        match self.options.outbound {
            OutboundMode::Drop => {
                Counters::bump(&self.counters.dropped_out);
                debug!("Dropping outbound frame while reconnecting");
            }
            OutboundMode::Buffer => {
                self.pending.push_back(text);
                while self.pending.len() > self.options.outbound_buffer {
                    self.pending.pop_front();
                    Counters::bump(&self.counters.dropped_out);
                }
            }
        }
    }

    fn on_message(&self, text: &str) {
        Counters::bump(&self.counters.frames_in);
        match decode_server_frame(text) {
            Ok(Some(event)) => {
                let handlers = self.subscriptions.lock().handlers(event.kind());
                let failures = dispatch(&handlers, &event);
                if failures > 0 {
                    self.counters
                        .handler_failures
                        .fetch_add(failures as u64, Ordering::Relaxed);
                }
            }
            Ok(None) => {
                Counters::bump(&self.counters.ignored_in);
                debug!(frame = %text, "Ignoring frame of unknown kind");
            }
            Err(e) => {
                Counters::bump(&self.counters.malformed_in);
                warn!(error = %format!("{e:#}"), "Dropping malformed frame");
            }
        }
    }
}

/// One connect attempt. A handshake still pending after `timeout` is a
/// failed attempt.
async fn connect_within(
    connector: &dyn Connector,
    url: &str,
    timeout: Duration,
) -> anyhow::Result<Box<dyn Channel>> {
    tokio::time::timeout(timeout, connector.connect(url))
        .await
        .map_err(|_| anyhow::anyhow!("connect timed out after {timeout:?}"))?
}

/// Strips the query (auth token) from a URL for logging.
fn redact(url: &str) -> &str {
    url.split('?').next().unwrap_or(url)
}
