//! Client implementation.
//!
//! [`GameClient`] owns the pieces a front end needs:
//! - the connection driver task (reconnects on its own)
//! - the [`WorldState`] mirror, subscribed to that connection
//! - per-tick input mapping
//! - the console command set

use std::{sync::Arc, time::Duration};

use anyhow::{bail, Context};
use tokio::task::JoinHandle;
use tracing::{debug, info};
use trickle_shared::{
    auth::{Authenticator, Credentials, Session},
    config::ClientConfig,
    event::{Direction, EventKind, ServerEvent},
};

use crate::{
    connection::{Connection, ConnectionHandle, ConnectionOptions, LinkState},
    input::{InputState, TickActions},
    transport::{Connector, WsConnector},
    world::WorldState,
};

/// Chat lines shown by the `chat` console command.
const CHAT_TAIL: usize = 20;

/// High-level game client.
pub struct GameClient {
    pub session: Session,
    world: WorldState,
    conn: ConnectionHandle,
    driver: JoinHandle<()>,
    ticks: u64,
}

impl GameClient {
    /// Starts a client over WebSocket. Returns immediately; the first connect
    /// happens on the driver task.
    pub fn connect(cfg: &ClientConfig) -> anyhow::Result<Self> {
        let connector = WsConnector::new(cfg.reconnect.idle_timeout());
        Self::with_connector(cfg, Arc::new(connector))
    }

    /// Logs in through `auth`, then starts a client for the returned session.
    pub async fn login(
        auth: &dyn Authenticator,
        credentials: &Credentials,
        cfg: &ClientConfig,
        connector: Arc<dyn Connector>,
    ) -> anyhow::Result<Self> {
        let session = auth
            .login(credentials)
            .await
            .with_context(|| format!("login as {}", credentials.username))?;
        info!(user_id = %session.user_id, "Logged in");
        let cfg = ClientConfig {
            user_id: session.user_id,
            token: session.token,
            ..cfg.clone()
        };
        Self::with_connector(&cfg, connector)
    }

    /// Starts a client on any transport. Must be called inside a tokio
    /// runtime.
    pub fn with_connector(
        cfg: &ClientConfig,
        connector: Arc<dyn Connector>,
    ) -> anyhow::Result<Self> {
        if cfg.user_id.is_empty() {
            bail!("user_id is required");
        }
        let url = cfg.connect_url().context("derive connect url")?;
        let (conn, driver) = Connection::open(connector, url, ConnectionOptions::from_config(cfg));

        let world = WorldState::attach(conn.clone(), &cfg.user_id);
        // Second chat handler next to the reconciler's: log lines as they arrive.
        conn.subscribe(EventKind::Chat, |event| {
            if let ServerEvent::Chat(line) = event {
                info!(from = line.user_id.as_deref().unwrap_or("?"), msg = %line.msg, "Chat");
            }
            Ok(())
        });

        info!(user_id = %cfg.user_id, origin = %cfg.origin, "Client started");
        Ok(Self {
            session: Session {
                user_id: cfg.user_id.clone(),
                token: cfg.token.clone(),
            },
            world,
            conn,
            driver: driver.spawn(),
            ticks: 0,
        })
    }

    /// Waits up to `timeout` for the link to come up.
    pub async fn wait_connected(&self, timeout: Duration) -> anyhow::Result<()> {
        tokio::time::timeout(timeout, self.conn.connected())
            .await
            .context("timed out waiting for connection")?
    }

    pub fn world(&self) -> &WorldState {
        &self.world
    }

    pub fn connection(&self) -> &ConnectionHandle {
        &self.conn
    }

    pub fn link_state(&self) -> LinkState {
        self.conn.link_state()
    }

    /// Applies one frame of input: up to one step per axis, then at most one
    /// attack.
    ///
    /// Refused sends are logged and otherwise ignored; steps are still
    /// predicted locally.
    pub fn tick(&mut self, input: InputState) -> TickActions {
        self.ticks += 1;
        let mut actions = TickActions::default();
        for direction in input.directions() {
            if let Err(e) = self.world.send_local_move(direction) {
                debug!(tick = self.ticks, error = %e, "Move not delivered");
            }
            actions.moved.push(direction);
        }
        if input.fire {
            match self.world.send_local_attack() {
                Ok(_) => actions.attacked = true,
                Err(e) => debug!(tick = self.ticks, error = %e, "Attack not delivered"),
            }
        }
        actions
    }

    /// Executes a console command.
    pub fn exec_console(&mut self, line: &str) -> anyhow::Result<Vec<String>> {
        let line = line.trim();
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some(&command) = tokens.first() else {
            return Ok(Vec::new());
        };

        match command {
            "move" | "m" => {
                let Some(direction) = tokens.get(1).and_then(|t| Direction::parse(t)) else {
                    return Ok(vec!["Usage: move <n|e|s|w>".to_string()]);
                };
                let sent = self.world.send_local_move(direction);
                let me = self.world.local_player();
                let mut out = vec![format!("At ({}, {}) facing {}", me.x, me.y, me.facing)];
                if let Err(e) = sent {
                    out.push(format!("Not sent: {e}"));
                }
                Ok(out)
            }
            "attack" | "a" => match self.world.send_local_attack() {
                Ok(facing) => Ok(vec![format!("Attack {facing}")]),
                Err(e) => Ok(vec![format!("Not sent: {e}")]),
            },
            "say" => {
                let msg = line[command.len()..].trim();
                if msg.is_empty() {
                    return Ok(vec!["Usage: say <message>".to_string()]);
                }
                match self.world.send_chat(msg) {
                    Ok(()) => Ok(Vec::new()),
                    Err(e) => Ok(vec![format!("Not sent: {e}")]),
                }
            }
            "status" => {
                let me = self.world.local_player();
                let stats = self.conn.stats();
                Ok(vec![
                    format!("Link: {}", self.link_state()),
                    format!("User: {}", self.session.user_id),
                    format!(
                        "Position: ({}, {}) facing {} health {}",
                        me.x, me.y, me.facing, me.health
                    ),
                    format!("Players: {}", self.world.entity_count()),
                    format!(
                        "Frames: {} in, {} out, {} dropped, {} malformed",
                        stats.frames_in, stats.frames_out, stats.dropped_out, stats.malformed_in
                    ),
                    format!(
                        "Connects: {} ({} failed attempts)",
                        stats.connects, stats.failed_attempts
                    ),
                ])
            }
            "who" => {
                let entities = self.world.entities();
                if entities.is_empty() {
                    return Ok(vec!["Nobody else here".to_string()]);
                }
                Ok(entities
                    .values()
                    .map(|e| {
                        format!(
                            "{} at ({}, {}) facing {} health {}{}",
                            e.id,
                            e.x,
                            e.y,
                            e.facing,
                            e.health,
                            if e.is_alive() { "" } else { " (down)" }
                        )
                    })
                    .collect())
            }
            "chat" => {
                let entries = self.world.chat_entries();
                let skip = entries.len().saturating_sub(CHAT_TAIL);
                Ok(entries[skip..]
                    .iter()
                    .map(|c| {
                        format!(
                            "[{}] {}: {}",
                            c.received_at.format("%H:%M:%S"),
                            c.user_id.as_deref().unwrap_or("?"),
                            c.msg
                        )
                    })
                    .collect())
            }
            "dump" => {
                let json = serde_json::to_string_pretty(&self.world.dump())
                    .context("serialize world")?;
                Ok(json.lines().map(str::to_string).collect())
            }
            other => Ok(vec![format!("Unknown command: {other}")]),
        }
    }

    /// Stops the connection driver.
    pub fn shutdown(self) {
        self.driver.abort();
        info!(ticks = self.ticks, "Client stopped");
    }
}
