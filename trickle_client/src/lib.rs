//! `trickle_client`
//!
//! Client-side systems:
//! - Self-healing event connection (reconnects forever, subscriptions survive)
//! - Transports: WebSocket and an in-process loopback
//! - Remote entity reconciliation and local prediction
//! - Input mapping and the console command set

pub mod client;
pub mod connection;
pub mod input;
pub mod transport;
pub mod world;

pub use client::GameClient;
pub use connection::{Connection, ConnectionHandle, LinkState, SendError};
pub use world::WorldState;
