//! Event types.
//!
//! Two directions, two types:
//! - [`ServerEvent`]: what the server broadcasts (positions, damage, chat, leave).
//! - [`ClientEvent`]: what local input sends up (a direction, an attack, a chat line).
//!
//! Both are tagged by an [`EventKind`], the closed set of wire discriminants.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::math::Rect;

/// Starting (and maximum) health of every player. Each hit costs one point.
pub const MAX_HEALTH: i32 = 6;

/// Event discriminant as carried in the frame's `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    Move,
    Attack,
    Damage,
    Chat,
    /// Player left the world; the entity should be despawned.
    Leave,
}

impl EventKind {
    pub const ALL: [EventKind; 5] = [
        EventKind::Move,
        EventKind::Attack,
        EventKind::Damage,
        EventKind::Chat,
        EventKind::Leave,
    ];

    /// Wire code.
    pub fn code(self) -> i64 {
        match self {
            EventKind::Move => 0,
            EventKind::Attack => 1,
            EventKind::Damage => 2,
            EventKind::Chat => 3,
            EventKind::Leave => 4,
        }
    }

    /// Maps a wire code back to a kind. Unknown codes yield `None`.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(EventKind::Move),
            1 => Some(EventKind::Attack),
            2 => Some(EventKind::Damage),
            3 => Some(EventKind::Chat),
            4 => Some(EventKind::Leave),
            _ => None,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventKind::Move => "move",
            EventKind::Attack => "attack",
            EventKind::Damage => "damage",
            EventKind::Chat => "chat",
            EventKind::Leave => "leave",
        };
        f.write_str(name)
    }
}

/// Cardinal direction; also the facing of a player.
///
/// Encoded on the wire as `0..=3` (north, east, south, west).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Direction {
    #[default]
    North,
    East,
    South,
    West,
}

impl Direction {
    /// One-unit step for this direction in screen space.
    pub fn delta(self) -> (f64, f64) {
        match self {
            Direction::North => (0.0, -1.0),
            Direction::East => (1.0, 0.0),
            Direction::South => (0.0, 1.0),
            Direction::West => (-1.0, 0.0),
        }
    }

    /// Parses the console spelling (`n`, `north`, `E`, ...).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "n" | "north" | "up" => Some(Direction::North),
            "e" | "east" | "right" => Some(Direction::East),
            "s" | "south" | "down" => Some(Direction::South),
            "w" | "west" | "left" => Some(Direction::West),
            _ => None,
        }
    }
}

impl TryFrom<u8> for Direction {
    type Error = String;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(Direction::North),
            1 => Ok(Direction::East),
            2 => Ok(Direction::South),
            3 => Ok(Direction::West),
            other => Err(format!("invalid direction {other}")),
        }
    }
}

impl From<Direction> for u8 {
    fn from(d: Direction) -> u8 {
        match d {
            Direction::North => 0,
            Direction::East => 1,
            Direction::South => 2,
            Direction::West => 3,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Direction::North => "N",
            Direction::East => "E",
            Direction::South => "S",
            Direction::West => "W",
        };
        f.write_str(name)
    }
}

/// A player's position broadcast.
#[derive(Debug, Clone, PartialEq)]
pub struct Movement {
    pub user_id: String,
    pub dimensions: Rect,
    /// Facing echoed by the server, when it sends one.
    pub direction: Option<Direction>,
    /// Per-entity sequence number, when the server sends one.
    pub seq: Option<u64>,
}

/// A damage broadcast. The server may send a new position, a new health
/// value, or both.
#[derive(Debug, Clone, PartialEq)]
pub struct Damage {
    pub user_id: String,
    pub dimensions: Option<Rect>,
    pub health: Option<i32>,
    pub seq: Option<u64>,
}

/// A chat line.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatLine {
    pub user_id: Option<String>,
    pub msg: String,
}

/// Inbound event, decoded from one wire frame.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    Move(Movement),
    Attack { user_id: Option<String> },
    Damage(Damage),
    Chat(ChatLine),
    Leave { user_id: String },
}

impl ServerEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ServerEvent::Move(_) => EventKind::Move,
            ServerEvent::Attack { .. } => EventKind::Attack,
            ServerEvent::Damage(_) => EventKind::Damage,
            ServerEvent::Chat(_) => EventKind::Chat,
            ServerEvent::Leave { .. } => EventKind::Leave,
        }
    }

    /// The player this event is about, if any.
    pub fn user_id(&self) -> Option<&str> {
        match self {
            ServerEvent::Move(m) => Some(&m.user_id),
            ServerEvent::Attack { user_id } => user_id.as_deref(),
            ServerEvent::Damage(d) => Some(&d.user_id),
            ServerEvent::Chat(c) => c.user_id.as_deref(),
            ServerEvent::Leave { user_id } => Some(user_id),
        }
    }
}

/// Outbound event produced by local input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    Move { direction: Direction },
    Attack,
    Chat { msg: String },
}

impl ClientEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ClientEvent::Move { .. } => EventKind::Move,
            ClientEvent::Attack => EventKind::Attack,
            ClientEvent::Chat { .. } => EventKind::Chat,
        }
    }
}
