//! Input handling.
//!
//! A front end samples its keys into an [`InputState`] once per frame; the
//! client turns that into up to two moves (one per axis) and one attack per
//! tick.

use trickle_shared::event::Direction;

/// Held keys at a moment in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InputState {
    pub left: bool,
    pub right: bool,
    pub up: bool,
    pub down: bool,
    pub fire: bool,
}

impl InputState {
    /// A single held direction.
    pub fn holding(direction: Direction) -> Self {
        let mut input = Self::default();
        match direction {
            Direction::North => input.up = true,
            Direction::East => input.right = true,
            Direction::South => input.down = true,
            Direction::West => input.left = true,
        }
        input
    }

    /// Horizontal step, left over right.
    pub fn horizontal(self) -> Option<Direction> {
        if self.left {
            Some(Direction::West)
        } else if self.right {
            Some(Direction::East)
        } else {
            None
        }
    }

    /// Vertical step, up over down.
    pub fn vertical(self) -> Option<Direction> {
        if self.up {
            Some(Direction::North)
        } else if self.down {
            Some(Direction::South)
        } else {
            None
        }
    }

    /// Steps to take this tick: horizontal first, then vertical. Holding one
    /// key of each axis moves diagonally.
    pub fn directions(self) -> Vec<Direction> {
        self.horizontal().into_iter().chain(self.vertical()).collect()
    }

    pub fn is_idle(self) -> bool {
        self == Self::default()
    }
}

/// What a tick produced from input.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickActions {
    /// Steps predicted this tick, in the order they were sent.
    pub moved: Vec<Direction>,
    pub attacked: bool,
}
