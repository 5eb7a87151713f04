//! Math types.
//!
//! The world is a flat tile map, so everything here is 2D. Coordinates are in
//! pixels with `y` growing downwards (screen space).

use serde::{Deserialize, Serialize};

/// Width of one map tile in pixels.
pub const TILE_WIDTH: f64 = 16.0;

/// 2D point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Vec2 {
    pub const ZERO: Self = Self { x: 0.0, y: 0.0 };

    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned bounding box, as the server reports a player's `dimensions`.
///
/// `width`/`height` are optional on the wire; a bare `{x, y}` decodes to a
/// zero-sized box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub width: f64,
    #[serde(default)]
    pub height: f64,
}

impl Rect {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Player-sized box (one tile wide, two tall) at the given position.
    pub fn player_at(x: f64, y: f64) -> Self {
        Self::new(x, y, TILE_WIDTH, TILE_WIDTH * 2.0)
    }

    pub fn origin(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }

    /// Strict overlap test; touching edges do not intersect.
    pub fn intersects(&self, other: &Rect) -> bool {
        self.x < other.x + other.width
            && self.x + self.width > other.x
            && self.y < other.y + other.height
            && self.y + self.height > other.y
    }
}
