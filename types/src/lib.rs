//! Shared configuration types for halo
//!
//! This crate contains serializable types that are shared between the
//! engine (halo-core) and the simulation harness.

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Engine Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Default simulation step length in milliseconds
pub const DEFAULT_TICK_MS: u64 = 100;

/// Default capacity of bounded change-notification channels
pub const DEFAULT_NOTIFICATION_CAPACITY: usize = 1024;

/// Default lower bound for the inverse formula's multiplier
pub const DEFAULT_INVERSE_FLOOR: f64 = 0.01;

/// Engine-wide tunables, persisted with confy by the harness.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Simulated milliseconds that elapse per tick
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,

    /// Capacity of bounded notification channels created by the engine
    #[serde(default = "default_notification_capacity")]
    pub notification_capacity: usize,

    /// `Inverse` modifiers never scale a value below this factor
    #[serde(default = "default_inverse_floor")]
    pub inverse_floor: f64,

    /// Catalog file or directory used when none is passed on the command line
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog_path: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_ms: DEFAULT_TICK_MS,
            notification_capacity: DEFAULT_NOTIFICATION_CAPACITY,
            inverse_floor: DEFAULT_INVERSE_FLOOR,
            catalog_path: None,
        }
    }
}

fn default_tick_ms() -> u64 {
    DEFAULT_TICK_MS
}

fn default_notification_capacity() -> usize {
    DEFAULT_NOTIFICATION_CAPACITY
}

fn default_inverse_floor() -> f64 {
    DEFAULT_INVERSE_FLOOR
}

// ─────────────────────────────────────────────────────────────────────────────
// Spatial Types
// ─────────────────────────────────────────────────────────────────────────────

/// A point in world space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Euclidean distance in 3-D
    pub fn distance(&self, other: &Position) -> f64 {
        self.distance_squared(other).sqrt()
    }

    pub fn distance_squared(&self, other: &Position) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        dx * dx + dy * dy + dz * dz
    }

    /// Check if `other` lies within `radius` (inclusive)
    pub fn is_within(&self, other: &Position, radius: f64) -> bool {
        self.distance_squared(other) <= radius * radius
    }
}

impl From<[f64; 3]> for Position {
    fn from([x, y, z]: [f64; 3]) -> Self {
        Self { x, y, z }
    }
}
