//! Signal types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Direction of a detected move
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    /// Price rose across the window
    Up,
    /// Price fell across the window
    Down,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Up => f.write_str("UP"),
            Direction::Down => f.write_str("DOWN"),
        }
    }
}

/// A single price observation in the rolling window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceObservation {
    pub timestamp: DateTime<Utc>,
    pub price: Decimal,
}

/// A momentum signal derived from the rolling window
///
/// Not persisted; consumed by the decision cycle that read it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signal {
    /// Timestamp of the newest observation in the window
    pub timestamp: DateTime<Utc>,
    pub direction: Direction,
    /// Size of the move in basis points, always non-negative
    pub magnitude_bps: Decimal,
}

impl Signal {
    /// Move in basis points with the direction applied as a sign
    pub fn signed_bps(&self) -> Decimal {
        match self.direction {
            Direction::Up => self.magnitude_bps,
            Direction::Down => -self.magnitude_bps,
        }
    }
}
