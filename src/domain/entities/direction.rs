use crate::domain::errors::ValidationError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Side of an open exposure.
///
/// All price arithmetic that differs between longs and shorts goes through
/// [`Direction::sign`], so there is one formula per rule instead of one per
/// side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// +1 for a long, -1 for a short.
    pub fn sign(self) -> f64 {
        match self {
            Direction::Long => 1.0,
            Direction::Short => -1.0,
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Direction::Long => Direction::Short,
            Direction::Short => Direction::Long,
        }
    }

    /// Signed distance from `from` to `to`, positive when `to` is in the
    /// favorable direction.
    pub fn favorable_distance(self, from: f64, to: f64) -> f64 {
        self.sign() * (to - from)
    }

    /// True when `candidate` is strictly more favorable than `reference`.
    pub fn is_improvement(self, reference: f64, candidate: f64) -> bool {
        self.favorable_distance(reference, candidate) > 0.0
    }

    /// Offset `price` by `distance`, towards profit for positive distances.
    pub fn offset(self, price: f64, distance: f64) -> f64 {
        price + self.sign() * distance
    }

    /// Label used by the venue and the ledger.
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Long => "BUY",
            Direction::Short => "SELL",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Direction {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "BUY" | "LONG" => Ok(Direction::Long),
            "SELL" | "SHORT" => Ok(Direction::Short),
            other => Err(ValidationError::UnknownDirection(other.to_string())),
        }
    }
}
