use serde::{Deserialize, Serialize};

/// Account snapshot reported by the venue.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AccountInfo {
    pub balance: f64,
    pub equity: f64,
    pub free_margin: f64,
}

/// Current bid/ask for an instrument.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub bid: f64,
    pub ask: f64,
}

impl Quote {
    pub fn spread(&self) -> f64 {
        self.ask - self.bid
    }

    pub fn mid(&self) -> f64 {
        (self.ask + self.bid) / 2.0
    }
}

/// Instrument metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolInfo {
    pub name: String,
    pub visible: bool,
    /// Venue bitmask of accepted fill policies, see `FillMode`.
    pub filling_modes: u32,
    pub quote: Quote,
    pub digits: u32,
}
