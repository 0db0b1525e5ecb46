//! Reconciliation module
//!
//! Mirrors the venue's closed-trade and balance history into the ledger.
//! A pass scans a wide lookback window every cycle, so it must be safe to
//! repeat: tickets are unique in the ledger and inserts skip known ones.

pub mod classifier;
pub mod engine;

pub use classifier::{classify, opening_sibling, DealClass, IgnoreReason};
pub use engine::ReconciliationEngine;

use crate::domain::errors::{LedgerError, VenueError};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::str::FromStr;
use thiserror::Error;

/// Which closing deals belong in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LedgerScope {
    /// Only deals carrying this system's ownership tag
    Owned,
    /// Every closing deal on the account
    Account,
}

impl FromStr for LedgerScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "owned" => Ok(LedgerScope::Owned),
            "account" => Ok(LedgerScope::Account),
            other => Err(format!("Unknown ledger scope '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReconciliationConfig {
    pub owner_tag: u64,
    /// How far back each pass looks. Must exceed the longest expected outage.
    pub lookback: Duration,
    /// Added past "now" to absorb venue server clock offsets
    pub forward_allowance: Duration,
    pub scope: LedgerScope,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            owner_tag: 20260213,
            lookback: Duration::days(30),
            forward_allowance: Duration::days(1),
            scope: LedgerScope::Owned,
        }
    }
}

/// Counters of one reconciliation pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconciliationReport {
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub deals_scanned: usize,
    pub candidates: usize,
    pub already_recorded: usize,
    pub inserted: usize,
    pub balance_records: usize,
    /// Closing deals whose opening deal could not be found
    pub degraded_links: usize,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ReconciliationError {
    #[error("Venue query failed during reconciliation: {0}")]
    Venue(#[from] VenueError),

    #[error("Ledger write failed during reconciliation: {0}")]
    Ledger(#[from] LedgerError),
}
