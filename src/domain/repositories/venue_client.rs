//! Venue Client Trait
//!
//! `VenueClient` is the boundary to the execution venue: the brokerage that
//! owns authoritative account, position and deal state. The trading engine
//! only ever talks to the venue through this trait, which keeps the core
//! testable against scripted or simulated venues.
//!
//! The connection handshake is assumed to be done before a client is handed
//! to the engine.

use crate::domain::entities::account::{AccountInfo, SymbolInfo};
use crate::domain::entities::candle::{Candle, Timeframe};
use crate::domain::entities::deal::{Deal, DealQuery};
use crate::domain::entities::order::{OrderFill, OrderRequest};
use crate::domain::entities::position::Position;
use crate::domain::errors::VenueError;
use async_trait::async_trait;

/// Common result type for venue operations
pub type VenueResult<T> = Result<T, VenueError>;

#[async_trait]
pub trait VenueClient: Send + Sync {
    /// Venue name for logging
    fn name(&self) -> &str;

    /// Balance, equity and free margin
    async fn account_info(&self) -> VenueResult<AccountInfo>;

    /// All instruments the venue lists
    async fn symbols(&self) -> VenueResult<Vec<SymbolInfo>>;

    /// Metadata and current quote for one instrument
    async fn symbol_info(&self, symbol: &str) -> VenueResult<SymbolInfo>;

    /// The most recent `count` closed bars, oldest first
    async fn candles(&self, symbol: &str, timeframe: Timeframe, count: usize) -> VenueResult<Vec<Candle>>;

    /// Open positions, optionally only those carrying `owner_tag`
    async fn open_positions(&self, owner_tag: Option<u64>) -> VenueResult<Vec<Position>>;

    /// Historical deals matching `query`
    async fn deals(&self, query: &DealQuery) -> VenueResult<Vec<Deal>>;

    /// Submit a market order with stop and target attached
    async fn submit_order(&self, request: &OrderRequest) -> VenueResult<OrderFill>;

    /// Replace stop and target of an open position
    async fn modify_protection(&self, ticket: u64, stop_price: f64, target_price: Option<f64>) -> VenueResult<()>;
}
