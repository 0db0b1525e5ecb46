//! Shared fixtures for the integration suites

#![allow(dead_code)]

use chrono::{DateTime, Utc};
use sentinel::domain::entities::deal::{Deal, DealEntry, DealType};
use sentinel::domain::entities::direction::Direction;
use sentinel::domain::entities::order::{OrderFill, OrderRequest};
use sentinel::domain::repositories::venue_client::VenueClient;
use sentinel::domain::value_objects::fill_mode::FillMode;
use sentinel::infrastructure::{PaperSymbol, PaperVenue, PaperVenueConfig};
use sentinel::persistence::SqliteLedger;
use std::sync::Arc;

pub const OWNER: u64 = 7;

pub fn paper_venue() -> Arc<PaperVenue> {
    Arc::new(PaperVenue::new(PaperVenueConfig {
        symbols: vec![
            PaperSymbol::new("EURUSD", 1.0850, 0.0001),
            PaperSymbol::new("GBPUSD", 1.2700, 0.00015),
            PaperSymbol::new("AUDUSD", 0.6600, 0.0001),
        ],
        ..PaperVenueConfig::default()
    }))
}

/// Two instruments whose every bar closes higher than the last.
pub fn trending_venue() -> Arc<PaperVenue> {
    Arc::new(PaperVenue::new(PaperVenueConfig {
        symbols: vec![
            PaperSymbol::new("EURUSD", 1.0850, 0.0001)
                .with_volatility(0.001)
                .with_drift(0.003),
            PaperSymbol::new("GBPUSD", 1.2700, 0.00015)
                .with_volatility(0.001)
                .with_drift(0.003),
        ],
        ..PaperVenueConfig::default()
    }))
}

pub async fn sqlite_ledger() -> Arc<SqliteLedger> {
    Arc::new(
        SqliteLedger::connect("sqlite::memory:")
            .await
            .expect("in-memory database"),
    )
}

pub fn deal(
    ticket: u64,
    position_id: u64,
    deal_type: DealType,
    entry: DealEntry,
    price: f64,
    timestamp: DateTime<Utc>,
) -> Deal {
    Deal {
        ticket,
        position_id,
        symbol: "EURUSD".to_string(),
        deal_type,
        entry,
        volume: 0.1,
        price,
        profit: 0.0,
        commission: 0.0,
        swap: 0.0,
        timestamp,
        owner_tag: OWNER,
    }
}

/// Market order with stop and target `distance` away from the quote.
pub async fn open_position(venue: &PaperVenue, symbol: &str, direction: Direction, distance: f64) -> OrderFill {
    let info = venue.symbol_info(symbol).await.expect("symbol info");
    let price = match direction {
        Direction::Long => info.quote.ask,
        Direction::Short => info.quote.bid,
    };
    let request = OrderRequest::new(
        symbol.to_string(),
        direction,
        0.1,
        price,
        direction.offset(price, -distance),
        direction.offset(price, distance),
        FillMode::negotiate(info.filling_modes),
        OWNER,
    )
    .expect("valid order");
    venue.submit_order(&request).await.expect("order filled")
}

pub fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {} but got {}",
        expected,
        actual
    );
}
