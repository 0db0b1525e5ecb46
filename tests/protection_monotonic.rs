//! Stop ratchet properties for long and short positions

mod common;

use chrono::Utc;
use common::{open_position, paper_venue, OWNER};
use sentinel::domain::entities::direction::Direction;
use sentinel::domain::entities::position::Position;
use sentinel::domain::repositories::venue_client::VenueClient;
use sentinel::domain::services::protection::{ProtectionConfig, ProtectionManager};

const ATR: f64 = 0.0020;

fn manager() -> ProtectionManager {
    ProtectionManager::new(
        paper_venue(),
        ProtectionConfig {
            owner_tag: OWNER,
            ..ProtectionConfig::default()
        },
    )
}

fn position(direction: Direction, entry: f64, stop: f64) -> Position {
    Position {
        ticket: 1,
        symbol: "EURUSD".to_string(),
        direction,
        volume: 0.1,
        entry_price: entry,
        current_price: entry,
        stop_price: Some(stop),
        target_price: Some(direction.offset(entry, 0.05)),
        opened_at: Utc::now(),
        unrealized_profit: 0.0,
        owner_tag: OWNER,
    }
}

/// Feed `prices` through the planner, applying every adjustment, and return
/// the stop after each step.
fn stop_path(manager: &ProtectionManager, mut position: Position, prices: &[f64]) -> Vec<f64> {
    let mut stops = Vec::with_capacity(prices.len());
    for price in prices {
        position.current_price = *price;
        if let Some(adjustment) = manager.plan_adjustment(&position, ATR) {
            position.stop_price = Some(adjustment.new_stop);
        }
        stops.push(position.stop_price.unwrap());
    }
    stops
}

#[test]
fn test_long_stop_never_decreases_on_rising_prices() {
    let manager = manager();
    let prices: Vec<f64> = (0..60).map(|i| 1.1000 + i as f64 * 0.0005).collect();
    let stops = stop_path(&manager, position(Direction::Long, 1.1000, 1.0940), &prices);

    assert!(stops.windows(2).all(|w| w[1] >= w[0]), "stops: {:?}", stops);
    // Passed breakeven and kept trailing
    assert!(stops.last().unwrap() > &1.1000);
}

#[test]
fn test_short_stop_never_increases_on_falling_prices() {
    let manager = manager();
    let prices: Vec<f64> = (0..60).map(|i| 1.1000 - i as f64 * 0.0005).collect();
    let stops = stop_path(&manager, position(Direction::Short, 1.1000, 1.1060), &prices);

    assert!(stops.windows(2).all(|w| w[1] <= w[0]), "stops: {:?}", stops);
    assert!(stops.last().unwrap() < &1.1000);
}

#[test]
fn test_stop_holds_when_price_retraces() {
    let manager = manager();
    let prices = [1.1000, 1.1030, 1.1060, 1.1010, 1.0990, 1.1080, 1.1020];
    let long = stop_path(&manager, position(Direction::Long, 1.1000, 1.0940), &prices);
    assert!(long.windows(2).all(|w| w[1] >= w[0]), "long stops: {:?}", long);

    let mirrored: Vec<f64> = prices.iter().map(|p| 2.2 - p).collect();
    let short = stop_path(&manager, position(Direction::Short, 1.1000, 1.1060), &mirrored);
    assert!(short.windows(2).all(|w| w[1] <= w[0]), "short stops: {:?}", short);
}

#[test]
fn test_breakeven_locks_a_small_profit() {
    let manager = manager();
    let mut long = position(Direction::Long, 1.1000, 1.0900);
    // One ATR and a bit in favor, trailing stop still below entry
    long.current_price = 1.1025;
    let adjustment = manager.plan_adjustment(&long, ATR).unwrap();
    assert!((adjustment.new_stop - 1.1002).abs() < 1e-9);

    let mut short = position(Direction::Short, 1.1000, 1.1100);
    short.current_price = 1.0975;
    let adjustment = manager.plan_adjustment(&short, ATR).unwrap();
    assert!((adjustment.new_stop - 1.0998).abs() < 1e-9);
}

#[tokio::test]
async fn test_venue_stops_ratchet_across_cycles() {
    let venue = paper_venue();
    let mut manager = ProtectionManager::new(
        venue.clone(),
        ProtectionConfig {
            owner_tag: OWNER,
            ..ProtectionConfig::default()
        },
    );
    let fill = open_position(&venue, "EURUSD", Direction::Long, 0.05).await;

    let mut previous = None;
    for step in 1..=20 {
        venue
            .set_price("EURUSD", fill.price + step as f64 * 0.0004)
            .unwrap();
        let positions = venue.open_positions(Some(OWNER)).await.unwrap();
        manager.protect(&positions).await;

        let stop = venue.open_positions(Some(OWNER)).await.unwrap()[0]
            .stop_price
            .unwrap();
        if let Some(previous) = previous {
            assert!(stop >= previous, "stop loosened from {} to {}", previous, stop);
        }
        previous = Some(stop);
    }
}
