//! Reconciliation against a real SQLite ledger

mod common;

use chrono::{Duration, TimeZone, Utc};
use common::{assert_close, deal, open_position, paper_venue, sqlite_ledger, OWNER};
use sentinel::domain::entities::deal::{DealEntry, DealType};
use sentinel::domain::entities::direction::Direction;
use sentinel::domain::entities::trade_record::TradeSide;
use sentinel::domain::services::reconciliation::{ReconciliationConfig, ReconciliationEngine};

fn config() -> ReconciliationConfig {
    ReconciliationConfig {
        owner_tag: OWNER,
        ..ReconciliationConfig::default()
    }
}

#[tokio::test]
async fn test_second_pass_creates_no_duplicates() {
    let venue = paper_venue();
    let ledger = sqlite_ledger().await;
    let now = Utc::now();

    for (i, position_id) in [500u64, 501, 502].iter().enumerate() {
        let opened = now - Duration::hours(10 + i as i64);
        venue.record_deal(deal(6000 + i as u64, *position_id, DealType::Buy, DealEntry::In, 1.1, opened));
        let mut close = deal(
            7000 + i as u64,
            *position_id,
            DealType::Sell,
            DealEntry::Out,
            1.101,
            opened + Duration::hours(2),
        );
        close.profit = 10.0;
        venue.record_deal(close);
    }

    let engine = ReconciliationEngine::new(venue.clone(), ledger.clone(), config());
    let first = engine.reconcile(now).await.unwrap();
    // Three closes plus the initial deposit
    assert_eq!(first.inserted, 4);
    let rows_after_first = ledger.trade_count().await.unwrap();

    let second = engine.reconcile(now + Duration::seconds(15)).await.unwrap();
    assert_eq!(second.inserted, 0);
    assert_eq!(ledger.trade_count().await.unwrap(), rows_after_first);
}

#[tokio::test]
async fn test_net_profit_includes_commission_and_swap() {
    let venue = paper_venue();
    let ledger = sqlite_ledger().await;
    let now = Utc::now();

    venue.record_deal(deal(6100, 610, DealType::Buy, DealEntry::In, 1.1, now - Duration::hours(3)));
    let mut close = deal(6101, 610, DealType::Sell, DealEntry::Out, 1.1125, now - Duration::hours(1));
    close.profit = 12.5;
    close.commission = -0.7;
    close.swap = -0.2;
    venue.record_deal(close);

    ReconciliationEngine::new(venue, ledger.clone(), config())
        .reconcile(now)
        .await
        .unwrap();

    let record = ledger.get_trade(6101).await.unwrap().unwrap();
    assert_close(record.net_profit, 11.6);
}

#[tokio::test]
async fn test_open_and_close_are_linked_by_position() {
    let venue = paper_venue();
    let ledger = sqlite_ledger().await;
    let t0 = Utc.with_ymd_and_hms(2026, 10, 16, 9, 0, 0).unwrap();
    let t1 = Utc.with_ymd_and_hms(2026, 10, 17, 15, 30, 0).unwrap();

    venue.record_deal(deal(6200, 620, DealType::Buy, DealEntry::In, 1.1000, t0));
    venue.record_deal(deal(6201, 620, DealType::Sell, DealEntry::Out, 1.1050, t1));

    ReconciliationEngine::new(venue, ledger.clone(), config())
        .reconcile(t1 + Duration::hours(1))
        .await
        .unwrap();

    let record = ledger.get_trade(6201).await.unwrap().unwrap();
    assert_eq!(record.open_time, t0);
    assert_close(record.open_price, 1.1000);
    assert_eq!(record.close_time, t1);
    assert_close(record.close_price, 1.1050);
    assert_eq!(record.side, TradeSide::Buy);
}

#[tokio::test]
async fn test_partial_closes_each_get_a_row() {
    let venue = paper_venue();
    let ledger = sqlite_ledger().await;
    let now = Utc::now();

    venue.record_deal(deal(6300, 630, DealType::Sell, DealEntry::In, 1.2000, now - Duration::hours(5)));
    let mut first = deal(6301, 630, DealType::Buy, DealEntry::Out, 1.1980, now - Duration::hours(3));
    first.volume = 0.05;
    let mut second = deal(6302, 630, DealType::Buy, DealEntry::Out, 1.1950, now - Duration::hours(1));
    second.volume = 0.05;
    venue.record_deal(first);
    venue.record_deal(second);

    ReconciliationEngine::new(venue, ledger.clone(), config())
        .reconcile(now)
        .await
        .unwrap();

    for ticket in [6301, 6302] {
        let record = ledger.get_trade(ticket).await.unwrap().unwrap();
        assert_eq!(record.side, TradeSide::Sell);
        assert_close(record.open_price, 1.2000);
        assert_close(record.volume, 0.05);
    }
}

#[tokio::test]
async fn test_venue_trade_round_trip_reaches_ledger() {
    let venue = paper_venue();
    let ledger = sqlite_ledger().await;

    let fill = open_position(&venue, "GBPUSD", Direction::Long, 0.05).await;
    let close = venue.close_position(fill.ticket).unwrap();

    let report = ReconciliationEngine::new(venue.clone(), ledger.clone(), config())
        .reconcile(Utc::now())
        .await
        .unwrap();
    assert_eq!(report.degraded_links, 0);

    let record = ledger.get_trade(close.ticket).await.unwrap().unwrap();
    assert_eq!(record.symbol, "GBPUSD");
    assert_eq!(record.side, TradeSide::Buy);
    assert_close(record.open_price, fill.price);
    assert_close(record.net_profit, close.profit + close.commission + close.swap);

    let summary = ledger.summary().await.unwrap();
    assert_eq!(summary.trade_count, 1);
}

#[tokio::test]
async fn test_offline_venue_leaves_ledger_unchanged() {
    let venue = paper_venue();
    let ledger = sqlite_ledger().await;
    venue.set_offline(true);

    let result = ReconciliationEngine::new(venue, ledger.clone(), config())
        .reconcile(Utc::now())
        .await;
    assert!(result.is_err());
    assert_eq!(ledger.trade_count().await.unwrap(), 0);
}
