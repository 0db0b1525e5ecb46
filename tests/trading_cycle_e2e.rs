//! Full trading cycles against the paper venue and a SQLite ledger

mod common;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{open_position, paper_venue, sqlite_ledger, trending_venue, OWNER};
use sentinel::application::actors::telemetry_actor::{TelemetryConfig, TelemetrySink};
use sentinel::application::services::trading_engine::{CycleError, TradingEngine};
use sentinel::config::TradingConfig;
use sentinel::domain::entities::account::AccountInfo;
use sentinel::domain::entities::direction::Direction;
use sentinel::domain::errors::OracleError;
use sentinel::domain::repositories::oracle::{FeatureVector, ModelProvider, Oracle};
use sentinel::domain::repositories::venue_client::VenueClient;
use sentinel::domain::services::order_executor::ExecutionReport;
use sentinel::domain::repositories::ledger_store::LedgerStore;
use sentinel::domain::services::position_mirror::PositionMirror;
use sentinel::domain::services::risk_gate::{RiskGate, RiskGateConfig, RiskRejection};
use sentinel::infrastructure::{NeutralModelProvider, PaperVenue};
use sentinel::persistence::SqliteLedger;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

fn config() -> TradingConfig {
    TradingConfig {
        owner_tag: OWNER,
        watched_symbols: vec!["EURUSD".to_string(), "GBPUSD".to_string()],
        ..TradingConfig::default()
    }
}

fn engine(venue: Arc<PaperVenue>, ledger: Arc<SqliteLedger>, sink: &TelemetrySink) -> TradingEngine {
    TradingEngine::new(
        venue,
        ledger,
        Arc::new(NeutralModelProvider),
        sink.handle(),
        config(),
    )
}

/// Every instrument gets a model with the same confident answer.
struct ConfidentModels(f64);

struct ConfidentOracle(f64);

#[async_trait]
impl Oracle for ConfidentOracle {
    async fn probability(&self, _features: &FeatureVector) -> Result<f64, OracleError> {
        Ok(self.0)
    }

    fn trained_at(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[async_trait]
impl ModelProvider for ConfidentModels {
    async fn load(&self, _symbol: &str) -> Result<Option<Arc<dyn Oracle>>, OracleError> {
        Ok(Some(Arc::new(ConfidentOracle(self.0))))
    }

    async fn train(&self, _symbol: &str) -> Result<Option<Arc<dyn Oracle>>, OracleError> {
        Ok(Some(Arc::new(ConfidentOracle(self.0))))
    }
}

fn trending_engine(
    venue: Arc<PaperVenue>,
    ledger: Arc<SqliteLedger>,
    sink: &TelemetrySink,
    max_open_positions: usize,
) -> TradingEngine {
    TradingEngine::new(
        venue,
        ledger,
        Arc::new(ConfidentModels(0.9)),
        sink.handle(),
        TradingConfig {
            max_open_positions,
            ..config()
        },
    )
}

#[tokio::test]
async fn test_fill_counts_toward_cap_within_cycle() {
    let venue = trending_venue();
    let ledger = sqlite_ledger().await;
    let sink = TelemetrySink::spawn(ledger.clone(), TelemetryConfig::default());

    let mut engine = trending_engine(venue.clone(), ledger.clone(), &sink, 1);
    let report = engine.run_cycle(Utc::now()).await.unwrap();

    assert_eq!(report.executions.len(), 1);
    assert!(matches!(
        &report.executions[0],
        ExecutionReport::Filled { symbol, direction: Direction::Long, .. } if symbol == "EURUSD"
    ));
    assert_eq!(report.evaluations[0].status, "BUY");
    assert_eq!(report.evaluations[0].probability, 0.9);
    assert!(report.evaluations[1].status.starts_with("BLOCKED:"));
    assert!(report.evaluations[1].status.contains("cap is 1"));
    assert_eq!(report.positions, 1);

    let open = venue.open_positions(Some(OWNER)).await.unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].symbol, "EURUSD");

    drop(engine);
    sink.shutdown(Duration::from_secs(5)).await;
}

#[tokio::test]
async fn test_instrument_with_open_position_is_blocked() {
    let venue = trending_venue();
    let ledger = sqlite_ledger().await;
    let sink = TelemetrySink::spawn(ledger.clone(), TelemetryConfig::default());
    open_position(&venue, "EURUSD", Direction::Long, 0.5).await;

    let mut engine = trending_engine(venue.clone(), ledger.clone(), &sink, 5);
    let report = engine.run_cycle(Utc::now()).await.unwrap();

    assert!(report.evaluations[0].status.starts_with("BLOCKED:"));
    assert!(report.evaluations[0].status.contains("EURUSD already has an open position"));
    assert_eq!(report.evaluations[1].status, "BUY");
    assert_eq!(venue.open_positions(Some(OWNER)).await.unwrap().len(), 2);

    drop(engine);
    sink.shutdown(Duration::from_secs(5)).await;
}

#[tokio::test]
async fn test_venue_rejection_is_reported_per_instrument() {
    let venue = trending_venue();
    let ledger = sqlite_ledger().await;
    let sink = TelemetrySink::spawn(ledger.clone(), TelemetryConfig::default());
    venue.set_trading_disabled(true);

    let mut engine = trending_engine(venue.clone(), ledger.clone(), &sink, 5);
    let report = engine.run_cycle(Utc::now()).await.unwrap();

    assert_eq!(report.executions.len(), 2);
    assert!(report.executions.iter().all(|e| !e.is_filled()));
    assert!(report
        .evaluations
        .iter()
        .all(|e| e.status.starts_with("REJECTED:")));
    assert!(venue.open_positions(None).await.unwrap().is_empty());

    drop(engine);
    sink.shutdown(Duration::from_secs(5)).await;
}

#[tokio::test]
async fn test_mirror_drops_externally_closed_position() {
    let venue = paper_venue();
    let ledger = sqlite_ledger().await;
    let mirror = PositionMirror::new(venue.clone(), ledger.clone(), OWNER);

    let mut fills = Vec::new();
    for symbol in ["EURUSD", "GBPUSD", "AUDUSD"] {
        fills.push(open_position(&venue, symbol, Direction::Long, 0.05).await);
    }
    mirror.refresh().await.unwrap();
    assert_eq!(ledger.open_positions().await.unwrap().len(), 3);

    venue.close_position(fills[1].ticket).unwrap();
    let refresh = mirror.refresh().await.unwrap();
    assert!(refresh.persisted);

    let mirrored: Vec<u64> = ledger
        .open_positions()
        .await
        .unwrap()
        .iter()
        .map(|p| p.ticket)
        .collect();
    assert_eq!(mirrored, vec![fills[0].ticket, fills[2].ticket]);
}

#[test]
fn test_risk_gate_rejects_thin_free_margin() {
    let gate = RiskGate::new(RiskGateConfig::default());
    let account = AccountInfo {
        balance: 1000.0,
        equity: 1000.0,
        free_margin: 40.0,
    };

    let assessment = gate.assess(&account, &[], "EURUSD");
    assert!(!assessment.is_approved());
    assert_eq!(
        assessment.rejections,
        vec![RiskRejection::InsufficientFreeMargin {
            free_margin: 40.0,
            required: 50.0,
        }]
    );
}

#[tokio::test]
async fn test_cycle_publishes_telemetry_and_reconciles() {
    let venue = paper_venue();
    let ledger = sqlite_ledger().await;
    let sink = TelemetrySink::spawn(ledger.clone(), TelemetryConfig::default());

    let mut engine = engine(venue, ledger.clone(), &sink);
    let report = engine.run_cycle(Utc::now()).await.unwrap();

    assert_eq!(report.evaluations.len(), 2);
    // Neutral oracle never clears the confidence floor
    assert!(report.executions.is_empty());
    assert!(report
        .evaluations
        .iter()
        .all(|e| e.status.starts_with("WAIT") && e.probability == 0.5));
    assert_eq!(report.reconciliation.unwrap().inserted, 1);

    drop(engine);
    sink.shutdown(Duration::from_secs(5)).await;

    let status = ledger.bot_status().await.unwrap().unwrap();
    assert!(status.is_active);
    assert_eq!(ledger.monitoring().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_cycle_fails_when_account_unavailable() {
    let venue = paper_venue();
    let ledger = sqlite_ledger().await;
    let sink = TelemetrySink::spawn(ledger.clone(), TelemetryConfig::default());
    venue.set_offline(true);

    let mut engine = engine(venue, ledger.clone(), &sink);
    let result = engine.run_cycle(Utc::now()).await;
    assert!(matches!(result, Err(CycleError::Account(_))));

    drop(engine);
    sink.shutdown(Duration::from_secs(5)).await;
    assert!(ledger.bot_status().await.unwrap().is_none());
}

#[tokio::test]
async fn test_run_loop_stops_on_shutdown_and_reports_inactive() {
    let venue = paper_venue();
    let ledger = sqlite_ledger().await;
    // One worker keeps the heartbeats in publication order
    let sink = TelemetrySink::spawn(
        ledger.clone(),
        TelemetryConfig {
            workers: 1,
            queue_capacity: 64,
        },
    );

    let engine = engine(venue, ledger.clone(), &sink);
    let stats = engine.stats();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(engine.run(shutdown_rx));

    // Let the first cycle finish
    for _ in 0..100 {
        if stats.read().await.cycles_completed > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("engine stops promptly")
        .unwrap();

    let stats = stats.read().await.clone();
    assert!(!stats.running);
    assert_eq!(stats.cycles_completed, 1);

    sink.shutdown(Duration::from_secs(5)).await;
    let status = ledger.bot_status().await.unwrap().unwrap();
    assert!(!status.is_active);
}

#[tokio::test]
async fn test_ledger_trait_object_accepts_sqlite() {
    let ledger: Arc<dyn LedgerStore> = sqlite_ledger().await;
    assert!(ledger.known_tickets(&[1, 2, 3]).await.unwrap().is_empty());
}
