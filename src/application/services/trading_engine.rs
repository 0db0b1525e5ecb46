//! Trading Engine
//!
//! The polling loop. One cycle runs its phases strictly in sequence:
//! account snapshot and heartbeat, position mirror, stop protection, signal
//! evaluation with order entry, then reconciliation. Only telemetry leaves
//! the loop, through the [`TelemetryHandle`].

use crate::application::actors::telemetry_actor::TelemetryHandle;
use crate::config::TradingConfig;
use crate::domain::entities::account::AccountInfo;
use crate::domain::entities::position::Position;
use crate::domain::entities::telemetry::{BotStatus, MonitoringSnapshot};
use crate::domain::errors::VenueError;
use crate::domain::repositories::ledger_store::LedgerStore;
use crate::domain::repositories::oracle::ModelProvider;
use crate::domain::repositories::venue_client::VenueClient;
use crate::domain::services::oracle_registry::{ModelStatus, OracleRegistry};
use crate::domain::services::order_executor::{ExecutionReport, OrderExecutor};
use crate::domain::services::position_mirror::PositionMirror;
use crate::domain::services::protection::{ProtectionManager, ProtectionReport};
use crate::domain::services::reconciliation::{ReconciliationEngine, ReconciliationReport};
use crate::domain::services::risk_gate::RiskGate;
use crate::domain::services::signal_gate::{FeatureConfig, FeatureSnapshot, SignalDecision, SignalGate};
use crate::task_runner::{sleep_or_shutdown, FailureTracker, LoopConfig};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{watch, RwLock};
use tracing::{debug, error, info, trace, warn, Level};

/// Failures that abort a whole cycle. Everything else is absorbed by the
/// phase where it happens.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CycleError {
    #[error("Account snapshot unavailable: {0}")]
    Account(VenueError),

    #[error("Open positions unavailable: {0}")]
    Positions(VenueError),

    #[error("Symbol list unavailable: {0}")]
    Symbols(VenueError),
}

/// Running statistics exposed by the health endpoint
#[derive(Debug, Clone, Default, Serialize)]
pub struct EngineStats {
    pub running: bool,
    pub cycles_completed: u64,
    pub cycles_failed: u64,
    pub consecutive_failures: u32,
    pub last_cycle_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub open_positions: usize,
    pub watched_symbols: Vec<String>,
    pub orders_filled: u64,
    pub orders_rejected: u64,
    pub stops_adjusted: u64,
    pub ledger_rows_inserted: u64,
    pub balance: Option<f64>,
    pub equity: Option<f64>,
}

/// Outcome for one watched instrument in one cycle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstrumentEvaluation {
    pub symbol: String,
    pub price: f64,
    pub momentum: f64,
    pub probability: f64,
    /// Decision label with the reason when nothing was entered
    pub status: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub account: AccountInfo,
    pub positions: usize,
    pub mirror_persisted: bool,
    pub protection: ProtectionReport,
    pub evaluations: Vec<InstrumentEvaluation>,
    pub executions: Vec<ExecutionReport>,
    /// Absent when the pass failed
    pub reconciliation: Option<ReconciliationReport>,
}

pub struct TradingEngine {
    venue: Arc<dyn VenueClient>,
    config: TradingConfig,
    loop_config: LoopConfig,
    feature_config: FeatureConfig,
    signal_gate: SignalGate,
    risk_gate: RiskGate,
    executor: OrderExecutor,
    protection: ProtectionManager,
    mirror: PositionMirror,
    reconciliation: ReconciliationEngine,
    oracles: OracleRegistry,
    telemetry: TelemetryHandle,
    watched: Vec<String>,
    last_account: Option<AccountInfo>,
    stats: Arc<RwLock<EngineStats>>,
}

impl TradingEngine {
    pub fn new(
        venue: Arc<dyn VenueClient>,
        ledger: Arc<dyn LedgerStore>,
        models: Arc<dyn ModelProvider>,
        telemetry: TelemetryHandle,
        config: TradingConfig,
    ) -> Self {
        Self {
            loop_config: config.loop_config(),
            feature_config: config.feature_config(),
            signal_gate: SignalGate::new(config.signal_gate_config()),
            risk_gate: RiskGate::new(config.risk_gate_config()),
            executor: OrderExecutor::new(venue.clone(), config.order_executor_config()),
            protection: ProtectionManager::new(venue.clone(), config.protection_config()),
            mirror: PositionMirror::new(venue.clone(), ledger.clone(), config.owner_tag),
            reconciliation: ReconciliationEngine::new(venue.clone(), ledger, config.reconciliation_config()),
            oracles: OracleRegistry::new(models, config.oracle_registry_config()),
            venue,
            telemetry,
            watched: Vec::new(),
            last_account: None,
            stats: Arc::new(RwLock::new(EngineStats::default())),
            config,
        }
    }

    /// Shared view of the running statistics
    pub fn stats(&self) -> Arc<RwLock<EngineStats>> {
        self.stats.clone()
    }

    pub fn watched_symbols(&self) -> &[String] {
        &self.watched
    }

    pub fn oracles(&self) -> &OracleRegistry {
        &self.oracles
    }

    /// Pick the instruments to watch and load their oracle models.
    pub async fn initialize(&mut self) -> Result<Vec<(String, ModelStatus)>, CycleError> {
        self.watched = self.select_symbols().await?;
        info!(
            count = self.watched.len(),
            "Watching symbols: {}",
            self.watched.join(", ")
        );

        let statuses = self.oracles.sync(&self.watched, Utc::now()).await;
        for (symbol, status) in &statuses {
            info!(symbol = %symbol, status = ?status, "Oracle ready");
        }
        self.stats.write().await.watched_symbols = self.watched.clone();
        Ok(statuses)
    }

    async fn select_symbols(&self) -> Result<Vec<String>, CycleError> {
        if !self.config.watched_symbols.is_empty() {
            return Ok(self.config.watched_symbols.clone());
        }

        let symbols = self.venue.symbols().await.map_err(CycleError::Symbols)?;
        let selected: Vec<String> = symbols
            .into_iter()
            .filter(|s| s.visible)
            .filter(|s| {
                self.config.symbol_filters.is_empty()
                    || self
                        .config
                        .symbol_filters
                        .iter()
                        .any(|filter| s.name.to_ascii_uppercase().contains(filter.as_str()))
            })
            .map(|s| s.name)
            .take(self.config.max_watched_symbols)
            .collect();

        if selected.is_empty() {
            warn!("No venue symbol matches filters {:?}", self.config.symbol_filters);
        }
        Ok(selected)
    }

    /// One full pass over every phase.
    pub async fn run_cycle(&mut self, now: DateTime<Utc>) -> Result<CycleReport, CycleError> {
        if self.watched.is_empty() {
            self.initialize().await?;
        } else {
            self.oracles.sync(&self.watched, now).await;
        }

        let account = self.venue.account_info().await.map_err(CycleError::Account)?;
        self.last_account = Some(account);
        self.telemetry.heartbeat(BotStatus {
            last_ping: now,
            is_active: true,
            balance: account.balance,
            equity: account.equity,
        });

        let refresh = self.mirror.refresh().await.map_err(CycleError::Positions)?;
        let mut positions = refresh.positions;

        let protection = self.protection.protect(&positions).await;

        let mut evaluations = Vec::with_capacity(self.watched.len());
        let mut executions = Vec::new();
        for symbol in self.watched.clone() {
            if let Some(evaluation) = self
                .evaluate_instrument(&symbol, &account, &mut positions, &mut executions, now)
                .await
            {
                self.telemetry.monitoring(MonitoringSnapshot {
                    symbol: evaluation.symbol.clone(),
                    price: evaluation.price,
                    indicator_value: evaluation.momentum,
                    oracle_probability: evaluation.probability,
                    decision_status: evaluation.status.clone(),
                    updated_at: now,
                });
                evaluations.push(evaluation);
            }
        }

        let reconciliation = match self.reconciliation.reconcile(now).await {
            Ok(report) => Some(report),
            Err(e) => {
                error!("Reconciliation pass aborted: {}", e);
                None
            }
        };

        Ok(CycleReport {
            started_at: now,
            account,
            positions: positions.len(),
            mirror_persisted: refresh.persisted,
            protection,
            evaluations,
            executions,
            reconciliation,
        })
    }

    /// Signal, risk and execution for one instrument. `None` when there is
    /// not enough market data to decide.
    async fn evaluate_instrument(
        &mut self,
        symbol: &str,
        account: &AccountInfo,
        positions: &mut Vec<Position>,
        executions: &mut Vec<ExecutionReport>,
        now: DateTime<Utc>,
    ) -> Option<InstrumentEvaluation> {
        let candles = match self
            .venue
            .candles(symbol, self.feature_config.timeframe, self.feature_config.candles)
            .await
        {
            Ok(candles) => candles,
            Err(e) => {
                warn!(symbol = %symbol, "Failed to fetch candles: {}", e);
                return None;
            }
        };

        let Some(snapshot) = FeatureSnapshot::compute(&candles, &self.feature_config) else {
            debug!(
                symbol = %symbol,
                bars = candles.len(),
                "Not enough history for indicators"
            );
            return None;
        };

        let probability = self.oracles.probability(symbol, &snapshot.features()).await;
        let decision = self.signal_gate.evaluate(&snapshot, probability);

        let status = match &decision {
            SignalDecision::Wait(reason) => {
                debug!(symbol = %symbol, "WAIT: {}", reason);
                format!("WAIT: {}", reason)
            }
            SignalDecision::Enter(direction) => {
                let assessment = self.risk_gate.assess(account, positions, symbol);
                if !assessment.is_approved() {
                    let reasons: Vec<String> = assessment.rejections.iter().map(|r| r.to_string()).collect();
                    info!(
                        symbol = %symbol,
                        direction = %direction,
                        "Entry blocked by risk gate: {}",
                        reasons.join("; ")
                    );
                    format!("BLOCKED: {}", reasons.join("; "))
                } else {
                    let report = self.executor.execute(symbol, *direction, snapshot.atr).await;
                    let status = match &report {
                        ExecutionReport::Filled {
                            ticket,
                            volume,
                            price,
                            stop_price,
                            target_price,
                            ..
                        } => {
                            // Counts toward the caps for the rest of the cycle
                            positions.push(Position {
                                ticket: *ticket,
                                symbol: symbol.to_string(),
                                direction: *direction,
                                volume: *volume,
                                entry_price: *price,
                                current_price: *price,
                                stop_price: Some(*stop_price),
                                target_price: Some(*target_price),
                                opened_at: now,
                                unrealized_profit: 0.0,
                                owner_tag: self.config.owner_tag,
                            });
                            decision.label().to_string()
                        }
                        ExecutionReport::Rejected { reason, .. } => format!("REJECTED: {}", reason),
                    };
                    executions.push(report);
                    status
                }
            }
        };

        Some(InstrumentEvaluation {
            symbol: symbol.to_string(),
            price: snapshot.close,
            momentum: snapshot.momentum,
            probability,
            status,
        })
    }

    async fn record_success(&self, report: &CycleReport, tracker: &FailureTracker) {
        let mut stats = self.stats.write().await;
        stats.cycles_completed += 1;
        stats.consecutive_failures = tracker.consecutive_failures();
        stats.last_cycle_at = Some(report.started_at);
        stats.open_positions = report.positions;
        stats.watched_symbols = self.watched.clone();
        stats.orders_filled += report.executions.iter().filter(|e| e.is_filled()).count() as u64;
        stats.orders_rejected += report.executions.iter().filter(|e| !e.is_filled()).count() as u64;
        stats.stops_adjusted += report.protection.adjusted as u64;
        if let Some(reconciliation) = &report.reconciliation {
            stats.ledger_rows_inserted += reconciliation.inserted as u64;
        }
        stats.balance = Some(report.account.balance);
        stats.equity = Some(report.account.equity);
    }

    async fn record_failure(&self, e: &CycleError, tracker: &FailureTracker) {
        let mut stats = self.stats.write().await;
        stats.cycles_failed += 1;
        stats.consecutive_failures = tracker.consecutive_failures();
        stats.last_error = Some(e.to_string());
    }

    /// Heartbeat with the last known account figures, zero if none yet.
    fn publish_inactive(&self, now: DateTime<Utc>) {
        let (balance, equity) = self
            .last_account
            .map(|a| (a.balance, a.equity))
            .unwrap_or((0.0, 0.0));
        self.telemetry.heartbeat(BotStatus {
            last_ping: now,
            is_active: false,
            balance,
            equity,
        });
    }

    /// Run cycles until `shutdown` flips. A cycle in progress always finishes.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval = ?self.loop_config.interval,
            backoff = ?self.loop_config.failure_backoff,
            owner_tag = self.config.owner_tag,
            "Trading engine started"
        );
        self.stats.write().await.running = true;

        if let Err(e) = self.initialize().await {
            warn!("Initial symbol selection failed, retrying next cycle: {}", e);
        }

        let mut tracker = FailureTracker::new();
        loop {
            let now = Utc::now();
            match self.run_cycle(now).await {
                Ok(report) => {
                    let recovered_from = tracker.record_success();
                    if recovered_from > 0 {
                        info!("Trading cycle recovered after {} failures", recovered_from);
                    }
                    debug!(
                        positions = report.positions,
                        evaluated = report.evaluations.len(),
                        orders = report.executions.len(),
                        stops_adjusted = report.protection.adjusted,
                        "Cycle complete"
                    );
                    if tracing::enabled!(Level::TRACE) {
                        match serde_json::to_string(&report) {
                            Ok(json) => trace!(report = %json, "Cycle report"),
                            Err(e) => warn!("Failed to serialize cycle report: {}", e),
                        }
                    }
                    self.record_success(&report, &tracker).await;
                }
                Err(e) => {
                    tracker.record_failure();
                    warn!(
                        consecutive = tracker.consecutive_failures(),
                        "Trading cycle failed: {}", e
                    );
                    self.publish_inactive(now);
                    self.record_failure(&e, &tracker).await;
                }
            }

            if sleep_or_shutdown(tracker.next_delay(&self.loop_config), &mut shutdown).await {
                break;
            }
        }

        self.publish_inactive(Utc::now());
        self.stats.write().await.running = false;
        info!(
            total_failures = tracker.total_failures(),
            "Trading engine stopped"
        );
    }
}
