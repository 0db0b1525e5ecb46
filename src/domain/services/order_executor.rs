//! OrderExecutor service - turns an entry decision into a venue order

use crate::domain::entities::account::SymbolInfo;
use crate::domain::entities::direction::Direction;
use crate::domain::entities::order::OrderRequest;
use crate::domain::errors::{ValidationError, VenueError};
use crate::domain::repositories::venue_client::VenueClient;
use crate::domain::value_objects::fill_mode::FillMode;
use crate::domain::value_objects::lot_size::LotSizeTable;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Order execution configuration
#[derive(Debug, Clone)]
pub struct OrderExecutorConfig {
    pub owner_tag: u64,
    /// Stop distance in ATRs
    pub atr_sl_multiple: f64,
    /// Target distance in ATRs
    pub atr_tp_multiple: f64,
    pub lot_sizes: LotSizeTable,
}

impl Default for OrderExecutorConfig {
    fn default() -> Self {
        Self {
            owner_tag: 20260213,
            atr_sl_multiple: 3.0,
            atr_tp_multiple: 6.0,
            lot_sizes: LotSizeTable::default(),
        }
    }
}

/// Structured result of one execution attempt
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ExecutionReport {
    Filled {
        symbol: String,
        direction: Direction,
        ticket: u64,
        volume: f64,
        price: f64,
        stop_price: f64,
        target_price: f64,
        fill_mode: FillMode,
    },
    Rejected {
        symbol: String,
        direction: Direction,
        /// Venue reason code, absent for local or transport failures
        code: Option<u32>,
        reason: String,
    },
}

impl ExecutionReport {
    pub fn is_filled(&self) -> bool {
        matches!(self, ExecutionReport::Filled { .. })
    }

    pub fn ticket(&self) -> Option<u64> {
        match self {
            ExecutionReport::Filled { ticket, .. } => Some(*ticket),
            ExecutionReport::Rejected { .. } => None,
        }
    }
}

/// Order executor for market entries with ATR-based stop and target
pub struct OrderExecutor {
    venue: Arc<dyn VenueClient>,
    config: OrderExecutorConfig,
}

impl OrderExecutor {
    pub fn new(venue: Arc<dyn VenueClient>, config: OrderExecutorConfig) -> Self {
        Self { venue, config }
    }

    /// Build the order for `direction` from the instrument's current quote.
    pub fn plan(&self, symbol: &SymbolInfo, direction: Direction, atr: f64) -> Result<OrderRequest, ValidationError> {
        if !atr.is_finite() || atr <= 0.0 {
            return Err(ValidationError::InvalidPrice(format!("atr must be positive, got {}", atr)));
        }
        let entry = match direction {
            Direction::Long => symbol.quote.ask,
            Direction::Short => symbol.quote.bid,
        };
        let stop = direction.offset(entry, -atr * self.config.atr_sl_multiple);
        let target = direction.offset(entry, atr * self.config.atr_tp_multiple);

        let request = OrderRequest::new(
            symbol.name.clone(),
            direction,
            self.config.lot_sizes.volume_for(&symbol.name),
            entry,
            round_to_digits(stop, symbol.digits),
            round_to_digits(target, symbol.digits),
            FillMode::negotiate(symbol.filling_modes),
            self.config.owner_tag,
        )?;
        Ok(request.with_comment(format!("sentinel {}", direction)))
    }

    /// Place a market entry. Never fails: every outcome is a report.
    pub async fn execute(&self, symbol: &str, direction: Direction, atr: f64) -> ExecutionReport {
        let report = match self.try_execute(symbol, direction, atr).await {
            Ok(report) => report,
            Err(err) => ExecutionReport::Rejected {
                symbol: symbol.to_string(),
                direction,
                code: err.reason_code(),
                reason: err.to_string(),
            },
        };
        log_report(&report);
        report
    }

    async fn try_execute(&self, symbol: &str, direction: Direction, atr: f64) -> Result<ExecutionReport, VenueError> {
        let info = self.venue.symbol_info(symbol).await?;
        let mut request = self
            .plan(&info, direction, atr)
            .map_err(|e| VenueError::InvalidRequest(e.to_string()))?;

        let mut candidates = FillMode::candidates(info.filling_modes).into_iter().peekable();
        let fill = loop {
            let Some(mode) = candidates.next() else {
                return Err(VenueError::InvalidRequest("no filling mode left to try".to_string()));
            };
            request.fill_mode = mode;
            match self.venue.submit_order(&request).await {
                Ok(fill) => break fill,
                Err(e) if e.is_unsupported_filling() && candidates.peek().is_some() => {
                    debug!(symbol = %symbol, fill_mode = %mode, "Filling mode refused, trying next");
                }
                Err(e) => return Err(e),
            }
        };

        Ok(ExecutionReport::Filled {
            symbol: request.symbol,
            direction,
            ticket: fill.ticket,
            volume: fill.volume,
            price: fill.price,
            stop_price: request.stop_price,
            target_price: request.target_price,
            fill_mode: request.fill_mode,
        })
    }
}

fn log_report(report: &ExecutionReport) {
    match report {
        ExecutionReport::Filled {
            symbol,
            direction,
            ticket,
            volume,
            price,
            stop_price,
            target_price,
            fill_mode,
        } => info!(
            symbol = %symbol,
            direction = %direction,
            ticket,
            volume,
            price,
            stop_price,
            target_price,
            fill_mode = %fill_mode,
            "Entry filled"
        ),
        ExecutionReport::Rejected {
            symbol,
            direction,
            code,
            reason,
        } => warn!(
            symbol = %symbol,
            direction = %direction,
            code = ?code,
            reason = %reason,
            "Entry rejected"
        ),
    }
}

/// Round `value` to the instrument's quote precision.
pub fn round_to_digits(value: f64, digits: u32) -> f64 {
    let factor = 10f64.powi(digits as i32);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::account::Quote;
    use crate::domain::value_objects::fill_mode::{FILLING_FOK, FILLING_IOC};
    use crate::infrastructure::paper_venue::{PaperSymbol, PaperVenue, PaperVenueConfig};

    fn symbol_info(name: &str, bid: f64, ask: f64, modes: u32) -> SymbolInfo {
        SymbolInfo {
            name: name.to_string(),
            visible: true,
            filling_modes: modes,
            quote: Quote { bid, ask },
            digits: 5,
        }
    }

    fn executor_with(venue: Arc<dyn VenueClient>) -> OrderExecutor {
        OrderExecutor::new(venue, OrderExecutorConfig::default())
    }

    #[test]
    fn test_long_plan_uses_ask_and_mirrored_distances() {
        let executor = executor_with(Arc::new(PaperVenue::new(PaperVenueConfig::default())));
        let request = executor
            .plan(&symbol_info("EURUSD", 1.1000, 1.1002, FILLING_FOK), Direction::Long, 0.0010)
            .unwrap();

        assert_eq!(request.price, 1.1002);
        assert!((request.stop_price - 1.0972).abs() < 1e-9);
        assert!((request.target_price - 1.1062).abs() < 1e-9);
        assert_eq!(request.volume, 0.1);
        assert_eq!(request.fill_mode, FillMode::FillOrKill);
        assert_eq!(request.owner_tag, 20260213);
    }

    #[test]
    fn test_short_plan_uses_bid() {
        let executor = executor_with(Arc::new(PaperVenue::new(PaperVenueConfig::default())));
        let request = executor
            .plan(&symbol_info("XAUUSD", 2350.0, 2350.3, FILLING_IOC), Direction::Short, 2.0)
            .unwrap();

        assert_eq!(request.price, 2350.0);
        assert!((request.stop_price - 2356.0).abs() < 1e-9);
        assert!((request.target_price - 2338.0).abs() < 1e-9);
        assert_eq!(request.volume, 0.01);
        assert_eq!(request.fill_mode, FillMode::ImmediateOrCancel);
    }

    #[test]
    fn test_plan_rejects_non_positive_atr() {
        let executor = executor_with(Arc::new(PaperVenue::new(PaperVenueConfig::default())));
        assert!(executor
            .plan(&symbol_info("EURUSD", 1.1, 1.1002, 0), Direction::Long, 0.0)
            .is_err());
    }

    #[tokio::test]
    async fn test_execute_fills_on_paper_venue() {
        let venue = Arc::new(PaperVenue::new(PaperVenueConfig::single(PaperSymbol::new("EURUSD", 1.1000, 0.0002))));
        let executor = executor_with(venue.clone());

        let report = executor.execute("EURUSD", Direction::Long, 0.001).await;
        assert!(report.is_filled());

        let positions = venue.open_positions(Some(20260213)).await.unwrap();
        assert_eq!(positions.len(), 1);
        assert_eq!(Some(positions[0].ticket), report.ticket());
    }

    #[tokio::test]
    async fn test_execute_reports_unknown_symbol_instead_of_failing() {
        let venue = Arc::new(PaperVenue::new(PaperVenueConfig::default()));
        let executor = executor_with(venue);

        let report = executor.execute("NOPE", Direction::Short, 0.001).await;
        match report {
            ExecutionReport::Rejected { code, reason, .. } => {
                assert_eq!(code, None);
                assert!(reason.contains("NOPE"));
            }
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_execute_reports_venue_reason_code() {
        let venue = Arc::new(PaperVenue::new(PaperVenueConfig::single(PaperSymbol::new("EURUSD", 1.1000, 0.0002))));
        venue.set_trading_disabled(true);
        let executor = executor_with(venue);

        let report = executor.execute("EURUSD", Direction::Long, 0.001).await;
        assert!(matches!(report, ExecutionReport::Rejected { code: Some(_), .. }));
    }

    #[tokio::test]
    async fn test_execute_falls_back_to_next_filling_mode() {
        // Advertises FOK and IOC, only takes IOC
        let venue = Arc::new(PaperVenue::new(PaperVenueConfig::single(
            PaperSymbol::new("EURUSD", 1.1000, 0.0002)
                .with_filling_modes(FILLING_FOK | FILLING_IOC)
                .with_accepted_filling_modes(FILLING_IOC),
        )));
        let executor = executor_with(venue.clone());

        let report = executor.execute("EURUSD", Direction::Long, 0.001).await;
        match report {
            ExecutionReport::Filled { fill_mode, .. } => assert_eq!(fill_mode, FillMode::ImmediateOrCancel),
            other => panic!("expected fill, got {:?}", other),
        }
        assert_eq!(venue.open_positions(None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_other_rejections_are_not_retried() {
        let venue = Arc::new(PaperVenue::new(PaperVenueConfig::single(
            PaperSymbol::new("EURUSD", 1.1000, 0.0002).with_accepted_filling_modes(FILLING_IOC),
        )));
        venue.set_trading_disabled(true);
        let executor = executor_with(venue.clone());

        let report = executor.execute("EURUSD", Direction::Long, 0.001).await;
        assert!(matches!(report, ExecutionReport::Rejected { code: Some(10017), .. }));
        assert!(venue.open_positions(None).await.unwrap().is_empty());
    }

    #[test]
    fn test_round_to_digits() {
        assert_eq!(round_to_digits(1.234567, 3), 1.235);
        assert_eq!(round_to_digits(2350.456, 0), 2350.0);
    }
}
