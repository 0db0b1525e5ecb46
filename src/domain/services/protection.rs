//! Stop protection for open positions
//!
//! Each owned position moves through three phases:
//!
//! - `Entered`: the stop is still the one set at entry.
//! - `BreakevenArmed`: price moved `breakeven_threshold_atr` ATRs in favor,
//!   so the stop was pulled to entry plus a small buffer.
//! - `Trailing`: the stop follows price at `trailing_distance_atr` ATRs.
//!
//! A stop only ever moves in the position's favor. Candidates are compared
//! through [`Direction`] so longs and shorts share one set of formulas.

use crate::domain::entities::candle::Timeframe;
use crate::domain::entities::direction::Direction;
use crate::domain::entities::position::Position;
use crate::domain::repositories::venue_client::VenueClient;
use crate::domain::services::indicators::{Indicator, ATR};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct ProtectionConfig {
    pub owner_tag: u64,
    pub timeframe: Timeframe,
    /// ATR window used for stop distances
    pub atr_period: usize,
    /// Bars requested to compute the ATR
    pub candles: usize,
    /// Favorable excursion, in ATRs, that arms breakeven
    pub breakeven_threshold_atr: f64,
    /// Profit locked in when moving to breakeven, in ATRs
    pub breakeven_buffer_atr: f64,
    /// Distance of the trailing stop from price, in ATRs
    pub trailing_distance_atr: f64,
}

impl Default for ProtectionConfig {
    fn default() -> Self {
        Self {
            owner_tag: 20260213,
            timeframe: Timeframe::H1,
            atr_period: 14,
            candles: 50,
            breakeven_threshold_atr: 1.0,
            breakeven_buffer_atr: 0.1,
            trailing_distance_atr: 1.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ProtectionPhase {
    Entered,
    BreakevenArmed,
    Trailing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AdjustmentReason {
    Breakeven,
    Trailing,
}

impl AdjustmentReason {
    fn phase(self) -> ProtectionPhase {
        match self {
            AdjustmentReason::Breakeven => ProtectionPhase::BreakevenArmed,
            AdjustmentReason::Trailing => ProtectionPhase::Trailing,
        }
    }
}

/// A stop move the venue should apply.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StopAdjustment {
    pub ticket: u64,
    pub symbol: String,
    pub direction: Direction,
    pub previous_stop: Option<f64>,
    pub new_stop: f64,
    /// Carried through unchanged
    pub target: Option<f64>,
    pub reason: AdjustmentReason,
}

/// Counters of one protection pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProtectionReport {
    pub evaluated: usize,
    pub adjusted: usize,
    pub rejected: usize,
    /// Positions without a usable ATR this cycle
    pub skipped: usize,
}

pub struct ProtectionManager {
    venue: Arc<dyn VenueClient>,
    config: ProtectionConfig,
    phases: HashMap<u64, ProtectionPhase>,
}

impl ProtectionManager {
    pub fn new(venue: Arc<dyn VenueClient>, config: ProtectionConfig) -> Self {
        Self {
            venue,
            config,
            phases: HashMap::new(),
        }
    }

    pub fn phase(&self, ticket: u64) -> ProtectionPhase {
        self.phases
            .get(&ticket)
            .copied()
            .unwrap_or(ProtectionPhase::Entered)
    }

    /// Compute the stop move for `position` given the current ATR, if any.
    ///
    /// The result is always strictly more favorable than the position's
    /// current stop and stays on the protective side of the current price.
    pub fn plan_adjustment(&self, position: &Position, atr: f64) -> Option<StopAdjustment> {
        if !atr.is_finite() || atr <= 0.0 {
            return None;
        }
        let direction = position.direction;
        let mut best: Option<(f64, AdjustmentReason)> = None;

        let mut consider = |candidate: f64, reason: AdjustmentReason| {
            if !candidate.is_finite() {
                return;
            }
            // Stop must remain behind the market
            if direction.favorable_distance(candidate, position.current_price) <= 0.0 {
                return;
            }
            if let Some(existing) = position.stop_price {
                if !direction.is_improvement(existing, candidate) {
                    return;
                }
            }
            match best {
                Some((current_best, _)) if !direction.is_improvement(current_best, candidate) => {}
                _ => best = Some((candidate, reason)),
            }
        };

        if position.favorable_excursion() > self.config.breakeven_threshold_atr * atr
            && !position.stop_locks_entry()
        {
            consider(
                direction.offset(position.entry_price, self.config.breakeven_buffer_atr * atr),
                AdjustmentReason::Breakeven,
            );
        }

        consider(
            direction.offset(position.current_price, -self.config.trailing_distance_atr * atr),
            AdjustmentReason::Trailing,
        );

        best.map(|(new_stop, reason)| StopAdjustment {
            ticket: position.ticket,
            symbol: position.symbol.clone(),
            direction,
            previous_stop: position.stop_price,
            new_stop,
            target: position.target_price,
            reason,
        })
    }

    /// Ratchet stops on every owned position.
    ///
    /// Venue rejections are logged and the position is retried next cycle.
    pub async fn protect(&mut self, positions: &[Position]) -> ProtectionReport {
        let mut report = ProtectionReport::default();
        let mut atr_cache: HashMap<String, Option<f64>> = HashMap::new();

        let open: HashSet<u64> = positions.iter().map(|p| p.ticket).collect();
        self.phases.retain(|ticket, _| open.contains(ticket));

        for position in positions.iter().filter(|p| p.is_owned_by(self.config.owner_tag)) {
            report.evaluated += 1;

            let atr = match atr_cache.get(&position.symbol) {
                Some(cached) => *cached,
                None => {
                    let atr = self.current_atr(&position.symbol).await;
                    atr_cache.insert(position.symbol.clone(), atr);
                    atr
                }
            };
            let Some(atr) = atr else {
                report.skipped += 1;
                continue;
            };

            let Some(adjustment) = self.plan_adjustment(position, atr) else {
                debug!(ticket = position.ticket, symbol = %position.symbol, "Stop unchanged");
                continue;
            };

            match self
                .venue
                .modify_protection(adjustment.ticket, adjustment.new_stop, adjustment.target)
                .await
            {
                Ok(()) => {
                    report.adjusted += 1;
                    self.phases.insert(adjustment.ticket, adjustment.reason.phase());
                    info!(
                        ticket = adjustment.ticket,
                        symbol = %adjustment.symbol,
                        direction = %adjustment.direction,
                        previous_stop = ?adjustment.previous_stop,
                        new_stop = adjustment.new_stop,
                        reason = ?adjustment.reason,
                        "Stop tightened"
                    );
                }
                Err(e) => {
                    report.rejected += 1;
                    warn!(
                        ticket = adjustment.ticket,
                        symbol = %adjustment.symbol,
                        code = ?e.reason_code(),
                        "Stop modification failed: {}",
                        e
                    );
                }
            }
        }

        report
    }

    async fn current_atr(&self, symbol: &str) -> Option<f64> {
        match self
            .venue
            .candles(symbol, self.config.timeframe, self.config.candles)
            .await
        {
            Ok(candles) => ATR::new(self.config.atr_period)
                .last(&candles)
                .filter(|atr| atr.is_finite() && *atr > 0.0),
            Err(e) => {
                warn!(symbol = %symbol, "Failed to fetch candles for protection: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::paper_venue::{PaperSymbol, PaperVenue, PaperVenueConfig};
    use chrono::Utc;

    fn manager() -> ProtectionManager {
        ProtectionManager::new(
            Arc::new(PaperVenue::new(PaperVenueConfig::default())),
            ProtectionConfig::default(),
        )
    }

    fn position(direction: Direction, entry: f64, current: f64, stop: Option<f64>) -> Position {
        Position {
            ticket: 9,
            symbol: "EURUSD".to_string(),
            direction,
            volume: 0.1,
            entry_price: entry,
            current_price: current,
            stop_price: stop,
            target_price: Some(direction.offset(entry, 6.0)),
            opened_at: Utc::now(),
            unrealized_profit: 0.0,
            owner_tag: 20260213,
        }
    }

    #[test]
    fn test_breakeven_for_long() {
        // Excursion 1.2 ATR: breakeven at 100.1 beats trail at 99.7
        let adj = manager()
            .plan_adjustment(&position(Direction::Long, 100.0, 101.2, Some(97.0)), 1.0)
            .unwrap();
        assert_eq!(adj.reason, AdjustmentReason::Breakeven);
        assert!((adj.new_stop - 100.1).abs() < 1e-9);
        assert_eq!(adj.target, Some(106.0));
    }

    #[test]
    fn test_breakeven_for_short_is_mirrored() {
        let adj = manager()
            .plan_adjustment(&position(Direction::Short, 100.0, 98.8, Some(103.0)), 1.0)
            .unwrap();
        assert_eq!(adj.reason, AdjustmentReason::Breakeven);
        assert!((adj.new_stop - 99.9).abs() < 1e-9);
    }

    #[test]
    fn test_trailing_wins_once_far_enough() {
        let adj = manager()
            .plan_adjustment(&position(Direction::Long, 100.0, 104.0, Some(100.1)), 1.0)
            .unwrap();
        assert_eq!(adj.reason, AdjustmentReason::Trailing);
        assert!((adj.new_stop - 102.5).abs() < 1e-9);
    }

    #[test]
    fn test_never_loosens() {
        // Trail candidate 101.5 is worse than the existing 102.0
        let m = manager();
        assert!(m
            .plan_adjustment(&position(Direction::Long, 100.0, 103.0, Some(102.0)), 1.0)
            .is_none());
        assert!(m
            .plan_adjustment(&position(Direction::Short, 100.0, 97.0, Some(98.0)), 1.0)
            .is_none());
    }

    #[test]
    fn test_breakeven_not_repeated_once_stop_past_entry() {
        // Stop already at 100.05; only trailing may act and 99.9 is worse
        let m = manager();
        assert!(m
            .plan_adjustment(&position(Direction::Long, 100.0, 101.4, Some(100.05)), 1.0)
            .is_none());
    }

    #[test]
    fn test_invalid_atr_yields_nothing() {
        let m = manager();
        let p = position(Direction::Long, 100.0, 105.0, Some(97.0));
        assert!(m.plan_adjustment(&p, 0.0).is_none());
        assert!(m.plan_adjustment(&p, f64::NAN).is_none());
    }

    #[test]
    fn test_position_without_stop_gets_one() {
        let adj = manager()
            .plan_adjustment(&position(Direction::Short, 100.0, 100.0, None), 1.0)
            .unwrap();
        assert!((adj.new_stop - 101.5).abs() < 1e-9);
        assert_eq!(adj.previous_stop, None);
    }

    #[tokio::test]
    async fn test_protect_applies_stop_at_venue() {
        let venue = Arc::new(PaperVenue::new(PaperVenueConfig::single(
            PaperSymbol::new("EURUSD", 1.1000, 0.0002).with_volatility(0.0005),
        )));
        let executor = crate::domain::services::order_executor::OrderExecutor::new(
            venue.clone(),
            crate::domain::services::order_executor::OrderExecutorConfig::default(),
        );
        let report = executor.execute("EURUSD", Direction::Long, 0.0100).await;
        let ticket = report.ticket().unwrap();

        let mut manager = ProtectionManager::new(venue.clone(), ProtectionConfig::default());
        let positions = venue.open_positions(Some(20260213)).await.unwrap();
        let before = positions[0].stop_price.unwrap();

        let result = manager.protect(&positions).await;
        assert_eq!(result.evaluated, 1);
        assert_eq!(result.adjusted, 1);

        let after = venue.open_positions(Some(20260213)).await.unwrap()[0]
            .stop_price
            .unwrap();
        assert!(after > before);
        assert_eq!(manager.phase(ticket), ProtectionPhase::Trailing);

        // Closed tickets are forgotten
        venue.close_position(ticket).unwrap();
        manager.protect(&[]).await;
        assert_eq!(manager.phase(ticket), ProtectionPhase::Entered);
    }

    #[tokio::test]
    async fn test_protect_skips_foreign_positions() {
        let mut manager = manager();
        let mut foreign = position(Direction::Long, 100.0, 105.0, Some(97.0));
        foreign.owner_tag = 1;
        let report = manager.protect(&[foreign]).await;
        assert_eq!(report, ProtectionReport::default());
    }
}
