//! Signal Gate
//!
//! Turns the market features of one instrument plus the oracle's probability
//! into BUY, SELL or WAIT. Every WAIT carries the first condition that failed,
//! so monitoring can show why nothing happened.

use crate::domain::entities::candle::{Candle, Timeframe};
use crate::domain::entities::direction::Direction;
use crate::domain::repositories::oracle::FeatureVector;
use crate::domain::services::indicators::{trailing_mean, Indicator, ATR, EMA, RSI};
use serde::{Deserialize, Serialize};

/// Indicator periods used to build a [`FeatureSnapshot`].
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureConfig {
    pub timeframe: Timeframe,
    /// Bars requested from the venue
    pub candles: usize,
    /// Fewer bars than this and the instrument is skipped
    pub min_candles: usize,
    pub rsi_period: usize,
    pub trend_ema_period: usize,
    pub fast_ema_period: usize,
    pub atr_period: usize,
    pub atr_average_window: usize,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            timeframe: Timeframe::H1,
            candles: 300,
            min_candles: 200,
            rsi_period: 14,
            trend_ema_period: 200,
            fast_ema_period: 50,
            atr_period: 14,
            atr_average_window: 20,
        }
    }
}

/// Indicator values at the last closed bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSnapshot {
    pub close: f64,
    pub momentum: f64,
    pub trend: f64,
    pub fast_trend: f64,
    pub bar_range: f64,
    pub atr: f64,
    pub atr_average: f64,
}

impl FeatureSnapshot {
    /// `None` when the series is too short for any of the indicators.
    pub fn compute(candles: &[Candle], config: &FeatureConfig) -> Option<Self> {
        if candles.len() < config.min_candles {
            return None;
        }
        let last = candles.last()?;
        let atr_series = ATR::new(config.atr_period).calculate(candles);

        Some(FeatureSnapshot {
            close: last.close,
            momentum: RSI::new(config.rsi_period).last(candles)?,
            trend: EMA::new(config.trend_ema_period).last(candles)?,
            fast_trend: EMA::new(config.fast_ema_period).last(candles)?,
            bar_range: last.range(),
            atr: *atr_series.last()?,
            atr_average: trailing_mean(&atr_series, config.atr_average_window)?,
        })
    }

    pub fn features(&self) -> FeatureVector {
        FeatureVector {
            momentum: self.momentum,
            trend: self.trend,
            fast_trend: self.fast_trend,
            bar_range: self.bar_range,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SignalGateConfig {
    /// Current ATR must exceed this fraction of its trailing average
    pub volatility_floor_ratio: f64,
    /// Momentum must be above this to buy
    pub momentum_buy_threshold: f64,
    /// Momentum must be below this to sell
    pub momentum_sell_threshold: f64,
    /// Oracle probability above this to buy, below `1 - floor` to sell
    pub confidence_floor: f64,
}

impl Default for SignalGateConfig {
    fn default() -> Self {
        Self {
            volatility_floor_ratio: 0.8,
            momentum_buy_threshold: 45.0,
            momentum_sell_threshold: 55.0,
            confidence_floor: 0.72,
        }
    }
}

/// Why the gate held back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WaitReason {
    MarketNotAlive { atr: f64, floor: f64 },
    NoTrendBias,
    WeakMomentum { direction: Direction, momentum: f64, threshold: f64 },
    LowConfidence { direction: Direction, probability: f64, required: f64 },
}

impl std::fmt::Display for WaitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WaitReason::MarketNotAlive { atr, floor } => {
                write!(f, "market not alive: atr {:.5} <= floor {:.5}", atr, floor)
            }
            WaitReason::NoTrendBias => write!(f, "no trend bias: price on trend line"),
            WaitReason::WeakMomentum {
                direction,
                momentum,
                threshold,
            } => write!(
                f,
                "weak momentum for {}: {:.1} vs threshold {:.1}",
                direction, momentum, threshold
            ),
            WaitReason::LowConfidence {
                direction,
                probability,
                required,
            } => write!(
                f,
                "low confidence for {}: p={:.3} vs required {:.3}",
                direction, probability, required
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SignalDecision {
    Enter(Direction),
    Wait(WaitReason),
}

impl SignalDecision {
    /// Short label stored in monitoring rows.
    pub fn label(&self) -> &'static str {
        match self {
            SignalDecision::Enter(direction) => direction.as_str(),
            SignalDecision::Wait(_) => "WAIT",
        }
    }
}

pub struct SignalGate {
    config: SignalGateConfig,
}

impl SignalGate {
    pub fn new(config: SignalGateConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SignalGateConfig {
        &self.config
    }

    pub fn evaluate(&self, snapshot: &FeatureSnapshot, probability: f64) -> SignalDecision {
        let floor = snapshot.atr_average * self.config.volatility_floor_ratio;
        if !(snapshot.atr > floor) {
            return SignalDecision::Wait(WaitReason::MarketNotAlive {
                atr: snapshot.atr,
                floor,
            });
        }

        let direction = if snapshot.close > snapshot.trend {
            Direction::Long
        } else if snapshot.close < snapshot.trend {
            Direction::Short
        } else {
            return SignalDecision::Wait(WaitReason::NoTrendBias);
        };

        let (momentum_ok, threshold) = match direction {
            Direction::Long => (
                snapshot.momentum > self.config.momentum_buy_threshold,
                self.config.momentum_buy_threshold,
            ),
            Direction::Short => (
                snapshot.momentum < self.config.momentum_sell_threshold,
                self.config.momentum_sell_threshold,
            ),
        };
        if !momentum_ok {
            return SignalDecision::Wait(WaitReason::WeakMomentum {
                direction,
                momentum: snapshot.momentum,
                threshold,
            });
        }

        let (confident, required) = match direction {
            Direction::Long => (
                probability > self.config.confidence_floor,
                self.config.confidence_floor,
            ),
            Direction::Short => (
                probability < 1.0 - self.config.confidence_floor,
                1.0 - self.config.confidence_floor,
            ),
        };
        if !confident {
            return SignalDecision::Wait(WaitReason::LowConfidence {
                direction,
                probability,
                required,
            });
        }

        SignalDecision::Enter(direction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn snapshot(close: f64, trend: f64, momentum: f64, atr: f64, atr_average: f64) -> FeatureSnapshot {
        FeatureSnapshot {
            close,
            momentum,
            trend,
            fast_trend: trend,
            bar_range: 1.0,
            atr,
            atr_average,
        }
    }

    fn gate() -> SignalGate {
        SignalGate::new(SignalGateConfig::default())
    }

    #[test]
    fn test_quiet_market_waits_first() {
        // Would otherwise be a perfect buy
        let decision = gate().evaluate(&snapshot(110.0, 100.0, 70.0, 0.7, 1.0), 0.95);
        assert!(matches!(decision, SignalDecision::Wait(WaitReason::MarketNotAlive { .. })));
    }

    #[test]
    fn test_buy_when_all_conditions_hold() {
        let decision = gate().evaluate(&snapshot(110.0, 100.0, 60.0, 1.0, 1.0), 0.80);
        assert_eq!(decision, SignalDecision::Enter(Direction::Long));
        assert_eq!(decision.label(), "BUY");
    }

    #[test]
    fn test_sell_uses_complementary_floor() {
        let decision = gate().evaluate(&snapshot(90.0, 100.0, 40.0, 1.0, 1.0), 0.20);
        assert_eq!(decision, SignalDecision::Enter(Direction::Short));

        // 0.30 is not below 1 - 0.72
        let decision = gate().evaluate(&snapshot(90.0, 100.0, 40.0, 1.0, 1.0), 0.30);
        match decision {
            SignalDecision::Wait(WaitReason::LowConfidence { direction, required, .. }) => {
                assert_eq!(direction, Direction::Short);
                assert!((required - 0.28).abs() < 1e-9);
            }
            other => panic!("unexpected decision {:?}", other),
        }
    }

    #[test]
    fn test_weak_momentum_reported_before_confidence() {
        let decision = gate().evaluate(&snapshot(110.0, 100.0, 40.0, 1.0, 1.0), 0.10);
        assert!(matches!(
            decision,
            SignalDecision::Wait(WaitReason::WeakMomentum { direction: Direction::Long, .. })
        ));
    }

    #[test]
    fn test_neutral_oracle_never_enters() {
        let buy_setup = gate().evaluate(&snapshot(110.0, 100.0, 60.0, 1.0, 1.0), 0.5);
        let sell_setup = gate().evaluate(&snapshot(90.0, 100.0, 40.0, 1.0, 1.0), 0.5);
        assert_eq!(buy_setup.label(), "WAIT");
        assert_eq!(sell_setup.label(), "WAIT");
    }

    #[test]
    fn test_price_on_trend_line_has_no_bias() {
        let decision = gate().evaluate(&snapshot(100.0, 100.0, 60.0, 1.0, 1.0), 0.9);
        assert_eq!(decision, SignalDecision::Wait(WaitReason::NoTrendBias));
    }

    #[test]
    fn test_snapshot_requires_min_candles() {
        let start = Utc::now() - Duration::hours(300);
        let candles: Vec<Candle> = (0..250)
            .map(|i| {
                let close = 100.0 + (i as f64 * 0.3).sin();
                Candle::new(start + Duration::hours(i), close, close + 0.5, close - 0.5, close, 1.0).unwrap()
            })
            .collect();

        let config = FeatureConfig::default();
        assert!(FeatureSnapshot::compute(&candles[..150], &config).is_none());

        let snapshot = FeatureSnapshot::compute(&candles, &config).unwrap();
        assert!(snapshot.atr > 0.0);
        assert!(snapshot.momentum >= 0.0 && snapshot.momentum <= 100.0);
        assert!((snapshot.bar_range - 1.0).abs() < 1e-9);
        assert_eq!(snapshot.features().to_vec().len(), 4);
    }
}
