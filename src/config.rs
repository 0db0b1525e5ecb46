use crate::application::actors::telemetry_actor::TelemetryConfig;
use crate::domain::entities::candle::Timeframe;
use crate::domain::services::oracle_registry::OracleRegistryConfig;
use crate::domain::services::order_executor::OrderExecutorConfig;
use crate::domain::services::protection::ProtectionConfig;
use crate::domain::services::reconciliation::{LedgerScope, ReconciliationConfig};
use crate::domain::services::risk_gate::RiskGateConfig;
use crate::domain::services::signal_gate::{FeatureConfig, SignalGateConfig};
use crate::domain::value_objects::lot_size::LotSizeTable;
use crate::task_runner::LoopConfig;
use std::fmt::Display;
use std::ops::RangeInclusive;
use std::str::FromStr;
use std::time::Duration;

/// Runtime configuration of the trading engine
#[derive(Debug, Clone)]
pub struct TradingConfig {
    // Ownership and instrument universe
    pub owner_tag: u64,
    pub watched_symbols: Vec<String>, // Empty = auto-select from the venue
    pub symbol_filters: Vec<String>,
    pub max_watched_symbols: usize,
    pub max_open_positions: usize,

    // Scheduling
    pub poll_interval_seconds: u64,
    pub failure_backoff_seconds: u64,

    // Signal features
    pub timeframe: Timeframe,
    pub signal_candles: usize,
    pub min_signal_candles: usize,
    pub rsi_period: usize,
    pub trend_ema_period: usize,
    pub fast_ema_period: usize,
    pub atr_period: usize,
    pub atr_average_window: usize,

    // Signal gate
    pub volatility_floor_ratio: f64, // ATR must exceed this fraction of its trailing average
    pub momentum_buy_threshold: f64,
    pub momentum_sell_threshold: f64,
    pub oracle_confidence_floor: f64,

    // Risk gate
    pub min_free_margin_ratio: f64, // Free margin / balance

    // Order execution
    pub atr_sl_multiple: f64,
    pub atr_tp_multiple: f64,
    pub high_notional_markers: Vec<String>,
    pub high_notional_volume: f64,
    pub default_volume: f64,

    // Stop protection
    pub protection_atr_period: usize,
    pub protection_candles: usize,
    pub breakeven_threshold_atr: f64,
    pub breakeven_buffer_atr: f64,
    pub trailing_distance_atr: f64,

    // Ledger reconciliation
    pub reconciliation_lookback_days: i64,
    pub ledger_scope: LedgerScope,

    // Telemetry
    pub telemetry_workers: usize,
    pub telemetry_queue_capacity: usize,

    // Oracle
    pub model_retrain_hours: i64,
    pub oracle_url: Option<String>,

    pub health_bind_addr: String,
}

impl Default for TradingConfig {
    fn default() -> Self {
        TradingConfig {
            owner_tag: 20260213,
            watched_symbols: Vec::new(),
            symbol_filters: vec!["USD".to_string(), "BTC".to_string(), "XAU".to_string()],
            max_watched_symbols: 15,
            max_open_positions: 5,

            poll_interval_seconds: 15,
            failure_backoff_seconds: 10,

            timeframe: Timeframe::H1,
            signal_candles: 300,
            min_signal_candles: 200,
            rsi_period: 14,
            trend_ema_period: 200,
            fast_ema_period: 50,
            atr_period: 14,
            atr_average_window: 20,

            volatility_floor_ratio: 0.8,
            momentum_buy_threshold: 45.0,
            momentum_sell_threshold: 55.0,
            oracle_confidence_floor: 0.72,

            min_free_margin_ratio: 0.05, // 5% of balance

            atr_sl_multiple: 3.0,
            atr_tp_multiple: 6.0,
            high_notional_markers: vec!["BTC".to_string(), "XAU".to_string(), "ETH".to_string()],
            high_notional_volume: 0.01,
            default_volume: 0.1,

            protection_atr_period: 14,
            protection_candles: 50,
            breakeven_threshold_atr: 1.0,
            breakeven_buffer_atr: 0.1,
            trailing_distance_atr: 1.5,

            reconciliation_lookback_days: 30,
            ledger_scope: LedgerScope::Owned,

            telemetry_workers: 2,
            telemetry_queue_capacity: 64,

            model_retrain_hours: 24,
            oracle_url: None,

            health_bind_addr: "127.0.0.1:3000".to_string(),
        }
    }
}

impl TradingConfig {
    /// Load configuration from environment variables
    ///
    /// Every variable is optional. Values that fail to parse or fall outside
    /// their accepted range are reported and the default is kept.
    pub fn from_env() -> TradingConfig {
        let mut config = TradingConfig::default();

        if let Ok(tag) = std::env::var("OWNER_TAG") {
            match tag.parse::<u64>() {
                Ok(value) if value > 0 => config.owner_tag = value,
                Ok(value) => {
                    tracing::warn!(
                        "Invalid OWNER_TAG value: {} (must be non-zero), using default: {}",
                        value, config.owner_tag
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        "Failed to parse OWNER_TAG '{}': {}, using default: {}",
                        tag, e, config.owner_tag
                    );
                }
            }
        }

        if let Ok(symbols) = std::env::var("WATCHED_SYMBOLS") {
            config.watched_symbols = parse_list(&symbols);
        }

        if let Ok(filters) = std::env::var("SYMBOL_FILTERS") {
            let filters = parse_list(&filters);
            if !filters.is_empty() {
                config.symbol_filters = filters;
            }
        }

        override_in_range("MAX_WATCHED_SYMBOLS", &mut config.max_watched_symbols, 1..=100);
        override_in_range("MAX_OPEN_POSITIONS", &mut config.max_open_positions, 1..=100);

        override_in_range("POLL_INTERVAL_SECONDS", &mut config.poll_interval_seconds, 5..=300);
        override_in_range("FAILURE_BACKOFF_SECONDS", &mut config.failure_backoff_seconds, 1..=600);

        if let Ok(timeframe) = std::env::var("TIMEFRAME") {
            match timeframe.parse::<Timeframe>() {
                Ok(value) => config.timeframe = value,
                Err(e) => {
                    tracing::warn!("{}, using default: {:?}", e, config.timeframe);
                }
            }
        }

        override_in_range("SIGNAL_CANDLES", &mut config.signal_candles, 10..=5000);
        override_in_range("MIN_SIGNAL_CANDLES", &mut config.min_signal_candles, 10..=5000);
        override_in_range("RSI_PERIOD", &mut config.rsi_period, 2..=200);
        override_in_range("TREND_EMA_PERIOD", &mut config.trend_ema_period, 2..=1000);
        override_in_range("FAST_EMA_PERIOD", &mut config.fast_ema_period, 2..=1000);
        override_in_range("ATR_PERIOD", &mut config.atr_period, 2..=200);
        override_in_range("ATR_AVERAGE_WINDOW", &mut config.atr_average_window, 1..=500);

        override_in_range("VOLATILITY_FLOOR_RATIO", &mut config.volatility_floor_ratio, 0.0..=2.0);
        override_in_range("MOMENTUM_BUY_THRESHOLD", &mut config.momentum_buy_threshold, 0.0..=100.0);
        override_in_range("MOMENTUM_SELL_THRESHOLD", &mut config.momentum_sell_threshold, 0.0..=100.0);
        override_in_range("ORACLE_CONFIDENCE_FLOOR", &mut config.oracle_confidence_floor, 0.5..=1.0);

        override_in_range("MIN_FREE_MARGIN_RATIO", &mut config.min_free_margin_ratio, 0.0..=1.0);

        override_in_range("ATR_SL_MULTIPLE", &mut config.atr_sl_multiple, 0.1..=50.0);
        override_in_range("ATR_TP_MULTIPLE", &mut config.atr_tp_multiple, 0.1..=100.0);
        if let Ok(markers) = std::env::var("HIGH_NOTIONAL_MARKERS") {
            config.high_notional_markers = parse_list(&markers);
        }
        override_in_range("HIGH_NOTIONAL_VOLUME", &mut config.high_notional_volume, 0.000001..=1000.0);
        override_in_range("DEFAULT_VOLUME", &mut config.default_volume, 0.000001..=1000.0);

        override_in_range("PROTECTION_ATR_PERIOD", &mut config.protection_atr_period, 2..=200);
        override_in_range("PROTECTION_CANDLES", &mut config.protection_candles, 3..=5000);
        override_in_range("BREAKEVEN_THRESHOLD_ATR", &mut config.breakeven_threshold_atr, 0.0..=50.0);
        override_in_range("BREAKEVEN_BUFFER_ATR", &mut config.breakeven_buffer_atr, 0.0..=10.0);
        override_in_range("TRAILING_DISTANCE_ATR", &mut config.trailing_distance_atr, 0.1..=50.0);

        override_in_range(
            "RECONCILIATION_LOOKBACK_DAYS",
            &mut config.reconciliation_lookback_days,
            1..=3650,
        );
        if let Ok(scope) = std::env::var("LEDGER_SCOPE") {
            match scope.parse::<LedgerScope>() {
                Ok(value) => config.ledger_scope = value,
                Err(e) => {
                    tracing::warn!("{}, using default: {:?}", e, config.ledger_scope);
                }
            }
        }

        override_in_range("TELEMETRY_WORKERS", &mut config.telemetry_workers, 1..=16);
        override_in_range("TELEMETRY_QUEUE_CAPACITY", &mut config.telemetry_queue_capacity, 1..=10_000);

        override_in_range("MODEL_RETRAIN_HOURS", &mut config.model_retrain_hours, 1..=24 * 365);
        config.oracle_url = std::env::var("ORACLE_URL")
            .ok()
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty());

        if let Ok(addr) = std::env::var("HEALTH_BIND_ADDR") {
            config.health_bind_addr = addr;
        }

        config.enforce_consistency();
        config
    }

    /// Repair combinations of values that are individually valid but
    /// contradict each other.
    fn enforce_consistency(&mut self) {
        if self.min_signal_candles > self.signal_candles {
            tracing::warn!(
                "MIN_SIGNAL_CANDLES ({}) exceeds SIGNAL_CANDLES ({}), clamping",
                self.min_signal_candles,
                self.signal_candles
            );
            self.min_signal_candles = self.signal_candles;
        }
        if self.momentum_buy_threshold > self.momentum_sell_threshold {
            tracing::warn!(
                "MOMENTUM_BUY_THRESHOLD ({}) above MOMENTUM_SELL_THRESHOLD ({}); \
                 neutral band is empty and both sides may trigger on the same reading",
                self.momentum_buy_threshold,
                self.momentum_sell_threshold
            );
        }
    }

    pub fn loop_config(&self) -> LoopConfig {
        LoopConfig {
            interval: Duration::from_secs(self.poll_interval_seconds),
            failure_backoff: Duration::from_secs(self.failure_backoff_seconds),
        }
    }

    pub fn feature_config(&self) -> FeatureConfig {
        FeatureConfig {
            timeframe: self.timeframe,
            candles: self.signal_candles,
            min_candles: self.min_signal_candles,
            rsi_period: self.rsi_period,
            trend_ema_period: self.trend_ema_period,
            fast_ema_period: self.fast_ema_period,
            atr_period: self.atr_period,
            atr_average_window: self.atr_average_window,
        }
    }

    pub fn signal_gate_config(&self) -> SignalGateConfig {
        SignalGateConfig {
            volatility_floor_ratio: self.volatility_floor_ratio,
            momentum_buy_threshold: self.momentum_buy_threshold,
            momentum_sell_threshold: self.momentum_sell_threshold,
            confidence_floor: self.oracle_confidence_floor,
        }
    }

    pub fn risk_gate_config(&self) -> RiskGateConfig {
        RiskGateConfig {
            min_free_margin_ratio: self.min_free_margin_ratio,
            max_open_positions: self.max_open_positions,
        }
    }

    pub fn order_executor_config(&self) -> OrderExecutorConfig {
        OrderExecutorConfig {
            owner_tag: self.owner_tag,
            atr_sl_multiple: self.atr_sl_multiple,
            atr_tp_multiple: self.atr_tp_multiple,
            lot_sizes: LotSizeTable::new(
                self.high_notional_markers.clone(),
                self.high_notional_volume,
                self.default_volume,
            ),
        }
    }

    pub fn protection_config(&self) -> ProtectionConfig {
        ProtectionConfig {
            owner_tag: self.owner_tag,
            timeframe: self.timeframe,
            atr_period: self.protection_atr_period,
            candles: self.protection_candles,
            breakeven_threshold_atr: self.breakeven_threshold_atr,
            breakeven_buffer_atr: self.breakeven_buffer_atr,
            trailing_distance_atr: self.trailing_distance_atr,
        }
    }

    pub fn reconciliation_config(&self) -> ReconciliationConfig {
        ReconciliationConfig {
            owner_tag: self.owner_tag,
            lookback: chrono::Duration::days(self.reconciliation_lookback_days),
            forward_allowance: chrono::Duration::days(1),
            scope: self.ledger_scope,
        }
    }

    pub fn telemetry_config(&self) -> TelemetryConfig {
        TelemetryConfig {
            workers: self.telemetry_workers,
            queue_capacity: self.telemetry_queue_capacity,
        }
    }

    pub fn oracle_registry_config(&self) -> OracleRegistryConfig {
        OracleRegistryConfig {
            retrain_after: chrono::Duration::hours(self.model_retrain_hours),
            capacity: self.max_watched_symbols.max(1),
            ..OracleRegistryConfig::default()
        }
    }
}

/// Split a comma separated list, dropping blanks.
pub fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_ascii_uppercase())
        .filter(|s| !s.is_empty())
        .collect()
}

fn override_in_range<T>(key: &str, target: &mut T, range: RangeInclusive<T>)
where
    T: FromStr + PartialOrd + Display + Copy,
    T::Err: Display,
{
    let Ok(raw) = std::env::var(key) else {
        return;
    };
    match raw.trim().parse::<T>() {
        Ok(value) if range.contains(&value) => *target = value,
        Ok(value) => {
            tracing::warn!(
                "Invalid {} value: {} (must be between {} and {}), using default: {}",
                key,
                value,
                range.start(),
                range.end(),
                target
            );
        }
        Err(e) => {
            tracing::warn!(
                "Failed to parse {} '{}': {}, using default: {}",
                key, raw, e, target
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TradingConfig::default();
        assert_eq!(config.owner_tag, 20260213);
        assert_eq!(config.max_open_positions, 5);
        assert_eq!(config.telemetry_workers, 2);
        assert_eq!(config.timeframe, Timeframe::H1);
        assert!((config.oracle_confidence_floor - 0.72).abs() < 1e-9);
        assert!(config.watched_symbols.is_empty());
    }

    #[test]
    fn test_parse_list() {
        assert_eq!(parse_list(" eurusd, BTCUSD ,,xauusd"), vec!["EURUSD", "BTCUSD", "XAUUSD"]);
        assert!(parse_list("").is_empty());
    }

    #[test]
    fn test_from_env_overrides_and_rejects() {
        std::env::set_var("TRAILING_DISTANCE_ATR", "2.5");
        std::env::set_var("TELEMETRY_WORKERS", "0"); // out of range
        std::env::set_var("MIN_FREE_MARGIN_RATIO", "abc"); // unparsable
        std::env::set_var("LEDGER_SCOPE", "account");

        let config = TradingConfig::from_env();
        assert!((config.trailing_distance_atr - 2.5).abs() < 1e-9);
        assert_eq!(config.telemetry_workers, 2);
        assert!((config.min_free_margin_ratio - 0.05).abs() < 1e-9);
        assert_eq!(config.ledger_scope, LedgerScope::Account);

        std::env::remove_var("TRAILING_DISTANCE_ATR");
        std::env::remove_var("TELEMETRY_WORKERS");
        std::env::remove_var("MIN_FREE_MARGIN_RATIO");
        std::env::remove_var("LEDGER_SCOPE");
    }

    #[test]
    fn test_component_configs_follow_fields() {
        let config = TradingConfig::default();
        assert_eq!(config.loop_config().interval, Duration::from_secs(15));
        assert_eq!(config.reconciliation_config().lookback, chrono::Duration::days(30));
        assert_eq!(config.order_executor_config().lot_sizes.volume_for("BTCUSD"), 0.01);
        assert_eq!(config.risk_gate_config().max_open_positions, 5);
    }
}
