use crate::domain::entities::candle::Candle;

pub trait Indicator {
    fn calculate(&self, candles: &[Candle]) -> Vec<f64>;

    /// Most recent value, if enough data exists.
    fn last(&self, candles: &[Candle]) -> Option<f64> {
        self.calculate(candles).last().copied()
    }
}

pub struct EMA {
    pub period: usize,
}

impl EMA {
    pub fn new(period: usize) -> Self {
        EMA { period }
    }

    pub fn calculate_on_values(&self, values: &[f64]) -> Vec<f64> {
        if self.period == 0 || values.len() < self.period {
            return vec![];
        }
        let multiplier = 2.0 / (self.period as f64 + 1.0);

        // First EMA is SMA
        let mut ema = values[..self.period].iter().sum::<f64>() / self.period as f64;
        let mut ema_values = Vec::with_capacity(values.len() - self.period + 1);
        ema_values.push(ema);

        for &val in values.iter().skip(self.period) {
            ema = (val - ema) * multiplier + ema;
            ema_values.push(ema);
        }

        ema_values
    }
}

impl Indicator for EMA {
    fn calculate(&self, candles: &[Candle]) -> Vec<f64> {
        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        self.calculate_on_values(&closes)
    }
}

/// Relative strength index with Wilder smoothing.
pub struct RSI {
    pub period: usize,
}

impl RSI {
    pub fn new(period: usize) -> Self {
        RSI { period }
    }
}

impl Indicator for RSI {
    fn calculate(&self, candles: &[Candle]) -> Vec<f64> {
        if self.period == 0 || candles.len() < self.period + 1 {
            return vec![];
        }
        let (gains, losses): (Vec<f64>, Vec<f64>) = candles
            .windows(2)
            .map(|w| {
                let change = w[1].close - w[0].close;
                (change.max(0.0), (-change).max(0.0))
            })
            .unzip();

        let period = self.period as f64;
        let mut avg_gain = gains[..self.period].iter().sum::<f64>() / period;
        let mut avg_loss = losses[..self.period].iter().sum::<f64>() / period;

        let mut rsi_values = Vec::with_capacity(gains.len() - self.period + 1);
        rsi_values.push(rsi_from_averages(avg_gain, avg_loss));

        for i in self.period..gains.len() {
            avg_gain = (avg_gain * (period - 1.0) + gains[i]) / period;
            avg_loss = (avg_loss * (period - 1.0) + losses[i]) / period;
            rsi_values.push(rsi_from_averages(avg_gain, avg_loss));
        }

        rsi_values
    }
}

fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        if avg_gain == 0.0 {
            50.0
        } else {
            100.0
        }
    } else {
        100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
    }
}

/// Average true range with Wilder smoothing.
pub struct ATR {
    pub period: usize,
}

impl ATR {
    pub fn new(period: usize) -> Self {
        ATR { period }
    }

    fn true_ranges(candles: &[Candle]) -> Vec<f64> {
        candles
            .windows(2)
            .map(|w| {
                let prev_close = w[0].close;
                let bar = &w[1];
                (bar.high - bar.low)
                    .max((bar.high - prev_close).abs())
                    .max((bar.low - prev_close).abs())
            })
            .collect()
    }
}

impl Indicator for ATR {
    fn calculate(&self, candles: &[Candle]) -> Vec<f64> {
        if self.period == 0 || candles.len() < self.period + 1 {
            return vec![];
        }
        let ranges = Self::true_ranges(candles);
        let period = self.period as f64;

        let mut atr = ranges[..self.period].iter().sum::<f64>() / period;
        let mut atr_values = Vec::with_capacity(ranges.len() - self.period + 1);
        atr_values.push(atr);

        for &tr in &ranges[self.period..] {
            atr = (atr * (period - 1.0) + tr) / period;
            atr_values.push(atr);
        }

        atr_values
    }
}

/// Mean of the last `window` values.
pub fn trailing_mean(values: &[f64], window: usize) -> Option<f64> {
    if window == 0 || values.len() < window {
        return None;
    }
    let tail = &values[values.len() - window..];
    Some(tail.iter().sum::<f64>() / window as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn create_test_candle(close: f64) -> Candle {
        Candle::new(Utc::now(), close, close + 1.0, close - 1.0, close, 100.0).unwrap()
    }

    fn candles_from_closes(closes: &[f64]) -> Vec<Candle> {
        closes.iter().map(|&c| create_test_candle(c)).collect()
    }

    #[test]
    fn test_ema_starts_from_sma() {
        let ema = EMA::new(3);
        let values = ema.calculate_on_values(&[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(values.len(), 2);
        assert!((values[0] - 2.0).abs() < 1e-9);
        // 2 + (4 - 2) * 0.5
        assert!((values[1] - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_ema_needs_full_period() {
        let ema = EMA::new(5);
        assert!(ema.calculate(&candles_from_closes(&[1.0, 2.0])).is_empty());
    }

    #[test]
    fn test_rsi_bounds() {
        let rising: Vec<f64> = (1..=30).map(|x| x as f64 + 100.0).collect();
        let rsi = RSI::new(14).last(&candles_from_closes(&rising)).unwrap();
        assert!((rsi - 100.0).abs() < 1e-9);

        let falling: Vec<f64> = (1..=30).map(|x| 200.0 - x as f64).collect();
        let rsi = RSI::new(14).last(&candles_from_closes(&falling)).unwrap();
        assert!(rsi.abs() < 1e-9);

        let flat = vec![100.0; 30];
        let rsi = RSI::new(14).last(&candles_from_closes(&flat)).unwrap();
        assert!((rsi - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_rsi_alternating_is_neutral() {
        let closes: Vec<f64> = (0..41).map(|i| if i % 2 == 0 { 100.0 } else { 101.0 }).collect();
        let rsi = RSI::new(14).last(&candles_from_closes(&closes)).unwrap();
        assert!(rsi > 40.0 && rsi < 60.0);
    }

    #[test]
    fn test_atr_constant_range() {
        // Every bar spans 2.0 and closes unchanged
        let candles = candles_from_closes(&[100.0; 20]);
        let values = ATR::new(14).calculate(&candles);
        assert_eq!(values.len(), 6);
        for v in values {
            assert!((v - 2.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_atr_includes_gaps() {
        let candles = vec![create_test_candle(100.0), create_test_candle(110.0)];
        // Gap from 100 to a bar with low 109 gives true range 11
        let atr = ATR::new(1).last(&candles).unwrap();
        assert!((atr - 11.0).abs() < 1e-9);
    }

    #[test]
    fn test_trailing_mean() {
        assert_eq!(trailing_mean(&[1.0, 2.0, 3.0, 4.0], 2), Some(3.5));
        assert_eq!(trailing_mean(&[1.0], 2), None);
    }
}
