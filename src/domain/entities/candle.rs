use crate::domain::errors::ValidationError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    pub fn new(
        time: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Result<Self, ValidationError> {
        for (name, value) in [("open", open), ("high", high), ("low", low), ("close", close)] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ValidationError::InvalidCandle(format!(
                    "{} must be positive and finite, got {}",
                    name, value
                )));
            }
        }
        if high < low || high < open.max(close) || low > open.min(close) {
            return Err(ValidationError::InvalidCandle(format!(
                "inconsistent range: o={} h={} l={} c={}",
                open, high, low, close
            )));
        }
        Ok(Candle {
            time,
            open,
            high,
            low,
            close,
            volume,
        })
    }

    /// High minus low of the bar.
    pub fn range(&self) -> f64 {
        self.high - self.low
    }
}

/// Bar width for candle requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Timeframe {
    M1,
    M5,
    M15,
    M30,
    H1,
    H4,
    D1,
}

impl Timeframe {
    pub fn minutes(self) -> i64 {
        match self {
            Timeframe::M1 => 1,
            Timeframe::M5 => 5,
            Timeframe::M15 => 15,
            Timeframe::M30 => 30,
            Timeframe::H1 => 60,
            Timeframe::H4 => 240,
            Timeframe::D1 => 1440,
        }
    }

    pub fn duration(self) -> chrono::Duration {
        chrono::Duration::minutes(self.minutes())
    }
}

impl FromStr for Timeframe {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "M1" => Ok(Timeframe::M1),
            "M5" => Ok(Timeframe::M5),
            "M15" => Ok(Timeframe::M15),
            "M30" => Ok(Timeframe::M30),
            "H1" => Ok(Timeframe::H1),
            "H4" => Ok(Timeframe::H4),
            "D1" => Ok(Timeframe::D1),
            other => Err(ValidationError::UnknownTimeframe(other.to_string())),
        }
    }
}
