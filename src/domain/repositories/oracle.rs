use crate::domain::errors::OracleError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Probability reported when no usable model answer exists.
pub const NEUTRAL_PROBABILITY: f64 = 0.5;

/// Inputs handed to a per-instrument model, computed on the last closed bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub momentum: f64,
    pub trend: f64,
    pub fast_trend: f64,
    pub bar_range: f64,
}

impl FeatureVector {
    pub fn to_vec(&self) -> Vec<f64> {
        vec![self.momentum, self.trend, self.fast_trend, self.bar_range]
    }
}

/// A trained model for one instrument.
#[async_trait]
pub trait Oracle: Send + Sync {
    /// Probability in [0,1] of a favorable upward move.
    async fn probability(&self, features: &FeatureVector) -> Result<f64, OracleError>;

    /// When the model was last trained.
    fn trained_at(&self) -> DateTime<Utc>;
}

/// Source of per-instrument models.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Existing model for `symbol`, `None` if none was ever trained.
    async fn load(&self, symbol: &str) -> Result<Option<Arc<dyn Oracle>>, OracleError>;

    /// Train (or retrain) the model for `symbol`.
    async fn train(&self, symbol: &str) -> Result<Option<Arc<dyn Oracle>>, OracleError>;
}
