//! Per-instrument oracle model registry
//!
//! Owns the lifecycle of the predictive models: load on first use, retrain
//! once a model is older than `retrain_after`, evict instruments that are no
//! longer watched. The registry is handed to the engine explicitly; there is
//! no process-wide model cache.

use crate::domain::repositories::oracle::{FeatureVector, ModelProvider, Oracle, NEUTRAL_PROBABILITY};
use chrono::{DateTime, Duration, Utc};
use lru::LruCache;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct OracleRegistryConfig {
    /// Models older than this are retrained
    pub retrain_after: Duration,
    /// Upper bound on models held in memory
    pub capacity: usize,
    /// Wait before asking again for a model that could not be obtained
    pub retry_unavailable_after: Duration,
}

impl Default for OracleRegistryConfig {
    fn default() -> Self {
        Self {
            retrain_after: Duration::hours(24),
            capacity: 15,
            retry_unavailable_after: Duration::hours(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ModelStatus {
    /// Trained for the first time
    New,
    /// Existing model loaded or still fresh
    Loaded,
    Retrained,
    /// No model; the instrument gets the neutral probability
    Unavailable,
}

pub struct OracleRegistry {
    provider: Arc<dyn ModelProvider>,
    config: OracleRegistryConfig,
    models: LruCache<String, Arc<dyn Oracle>>,
    unavailable_since: HashMap<String, DateTime<Utc>>,
    /// Failed retrains of models that are still held
    retrain_failed_at: HashMap<String, DateTime<Utc>>,
}

impl OracleRegistry {
    pub fn new(provider: Arc<dyn ModelProvider>, config: OracleRegistryConfig) -> Self {
        let capacity = NonZeroUsize::new(config.capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            provider,
            config,
            models: LruCache::new(capacity),
            unavailable_since: HashMap::new(),
            retrain_failed_at: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.models.contains(symbol)
    }

    /// Bring the registry in line with `symbols`: evict the rest, load or
    /// retrain what is missing or stale.
    pub async fn sync(&mut self, symbols: &[String], now: DateTime<Utc>) -> Vec<(String, ModelStatus)> {
        let wanted: HashSet<&str> = symbols.iter().map(String::as_str).collect();
        let stale: Vec<String> = self
            .models
            .iter()
            .map(|(symbol, _)| symbol.clone())
            .filter(|symbol| !wanted.contains(symbol.as_str()))
            .collect();
        for symbol in stale {
            self.evict(&symbol);
        }
        self.unavailable_since.retain(|symbol, _| wanted.contains(symbol.as_str()));
        self.retrain_failed_at.retain(|symbol, _| wanted.contains(symbol.as_str()));

        let mut statuses = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            let status = self.prepare(symbol, now).await;
            statuses.push((symbol.clone(), status));
        }
        statuses
    }

    /// Make sure a current model for `symbol` is held.
    pub async fn prepare(&mut self, symbol: &str, now: DateTime<Utc>) -> ModelStatus {
        if let Some(model) = self.models.peek(symbol) {
            if now - model.trained_at() < self.config.retrain_after {
                return ModelStatus::Loaded;
            }
            if let Some(failed_at) = self.retrain_failed_at.get(symbol) {
                if now - *failed_at < self.config.retry_unavailable_after {
                    return ModelStatus::Loaded;
                }
            }
            return self.train(symbol, ModelStatus::Retrained, now).await;
        }

        if let Some(since) = self.unavailable_since.get(symbol) {
            if now - *since < self.config.retry_unavailable_after {
                return ModelStatus::Unavailable;
            }
        }

        match self.provider.load(symbol).await {
            Ok(Some(model)) => {
                let fresh = now - model.trained_at() < self.config.retrain_after;
                self.store(symbol, model);
                if fresh {
                    info!(symbol = %symbol, "Oracle model loaded");
                    ModelStatus::Loaded
                } else {
                    self.train(symbol, ModelStatus::Retrained, now).await
                }
            }
            Ok(None) => self.train(symbol, ModelStatus::New, now).await,
            Err(e) => {
                warn!(symbol = %symbol, "Failed to load oracle model: {}", e);
                self.unavailable_since.insert(symbol.to_string(), now);
                ModelStatus::Unavailable
            }
        }
    }

    async fn train(&mut self, symbol: &str, success: ModelStatus, now: DateTime<Utc>) -> ModelStatus {
        match self.provider.train(symbol).await {
            Ok(Some(model)) => {
                info!(symbol = %symbol, status = ?success, "Oracle model trained");
                self.store(symbol, model);
                success
            }
            Ok(None) => {
                debug!(symbol = %symbol, "No oracle model available");
                self.mark_unavailable(symbol, now)
            }
            Err(e) => {
                warn!(symbol = %symbol, "Oracle training failed: {}", e);
                self.mark_unavailable(symbol, now)
            }
        }
    }

    fn mark_unavailable(&mut self, symbol: &str, now: DateTime<Utc>) -> ModelStatus {
        // A stale model still beats the neutral answer
        if self.models.contains(symbol) {
            self.retrain_failed_at.insert(symbol.to_string(), now);
            return ModelStatus::Loaded;
        }
        self.unavailable_since.insert(symbol.to_string(), now);
        ModelStatus::Unavailable
    }

    fn store(&mut self, symbol: &str, model: Arc<dyn Oracle>) {
        self.unavailable_since.remove(symbol);
        self.retrain_failed_at.remove(symbol);
        if let Some((evicted, _)) = self.models.push(symbol.to_string(), model) {
            if evicted != symbol {
                debug!(symbol = %evicted, "Oracle model evicted for capacity");
            }
        }
    }

    pub fn evict(&mut self, symbol: &str) -> bool {
        self.unavailable_since.remove(symbol);
        self.retrain_failed_at.remove(symbol);
        let removed = self.models.pop(symbol).is_some();
        if removed {
            debug!(symbol = %symbol, "Oracle model evicted");
        }
        removed
    }

    /// Probability of an upward move for `symbol`, neutral when unknown.
    pub async fn probability(&mut self, symbol: &str, features: &FeatureVector) -> f64 {
        let Some(model) = self.models.get(symbol).cloned() else {
            return NEUTRAL_PROBABILITY;
        };
        match model.probability(features).await {
            Ok(p) if p.is_finite() => p.clamp(0.0, 1.0),
            Ok(p) => {
                warn!(symbol = %symbol, "Oracle returned non-finite probability {}", p);
                NEUTRAL_PROBABILITY
            }
            Err(e) => {
                warn!(symbol = %symbol, "Oracle query failed: {}", e);
                NEUTRAL_PROBABILITY
            }
        }
    }
}
