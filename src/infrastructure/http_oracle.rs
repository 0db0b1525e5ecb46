//! HTTP model service client
//!
//! Talks to an external model service that owns training and inference:
//! - `GET  {base}/models/{symbol}` returns model metadata, 404 when none exists
//! - `POST {base}/models/{symbol}/retrain` trains and returns the metadata
//! - `POST {base}/models/{symbol}/predict` with `{"features": [...]}` returns
//!   `{"probability": p}`

use crate::domain::errors::OracleError;
use crate::domain::repositories::oracle::{FeatureVector, ModelProvider, Oracle};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub symbol: String,
    pub trained_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct PredictRequest {
    features: Vec<f64>,
}

#[derive(Debug, Deserialize)]
struct PredictResponse {
    probability: f64,
}

pub struct HttpModelProvider {
    client: Client,
    base: Url,
}

impl HttpModelProvider {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, OracleError> {
        let base = Url::parse(base_url)
            .map_err(|e| OracleError::Unavailable(format!("Invalid oracle URL '{}': {}", base_url, e)))?;
        if base.cannot_be_a_base() {
            return Err(OracleError::Unavailable(format!("Oracle URL '{}' cannot be a base", base_url)));
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| OracleError::Unavailable(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client, base })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, OracleError> {
        let mut url = self.base.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| OracleError::Unavailable("Oracle URL cannot be a base".to_string()))?;
            path.pop_if_empty().extend(segments);
        }
        Ok(url)
    }

    fn oracle(&self, metadata: ModelMetadata) -> Result<Arc<dyn Oracle>, OracleError> {
        let predict_url = self.endpoint(&["models", &metadata.symbol, "predict"])?;
        Ok(Arc::new(HttpOracle {
            client: self.client.clone(),
            predict_url,
            trained_at: metadata.trained_at,
        }))
    }

    async fn metadata(response: reqwest::Response) -> Result<ModelMetadata, OracleError> {
        response
            .json::<ModelMetadata>()
            .await
            .map_err(|e| OracleError::MalformedResponse(format!("Failed to parse model metadata: {}", e)))
    }
}

fn status_error(context: &str, status: StatusCode, body: String) -> OracleError {
    OracleError::Unavailable(format!("{}: {} - {}", context, status, body))
}

#[async_trait]
impl ModelProvider for HttpModelProvider {
    async fn load(&self, symbol: &str) -> Result<Option<Arc<dyn Oracle>>, OracleError> {
        let url = self.endpoint(&["models", symbol])?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| OracleError::Unavailable(format!("Failed to load model: {}", e)))?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!(symbol = %symbol, "Model service has no model");
            return Ok(None);
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(status_error("Model lookup failed", status, body));
        }

        let metadata = Self::metadata(response).await?;
        self.oracle(metadata).map(Some)
    }

    async fn train(&self, symbol: &str) -> Result<Option<Arc<dyn Oracle>>, OracleError> {
        let url = self.endpoint(&["models", symbol, "retrain"])?;
        let response = self
            .client
            .post(url)
            .send()
            .await
            .map_err(|e| OracleError::Unavailable(format!("Failed to train model: {}", e)))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(status_error("Model training failed", status, body));
        }

        let metadata = Self::metadata(response).await?;
        self.oracle(metadata).map(Some)
    }
}

/// Remote model for one instrument
pub struct HttpOracle {
    client: Client,
    predict_url: Url,
    trained_at: DateTime<Utc>,
}

#[async_trait]
impl Oracle for HttpOracle {
    async fn probability(&self, features: &FeatureVector) -> Result<f64, OracleError> {
        let response = self
            .client
            .post(self.predict_url.clone())
            .json(&PredictRequest {
                features: features.to_vec(),
            })
            .send()
            .await
            .map_err(|e| OracleError::Unavailable(format!("Prediction request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(status_error("Prediction failed", status, body));
        }

        let prediction: PredictResponse = response
            .json()
            .await
            .map_err(|e| OracleError::MalformedResponse(format!("Failed to parse prediction: {}", e)))?;
        Ok(prediction.probability)
    }

    fn trained_at(&self) -> DateTime<Utc> {
        self.trained_at
    }
}

/// Provider used when no model service is configured. Every instrument
/// gets the neutral probability.
#[derive(Debug, Default, Clone, Copy)]
pub struct NeutralModelProvider;

#[async_trait]
impl ModelProvider for NeutralModelProvider {
    async fn load(&self, _symbol: &str) -> Result<Option<Arc<dyn Oracle>>, OracleError> {
        Ok(None)
    }

    async fn train(&self, _symbol: &str) -> Result<Option<Arc<dyn Oracle>>, OracleError> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Path;
    use axum::http::StatusCode as HttpStatus;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use chrono::TimeZone;

    fn trained_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap()
    }

    async fn model(Path(symbol): Path<String>) -> Result<Json<ModelMetadata>, HttpStatus> {
        if symbol == "EURUSD" {
            Ok(Json(ModelMetadata {
                symbol,
                trained_at: trained_at(),
            }))
        } else {
            Err(HttpStatus::NOT_FOUND)
        }
    }

    async fn retrain(Path(symbol): Path<String>) -> Json<ModelMetadata> {
        Json(ModelMetadata {
            symbol,
            trained_at: Utc::now(),
        })
    }

    async fn predict(Json(body): Json<serde_json::Value>) -> Json<serde_json::Value> {
        let momentum = body["features"][0].as_f64().unwrap_or(0.0);
        Json(serde_json::json!({ "probability": momentum / 100.0 }))
    }

    async fn serve() -> String {
        let app = Router::new()
            .route("/models/:symbol", get(model))
            .route("/models/:symbol/retrain", post(retrain))
            .route("/models/:symbol/predict", post(predict));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/", addr)
    }

    fn features() -> FeatureVector {
        FeatureVector {
            momentum: 80.0,
            trend: 1.1,
            fast_trend: 1.2,
            bar_range: 0.002,
        }
    }

    #[tokio::test]
    async fn test_load_predict_and_missing_model() {
        let base = serve().await;
        let provider = HttpModelProvider::new(&base, Duration::from_secs(5)).unwrap();

        let oracle = provider.load("EURUSD").await.unwrap().unwrap();
        assert_eq!(oracle.trained_at(), trained_at());
        let p = oracle.probability(&features()).await.unwrap();
        assert!((p - 0.8).abs() < 1e-9);

        assert!(provider.load("GBPUSD").await.unwrap().is_none());
        assert!(provider.train("GBPUSD").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_unreachable_service_is_unavailable() {
        let provider = HttpModelProvider::new("http://127.0.0.1:9/", Duration::from_millis(500)).unwrap();
        assert!(matches!(
            provider.load("EURUSD").await,
            Err(OracleError::Unavailable(_))
        ));
    }

    #[test]
    fn test_endpoint_segments() {
        let provider = HttpModelProvider::new("http://localhost:8000/api", Duration::from_secs(1)).unwrap();
        let url = provider.endpoint(&["models", "XAU/USD", "predict"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:8000/api/models/XAU%2FUSD/predict");
        assert!(HttpModelProvider::new("not a url", Duration::from_secs(1)).is_err());
    }

    #[tokio::test]
    async fn test_neutral_provider_has_no_models() {
        assert!(NeutralModelProvider.load("EURUSD").await.unwrap().is_none());
        assert!(NeutralModelProvider.train("EURUSD").await.unwrap().is_none());
    }
}
