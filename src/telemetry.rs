use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

use crate::error::ApiError;
use crate::metrics::build_payload;
use crate::types::GaugeMetric;

#[async_trait]
pub trait TelemetrySink: Send + Sync {
    async fn send_batch(&self, gauges: &[GaugeMetric]) -> Result<(), ApiError>;
}

/// New Relic Metric API client.
pub struct NewRelicClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl NewRelicClient {
    pub fn new(endpoint: &str, api_key: &str, timeout: Duration) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ApiError::transport("new relic"))?;
        Ok(Self {
            http,
            endpoint: endpoint.to_string(),
            api_key: api_key.to_string(),
        })
    }
}

#[async_trait]
impl TelemetrySink for NewRelicClient {
    async fn send_batch(&self, gauges: &[GaugeMetric]) -> Result<(), ApiError> {
        if gauges.is_empty() {
            return Ok(());
        }
        let payload = build_payload(gauges);
        let res = self
            .http
            .post(&self.endpoint)
            .header("Api-Key", &self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(ApiError::transport("new relic"))?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            debug!(%status, body = %body, "metric API rejected batch");
            return Err(ApiError::Status {
                service: "new relic",
                status,
                body,
            });
        }
        debug!(count = gauges.len(), %status, "metrics accepted");
        Ok(())
    }
}
