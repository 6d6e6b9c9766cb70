//! HTTP client for posting session records to the collection endpoint.

use crate::config::Config;
use crate::core::session::SessionRecord;
use crate::transport::{SessionTransport, SubmitReceipt, TransportError};
use std::time::Duration;

/// Gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Full URL the session record is posted to
    pub endpoint_url: String,
    /// Per-request timeout
    pub timeout: Duration,
}

impl GatewayConfig {
    /// Create a new gateway configuration.
    pub fn new(endpoint_url: impl Into<String>) -> Self {
        Self {
            endpoint_url: endpoint_url.into(),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build from the main configuration.
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.endpoint_url.clone()).with_timeout(config.request_timeout)
    }
}

/// Posts session records as JSON.
#[derive(Debug, Clone)]
pub struct GatewayClient {
    config: GatewayConfig,
    client: reqwest::Client,
}

impl GatewayClient {
    /// Create a new gateway client.
    pub fn new(config: GatewayConfig) -> Result<Self, TransportError> {
        if config.endpoint_url.trim().is_empty() {
            return Err(TransportError::Config("endpoint URL is empty".to_string()));
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| TransportError::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    pub fn endpoint_url(&self) -> &str {
        &self.config.endpoint_url
    }
}

impl SessionTransport for GatewayClient {
    async fn submit(&self, record: SessionRecord) -> Result<SubmitReceipt, TransportError> {
        let response = self
            .client
            .post(&self.config.endpoint_url)
            .header("Content-Type", "application/json")
            .json(&record)
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(TransportError::Server {
                status: status.as_u16(),
                message,
            });
        }

        // The endpoint's answer is informational only.
        let body = response.json::<serde_json::Value>().await.ok();

        Ok(SubmitReceipt {
            status: status.as_u16(),
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_config_from_config() {
        let mut config = Config::default();
        config.endpoint_url = "https://collect.example/track".to_string();
        config.request_timeout = Duration::from_secs(3);

        let gateway = GatewayConfig::from_config(&config);
        assert_eq!(gateway.endpoint_url, "https://collect.example/track");
        assert_eq!(gateway.timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_empty_endpoint_rejected() {
        assert!(matches!(
            GatewayClient::new(GatewayConfig::new("  ")),
            Err(TransportError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_network_error() {
        // port 9 (discard) is closed on test machines
        let client = GatewayClient::new(
            GatewayConfig::new("http://127.0.0.1:9/track").with_timeout(Duration::from_secs(2)),
        )
        .unwrap();
        let result = client.submit(SessionRecord::with_session_id("s-1")).await;
        assert!(matches!(result, Err(TransportError::Network(_))));
    }
}
