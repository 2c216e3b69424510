//! Client for the imagegen relay server.

use crate::accounting::BudgetStatus;
use crate::error::{sanitize_error_message, ImageGenError, Result};
use crate::image::provider::{BudgetSource, ImageProvider};
use crate::image::types::{GenerationRequest, GenerationResult};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::{Duration, Instant};
use super::DEFAULT_TIMEOUT;

const DEFAULT_BASE_URL: &str = "http://localhost:5000";

/// Builder for [`RelayClient`].
#[derive(Debug, Clone, Default)]
pub struct RelayClientBuilder {
    base_url: Option<String>,
    timeout: Option<Duration>,
}

impl RelayClientBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the relay URL. Falls back to `IMAGEGEN_API_URL`, then
    /// `http://localhost:5000`.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Sets the per-call timeout. Default 60 seconds.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Builds the client.
    pub fn build(self) -> Result<RelayClient> {
        let base_url = self
            .base_url
            .or_else(|| std::env::var("IMAGEGEN_API_URL").ok())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let base_url = base_url.trim_end_matches('/').to_string();
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ImageGenError::Config(format!(
                "relay URL must start with http:// or https://, got '{}'",
                base_url
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(self.timeout.unwrap_or(DEFAULT_TIMEOUT))
            .build()?;

        Ok(RelayClient { client, base_url })
    }
}

/// Talks to the relay's `/api/generate` and `/api/cost-status` endpoints.
#[derive(Clone)]
pub struct RelayClient {
    client: reqwest::Client,
    base_url: String,
}

impl RelayClient {
    /// Creates a new `RelayClientBuilder`.
    pub fn builder() -> RelayClientBuilder {
        RelayClientBuilder::new()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn map_send_error(e: reqwest::Error, start: Instant) -> ImageGenError {
        if e.is_timeout() {
            ImageGenError::Timeout(start.elapsed())
        } else {
            ImageGenError::Network(e)
        }
    }

    fn parse_error(status: u16, body: &str) -> ImageGenError {
        let envelope = serde_json::from_str::<RelayEnvelope>(body).ok();
        let (error, cost_status) = match envelope {
            Some(envelope) => (envelope.error, envelope.cost_status),
            None => (None, None),
        };
        let message = error.unwrap_or_else(|| sanitize_error_message(body));
        match status {
            400 => ImageGenError::InvalidRequest(message),
            402 => ImageGenError::BudgetExhausted {
                message,
                status: cost_status,
            },
            _ => ImageGenError::Api { status, message },
        }
    }
}

#[derive(Debug, Deserialize)]
struct RelayEnvelope {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Option<GenerationResult>,
    #[serde(default)]
    error: Option<String>,
    /// Sent alongside a 402 refusal.
    #[serde(default)]
    cost_status: Option<BudgetStatus>,
}

#[async_trait]
impl ImageProvider for RelayClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResult> {
        let start = Instant::now();
        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(request)
            .send()
            .await
            .map_err(|e| Self::map_send_error(e, start))?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(Self::parse_error(status.as_u16(), &body));
        }

        let envelope: RelayEnvelope = serde_json::from_str(&body)?;
        match envelope {
            RelayEnvelope {
                success: true,
                data: Some(result),
                ..
            } => Ok(result),
            RelayEnvelope { error, .. } => Err(ImageGenError::UnexpectedResponse(
                error.unwrap_or_else(|| "relay returned no image".into()),
            )),
        }
    }

    fn name(&self) -> &str {
        "imagegen relay"
    }
}

#[async_trait]
impl BudgetSource for RelayClient {
    async fn fetch_budget_status(&self) -> Result<BudgetStatus> {
        let start = Instant::now();
        let response = self
            .client
            .get(format!("{}/api/cost-status", self.base_url))
            .send()
            .await
            .map_err(|e| Self::map_send_error(e, start))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::parse_error(status.as_u16(), &body));
        }
        Ok(response.json().await?)
    }
}
