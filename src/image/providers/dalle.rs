//! DALL-E 3 provider, hosted by OpenAI or by Azure OpenAI.

use crate::accounting::cost_per_image;
use crate::error::{parse_retry_after, sanitize_error_message, ImageGenError, Result};
use crate::image::provider::ImageProvider;
use crate::image::types::{GenerationRequest, GenerationResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use super::DEFAULT_TIMEOUT;

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const OPENAI_MODEL: &str = "dall-e-3";
const DEFAULT_AZURE_DEPLOYMENT: &str = "dall-e-3";
const DEFAULT_AZURE_API_VERSION: &str = "2024-02-01";

/// Where DALL-E 3 is hosted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DalleBackend {
    /// api.openai.com with a bearer key.
    OpenAi,
    /// An Azure OpenAI resource with a dall-e-3 deployment.
    Azure {
        /// Resource endpoint, e.g. `https://my-resource.openai.azure.com`.
        endpoint: String,
        deployment: String,
        api_version: String,
    },
}

/// Builder for [`DalleProvider`].
#[derive(Debug, Clone, Default)]
pub struct DalleProviderBuilder {
    api_key: Option<String>,
    backend: Option<DalleBackend>,
    base_url: Option<String>,
    timeout: Option<Duration>,
}

impl DalleProviderBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the API key. Falls back to `AZURE_OPENAI_API_KEY` for Azure and
    /// `OPENAI_API_KEY` otherwise.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Targets api.openai.com.
    pub fn openai(mut self) -> Self {
        self.backend = Some(DalleBackend::OpenAi);
        self
    }

    /// Targets an Azure OpenAI deployment.
    pub fn azure(
        mut self,
        endpoint: impl Into<String>,
        deployment: impl Into<String>,
        api_version: impl Into<String>,
    ) -> Self {
        self.backend = Some(DalleBackend::Azure {
            endpoint: endpoint.into(),
            deployment: deployment.into(),
            api_version: api_version.into(),
        });
        self
    }

    /// Overrides the OpenAI base URL (proxies, tests).
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Sets the per-call timeout. Default 60 seconds.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Picks the backend from the environment: Azure when
    /// `AZURE_OPENAI_ENDPOINT` is set, OpenAI otherwise.
    pub fn from_env(mut self) -> Self {
        if self.backend.is_none() {
            if let Ok(endpoint) = std::env::var("AZURE_OPENAI_ENDPOINT") {
                let deployment = std::env::var("AZURE_OPENAI_DEPLOYMENT_NAME")
                    .unwrap_or_else(|_| DEFAULT_AZURE_DEPLOYMENT.to_string());
                let api_version = std::env::var("AZURE_OPENAI_API_VERSION")
                    .unwrap_or_else(|_| DEFAULT_AZURE_API_VERSION.to_string());
                self = self.azure(endpoint, deployment, api_version);
            }
        }
        self
    }

    /// Builds the provider, resolving the API key.
    pub fn build(self) -> Result<DalleProvider> {
        let backend = self.backend.unwrap_or(DalleBackend::OpenAi);
        let env_var = match backend {
            DalleBackend::OpenAi => "OPENAI_API_KEY",
            DalleBackend::Azure { .. } => "AZURE_OPENAI_API_KEY",
        };
        let api_key = self
            .api_key
            .or_else(|| std::env::var(env_var).ok())
            .ok_or_else(|| {
                ImageGenError::Auth(format!("{} not set and no API key provided", env_var))
            })?;

        let client = reqwest::Client::builder()
            .timeout(self.timeout.unwrap_or(DEFAULT_TIMEOUT))
            .build()?;

        Ok(DalleProvider {
            client,
            api_key,
            backend,
            base_url: self
                .base_url
                .unwrap_or_else(|| OPENAI_BASE_URL.to_string()),
        })
    }
}

/// DALL-E 3 image generation provider.
pub struct DalleProvider {
    client: reqwest::Client,
    api_key: String,
    backend: DalleBackend,
    base_url: String,
}

impl DalleProvider {
    /// Creates a new `DalleProviderBuilder`.
    pub fn builder() -> DalleProviderBuilder {
        DalleProviderBuilder::new()
    }

    /// Name of the model or deployment requests go to.
    pub fn deployment(&self) -> &str {
        match &self.backend {
            DalleBackend::OpenAi => OPENAI_MODEL,
            DalleBackend::Azure { deployment, .. } => deployment,
        }
    }

    fn generations_url(&self) -> String {
        match &self.backend {
            DalleBackend::OpenAi => {
                format!("{}/images/generations", self.base_url.trim_end_matches('/'))
            }
            DalleBackend::Azure {
                endpoint,
                deployment,
                api_version,
            } => format!(
                "{}/openai/deployments/{}/images/generations?api-version={}",
                endpoint.trim_end_matches('/'),
                deployment,
                api_version
            ),
        }
    }

    fn parse_error(
        &self,
        status: u16,
        text: &str,
        headers: &reqwest::header::HeaderMap,
    ) -> ImageGenError {
        let text = sanitize_error_message(&extract_error_message(text));
        if status == 402 {
            return ImageGenError::Billing(text);
        }
        if status == 429 {
            if text.contains("insufficient_quota") || text.contains("exceeded your current quota") {
                return ImageGenError::Billing(text);
            }
            let retry_after = parse_retry_after(headers).map(Duration::from_secs);
            return ImageGenError::RateLimited { retry_after };
        }
        if status == 401 || status == 403 {
            return ImageGenError::Auth(text);
        }
        let lower = text.to_lowercase();
        if lower.contains("safety") || lower.contains("content_policy") || lower.contains("blocked")
        {
            return ImageGenError::ContentBlocked(text);
        }
        ImageGenError::Api {
            status,
            message: text,
        }
    }
}

#[async_trait]
impl ImageProvider for DalleProvider {
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResult> {
        request.validate()?;
        let start = Instant::now();

        let body = DalleRequest::from_generation_request(request, &self.backend);
        let mut http = self.client.post(self.generations_url()).json(&body);
        http = match self.backend {
            DalleBackend::OpenAi => http.bearer_auth(&self.api_key),
            DalleBackend::Azure { .. } => http.header("api-key", &self.api_key),
        };

        let response = http.send().await.map_err(|e| {
            if e.is_timeout() {
                ImageGenError::Timeout(start.elapsed())
            } else {
                ImageGenError::Network(e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let headers = response.headers().clone();
            let text = response.text().await.unwrap_or_default();
            return Err(self.parse_error(status.as_u16(), &text, &headers));
        }

        let dalle_response: DalleResponse = response.json().await?;
        let image = dalle_response.data.into_iter().next().ok_or_else(|| {
            ImageGenError::UnexpectedResponse("No images in DALL-E response".into())
        })?;
        let url = image.url.ok_or_else(|| {
            ImageGenError::UnexpectedResponse("DALL-E response contained no image URL".into())
        })?;

        tracing::info!(
            deployment = self.deployment(),
            size = %request.size,
            quality = %request.quality,
            style = %request.style,
            duration_ms = start.elapsed().as_millis() as u64,
            "image generated"
        );

        Ok(GenerationResult {
            url,
            original_prompt: request.prompt.clone(),
            revised_prompt: image.revised_prompt.unwrap_or_default(),
            parameters: request.parameters(),
            cost: cost_per_image(request.quality),
            timestamp: dalle_response
                .created
                .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0)),
            cost_status: None,
        })
    }

    fn name(&self) -> &str {
        match self.backend {
            DalleBackend::OpenAi => "DALL-E 3 (OpenAI)",
            DalleBackend::Azure { .. } => "DALL-E 3 (Azure OpenAI)",
        }
    }
}

/// Pulls `error.message` out of an OpenAI-style error body.
fn extract_error_message(text: &str) -> String {
    serde_json::from_str::<serde_json::Value>(text)
        .ok()
        .and_then(|v| {
            let error = v.get("error")?;
            let message = error.get("message")?.as_str()?;
            match error.get("code").and_then(|c| c.as_str()) {
                Some(code) => Some(format!("{} ({})", message, code)),
                None => Some(message.to_string()),
            }
        })
        .unwrap_or_else(|| text.to_string())
}

#[derive(Debug, Serialize)]
struct DalleRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'static str>,
    prompt: String,
    n: u32,
    size: &'static str,
    quality: &'static str,
    style: &'static str,
    response_format: &'static str,
}

impl DalleRequest {
    fn from_generation_request(req: &GenerationRequest, backend: &DalleBackend) -> Self {
        Self {
            model: match backend {
                DalleBackend::OpenAi => Some(OPENAI_MODEL),
                DalleBackend::Azure { .. } => None,
            },
            prompt: req.prompt.clone(),
            n: 1,
            size: req.size.as_str(),
            quality: req.quality.as_str(),
            style: req.style.as_str(),
            response_format: "url",
        }
    }
}

#[derive(Debug, Deserialize)]
struct DalleResponse {
    #[serde(default)]
    created: Option<i64>,
    data: Vec<DalleImageData>,
}

#[derive(Debug, Deserialize)]
struct DalleImageData {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    revised_prompt: Option<String>,
}
