//! Relay server: holds the provider key and enforces the monthly budget.

mod ledger;
mod routes;

pub use ledger::{BudgetLedger, Reservation};
pub use routes::{api_routes, ApiError};

use crate::config::ServerConfig;
use crate::error::{ImageGenError, Result};
use crate::image::ImageProvider;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderValue, Method};
use axum::Router;
use std::future::Future;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

/// Shared state available to all handlers via `State<AppState>`.
#[derive(Clone)]
pub struct AppState {
    /// Upstream image provider.
    pub provider: Arc<dyn ImageProvider>,
    pub ledger: Arc<BudgetLedger>,
    /// Deployment name reported by the health check.
    pub deployment: Arc<str>,
}

impl AppState {
    pub fn new(
        provider: Arc<dyn ImageProvider>,
        ledger: BudgetLedger,
        deployment: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            provider,
            ledger: Arc::new(ledger),
            deployment: deployment.into(),
        }
    }
}

/// Builds the relay router with CORS limited to `frontend_url`.
pub fn router(state: AppState, frontend_url: &str) -> Result<Router> {
    let origin = HeaderValue::from_str(frontend_url).map_err(|e| {
        ImageGenError::Config(format!("FRONTEND_URL '{frontend_url}' is not a valid origin: {e}"))
    })?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([CONTENT_TYPE]);

    Ok(api_routes()
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors)
        .with_state(state))
}

/// Binds `config.bind_addr()` and serves until `shutdown` resolves.
pub async fn serve<F>(config: &ServerConfig, state: AppState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = router(state, &config.frontend_url)?;
    let listener = tokio::net::TcpListener::bind(config.bind_addr()).await?;
    tracing::info!(
        addr = %listener.local_addr()?,
        budget = %config.monthly_budget,
        frontend = %config.frontend_url,
        "relay listening"
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    tracing::info!("relay stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::providers::RelayClient;
    use crate::image::{BudgetSource, ImageQuality};
    use rust_decimal_macros::dec;

    #[test]
    fn test_router_rejects_invalid_origin() {
        let provider = Arc::new(
            RelayClient::builder()
                .base_url("http://127.0.0.1:9")
                .build()
                .unwrap(),
        );
        let state = AppState::new(provider, BudgetLedger::new(dec!(1)), "dall-e-3");
        assert!(matches!(
            router(state, "http://bad\norigin"),
            Err(ImageGenError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_relay_client_against_live_server() {
        use crate::image::{GenerationRequest, GenerationResult};
        use async_trait::async_trait;

        struct Echo;

        #[async_trait]
        impl ImageProvider for Echo {
            async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResult> {
                Ok(GenerationResult {
                    url: "https://cdn.test/echo.png".into(),
                    original_prompt: request.prompt.clone(),
                    revised_prompt: String::new(),
                    parameters: request.parameters(),
                    cost: crate::accounting::cost_per_image(request.quality),
                    timestamp: None,
                    cost_status: None,
                })
            }

            fn name(&self) -> &str {
                "echo"
            }
        }

        let state = AppState::new(Arc::new(Echo), BudgetLedger::new(dec!(1)), "dall-e-3");
        let app = router(state, "http://localhost:5173").unwrap();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let client = RelayClient::builder()
            .base_url(format!("http://{addr}"))
            .build()
            .unwrap();
        let request = GenerationRequest::new("a fox").with_quality(ImageQuality::Hd);
        let result = client.generate(&request).await.unwrap();
        assert_eq!(result.cost, dec!(0.08));
        assert_eq!(result.cost_status.unwrap().spent, dec!(0.08));

        let status = client.fetch_budget_status().await.unwrap();
        assert_eq!(status.remaining, dec!(0.92));
    }
}
