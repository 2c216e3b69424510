//! HTTP handlers for the relay API.

use crate::accounting::{cost_per_image, BudgetStatus};
use crate::error::ImageGenError;
use crate::image::{GenerationRequest, ImageQuality, ImageSize, ImageStyle};
use crate::server::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::str::FromStr;

/// Failure of a relay request, rendered as `{success: false, error}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Malformed body or parameter outside the allowed set.
    #[error("{0}")]
    BadRequest(String),

    /// The monthly budget cannot cover the request.
    #[error("{message}")]
    Budget {
        message: String,
        status: BudgetStatus,
    },

    /// The upstream provider failed.
    #[error(transparent)]
    Provider(#[from] ImageGenError),
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            ApiError::BadRequest(message) => (
                StatusCode::BAD_REQUEST,
                json!({ "success": false, "error": message }),
            ),
            ApiError::Budget { message, status } => (
                StatusCode::PAYMENT_REQUIRED,
                json!({ "success": false, "error": message, "cost_status": status }),
            ),
            ApiError::Provider(err) => {
                tracing::error!(error = %err, "error generating image");
                let code = if err.is_transport() {
                    StatusCode::BAD_GATEWAY
                } else {
                    StatusCode::INTERNAL_SERVER_ERROR
                };
                (code, json!({ "success": false, "error": err.to_string() }))
            }
        };
        (status, Json(body)).into_response()
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    dall_e_deployment: String,
}

/// GET /api/health
async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "imagegen relay",
        dall_e_deployment: state.deployment.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct GenerateBody {
    prompt: Option<String>,
    size: Option<String>,
    quality: Option<String>,
    style: Option<String>,
    n: Option<u32>,
}

/// Parses an optional wire value, defaulting when absent.
fn parse_or_default<T>(value: Option<&str>) -> Result<T, ApiError>
where
    T: FromStr<Err = ImageGenError> + Default,
{
    let Some(raw) = value else {
        return Ok(T::default());
    };
    raw.parse().map_err(|e| match e {
        ImageGenError::InvalidRequest(message) => ApiError::BadRequest(message),
        other => ApiError::BadRequest(other.to_string()),
    })
}

impl GenerateBody {
    fn into_request(self) -> Result<GenerationRequest, ApiError> {
        let prompt = self.prompt.unwrap_or_default();
        if prompt.trim().is_empty() {
            return Err(ApiError::BadRequest("Prompt is required".into()));
        }
        let size: ImageSize = parse_or_default(self.size.as_deref())?;
        let quality: ImageQuality = parse_or_default(self.quality.as_deref())?;
        let style: ImageStyle = parse_or_default(self.style.as_deref())?;
        if self.n.is_some_and(|n| n != 1) {
            return Err(ApiError::BadRequest(
                "Invalid n. DALL-E 3 generates exactly 1 image per request".into(),
            ));
        }

        Ok(GenerationRequest::new(prompt)
            .with_size(size)
            .with_quality(quality)
            .with_style(style))
    }
}

/// POST /api/generate
async fn generate(
    State(state): State<AppState>,
    body: Result<Json<GenerateBody>, JsonRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Json(body) = body?;
    let request = body.into_request()?;
    let cost = cost_per_image(request.quality);

    let reservation = state.ledger.reserve(cost).map_err(|status| {
        let message = if status.is_exhausted {
            "Monthly budget exhausted".to_string()
        } else {
            format!(
                "Insufficient budget: image costs ${cost}, ${} remaining this month",
                status.remaining
            )
        };
        tracing::warn!(%cost, remaining = %status.remaining, "refusing generation over budget");
        ApiError::Budget { message, status }
    })?;

    match state.provider.generate(&request).await {
        Ok(mut result) => {
            let status = reservation.commit();
            tracing::info!(
                %cost,
                spent = %status.spent,
                limit = %status.limit,
                "image generated"
            );
            result.cost = cost;
            result.cost_status = Some(status);
            Ok(Json(json!({ "success": true, "data": result })))
        }
        Err(e) => {
            reservation.release();
            Err(e.into())
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct CostBody {
    quality: Option<String>,
}

#[derive(Debug, Serialize)]
struct CostResponse {
    quality: ImageQuality,
    cost: Decimal,
    currency: &'static str,
}

/// POST /api/calculate-cost
async fn calculate_cost(
    body: Result<Json<CostBody>, JsonRejection>,
) -> Result<Json<CostResponse>, ApiError> {
    let Json(body) = body?;
    let quality: ImageQuality = match body.quality.as_deref() {
        None => ImageQuality::default(),
        Some(raw) => raw
            .parse()
            .map_err(|_| ApiError::BadRequest("Invalid quality parameter".into()))?,
    };
    Ok(Json(CostResponse {
        quality,
        cost: cost_per_image(quality),
        currency: "USD",
    }))
}

/// GET /api/cost-status
async fn cost_status(State(state): State<AppState>) -> Json<BudgetStatus> {
    Json(state.ledger.snapshot())
}

/// Mounts the `/api` routes.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/generate", post(generate))
        .route("/api/calculate-cost", post(calculate_cost))
        .route("/api/cost-status", get(cost_status))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::image::{GenerationResult, ImageProvider};
    use crate::server::{BudgetLedger, router};
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Method, Request};
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    enum Behaviour {
        Succeed,
        Block,
        TimeOut,
        Hang,
    }

    struct StubProvider {
        behaviour: Behaviour,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ImageProvider for StubProvider {
        async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.behaviour {
                Behaviour::Succeed => Ok(GenerationResult {
                    url: "https://cdn.test/out.png".into(),
                    original_prompt: request.prompt.clone(),
                    revised_prompt: "revised".into(),
                    parameters: request.parameters(),
                    cost: cost_per_image(request.quality),
                    timestamp: None,
                    cost_status: None,
                }),
                Behaviour::Block => Err(ImageGenError::ContentBlocked("safety system".into())),
                Behaviour::TimeOut => Err(ImageGenError::Timeout(Duration::from_secs(60))),
                Behaviour::Hang => {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Err(ImageGenError::Timeout(Duration::from_secs(30)))
                }
            }
        }

        fn name(&self) -> &str {
            "stub"
        }
    }

    fn test_app(
        behaviour: Behaviour,
        limit: Decimal,
    ) -> (Router, Arc<StubProvider>, Arc<BudgetLedger>) {
        let provider = Arc::new(StubProvider {
            behaviour,
            calls: AtomicUsize::new(0),
        });
        let ledger = Arc::new(BudgetLedger::new(limit));
        let state = AppState {
            provider: provider.clone(),
            ledger: ledger.clone(),
            deployment: "dall-e-3".into(),
        };
        (
            router(state, "http://localhost:5173").unwrap(),
            provider,
            ledger,
        )
    }

    async fn send(
        app: Router,
        method: Method,
        uri: &str,
        body: serde_json::Value,
    ) -> (StatusCode, serde_json::Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _, _) = test_app(Behaviour::Succeed, dec!(10));
        let request = Request::builder()
            .uri("/api/health")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["dall_e_deployment"], "dall-e-3");
    }

    #[tokio::test]
    async fn test_generate_charges_ledger() {
        let (app, _, ledger) = test_app(Behaviour::Succeed, dec!(1));
        let (status, json) = send(
            app,
            Method::POST,
            "/api/generate",
            json!({"prompt": "a koi pond", "quality": "hd", "size": "1792x1024"}),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["success"], true);
        assert_eq!(json["data"]["parameters"]["size"], "1792x1024");
        assert_eq!(json["data"]["cost"], 0.08);
        assert_eq!(json["data"]["cost_status"]["spent"], 0.08);
        assert_eq!(ledger.snapshot().spent, dec!(0.08));
    }

    #[tokio::test]
    async fn test_generate_defaults() {
        let (app, _, _) = test_app(Behaviour::Succeed, dec!(1));
        let (status, json) = send(app, Method::POST, "/api/generate", json!({"prompt": "x"})).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["parameters"]["size"], "1024x1024");
        assert_eq!(json["data"]["parameters"]["quality"], "standard");
        assert_eq!(json["data"]["parameters"]["style"], "vivid");
    }

    #[tokio::test]
    async fn test_generate_validation() {
        let cases = [
            (json!({}), "Prompt is required"),
            (json!({"prompt": "   "}), "Prompt is required"),
            (json!({"prompt": "x", "size": "512x512"}), "Invalid size"),
            (json!({"prompt": "x", "quality": "ultra"}), "Invalid quality"),
            (json!({"prompt": "x", "style": "noir"}), "Invalid style"),
            (json!({"prompt": "x", "n": 2}), "Invalid n"),
        ];
        for (body, expected) in cases {
            let (app, provider, _) = test_app(Behaviour::Succeed, dec!(1));
            let (status, json) = send(app, Method::POST, "/api/generate", body).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(json["success"], false);
            assert!(
                json["error"].as_str().unwrap().contains(expected),
                "{json}"
            );
            assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
        }
    }

    #[tokio::test]
    async fn test_generate_over_budget_is_402() {
        let (app, provider, _) = test_app(Behaviour::Succeed, dec!(0.05));
        let (status, json) = send(
            app,
            Method::POST,
            "/api/generate",
            json!({"prompt": "x", "quality": "hd"}),
        )
        .await;

        assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
        assert_eq!(json["cost_status"]["remaining"], 0.05);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_provider_failure_releases_reservation() {
        let (app, _, ledger) = test_app(Behaviour::Block, dec!(0.04));
        let (status, json) = send(app, Method::POST, "/api/generate", json!({"prompt": "x"})).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["error"], "content blocked: safety system");
        assert_eq!(ledger.snapshot().spent, Decimal::ZERO);
        assert!(ledger.reserve(dec!(0.04)).is_ok());
    }

    #[tokio::test]
    async fn test_cancelled_request_releases_reservation() {
        let (app, provider, ledger) = test_app(Behaviour::Hang, dec!(0.08));
        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/generate")
            .header("content-type", "application/json")
            .body(Body::from(json!({"prompt": "x", "quality": "hd"}).to_string()))
            .unwrap();

        // Client goes away while the provider call is still in flight.
        let dropped = tokio::time::timeout(Duration::from_millis(50), app.oneshot(request)).await;
        assert!(dropped.is_err());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);

        assert_eq!(ledger.snapshot().spent, Decimal::ZERO);
        assert!(ledger.reserve(dec!(0.08)).is_ok());
    }

    #[tokio::test]
    async fn test_provider_timeout_is_502() {
        let (app, _, _) = test_app(Behaviour::TimeOut, dec!(1));
        let (status, _) = send(app, Method::POST, "/api/generate", json!({"prompt": "x"})).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_calculate_cost() {
        let (app, _, _) = test_app(Behaviour::Succeed, dec!(1));
        let (status, json) = send(
            app.clone(),
            Method::POST,
            "/api/calculate-cost",
            json!({"quality": "hd"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json, json!({"quality": "hd", "cost": 0.08, "currency": "USD"}));

        let (status, json) = send(app.clone(), Method::POST, "/api/calculate-cost", json!({})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["cost"], 0.04);

        let (status, _) = send(
            app,
            Method::POST,
            "/api/calculate-cost",
            json!({"quality": "ultra"}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_cost_status() {
        let (app, _, ledger) = test_app(Behaviour::Succeed, dec!(5));
        ledger.reserve(dec!(1.25)).unwrap().commit();

        let request = Request::builder()
            .uri("/api/cost-status")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let status: BudgetStatus = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(status.remaining, dec!(3.75));
        assert_eq!(status.percent_used, 25.0);
    }

    #[tokio::test]
    async fn test_malformed_json_is_400_envelope() {
        let (app, _, _) = test_app(Behaviour::Succeed, dec!(1));
        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/generate")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
