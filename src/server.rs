//! HTTP API server.
//!
//! Exposes the analysis pipeline as a small JSON API:
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/analyze` | Run a comparison or deep-dive analysis |
//! | `POST` | `/api/prefetch` | Start background cache warming |
//! | `GET`  | `/api/health` | Service health and configured upstreams |
//!
//! # Error Contract
//!
//! All error responses use the shape:
//!
//! ```json
//! { "error": { "code": "VALIDATION_ERROR", "message": "input must not be empty" } }
//! ```
//!
//! Codes: `VALIDATION_ERROR` (400), `NOT_FOUND` (404), `EXTERNAL_API_ERROR`
//! (502), `INTERNAL_ERROR` (500). Source-adapter failures never surface
//! here — only a summarization failure turns into a non-2xx response.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support browser
//! clients.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::app::AppContext;
use crate::error::AnalysisError;
use crate::models::AnalysisKind;
use crate::orchestrator::{self, AnalyzeOptions, MAX_INPUT_LEN};

/// Starts the HTTP server on the configured bind address. Runs until the
/// process is terminated.
pub async fn run_server(context: Arc<AppContext>) -> anyhow::Result<()> {
    let bind_addr = context.config.server.bind.clone();

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/api/analyze", post(handle_analyze))
        .route("/api/prefetch", post(handle_prefetch))
        .route("/api/health", get(handle_health))
        .layer(cors)
        .with_state(context);

    info!("listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn validation_error(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "VALIDATION_ERROR",
        message: message.into(),
    }
}

impl From<AnalysisError> for AppError {
    fn from(err: AnalysisError) -> Self {
        match err {
            AnalysisError::Validation(message) => validation_error(message),
            AnalysisError::Summarization(inner) => AppError {
                status: StatusCode::BAD_GATEWAY,
                code: "EXTERNAL_API_ERROR",
                message: inner.to_string(),
            },
        }
    }
}

// ============ POST /api/analyze ============

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzeRequest {
    input: String,
    #[serde(rename = "type")]
    kind: Option<AnalysisKind>,
    #[serde(default)]
    options: AnalyzeRequestOptions,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct AnalyzeRequestOptions {
    #[serde(default)]
    skip_cache: bool,
    include_metrics: Option<bool>,
}

async fn handle_analyze(
    State(context): State<Arc<AppContext>>,
    Json(request): Json<AnalyzeRequest>,
) -> Result<Response, AppError> {
    let input = request.input.trim();
    if input.is_empty() {
        return Err(validation_error("input is required"));
    }
    if input.len() > MAX_INPUT_LEN {
        return Err(validation_error(format!(
            "input too long (max {} characters)",
            MAX_INPUT_LEN
        )));
    }

    // Detect the analysis kind when the client does not name one.
    let kind = request
        .kind
        .unwrap_or_else(|| orchestrator::detect_analysis_kind(input));

    let options = AnalyzeOptions {
        skip_cache: request.options.skip_cache,
        include_metrics: request.options.include_metrics.unwrap_or(true),
    };

    info!(input, kind = kind.as_str(), "analysis request");
    let result = context.orchestrator.analyze(input, kind, &options).await?;

    Ok(Json(result).into_response())
}

// ============ POST /api/prefetch ============

#[derive(Deserialize, Default)]
struct PrefetchRequest {
    tools: Option<Vec<String>>,
}

#[derive(Serialize)]
struct PrefetchResponse {
    message: String,
    tools: Vec<String>,
}

/// Starts background cache warming and responds immediately; individual
/// tool failures are logged by the orchestrator, never surfaced.
async fn handle_prefetch(
    State(context): State<Arc<AppContext>>,
    body: Option<Json<PrefetchRequest>>,
) -> Json<PrefetchResponse> {
    let tools = body
        .and_then(|Json(req)| req.tools)
        .filter(|tools| !tools.is_empty())
        .unwrap_or_else(orchestrator::default_prefetch_tools);

    let orchestrator = context.orchestrator.clone();
    let background_tools = tools.clone();
    tokio::spawn(async move {
        orchestrator.prefetch(&background_tools).await;
    });

    Json(PrefetchResponse {
        message: "Prefetch started".to_string(),
        tools,
    })
}

// ============ GET /api/health ============

#[derive(Serialize)]
struct HealthServices {
    cache: bool,
    github: bool,
    claude: bool,
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    services: HealthServices,
    version: String,
    timestamp: String,
}

async fn handle_health(State(context): State<Arc<AppContext>>) -> Response {
    let services = HealthServices {
        cache: context.cache.durable_ready(),
        // the summarizer credential is validated at boot, so a running
        // process always has it
        claude: true,
        github: context.github_configured,
    };

    let healthy = services.cache && services.github && services.claude;
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let body = HealthResponse {
        status: if healthy { "healthy" } else { "degraded" }.to_string(),
        services,
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now().to_rfc3339(),
    };

    (status, Json(body)).into_response()
}
