//! HTTP routes.

use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, State},
    http::{HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use transmute_domain::{GenerationRequest, ImageRef, TransmuteMode};
use transmute_shared::{
    BackendHealthResponse, ErrorCode, ErrorResponse, TransmuteRequest, TransmuteResponse,
};

use crate::app::App;
use crate::infrastructure::correlation::CorrelationId;
use crate::infrastructure::ports::GenerationError;
use crate::use_cases::generation::ProgressCallback;

/// Header carrying the per-request correlation id back to the caller.
pub const CORRELATION_HEADER: HeaderName = HeaderName::from_static("x-correlation-id");

/// Images one transmute body may carry inline: four mashup sources plus a mask.
const MAX_INLINE_IMAGES: usize = 5;
/// Room for the JSON envelope, prompt and data URI headers.
const BODY_SLACK_BYTES: usize = 64 * 1024;

/// Largest request body that still fits `MAX_INLINE_IMAGES` base64 images of
/// `max_image_bytes` each.
pub fn body_limit_for(max_image_bytes: usize) -> usize {
    let encoded = max_image_bytes.div_ceil(3).saturating_mul(4);
    encoded
        .saturating_mul(MAX_INLINE_IMAGES)
        .saturating_add(BODY_SLACK_BYTES)
}

/// Create all HTTP routes.
///
/// `max_image_bytes` is the per-image source cap; the body limit is sized so
/// that cap, not axum's default, is what rejects large uploads.
pub fn routes(max_image_bytes: usize) -> Router<Arc<App>> {
    Router::new()
        .route("/", get(health))
        .route("/api/health", get(health))
        .route("/api/health/backend", get(backend_health))
        .route("/api/transmute", post(transmute))
        .layer(DefaultBodyLimit::max(body_limit_for(max_image_bytes)))
}

async fn health() -> &'static str {
    "OK"
}

async fn backend_health(State(app): State<Arc<App>>) -> Json<BackendHealthResponse> {
    let healthy = app.transmute.check_backend_health().await;
    Json(BackendHealthResponse {
        backend: app.transmute.backend_kind().to_string(),
        healthy,
    })
}

async fn transmute(
    State(app): State<Arc<App>>,
    body: Result<Json<TransmuteRequest>, JsonRejection>,
) -> Response {
    let correlation_id = CorrelationId::new();
    let response = match run_transmute(&app, body, correlation_id).await {
        Ok(body) => Json(body).into_response(),
        Err(e) => e.into_response(),
    };
    with_correlation(response, correlation_id)
}

async fn run_transmute(
    app: &App,
    body: Result<Json<TransmuteRequest>, JsonRejection>,
    correlation_id: CorrelationId,
) -> Result<TransmuteResponse, ApiError> {
    let Json(body) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let request = parse_request(body)?;

    let short_id = correlation_id.short();
    let progress: ProgressCallback = Arc::new(move |elapsed_secs| {
        tracing::debug!(correlation_id = %short_id, elapsed_secs, "Still generating");
    });

    let outcome = app
        .transmute
        .execute_with_progress(request, correlation_id, Some(progress))
        .await?;

    Ok(TransmuteResponse {
        source_image_count: outcome.result.source_count(),
        mode: outcome.result.mode.to_string(),
        result_url: outcome.result.image_url,
        transmission_number: outcome.transmission_number,
    })
}

fn parse_request(body: TransmuteRequest) -> Result<GenerationRequest, ApiError> {
    let mode: TransmuteMode = body.mode.parse().map_err(GenerationError::from)?;
    let sources = body
        .source_images
        .into_iter()
        .map(ImageRef::new)
        .collect::<Result<Vec<_>, _>>()
        .map_err(GenerationError::from)?;

    let mut request = GenerationRequest::new(mode, sources).with_sliders(body.creativity, body.chaos);
    if let Some(prompt) = body.prompt.filter(|p| !p.trim().is_empty()) {
        request = request.with_prompt(prompt);
    }
    if let Some(mask) = body.mask {
        request = request.with_mask(ImageRef::new(mask).map_err(GenerationError::from)?);
    }
    if let Some(seed) = body.seed {
        request = request.with_seed(seed);
    }
    Ok(request)
}

fn with_correlation(mut response: Response, correlation_id: CorrelationId) -> Response {
    if let Ok(value) = HeaderValue::from_str(&correlation_id.to_string()) {
        response.headers_mut().insert(CORRELATION_HEADER, value);
    }
    response
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Generation(GenerationError),
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, ErrorCode) {
        match self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, ErrorCode::InvalidRequest),
            ApiError::Generation(e) => match e {
                GenerationError::InvalidRequest(_) => {
                    (StatusCode::BAD_REQUEST, ErrorCode::InvalidRequest)
                }
                GenerationError::UpstreamRejected { .. } => {
                    (StatusCode::BAD_GATEWAY, ErrorCode::UpstreamRejected)
                }
                GenerationError::RateLimited { .. } => {
                    (StatusCode::TOO_MANY_REQUESTS, ErrorCode::RateLimited)
                }
                GenerationError::GenerationFailed(_) => {
                    (StatusCode::BAD_GATEWAY, ErrorCode::GenerationFailed)
                }
                GenerationError::GenerationTimedOut { .. } => {
                    (StatusCode::GATEWAY_TIMEOUT, ErrorCode::GenerationTimedOut)
                }
                GenerationError::Transport(_) | GenerationError::Configuration(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, ErrorCode::Internal)
                }
            },
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::BadRequest(msg) => msg.clone(),
            ApiError::Generation(GenerationError::Transport(_))
            | ApiError::Generation(GenerationError::Configuration(_)) => {
                "Internal error".to_string()
            }
            ApiError::Generation(e) => e.to_string(),
        }
    }
}

impl From<GenerationError> for ApiError {
    fn from(e: GenerationError) -> Self {
        ApiError::Generation(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        (status, Json(ErrorResponse::new(code, self.message()))).into_response()
    }
}
