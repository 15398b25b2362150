//! Method + path table for the processing service.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use std::any::Any;
use std::sync::Arc;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;

use fanout_core::{ErrorBody, ProcessError, ProcessRequest, ProcessResponse, Processor};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub processor: Arc<Processor>,
    pub name: String,
    pub version: String,
}

impl AppState {
    pub fn new(processor: Arc<Processor>) -> Self {
        Self {
            processor,
            name: "fanout".into(),
            version: env!("CARGO_PKG_VERSION").into(),
        }
    }
}

/// Build the router:
///
/// | method | path       |
/// |--------|------------|
/// | POST   | `/process` |
/// | GET    | `/healthz` |
/// | GET    | `/info`    |
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/process", post(process))
        .route("/healthz", get(healthz))
        .route("/info", get(info))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn panic_response(_panic: Box<dyn Any + Send + 'static>) -> Response {
    tracing::error!("handler panicked");
    ApiError::internal().into_response()
}

/// Error returned from handlers; renders as `{error, ...}` JSON.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    fn internal() -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: ErrorBody::message("Internal server error"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

impl From<ProcessError> for ApiError {
    fn from(err: ProcessError) -> Self {
        match &err {
            ProcessError::Validation(v) => Self {
                status: StatusCode::BAD_REQUEST,
                body: ErrorBody::from(v),
            },
            ProcessError::Internal(_) => {
                tracing::error!(error = %err, "processing failed");
                Self::internal()
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        tracing::warn!(error = %rejection.body_text(), "invalid request body");
        Self {
            status: StatusCode::BAD_REQUEST,
            body: ErrorBody::message("Invalid request body"),
        }
    }
}

async fn process(
    State(state): State<AppState>,
    payload: Result<Json<ProcessRequest>, JsonRejection>,
) -> Result<Json<ProcessResponse>, ApiError> {
    let Json(req) = payload?;
    let resp = state.processor.process(&req).await?;
    Ok(Json(resp))
}

#[derive(Debug, Serialize)]
struct Health {
    ok: bool,
    ts: String,
}

async fn healthz() -> Json<Health> {
    Json(Health {
        ok: true,
        ts: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    })
}

#[derive(Debug, Serialize)]
struct Info {
    name: String,
    version: String,
    max_count: u64,
    dispatch: String,
    concurrency_limit: usize,
    retry_attempts: u32,
    request_timeout_ms: u64,
    ok_policy: fanout_core::OkPolicy,
    node: String,
    notes: String,
}

async fn info(State(state): State<AppState>) -> Json<Info> {
    let config = state.processor.config();
    Json(Info {
        name: state.name.clone(),
        version: state.version.clone(),
        max_count: config.max_count,
        dispatch: config.dispatch.to_string(),
        concurrency_limit: config.dispatch.limit(),
        retry_attempts: config.retry.max_retries,
        request_timeout_ms: config.request_timeout_ms,
        ok_policy: config.ok_policy,
        node: state.processor.node().to_string(),
        notes: state.processor.notes().to_string(),
    })
}
