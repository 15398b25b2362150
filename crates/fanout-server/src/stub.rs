//! Slow-I/O stub downstream.
//!
//! `GET /slow?delay_ms=<ms>&jitter_ms=<ms>&code=<status>` sleeps for
//! `delay_ms` (clamped to `0..=MAX_DELAY_MS`, falling back to the base delay
//! when absent or not a number) plus a random `0..=jitter_ms`, and answers
//! with `code` (200 when absent or outside 100..=599). The caller's
//! `X-Request-Id` is echoed, or a fresh one is generated.

use axum::extract::{Query, State};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, Uri};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{SecondsFormat, Utc};
use rand::Rng;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

pub const MAX_DELAY_MS: u64 = 10_000;

const REQUEST_ID: &str = "x-request-id";
const INSTANCE: &str = "x-instance";

/// `slow-io-<uuid>`, used when no instance id is configured.
pub fn default_instance() -> String {
    format!("slow-io-{}", Uuid::new_v4())
}

#[derive(Clone)]
pub struct StubState {
    base_delay_ms: u64,
    instance: String,
    served: Arc<AtomicU64>,
}

impl StubState {
    pub fn new(base_delay_ms: u64, instance: impl Into<String>) -> Self {
        Self {
            base_delay_ms: base_delay_ms.min(MAX_DELAY_MS),
            instance: instance.into(),
            served: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Requests answered on `/slow` so far.
    pub fn served(&self) -> u64 {
        self.served.load(Ordering::Relaxed)
    }
}

pub fn stub_router(state: StubState) -> Router {
    Router::new()
        .route("/slow", get(slow))
        .route("/healthz", get(healthz))
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct SlowResponse {
    ok: bool,
    delay_ms: u64,
    jitter_ms: u64,
    code: u16,
    ts: String,
    instance: String,
    request_id: String,
    path: String,
}

fn parse_delay(raw: Option<&String>, base: u64) -> u64 {
    match raw.and_then(|v| v.trim().parse::<i64>().ok()) {
        Some(ms) => ms.clamp(0, MAX_DELAY_MS as i64) as u64,
        None => base,
    }
}

/// Negative or unparsable jitter means none.
fn parse_jitter(raw: Option<&String>) -> u64 {
    raw.and_then(|v| v.trim().parse::<u64>().ok()).unwrap_or(0)
}

fn jittered(delay_ms: u64, jitter_ms: u64) -> u64 {
    if jitter_ms == 0 {
        return delay_ms;
    }
    delay_ms + rand::thread_rng().gen_range(0..=jitter_ms)
}

fn request_id(headers: &HeaderMap) -> String {
    headers
        .get(REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

fn parse_code(raw: Option<&String>) -> StatusCode {
    raw.and_then(|v| v.trim().parse::<u16>().ok())
        .filter(|c| (100..=599).contains(c))
        .and_then(|c| StatusCode::from_u16(c).ok())
        .unwrap_or(StatusCode::OK)
}

async fn slow(
    State(state): State<StubState>,
    Query(params): Query<HashMap<String, String>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> impl IntoResponse {
    let start = Instant::now();
    let request_id = request_id(&headers);
    let jitter_ms = parse_jitter(params.get("jitter_ms"));
    let delay_ms = jittered(parse_delay(params.get("delay_ms"), state.base_delay_ms), jitter_ms);
    let code = parse_code(params.get("code"));

    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    state.served.fetch_add(1, Ordering::Relaxed);

    tracing::info!(
        delay_ms,
        jitter_ms,
        code = code.as_u16(),
        path = uri.path(),
        %method,
        latency_ms = start.elapsed().as_millis() as u64,
        %request_id,
        "served /slow"
    );

    let mut response_headers = HeaderMap::new();
    if let Ok(v) = HeaderValue::from_str(&state.instance) {
        response_headers.insert(INSTANCE, v);
    }
    if let Ok(v) = HeaderValue::from_str(&request_id) {
        response_headers.insert(REQUEST_ID, v);
    }

    (
        code,
        response_headers,
        Json(SlowResponse {
            ok: code.is_success(),
            delay_ms,
            jitter_ms,
            code: code.as_u16(),
            ts: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            instance: state.instance.clone(),
            request_id,
            path: uri.path().to_string(),
        }),
    )
}

async fn healthz() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "ok": true,
        "ts": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_is_clamped() {
        let s = |v: &str| Some(v.to_string());
        assert_eq!(parse_delay(s("-5").as_ref(), 50), 0);
        assert_eq!(parse_delay(s("20000").as_ref(), 50), MAX_DELAY_MS);
        assert_eq!(parse_delay(s("abc").as_ref(), 50), 50);
        assert_eq!(parse_delay(None, 50), 50);
        assert_eq!(parse_delay(s("7").as_ref(), 50), 7);
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let s = |v: &str| Some(v.to_string());
        assert_eq!(parse_jitter(s("-3").as_ref()), 0);
        assert_eq!(parse_jitter(s("x").as_ref()), 0);
        assert_eq!(parse_jitter(None), 0);
        assert_eq!(parse_jitter(s("25").as_ref()), 25);

        assert_eq!(jittered(40, 0), 40);
        for _ in 0..200 {
            let d = jittered(40, 10);
            assert!((40..=50).contains(&d), "{d}");
        }
    }

    #[test]
    fn request_id_is_echoed_or_generated() {
        let mut headers = HeaderMap::new();
        headers.insert(REQUEST_ID, HeaderValue::from_static("abc-123"));
        assert_eq!(request_id(&headers), "abc-123");

        let generated = request_id(&HeaderMap::new());
        assert!(Uuid::parse_str(&generated).is_ok());
        assert_ne!(generated, request_id(&HeaderMap::new()));
    }

    #[test]
    fn default_instance_is_unique() {
        let a = default_instance();
        assert!(a.starts_with("slow-io-"));
        assert_ne!(a, default_instance());
    }

    #[test]
    fn bad_codes_fall_back_to_ok() {
        let s = |v: &str| Some(v.to_string());
        assert_eq!(parse_code(s("503").as_ref()), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(parse_code(s("42").as_ref()), StatusCode::OK);
        assert_eq!(parse_code(s("700").as_ref()), StatusCode::OK);
        assert_eq!(parse_code(None), StatusCode::OK);
    }
}
