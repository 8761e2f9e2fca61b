use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;

use axum::{extract::{rejection::JsonRejection, Request}, http::{StatusCode, HeaderValue}, middleware::Next, response::{IntoResponse, Response}, Json};
use common_auth::AuthError;
use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use serde::Serialize;
use tracing::warn;

pub const ERROR_CODE_HEADER: &str = "X-Error-Code";
pub const INVALID_BODY_CODE: &str = "invalid_body";
/// Distinct `code` label values tracked before new codes collapse into [`OVERFLOW_CODE`].
pub const MAX_ERROR_CODES: usize = 40;
pub const OVERFLOW_CODE: &str = "_overflow";

#[derive(Serialize, Debug)]
pub struct ErrorBody {
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")] pub message: Option<String>,
}

#[derive(Debug)]
pub enum ApiError {
    Auth(AuthError),
    BadRequest { code: &'static str, message: Option<String> },
    NotFound { code: &'static str },
    Conflict { code: &'static str, message: Option<String> },
    Internal { message: Option<String> },
}

impl ApiError {
    pub fn internal<E: std::fmt::Display>(e: E) -> Self { Self::Internal { message: Some(e.to_string()) } }
    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self { Self::BadRequest { code, message: Some(message.into()) } }
    pub fn not_found(code: &'static str) -> Self { Self::NotFound { code } }
    pub fn conflict(code: &'static str, message: impl Into<String>) -> Self { Self::Conflict { code, message: Some(message.into()) } }
}

impl From<AuthError> for ApiError {
    fn from(value: AuthError) -> Self { Self::Auth(value) }
}

/// Undecodable or incomplete JSON bodies become labelled 400s.
impl From<JsonRejection> for ApiError {
    fn from(value: JsonRejection) -> Self { Self::bad_request(INVALID_BODY_CODE, value.body_text()) }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Auth(err) => return err.into_response(),
            ApiError::BadRequest { code, message } => (
                StatusCode::BAD_REQUEST,
                ErrorBody { code: code.into(), message },
            ),
            ApiError::NotFound { code } => (
                StatusCode::NOT_FOUND,
                ErrorBody { code: code.into(), message: None },
            ),
            ApiError::Conflict { code, message } => (
                StatusCode::CONFLICT,
                ErrorBody { code: code.into(), message },
            ),
            ApiError::Internal { message } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorBody { code: "internal_error".into(), message },
            ),
        };
        let header = HeaderValue::from_str(&body.code).ok();
        let mut resp = (status, Json(body)).into_response();
        if let Some(val) = header {
            resp.headers_mut().insert(ERROR_CODE_HEADER, val);
        }
        resp
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

struct ErrorMetrics {
    registry: Registry,
    http_errors_total: IntCounterVec,
    overflow_total: IntCounter,
    seen_codes: Mutex<HashSet<String>>,
}

static METRICS: Lazy<ErrorMetrics> = Lazy::new(|| {
    let registry = Registry::new();
    let http_errors_total = IntCounterVec::new(
        Opts::new("http_errors_total", "Count of HTTP error responses emitted (status >= 400)"),
        &["service", "code", "status"],
    ).expect("valid http_errors_total metric");
    let overflow_total = IntCounter::new(
        "http_error_code_overflow_total",
        "Error responses whose code label was collapsed by the cardinality guard",
    ).expect("valid overflow metric");
    let _ = registry.register(Box::new(http_errors_total.clone()));
    let _ = registry.register(Box::new(overflow_total.clone()));
    ErrorMetrics { registry, http_errors_total, overflow_total, seen_codes: Mutex::new(HashSet::new()) }
});

/// Count an error response, collapsing codes beyond [`MAX_ERROR_CODES`] into [`OVERFLOW_CODE`].
pub fn record_http_error(service: &str, code: &str, status: StatusCode) {
    let label = {
        let mut seen = match METRICS.seen_codes.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if seen.contains(code) {
            code.to_string()
        } else if seen.len() < MAX_ERROR_CODES {
            seen.insert(code.to_string());
            code.to_string()
        } else {
            METRICS.overflow_total.inc();
            OVERFLOW_CODE.to_string()
        }
    };
    METRICS.http_errors_total.with_label_values(&[service, &label, status.as_str()]).inc();
}

pub fn error_count(service: &str, code: &str, status: StatusCode) -> u64 {
    METRICS.http_errors_total.with_label_values(&[service, code, status.as_str()]).get()
}

pub fn distinct_error_codes() -> usize {
    METRICS.seen_codes.lock().map(|seen| seen.len()).unwrap_or(MAX_ERROR_CODES)
}

pub fn overflow_count() -> u64 { METRICS.overflow_total.get() }

/// Prometheus text exposition of the error metrics.
pub fn render_metrics() -> String {
    let mut buffer = Vec::new();
    if let Err(err) = TextEncoder::new().encode(&METRICS.registry.gather(), &mut buffer) {
        warn!(error = %err, "failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

type MetricsFuture = Pin<Box<dyn Future<Output = Response> + Send>>;

/// Middleware counting every response with status >= 400, labelled by its `X-Error-Code`.
pub fn http_error_metrics_layer(service: &'static str) -> impl Fn(Request, Next) -> MetricsFuture + Clone + Send + Sync + 'static {
    move |req: Request, next: Next| {
        Box::pin(async move {
            let resp = next.run(req).await;
            let status = resp.status();
            if status.is_client_error() || status.is_server_error() {
                let code = resp.headers().get(ERROR_CODE_HEADER)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("unlabelled")
                    .to_string();
                record_http_error(service, &code, status);
            }
            resp
        })
    }
}
