use std::{sync::Arc, time::Instant};

use axum::{extract::Request, middleware::Next, response::Response};
use serde_json::Value;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use crate::mcp::intercept::{unary_fn, Interceptor, UnaryFunc};

/// Installs the global subscriber. Output goes to stderr; stdout belongs to the stdio transport.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

pub async fn request_logging_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started_at = Instant::now();

    let response = next.run(request).await;
    let status = response.status();
    let elapsed_ms = started_at.elapsed().as_millis();

    info!(
        method = %method,
        path = %path,
        status = status.as_u16(),
        duration_ms = elapsed_ms,
        "request summary"
    );

    if status.is_client_error() {
        warn!(method = %method, path = %path, status = status.as_u16(), "rejected request");
    }

    response
}

/// Audits every unary call passing through the chain it is registered on.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingInterceptor;

impl Interceptor for LoggingInterceptor {
    fn wrap_unary(&self, next: UnaryFunc) -> UnaryFunc {
        unary_fn(move |ctx, request| {
            let next = Arc::clone(&next);
            async move {
                let method = request.method().to_string();
                let id = request.id().unwrap_or("-").to_string();
                let params = request
                    .raw_payload()
                    .map(|params| redact_audit_value(&params))
                    .unwrap_or(Value::Null);
                let started_at = Instant::now();

                let response = next(ctx, request).await;

                info!(
                    method = %method,
                    id = %id,
                    params = %params,
                    outcome = if response.is_ok() { "success" } else { "failure" },
                    duration_ms = started_at.elapsed().as_millis(),
                    "mcp action audited"
                );
                response
            }
        })
    }
}

pub fn redact_audit_params(params: Option<&Value>) -> Value {
    params.map(redact_audit_value).unwrap_or(Value::Null)
}

pub fn redact_audit_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, item)| {
                    if is_sensitive_key(key) {
                        (key.clone(), Value::String("[REDACTED]".to_string()))
                    } else {
                        (key.clone(), redact_audit_value(item))
                    }
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(redact_audit_value).collect()),
        _ => value.clone(),
    }
}

pub fn is_sensitive_key(key: &str) -> bool {
    let normalized = key.trim().to_ascii_lowercase();
    matches!(
        normalized.as_str(),
        "authorization" | "bearer" | "api_key" | "apikey"
    ) || normalized.contains("token")
        || normalized.contains("secret")
        || normalized.contains("password")
        || normalized.contains("credential")
}
