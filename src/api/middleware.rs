//! API Middleware
//!
//! Identity resolution and request logging.

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use tracing::Instrument;
use uuid::Uuid;

use crate::error::AppError;
use crate::store::Store;

use super::routes::AppState;

/// Header carrying the login authenticated by the upstream gateway
pub const USER_LOGIN_HEADER: &str = "X-User-Login";

/// Header carrying the request correlation id
pub const CORRELATION_ID_HEADER: &str = "X-Correlation-Id";

/// Authenticated caller, placed in request extensions by [`auth_middleware`]
#[derive(Debug, Clone)]
pub struct RequestUser {
    pub login: String,
}

// =========================================================================
// Identity Middleware
// =========================================================================

/// Resolve `X-User-Login` to a registered account
pub async fn auth_middleware<S: Store>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let login = headers
        .get(USER_LOGIN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|login| !login.is_empty())
        .ok_or_else(|| AppError::MissingHeader(USER_LOGIN_HEADER.to_string()))?;

    if state.store.load_account(login).await?.is_none() {
        return Err(AppError::UnknownUser(login.to_string()));
    }

    request.extensions_mut().insert(RequestUser {
        login: login.to_string(),
    });

    Ok(next.run(request).await)
}

// =========================================================================
// mask_headers_for_logging
// =========================================================================

/// Headers that should be masked in logs
const SENSITIVE_HEADERS: &[&str] = &[
    "authorization",
    "cookie",
    "set-cookie",
    "x-api-key",
];

/// Mask sensitive headers for logging
pub fn mask_headers_for_logging(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            let name_lower = name.as_str().to_lowercase();
            let masked_value = if SENSITIVE_HEADERS.contains(&name_lower.as_str()) {
                "[REDACTED]".to_string()
            } else {
                value.to_str().unwrap_or("[invalid utf8]").to_string()
            };
            (name.to_string(), masked_value)
        })
        .collect()
}

// =========================================================================
// Request Logging Middleware
// =========================================================================

/// Request logging middleware
///
/// Reuses a valid incoming `X-Correlation-Id` or generates one, records it
/// on the request span and echoes it on the response.
pub async fn logging_middleware(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let version = request.version();

    let headers = mask_headers_for_logging(request.headers());

    let correlation_id = request
        .headers()
        .get(CORRELATION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s).ok())
        .unwrap_or_else(Uuid::new_v4);

    let start = std::time::Instant::now();

    tracing::info!(
        method = %method,
        uri = %uri,
        version = ?version,
        correlation_id = %correlation_id,
        headers = ?headers,
        "Incoming request"
    );

    // Handler logs carry the correlation id through this span
    let span = tracing::info_span!("request", correlation_id = %correlation_id);
    let mut response = next.run(request).instrument(span).await;

    let duration = start.elapsed();
    let status = response.status();

    tracing::info!(
        method = %method,
        uri = %uri,
        status = %status,
        duration_ms = %duration.as_millis(),
        correlation_id = %correlation_id,
        "Request completed"
    );

    if let Ok(value) = HeaderValue::from_str(&correlation_id.to_string()) {
        response.headers_mut().insert(CORRELATION_ID_HEADER, value);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_headers_for_logging() {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", "text/plain".parse().unwrap());
        headers.insert("authorization", "Bearer secret".parse().unwrap());
        headers.insert("x-user-login", "alice".parse().unwrap());

        let masked = mask_headers_for_logging(&headers);

        let auth = masked.iter().find(|(k, _)| k == "authorization");
        let content_type = masked.iter().find(|(k, _)| k == "content-type");
        let login = masked.iter().find(|(k, _)| k == "x-user-login");

        assert_eq!(auth.unwrap().1, "[REDACTED]");
        assert_eq!(content_type.unwrap().1, "text/plain");
        assert_eq!(login.unwrap().1, "alice");
    }

    #[test]
    fn test_sensitive_headers_list() {
        assert!(SENSITIVE_HEADERS.contains(&"authorization"));
        assert!(SENSITIVE_HEADERS.contains(&"cookie"));
        assert!(!SENSITIVE_HEADERS.contains(&"x-user-login"));
    }
}
