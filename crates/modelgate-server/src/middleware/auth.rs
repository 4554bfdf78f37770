//! Shared-secret authentication

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use modelgate::errors::GatewayError;
use secrecy::{ExposeSecret, SecretString};

use crate::api_error::ApiError;
use crate::routes::HEALTH_PATH;

const API_KEY_HEADER: &str = "x-api-key";

/// Authentication configuration. Without a secret every call is let through.
#[derive(Clone, Default)]
pub struct AuthConfig {
    secret: Option<Arc<SecretString>>,
}

impl AuthConfig {
    pub fn new(secret: Option<SecretString>) -> Self {
        Self {
            secret: secret.map(Arc::new),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.secret.is_some()
    }

    fn accepts(&self, headers: &HeaderMap) -> bool {
        let Some(secret) = self.secret.as_deref() else {
            return true;
        };
        presented_secret(headers)
            .map_or(false, |token| constant_time_eq(token, secret.expose_secret()))
    }
}

/// `Authorization: Bearer <secret>` wins over `x-api-key: <secret>`.
fn presented_secret(headers: &HeaderMap) -> Option<&str> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| {
            value
                .strip_prefix("Bearer ")
                .or_else(|| value.strip_prefix("bearer "))
        });

    bearer.or_else(|| {
        headers
            .get(API_KEY_HEADER)
            .and_then(|value| value.to_str().ok())
    })
}

fn constant_time_eq(presented: &str, expected: &str) -> bool {
    if presented.len() != expected.len() {
        return false;
    }

    presented
        .bytes()
        .zip(expected.bytes())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

/// Reject calls that do not carry the configured secret before any handler runs.
pub async fn require_secret(State(auth): State<AuthConfig>, request: Request, next: Next) -> Response {
    // Skip auth for health endpoints
    if !auth.is_enabled() || request.uri().path() == HEALTH_PATH {
        return next.run(request).await;
    }

    if auth.accepts(request.headers()) {
        return next.run(request).await;
    }

    tracing::warn!(
        method = %request.method(),
        path = %request.uri().path(),
        "rejected unauthenticated call"
    );
    ApiError::from(GatewayError::Unauthenticated).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(name: &'static str, value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(name, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_accepts_bearer_and_api_key() {
        let auth = AuthConfig::new(Some(SecretString::from("s3cret".to_string())));

        assert!(auth.accepts(&headers("authorization", "Bearer s3cret")));
        assert!(auth.accepts(&headers("x-api-key", "s3cret")));
        assert!(!auth.accepts(&headers("authorization", "Bearer wrong!")));
        assert!(!auth.accepts(&headers("authorization", "s3cret")));
        assert!(!auth.accepts(&HeaderMap::new()));
    }

    #[test]
    fn test_without_secret_everything_is_accepted() {
        let auth = AuthConfig::new(None);
        assert!(!auth.is_enabled());
        assert!(auth.accepts(&HeaderMap::new()));
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq("abc", "abc"));
        assert!(!constant_time_eq("abc", "abd"));
        assert!(!constant_time_eq("abc", "abcd"));
    }
}
