use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::spec::Capability;

lazy_static! {
    static ref CREDENTIAL_PATTERN: Regex =
        Regex::new(r"(sk-[A-Za-z0-9_\-]{6,}|AIza[0-9A-Za-z_\-]{10,}|Bearer\s+[A-Za-z0-9._\-]{6,})")
            .unwrap();
}

/// Why an upstream provider refused a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RejectReason {
    Auth,
    RateLimited,
    InvalidRequest,
    Other,
}

/// Stable classification of a [`GatewayError`], independent of its message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ModelNotFound,
    Unsupported,
    UnsupportedRole,
    TranslationFailure,
    InvalidRequest,
    UpstreamTransport,
    UpstreamRejected(RejectReason),
    Unauthenticated,
    Cancelled,
    Internal,
}

impl ErrorKind {
    /// Machine-readable reason string exposed to callers.
    pub fn reason(&self) -> &'static str {
        match self {
            ErrorKind::ModelNotFound => "MODEL_NOT_FOUND",
            ErrorKind::Unsupported => "UNSUPPORTED",
            ErrorKind::UnsupportedRole => "UNSUPPORTED_ROLE",
            ErrorKind::TranslationFailure => "TRANSLATION_FAILURE",
            ErrorKind::InvalidRequest => "INVALID_REQUEST",
            ErrorKind::UpstreamTransport => "UPSTREAM_TRANSPORT",
            ErrorKind::UpstreamRejected(RejectReason::Auth) => "UPSTREAM_AUTH_FAILED",
            ErrorKind::UpstreamRejected(RejectReason::RateLimited) => "UPSTREAM_RATE_LIMITED",
            ErrorKind::UpstreamRejected(RejectReason::InvalidRequest) => {
                "UPSTREAM_INVALID_REQUEST"
            }
            ErrorKind::UpstreamRejected(RejectReason::Other) => "UPSTREAM_REJECTED",
            ErrorKind::Unauthenticated => "UNAUTHENTICATED",
            ErrorKind::Cancelled => "CANCELLED",
            ErrorKind::Internal => "INTERNAL",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::UpstreamTransport)
    }
}

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("{provider} does not support {capability}")]
    Unsupported {
        provider: String,
        capability: Capability,
    },

    #[error("{provider} cannot represent role '{role}'")]
    UnsupportedRole { provider: String, role: String },

    #[error("Translation failure: {0}")]
    TranslationFailure(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Upstream transport error: {0}")]
    UpstreamTransport(String),

    #[error("Upstream rejected the request ({reason}): {message}")]
    UpstreamRejected {
        reason: RejectReason,
        status: Option<u16>,
        message: String,
    },

    #[error("Unauthenticated")]
    Unauthenticated,

    #[error("Request cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("model '{model}': {source}")]
    Model {
        model: String,
        #[source]
        source: Box<GatewayError>,
    },
}

pub type GatewayResult<T> = Result<T, GatewayError>;

impl GatewayError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GatewayError::ModelNotFound(_) => ErrorKind::ModelNotFound,
            GatewayError::Unsupported { .. } => ErrorKind::Unsupported,
            GatewayError::UnsupportedRole { .. } => ErrorKind::UnsupportedRole,
            GatewayError::TranslationFailure(_) => ErrorKind::TranslationFailure,
            GatewayError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            GatewayError::UpstreamTransport(_) => ErrorKind::UpstreamTransport,
            GatewayError::UpstreamRejected { reason, .. } => ErrorKind::UpstreamRejected(*reason),
            GatewayError::Unauthenticated => ErrorKind::Unauthenticated,
            GatewayError::Cancelled => ErrorKind::Cancelled,
            GatewayError::Configuration(_) | GatewayError::Internal(_) => ErrorKind::Internal,
            GatewayError::Model { source, .. } => source.kind(),
        }
    }

    /// Attach the originating model id without changing the classification.
    pub fn with_model(self, model: impl Into<String>) -> Self {
        match self {
            already @ GatewayError::Model { .. } => already,
            other => GatewayError::Model {
                model: model.into(),
                source: Box::new(other),
            },
        }
    }

    pub fn unsupported(provider: impl Into<String>, capability: Capability) -> Self {
        GatewayError::Unsupported {
            provider: provider.into(),
            capability,
        }
    }

    pub fn unsupported_role(provider: impl Into<String>, role: impl Into<String>) -> Self {
        GatewayError::UnsupportedRole {
            provider: provider.into(),
            role: role.into(),
        }
    }

    pub fn rejected(reason: RejectReason, status: Option<u16>, message: impl AsRef<str>) -> Self {
        GatewayError::UpstreamRejected {
            reason,
            status,
            message: redact(message.as_ref()),
        }
    }

    /// Message safe to return to a caller. Internal failures never expose detail.
    pub fn public_message(&self) -> String {
        match self.kind() {
            ErrorKind::Internal => "internal error".to_string(),
            _ => redact(&self.to_string()),
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return GatewayError::TranslationFailure(format!(
                "could not decode upstream response: {}",
                err
            ));
        }
        if err.is_timeout() {
            return GatewayError::UpstreamTransport("upstream request timed out".to_string());
        }
        // reqwest embeds the request URL in its Display output; drop it so query
        // string credentials never reach a caller.
        GatewayError::UpstreamTransport(redact(&err.without_url().to_string()))
    }
}

/// Mask substrings that look like provider credentials.
pub fn redact(message: &str) -> String {
    CREDENTIAL_PATTERN.replace_all(message, "[redacted]").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_model_keeps_kind() {
        let err = GatewayError::UpstreamTransport("connection reset".to_string()).with_model("gpt-4o");
        assert_eq!(err.kind(), ErrorKind::UpstreamTransport);
        assert!(err.kind().is_retryable());
        assert_eq!(
            err.to_string(),
            "model 'gpt-4o': Upstream transport error: connection reset"
        );

        // Wrapping twice keeps the first model id
        let err = err.with_model("other");
        assert!(err.to_string().starts_with("model 'gpt-4o'"));
    }

    #[test]
    fn test_reason_strings() {
        assert_eq!(ErrorKind::ModelNotFound.reason(), "MODEL_NOT_FOUND");
        assert_eq!(
            GatewayError::rejected(RejectReason::RateLimited, Some(429), "slow down")
                .kind()
                .reason(),
            "UPSTREAM_RATE_LIMITED"
        );
        assert_eq!(
            GatewayError::Configuration("missing".into()).kind(),
            ErrorKind::Internal
        );
    }

    #[test]
    fn test_public_message_hides_internal_detail() {
        let err = GatewayError::Internal("index out of bounds at src/lib.rs:10".to_string());
        assert_eq!(err.public_message(), "internal error");
    }

    #[test]
    fn test_redact_credentials() {
        let message = "Incorrect API key provided: sk-proj-abcdef123456. Use Bearer abc.def-123456";
        let redacted = redact(message);
        assert!(!redacted.contains("sk-proj-abcdef123456"));
        assert!(!redacted.contains("abc.def-123456"));
        assert_eq!(redacted.matches("[redacted]").count(), 2);

        let err = GatewayError::rejected(
            RejectReason::Auth,
            Some(401),
            "key AIzaSyA1234567890abcdef is invalid",
        );
        assert!(!err.public_message().contains("AIzaSy"));
    }
}
