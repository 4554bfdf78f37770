//! Mapping of gateway errors onto HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use modelgate::errors::{ErrorKind, GatewayError, RejectReason};
use serde_json::{json, Value};

/// Status for 499 "client closed request"; not in the standard table.
fn client_closed_request() -> StatusCode {
    StatusCode::from_u16(499).unwrap_or(StatusCode::BAD_REQUEST)
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::ModelNotFound => StatusCode::NOT_FOUND,
        ErrorKind::Unsupported => StatusCode::NOT_IMPLEMENTED,
        ErrorKind::UnsupportedRole
        | ErrorKind::TranslationFailure
        | ErrorKind::InvalidRequest => StatusCode::BAD_REQUEST,
        ErrorKind::UpstreamTransport => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::UpstreamRejected(RejectReason::RateLimited) => StatusCode::TOO_MANY_REQUESTS,
        ErrorKind::UpstreamRejected(RejectReason::InvalidRequest) => StatusCode::BAD_REQUEST,
        ErrorKind::UpstreamRejected(RejectReason::Auth | RejectReason::Other) => {
            StatusCode::BAD_GATEWAY
        }
        ErrorKind::Unauthenticated => StatusCode::UNAUTHORIZED,
        ErrorKind::Cancelled => client_closed_request(),
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// The `{code, message}` pair returned to callers.
pub fn error_body(err: &GatewayError) -> Value {
    json!({
        "code": err.kind().reason(),
        "message": err.public_message(),
    })
}

/// What the logging middleware records about a failed call. Travels in the
/// response extensions and is never serialized to the caller.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    /// Status the failure maps to
    pub status: StatusCode,
    pub reason: &'static str,
    pub detail: String,
    /// Where the failure started; only known for recovered panics.
    pub backtrace: Option<String>,
}

impl ErrorReport {
    pub fn new(err: &GatewayError) -> Self {
        Self {
            status: status_for(err.kind()),
            reason: err.kind().reason(),
            detail: err.to_string(),
            backtrace: None,
        }
    }

    pub fn with_backtrace(mut self, backtrace: Option<String>) -> Self {
        self.backtrace = backtrace;
        self
    }
}

#[derive(Debug)]
pub struct ApiError(pub GatewayError);

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        ApiError(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        status_for(self.0.kind())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({ "error": error_body(&self.0) });
        let mut response = (self.status(), Json(body)).into_response();
        response.extensions_mut().insert(ErrorReport::new(&self.0));
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (GatewayError::ModelNotFound("m".into()), 404, "MODEL_NOT_FOUND"),
            (GatewayError::unsupported_role("gateway", "robot"), 400, "UNSUPPORTED_ROLE"),
            (GatewayError::TranslationFailure("x".into()), 400, "TRANSLATION_FAILURE"),
            (GatewayError::InvalidRequest("x".into()), 400, "INVALID_REQUEST"),
            (GatewayError::UpstreamTransport("reset".into()), 503, "UPSTREAM_TRANSPORT"),
            (
                GatewayError::rejected(RejectReason::RateLimited, Some(429), "slow"),
                429,
                "UPSTREAM_RATE_LIMITED",
            ),
            (
                GatewayError::rejected(RejectReason::Auth, Some(401), "bad key"),
                502,
                "UPSTREAM_AUTH_FAILED",
            ),
            (
                GatewayError::rejected(RejectReason::InvalidRequest, Some(422), "bad"),
                400,
                "UPSTREAM_INVALID_REQUEST",
            ),
            (
                GatewayError::rejected(RejectReason::Other, Some(418), "teapot"),
                502,
                "UPSTREAM_REJECTED",
            ),
            (GatewayError::Unauthenticated, 401, "UNAUTHENTICATED"),
            (GatewayError::Cancelled, 499, "CANCELLED"),
            (GatewayError::Configuration("x".into()), 500, "INTERNAL"),
        ];

        for (err, status, reason) in cases {
            assert_eq!(status_for(err.kind()).as_u16(), status, "{}", err);
            assert_eq!(error_body(&err)["code"], reason);
        }
    }

    #[tokio::test]
    async fn test_internal_error_response_hides_detail() {
        let err = GatewayError::Internal("attempt to subtract with overflow".into());
        let response = ApiError::from(err).into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let report = response.extensions().get::<ErrorReport>().cloned().unwrap();
        assert!(report.detail.contains("overflow"));
        assert_eq!(report.status, StatusCode::INTERNAL_SERVER_ERROR);
        // nothing to point at: the error was built here, not at a panic site
        assert!(report.backtrace.is_none());

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(
            body,
            json!({"error": {"code": "INTERNAL", "message": "internal error"}})
        );
    }

    #[test]
    fn test_report_includes_model_context() {
        let err = GatewayError::UpstreamTransport("connection reset".into()).with_model("gpt-4o");
        let report = ErrorReport::new(&err);
        assert_eq!(report.reason, "UPSTREAM_TRANSPORT");
        assert_eq!(report.status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(report.detail.starts_with("model 'gpt-4o'"));
        assert!(report.backtrace.is_none());
    }
}
