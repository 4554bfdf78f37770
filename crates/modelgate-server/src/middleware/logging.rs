//! Request logging middleware

use std::pin::Pin;
use std::sync::{Arc, OnceLock};
use std::task::{Context, Poll};
use std::time::Instant;

use axum::{
    body::{to_bytes, Body},
    extract::{MatchedPath, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use http_body::{Frame, SizeHint};
use modelgate::errors::{redact, GatewayError};
use tracing::{error, info, warn};

use super::capture::RequestCapture;
use crate::api_error::{ApiError, ErrorReport};
use crate::routes::{is_streaming, operation_name};

/// Unary bodies larger than this are refused before reaching a handler.
const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;
/// How much of a request ends up in the log line.
const MAX_LOGGED_CHARS: usize = 1024;

enum LoggedRequest {
    Buffered(Bytes),
    Captured(RequestCapture),
}

impl LoggedRequest {
    fn text(&self) -> String {
        let bytes = match self {
            LoggedRequest::Buffered(bytes) => Some(bytes),
            LoggedRequest::Captured(capture) => capture.get(),
        };
        bytes.map(|bytes| render(bytes)).unwrap_or_default()
    }
}

/// Printable, redacted and truncated form of a request body.
fn render(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    let mut text: String = text.chars().take(MAX_LOGGED_CHARS).collect();
    if text.len() < bytes.len() && text.chars().count() == MAX_LOGGED_CHARS {
        text.push_str("...");
    }
    redact(&text)
}

/// Slot through which a streaming handler reports a failure that happened
/// after the response headers went out.
#[derive(Debug, Clone, Default)]
pub struct StreamOutcome(Arc<OnceLock<ErrorReport>>);

impl StreamOutcome {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record why the stream ended early. Later failures are ignored.
    pub fn fail(&self, report: ErrorReport) {
        let _ = self.0.set(report);
    }

    pub fn failure(&self) -> Option<&ErrorReport> {
        self.0.get()
    }
}

/// One access log line, written once the call is over.
struct AccessRecord {
    operation: &'static str,
    request: LoggedRequest,
    start: Instant,
}

impl AccessRecord {
    fn emit(self, status: u16, report: Option<&ErrorReport>, message: &'static str) {
        let operation = self.operation;
        let latency_ms = self.start.elapsed().as_millis() as u64;
        let request = self.request.text();

        match report {
            Some(report) if report.status.is_server_error() => error!(
                operation,
                status,
                reason = report.reason,
                error = %report.detail,
                backtrace = report.backtrace.as_deref().unwrap_or_default(),
                request = %request,
                latency_ms,
                "{}",
                message
            ),
            Some(report) => warn!(
                operation,
                status,
                reason = report.reason,
                error = %report.detail,
                request = %request,
                latency_ms,
                "{}",
                message
            ),
            None => info!(operation, status, request = %request, latency_ms, "{}", message),
        }
    }
}

/// Response body of a running stream. Writes the access record when the body
/// ends or is dropped, so the record carries the stream's real outcome and
/// full latency.
struct LoggedStream {
    inner: Body,
    record: Option<AccessRecord>,
    status: u16,
    outcome: StreamOutcome,
    finished: bool,
}

impl http_body::Body for LoggedStream {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        let polled = Pin::new(&mut this.inner).poll_frame(cx);
        if let Poll::Ready(None) = &polled {
            this.finished = true;
        }
        polled
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

impl Drop for LoggedStream {
    fn drop(&mut self) {
        let Some(record) = self.record.take() else {
            return;
        };
        match self.outcome.failure() {
            // report the status the failure maps to, not the 200 already sent
            Some(report) => record.emit(report.status.as_u16(), Some(report), "stream failed"),
            None if self.finished => record.emit(self.status, None, "stream completed"),
            None => record.emit(self.status, None, "stream abandoned by client"),
        }
    }
}

/// Logs operation, request, status, failure reason and latency for every call.
///
/// Unary bodies are small JSON documents and are read up front. Streaming calls
/// are never read here; the capture layer on those routes fills in the first
/// message as the handler consumes it, and the record is deferred until the
/// stream ends.
pub async fn log_call(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|matched| matched.as_str().to_owned())
        .unwrap_or_else(|| request.uri().path().to_owned());
    let operation = operation_name(&path);

    let (request, logged, outcome) = if is_streaming(operation) {
        let capture = RequestCapture::new();
        let outcome = StreamOutcome::new();
        let mut request = request;
        request.extensions_mut().insert(capture.clone());
        request.extensions_mut().insert(outcome.clone());
        (request, LoggedRequest::Captured(capture), Some(outcome))
    } else {
        let (parts, body) = request.into_parts();
        match to_bytes(body, MAX_BODY_BYTES).await {
            Ok(bytes) => (
                Request::from_parts(parts, Body::from(bytes.clone())),
                LoggedRequest::Buffered(bytes),
                None,
            ),
            Err(err) => {
                let err = GatewayError::InvalidRequest(format!("unreadable request body: {}", err));
                warn!(operation, error = %err, "call failed");
                return ApiError::from(err).into_response();
            }
        }
    };

    let response = next.run(request).await;

    let record = AccessRecord {
        operation,
        request: logged,
        start,
    };
    let status = response.status().as_u16();
    let report = response.extensions().get::<ErrorReport>().cloned();

    match (outcome, report) {
        (Some(outcome), None) if response.status().is_success() => response.map(|body| {
            Body::new(LoggedStream {
                inner: body,
                record: Some(record),
                status,
                outcome,
                finished: false,
            })
        }),
        (outcome, Some(mut report)) => {
            // a stream that panicked before its first chunk left the trace here
            if report.backtrace.is_none() {
                report.backtrace = outcome
                    .as_ref()
                    .and_then(StreamOutcome::failure)
                    .and_then(|failure| failure.backtrace.clone());
            }
            record.emit(status, Some(&report), "call failed");
            response
        }
        (_, None) => {
            record.emit(status, None, "call completed");
            response
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_redacts_and_truncates() {
        let rendered = render(br#"{"api_key":"sk-abcdef1234567890"}"#);
        assert!(!rendered.contains("sk-abcdef1234567890"));
        assert!(rendered.contains("[redacted]"));

        let long = "x".repeat(MAX_LOGGED_CHARS + 10);
        let rendered = render(long.as_bytes());
        assert_eq!(rendered.len(), MAX_LOGGED_CHARS + 3);
        assert!(rendered.ends_with("..."));
    }

    #[test]
    fn test_stream_outcome_keeps_first_failure() {
        let outcome = StreamOutcome::new();
        assert!(outcome.failure().is_none());

        outcome.fail(ErrorReport::new(&GatewayError::UpstreamTransport("reset".into())));
        outcome.fail(ErrorReport::new(&GatewayError::Cancelled));
        assert_eq!(outcome.failure().unwrap().reason, "UPSTREAM_TRANSPORT");
    }

    #[tokio::test]
    async fn test_logged_stream_forwards_frames() {
        use http_body_util::BodyExt;

        let chunks: Vec<Result<Bytes, std::io::Error>> =
            vec![Ok(Bytes::from_static(b"a")), Ok(Bytes::from_static(b"b"))];
        let body = LoggedStream {
            inner: Body::from_stream(futures::stream::iter(chunks)),
            record: Some(AccessRecord {
                operation: "ChatStream",
                request: LoggedRequest::Captured(RequestCapture::new()),
                start: Instant::now(),
            }),
            status: 200,
            outcome: StreamOutcome::new(),
            finished: false,
        };

        let collected = body.collect().await.unwrap().to_bytes();
        assert_eq!(collected, Bytes::from_static(b"ab"));
    }

    #[test]
    fn test_captured_request_text() {
        let capture = RequestCapture::new();
        let logged = LoggedRequest::Captured(capture);
        assert_eq!(logged.text(), "");
    }
}
