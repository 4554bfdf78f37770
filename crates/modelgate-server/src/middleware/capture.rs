//! First-message capture for streaming calls.
//!
//! The logging middleware runs before the handler has read anything, and for a
//! streaming call it must not read the body itself. Instead it leaves an empty
//! [`RequestCapture`] in the request extensions; this layer wraps the body so
//! that the first data frame the handler pulls is copied into that slot and
//! handed on untouched.

use std::pin::Pin;
use std::sync::{Arc, OnceLock};
use std::task::{Context, Poll};

use axum::{
    body::Body,
    extract::Request,
    middleware::Next,
    response::Response,
};
use bytes::Bytes;
use http_body::{Frame, SizeHint};

/// Slot holding the first message received on a call.
#[derive(Debug, Clone, Default)]
pub struct RequestCapture(Arc<OnceLock<Bytes>>);

impl RequestCapture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<&Bytes> {
        self.0.get()
    }

    fn record(&self, data: &Bytes) {
        // Only the first frame is kept
        let _ = self.0.set(data.clone());
    }
}

/// Body wrapper that observes frames without buffering or altering them.
pub struct CapturingBody {
    inner: Body,
    capture: RequestCapture,
}

impl CapturingBody {
    pub fn new(inner: Body, capture: RequestCapture) -> Self {
        Self { inner, capture }
    }
}

impl http_body::Body for CapturingBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        let polled = Pin::new(&mut this.inner).poll_frame(cx);
        if let Poll::Ready(Some(Ok(frame))) = &polled {
            if let Some(data) = frame.data_ref().filter(|data| !data.is_empty()) {
                this.capture.record(data);
            }
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

/// Installed on streaming routes only.
pub async fn capture_first_message(request: Request, next: Next) -> Response {
    let (parts, body) = request.into_parts();
    let capture = parts
        .extensions
        .get::<RequestCapture>()
        .cloned()
        .unwrap_or_default();

    let body = Body::new(CapturingBody::new(body, capture));
    next.run(Request::from_parts(parts, body)).await
}
