use std::convert::Infallible;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use axum::{
    extract::{rejection::JsonRejection, State},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::post,
    Extension, Json, Router,
};
use futures::{FutureExt, Stream, StreamExt};
use modelgate::errors::{ErrorKind, GatewayError, GatewayResult};
use modelgate::models::chat::{ChatResponse, ChatResponseChunk};
use modelgate::providers::base::ChunkSink;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::{CancellationToken, DropGuard};

use super::dto::{parse_json, ChatRequestBody};
use super::{CHAT_PATH, CHAT_STREAM_PATH};
use crate::api_error::{error_body, ApiError, ErrorReport};
use crate::logging::{panic_message, take_panic_backtrace};
use crate::middleware::capture::capture_first_message;
use crate::middleware::StreamOutcome;
use crate::state::AppState;

type StreamItem = GatewayResult<ChatResponseChunk>;

/// Hands chunks from the stream task to the response body. A closed channel
/// means the client went away.
struct ChannelSink {
    tx: mpsc::Sender<StreamItem>,
}

#[async_trait]
impl ChunkSink for ChannelSink {
    async fn emit(&mut self, chunk: ChatResponseChunk) -> GatewayResult<()> {
        self.tx
            .send(Ok(chunk))
            .await
            .map_err(|_| GatewayError::Cancelled)
    }
}

fn to_event(item: StreamItem) -> Event {
    let failure = match item {
        Ok(chunk) => match Event::default().event("chunk").json_data(&chunk) {
            Ok(event) => return event,
            Err(err) => GatewayError::Internal(format!("could not encode chunk: {}", err)),
        },
        Err(err) => err,
    };
    Event::default()
        .event("error")
        .data(error_body(&failure).to_string())
}

/// SSE body of a chat stream. Dropping it (the client disconnected) cancels the
/// upstream call through the held guard.
pub struct SseResponse {
    first: Option<StreamItem>,
    rx: ReceiverStream<StreamItem>,
    _cancel: DropGuard,
}

impl Stream for SseResponse {
    type Item = Result<Event, Infallible>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if let Some(item) = this.first.take() {
            return Poll::Ready(Some(Ok(to_event(item))));
        }
        Pin::new(&mut this.rx)
            .poll_next(cx)
            .map(|item| item.map(|item| Ok(to_event(item))))
    }
}

impl IntoResponse for SseResponse {
    fn into_response(self) -> Response {
        Sse::new(self).keep_alive(KeepAlive::default()).into_response()
    }
}

async fn chat_handler(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequestBody>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let request = parse_json(payload)?.into_request()?;
    let ctx = state.call_context(CancellationToken::new());

    let response = state.chat.chat(&ctx, request).await?;
    Ok(Json(response))
}

async fn chat_stream_handler(
    State(state): State<AppState>,
    outcome: Option<Extension<StreamOutcome>>,
    payload: Result<Json<ChatRequestBody>, JsonRejection>,
) -> Result<SseResponse, ApiError> {
    let request = parse_json(payload)?.into_request()?;

    let cancel = CancellationToken::new();
    let guard = cancel.clone().drop_guard();
    let ctx = state.call_context(cancel);
    let (tx, rx) = mpsc::channel(state.stream_buffer);
    let chat = state.chat.clone();

    tokio::spawn(async move {
        let mut sink = ChannelSink { tx: tx.clone() };
        let mut backtrace = None;
        let result = AssertUnwindSafe(chat.chat_stream(&ctx, request, &mut sink))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| {
                backtrace = take_panic_backtrace();
                Err(GatewayError::Internal(panic_message(payload.as_ref())))
            });

        match result {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::Cancelled => {
                tracing::debug!(error = %err, "stream cancelled by client");
            }
            Err(err) => {
                // the access log reads this once the response body ends
                if let Some(Extension(outcome)) = &outcome {
                    outcome.fail(ErrorReport::new(&err).with_backtrace(backtrace));
                }
                let _ = tx.send(Err(err)).await;
            }
        }
    });

    // A failure before the first chunk still gets a proper status code
    let mut rx = ReceiverStream::new(rx);
    let first = match rx.next().await {
        Some(Ok(chunk)) => Ok(chunk),
        Some(Err(err)) => return Err(err.into()),
        None => {
            return Err(GatewayError::Internal("stream ended without output".to_string()).into())
        }
    };

    Ok(SseResponse {
        first: Some(first),
        rx,
        _cancel: guard,
    })
}

// Configure routes for this module
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route(CHAT_PATH, post(chat_handler))
        .route(
            CHAT_STREAM_PATH,
            post(chat_stream_handler).layer(axum::middleware::from_fn(capture_first_message)),
        )
        .with_state(state)
}
