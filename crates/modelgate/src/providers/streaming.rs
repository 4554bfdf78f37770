//! Shared plumbing for streamed chat responses.
//!
//! Each adapter supplies a [`StreamDecoder`] that turns one server-sent event
//! into normalized [`StreamEvent`]s. [`pump_stream`] drives the decoder over the
//! upstream event stream and hands the events to a [`ChunkAssembler`], which
//! numbers the chunks and decides which one is terminal.

use eventsource_stream::{EventStreamError, Eventsource};
use futures::{Stream, StreamExt};

use super::base::ChunkSink;
use crate::context::CallContext;
use crate::errors::{redact, GatewayError, GatewayResult};
use crate::models::chat::{ChatResponseChunk, ChunkDelta, FinishReason, Usage};

pub use eventsource_stream::Event;

/// A normalized fact extracted from one upstream event.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Delta(ChunkDelta),
    Finish(FinishReason),
    Usage(Usage),
    /// The upstream declared the stream complete.
    Done,
}

pub trait StreamDecoder: Send {
    fn decode(&mut self, event: &Event) -> GatewayResult<Vec<StreamEvent>>;
}

/// Turn an upstream response body into a stream of server-sent events.
pub fn sse_events(
    response: reqwest::Response,
) -> impl Stream<Item = GatewayResult<Event>> + Send {
    response.bytes_stream().eventsource().map(|event| match event {
        Ok(event) => Ok(event),
        // Any failure reading the body mid-stream is a broken connection
        Err(EventStreamError::Transport(err)) => Err(GatewayError::UpstreamTransport(redact(
            &err.without_url().to_string(),
        ))),
        Err(err) => Err(GatewayError::TranslationFailure(format!(
            "malformed event stream: {}",
            err
        ))),
    })
}

/// Builds the outgoing chunk sequence.
///
/// Content arriving before the finish signal goes out immediately. Once a
/// finish reason is known the terminal chunk is held back so that usage and any
/// trailing content reported afterwards can be merged into it; it is emitted
/// when the upstream says it is done, or at end of input.
pub struct ChunkAssembler {
    id: String,
    model: String,
    sequence: u64,
    usage: Option<Usage>,
    finish_reason: Option<FinishReason>,
    trailing: ChunkDelta,
    completed: bool,
}

impl ChunkAssembler {
    pub fn new<I: Into<String>, M: Into<String>>(id: I, model: M) -> Self {
        Self {
            id: id.into(),
            model: model.into(),
            sequence: 0,
            usage: None,
            finish_reason: None,
            trailing: ChunkDelta::default(),
            completed: false,
        }
    }

    fn chunk(&mut self, delta: ChunkDelta, is_final: bool) -> ChatResponseChunk {
        let chunk = ChatResponseChunk {
            id: self.id.clone(),
            model: self.model.clone(),
            sequence: self.sequence,
            delta,
            is_final,
            finish_reason: None,
            usage: None,
        };
        self.sequence += 1;
        chunk
    }

    /// Apply one event. Returns `true` once the terminal chunk has been emitted.
    pub async fn apply(&mut self, event: StreamEvent, sink: &mut dyn ChunkSink) -> GatewayResult<bool> {
        if self.completed {
            return Ok(true);
        }

        match event {
            StreamEvent::Delta(delta) if delta.is_empty() => {}
            StreamEvent::Delta(delta) if self.finish_reason.is_some() => self.trailing.append(delta),
            StreamEvent::Delta(delta) => {
                let chunk = self.chunk(delta, false);
                sink.emit(chunk).await?;
            }
            StreamEvent::Finish(reason) => self.finish_reason = Some(reason),
            StreamEvent::Usage(usage) => match self.usage.as_mut() {
                Some(existing) => existing.merge(usage),
                None => self.usage = Some(usage),
            },
            StreamEvent::Done => {
                self.emit_terminal(sink).await?;
            }
        }
        Ok(self.completed)
    }

    async fn emit_terminal(&mut self, sink: &mut dyn ChunkSink) -> GatewayResult<()> {
        let delta = std::mem::take(&mut self.trailing);
        let mut chunk = self.chunk(delta, true);
        chunk.finish_reason = Some(self.finish_reason.unwrap_or(FinishReason::Stop));
        chunk.usage = self.usage;
        self.completed = true;
        sink.emit(chunk).await
    }

    /// Handle end of input. A stream that never reported a finish is an error.
    pub async fn finish(&mut self, sink: &mut dyn ChunkSink) -> GatewayResult<()> {
        if self.completed {
            return Ok(());
        }
        if self.finish_reason.is_none() {
            return Err(GatewayError::UpstreamTransport(
                "upstream closed the stream before completion".to_string(),
            ));
        }
        self.emit_terminal(sink).await
    }
}

/// Drive `events` through `decoder` into `sink` until the stream completes.
///
/// Stops reading upstream as soon as the sink refuses a chunk, the call is
/// cancelled, or the deadline passes.
pub async fn pump_stream<S, D>(
    ctx: &CallContext,
    events: S,
    mut decoder: D,
    mut assembler: ChunkAssembler,
    sink: &mut dyn ChunkSink,
) -> GatewayResult<()>
where
    S: Stream<Item = GatewayResult<Event>> + Send,
    D: StreamDecoder,
{
    futures::pin_mut!(events);

    loop {
        let next = ctx
            .guard(async { Ok::<_, GatewayError>(events.next().await) })
            .await?;
        let Some(event) = next else {
            return assembler.finish(sink).await;
        };

        let event = event?;
        if event.data.trim().is_empty() {
            continue;
        }

        for decoded in decoder.decode(&event)? {
            if assembler.apply(decoded, sink).await? {
                tracing::debug!(chunks = assembler.sequence, "stream completed");
                return Ok(());
            }
        }
    }
}
