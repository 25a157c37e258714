//! Incremental delivery of answer text to a consumer.
//!
//! Replayed text (greetings, cache hits) and live model output are both a
//! [`TextSource`]; [`pump`] forwards either one as `content` events and
//! returns the accumulated text.

use futures::stream::{self, Stream, StreamExt};
use ragline_core::{AppError, AppResult};
use ragline_llm::LlmStream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::mpsc;
use unicode_segmentation::UnicodeSegmentation;

/// One record sent to the consumer.
///
/// Serialized as `{"content": ..}`, `{"done": true, "finalContent": ..}` or
/// `{"error": ..}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StreamEvent {
    Done {
        done: bool,
        #[serde(rename = "finalContent")]
        final_content: String,
    },
    Error {
        error: String,
    },
    Content {
        content: String,
    },
}

impl StreamEvent {
    pub fn content(text: impl Into<String>) -> Self {
        StreamEvent::Content { content: text.into() }
    }

    pub fn done(final_content: impl Into<String>) -> Self {
        StreamEvent::Done {
            done: true,
            final_content: final_content.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        StreamEvent::Error { error: message.into() }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, StreamEvent::Content { .. })
    }

    /// One-line JSON record.
    pub fn to_json(&self) -> AppResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Text fragments to deliver, in order.
pub type TextSource = Pin<Box<dyn Stream<Item = AppResult<String>> + Send>>;

/// Split `text` into pieces of at most `chunk_chars` grapheme clusters.
pub fn chunk_text(text: &str, chunk_chars: usize) -> Vec<String> {
    let size = chunk_chars.max(1);
    let graphemes: Vec<&str> = text.graphemes(true).collect();
    graphemes.chunks(size).map(|c| c.concat()).collect()
}

/// Replay fixed text in chunks, sleeping `pacing` between them.
pub fn replay(text: &str, chunk_chars: usize, pacing: Duration) -> TextSource {
    let chunks = chunk_text(text, chunk_chars);

    Box::pin(stream::iter(chunks.into_iter().enumerate()).then(move |(i, chunk)| async move {
        if i > 0 && !pacing.is_zero() {
            tokio::time::sleep(pacing).await;
        }
        Ok::<_, AppError>(chunk)
    }))
}

/// Adapt a model stream, failing if no chunk arrives within `idle_timeout`.
///
/// The upstream stream is dropped as soon as it finishes or fails.
pub fn live(upstream: LlmStream, idle_timeout: Duration) -> TextSource {
    Box::pin(stream::unfold(Some(upstream), move |state| async move {
        let mut upstream = state?;

        match tokio::time::timeout(idle_timeout, upstream.next()).await {
            Err(_) => Some((
                Err(AppError::ModelStream(format!(
                    "No output from model for {:?}",
                    idle_timeout
                ))),
                None,
            )),
            Ok(None) => None,
            Ok(Some(Err(e))) => Some((Err(into_model_stream_error(e)), None)),
            Ok(Some(Ok(chunk))) if chunk.done => {
                if chunk.content.is_empty() {
                    None
                } else {
                    Some((Ok(chunk.content), None))
                }
            }
            Ok(Some(Ok(chunk))) => Some((Ok(chunk.content), Some(upstream))),
        }
    }))
}

pub(crate) fn into_model_stream_error(err: AppError) -> AppError {
    match err {
        AppError::ModelStream(_) => err,
        other => AppError::ModelStream(other.to_string()),
    }
}

/// Sending half of a request's event channel.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::Sender<StreamEvent>,
}

impl EventSink {
    /// Returns `false` once the consumer is gone.
    pub async fn send(&self, event: StreamEvent) -> bool {
        self.tx.send(event).await.is_ok()
    }

    /// Resolves when the consumer drops its [`EventStream`].
    pub async fn closed(&self) {
        self.tx.closed().await
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Receiving half handed to the consumer. Dropping it cancels the request.
#[derive(Debug)]
pub struct EventStream {
    rx: mpsc::Receiver<StreamEvent>,
}

impl EventStream {
    pub async fn recv(&mut self) -> Option<StreamEvent> {
        self.rx.recv().await
    }
}

impl Stream for EventStream {
    type Item = StreamEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// A bounded event channel.
pub fn event_channel(capacity: usize) -> (EventSink, EventStream) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (EventSink { tx }, EventStream { rx })
}

/// How a [`pump`] ended without error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PumpOutcome {
    /// The source finished; carries the full delivered text.
    Completed(String),
    /// The consumer went away; the source was abandoned.
    Disconnected,
}

/// Forward `source` to `sink` as content events.
///
/// Empty fragments are skipped. Stops pulling from the source as soon as
/// the consumer disconnects, and reports [`PumpOutcome::Disconnected`] when
/// the consumer left before the answer could be completed.
pub async fn pump(mut source: TextSource, sink: &EventSink) -> AppResult<PumpOutcome> {
    let mut delivered = String::new();

    loop {
        let next = tokio::select! {
            biased;
            _ = sink.closed() => return Ok(PumpOutcome::Disconnected),
            next = source.next() => next,
        };

        match next {
            // Everything may be buffered while the consumer is already gone
            None if sink.is_closed() => return Ok(PumpOutcome::Disconnected),
            None => return Ok(PumpOutcome::Completed(delivered)),
            Some(Err(e)) => return Err(e),
            Some(Ok(fragment)) if fragment.is_empty() => continue,
            Some(Ok(fragment)) => {
                delivered.push_str(&fragment);
                if !sink.send(StreamEvent::content(fragment)).await {
                    return Ok(PumpOutcome::Disconnected);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragline_llm::LlmStreamChunk;

    async fn drain(mut events: EventStream) -> Vec<StreamEvent> {
        let mut out = Vec::new();
        while let Some(event) = events.recv().await {
            out.push(event);
        }
        out
    }

    #[test]
    fn test_event_json_shapes() {
        assert_eq!(
            serde_json::to_string(&StreamEvent::content("Hel")).unwrap(),
            r#"{"content":"Hel"}"#
        );
        assert_eq!(
            serde_json::to_string(&StreamEvent::done("Hello")).unwrap(),
            r#"{"done":true,"finalContent":"Hello"}"#
        );
        assert_eq!(
            serde_json::to_string(&StreamEvent::error("boom")).unwrap(),
            r#"{"error":"boom"}"#
        );

        let parsed: StreamEvent = serde_json::from_str(r#"{"done":true,"finalContent":"x"}"#).unwrap();
        assert!(parsed.is_terminal());
    }

    #[test]
    fn test_chunk_text() {
        let text = "a".repeat(120);
        let chunks = chunk_text(&text, 50);
        assert_eq!(chunks.iter().map(|c| c.len()).collect::<Vec<_>>(), vec![50, 50, 20]);
        assert_eq!(chunks.concat(), text);
        assert!(chunk_text("", 50).is_empty());
    }

    #[test]
    fn test_chunk_text_keeps_graphemes_whole() {
        let text = "e\u{301}".repeat(3);
        let chunks = chunk_text(&text, 2);
        assert_eq!(chunks, vec!["e\u{301}e\u{301}".to_string(), "e\u{301}".to_string()]);
    }

    #[tokio::test]
    async fn test_pump_replay_completes_with_full_text() {
        let text = "Returns are accepted within 30 days of delivery, no questions asked.";
        let (sink, events) = event_channel(128);

        let outcome = pump(replay(text, 50, Duration::from_millis(1)), &sink).await.unwrap();
        drop(sink);

        assert_eq!(outcome, PumpOutcome::Completed(text.to_string()));
        let events = drain(events).await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], StreamEvent::content(&text[..50]));
    }

    #[tokio::test]
    async fn test_pump_stops_when_consumer_drops() {
        let (sink, events) = event_channel(4);
        drop(events);

        let outcome = pump(replay("some text", 50, Duration::ZERO), &sink).await.unwrap();
        assert_eq!(outcome, PumpOutcome::Disconnected);
    }

    #[tokio::test]
    async fn test_pump_consumer_gone_at_end_of_source() {
        let (sink, events) = event_channel(16);

        // The consumer leaves after the last fragment is buffered, right as
        // the source runs out.
        let tail = stream::unfold(Some(events), |events| async move {
            drop(events);
            None::<(AppResult<String>, Option<EventStream>)>
        });
        let source: TextSource =
            Box::pin(stream::iter(vec![Ok("All of it".to_string())]).chain(tail));

        let outcome = pump(source, &sink).await.unwrap();
        assert_eq!(outcome, PumpOutcome::Disconnected);
    }

    #[tokio::test]
    async fn test_live_skips_empty_and_stops_at_done() {
        let chunks: Vec<AppResult<LlmStreamChunk>> = vec![
            Ok(LlmStreamChunk::delta("", "m")),
            Ok(LlmStreamChunk::delta("Thirty ", "m")),
            Ok(LlmStreamChunk::delta("days.", "m")),
            Ok(LlmStreamChunk::finished("m", None)),
            Ok(LlmStreamChunk::delta("ignored", "m")),
        ];
        let upstream: LlmStream = Box::pin(stream::iter(chunks));
        let (sink, events) = event_channel(16);

        let outcome = pump(live(upstream, Duration::from_secs(5)), &sink).await.unwrap();
        drop(sink);

        assert_eq!(outcome, PumpOutcome::Completed("Thirty days.".to_string()));
        assert_eq!(drain(events).await.len(), 2);
    }

    #[tokio::test]
    async fn test_live_upstream_error_is_model_stream_error() {
        let chunks: Vec<AppResult<LlmStreamChunk>> = vec![
            Ok(LlmStreamChunk::delta("partial", "m")),
            Err(AppError::Llm("connection reset".to_string())),
        ];
        let upstream: LlmStream = Box::pin(stream::iter(chunks));
        let (sink, _events) = event_channel(16);

        let err = pump(live(upstream, Duration::from_secs(5)), &sink).await.unwrap_err();
        assert!(matches!(err, AppError::ModelStream(_)));
    }

    #[tokio::test]
    async fn test_live_idle_timeout() {
        let upstream: LlmStream = Box::pin(stream::pending());
        let (sink, _events) = event_channel(16);

        let err = pump(live(upstream, Duration::from_millis(20)), &sink).await.unwrap_err();
        assert!(err.to_string().contains("No output from model"));
    }
}
