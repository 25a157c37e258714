//! Line framing for streamed HTTP bodies.
//!
//! Both NDJSON (Ollama) and SSE (OpenAI-compatible) bodies are line
//! oriented, but network chunks do not respect line boundaries. Lines are
//! reassembled from raw bytes before UTF-8 decoding so multi-byte
//! characters split across chunks survive.

use futures::stream::{self, Stream, StreamExt};
use ragline_core::{AppError, AppResult};
use std::collections::VecDeque;
use std::fmt::Display;
use std::pin::Pin;

struct LineState<S> {
    inner: Pin<Box<S>>,
    buf: Vec<u8>,
    ready: VecDeque<String>,
    finished: bool,
}

impl<S> LineState<S> {
    fn drain_complete_lines(&mut self) {
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buf.drain(..=pos).collect();
            self.ready.push_back(decode_line(&raw[..raw.len() - 1]));
        }
    }

    fn flush_remainder(&mut self) {
        if !self.buf.is_empty() {
            let raw = std::mem::take(&mut self.buf);
            self.ready.push_back(decode_line(&raw));
        }
    }
}

fn decode_line(raw: &[u8]) -> String {
    let line = String::from_utf8_lossy(raw);
    line.strip_suffix('\r').unwrap_or(&line).to_string()
}

/// Split a byte stream into text lines (without terminators).
///
/// A transport error ends the stream after being yielded once as
/// [`AppError::ModelStream`].
pub fn lines<S, B, E>(bytes: S) -> impl Stream<Item = AppResult<String>> + Send
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send,
    E: Display + Send,
{
    let state = LineState {
        inner: Box::pin(bytes),
        buf: Vec::new(),
        ready: VecDeque::new(),
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(line) = state.ready.pop_front() {
                return Some((Ok(line), state));
            }
            if state.finished {
                return None;
            }
            match state.inner.next().await {
                Some(Ok(chunk)) => {
                    state.buf.extend_from_slice(chunk.as_ref());
                    state.drain_complete_lines();
                }
                Some(Err(e)) => {
                    state.finished = true;
                    state.buf.clear();
                    return Some((
                        Err(AppError::ModelStream(format!("Stream error: {}", e))),
                        state,
                    ));
                }
                None => {
                    state.finished = true;
                    state.flush_remainder();
                }
            }
        }
    })
}
