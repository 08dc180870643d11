//! Server-sent-events framing for streamed Messages API responses.
//!
//! The body is read as lines: blank lines and `:` comments are ignored, `data:` lines carry a
//! JSON event, and a `[DONE]` payload ends the stream. A frame that does not decode is skipped
//! so one bad line cannot take down an otherwise healthy stream.

use std::collections::VecDeque;
use std::pin::Pin;

use futures_util::stream::{self, BoxStream, Stream, StreamExt};

use crate::llm::{LlmError, StreamEvent};

/// Sentinel payload that terminates the stream.
const DONE_SENTINEL: &str = "[DONE]";

/// What a single SSE line means to the consumer.
#[derive(Debug, Clone, PartialEq)]
pub enum SseLine {
    /// Blank, comment, non-`data` field, or undecodable payload.
    Skip,
    /// `data: [DONE]`.
    Done,
    Event(StreamEvent),
}

/// Classify one line of the body (without its line terminator).
pub fn parse_sse_line(line: &str) -> SseLine {
    let line = line.trim();
    if line.is_empty() || line.starts_with(':') {
        return SseLine::Skip;
    }
    let Some(payload) = line.strip_prefix("data:") else {
        return SseLine::Skip;
    };
    let payload = payload.trim();
    if payload == DONE_SENTINEL {
        return SseLine::Done;
    }
    match serde_json::from_str::<StreamEvent>(payload) {
        Ok(ev) => SseLine::Event(ev),
        Err(e) => {
            log::debug!("sse: skipping malformed event ({}): {}", e, payload);
            SseLine::Skip
        }
    }
}

/// Splits an arbitrarily chunked byte stream into lines.
#[derive(Debug, Default)]
pub struct SseLineDecoder {
    buffer: Vec<u8>,
}

impl SseLineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk; returns every line completed by it, in order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(i) = self.buffer.iter().position(|&b| b == b'\n') {
            let mut line_bytes: Vec<u8> = self.buffer.drain(..i).collect();
            self.buffer.drain(..1);
            if line_bytes.last() == Some(&b'\r') {
                line_bytes.pop();
            }
            lines.push(String::from_utf8_lossy(&line_bytes).into_owned());
        }
        lines
    }

    /// Remaining bytes after the body ended without a final newline.
    pub fn finish(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.buffer);
        Some(String::from_utf8_lossy(&rest).into_owned())
    }
}

struct SseState<S> {
    body: Pin<Box<S>>,
    decoder: SseLineDecoder,
    pending: VecDeque<String>,
    body_done: bool,
    finished: bool,
}

/// Turn a chunked response body into a lazy, single-pass stream of events.
///
/// Reads from `body` only when the consumer polls, and stops reading at `[DONE]`. A read error
/// is yielded once and ends the stream. Dropping the returned stream drops the body.
pub fn sse_events<S, B, E>(body: S) -> BoxStream<'static, Result<StreamEvent, LlmError>>
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let state = SseState {
        body: Box::pin(body),
        decoder: SseLineDecoder::new(),
        pending: VecDeque::new(),
        body_done: false,
        finished: false,
    };
    stream::unfold(state, |mut st| async move {
        loop {
            if st.finished {
                return None;
            }
            while let Some(line) = st.pending.pop_front() {
                match parse_sse_line(&line) {
                    SseLine::Skip => continue,
                    SseLine::Done => {
                        st.finished = true;
                        return None;
                    }
                    SseLine::Event(ev) => return Some((Ok(ev), st)),
                }
            }
            if st.body_done {
                st.finished = true;
                return None;
            }
            match st.body.next().await {
                Some(Ok(chunk)) => {
                    let lines = st.decoder.push(chunk.as_ref());
                    st.pending.extend(lines);
                }
                Some(Err(e)) => {
                    st.finished = true;
                    return Some((Err(LlmError::Stream(e.to_string())), st));
                }
                None => {
                    st.body_done = true;
                    if let Some(rest) = st.decoder.finish() {
                        st.pending.push_back(rest);
                    }
                }
            }
        }
    })
    .boxed()
}
