//! OpenAI-compatible Server-Sent Events decoding.
//!
//! Turns the raw body of a streaming `chat/completions` response into the
//! text fragments carried by `choices[0].delta.content`.

use futures::StreamExt;
use futures::stream::{self, BoxStream};
use serde_json::Value;
use std::collections::VecDeque;
use tracing::{debug, warn};

use super::{BackendError, FragmentStream};

/// What a single `data:` payload means for the consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    Delta(String),
    Done,
    Error(String),
    Ignore,
}

/// Splits a byte stream into complete lines and yields `data:` payloads.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one network chunk and return the payloads of every completed `data:` line.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut payloads = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(payload) = data_payload(&line) {
                payloads.push(payload);
            }
        }
        payloads
    }

    /// Payload of a trailing line that was never terminated by a newline.
    pub fn finish(&mut self) -> Option<String> {
        let line = std::mem::take(&mut self.buffer);
        data_payload(&line)
    }
}

fn data_payload(line: &[u8]) -> Option<String> {
    let line = String::from_utf8_lossy(line);
    let line = line.trim_end_matches(['\r', '\n']);
    line.strip_prefix("data:").map(|data| data.trim_start().to_string())
}

/// Interpret one `data:` payload.
pub fn parse_payload(data: &str) -> SseEvent {
    if data.trim() == "[DONE]" {
        return SseEvent::Done;
    }

    let json: Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(e) => {
            warn!("Failed to parse stream chunk: {} - data: {}", e, data);
            return SseEvent::Ignore;
        }
    };

    if let Some(error) = json.get("error") {
        let message = match error {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        return SseEvent::Error(message);
    }

    json.get("choices")
        .and_then(|c| c.as_array())
        .and_then(|choices| choices.first())
        .and_then(|choice| choice.get("delta"))
        .and_then(|delta| delta.get("content"))
        .and_then(|content| content.as_str())
        .filter(|s| !s.is_empty())
        .map(|s| SseEvent::Delta(s.to_string()))
        .unwrap_or(SseEvent::Ignore)
}

struct DecodeState<B, E> {
    body: BoxStream<'static, Result<B, E>>,
    decoder: SseDecoder,
    pending: VecDeque<Result<String, BackendError>>,
    finished: bool,
}

impl<B, E> DecodeState<B, E> {
    /// Queue the events of some payloads; returns false once the stream has ended.
    fn absorb(&mut self, payloads: Vec<String>) -> bool {
        for payload in payloads {
            match parse_payload(&payload) {
                SseEvent::Delta(text) => self.pending.push_back(Ok(text)),
                SseEvent::Done => return false,
                SseEvent::Error(message) => {
                    self.pending.push_back(Err(BackendError::from_stream_payload(message)));
                    return false;
                }
                SseEvent::Ignore => {}
            }
        }
        true
    }
}

/// Wrap a raw response body into a [`FragmentStream`].
pub fn fragment_stream<S, B, E>(body: S) -> FragmentStream
where
    S: futures::Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let state = DecodeState {
        body: body.boxed(),
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                return Some((item, state));
            }
            if state.finished {
                return None;
            }

            match state.body.next().await {
                Some(Ok(chunk)) => {
                    let payloads = state.decoder.feed(chunk.as_ref());
                    if !state.absorb(payloads) {
                        state.finished = true;
                    }
                }
                Some(Err(e)) => {
                    state.finished = true;
                    state.pending.push_back(Err(BackendError::Stream(e.to_string())));
                }
                None => {
                    state.finished = true;
                    if let Some(payload) = state.decoder.finish() {
                        state.absorb(vec![payload]);
                    }
                    debug!("Event stream closed");
                }
            }
        }
    })
    .boxed()
}
