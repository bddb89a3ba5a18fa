//! Server-sent events decoding
//!
//! Turns an HTTP byte stream into discrete events. Lines are only decoded
//! once complete, so multi-byte characters split across network chunks
//! survive intact.

use crate::error::OrchestrationError;
use crate::Result;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use std::collections::VecDeque;
use std::fmt::Display;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    pub event: Option<String>,
    pub data: String,
}

#[derive(Default)]
struct Decoder {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
    ready: VecDeque<SseEvent>,
}

impl Decoder {
    fn feed(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);

        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw).into_owned();
            self.process_line(line.trim_end_matches(|c: char| c == '\n' || c == '\r'));
        }
    }

    fn process_line(&mut self, line: &str) {
        if line.is_empty() {
            self.dispatch();
            return;
        }

        // comment / keep-alive
        if line.starts_with(':') {
            return;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            _ => {}
        }
    }

    fn dispatch(&mut self) {
        if self.data.is_empty() {
            self.event = None;
            return;
        }

        let data = self.data.join("\n");
        self.data.clear();
        self.ready.push_back(SseEvent {
            event: self.event.take(),
            data,
        });
    }

    fn finish(&mut self) {
        if !self.buffer.is_empty() {
            let raw = std::mem::take(&mut self.buffer);
            let line = String::from_utf8_lossy(&raw).into_owned();
            self.process_line(line.trim_end_matches('\r'));
        }
        self.dispatch();
    }
}

/// Decode any byte stream into SSE events, lazily
pub fn events<S, B, E>(bytes: S) -> BoxStream<'static, Result<SseEvent>>
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    let state = (Box::pin(bytes), Decoder::default(), false);

    stream::unfold(state, |(mut bytes, mut decoder, mut finished)| async move {
        loop {
            if let Some(event) = decoder.ready.pop_front() {
                return Some((Ok(event), (bytes, decoder, finished)));
            }

            if finished {
                return None;
            }

            match bytes.next().await {
                Some(Ok(chunk)) => decoder.feed(chunk.as_ref()),
                Some(Err(e)) => {
                    finished = true;
                    let err = OrchestrationError::TransportError(format!("event stream failed: {}", e));
                    return Some((Err(err), (bytes, decoder, finished)));
                }
                None => {
                    finished = true;
                    decoder.finish();
                }
            }
        }
    })
    .boxed()
}

/// Decode the body of an HTTP response as SSE
pub fn response_events(response: reqwest::Response) -> BoxStream<'static, Result<SseEvent>> {
    events(response.bytes_stream())
}
