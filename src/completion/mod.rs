//! Streaming completion sources
//!
//! A completion source turns one prompt into a lazy, finite sequence of text
//! fragments whose concatenation is the full model response.

use crate::Result;
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use std::collections::VecDeque;
use std::sync::Mutex;

pub mod gemini;
pub use gemini::GeminiCompletion;

pub type TextStream = BoxStream<'static, Result<String>>;

/// Trait for LLM text streaming
#[async_trait]
pub trait CompletionSource: Send + Sync {
    async fn stream(&self, prompt: &str) -> Result<TextStream>;
}

/// Scripted completion source for development & testing
///
/// Replays one fragment list per call. Once the script runs out, the last
/// response is repeated, which models an LLM that keeps asking for calls.
pub struct ScriptedCompletion {
    responses: Mutex<VecDeque<Vec<String>>>,
    last: Mutex<Vec<String>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedCompletion {
    pub fn new<I, R, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let responses = responses
            .into_iter()
            .map(|r| r.into_iter().map(Into::into).collect())
            .collect();

        Self {
            responses: Mutex::new(responses),
            last: Mutex::new(Vec::new()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Prompts received so far, in call order
    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }

    fn next_response(&self) -> Vec<String> {
        let next = self.responses.lock().ok().and_then(|mut r| r.pop_front());
        let Ok(mut last) = self.last.lock() else {
            return next.unwrap_or_default();
        };

        if let Some(next) = next {
            *last = next;
        }
        last.clone()
    }
}

#[async_trait]
impl CompletionSource for ScriptedCompletion {
    async fn stream(&self, prompt: &str) -> Result<TextStream> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }

        let fragments = self.next_response();
        Ok(stream::iter(fragments.into_iter().map(Ok)).boxed())
    }
}
