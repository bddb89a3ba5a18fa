//! Gemini-backed completion source

use super::{CompletionSource, TextStream};
use crate::config::AgentConfig;
use crate::gemini::GeminiClient;
use crate::Result;
use async_trait::async_trait;

pub struct GeminiCompletion {
    client: GeminiClient,
}

impl GeminiCompletion {
    pub fn new(client: GeminiClient) -> Self {
        Self { client }
    }

    pub fn from_config(config: &AgentConfig) -> Result<Self> {
        let client = GeminiClient::new(
            config.api_key.clone(),
            config.base_url.clone(),
            config.model.clone(),
        )?;
        Ok(Self::new(client))
    }
}

#[async_trait]
impl CompletionSource for GeminiCompletion {
    async fn stream(&self, prompt: &str) -> Result<TextStream> {
        self.client.stream_generate(prompt).await
    }
}
