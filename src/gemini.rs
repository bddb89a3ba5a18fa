//! Gemini API client for streamed completions
//!
//! Uses a long-lived reqwest::Client for connection pooling.
//! Responses are requested as SSE so fragments reach the caller as the
//! model produces them.

use crate::error::OrchestrationError;
use crate::sse;
use crate::Result;
use futures::stream::{BoxStream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info};

/// Reusable Gemini client (connection-pooled)
pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl GeminiClient {
    pub fn new(api_key: String, base_url: String, model: String) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(OrchestrationError::ConfigError(
                "GEMINI_API_KEY not configured".to_string(),
            ));
        }

        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .build()?;

        Ok(Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
        })
    }

    fn stream_url(&self) -> String {
        format!(
            "{}/{}:streamGenerateContent?alt=sse&key={}",
            self.base_url, self.model, self.api_key
        )
    }

    /// Stream a completion; each item is one text fragment
    pub async fn stream_generate(
        &self,
        prompt: &str,
    ) -> Result<BoxStream<'static, Result<String>>> {
        let request = GeminiRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.3,
                top_p: 0.9,
                top_k: 40,
                max_output_tokens: 2048,
            },
        };

        info!(model = %self.model, prompt_len = prompt.len(), "Calling Gemini streaming API");

        let response = self
            .client
            .post(self.stream_url())
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!("Gemini API request failed: {}", e);
                OrchestrationError::LlmError(format!("Gemini API error: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            error!(%status, "Gemini API error response: {}", error_text);
            return Err(OrchestrationError::LlmError(format!(
                "Gemini API returned {}: {}",
                status, error_text
            )));
        }

        let fragments = sse::response_events(response)
            .map(|event| match event {
                Ok(event) => fragment_text(&event.data).transpose(),
                Err(e) => Some(Err(OrchestrationError::LlmError(e.to_string()))),
            })
            .filter_map(|item| async move {
                match item {
                    Some(Ok(text)) if text.is_empty() => None,
                    other => other,
                }
            });

        Ok(fragments.boxed())
    }
}

/// Extract the text carried by one streamed response payload
fn fragment_text(data: &str) -> Result<Option<String>> {
    let response: GeminiResponse = serde_json::from_str(data).map_err(|e| {
        error!("Failed to parse Gemini stream payload: {}", e);
        OrchestrationError::LlmError(format!("Gemini parse error: {}", e))
    })?;

    let Some(candidate) = response.candidates.first() else {
        debug!("Gemini payload without candidates");
        return Ok(None);
    };

    if let Some(reason) = candidate.finish_reason.as_deref() {
        debug!(finish_reason = reason, "Gemini stream finished");
    }

    let text: String = candidate
        .content
        .as_ref()
        .map(|content| content.parts.iter().map(|p| p.text.as_str()).collect::<String>())
        .unwrap_or_default();

    Ok(Some(text))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: i32,
    max_output_tokens: i32,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}
