//! Tool-calling agent
//!
//! Decides which tools to call, calls them through a `ToolTransport`, and
//! folds every result (failed ones included) into the next prompt.

use super::{DecisionLoop, LoopRole};
use crate::completion::CompletionSource;
use crate::config::AgentConfig;
use crate::models::{ToolCall, ToolCallRequest};
use crate::prompts;
use crate::transport::ToolTransport;
use crate::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

pub type ToolAgent = DecisionLoop<ToolRole>;

pub struct ToolRole {
    transport: Arc<dyn ToolTransport>,
    tone: Option<String>,
}

impl ToolRole {
    pub fn new(transport: Arc<dyn ToolTransport>, tone: Option<String>) -> Self {
        Self { transport, tone }
    }
}

impl DecisionLoop<ToolRole> {
    pub fn with_tools(
        completion: Arc<dyn CompletionSource>,
        transport: Arc<dyn ToolTransport>,
        config: &AgentConfig,
    ) -> Self {
        DecisionLoop::new(
            completion,
            ToolRole::new(transport, config.tone.clone()),
            config.max_tool_iterations,
        )
    }
}

#[async_trait]
impl LoopRole for ToolRole {
    /// Rendered tool catalogue
    type Catalog = String;
    type Request = ToolCallRequest;
    type Record = ToolCall;

    async fn catalog(&self) -> Result<String> {
        let tools = self.transport.fetch_capabilities().await?;
        prompts::tools_prompt(&tools)
    }

    fn decision_prompt(&self, question: &str, tools: &String, history: &[ToolCall]) -> Result<String> {
        let called_tools = prompts::called_tools_prompt(history)?;
        prompts::tool_decision_prompt(question, tools, &called_tools, self.tone.as_deref())
    }

    fn opening(&self, iteration: u32) -> Option<String> {
        Some(format!("Step {}\n", iteration))
    }

    async fn dispatch(&self, _tools: &String, request: ToolCallRequest) -> ToolCall {
        let arguments = Value::Object(request.arguments.clone()).to_string();

        match self.transport.invoke(&request.name, request.arguments).await {
            Ok(outcome) => {
                debug!(tool = %request.name, succeeded = outcome.succeeded, "Tool call finished");
                ToolCall {
                    name: request.name,
                    arguments,
                    succeeded: outcome.succeeded,
                    result: outcome.text,
                }
            }
            Err(e) => {
                warn!(tool = %request.name, "Tool call failed: {}", e);
                ToolCall {
                    name: request.name,
                    arguments,
                    succeeded: false,
                    result: e.to_string(),
                }
            }
        }
    }

    fn observation(&self, _question: &str, _new: &[ToolCall], history: &[ToolCall]) -> Result<String> {
        prompts::called_tools_prompt(history)
    }
}
