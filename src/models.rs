//! Core data models for the decision loop

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

//
// ================= Call Requests =================
//

/// A tool invocation requested by the model inside a fenced JSON block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub name: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

/// A peer-agent consultation requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentCallRequest {
    #[serde(default)]
    pub index: Option<u32>,
    pub name: String,
    pub prompt: String,
}

//
// ================= Call Records =================
//

/// Outcome of one dispatched tool call, folded into the next prompt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    /// JSON-encoded arguments as sent to the tool
    pub arguments: String,
    pub succeeded: bool,
    pub result: String,
}

/// Outcome of one consultation with a peer agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentAnswer {
    pub name: String,
    pub prompt: String,
    pub succeeded: bool,
    /// Content of the peer's `<Answer>` region, or the whole response
    pub answer: String,
    /// Everything the peer streamed back, used for display only
    #[serde(skip)]
    pub response: String,
}

//
// ================= Capability Descriptors =================
//

/// Tool metadata as advertised by a tool server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    /// JSON-encoded input schema
    pub input_schema: String,
}

/// Peer agent metadata published at `/.well-known/agent.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentCard {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub capabilities: AgentCapabilities,
    #[serde(default)]
    pub default_input_modes: Vec<String>,
    #[serde(default)]
    pub default_output_modes: Vec<String>,
    #[serde(default)]
    pub skills: Vec<AgentSkill>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentCapabilities {
    #[serde(default)]
    pub streaming: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSkill {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub examples: Vec<String>,
}

//
// ================= Stream Output =================
//

/// Unit of output emitted by a decision-loop run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamChunk {
    pub is_task_complete: bool,
    pub require_user_input: bool,
    pub content: String,
}

impl StreamChunk {
    pub const COMPLETED: &'static str = "Task completed";

    pub fn text(content: impl Into<String>) -> Self {
        Self {
            is_task_complete: false,
            require_user_input: false,
            content: content.into(),
        }
    }

    /// Terminal chunk; emitted exactly once, last
    pub fn completed() -> Self {
        Self {
            is_task_complete: true,
            require_user_input: false,
            content: Self::COMPLETED.to_string(),
        }
    }
}

/// A tag-delimited region recognised in partially streamed text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedTag {
    pub tag: String,
    pub attributes: HashMap<String, String>,
    pub content: String,
    pub is_complete: bool,
}
