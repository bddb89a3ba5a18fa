//! Tool and peer-agent transports
//!
//! Two call kinds sit behind traits here: invoking a tool (MCP, or an
//! in-process registry) and messaging a peer agent (A2A). Both resolve to
//! text plus a success indicator and are safe to fan out concurrently.

use crate::error::OrchestrationError;
use crate::models::{AgentCard, ToolDescriptor};
use crate::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

pub mod a2a;
pub mod mcp;
pub mod protocol;

pub use a2a::A2aTransport;
pub use mcp::McpToolTransport;

//
// ================= Tool Transport =================
//

/// Where a tool server lives; exactly one binding per transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolBinding {
    /// HTTP+SSE endpoint
    Endpoint { url: String },
    /// Child process speaking JSON-RPC on stdio
    Subprocess { command: String, args: Vec<String> },
}

impl ToolBinding {
    /// Validate the two mutually exclusive binding options
    pub fn from_parts(url: Option<String>, command: Option<Vec<String>>) -> Result<Self> {
        match (url, command) {
            (Some(url), None) if !url.trim().is_empty() => Ok(Self::Endpoint { url }),
            (Some(_), None) => Err(OrchestrationError::ConfigError(
                "tool endpoint URL is empty".to_string(),
            )),
            (None, Some(mut command)) => {
                if command.is_empty() || command[0].trim().is_empty() {
                    return Err(OrchestrationError::ConfigError(
                        "tool subprocess command is empty".to_string(),
                    ));
                }
                let program = command.remove(0);
                Ok(Self::Subprocess {
                    command: program,
                    args: command,
                })
            }
            (None, None) => Err(OrchestrationError::ConfigError(
                "either a tool endpoint URL or a subprocess command is required".to_string(),
            )),
            (Some(_), Some(_)) => Err(OrchestrationError::ConfigError(
                "tool endpoint URL and subprocess command are mutually exclusive".to_string(),
            )),
        }
    }
}

/// Result of one tool invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutcome {
    pub succeeded: bool,
    pub text: String,
}

#[async_trait]
pub trait ToolTransport: Send + Sync {
    async fn fetch_capabilities(&self) -> Result<Vec<ToolDescriptor>>;

    /// Invoke one tool. An `Err` means the call could not be made at all;
    /// a tool that ran and failed is `Ok` with `succeeded == false`.
    async fn invoke(&self, name: &str, arguments: Map<String, Value>) -> Result<ToolOutcome>;
}

pub(crate) fn require_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(OrchestrationError::InvocationError(
            "no tool name given".to_string(),
        ));
    }
    Ok(())
}

//
// ================= Peer Transport =================
//

/// One piece of a streamed peer response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerFragment {
    Text(String),
    /// A connection or protocol failure, already rendered for display
    Error(String),
}

impl PeerFragment {
    pub fn content(&self) -> &str {
        match self {
            PeerFragment::Text(text) | PeerFragment::Error(text) => text,
        }
    }
}

pub type FragmentStream = BoxStream<'static, PeerFragment>;

#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Agent cards keyed by agent name
    async fn fetch_capabilities(&self) -> Result<BTreeMap<String, AgentCard>>;

    /// Stream a message to a peer. Never fails: connection problems arrive
    /// as a single `PeerFragment::Error`.
    fn send(&self, card: &AgentCard, message: &str) -> FragmentStream;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binding_requires_exactly_one_mode() {
        assert!(matches!(
            ToolBinding::from_parts(None, None),
            Err(OrchestrationError::ConfigError(_))
        ));
        assert!(matches!(
            ToolBinding::from_parts(
                Some("http://localhost:8000/sse".to_string()),
                Some(vec!["python".to_string()])
            ),
            Err(OrchestrationError::ConfigError(_))
        ));
        assert!(matches!(
            ToolBinding::from_parts(None, Some(vec![])),
            Err(OrchestrationError::ConfigError(_))
        ));
    }

    #[test]
    fn test_binding_splits_command_and_args() {
        let binding = ToolBinding::from_parts(
            None,
            Some(vec!["uv".to_string(), "run".to_string(), "mcp.py".to_string()]),
        )
        .unwrap();

        assert_eq!(
            binding,
            ToolBinding::Subprocess {
                command: "uv".to_string(),
                args: vec!["run".to_string(), "mcp.py".to_string()],
            }
        );

        let binding =
            ToolBinding::from_parts(Some("http://localhost:8000/sse".to_string()), None).unwrap();
        assert!(matches!(binding, ToolBinding::Endpoint { .. }));
    }

    #[test]
    fn test_blank_tool_name_is_invocation_error() {
        assert!(matches!(
            require_name("  "),
            Err(OrchestrationError::InvocationError(_))
        ));
        assert!(require_name("get_price").is_ok());
    }
}
