//! Financial A2A Orchestrator
//!
//! Answers finance questions by letting an LLM call tools (over MCP) or
//! consult peer agents (over A2A):
//! - Streams every model token and call result to the caller as it happens
//! - Dispatches the calls of one iteration concurrently
//! - Bounds each run by an iteration ceiling
//! - Serves a tool-calling agent as an A2A peer
//!
//! DECISION LOOP:
//! QUESTION → DECIDE → EXTRACT → DISPATCH → RECORD → DECIDE? → COMPLETE

pub mod agent;
pub mod api;
pub mod completion;
pub mod config;
pub mod error;
pub mod extract;
pub mod gemini;
pub mod models;
pub mod prompts;
pub mod sse;
pub mod tags;
pub mod tools;
pub mod transport;

pub use error::Result;

// Re-export common types
pub use agent::{DecisionLoop, Orchestrator, RunOutcome, RunReport, ToolAgent};
pub use config::AgentConfig;
pub use models::*;
