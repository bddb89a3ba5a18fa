//! Runtime configuration
//!
//! Built once at startup and handed to constructors; nothing here is global.

use crate::error::OrchestrationError;
use crate::Result;
use std::str::FromStr;

pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
pub const DEFAULT_MAX_TOOL_ITERATIONS: u32 = 10;
pub const DEFAULT_MAX_AGENT_CALLS: u32 = 3;
pub const DEFAULT_TONE: &str =
    "Act as a financial expert and answer the question in a formal, robust and convincing tone.";

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    /// Iteration ceiling for the tool-calling loop
    pub max_tool_iterations: u32,
    /// Iteration ceiling for the peer-agent orchestration loop
    pub max_agent_calls: u32,
    pub tone: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            max_tool_iterations: DEFAULT_MAX_TOOL_ITERATIONS,
            max_agent_calls: DEFAULT_MAX_AGENT_CALLS,
            tone: Some(DEFAULT_TONE.to_string()),
        }
    }
}

impl AgentConfig {
    /// Read configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let api_key = non_empty("GEMINI_API_KEY")
            .or_else(|| non_empty("GOOGLE_API_KEY"))
            .unwrap_or_default();

        let tone = match lookup("ANSWER_TONE") {
            Some(v) if v.trim().is_empty() => None,
            Some(v) => Some(v),
            None => defaults.tone,
        };

        Ok(Self {
            api_key,
            model: non_empty("GEMINI_MODEL").unwrap_or(defaults.model),
            base_url: non_empty("GEMINI_BASE_URL")
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or(defaults.base_url),
            max_tool_iterations: parse_ceiling(
                "MAX_TOOL_ITERATIONS",
                non_empty("MAX_TOOL_ITERATIONS"),
                defaults.max_tool_iterations,
            )?,
            max_agent_calls: parse_ceiling(
                "MAX_AGENT_CALLS",
                non_empty("MAX_AGENT_CALLS"),
                defaults.max_agent_calls,
            )?,
            tone,
        })
    }
}

fn parse_ceiling(key: &str, raw: Option<String>, default: u32) -> Result<u32> {
    let Some(raw) = raw else {
        return Ok(default);
    };

    let value = u32::from_str(raw.trim()).map_err(|e| {
        OrchestrationError::ConfigError(format!("{} must be a positive integer: {}", key, e))
    })?;

    if value == 0 {
        return Err(OrchestrationError::ConfigError(format!(
            "{} must be at least 1",
            key
        )));
    }

    Ok(value)
}
