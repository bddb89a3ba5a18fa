//! Prompt assembly
//!
//! Pure rendering of the next LLM prompt from the question, the capability
//! catalogue and the call history. Templates are compiled once.

use crate::error::OrchestrationError;
use crate::models::{AgentAnswer, AgentCard, ToolCall, ToolDescriptor};
use crate::Result;
use lazy_static::lazy_static;
use tera::{Context, Tera};

mod templates;

lazy_static! {
    static ref TEMPLATES: std::result::Result<Tera, String> = compile();
}

fn compile() -> std::result::Result<Tera, String> {
    let mut tera = Tera::default();
    tera.add_raw_templates(vec![
        ("tools", templates::TOOLS),
        ("called_tools", templates::CALLED_TOOLS),
        ("tool_decision", templates::TOOL_DECISION),
        ("available_agents", templates::AVAILABLE_AGENTS),
        ("agent_answers", templates::AGENT_ANSWERS),
        ("agent_decision", templates::AGENT_DECISION),
    ])
    .map_err(|e| e.to_string())?;
    Ok(tera)
}

fn render(name: &str, context: &Context) -> Result<String> {
    let tera = (*TEMPLATES).as_ref().map_err(|e| {
        OrchestrationError::ConfigError(format!("prompt templates failed to compile: {}", e))
    })?;
    Ok(tera.render(name, context)?)
}

/// Catalogue of tools the model may call
pub fn tools_prompt(tools: &[ToolDescriptor]) -> Result<String> {
    let mut context = Context::new();
    context.insert("tools", tools);
    render("tools", &context)
}

/// History of tool calls so far; empty before the first call
pub fn called_tools_prompt(calls: &[ToolCall]) -> Result<String> {
    if calls.is_empty() {
        return Ok(String::new());
    }
    let mut context = Context::new();
    context.insert("called_tools", calls);
    render("called_tools", &context)
}

pub fn tool_decision_prompt(
    question: &str,
    tools: &str,
    called_tools: &str,
    tone: Option<&str>,
) -> Result<String> {
    let mut context = Context::new();
    context.insert("question", question);
    context.insert("tools", tools);
    context.insert("called_tools", called_tools);
    context.insert("tone", &tone);
    render("tool_decision", &context)
}

/// Catalogue of peer agents, in the order given
pub fn available_agents_prompt<'a, I>(agents: I) -> Result<String>
where
    I: IntoIterator<Item = &'a AgentCard>,
{
    let agents: Vec<&AgentCard> = agents.into_iter().collect();
    let mut context = Context::new();
    context.insert("agents", &agents);
    render("available_agents", &context)
}

/// Answers collected from peer agents so far; empty before the first call
pub fn agent_answers_prompt(answers: &[AgentAnswer]) -> Result<String> {
    if answers.is_empty() {
        return Ok(String::new());
    }
    let mut context = Context::new();
    context.insert("called_agents", answers);
    render("agent_answers", &context)
}

pub fn agent_decision_prompt(
    question: &str,
    agents: &str,
    agent_answers: &str,
    tone: Option<&str>,
) -> Result<String> {
    let mut context = Context::new();
    context.insert("question", question);
    context.insert("agents", agents);
    context.insert("agent_answers", agent_answers);
    context.insert("tone", &tone);
    render("agent_decision", &context)
}
