//! Multi-agent orchestrator
//!
//! Consults peer agents instead of tools. The main agent's own output is
//! wrapped in `<main_agent>` and each peer's reply in `<agent name="...">`,
//! so a consumer can tell the speakers apart while text is still streaming.

use super::{DecisionLoop, LoopRole};
use crate::completion::CompletionSource;
use crate::config::AgentConfig;
use crate::models::{AgentAnswer, AgentCallRequest, AgentCard};
use crate::prompts;
use crate::tags::{extract_answer, MAIN_AGENT_TAG, PEER_AGENT_TAG};
use crate::transport::{PeerFragment, PeerTransport};
use crate::Result;
use async_trait::async_trait;
use futures::StreamExt;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

pub type Orchestrator = DecisionLoop<PeerRole>;

/// Peer agents resolved for one run
pub struct AgentCatalog {
    pub cards: BTreeMap<String, AgentCard>,
    pub prompt: String,
}

pub struct PeerRole {
    transport: Arc<dyn PeerTransport>,
    tone: Option<String>,
}

impl PeerRole {
    pub fn new(transport: Arc<dyn PeerTransport>, tone: Option<String>) -> Self {
        Self { transport, tone }
    }
}

impl DecisionLoop<PeerRole> {
    pub fn with_peers(
        completion: Arc<dyn CompletionSource>,
        transport: Arc<dyn PeerTransport>,
        config: &AgentConfig,
    ) -> Self {
        DecisionLoop::new(
            completion,
            PeerRole::new(transport, config.tone.clone()),
            config.max_agent_calls,
        )
    }
}

fn failed_answer(request: AgentCallRequest, message: String) -> AgentAnswer {
    AgentAnswer {
        name: request.name,
        prompt: request.prompt,
        succeeded: false,
        answer: message.clone(),
        response: message,
    }
}

#[async_trait]
impl LoopRole for PeerRole {
    type Catalog = AgentCatalog;
    type Request = AgentCallRequest;
    type Record = AgentAnswer;

    async fn catalog(&self) -> Result<AgentCatalog> {
        let cards = self.transport.fetch_capabilities().await?;
        let prompt = prompts::available_agents_prompt(cards.values())?;
        Ok(AgentCatalog { cards, prompt })
    }

    fn decision_prompt(
        &self,
        question: &str,
        catalog: &AgentCatalog,
        history: &[AgentAnswer],
    ) -> Result<String> {
        let answers = prompts::agent_answers_prompt(history)?;
        prompts::agent_decision_prompt(question, &catalog.prompt, &answers, self.tone.as_deref())
    }

    fn opening(&self, _iteration: u32) -> Option<String> {
        Some(format!("<{}>\n", MAIN_AGENT_TAG))
    }

    fn closing(&self) -> Option<String> {
        Some(format!("</{}>\n", MAIN_AGENT_TAG))
    }

    async fn dispatch(&self, catalog: &AgentCatalog, request: AgentCallRequest) -> AgentAnswer {
        let Some(card) = catalog.cards.get(&request.name) else {
            warn!(agent = %request.name, "Model selected an unknown agent");
            let message = format!("Unknown agent: {}", request.name);
            return failed_answer(request, message);
        };

        info!(agent = %card.name, "Consulting peer agent");
        let fragments: Vec<PeerFragment> = self.transport.send(card, &request.prompt).collect().await;

        let succeeded = !fragments
            .iter()
            .any(|f| matches!(f, PeerFragment::Error(_)));
        let response: String = fragments.iter().map(PeerFragment::content).collect();

        if !succeeded {
            return failed_answer(request, response);
        }

        AgentAnswer {
            answer: extract_answer(&response),
            name: request.name,
            prompt: request.prompt,
            succeeded,
            response,
        }
    }

    fn observation(
        &self,
        _question: &str,
        new: &[AgentAnswer],
        _history: &[AgentAnswer],
    ) -> Result<String> {
        Ok(new
            .iter()
            .map(|answer| {
                format!(
                    "<{tag} name=\"{}\">\n{}\n</{tag}>\n",
                    answer.name,
                    answer.response,
                    tag = PEER_AGENT_TAG
                )
            })
            .collect())
    }
}
