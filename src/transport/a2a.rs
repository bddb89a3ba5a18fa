//! A2A peer-agent transport
//!
//! Resolves agent cards from a list of endpoints and streams messages to
//! peers with `message/stream`. Peers run their own decision loop; only the
//! text of their status-update messages is relayed.

use super::protocol::{
    methods, JsonRpcRequest, JsonRpcResponse, Message, MessageSendParams, Part, Role, StreamEvent,
};
use super::{FragmentStream, PeerFragment, PeerTransport};
use crate::error::OrchestrationError;
use crate::models::AgentCard;
use crate::sse;
use crate::Result;
use async_trait::async_trait;
use futures::future::join_all;
use futures::stream::{self, StreamExt};
use reqwest::Client;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const AGENT_CARD_PATH: &str = ".well-known/agent.json";

pub struct A2aTransport {
    client: Client,
    endpoints: Vec<String>,
}

impl A2aTransport {
    pub fn new(endpoints: Vec<String>) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .build()?;
        Ok(Self { client, endpoints })
    }

    async fn fetch_card(&self, endpoint: &str) -> Result<AgentCard> {
        let url = format!("{}/{}", endpoint.trim_end_matches('/'), AGENT_CARD_PATH);

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(OrchestrationError::TransportError(format!(
                "{} returned {}",
                url,
                response.status()
            )));
        }

        let mut card: AgentCard = response.json().await?;
        if card.url.trim().is_empty() {
            card.url = endpoint.to_string();
        }
        Ok(card)
    }
}

#[async_trait]
impl PeerTransport for A2aTransport {
    async fn fetch_capabilities(&self) -> Result<BTreeMap<String, AgentCard>> {
        let cards = join_all(self.endpoints.iter().map(|e| self.fetch_card(e))).await;

        let mut registry = BTreeMap::new();
        for (endpoint, card) in self.endpoints.iter().zip(cards) {
            match card {
                Ok(card) => {
                    debug!(agent = %card.name, endpoint = %endpoint, "Resolved agent card");
                    registry.insert(card.name.clone(), card);
                }
                Err(e) => warn!(endpoint = %endpoint, "Skipping unreachable agent: {}", e),
            }
        }

        info!(agents = registry.len(), "Agent registry resolved");
        Ok(registry)
    }

    fn send(&self, card: &AgentCard, message: &str) -> FragmentStream {
        let client = self.client.clone();
        let url = card.url.clone();
        let agent = card.name.clone();
        let message = message.to_string();

        stream::once(async move { open_stream(&client, &url, message).await })
            .flat_map(move |opened| match opened {
                Ok(fragments) => fragments,
                Err(e) => {
                    warn!(agent = %agent, "Peer call failed: {}", e);
                    stream::iter(vec![connection_error(&e)]).boxed()
                }
            })
            .boxed()
    }
}

fn connection_error(e: &OrchestrationError) -> PeerFragment {
    PeerFragment::Error(format!("\nClient connection error: {}", e))
}

async fn open_stream(client: &Client, url: &str, text: String) -> Result<FragmentStream> {
    let mut message = Message::text(Role::User, text);
    message.task_id = Some(Uuid::new_v4().simple().to_string());

    let request = JsonRpcRequest::new(
        Uuid::new_v4().to_string(),
        methods::MESSAGE_STREAM,
        serde_json::to_value(MessageSendParams { message })?,
    );

    let response = client
        .post(url)
        .header("Accept", "text/event-stream")
        .json(&request)
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(OrchestrationError::TransportError(format!(
            "HTTP Error {}: {}",
            response.status().as_u16(),
            response.status().canonical_reason().unwrap_or("unknown")
        )));
    }

    let fragments = sse::response_events(response)
        .flat_map(|event| stream::iter(relay(event)))
        .boxed();
    Ok(fragments)
}

/// Fragments worth forwarding from one peer event
fn relay(event: Result<sse::SseEvent>) -> Vec<PeerFragment> {
    let event = match event {
        Ok(event) => event,
        Err(e) => return vec![connection_error(&e)],
    };

    let response: JsonRpcResponse = match serde_json::from_str(&event.data) {
        Ok(response) => response,
        Err(e) => {
            debug!("Skipping undecodable peer event: {}", e);
            return Vec::new();
        }
    };

    if let Some(error) = response.error {
        return vec![PeerFragment::Error(format!(
            "\nAgent error ({}): {}",
            error.code, error.message
        ))];
    }

    let Some(result) = response.result else {
        return Vec::new();
    };

    match serde_json::from_value::<StreamEvent>(result) {
        Ok(StreamEvent::StatusUpdate(update)) => update
            .status
            .message
            .map(|message| {
                message
                    .parts
                    .into_iter()
                    .filter_map(|part| match part {
                        Part::Text { text } => Some(PeerFragment::Text(text)),
                        Part::Unsupported => None,
                    })
                    .collect()
            })
            .unwrap_or_default(),
        Ok(StreamEvent::Other) => Vec::new(),
        Err(e) => {
            debug!("Skipping unrecognised peer event: {}", e);
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(data: serde_json::Value) -> Result<sse::SseEvent> {
        Ok(sse::SseEvent {
            event: None,
            data: data.to_string(),
        })
    }

    fn unreachable_card() -> AgentCard {
        serde_json::from_value(json!({
            "name": "Down Agent",
            "url": "http://127.0.0.1:1/"
        }))
        .unwrap()
    }

    #[test]
    fn test_only_status_message_text_is_relayed() {
        let update = event(json!({
            "jsonrpc": "2.0",
            "id": "1",
            "result": {
                "kind": "status-update",
                "taskId": "t",
                "contextId": "c",
                "status": {
                    "state": "working",
                    "message": {
                        "role": "agent",
                        "parts": [{"kind": "text", "text": "Step 0"}],
                        "messageId": "m"
                    }
                },
                "final": false
            }
        }));
        assert_eq!(relay(update), vec![PeerFragment::Text("Step 0".to_string())]);

        let finished = event(json!({
            "jsonrpc": "2.0",
            "id": "1",
            "result": {
                "kind": "status-update",
                "taskId": "t",
                "contextId": "c",
                "status": {"state": "completed"},
                "final": true
            }
        }));
        assert!(relay(finished).is_empty());

        let artifact = event(json!({
            "jsonrpc": "2.0",
            "id": "1",
            "result": {"kind": "artifact-update", "taskId": "t", "contextId": "c"}
        }));
        assert!(relay(artifact).is_empty());
    }

    #[test]
    fn test_json_rpc_error_becomes_error_fragment() {
        let failed = event(json!({
            "jsonrpc": "2.0",
            "id": "1",
            "error": {"code": -32601, "message": "Method not found"}
        }));
        let fragments = relay(failed);
        assert_eq!(fragments.len(), 1);
        assert!(matches!(&fragments[0], PeerFragment::Error(msg) if msg.contains("Method not found")));
    }

    #[tokio::test]
    async fn test_unreachable_peer_yields_single_error_fragment() {
        let transport = A2aTransport::new(vec![]).unwrap();
        let fragments: Vec<PeerFragment> = transport
            .send(&unreachable_card(), "How is KBANK balance sheet?")
            .collect()
            .await;

        assert_eq!(fragments.len(), 1);
        let PeerFragment::Error(message) = &fragments[0] else {
            panic!("expected an error fragment");
        };
        assert!(message.starts_with("\nClient connection error:"));
    }

    #[tokio::test]
    async fn test_unreachable_endpoints_are_skipped() {
        let transport = A2aTransport::new(vec!["http://127.0.0.1:1".to_string()]).unwrap();
        let registry = transport.fetch_capabilities().await.unwrap();
        assert!(registry.is_empty());
    }
}
