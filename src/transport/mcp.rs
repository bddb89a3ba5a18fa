//! MCP tool transport
//!
//! Speaks JSON-RPC 2.0 to a tool server, either a child process over
//! stdio or an HTTP endpoint over SSE. Every capability fetch and every
//! invocation runs in its own session, which is closed on all exit paths.

use super::protocol::{
    methods, CallToolResult, JsonRpcRequest, JsonRpcResponse, ListToolsResult,
    MCP_PROTOCOL_VERSION,
};
use super::{require_name, ToolBinding, ToolOutcome, ToolTransport};
use crate::error::OrchestrationError;
use crate::models::ToolDescriptor;
use crate::sse::{self, SseEvent};
use crate::Result;
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use reqwest::{Client, Url};
use serde_json::{json, Map, Value};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, info, warn};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

enum Channel {
    Stdio {
        child: Child,
        stdin: ChildStdin,
        stdout: Lines<BufReader<ChildStdout>>,
    },
    Sse {
        client: Client,
        events: BoxStream<'static, Result<SseEvent>>,
        post_url: Url,
    },
}

/// One initialised connection to a tool server
pub struct McpSession {
    channel: Channel,
    next_id: u64,
}

impl McpSession {
    /// Open a channel and complete the initialize handshake
    pub async fn connect(binding: &ToolBinding, client: &Client) -> Result<Self> {
        let channel = match binding {
            ToolBinding::Subprocess { command, args } => open_stdio(command, args)?,
            ToolBinding::Endpoint { url } => open_sse(client, url).await?,
        };

        let mut session = Self {
            channel,
            next_id: 1,
        };

        if let Err(e) = session.initialize().await {
            session.close().await;
            return Err(e);
        }

        Ok(session)
    }

    async fn initialize(&mut self) -> Result<()> {
        let result = self
            .request(
                methods::INITIALIZE,
                json!({
                    "protocolVersion": MCP_PROTOCOL_VERSION,
                    "capabilities": {},
                    "clientInfo": {
                        "name": env!("CARGO_PKG_NAME"),
                        "version": env!("CARGO_PKG_VERSION"),
                    }
                }),
            )
            .await?;

        debug!(server = ?result.get("serverInfo"), "MCP session initialised");
        self.send(&JsonRpcRequest::notification(methods::INITIALIZED))
            .await
    }

    pub async fn list_tools(&mut self) -> Result<Vec<ToolDescriptor>> {
        let result = self.request(methods::TOOLS_LIST, json!({})).await?;
        let listed: ListToolsResult = serde_json::from_value(result)?;

        Ok(listed
            .tools
            .into_iter()
            .map(|tool| ToolDescriptor {
                name: tool.name,
                description: tool.description.unwrap_or_default(),
                input_schema: tool.input_schema.to_string(),
            })
            .collect())
    }

    pub async fn call_tool(
        &mut self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> Result<ToolOutcome> {
        let result = self
            .request(
                methods::TOOLS_CALL,
                json!({ "name": name, "arguments": arguments }),
            )
            .await?;
        let result: CallToolResult = serde_json::from_value(result)?;

        Ok(ToolOutcome {
            succeeded: !result.is_error,
            text: result.first_text(),
        })
    }

    async fn request(&mut self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_id;
        self.next_id += 1;

        self.send(&JsonRpcRequest::new(id, method, params)).await?;

        loop {
            let message = self.receive().await?;

            // server-initiated requests and notifications
            if message.get("method").is_some() {
                debug!(method = ?message.get("method"), "Ignoring server message");
                continue;
            }

            let response: JsonRpcResponse = match serde_json::from_value(message) {
                Ok(response) => response,
                Err(e) => {
                    debug!("Skipping malformed JSON-RPC message: {}", e);
                    continue;
                }
            };

            if response.id != Some(Value::from(id)) {
                debug!(expected = id, got = ?response.id, "Skipping response for another request");
                continue;
            }

            if let Some(error) = response.error {
                return Err(OrchestrationError::ProtocolError(format!(
                    "{} failed ({}): {}",
                    method, error.code, error.message
                )));
            }

            return Ok(response.result.unwrap_or(Value::Null));
        }
    }

    async fn send(&mut self, message: &JsonRpcRequest) -> Result<()> {
        match &mut self.channel {
            Channel::Stdio { stdin, .. } => {
                let mut line = serde_json::to_string(message)?;
                line.push('\n');
                stdin.write_all(line.as_bytes()).await?;
                stdin.flush().await?;
            }
            Channel::Sse {
                client, post_url, ..
            } => {
                let response = client.post(post_url.clone()).json(message).send().await?;
                if !response.status().is_success() {
                    return Err(OrchestrationError::TransportError(format!(
                        "tool server rejected {} with {}",
                        message.method,
                        response.status()
                    )));
                }
            }
        }
        Ok(())
    }

    /// Next JSON value from the server, skipping anything that is not JSON
    async fn receive(&mut self) -> Result<Value> {
        loop {
            let raw = match &mut self.channel {
                Channel::Stdio { stdout, .. } => match stdout.next_line().await? {
                    Some(line) => line,
                    None => {
                        return Err(OrchestrationError::TransportError(
                            "tool server closed its output".to_string(),
                        ))
                    }
                },
                Channel::Sse { events, .. } => match events.next().await {
                    Some(Ok(event)) if matches!(event.event.as_deref(), None | Some("message")) => {
                        event.data
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => return Err(e),
                    None => {
                        return Err(OrchestrationError::TransportError(
                            "tool server closed the event stream".to_string(),
                        ))
                    }
                },
            };

            match serde_json::from_str::<Value>(raw.trim()) {
                Ok(value) => return Ok(value),
                Err(_) => debug!(line = %raw, "Skipping non-JSON output from tool server"),
            }
        }
    }

    /// Release the channel; a child that does not exit promptly is killed
    pub async fn close(self) {
        match self.channel {
            Channel::Stdio {
                mut child,
                stdin,
                stdout,
            } => {
                drop(stdin);
                drop(stdout);
                match tokio::time::timeout(SHUTDOWN_GRACE, child.wait()).await {
                    Ok(Ok(status)) => debug!(%status, "Tool server exited"),
                    Ok(Err(e)) => warn!("Failed to reap tool server: {}", e),
                    Err(_) => {
                        if let Err(e) = child.kill().await {
                            warn!("Failed to kill tool server: {}", e);
                        }
                    }
                }
            }
            Channel::Sse { events, .. } => drop(events),
        }
    }
}

fn open_stdio(command: &str, args: &[String]) -> Result<Channel> {
    let mut child = Command::new(command)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| {
            OrchestrationError::TransportError(format!("failed to start {}: {}", command, e))
        })?;

    let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
        return Err(OrchestrationError::TransportError(
            "tool server stdio not captured".to_string(),
        ));
    };

    Ok(Channel::Stdio {
        child,
        stdin,
        stdout: BufReader::new(stdout).lines(),
    })
}

async fn open_sse(client: &Client, url: &str) -> Result<Channel> {
    let base = Url::parse(url)
        .map_err(|e| OrchestrationError::ConfigError(format!("invalid tool URL {}: {}", url, e)))?;

    let response = client
        .get(base.clone())
        .header("Accept", "text/event-stream")
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(OrchestrationError::TransportError(format!(
            "tool server at {} returned {}",
            url,
            response.status()
        )));
    }

    let mut events = sse::response_events(response);

    // the first endpoint event names where requests are posted
    let post_url = loop {
        match events.next().await {
            Some(Ok(event)) if event.event.as_deref() == Some("endpoint") => {
                break base.join(event.data.trim()).map_err(|e| {
                    OrchestrationError::ProtocolError(format!("invalid endpoint event: {}", e))
                })?;
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(e),
            None => {
                return Err(OrchestrationError::ProtocolError(
                    "event stream ended before the endpoint event".to_string(),
                ))
            }
        }
    };

    debug!(%post_url, "MCP SSE channel open");
    Ok(Channel::Sse {
        client: client.clone(),
        events,
        post_url,
    })
}

/// Tool transport backed by an MCP server
pub struct McpToolTransport {
    binding: ToolBinding,
    client: Client,
}

impl McpToolTransport {
    pub fn new(binding: ToolBinding) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self { binding, client })
    }
}

#[async_trait]
impl ToolTransport for McpToolTransport {
    async fn fetch_capabilities(&self) -> Result<Vec<ToolDescriptor>> {
        let mut session = McpSession::connect(&self.binding, &self.client).await?;
        let tools = session.list_tools().await;
        session.close().await;

        if let Ok(tools) = &tools {
            info!(count = tools.len(), "Fetched tool catalogue");
        }
        tools
    }

    async fn invoke(&self, name: &str, arguments: Map<String, Value>) -> Result<ToolOutcome> {
        require_name(name)?;

        let mut session = McpSession::connect(&self.binding, &self.client).await?;
        let outcome = session.call_tool(name, arguments).await;
        session.close().await;

        debug!(tool = name, ok = outcome.as_ref().map(|o| o.succeeded).unwrap_or(false), "Tool call finished");
        outcome
    }
}
