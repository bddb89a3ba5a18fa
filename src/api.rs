//! A2A server for a tool-calling agent
//!
//! Publishes the agent card and answers JSON-RPC `message/stream` (SSE) and
//! `message/send` requests by running the agent's decision loop. No task
//! store: every request gets fresh task and context ids.

use axum::{
    body::Bytes,
    extract::State,
    response::{
        sse::{Event as SseEvent, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures::StreamExt;
use serde_json::Value;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use uuid::Uuid;

use crate::agent::ToolAgent;
use crate::models::{AgentCapabilities, AgentCard, AgentSkill, StreamChunk};
use crate::transport::protocol::{
    codes, methods, JsonRpcRequest, JsonRpcResponse, Message, MessageSendParams, Role,
    StreamEvent, TaskState, TaskStatus, TaskStatusUpdateEvent,
};
use crate::Result;

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub agent: Arc<ToolAgent>,
    pub card: Arc<AgentCard>,
}

impl ApiState {
    pub fn new(agent: ToolAgent, card: AgentCard) -> Self {
        Self {
            agent: Arc::new(agent),
            card: Arc::new(card),
        }
    }
}

/// Card for a streaming, text-only peer
pub fn peer_card(
    name: impl Into<String>,
    description: impl Into<String>,
    url: impl Into<String>,
    skills: Vec<AgentSkill>,
) -> AgentCard {
    AgentCard {
        name: name.into(),
        description: description.into(),
        url: url.into(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        capabilities: AgentCapabilities { streaming: true },
        default_input_modes: vec!["text".to_string()],
        default_output_modes: vec!["text".to_string()],
        skills,
    }
}

/// =============================
/// Health & Discovery
/// =============================

async fn health() -> Json<Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn agent_card(State(state): State<ApiState>) -> Json<AgentCard> {
    Json(state.card.as_ref().clone())
}

/// =============================
/// JSON-RPC Endpoint
/// =============================

/// Task addressing for one request
struct TaskIds {
    task_id: String,
    context_id: String,
}

impl TaskIds {
    fn for_message(message: &Message) -> Self {
        Self {
            task_id: message
                .task_id
                .clone()
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            context_id: message
                .context_id
                .clone()
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
        }
    }

    fn agent_message(&self, text: impl Into<String>) -> Message {
        let mut message = Message::text(Role::Agent, text);
        message.task_id = Some(self.task_id.clone());
        message.context_id = Some(self.context_id.clone());
        message
    }

    fn status_update(&self, chunk: StreamChunk) -> StreamEvent {
        let (state, message) = if chunk.is_task_complete {
            (TaskState::Completed, None)
        } else {
            (TaskState::Working, Some(self.agent_message(chunk.content)))
        };

        StreamEvent::StatusUpdate(TaskStatusUpdateEvent {
            task_id: self.task_id.clone(),
            context_id: self.context_id.clone(),
            status: TaskStatus {
                state,
                message,
                timestamp: Some(chrono::Utc::now().to_rfc3339()),
            },
            is_final: chunk.is_task_complete,
        })
    }
}

fn rpc_error(id: Option<Value>, code: i64, message: impl Into<String>) -> Response {
    Json(JsonRpcResponse::failure(id, code, message)).into_response()
}

/// Extract the user message and its question text
fn parse_message(params: Option<Value>) -> std::result::Result<(Message, String), String> {
    let params: MessageSendParams = serde_json::from_value(params.unwrap_or(Value::Null))
        .map_err(|e| format!("Invalid params: {}", e))?;

    let question = params.message.text_content();
    if question.trim().is_empty() {
        return Err("Message has no text part".to_string());
    }
    Ok((params.message, question))
}

async fn handle_rpc(State(state): State<ApiState>, body: Bytes) -> Response {
    let request: JsonRpcRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => return rpc_error(None, codes::PARSE_ERROR, format!("Parse error: {}", e)),
    };

    info!(method = %request.method, "Received JSON-RPC request");

    match request.method.as_str() {
        methods::MESSAGE_STREAM => stream_message(state, request).await,
        methods::MESSAGE_SEND => send_message(state, request).await,
        other => {
            warn!(method = other, "Unsupported JSON-RPC method");
            rpc_error(
                request.id,
                codes::METHOD_NOT_FOUND,
                format!("Method not found: {}", other),
            )
        }
    }
}

async fn stream_message(state: ApiState, request: JsonRpcRequest) -> Response {
    let (message, question) = match parse_message(request.params) {
        Ok(parsed) => parsed,
        Err(e) => return rpc_error(request.id, codes::INVALID_PARAMS, e),
    };

    let ids = TaskIds::for_message(&message);
    let id = request.id;
    info!(task_id = %ids.task_id, "Streaming agent run");

    let events = state.agent.stream(question).map(move |chunk| {
        let result = serde_json::to_value(ids.status_update(chunk)).unwrap_or(Value::Null);
        let response = JsonRpcResponse::success(id.clone(), result);
        Ok::<_, Infallible>(
            SseEvent::default().data(serde_json::to_string(&response).unwrap_or_default()),
        )
    });

    Sse::new(events).into_response()
}

async fn send_message(state: ApiState, request: JsonRpcRequest) -> Response {
    let (message, question) = match parse_message(request.params) {
        Ok(parsed) => parsed,
        Err(e) => return rpc_error(request.id, codes::INVALID_PARAMS, e),
    };

    let ids = TaskIds::for_message(&message);
    info!(task_id = %ids.task_id, "Running agent to completion");

    let text: String = state
        .agent
        .stream(question)
        .filter(|chunk| futures::future::ready(!chunk.is_task_complete))
        .map(|chunk| chunk.content)
        .collect::<Vec<_>>()
        .await
        .concat();

    match serde_json::to_value(ids.agent_message(text)) {
        Ok(result) => Json(JsonRpcResponse::success(request.id, result)).into_response(),
        Err(e) => rpc_error(request.id, codes::INTERNAL_ERROR, e.to_string()),
    }
}

/// =============================
/// Router
/// =============================

pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/.well-known/agent.json", get(agent_card))
        .route("/", post(handle_rpc))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

/// Serve on an already-bound listener
pub async fn serve(listener: TcpListener, state: ApiState) -> Result<()> {
    let addr = listener.local_addr()?;
    info!(agent = %state.card.name, "A2A server listening on http://{}", addr);

    axum::serve(listener, create_router(state)).await?;
    Ok(())
}

pub async fn start_server(state: ApiState, host: &str, port: u16) -> Result<()> {
    let listener = TcpListener::bind((host, port)).await?;
    serve(listener, state).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::ScriptedCompletion;
    use crate::config::AgentConfig;
    use crate::tools::ToolRegistry;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::json;
    use tower::ServiceExt;

    fn app(responses: Vec<Vec<&str>>) -> Router {
        let agent = ToolAgent::with_tools(
            Arc::new(ScriptedCompletion::new(responses)),
            Arc::new(ToolRegistry::new()),
            &AgentConfig::default(),
        );
        let card = peer_card(
            "Financial Balance Sheet Agent",
            "Balance sheets of SET-listed companies",
            "http://localhost:9999/",
            vec![],
        );
        create_router(ApiState::new(agent, card))
    }

    fn rpc(method: &str, params: Value) -> Request<Body> {
        let body = json!({"jsonrpc": "2.0", "id": "req-1", "method": method, "params": params});
        Request::builder()
            .method("POST")
            .uri("/")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn user_message(text: &str) -> Value {
        json!({
            "message": {
                "role": "user",
                "parts": [{"kind": "text", "text": text}],
                "messageId": "m-1",
                "kind": "message"
            }
        })
    }

    async fn body_text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let response = app(vec![])
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_agent_card_is_published() {
        let response = app(vec![])
            .oneshot(
                Request::builder()
                    .uri("/.well-known/agent.json")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let card: Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(card["name"], "Financial Balance Sheet Agent");
        assert_eq!(card["capabilities"]["streaming"], true);
        assert_eq!(card["defaultInputModes"][0], "text");
    }

    #[tokio::test]
    async fn test_message_send_returns_agent_message() {
        let response = app(vec![vec!["<Answer>", "42", "</Answer>"]])
            .oneshot(rpc("message/send", user_message("How is KBANK?")))
            .await
            .unwrap();

        let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(body["id"], "req-1");
        assert_eq!(body["result"]["role"], "agent");
        let text = body["result"]["parts"][0]["text"].as_str().unwrap();
        assert!(text.starts_with("Step 0"));
        assert!(text.contains("<Answer>42</Answer>"));
    }

    #[tokio::test]
    async fn test_message_stream_emits_status_updates() {
        let response = app(vec![vec!["<Answer>42</Answer>"]])
            .oneshot(rpc("message/stream", user_message("How is KBANK?")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_text(response).await;
        let events: Vec<Value> = body
            .lines()
            .filter_map(|line| line.strip_prefix("data: "))
            .map(|data| serde_json::from_str(data).unwrap())
            .collect();

        assert_eq!(events.len(), 3);
        assert_eq!(events[0]["result"]["kind"], "status-update");
        assert_eq!(events[0]["result"]["status"]["state"], "working");
        assert_eq!(
            events[1]["result"]["status"]["message"]["parts"][0]["text"],
            "<Answer>42</Answer>"
        );
        let last = &events[2]["result"];
        assert_eq!(last["status"]["state"], "completed");
        assert_eq!(last["final"], true);
        assert!(last["status"].get("message").is_none());
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let response = app(vec![])
            .oneshot(rpc("tasks/get", json!({"id": "t"})))
            .await
            .unwrap();
        let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(body["error"]["code"], codes::METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_message_without_text_is_invalid_params() {
        let params = json!({
            "message": {"role": "user", "parts": [], "messageId": "m-1"}
        });
        let response = app(vec![])
            .oneshot(rpc("message/send", params))
            .await
            .unwrap();
        let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(body["error"]["code"], codes::INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_garbage_body_is_parse_error() {
        let request = Request::builder()
            .method("POST")
            .uri("/")
            .body(Body::from("not json"))
            .unwrap();
        let response = app(vec![]).oneshot(request).await.unwrap();
        let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(body["error"]["code"], codes::PARSE_ERROR);
    }
}
