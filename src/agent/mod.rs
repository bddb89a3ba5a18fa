//! Decision loop - the bounded decide → act → observe cycle
//!
//! DECIDE (stream LLM) → EXTRACT calls → DISPATCH (fan-out) → RECORD → DECIDE ...
//!
//! One engine drives both the tool-calling agent and the peer-agent
//! orchestrator; a `LoopRole` supplies what differs between them. Every
//! fragment and status message reaches the caller as a `StreamChunk`, and a
//! run always ends with exactly one terminal chunk.

use crate::completion::CompletionSource;
use crate::error::OrchestrationError;
use crate::extract::extract_calls;
use crate::models::StreamChunk;
use crate::Result;
use async_trait::async_trait;
use futures::future::join_all;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, warn};

pub mod orchestrator;
pub mod tool_agent;

pub use orchestrator::{Orchestrator, PeerRole};
pub use tool_agent::{ToolAgent, ToolRole};

const CHANNEL_CAPACITY: usize = 64;

/// What a decision loop calls, and how its calls are described and recorded
#[async_trait]
pub trait LoopRole: Send + Sync + 'static {
    /// Capabilities resolved once at the start of a run
    type Catalog: Send + Sync + 'static;
    type Request: DeserializeOwned + Send + Sync + 'static;
    type Record: Clone + Send + Sync + 'static;

    async fn catalog(&self) -> Result<Self::Catalog>;

    fn decision_prompt(
        &self,
        question: &str,
        catalog: &Self::Catalog,
        history: &[Self::Record],
    ) -> Result<String>;

    /// Emitted before the model speaks in an iteration
    fn opening(&self, _iteration: u32) -> Option<String> {
        None
    }

    /// Emitted after the model finishes speaking in an iteration
    fn closing(&self) -> Option<String> {
        None
    }

    /// Perform one call. Failures are recorded, never raised.
    async fn dispatch(&self, catalog: &Self::Catalog, request: Self::Request) -> Self::Record;

    /// Chunk describing the calls just made
    fn observation(
        &self,
        question: &str,
        new: &[Self::Record],
        history: &[Self::Record],
    ) -> Result<String>;
}

/// How a run ended. The chunk stream does not distinguish these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The model requested no further calls
    Answered,
    /// The iteration ceiling was reached while calls were still requested
    Exhausted,
    Failed(String),
    /// The consumer stopped reading
    Abandoned,
}

#[derive(Debug, Clone)]
pub struct RunReport<T> {
    pub iterations: u32,
    pub history: Vec<T>,
    pub outcome: RunOutcome,
}

pub struct DecisionLoop<R: LoopRole> {
    completion: Arc<dyn CompletionSource>,
    role: Arc<R>,
    max_iterations: u32,
}

impl<R: LoopRole> Clone for DecisionLoop<R> {
    fn clone(&self) -> Self {
        Self {
            completion: Arc::clone(&self.completion),
            role: Arc::clone(&self.role),
            max_iterations: self.max_iterations,
        }
    }
}

impl<R: LoopRole> DecisionLoop<R> {
    pub fn new(completion: Arc<dyn CompletionSource>, role: R, max_iterations: u32) -> Self {
        Self {
            completion,
            role: Arc::new(role),
            max_iterations,
        }
    }

    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    /// Run on a background task; dropping the stream abandons the run
    pub fn stream(&self, question: impl Into<String>) -> ReceiverStream<StreamChunk> {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let engine = self.clone();
        let question = question.into();

        tokio::spawn(async move {
            let report = engine.execute(&question, &tx).await;
            debug!(
                iterations = report.iterations,
                calls = report.history.len(),
                outcome = ?report.outcome,
                "Background run finished"
            );
        });

        ReceiverStream::new(rx)
    }

    /// Run to the end, sending every chunk to `tx`
    pub async fn execute(
        &self,
        question: &str,
        tx: &mpsc::Sender<StreamChunk>,
    ) -> RunReport<R::Record> {
        let mut report = RunReport {
            iterations: 0,
            history: Vec::new(),
            outcome: RunOutcome::Exhausted,
        };

        info!(max_iterations = self.max_iterations, "Decision loop: starting run");

        let result = self.run(question, tx, &mut report).await;
        report.outcome = match result {
            Ok(outcome) => outcome,
            Err(OrchestrationError::ConsumerGone) => {
                info!(iterations = report.iterations, "Consumer gone - abandoning run");
                report.outcome = RunOutcome::Abandoned;
                return report;
            }
            Err(e) => {
                error!(iterations = report.iterations, "Decision loop failed: {}", e);
                let _ = tx.send(StreamChunk::text(format!("\nError: {}\n", e))).await;
                RunOutcome::Failed(e.to_string())
            }
        };

        if tx.send(StreamChunk::completed()).await.is_err() {
            debug!("Consumer gone before the terminal chunk");
        }

        info!(
            iterations = report.iterations,
            calls = report.history.len(),
            outcome = ?report.outcome,
            "Decision loop: run complete"
        );
        report
    }

    async fn run(
        &self,
        question: &str,
        tx: &mpsc::Sender<StreamChunk>,
        report: &mut RunReport<R::Record>,
    ) -> Result<RunOutcome> {
        let catalog = self.role.catalog().await?;

        for iteration in 0..self.max_iterations {
            report.iterations = iteration + 1;

            // === DECIDE ===
            if let Some(opening) = self.role.opening(iteration) {
                emit(tx, opening).await?;
            }

            let prompt = self
                .role
                .decision_prompt(question, &catalog, &report.history)?;
            debug!(iteration, prompt_len = prompt.len(), "Deciding");

            let mut fragments = self.completion.stream(&prompt).await?;
            let mut response = String::new();
            while let Some(fragment) = fragments.next().await {
                let fragment = fragment?;
                response.push_str(&fragment);
                emit(tx, fragment).await?;
            }

            if let Some(closing) = self.role.closing() {
                emit(tx, closing).await?;
            }

            // === EXTRACT ===
            let requests: Vec<R::Request> = extract_calls(&response);
            if requests.is_empty() {
                info!(iteration, "No calls requested - answered");
                return Ok(RunOutcome::Answered);
            }

            // === DISPATCH ===
            info!(iteration, calls = requests.len(), "Dispatching calls");
            let records = join_all(
                requests
                    .into_iter()
                    .map(|request| self.role.dispatch(&catalog, request)),
            )
            .await;

            // === RECORD ===
            let start = report.history.len();
            report.history.extend(records);

            let observation =
                self.role
                    .observation(question, &report.history[start..], &report.history)?;
            emit(tx, observation).await?;
        }

        warn!(
            max_iterations = self.max_iterations,
            "Iteration ceiling reached with calls still pending"
        );
        Ok(RunOutcome::Exhausted)
    }
}

async fn emit(tx: &mpsc::Sender<StreamChunk>, content: String) -> Result<()> {
    if content.is_empty() {
        return Ok(());
    }
    tx.send(StreamChunk::text(content))
        .await
        .map_err(|_| OrchestrationError::ConsumerGone)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::{ScriptedCompletion, TextStream};
    use crate::models::ToolCallRequest;
    use futures::stream;
    use std::time::Duration;

    /// Echoes the requested name after sleeping `delay_ms`
    struct DelayRole;

    #[async_trait]
    impl LoopRole for DelayRole {
        type Catalog = ();
        type Request = ToolCallRequest;
        type Record = String;

        async fn catalog(&self) -> Result<()> {
            Ok(())
        }

        fn decision_prompt(&self, question: &str, _: &(), history: &[String]) -> Result<String> {
            Ok(format!("{} after {}", question, history.join(",")))
        }

        async fn dispatch(&self, _: &(), request: ToolCallRequest) -> String {
            let delay = request
                .arguments
                .get("delay_ms")
                .and_then(|v| v.as_u64())
                .unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            request.name
        }

        fn observation(&self, _: &str, new: &[String], _: &[String]) -> Result<String> {
            Ok(format!("called {}", new.join(",")))
        }
    }

    struct BrokenCompletion;

    #[async_trait]
    impl CompletionSource for BrokenCompletion {
        async fn stream(&self, _prompt: &str) -> Result<TextStream> {
            Ok(stream::iter(vec![
                Ok("partial ".to_string()),
                Err(OrchestrationError::LlmError("quota exceeded".to_string())),
            ])
            .boxed())
        }
    }

    const CALLS: &str = "```json\n[{\"name\": \"slow\", \"arguments\": {\"delay_ms\": 60}}, {\"name\": \"medium\", \"arguments\": {\"delay_ms\": 30}}, {\"name\": \"fast\", \"arguments\": {\"delay_ms\": 0}}]\n```";

    fn engine(
        responses: Vec<Vec<&str>>,
        max_iterations: u32,
    ) -> (DecisionLoop<DelayRole>, Arc<ScriptedCompletion>) {
        let completion = Arc::new(ScriptedCompletion::new(responses));
        let engine = DecisionLoop::new(completion.clone(), DelayRole, max_iterations);
        (engine, completion)
    }

    async fn run(engine: &DecisionLoop<DelayRole>) -> (Vec<StreamChunk>, RunReport<String>) {
        let (tx, mut rx) = mpsc::channel(256);
        let report = engine.execute("q", &tx).await;
        drop(tx);

        let mut chunks = Vec::new();
        while let Some(chunk) = rx.recv().await {
            chunks.push(chunk);
        }
        (chunks, report)
    }

    fn assert_single_terminal(chunks: &[StreamChunk]) {
        let last = chunks.last().expect("at least one chunk");
        assert!(last.is_task_complete);
        assert_eq!(
            chunks.iter().filter(|c| c.is_task_complete).count(),
            1,
            "terminal chunk must appear exactly once"
        );
    }

    #[tokio::test]
    async fn test_no_calls_completes_after_one_iteration() {
        let (engine, _) = engine(vec![vec!["The answer ", "is 42"]], 10);
        let (chunks, report) = run(&engine).await;

        assert_single_terminal(&chunks);
        assert_eq!(report.outcome, RunOutcome::Answered);
        assert_eq!(report.iterations, 1);
        assert!(report.history.is_empty());
        assert_eq!(chunks[0].content, "The answer ");
        assert_eq!(chunks[1].content, "is 42");
        assert_eq!(chunks.len(), 3);
    }

    #[tokio::test]
    async fn test_records_follow_request_order_not_completion_order() {
        let (engine, completion) = engine(vec![vec![CALLS], vec!["done"]], 10);
        let (chunks, report) = run(&engine).await;

        assert_eq!(report.history, vec!["slow", "medium", "fast"]);
        assert_eq!(report.outcome, RunOutcome::Answered);
        assert_eq!(report.iterations, 2);
        assert!(chunks.iter().any(|c| c.content == "called slow,medium,fast"));
        assert_single_terminal(&chunks);

        // history reaches the next prompt
        assert_eq!(completion.prompts()[1], "q after slow,medium,fast");
    }

    #[tokio::test(start_paused = true)]
    async fn test_calls_are_dispatched_concurrently() {
        let calls = "```json\n[{\"name\": \"a\", \"arguments\": {\"delay_ms\": 100}}, {\"name\": \"b\", \"arguments\": {\"delay_ms\": 100}}, {\"name\": \"c\", \"arguments\": {\"delay_ms\": 100}}]\n```";
        let (engine, _) = engine(vec![vec![calls], vec!["done"]], 10);

        let started = tokio::time::Instant::now();
        let (_, report) = run(&engine).await;

        // paused clock: sequential dispatch would take 300ms
        assert_eq!(report.history.len(), 3);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(100));
        assert!(elapsed < Duration::from_millis(200));
    }

    #[tokio::test]
    async fn test_exhaustion_still_terminates() {
        let (engine, completion) = engine(vec![vec![CALLS]], 1);
        let (chunks, report) = run(&engine).await;

        assert_eq!(report.outcome, RunOutcome::Exhausted);
        assert_eq!(report.iterations, 1);
        assert_eq!(report.history.len(), 3);
        assert_eq!(completion.prompts().len(), 1);
        assert_single_terminal(&chunks);
    }

    #[tokio::test]
    async fn test_history_only_grows() {
        let (engine, _) = engine(vec![vec![CALLS]], 3);
        let (_, report) = run(&engine).await;

        assert_eq!(report.outcome, RunOutcome::Exhausted);
        assert_eq!(report.history.len(), 9);
        assert_eq!(&report.history[..3], &report.history[3..6]);
    }

    #[tokio::test]
    async fn test_completion_failure_yields_error_chunk_then_terminal() {
        let engine = DecisionLoop::new(Arc::new(BrokenCompletion), DelayRole, 10);
        let (chunks, report) = run(&engine).await;

        assert!(matches!(report.outcome, RunOutcome::Failed(ref msg) if msg.contains("quota exceeded")));
        assert_eq!(chunks[0].content, "partial ");
        assert!(chunks[chunks.len() - 2].content.contains("quota exceeded"));
        assert_single_terminal(&chunks);
    }

    #[tokio::test]
    async fn test_dropped_consumer_abandons_run() {
        let (engine, _) = engine(vec![vec!["a", "b", "c"]], 10);
        let (tx, rx) = mpsc::channel(1);
        drop(rx);

        let report = engine.execute("q", &tx).await;
        assert_eq!(report.outcome, RunOutcome::Abandoned);
    }

    #[tokio::test]
    async fn test_background_stream_ends_with_terminal_chunk() {
        let (engine, _) = engine(vec![vec![CALLS], vec!["final"]], 10);
        let chunks: Vec<StreamChunk> = engine.stream("q").collect().await;

        assert_single_terminal(&chunks);
        assert_eq!(chunks[chunks.len() - 2].content, "final");
    }
}
