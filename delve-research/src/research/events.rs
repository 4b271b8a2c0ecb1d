//! Event stream shared between the orchestrator and its caller

use super::answers::AnswerRegistry;
use super::types::{DeepResearchResult, ResearchProgress};
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Everything a research run reports to its consumer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "lowercase")]
pub enum ResearchEvent {
    Progress(ResearchProgress),
    Question { question: String },
    Thought { thought: String },
    Result(Box<DeepResearchResult>),
    Error { message: String },
}

impl ResearchEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ResearchEvent::Progress(_) => "progress",
            ResearchEvent::Question { .. } => "question",
            ResearchEvent::Thought { .. } => "thought",
            ResearchEvent::Result(_) => "result",
            ResearchEvent::Error { .. } => "error",
        }
    }

    /// `Result` and `Error` end a run
    pub fn is_terminal(&self) -> bool {
        matches!(self, ResearchEvent::Result(_) | ResearchEvent::Error { .. })
    }

    /// Server-sent-events framing: `event: <name>\ndata: <json>\n\n`
    pub fn to_sse(&self) -> Result<String, serde_json::Error> {
        let data = match self {
            ResearchEvent::Progress(progress) => serde_json::to_string(progress)?,
            ResearchEvent::Question { question } => {
                serde_json::to_string(&serde_json::json!({ "question": question }))?
            }
            ResearchEvent::Thought { thought } => {
                serde_json::to_string(&serde_json::json!({ "thought": thought }))?
            }
            ResearchEvent::Result(result) => {
                serde_json::to_string(&serde_json::json!({ "results": result }))?
            }
            ResearchEvent::Error { message } => {
                serde_json::to_string(&serde_json::json!({ "message": message }))?
            }
        };
        Ok(format!("event: {}\ndata: {}\n\n", self.name(), data))
    }
}

/// Sending half of a run's event stream.
///
/// Emission never fails: once the consumer has gone away events are dropped,
/// and `is_closed` lets long-running steps notice and stop early.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: Option<mpsc::UnboundedSender<ResearchEvent>>,
}

impl EventSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ResearchEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// A sink that discards everything
    pub fn noop() -> Self {
        Self { tx: None }
    }

    /// Returns false when the event could not be delivered
    pub fn emit(&self, event: ResearchEvent) -> bool {
        match &self.tx {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }

    pub fn progress(&self, progress: &ResearchProgress) {
        self.emit(ResearchEvent::Progress(progress.clone()));
    }

    pub fn thought(&self, thought: impl Into<String>) {
        let thought = thought.into();
        debug!(thought = %thought, "Research thought");
        self.emit(ResearchEvent::Thought { thought });
    }

    pub fn question(&self, question: &str) {
        self.emit(ResearchEvent::Question {
            question: question.to_string(),
        });
    }

    pub fn is_closed(&self) -> bool {
        self.tx.as_ref().is_some_and(|tx| tx.is_closed())
    }
}

/// A running research task seen from the caller.
///
/// Yields events until the terminal `Result` or `Error`. Dropping the run
/// aborts the task; pending clarification waits release their registrations
/// as they are dropped.
pub struct ResearchRun {
    events: mpsc::UnboundedReceiver<ResearchEvent>,
    answers: AnswerRegistry,
    task: JoinHandle<()>,
}

impl ResearchRun {
    pub(crate) fn new(
        events: mpsc::UnboundedReceiver<ResearchEvent>,
        answers: AnswerRegistry,
        task: JoinHandle<()>,
    ) -> Self {
        Self {
            events,
            answers,
            task,
        }
    }

    /// Handle for delivering answers to this run's clarifying questions
    pub fn answers(&self) -> AnswerRegistry {
        self.answers.clone()
    }

    /// Next event, or None once the run has finished
    pub async fn next_event(&mut self) -> Option<ResearchEvent> {
        self.events.recv().await
    }

    /// Stop the run without waiting for a terminal event
    pub fn cancel(self) {
        drop(self);
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Stream for ResearchRun {
    type Item = ResearchEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.events.poll_recv(cx)
    }
}

impl Drop for ResearchRun {
    fn drop(&mut self) {
        if !self.task.is_finished() {
            debug!("Research run dropped before completion, aborting");
            self.task.abort();
        }
        self.answers.clear();
    }
}
