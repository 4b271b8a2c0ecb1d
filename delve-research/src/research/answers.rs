//! Per-run registry that hands clarification answers to waiting questions

use super::types::ClarificationAnswer;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, warn};

#[derive(Debug, Default)]
struct RegistryInner {
    next_id: u64,
    /// question -> (registration id, resolver)
    pending: HashMap<String, (u64, oneshot::Sender<ClarificationAnswer>)>,
}

/// Single-slot question/answer handoff, keyed by question text.
///
/// Cloning shares the table. Each registration can be resolved at most once;
/// answers for questions that are not pending are ignored.
#[derive(Debug, Clone, Default)]
pub struct AnswerRegistry {
    inner: Arc<Mutex<RegistryInner>>,
}

impl AnswerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a waiter for `question`.
    ///
    /// A waiter already registered for the same text is displaced and
    /// resolves to skip.
    pub fn register(&self, question: &str) -> PendingAnswer {
        let (tx, rx) = oneshot::channel();
        let mut inner = self.lock();
        inner.next_id += 1;
        let id = inner.next_id;
        if inner
            .pending
            .insert(question.to_string(), (id, tx))
            .is_some()
        {
            warn!(question = question, "Displacing an existing clarification waiter");
        }
        debug!(question = question, id = id, "Registered clarification waiter");

        PendingAnswer {
            question: question.to_string(),
            id,
            rx,
            registry: self.clone(),
        }
    }

    /// Deliver an answer. Returns false when nothing was waiting for it.
    pub fn submit_answer(&self, question: &str, answer: &str) -> bool {
        self.resolve(question, ClarificationAnswer::from_text(answer))
    }

    /// Resolve a pending question as skipped
    pub fn skip(&self, question: &str) -> bool {
        self.resolve(question, ClarificationAnswer::Skip)
    }

    fn resolve(&self, question: &str, answer: ClarificationAnswer) -> bool {
        let slot = self.lock().pending.remove(question);
        match slot {
            Some((id, tx)) => {
                let delivered = tx.send(answer).is_ok();
                debug!(question = question, id = id, delivered, "Resolved clarification");
                delivered
            }
            None => {
                debug!(question = question, "No pending clarification, answer ignored");
                false
            }
        }
    }

    /// Register and wait in one step
    pub async fn wait_for_answer(&self, question: &str, timeout: Duration) -> ClarificationAnswer {
        self.register(question).wait(timeout).await
    }

    pub fn is_pending(&self, question: &str) -> bool {
        self.lock().pending.contains_key(question)
    }

    pub fn pending_count(&self) -> usize {
        self.lock().pending.len()
    }

    /// Drop every registration; their waiters resolve to skip
    pub fn clear(&self) {
        let drained = std::mem::take(&mut self.lock().pending);
        if !drained.is_empty() {
            debug!(count = drained.len(), "Cleared pending clarifications");
        }
    }

    fn release(&self, question: &str, id: u64) {
        let mut inner = self.lock();
        if inner
            .pending
            .get(question)
            .is_some_and(|(current, _)| *current == id)
        {
            inner.pending.remove(question);
        }
    }
}

/// A registered, not yet resolved question.
///
/// Dropping it, whether after `wait` returns or because the owning task was
/// cancelled, removes its registration.
#[derive(Debug)]
pub struct PendingAnswer {
    question: String,
    id: u64,
    rx: oneshot::Receiver<ClarificationAnswer>,
    registry: AnswerRegistry,
}

impl PendingAnswer {
    pub fn question(&self) -> &str {
        &self.question
    }

    /// Wait for the answer; skip on timeout or when the resolver goes away
    pub async fn wait(mut self, timeout: Duration) -> ClarificationAnswer {
        match tokio::time::timeout(timeout, &mut self.rx).await {
            Ok(Ok(answer)) => answer,
            Ok(Err(_)) => {
                debug!(question = %self.question, "Clarification resolver dropped, skipping");
                ClarificationAnswer::Skip
            }
            Err(_) => {
                debug!(
                    question = %self.question,
                    timeout_ms = timeout.as_millis() as u64,
                    "Clarification timed out, skipping"
                );
                ClarificationAnswer::Skip
            }
        }
    }
}

impl Drop for PendingAnswer {
    fn drop(&mut self) {
        self.registry.release(&self.question, self.id);
    }
}
