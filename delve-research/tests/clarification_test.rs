//! Clarification negotiation and answer registry tests

mod common;

use common::{research_script, ScriptedModel};
use delve_core::{config_error, RetryConfig};
use delve_research::{
    AnswerRegistry, ClarificationAnswer, ClarificationNegotiator, EventSink, ResearchEvent,
};
use std::sync::Arc;
use std::time::Duration;

fn negotiator(llm: Arc<ScriptedModel>, timeout_ms: u64) -> ClarificationNegotiator {
    ClarificationNegotiator::new(
        llm,
        3,
        Duration::from_millis(timeout_ms),
        RetryConfig::immediate(2),
    )
}

#[tokio::test]
async fn test_unanswered_question_times_out_to_skip() {
    let registry = AnswerRegistry::new();
    let answer = registry
        .wait_for_answer("Which region?", Duration::from_millis(20))
        .await;

    assert_eq!(answer, ClarificationAnswer::Skip);
    assert_eq!(registry.pending_count(), 0);
    // A late answer is a no-op
    assert!(!registry.submit_answer("Which region?", "Europe"));
}

#[tokio::test]
async fn test_second_answer_is_a_no_op() {
    let registry = AnswerRegistry::new();
    let pending = registry.register("Which industry?");

    assert!(registry.submit_answer("Which industry?", "Healthcare"));
    assert!(!registry.submit_answer("Which industry?", "Finance"));
    assert_eq!(
        pending.wait(Duration::from_secs(1)).await,
        ClarificationAnswer::Answer("Healthcare".to_string())
    );
}

#[tokio::test]
async fn test_cancelled_wait_releases_registration() {
    let registry = AnswerRegistry::new();
    let waiter = {
        let registry = registry.clone();
        tokio::spawn(async move {
            registry
                .wait_for_answer("Which region?", Duration::from_secs(60))
                .await
        })
    };

    while !registry.is_pending("Which region?") {
        tokio::task::yield_now().await;
    }
    waiter.abort();
    assert!(waiter.await.unwrap_err().is_cancelled());
    assert_eq!(registry.pending_count(), 0);
}

#[tokio::test]
async fn test_answer_delivered_from_another_task() {
    let registry = AnswerRegistry::new();
    let pending = registry.register("Which period?");
    let answering = registry.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        answering.submit_answer("Which period?", "Since 2020");
    });

    assert_eq!(
        pending.wait(Duration::from_secs(5)).await,
        ClarificationAnswer::Answer("Since 2020".to_string())
    );
}

#[tokio::test]
async fn test_negotiation_with_timeouts_keeps_original_query() {
    let llm = ScriptedModel::research_script();
    let registry = AnswerRegistry::new();
    let (sink, mut rx) = EventSink::channel();

    let clarified = negotiator(llm, 20)
        .negotiate("benefits of remote work", &registry, &sink)
        .await;

    assert_eq!(clarified.exchanges.len(), 2);
    assert!(clarified
        .exchanges
        .iter()
        .all(|e| e.answer == ClarificationAnswer::Skip));
    assert_eq!(clarified.refined, "benefits of remote work");
    assert_eq!(registry.pending_count(), 0);

    let mut questions = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let ResearchEvent::Question { question } = event {
            questions.push(question);
        }
    }
    assert_eq!(
        questions,
        vec!["Which industry are you interested in?", "Which region?"]
    );
}

#[tokio::test]
async fn test_question_generation_failure_means_no_questions() {
    let llm = ScriptedModel::new(|operation, prompt| match operation {
        "clarifying_questions" => Err(config_error!("missing api key", "test")),
        _ => research_script(operation, prompt),
    });
    let (sink, mut rx) = EventSink::channel();

    let clarified = negotiator(llm.clone(), 20)
        .negotiate("remote work", &AnswerRegistry::new(), &sink)
        .await;

    assert!(clarified.exchanges.is_empty());
    assert_eq!(clarified.refined, "remote work");
    // Unrecoverable errors are not retried
    assert_eq!(llm.call_count("clarifying_questions"), 1);

    let mut thoughts = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let ResearchEvent::Thought { thought } = event {
            thoughts.push(thought);
        }
    }
    assert!(thoughts.iter().any(|t| t.contains("Could not generate follow-up questions")));
}
