//! Clarifying questions and their resolution

use super::answers::AnswerRegistry;
use super::events::EventSink;
use super::prompts::{clarifying_questions_prompt, extract_json, research_system_prompt};
use super::types::{ClarificationAnswer, ClarificationExchange, ClarifiedQuery};
use delve_core::{retry_recoverable, CompletionOptions, LanguageModel, RetryConfig};
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum QuestionPayload {
    Wrapped { questions: Vec<String> },
    List(Vec<String>),
}

/// Generates follow-up questions for a query and waits for their answers
pub struct ClarificationNegotiator {
    llm: Arc<dyn LanguageModel>,
    max_questions: usize,
    timeout: Duration,
    retry: RetryConfig,
}

impl ClarificationNegotiator {
    pub fn new(
        llm: Arc<dyn LanguageModel>,
        max_questions: usize,
        timeout: Duration,
        retry: RetryConfig,
    ) -> Self {
        Self {
            llm,
            max_questions,
            timeout,
            retry,
        }
    }

    /// Ask the model for clarifying questions. Failures yield none.
    pub async fn ask_clarifying_questions(&self, query: &str, sink: &EventSink) -> Vec<String> {
        if self.max_questions == 0 {
            return Vec::new();
        }

        sink.thought("Generating follow-up questions to better understand your query...");
        let system = research_system_prompt();
        let prompt = clarifying_questions_prompt(query, self.max_questions);
        let options = CompletionOptions::json("clarifying_questions");

        let response = retry_recoverable(
            || self.llm.complete(&system, &prompt, &options),
            &self.retry,
            "clarifying_questions",
        )
        .await;

        match response {
            Ok(text) => {
                let questions = parse_questions(&text, self.max_questions);
                info!(count = questions.len(), "Generated clarifying questions");
                questions
            }
            Err(error) => {
                warn!(error = %error, "Could not generate clarifying questions");
                sink.thought(format!(
                    "Could not generate follow-up questions, continuing with the original query: {}",
                    error
                ));
                Vec::new()
            }
        }
    }

    /// Publish `question` and wait for its answer.
    ///
    /// The waiter is registered before the question is emitted. Timeout or a
    /// failed answer channel resolves to skip.
    pub async fn resolve(
        &self,
        question: &str,
        answers: &AnswerRegistry,
        sink: &EventSink,
    ) -> ClarificationAnswer {
        let pending = answers.register(question);
        sink.question(question);
        pending.wait(self.timeout).await
    }

    /// Ask, resolve each question in order, and build the refined query
    pub async fn negotiate(
        &self,
        query: &str,
        answers: &AnswerRegistry,
        sink: &EventSink,
    ) -> ClarifiedQuery {
        let questions = self.ask_clarifying_questions(query, sink).await;
        let mut exchanges = Vec::with_capacity(questions.len());

        for question in questions {
            let answer = self.resolve(&question, answers, sink).await;
            if answer.as_answer().is_some() {
                sink.thought("Incorporating your answer into the research context...");
            }
            exchanges.push(ClarificationExchange { question, answer });
        }

        let refined = build_refined_query(query, &exchanges);
        ClarifiedQuery {
            original: query.to_string(),
            exchanges,
            refined,
        }
    }
}

/// `Initial Query: Q` followed by one `Q:`/`A:` pair per answered question.
/// With no answers the original query is returned unchanged.
pub fn build_refined_query(query: &str, exchanges: &[ClarificationExchange]) -> String {
    let answered: Vec<String> = exchanges
        .iter()
        .filter_map(|exchange| {
            exchange
                .answer
                .as_answer()
                .map(|answer| format!("Q: {}\nA: {}", exchange.question, answer))
        })
        .collect();

    if answered.is_empty() {
        return query.to_string();
    }
    format!("Initial Query: {}\n{}", query, answered.join("\n"))
}

/// Read questions from JSON, falling back to lines ending in `?`
pub fn parse_questions(text: &str, max_questions: usize) -> Vec<String> {
    let candidates = match extract_json::<QuestionPayload>(text) {
        Some(QuestionPayload::Wrapped { questions }) | Some(QuestionPayload::List(questions)) => {
            questions
        }
        None => text
            .lines()
            .map(|line| {
                line.trim()
                    .trim_start_matches(|c: char| {
                        c.is_ascii_digit() || matches!(c, '-' | '*' | '.' | ')' | '•')
                    })
                    .trim()
                    .to_string()
            })
            .filter(|line| line.ends_with('?'))
            .collect(),
    };

    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .map(|q| q.trim().to_string())
        .filter(|q| !q.is_empty())
        .filter(|q| seen.insert(q.to_lowercase()))
        .take(max_questions)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refined_query_without_answers_is_original() {
        let exchanges = vec![
            ClarificationExchange {
                question: "Which industry?".to_string(),
                answer: ClarificationAnswer::Skip,
            },
            ClarificationExchange {
                question: "Which region?".to_string(),
                answer: ClarificationAnswer::Skip,
            },
        ];
        assert_eq!(
            build_refined_query("benefits of remote work", &exchanges),
            "benefits of remote work"
        );
    }

    #[test]
    fn test_refined_query_folds_answers_in_order() {
        let exchanges = vec![
            ClarificationExchange {
                question: "Which industry?".to_string(),
                answer: ClarificationAnswer::Answer("Software".to_string()),
            },
            ClarificationExchange {
                question: "Which region?".to_string(),
                answer: ClarificationAnswer::Skip,
            },
            ClarificationExchange {
                question: "Which period?".to_string(),
                answer: ClarificationAnswer::Answer("2020-2024".to_string()),
            },
        ];
        assert_eq!(
            build_refined_query("remote work", &exchanges),
            "Initial Query: remote work\nQ: Which industry?\nA: Software\nQ: Which period?\nA: 2020-2024"
        );
    }

    #[test]
    fn test_parse_questions() {
        assert_eq!(
            parse_questions(r#"{"questions": ["A?", "B?", "a?", "C?"]}"#, 2),
            vec!["A?".to_string(), "B?".to_string()]
        );
        assert_eq!(
            parse_questions("Some intro\n1. Which sector?\n- Which country?\nThanks", 5),
            vec!["Which sector?".to_string(), "Which country?".to_string()]
        );
    }
}
