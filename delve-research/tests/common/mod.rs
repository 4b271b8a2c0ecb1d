//! Shared test utilities: scripted backends and configuration helpers

#![allow(dead_code)]

use async_trait::async_trait;
use delve_core::{
    llm_error, search_error, CompletionOptions, DelveResult, LanguageModel, ResearchConfig,
    RetryConfig, SearchBackend, SourceInfo,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

static INIT: Once = Once::new();

/// Initialize logging for tests
pub fn init_logging() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("delve_research=debug,info")
            .with_test_writer()
            .try_init();
    });
}

pub const SHARED_URL: &str = "https://shared.example.org/overview";

type Handler = Box<dyn Fn(&str, &str) -> DelveResult<String> + Send + Sync>;

/// Language model answering from a closure of `(operation, user_prompt)`
pub struct ScriptedModel {
    handler: Handler,
    calls: Mutex<Vec<(String, String)>>,
}

impl ScriptedModel {
    pub fn new(
        handler: impl Fn(&str, &str) -> DelveResult<String> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            handler: Box::new(handler),
            calls: Mutex::new(Vec::new()),
        })
    }

    /// Model following the standard research script
    pub fn research_script() -> Arc<Self> {
        Self::new(research_script)
    }

    /// Prompts received for `operation`, in call order
    pub fn prompts(&self, operation: &str) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(op, _)| op == operation)
            .map(|(_, prompt)| prompt.clone())
            .collect()
    }

    pub fn call_count(&self, operation: &str) -> usize {
        self.prompts(operation).len()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(
        &self,
        _system_prompt: &str,
        user_prompt: &str,
        options: &CompletionOptions,
    ) -> DelveResult<String> {
        self.calls
            .lock()
            .unwrap()
            .push((options.operation.to_string(), user_prompt.to_string()));
        (self.handler)(options.operation, user_prompt)
    }
}

/// Text between the first `start` and the following `end`
pub fn between<'a>(text: &'a str, start: &str, end: &str) -> &'a str {
    let from = text.find(start).map(|i| i + start.len()).unwrap_or(0);
    let to = text[from..].find(end).map(|i| from + i).unwrap_or(text.len());
    &text[from..to]
}

/// Standard answers for every operation the engine performs
pub fn research_script(operation: &str, prompt: &str) -> DelveResult<String> {
    match operation {
        "clarifying_questions" => Ok(serde_json::json!({
            "questions": ["Which industry are you interested in?", "Which region?"]
        })
        .to_string()),
        "generate_sub_queries" => {
            let topic = between(prompt, "<prompt>", "</prompt>")
                .lines()
                .last()
                .unwrap_or("topic")
                .trim()
                .to_string();
            Ok(serde_json::json!({
                "queries": [
                    {"query": format!("{} productivity", topic), "researchGoal": "Measure productivity"},
                    {"query": format!("{} wellbeing", topic), "researchGoal": "Understand wellbeing"},
                    {"query": format!("{} costs", topic), "researchGoal": "Compare costs"},
                    {"query": format!("{} history", topic), "researchGoal": "Trace history"}
                ]
            })
            .to_string())
        }
        "summarize_results" => {
            let query = between(prompt, "<query>", "</query>");
            Ok(serde_json::json!({
                "learnings": [
                    format!("Surveys on {} report a 13% change", query),
                    format!("Teams studying {} rely on async tools", query)
                ],
                "followUpQuestions": [format!("What are the long-term effects of {}?", query)]
            })
            .to_string())
        }
        "extract_facts" => Ok(serde_json::json!({
            "facts": [
                {"fact": "Remote work changes productivity", "context": "surveys", "source": "1"},
                {"fact": "Async tools are common", "source": "not a listed source"}
            ]
        })
        .to_string()),
        "adjust_reading_level" => Ok(format!("Adjusted: {}", prompt.len())),
        other => Err(llm_error!(format!("unexpected operation {}", other), "scripted_model")),
    }
}

/// Search backend returning two documents per query, one of them shared
pub struct MockSearch {
    fail_when: Vec<String>,
    delay_for: Vec<(String, Duration)>,
    calls: AtomicUsize,
    queries: Mutex<Vec<String>>,
}

impl MockSearch {
    pub fn new() -> Arc<Self> {
        Self::build(Vec::new(), Vec::new())
    }

    /// Fail every query containing any of `needles`
    pub fn failing(needles: &[&str]) -> Arc<Self> {
        Self::build(needles.iter().map(|s| s.to_string()).collect(), Vec::new())
    }

    /// Delay queries containing a needle by the paired duration
    pub fn delayed(delays: &[(&str, u64)]) -> Arc<Self> {
        Self::build(
            Vec::new(),
            delays
                .iter()
                .map(|(needle, ms)| (needle.to_string(), Duration::from_millis(*ms)))
                .collect(),
        )
    }

    fn build(fail_when: Vec<String>, delay_for: Vec<(String, Duration)>) -> Arc<Self> {
        Arc::new(Self {
            fail_when,
            delay_for,
            calls: AtomicUsize::new(0),
            queries: Mutex::new(Vec::new()),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl SearchBackend for MockSearch {
    async fn search(&self, query: &str, limit: usize) -> DelveResult<Vec<SourceInfo>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.queries.lock().unwrap().push(query.to_string());

        if let Some((_, delay)) = self.delay_for.iter().find(|(n, _)| query.contains(n.as_str())) {
            tokio::time::sleep(*delay).await;
        }
        if self.fail_when.iter().any(|needle| query.contains(needle.as_str())) {
            return Err(search_error!("backend unavailable", "mock_search"));
        }

        let slug = query.replace(' ', "-");
        Ok(vec![
            SourceInfo::new(format!("https://example.com/{}", slug))
                .with_title(format!("About {}", query))
                .with_content(format!("Detailed content about {}.", query)),
            SourceInfo::new(SHARED_URL)
                .with_title("Overview")
                .with_snippet("A shared overview page"),
        ]
        .into_iter()
        .take(limit)
        .collect())
    }
}

/// Fast configuration: no retry delays, short clarification timeout
pub fn test_config(breadth: usize, depth: usize) -> ResearchConfig {
    ResearchConfig {
        breadth,
        depth,
        concurrency: 2,
        max_clarifying_questions: 2,
        clarification_timeout_secs: 5,
        fact_chunk_chars: 4000,
        retry: RetryConfig::immediate(2),
        ..Default::default()
    }
}
