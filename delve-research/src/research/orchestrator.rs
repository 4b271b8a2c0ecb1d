//! Top-level research façade
//!
//! Sequences clarification, recursive research, fact extraction, source
//! validation and formatting, and reports everything on the run's event
//! stream.

use super::answers::AnswerRegistry;
use super::clarification::ClarificationNegotiator;
use super::confidence::validate_sources;
use super::driver::ResearchDriver;
use super::events::{EventSink, ResearchEvent, ResearchRun};
use super::facts::FactExtractor;
use super::formatter::format_report;
use super::types::{ClarifiedQuery, DeepResearchResult};
use crate::{EngineError, EngineResult};
use delve_core::performance::measure_async;
use delve_core::{
    log_operation_start, log_operation_success, LanguageModel, ResearchConfig, ResearchStore,
    SearchBackend, SourceInfo, StoredResearch,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub const RESULT_TITLE: &str = "Research Results";

/// Drives one research run per call
#[derive(Clone)]
pub struct ResearchOrchestrator {
    llm: Arc<dyn LanguageModel>,
    search: Arc<dyn SearchBackend>,
    store: Option<Arc<dyn ResearchStore>>,
    config: ResearchConfig,
    clarify: bool,
}

impl ResearchOrchestrator {
    pub fn new(
        llm: Arc<dyn LanguageModel>,
        search: Arc<dyn SearchBackend>,
        config: ResearchConfig,
    ) -> Self {
        Self {
            llm,
            search,
            store: None,
            config,
            clarify: true,
        }
    }

    /// Cache results in `store` and reuse stored results for repeated queries
    pub fn with_store(mut self, store: Arc<dyn ResearchStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Skip the clarifying-questions phase
    pub fn without_clarification(mut self) -> Self {
        self.clarify = false;
        self
    }

    pub fn config(&self) -> &ResearchConfig {
        &self.config
    }

    /// Start a run in the background and return its event stream.
    ///
    /// The stream ends with exactly one `Result` or `Error` event. Must be
    /// called from within a Tokio runtime.
    pub fn run_research(&self, query: impl Into<String>) -> ResearchRun {
        let query = query.into();
        let (sink, events) = EventSink::channel();
        let answers = AnswerRegistry::new();

        let orchestrator = self.clone();
        let task_answers = answers.clone();
        let task = tokio::spawn(async move {
            match orchestrator.research(&query, &sink, &task_answers).await {
                Ok(result) => {
                    sink.emit(ResearchEvent::Result(Box::new(result)));
                }
                Err(EngineError::Cancelled) => {
                    info!("Research run abandoned by its consumer");
                }
                Err(error) => {
                    error.log();
                    sink.emit(ResearchEvent::Error {
                        message: error.to_string(),
                    });
                }
            }
            task_answers.clear();
        });

        ResearchRun::new(events, answers, task)
    }

    /// Run the whole pipeline, reporting on `sink` and taking clarification
    /// answers from `answers`
    pub async fn research(
        &self,
        query: &str,
        sink: &EventSink,
        answers: &AnswerRegistry,
    ) -> EngineResult<DeepResearchResult> {
        let query = query.trim();
        if query.is_empty() {
            return Err(EngineError::validation("Query must be a non-empty string"));
        }
        log_operation_start!("research", query = %query);
        sink.thought("Starting research...");

        if let Some(cached) = self.cached_result(query).await {
            sink.thought("Found a stored result for this query");
            return Ok(cached);
        }

        ensure_open(sink)?;
        let clarified = if self.clarify {
            self.negotiator().negotiate(query, answers, sink).await
        } else {
            ClarifiedQuery {
                original: query.to_string(),
                exchanges: Vec::new(),
                refined: query.to_string(),
            }
        };

        ensure_open(sink)?;
        sink.thought("Starting deep research with refined query...");
        let driver = ResearchDriver::new(
            Arc::clone(&self.llm),
            Arc::clone(&self.search),
            self.config.clone(),
        );
        let output = measure_async(
            "deep_research",
            driver.research(
                &clarified.refined,
                self.config.breadth,
                self.config.depth,
                sink,
            ),
        )
        .await?;

        ensure_open(sink)?;
        sink.thought("Research complete! Organizing and formatting results...");
        let sources = dedupe_sources(output.sources);
        let extractor = FactExtractor::new(
            Arc::clone(&self.llm),
            self.config.fact_chunk_chars,
            self.config.retry.clone(),
        )
        .with_concurrency(self.config.concurrency);
        let facts = extractor
            .extract_facts(&output.learnings.join("\n\n"), &sources, sink)
            .await;

        ensure_open(sink)?;
        let validated_sources = validate_sources(&sources);
        let content = format_report(&output.learnings);
        let suggested_topics =
            suggested_topics(output.unexplored_directions, self.config.max_suggested_topics);

        let mut result = DeepResearchResult {
            title: RESULT_TITLE.to_string(),
            content,
            sources,
            suggested_topics,
            facts,
            validated_sources,
            refined_query: clarified.refined,
            record_id: None,
        };

        if let Some(store) = &self.store {
            match store
                .store(
                    query,
                    &result.content,
                    &result.sources,
                    result.suggested_topics.as_deref(),
                )
                .await
            {
                Ok(id) => result.record_id = Some(id),
                Err(error) => warn!(error = %error, "Could not store research result"),
            }
        }

        log_operation_success!(
            "research",
            sources = result.sources.len(),
            facts = result.facts.len()
        );
        Ok(result)
    }

    fn negotiator(&self) -> ClarificationNegotiator {
        ClarificationNegotiator::new(
            Arc::clone(&self.llm),
            self.config.max_clarifying_questions,
            Duration::from_secs(self.config.clarification_timeout_secs),
            self.config.retry.clone(),
        )
    }

    async fn cached_result(&self, query: &str) -> Option<DeepResearchResult> {
        let store = self.store.as_ref()?;
        match store.find(query).await {
            Ok(record) => record.map(result_from_record),
            Err(error) => {
                warn!(error = %error, "Research cache lookup failed");
                None
            }
        }
    }
}

fn ensure_open(sink: &EventSink) -> EngineResult<()> {
    if sink.is_closed() {
        Err(EngineError::Cancelled)
    } else {
        Ok(())
    }
}

fn result_from_record(record: StoredResearch) -> DeepResearchResult {
    let validated_sources = validate_sources(&record.sources);
    DeepResearchResult {
        title: RESULT_TITLE.to_string(),
        content: record.content,
        sources: record.sources,
        suggested_topics: record.suggested_topics,
        facts: Vec::new(),
        validated_sources,
        refined_query: record.query,
        record_id: Some(record.id),
    }
}

/// Keep the first entry per URL, filling its missing fields from later
/// duplicates
pub fn dedupe_sources(sources: Vec<SourceInfo>) -> Vec<SourceInfo> {
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut unique: Vec<SourceInfo> = Vec::new();

    for source in sources {
        match positions.get(&source.url) {
            Some(&index) => {
                let kept = &mut unique[index];
                if kept.title.is_none() {
                    kept.title = source.title;
                }
                if kept.content.is_none() {
                    kept.content = source.content;
                }
                if kept.snippet.is_none() {
                    kept.snippet = source.snippet;
                }
            }
            None => {
                positions.insert(source.url.clone(), unique.len());
                unique.push(source);
            }
        }
    }
    unique
}

fn suggested_topics(directions: Vec<String>, limit: usize) -> Option<Vec<String>> {
    let mut seen = HashSet::new();
    let topics: Vec<String> = directions
        .into_iter()
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty())
        .filter(|d| seen.insert(d.to_lowercase()))
        .take(limit)
        .collect();
    (!topics.is_empty()).then_some(topics)
}
