//! Recursive breadth/depth-bounded research driver
//!
//! Each level expands a query into sub-queries, searches and summarises them
//! with bounded concurrency, and joins every sibling before descending into
//! the follow-up directions they produced.

use super::events::EventSink;
use super::prompts::{
    extract_json, research_system_prompt, sub_queries_prompt, summarize_results_prompt,
    truncate_chars, DOCUMENT_CHAR_LIMIT,
};
use super::types::{DriverOutput, Learning, ResearchProgress, SubQuery};
use crate::{EngineError, EngineResult};
use delve_core::{
    process_concurrently, retry_recoverable, BreadthPolicy, CompletionOptions, DelveError,
    DelveResult, ErrorContext, LanguageModel, ResearchConfig, SearchBackend, SourceInfo,
};
use futures::future::{BoxFuture, FutureExt};
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Follow-up directions kept per sub-query
const MAX_FOLLOW_UPS: usize = 3;

/// Upper bound on sub-queries for a `(breadth, depth)` budget: the sum over
/// levels of the product of per-level breadths.
pub fn total_queries(breadth: usize, depth: usize, policy: BreadthPolicy) -> usize {
    let mut total = 0usize;
    let mut nodes = 1usize;
    let mut level_breadth = breadth;
    for _ in 0..depth {
        nodes = nodes.saturating_mul(level_breadth);
        total = total.saturating_add(nodes);
        level_breadth = policy.next(level_breadth);
    }
    total
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SubQueryItem {
    Full(SubQuery),
    Plain(String),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SubQueryPayload {
    Wrapped { queries: Vec<SubQueryItem> },
    List(Vec<SubQueryItem>),
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SummaryPayload {
    #[serde(default)]
    learnings: Vec<String>,
    #[serde(default, alias = "follow_up_questions")]
    follow_up_questions: Vec<String>,
}

/// What one processed sub-query produced
struct QueryOutcome {
    sub_query: SubQuery,
    learnings: Vec<Learning>,
    follow_ups: Vec<String>,
    sources: Vec<SourceInfo>,
    failed: bool,
}

impl QueryOutcome {
    fn new(sub_query: SubQuery) -> Self {
        Self {
            sub_query,
            learnings: Vec::new(),
            follow_ups: Vec::new(),
            sources: Vec::new(),
            failed: false,
        }
    }
}

/// Progress shared by every branch of one run
struct RunState<'a> {
    progress: Mutex<ResearchProgress>,
    sink: &'a EventSink,
}

impl RunState<'_> {
    fn update(&self, change: impl FnOnce(&mut ResearchProgress)) {
        let snapshot = {
            let mut progress = self
                .progress
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            change(&mut progress);
            progress.clone()
        };
        self.sink.progress(&snapshot);
    }

    fn start(&self, level: usize, index: usize, query: &str) {
        self.update(|p| {
            p.current_depth = level.min(p.total_depth);
            p.current_breadth = index.min(p.total_breadth);
            p.current_query = Some(query.to_string());
        });
    }

    fn complete(&self) {
        self.update(|p| {
            if p.completed_queries < p.total_queries {
                p.completed_queries += 1;
            }
        });
    }
}

impl DriverOutput {
    fn absorb_sources(&mut self, seen: &mut HashSet<String>, sources: Vec<SourceInfo>) {
        for source in sources {
            if seen.insert(source.url.clone()) {
                self.visited_urls.push(source.url.clone());
            }
            self.sources.push(source);
        }
    }

    fn absorb(&mut self, seen: &mut HashSet<String>, child: DriverOutput) {
        self.learnings.extend(child.learnings);
        self.absorb_sources(seen, child.sources);
        self.unexplored_directions.extend(child.unexplored_directions);
        self.failed_queries += child.failed_queries;
    }
}

/// Runs the bounded recursive search
pub struct ResearchDriver {
    llm: Arc<dyn LanguageModel>,
    search: Arc<dyn SearchBackend>,
    config: ResearchConfig,
}

impl ResearchDriver {
    pub fn new(
        llm: Arc<dyn LanguageModel>,
        search: Arc<dyn SearchBackend>,
        config: ResearchConfig,
    ) -> Self {
        Self {
            llm,
            search,
            config,
        }
    }

    /// Research `query` with a `(breadth, depth)` budget.
    ///
    /// Fails only when the query is empty, the budget is zero, the run is
    /// cancelled, or the top level produced nothing at all.
    pub async fn research(
        &self,
        query: &str,
        breadth: usize,
        depth: usize,
        sink: &EventSink,
    ) -> EngineResult<DriverOutput> {
        if query.trim().is_empty() {
            return Err(EngineError::validation("Query must be a non-empty string"));
        }
        if breadth == 0 || depth == 0 {
            return Err(EngineError::validation(
                "Research breadth and depth must be at least 1",
            ));
        }

        let total = total_queries(breadth, depth, self.config.breadth_policy);
        let initial = ResearchProgress {
            total_depth: depth,
            total_breadth: breadth,
            total_queries: total,
            ..Default::default()
        };
        sink.progress(&initial);
        info!(breadth, depth, total_queries = total, "Starting recursive research");

        let state = RunState {
            progress: Mutex::new(initial),
            sink,
        };

        let mut output = self
            .explore(&state, query.to_string(), breadth, depth, 1, Vec::new())
            .await?;

        let mut seen = HashSet::new();
        output.learnings.retain(|learning| seen.insert(learning.clone()));
        let mut seen = HashSet::new();
        output
            .unexplored_directions
            .retain(|direction| seen.insert(direction.to_lowercase()));

        info!(
            learnings = output.learnings.len(),
            urls = output.visited_urls.len(),
            failed = output.failed_queries,
            "Recursive research finished"
        );
        Ok(output)
    }

    fn explore<'a>(
        &'a self,
        state: &'a RunState<'a>,
        query: String,
        breadth: usize,
        remaining_depth: usize,
        level: usize,
        prior_learnings: Vec<Learning>,
    ) -> BoxFuture<'a, EngineResult<DriverOutput>> {
        async move {
            if state.sink.is_closed() {
                return Err(EngineError::Cancelled);
            }

            state.sink.thought(format!(
                "Generating up to {} search queries at depth {}...",
                breadth, level
            ));
            let sub_queries = match self
                .generate_sub_queries(&query, breadth, &prior_learnings)
                .await
            {
                Ok(queries) if !queries.is_empty() => queries,
                Ok(_) => {
                    state.sink.thought("No search queries were generated for this branch");
                    if level == 1 {
                        return Err(EngineError::exhausted("no search queries could be generated"));
                    }
                    return Ok(DriverOutput::default());
                }
                Err(error) => {
                    warn!(level, error = %error, "Sub-query generation failed");
                    state.sink.thought(format!(
                        "Could not generate search queries at depth {}: {}",
                        level, error
                    ));
                    if level == 1 {
                        return Err(EngineError::exhausted(format!(
                            "could not generate search queries: {}",
                            error
                        )));
                    }
                    return Ok(DriverOutput::default());
                }
            };

            let attempted = sub_queries.len();
            debug!(level, attempted, "Processing sub-queries");
            let outcomes = process_concurrently(
                sub_queries.into_iter().enumerate().collect(),
                self.config.concurrency,
                |(index, sub_query)| self.process_sub_query(state, sub_query, index + 1, level),
            )
            .await;

            let mut output = DriverOutput::default();
            let mut seen_urls = HashSet::new();
            let mut accumulated = prior_learnings;
            let mut next_queries = Vec::new();

            for outcome in outcomes {
                if outcome.failed {
                    output.failed_queries += 1;
                }
                output.absorb_sources(&mut seen_urls, outcome.sources);
                accumulated.extend(outcome.learnings.iter().cloned());
                output.learnings.extend(outcome.learnings);

                if outcome.follow_ups.is_empty() {
                    continue;
                }
                if remaining_depth > 1 {
                    next_queries.push(follow_up_query(&outcome.sub_query, &outcome.follow_ups));
                } else {
                    output.unexplored_directions.extend(outcome.follow_ups);
                }
            }

            if level == 1 && output.learnings.is_empty() && output.failed_queries == attempted {
                return Err(EngineError::exhausted(format!(
                    "all {} searches failed",
                    attempted
                )));
            }

            if next_queries.is_empty() {
                return Ok(output);
            }

            let next_breadth = self.config.breadth_policy.next(breadth);
            state.sink.thought(format!(
                "Going deeper: {} follow-up direction(s) at depth {} with breadth {}",
                next_queries.len(),
                level + 1,
                next_breadth
            ));

            for next_query in next_queries {
                match self
                    .explore(
                        state,
                        next_query,
                        next_breadth,
                        remaining_depth - 1,
                        level + 1,
                        accumulated.clone(),
                    )
                    .await
                {
                    Ok(child) => output.absorb(&mut seen_urls, child),
                    Err(EngineError::Cancelled) => return Err(EngineError::Cancelled),
                    Err(error) => {
                        warn!(level = level + 1, error = %error, "Research branch failed");
                        state.sink.thought(format!("A research branch failed: {}", error));
                    }
                }
            }

            Ok(output)
        }
        .boxed()
    }

    async fn process_sub_query(
        &self,
        state: &RunState<'_>,
        sub_query: SubQuery,
        index: usize,
        level: usize,
    ) -> QueryOutcome {
        state.start(level, index, &sub_query.query);
        let outcome = self.search_and_summarize(state.sink, sub_query).await;
        state.complete();
        outcome
    }

    async fn search_and_summarize(&self, sink: &EventSink, sub_query: SubQuery) -> QueryOutcome {
        let mut outcome = QueryOutcome::new(sub_query);
        let query = outcome.sub_query.query.clone();
        sink.thought(format!("Searching for \"{}\"...", query));

        let documents = retry_recoverable(
            || self.search.search(&query, self.config.max_results_per_search),
            &self.config.retry,
            "search",
        )
        .await;

        let documents = match documents {
            Ok(documents) => documents,
            Err(error) => {
                warn!(query = %query, error = %error, "Search failed");
                sink.thought(format!("Search failed for \"{}\": {}", query, error));
                outcome.failed = true;
                return outcome;
            }
        };

        if documents.is_empty() {
            sink.thought(format!("No results found for \"{}\"", query));
            return outcome;
        }

        match self.summarize(&query, &documents).await {
            Ok(summary) => {
                sink.thought(format!(
                    "Found {} learning(s) from {} source(s) for \"{}\"",
                    summary.learnings.len(),
                    documents.len(),
                    query
                ));
                outcome.learnings = summary.learnings;
                outcome.follow_ups = summary.follow_up_questions;
            }
            Err(error) => {
                warn!(query = %query, error = %error, "Summarisation failed");
                sink.thought(format!(
                    "Could not summarise results for \"{}\": {}",
                    query, error
                ));
                outcome.failed = true;
            }
        }
        outcome.sources = documents;
        outcome
    }

    async fn generate_sub_queries(
        &self,
        query: &str,
        breadth: usize,
        prior_learnings: &[Learning],
    ) -> DelveResult<Vec<SubQuery>> {
        let system = research_system_prompt();
        let prompt = sub_queries_prompt(query, breadth, prior_learnings);
        let options = CompletionOptions::json("generate_sub_queries");

        let response = retry_recoverable(
            || self.llm.complete(&system, &prompt, &options),
            &self.config.retry,
            "generate_sub_queries",
        )
        .await?;

        let payload = extract_json::<SubQueryPayload>(&response)
            .ok_or_else(|| {
                parse_error("sub-query response was not valid JSON", "generate_sub_queries")
            })?;
        let items = match payload {
            SubQueryPayload::Wrapped { queries } => queries,
            SubQueryPayload::List(queries) => queries,
        };

        let mut seen = HashSet::new();
        Ok(items
            .into_iter()
            .map(|item| match item {
                SubQueryItem::Full(sub_query) => sub_query,
                SubQueryItem::Plain(query) => SubQuery {
                    query,
                    research_goal: String::new(),
                },
            })
            .map(|mut sub_query| {
                sub_query.query = sub_query.query.trim().to_string();
                sub_query
            })
            .filter(|sub_query| !sub_query.query.is_empty())
            .filter(|sub_query| seen.insert(sub_query.query.to_lowercase()))
            .take(breadth)
            .collect())
    }

    async fn summarize(
        &self,
        query: &str,
        documents: &[SourceInfo],
    ) -> DelveResult<SummaryPayload> {
        let contents: Vec<String> = documents
            .iter()
            .filter_map(|doc| doc.content.as_deref().or(doc.snippet.as_deref()))
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .map(|text| truncate_chars(text, DOCUMENT_CHAR_LIMIT).to_string())
            .collect();

        if contents.is_empty() {
            return Ok(SummaryPayload::default());
        }

        let system = research_system_prompt();
        let prompt = summarize_results_prompt(
            query,
            &contents,
            self.config.max_learnings_per_result,
            MAX_FOLLOW_UPS,
        );
        let options = CompletionOptions::json("summarize_results");

        let response = retry_recoverable(
            || self.llm.complete(&system, &prompt, &options),
            &self.config.retry,
            "summarize_results",
        )
        .await?;

        let mut payload = extract_json::<SummaryPayload>(&response)
            .ok_or_else(|| {
                parse_error("summary response was not valid JSON", "summarize_results")
            })?;
        payload.learnings = clean_list(payload.learnings, self.config.max_learnings_per_result);
        payload.follow_up_questions = clean_list(payload.follow_up_questions, MAX_FOLLOW_UPS);
        Ok(payload)
    }
}

fn clean_list(items: Vec<String>, limit: usize) -> Vec<String> {
    items
        .into_iter()
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .take(limit)
        .collect()
}

fn parse_error(message: &str, operation: &str) -> DelveError {
    DelveError::Parse {
        message: message.to_string(),
        context: ErrorContext::new("research_driver").with_operation(operation),
    }
}

/// Query for the level below a sub-query that produced follow-ups
fn follow_up_query(sub_query: &SubQuery, follow_ups: &[String]) -> String {
    let goal = if sub_query.research_goal.trim().is_empty() {
        sub_query.query.as_str()
    } else {
        sub_query.research_goal.as_str()
    };
    let directions: String = follow_ups.iter().map(|f| format!("\n{}", f)).collect();
    format!(
        "Previous research goal: {}\nFollow-up research directions: {}",
        goal, directions
    )
    .trim()
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_queries() {
        assert_eq!(total_queries(2, 1, BreadthPolicy::Halve), 2);
        assert_eq!(total_queries(4, 2, BreadthPolicy::Halve), 4 + 4 * 2);
        assert_eq!(total_queries(3, 3, BreadthPolicy::Halve), 3 + 3 * 2 + 3 * 2);
        assert_eq!(total_queries(3, 2, BreadthPolicy::Constant), 3 + 9);
        assert_eq!(total_queries(5, 0, BreadthPolicy::Halve), 0);
    }

    #[test]
    fn test_follow_up_query_format() {
        let sub_query = SubQuery {
            query: "remote work productivity".to_string(),
            research_goal: "Measure productivity effects".to_string(),
        };
        assert_eq!(
            follow_up_query(&sub_query, &["Which sectors?".to_string(), "Long term?".to_string()]),
            "Previous research goal: Measure productivity effects\nFollow-up research directions: \nWhich sectors?\nLong term?"
        );
    }
}
