//! Core data type definitions

use crate::async_utils::RetryConfig;
use crate::logging::LoggingConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A web document visited during research
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceInfo {
    /// Unique key within a research result
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Full fetched text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Short excerpt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
}

impl SourceInfo {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: None,
            content: None,
            snippet: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn with_snippet(mut self, snippet: impl Into<String>) -> Self {
        self.snippet = Some(snippet.into());
        self
    }

    /// Title if present, the URL otherwise
    pub fn display_name(&self) -> &str {
        self.title
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(&self.url)
    }
}

/// Per-call options passed to a language model
#[derive(Debug, Clone, Copy, Default)]
pub struct CompletionOptions {
    /// The caller parses the answer as JSON
    pub expect_json: bool,
    /// Short name of the calling operation, used for tracing
    pub operation: &'static str,
}

impl CompletionOptions {
    pub fn json(operation: &'static str) -> Self {
        Self {
            expect_json: true,
            operation,
        }
    }

    pub fn text(operation: &'static str) -> Self {
        Self {
            expect_json: false,
            operation,
        }
    }
}

/// Target audience for a rewritten report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadingLevel {
    Beginner,
    Intermediate,
    Advanced,
}

impl ReadingLevel {
    pub const ALL: [ReadingLevel; 3] = [
        ReadingLevel::Beginner,
        ReadingLevel::Intermediate,
        ReadingLevel::Advanced,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReadingLevel::Beginner => "beginner",
            ReadingLevel::Intermediate => "intermediate",
            ReadingLevel::Advanced => "advanced",
        }
    }
}

impl fmt::Display for ReadingLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReadingLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "beginner" => Ok(ReadingLevel::Beginner),
            "intermediate" => Ok(ReadingLevel::Intermediate),
            "advanced" => Ok(ReadingLevel::Advanced),
            other => Err(format!("Invalid reading level: {}", other)),
        }
    }
}

/// A persisted research result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredResearch {
    pub id: String,
    pub query: String,
    pub content: String,
    pub sources: Vec<SourceInfo>,
    #[serde(default)]
    pub suggested_topics: Option<Vec<String>>,
    pub created_at: DateTime<Utc>,
}

/// How breadth shrinks from one recursion level to the next
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BreadthPolicy {
    /// `ceil(b / 2)`
    Halve,
    /// Same breadth at every level
    Constant,
    /// `b - 1`
    Decrement,
}

impl BreadthPolicy {
    /// Breadth for the level below one explored with `breadth`. Never below 1.
    pub fn next(&self, breadth: usize) -> usize {
        let next = match self {
            BreadthPolicy::Halve => breadth.div_ceil(2),
            BreadthPolicy::Constant => breadth,
            BreadthPolicy::Decrement => breadth.saturating_sub(1),
        };
        next.max(1)
    }
}

/// Configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DelveConfig {
    pub llm: LlmConfig,
    pub search: SearchConfig,
    pub research: ResearchConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: String,
    pub model: String,
    /// Falls back to the provider's environment variable
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: None,
            base_url: None,
            temperature: 0.7,
            max_tokens: Some(4000),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub provider: String,
    /// Falls back to FIRECRAWL_API_KEY
    pub api_key: Option<String>,
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            provider: "firecrawl".to_string(),
            api_key: None,
            base_url: "https://api.firecrawl.dev".to_string(),
            timeout_secs: 60,
        }
    }
}

/// Research budget and behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResearchConfig {
    /// Sibling sub-queries at the top level
    pub breadth: usize,
    /// Recursion levels
    pub depth: usize,
    pub breadth_policy: BreadthPolicy,
    /// Sibling sub-queries in flight at once within a level
    pub concurrency: usize,
    pub max_clarifying_questions: usize,
    /// Unanswered clarifications are skipped after this long
    pub clarification_timeout_secs: u64,
    /// Character budget per fact-extraction chunk
    pub fact_chunk_chars: usize,
    pub max_results_per_search: usize,
    pub max_learnings_per_result: usize,
    pub max_suggested_topics: usize,
    pub retry: RetryConfig,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            breadth: 4,
            depth: 2,
            breadth_policy: BreadthPolicy::Halve,
            concurrency: 2,
            max_clarifying_questions: 3,
            clarification_timeout_secs: 300,
            fact_chunk_chars: 4000,
            max_results_per_search: 5,
            max_learnings_per_result: 3,
            max_suggested_topics: 5,
            retry: RetryConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: String,
    /// Whether results are persisted at all
    pub persist: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.delve/data".to_string(),
            persist: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_breadth_policies_floor_at_one() {
        assert_eq!(BreadthPolicy::Halve.next(4), 2);
        assert_eq!(BreadthPolicy::Halve.next(3), 2);
        assert_eq!(BreadthPolicy::Halve.next(1), 1);
        assert_eq!(BreadthPolicy::Constant.next(3), 3);
        assert_eq!(BreadthPolicy::Decrement.next(1), 1);
        assert_eq!(BreadthPolicy::Decrement.next(3), 2);
    }

    #[test]
    fn test_reading_level_parsing() {
        assert_eq!(
            " Beginner ".parse::<ReadingLevel>().unwrap(),
            ReadingLevel::Beginner
        );
        assert!("expert".parse::<ReadingLevel>().is_err());
    }
}
