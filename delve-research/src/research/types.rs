//! Types for the deep research system

use delve_core::SourceInfo;
use serde::{Deserialize, Serialize};
use std::fmt;

/// An atomic finding gathered during a research pass
pub type Learning = String;

/// Snapshot of a running research pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResearchProgress {
    /// Level currently being explored, 1-based (0 before the first sub-query)
    pub current_depth: usize,
    pub total_depth: usize,
    /// Position of the current sub-query among its siblings, 1-based
    pub current_breadth: usize,
    pub total_breadth: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_query: Option<String>,
    pub total_queries: usize,
    pub completed_queries: usize,
}

/// A sub-query generated from a parent query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubQuery {
    pub query: String,
    #[serde(default)]
    pub research_goal: String,
}

/// What the recursive driver hands back
#[derive(Debug, Clone, Default)]
pub struct DriverOutput {
    pub learnings: Vec<Learning>,
    /// Visited URLs in discovery order, without duplicates
    pub visited_urls: Vec<String>,
    /// Every document returned by search, in discovery order
    pub sources: Vec<SourceInfo>,
    /// Follow-up directions that were produced but not explored
    pub unexplored_directions: Vec<String>,
    pub failed_queries: usize,
}

/// A statement extracted from learnings with an attributed source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fact {
    pub fact: String,
    #[serde(default)]
    pub context: String,
    pub source: SourceInfo,
}

impl Fact {
    pub fn is_attributed(&self) -> bool {
        !super::facts::is_unknown_source(&self.source)
    }
}

/// Trust label for a source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Confidence {
    High,
    Medium,
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Confidence::High => write!(f, "High"),
            Confidence::Medium => write!(f, "Medium"),
        }
    }
}

/// Outcome of classifying one citation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfidenceRating {
    pub confidence: Confidence,
    /// Every heuristic that fired, in evaluation order
    pub reasons: Vec<String>,
}

impl ConfidenceRating {
    /// Human-readable reason, one heuristic per line
    pub fn reason(&self) -> String {
        self.reasons.join("\n")
    }
}

/// Numbered citation with its confidence rating
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatedSource {
    /// 1-based position
    pub number: usize,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub confidence: Confidence,
    pub reasons: Vec<String>,
}

impl ValidatedSource {
    pub fn reason(&self) -> String {
        self.reasons.join("\n")
    }
}

/// Final research output
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeepResearchResult {
    pub title: String,
    /// Formatted markdown report
    pub content: String,
    /// Deduplicated by URL, in discovery order
    pub sources: Vec<SourceInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_topics: Option<Vec<String>>,
    #[serde(default)]
    pub facts: Vec<Fact>,
    #[serde(default)]
    pub validated_sources: Vec<ValidatedSource>,
    /// Refined query the research ran with
    #[serde(default)]
    pub refined_query: String,
    /// Id assigned by the store, when persisted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_id: Option<String>,
}

/// Caller's reply to a clarifying question
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClarificationAnswer {
    Answer(String),
    Skip,
}

impl ClarificationAnswer {
    /// Empty text and `skip` (any case) are the skip sentinel
    pub fn from_text(text: &str) -> Self {
        let trimmed = text.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("skip") {
            ClarificationAnswer::Skip
        } else {
            ClarificationAnswer::Answer(trimmed.to_string())
        }
    }

    pub fn as_answer(&self) -> Option<&str> {
        match self {
            ClarificationAnswer::Answer(text) => Some(text),
            ClarificationAnswer::Skip => None,
        }
    }
}

/// One question with its resolution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClarificationExchange {
    pub question: String,
    pub answer: ClarificationAnswer,
}

/// Result of the clarification phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClarifiedQuery {
    pub original: String,
    pub exchanges: Vec<ClarificationExchange>,
    /// Text handed to the research driver
    pub refined: String,
}
