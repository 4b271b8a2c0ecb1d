//! Delve Research - deep research orchestration engine
//!
//! Turns one natural-language query into a bounded, multi-level web research
//! run and a structured markdown report:
//!
//! - Clarifying questions answered (or skipped) by the caller
//! - Recursive breadth/depth-bounded search and summarisation
//! - Fact extraction with source attribution
//! - Deterministic report formatting and source confidence scoring
//!
//! ## Architecture
//!
//! Backends (language model, search, persistence) are consumed through the
//! traits in `delve-core`; concrete clients live in `delve-backends`.

pub mod research;

pub use research::{
    build_refined_query, chunk_text, classify, dedupe_sources, format_report, parse_sources,
    total_queries, validate_sources, AnswerRegistry, ClarificationAnswer, ClarificationExchange,
    ClarificationNegotiator, ClarifiedQuery, Confidence, ConfidenceRating, ContentFormatter,
    DeepResearchResult, DriverOutput, EventSink, Fact, FactExtractor, FileResearchStore, Learning,
    LearningClassification, MemoryResearchStore, PendingAnswer, ReadingLevelAdjuster,
    ResearchDriver, ResearchEvent, ResearchOrchestrator, ResearchProgress, ResearchRun, SubQuery,
    TopicBucket, ValidatedSource,
};

/// Engine-level error type
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("{0}")]
    Core(#[from] delve_core::DelveError),

    #[error("Invalid input: {message}")]
    Validation { message: String },

    #[error("Research exhausted: {message}")]
    Exhausted { message: String },

    #[error("Research cancelled by the consumer")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    /// Create a validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create an exhaustion error
    pub fn exhausted<S: Into<String>>(message: S) -> Self {
        Self::Exhausted {
            message: message.into(),
        }
    }

    pub fn log(&self) {
        match self {
            Self::Core(inner) => inner.log(),
            Self::Cancelled => tracing::info!("Research cancelled"),
            other => tracing::error!(error = %other, "Research error"),
        }
    }
}
