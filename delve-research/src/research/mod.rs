//! Deep research orchestration
//!
//! Components, leaves first:
//! - [`confidence`]: source confidence scoring
//! - [`facts`]: fact extraction with source attribution
//! - [`formatter`]: markdown report assembly
//! - [`clarification`]: clarifying questions and their answers
//! - [`driver`]: the recursive breadth/depth-bounded research loop
//! - [`orchestrator`]: the façade sequencing all of the above

pub mod answers;
pub mod clarification;
pub mod confidence;
pub mod driver;
pub mod events;
pub mod facts;
pub mod formatter;
pub mod orchestrator;
pub mod prompts;
pub mod reading_level;
pub mod storage;
pub mod types;

pub use answers::{AnswerRegistry, PendingAnswer};
pub use clarification::{build_refined_query, parse_questions, ClarificationNegotiator};
pub use confidence::{classify, parse_sources, validate_sources};
pub use driver::{total_queries, ResearchDriver};
pub use events::{EventSink, ResearchEvent, ResearchRun};
pub use facts::{chunk_text, parse_fact_response, resolve_source, unknown_source, FactExtractor};
pub use formatter::{format_report, ContentFormatter, LearningClassification, TopicBucket};
pub use orchestrator::{dedupe_sources, ResearchOrchestrator};
pub use reading_level::ReadingLevelAdjuster;
pub use storage::{FileResearchStore, MemoryResearchStore};
pub use types::*;
