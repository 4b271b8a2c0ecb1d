//! Capability traits the research engine consumes

use crate::error::DelveResult;
use crate::types::*;
use async_trait::async_trait;

/// Text generation backend
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Generate a completion for a system/user prompt pair
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        options: &CompletionOptions,
    ) -> DelveResult<String>;
}

/// Web search and crawl backend
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Return up to `limit` candidate documents, with content when available
    async fn search(&self, query: &str, limit: usize) -> DelveResult<Vec<SourceInfo>>;
}

/// Persistence for research results and their reading-level variants
#[async_trait]
pub trait ResearchStore: Send + Sync {
    /// Store a result and return its id
    async fn store(
        &self,
        query: &str,
        content: &str,
        sources: &[SourceInfo],
        suggested_topics: Option<&[String]>,
    ) -> DelveResult<String>;

    /// Most recent result stored for exactly this query
    async fn find(&self, query: &str) -> DelveResult<Option<StoredResearch>>;

    /// Store a rewritten variant; fails with `NotFound` for an unknown id
    async fn store_variant(&self, id: &str, level: ReadingLevel, content: &str)
        -> DelveResult<()>;

    async fn find_variant(&self, id: &str, level: ReadingLevel) -> DelveResult<Option<String>>;

    /// Stored results, newest first
    async fn list(&self, limit: Option<usize>) -> DelveResult<Vec<StoredResearch>>;
}
