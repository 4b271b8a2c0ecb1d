//! Reading-level rewrites of a finished report

use super::prompts::READING_LEVEL_SYSTEM_PROMPT;
use crate::{EngineError, EngineResult};
use delve_core::{
    llm_error, retry_recoverable, CompletionOptions, LanguageModel, ReadingLevel, ResearchStore,
    RetryConfig,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

const STRUCTURE_NOTE: &str = "Please keep the same sections as the original: Research Summary, Quick Summary, Key Findings, \
Detailed Analysis and Final Thoughts, each with the same level of detail and length as the original content.";

fn level_instructions(level: ReadingLevel) -> &'static str {
    match level {
        ReadingLevel::Beginner => {
            "Rewrite the content for a beginner audience while maintaining ALL information and detail from the original text. Use:\n\
             - Simple, clear language that a high school student could understand\n\
             - Short sentences and basic vocabulary\n\
             - Clear explanations for technical terms\n\
             - Concrete examples where helpful\n\
             - The same structure and sections as the original\n\n\
             Do not reduce or simplify the actual content, only make the language more accessible."
        }
        ReadingLevel::Intermediate => {
            "Rewrite the content for an intermediate audience while maintaining ALL information and detail from the original text. Use:\n\
             - Balanced technical and plain language\n\
             - Clear explanations that assume some domain knowledge\n\
             - Real-world examples to illustrate complex points\n\
             - Professional but approachable tone\n\
             - The same structure and sections as the original\n\n\
             Keep all technical concepts but explain them in a more approachable way."
        }
        ReadingLevel::Advanced => {
            "Rewrite the content for an advanced audience while maintaining ALL information and detail from the original text. Use:\n\
             - Sophisticated technical language and domain-specific terminology\n\
             - Detailed technical explanations and analysis\n\
             - Formal academic tone\n\
             - The same structure and sections as the original\n\n\
             Maintain technical precision while using academic language."
        }
    }
}

/// Rewrites reports for a target audience, caching variants in the store
pub struct ReadingLevelAdjuster {
    llm: Arc<dyn LanguageModel>,
    store: Option<Arc<dyn ResearchStore>>,
    retry: RetryConfig,
}

impl ReadingLevelAdjuster {
    pub fn new(llm: Arc<dyn LanguageModel>, retry: RetryConfig) -> Self {
        Self {
            llm,
            store: None,
            retry,
        }
    }

    pub fn with_store(mut self, store: Arc<dyn ResearchStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Rewrite `content` for `level`.
    ///
    /// With a record id and a store, a cached variant is returned when present
    /// and a fresh rewrite is stored. Store failures are logged, not returned.
    pub async fn adjust(
        &self,
        record_id: Option<&str>,
        content: &str,
        level: ReadingLevel,
    ) -> EngineResult<String> {
        if content.trim().is_empty() {
            return Err(EngineError::validation("Content is required"));
        }

        let cache = match (record_id, &self.store) {
            (Some(id), Some(store)) => Some((id, store)),
            _ => None,
        };

        if let Some((id, store)) = cache {
            match store.find_variant(id, level).await {
                Ok(Some(variant)) => {
                    debug!(id = id, level = %level, "Using stored reading-level variant");
                    return Ok(variant);
                }
                Ok(None) => {}
                Err(error) => warn!(id = id, error = %error, "Variant lookup failed"),
            }
        }

        let prompt = format!(
            "{}\n\n{}\n\nText to adjust:\n{}",
            level_instructions(level),
            STRUCTURE_NOTE,
            content
        );
        let options = CompletionOptions::text("adjust_reading_level");
        let adjusted = retry_recoverable(
            || self.llm.complete(READING_LEVEL_SYSTEM_PROMPT, &prompt, &options),
            &self.retry,
            "adjust_reading_level",
        )
        .await?;

        if adjusted.trim().is_empty() {
            return Err(llm_error!("Language model returned empty content", "reading_level").into());
        }
        info!(level = %level, chars = adjusted.len(), "Adjusted reading level");

        if let Some((id, store)) = cache {
            if let Err(error) = store.store_variant(id, level, &adjusted).await {
                warn!(id = id, error = %error, "Could not store reading-level variant");
            }
        }

        Ok(adjusted)
    }
}
