//! Delve Backends - concrete clients behind the `delve-core` capability traits
//!
//! - [`SiumaiLanguageModel`]: chat completions through siumai (OpenAI,
//!   Anthropic, Ollama, Groq)
//! - [`FirecrawlSearch`]: web search with page content through Firecrawl

pub mod firecrawl;
pub mod llm;

pub use firecrawl::FirecrawlSearch;
pub use llm::SiumaiLanguageModel;

// Re-export commonly used types from siumai
pub use siumai::prelude::{LlmClient, Provider as LlmProvider};
