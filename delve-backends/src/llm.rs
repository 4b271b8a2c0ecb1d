//! Language model client using siumai
//!
//! One client type covers every provider siumai supports for us; the engine
//! only sees it through [`LanguageModel`].

use async_trait::async_trait;
use delve_core::{
    config_error, llm_error, CompletionOptions, DelveError, DelveResult, LanguageModel, LlmConfig,
};
use siumai::prelude::*;
use std::time::Instant;
use tracing::{debug, info};

const JSON_INSTRUCTION: &str =
    "Respond with valid JSON only. Do not wrap the JSON in markdown code fences.";

const OLLAMA_DEFAULT_URL: &str = "http://localhost:11434";

/// Environment variable holding the API key for `provider`
pub fn api_key_env(provider: &str) -> Option<&'static str> {
    match provider {
        "openai" => Some("OPENAI_API_KEY"),
        "anthropic" => Some("ANTHROPIC_API_KEY"),
        "groq" => Some("GROQ_API_KEY"),
        _ => None,
    }
}

fn resolve_api_key(config: &LlmConfig) -> DelveResult<String> {
    let env_var = api_key_env(&config.provider);
    config
        .api_key
        .clone()
        .filter(|key| !key.trim().is_empty())
        .or_else(|| env_var.and_then(|var| std::env::var(var).ok()))
        .ok_or_else(|| {
            config_error!(
                format!(
                    "{} API key not found (set llm.api_key or {})",
                    config.provider,
                    env_var.unwrap_or("an API key")
                ),
                "siumai_llm"
            )
        })
}

fn build_error(config: &LlmConfig, e: impl std::fmt::Display) -> DelveError {
    llm_error!(
        format!("Failed to build {} client: {}", config.provider, e),
        "siumai_llm",
        config.provider
    )
}

/// Chat-completion backend built from [`LlmConfig`]
pub struct SiumaiLanguageModel {
    client: Box<dyn LlmClient>,
    config: LlmConfig,
}

impl SiumaiLanguageModel {
    /// Build a client for the configured provider
    pub async fn from_config(config: &LlmConfig) -> DelveResult<Self> {
        let client = Self::build_client(config).await?;

        info!(
            "Created LLM client for provider: {} with model: {}",
            config.provider, config.model
        );

        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    async fn build_client(config: &LlmConfig) -> DelveResult<Box<dyn LlmClient>> {
        match config.provider.as_str() {
            "openai" => {
                let api_key = resolve_api_key(config)?;
                let mut builder = LlmBuilder::new()
                    .openai()
                    .api_key(&api_key)
                    .model(&config.model)
                    .temperature(config.temperature);

                if let Some(max_tokens) = config.max_tokens {
                    builder = builder.max_tokens(max_tokens);
                }
                if let Some(base_url) = &config.base_url {
                    builder = builder.base_url(base_url);
                }

                Ok(Box::new(builder.build().await.map_err(|e| build_error(config, e))?))
            }
            "anthropic" => {
                let api_key = resolve_api_key(config)?;
                let mut builder = LlmBuilder::new()
                    .anthropic()
                    .api_key(&api_key)
                    .model(&config.model)
                    .temperature(config.temperature);

                if let Some(max_tokens) = config.max_tokens {
                    builder = builder.max_tokens(max_tokens);
                }

                Ok(Box::new(builder.build().await.map_err(|e| build_error(config, e))?))
            }
            "ollama" => {
                let base_url = config
                    .base_url
                    .clone()
                    .unwrap_or_else(|| OLLAMA_DEFAULT_URL.to_string());

                let mut builder = LlmBuilder::new()
                    .ollama()
                    .model(&config.model)
                    .base_url(&base_url)
                    .temperature(config.temperature);

                if let Some(max_tokens) = config.max_tokens {
                    builder = builder.max_tokens(max_tokens);
                }

                Ok(Box::new(builder.build().await.map_err(|e| build_error(config, e))?))
            }
            "groq" => {
                let api_key = resolve_api_key(config)?;
                let mut builder = LlmBuilder::new()
                    .groq()
                    .api_key(&api_key)
                    .model(&config.model)
                    .temperature(config.temperature);

                if let Some(max_tokens) = config.max_tokens {
                    builder = builder.max_tokens(max_tokens);
                }

                Ok(Box::new(builder.build().await.map_err(|e| build_error(config, e))?))
            }
            provider => Err(config_error!(
                format!("Unsupported LLM provider: {}", provider),
                "siumai_llm"
            )),
        }
    }

    /// `provider/model`, for display
    pub fn describe(&self) -> String {
        format!("{}/{}", self.config.provider, self.config.model)
    }
}

#[async_trait]
impl LanguageModel for SiumaiLanguageModel {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        options: &CompletionOptions,
    ) -> DelveResult<String> {
        let start_time = Instant::now();
        let system_prompt = if options.expect_json {
            format!("{}\n\n{}", system_prompt, JSON_INSTRUCTION)
        } else {
            system_prompt.to_string()
        };

        debug!(
            operation = options.operation,
            prompt_chars = user_prompt.len(),
            "Sending completion request"
        );

        let messages = vec![system!(system_prompt), user!(user_prompt)];
        let response = self.client.chat(messages).await.map_err(|e| {
            llm_error!(
                format!("{} failed: {}", options.operation, e),
                "siumai_llm",
                self.config.provider
            )
        })?;

        match response.content_text() {
            Some(content) => {
                debug!(
                    operation = options.operation,
                    chars = content.len(),
                    elapsed_ms = start_time.elapsed().as_millis() as u64,
                    "Completion received"
                );
                Ok(content.to_string())
            }
            None => Err(llm_error!(
                format!("{} returned no text content", options.operation),
                "siumai_llm",
                self.config.provider
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_key_env_names() {
        assert_eq!(api_key_env("openai"), Some("OPENAI_API_KEY"));
        assert_eq!(api_key_env("groq"), Some("GROQ_API_KEY"));
        assert_eq!(api_key_env("ollama"), None);
    }

    #[test]
    fn test_configured_key_wins_over_environment() {
        let config = LlmConfig {
            api_key: Some("sk-configured".to_string()),
            ..Default::default()
        };
        assert_eq!(resolve_api_key(&config).unwrap(), "sk-configured");
    }

    #[tokio::test]
    async fn test_unsupported_provider_is_a_config_error() {
        let config = LlmConfig {
            provider: "cohere".to_string(),
            ..Default::default()
        };
        let result = SiumaiLanguageModel::from_config(&config).await;
        assert!(matches!(result, Err(DelveError::Config { .. })));
    }
}
