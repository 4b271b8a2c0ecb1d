//! Configuration loading and validation

use crate::error::{DelveError, DelveResult, ErrorContext};
use crate::types::DelveConfig;

use std::path::{Path, PathBuf};

const SUPPORTED_LLM_PROVIDERS: [&str; 4] = ["openai", "anthropic", "ollama", "groq"];

impl DelveConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> DelveResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| DelveError::Config {
            message: format!("Failed to read config file: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config")
                .with_operation("read_file")
                .with_suggestion("Check if the config file exists and is readable"),
        })?;

        let config: DelveConfig = toml::from_str(&content).map_err(|e| DelveError::Config {
            message: format!("Failed to parse config: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config")
                .with_operation("parse_toml")
                .with_suggestion("Check TOML syntax in config file"),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file, creating parent directories
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> DelveResult<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self).map_err(|e| DelveError::Config {
            message: format!("Failed to serialize config: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config").with_operation("serialize_toml"),
        })?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, content).map_err(|e| DelveError::Config {
            message: format!("Failed to write config file: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config")
                .with_operation("write_file")
                .with_suggestion("Check if the directory exists and is writable"),
        })?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> DelveResult<()> {
        let research = &self.research;
        let positive = [
            ("research.breadth", research.breadth as u64),
            ("research.depth", research.depth as u64),
            ("research.concurrency", research.concurrency as u64),
            ("research.fact_chunk_chars", research.fact_chunk_chars as u64),
            (
                "research.clarification_timeout_secs",
                research.clarification_timeout_secs,
            ),
            ("research.retry.max_attempts", research.retry.max_attempts as u64),
            (
                "research.max_results_per_search",
                research.max_results_per_search as u64,
            ),
        ];

        for (field, value) in positive {
            if value == 0 {
                return Err(invalid(&format!("{} must be greater than 0", field), field));
            }
        }

        if !SUPPORTED_LLM_PROVIDERS.contains(&self.llm.provider.as_str()) {
            return Err(invalid(
                &format!(
                    "Unsupported LLM provider '{}' (expected one of: {})",
                    self.llm.provider,
                    SUPPORTED_LLM_PROVIDERS.join(", ")
                ),
                "llm.provider",
            ));
        }

        Ok(())
    }

    /// Candidate config file locations, in lookup order
    pub fn default_paths() -> Vec<PathBuf> {
        [
            dirs::config_dir().map(|d| d.join("delve").join("config.toml")),
            dirs::home_dir().map(|d| d.join(".delve").join("config.toml")),
            Some(PathBuf::from("delve.toml")),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    /// The storage directory with a leading `~` expanded
    pub fn data_dir(&self) -> PathBuf {
        expand_home(&self.storage.data_dir)
    }
}

fn invalid(message: &str, field: &str) -> DelveError {
    DelveError::Config {
        message: message.to_string(),
        source: None,
        context: ErrorContext::new("config")
            .with_operation("validate")
            .with_metadata("field", field)
            .with_suggestion("Set the field to a supported value"),
    }
}

/// Expand a leading `~` to the user's home directory
pub fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix('~'), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest.trim_start_matches(['/', '\\'])),
        _ => PathBuf::from(path),
    }
}
