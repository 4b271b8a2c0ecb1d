//! Delve CLI - Command-line interface for deep research
//!
//! Runs research interactively, rewrites stored reports for other reading
//! levels and manages the configuration file. Reports go to stdout; progress,
//! thoughts and logs go to stderr.

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use delve_backends::{FirecrawlSearch, SiumaiLanguageModel};
use delve_core::{
    init_logging, log_operation_error, log_operation_start, log_operation_success, DelveConfig,
    LanguageModel, LoggingConfig, ReadingLevel, ResearchStore,
};
use delve_research::{
    DeepResearchResult, FileResearchStore, MemoryResearchStore, ReadingLevelAdjuster,
    ResearchEvent, ResearchOrchestrator,
};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

#[derive(Parser)]
#[command(name = "delve")]
#[command(about = "Deep web research from a single question")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Research a question and print the report
    Research {
        /// The question to research
        query: String,

        /// Sub-queries at the top level
        #[arg(short, long)]
        breadth: Option<usize>,

        /// Recursion levels
        #[arg(short, long)]
        depth: Option<usize>,

        /// Skip clarifying questions
        #[arg(long)]
        no_clarify: bool,

        /// Rewrite the report for a reading level (beginner, intermediate, advanced)
        #[arg(short, long)]
        level: Option<ReadingLevel>,

        /// Write the report to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Rewrite a stored report for another reading level
    Adjust {
        /// Query of the stored research
        query: String,

        /// Target reading level (beginner, intermediate, advanced)
        #[arg(short, long)]
        level: ReadingLevel,
    },

    /// List stored research, newest first
    History {
        /// Maximum number of entries
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Manage configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,

        /// Initialize default configuration
        #[arg(long)]
        init: bool,

        /// Validate current configuration
        #[arg(long)]
        validate: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut logging_config = LoggingConfig::default();
    if cli.verbose {
        logging_config.level = "debug".to_string();
    } else {
        logging_config.filter_directives.clear();
    }
    init_logging(&logging_config).map_err(|e| anyhow!("Failed to initialize logging: {}", e))?;

    info!("Starting Delve CLI v{}", env!("CARGO_PKG_VERSION"));

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Research {
            query,
            breadth,
            depth,
            no_clarify,
            level,
            output,
        } => {
            let mut config = load_config(config_path)?;
            if let Some(breadth) = breadth {
                config.research.breadth = breadth;
            }
            if let Some(depth) = depth {
                config.research.depth = depth;
            }
            config.validate()?;
            handle_research(&config, &query, no_clarify, level, output.as_deref()).await?;
        }
        Commands::Adjust { query, level } => {
            let config = load_config(config_path)?;
            handle_adjust(&config, &query, level).await?;
        }
        Commands::History { limit } => {
            let config = load_config(config_path)?;
            handle_history(&config, limit).await?;
        }
        Commands::Config {
            show,
            init,
            validate,
        } => {
            handle_config(config_path, show, init, validate)?;
        }
    }

    Ok(())
}

fn load_config(config_path: Option<&Path>) -> Result<DelveConfig> {
    if let Some(path) = config_path {
        info!("Loading configuration from {:?}", path);
        return Ok(DelveConfig::from_file(path)?);
    }

    for path in DelveConfig::default_paths() {
        if path.exists() {
            info!("Loading configuration from {:?}", path);
            return Ok(DelveConfig::from_file(&path)?);
        }
    }

    info!("No configuration file found, using defaults");
    Ok(DelveConfig::default())
}

fn open_store(config: &DelveConfig) -> Result<Arc<dyn ResearchStore>> {
    if config.storage.persist {
        let store = FileResearchStore::new(config.data_dir())?;
        Ok(Arc::new(store))
    } else {
        Ok(Arc::new(MemoryResearchStore::new()))
    }
}

async fn build_llm(config: &DelveConfig) -> Result<Arc<dyn LanguageModel>> {
    let llm = SiumaiLanguageModel::from_config(&config.llm).await?;
    info!("Using language model {}", llm.describe());
    Ok(Arc::new(llm))
}

async fn handle_research(
    config: &DelveConfig,
    query: &str,
    no_clarify: bool,
    level: Option<ReadingLevel>,
    output: Option<&Path>,
) -> Result<()> {
    log_operation_start!("cli_research", query = query);

    let llm = build_llm(config).await?;
    let search = Arc::new(FirecrawlSearch::from_config(&config.search)?);
    let store = open_store(config)?;

    let mut orchestrator = ResearchOrchestrator::new(llm.clone(), search, config.research.clone())
        .with_store(store.clone());
    if no_clarify {
        orchestrator = orchestrator.without_clarification();
    }

    let mut run = orchestrator.run_research(query);
    let answers = run.answers();
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut result = None;

    while let Some(event) = run.next().await {
        match event {
            ResearchEvent::Progress(progress) => {
                eprintln!(
                    "[{}/{}] depth {}/{}, breadth {}",
                    progress.completed_queries,
                    progress.total_queries,
                    progress.current_depth,
                    progress.total_depth,
                    progress.current_breadth
                );
            }
            ResearchEvent::Thought { thought } => eprintln!("  {}", thought),
            ResearchEvent::Question { question } => {
                eprintln!("\n❓ {}", question);
                eprintln!("   (press Enter or type 'skip' to skip)");
                let answer = stdin.next_line().await?.unwrap_or_default();
                if !answers.submit_answer(&question, &answer) {
                    eprintln!("   The question was no longer waiting; answer ignored.");
                }
            }
            ResearchEvent::Result(done) => result = Some(*done),
            ResearchEvent::Error { message } => {
                log_operation_error!("cli_research", &message);
                bail!("Research failed: {}", message);
            }
        }
    }

    let mut result = result.ok_or_else(|| anyhow!("Research ended without a result"))?;

    if let Some(level) = level {
        eprintln!("Rewriting the report for a {} audience...", level);
        let adjuster = ReadingLevelAdjuster::new(llm, config.research.retry.clone())
            .with_store(store);
        result.content = adjuster
            .adjust(result.record_id.as_deref(), &result.content, level)
            .await?;
    }

    let report = render_report(&result);
    match output {
        Some(path) => {
            tokio::fs::write(path, &report)
                .await
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
            eprintln!("✅ Report written to {}", path.display());
        }
        None => println!("{}", report),
    }

    log_operation_success!("cli_research", sources = result.sources.len());
    Ok(())
}

/// Report body followed by the rated source list and suggested topics
fn render_report(result: &DeepResearchResult) -> String {
    let mut report = result.content.trim_end().to_string();

    if !result.validated_sources.is_empty() {
        report.push_str("\n\n## Sources\n");
        for source in &result.validated_sources {
            report.push_str(&format!(
                "\n{}. {} - {} ({} confidence)",
                source.number,
                source.text,
                source.url.as_deref().unwrap_or("no url"),
                source.confidence
            ));
        }
    }

    if let Some(topics) = &result.suggested_topics {
        report.push_str("\n\n## Suggested Topics\n");
        for topic in topics {
            report.push_str(&format!("\n- {}", topic));
        }
    }

    report.push('\n');
    report
}

async fn handle_adjust(config: &DelveConfig, query: &str, level: ReadingLevel) -> Result<()> {
    let store = open_store(config)?;
    let record = store
        .find(query.trim())
        .await?
        .ok_or_else(|| {
            anyhow!("No stored research for \"{}\"; run `delve research` first", query)
        })?;

    let llm = build_llm(config).await?;
    let adjuster = ReadingLevelAdjuster::new(llm, config.research.retry.clone()).with_store(store);
    let adjusted = adjuster.adjust(Some(&record.id), &record.content, level).await?;

    println!("{}", adjusted);
    Ok(())
}

async fn handle_history(config: &DelveConfig, limit: Option<usize>) -> Result<()> {
    let store = open_store(config)?;
    let records = store.list(limit).await?;

    if records.is_empty() {
        println!("No stored research yet.");
        return Ok(());
    }

    for record in records {
        println!(
            "{}  {}  {} ({} sources)",
            record.created_at.format("%Y-%m-%d %H:%M"),
            record.id,
            record.query,
            record.sources.len()
        );
    }
    Ok(())
}

/// Where `config --init` writes
fn default_config_path() -> Result<PathBuf> {
    dirs::config_dir()
        .or_else(|| dirs::home_dir().map(|d| d.join(".config")))
        .map(|dir| dir.join("delve").join("config.toml"))
        .ok_or_else(|| anyhow!("Could not determine a configuration directory"))
}

fn handle_config(config_path: Option<&Path>, show: bool, init: bool, validate: bool) -> Result<()> {
    if init {
        let path = match config_path {
            Some(path) => path.to_path_buf(),
            None => default_config_path()?,
        };
        if path.exists() {
            bail!("Configuration already exists at {}", path.display());
        }
        DelveConfig::default().save_to_file(&path)?;
        println!("✅ Configuration initialized at: {}", path.display());
        println!("📝 Please edit the file to add your API keys and customize settings.");
    }

    if show {
        let config = load_config(config_path)?;
        println!("📋 Current configuration:");
        println!("{}", toml::to_string_pretty(&config)?);
    }

    if validate {
        let config = load_config(config_path)?;
        match config.validate() {
            Ok(()) => println!("✅ Configuration is valid"),
            Err(e) => {
                println!("❌ Configuration validation failed: {}", e);
                return Err(e.into());
            }
        }
    }

    if !(init || show || validate) {
        println!("Nothing to do. Use --show, --init or --validate.");
    }

    Ok(())
}
