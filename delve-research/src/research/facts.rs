//! Fact extraction with source attribution

use super::events::EventSink;
use super::prompts::{extract_json, fact_extraction_prompt, FACT_EXTRACTION_SYSTEM_PROMPT};
use super::types::Fact;
use delve_core::{
    process_concurrently, retry_recoverable, CompletionOptions, LanguageModel, RetryConfig,
    SourceInfo,
};
use regex::Regex;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, warn};

pub const UNKNOWN_SOURCE_URL: &str = "unknown";
pub const UNKNOWN_SOURCE_TITLE: &str = "Unknown source";

/// Placeholder for facts that cannot be attributed
pub fn unknown_source() -> SourceInfo {
    SourceInfo::new(UNKNOWN_SOURCE_URL).with_title(UNKNOWN_SOURCE_TITLE)
}

pub fn is_unknown_source(source: &SourceInfo) -> bool {
    source.url == UNKNOWN_SOURCE_URL
}

fn paragraph_regex() -> &'static Regex {
    static PARAGRAPH: OnceLock<Regex> = OnceLock::new();
    PARAGRAPH.get_or_init(|| Regex::new(r"\n\s*\n").expect("valid paragraph regex"))
}

fn source_tag_regex() -> &'static Regex {
    static SOURCE_TAG: OnceLock<Regex> = OnceLock::new();
    SOURCE_TAG.get_or_init(|| {
        Regex::new(r"(?i)[\[(]\s*source:\s*([^\])]+)[\])]").expect("valid source tag regex")
    })
}

fn bullet_regex() -> &'static Regex {
    static BULLET: OnceLock<Regex> = OnceLock::new();
    BULLET.get_or_init(|| {
        Regex::new(r"^\s*(?:[-*•]|\d+[.)])\s+(.+)$").expect("valid bullet regex")
    })
}

/// Split `text` into paragraph-aligned chunks of at most `max_chars`
/// characters. A paragraph longer than the budget becomes its own chunk.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for paragraph in paragraph_regex()
        .split(text)
        .map(str::trim)
        .filter(|p| !p.is_empty())
    {
        let len = paragraph.chars().count();
        if current.is_empty() {
            current.push_str(paragraph);
            current_len = len;
        } else if current_len + 2 + len <= max_chars {
            current.push_str("\n\n");
            current.push_str(paragraph);
            current_len += 2 + len;
        } else {
            chunks.push(std::mem::take(&mut current));
            current.push_str(paragraph);
            current_len = len;
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FactPayload {
    Wrapped { facts: Vec<RawFact> },
    List(Vec<RawFact>),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawFact {
    Structured {
        #[serde(alias = "statement", alias = "text")]
        fact: String,
        #[serde(default)]
        context: Option<String>,
        #[serde(default)]
        source: Option<serde_json::Value>,
    },
    Plain(String),
}

/// Pulls attributable statements out of research notes
pub struct FactExtractor {
    llm: Arc<dyn LanguageModel>,
    chunk_chars: usize,
    concurrency: usize,
    retry: RetryConfig,
}

impl FactExtractor {
    pub fn new(llm: Arc<dyn LanguageModel>, chunk_chars: usize, retry: RetryConfig) -> Self {
        Self {
            llm,
            chunk_chars,
            concurrency: 1,
            retry,
        }
    }

    /// Chunks extracted at once; results are merged in chunk order
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Extract facts from `raw_text`, attributing them to `sources`.
    ///
    /// Never fails: a chunk whose extraction exhausts its retries contributes
    /// nothing and the remaining chunks are still processed.
    pub async fn extract_facts(
        &self,
        raw_text: &str,
        sources: &[SourceInfo],
        sink: &EventSink,
    ) -> Vec<Fact> {
        let chunks = chunk_text(raw_text, self.chunk_chars);
        if chunks.is_empty() {
            return Vec::new();
        }

        let total = chunks.len();
        sink.thought(format!("Extracting facts from {} chunk(s) of findings...", total));
        let source_list = format_source_list(sources);

        let per_chunk = process_concurrently(
            chunks.into_iter().enumerate().collect(),
            self.concurrency,
            |(index, chunk)| {
                let source_list = source_list.as_str();
                async move {
                    self.extract_chunk(index, total, &chunk, source_list, sources, sink)
                        .await
                }
            },
        )
        .await;

        let mut seen = HashSet::new();
        let facts: Vec<Fact> = per_chunk
            .into_iter()
            .flatten()
            .filter(|fact| seen.insert(fact.fact.clone()))
            .collect();

        info!(chunks = total, facts = facts.len(), "Fact extraction finished");
        facts
    }

    async fn extract_chunk(
        &self,
        index: usize,
        total: usize,
        chunk: &str,
        source_list: &str,
        sources: &[SourceInfo],
        sink: &EventSink,
    ) -> Vec<Fact> {
        let prompt = fact_extraction_prompt(chunk, source_list);
        let options = CompletionOptions::json("extract_facts");

        let response = retry_recoverable(
            || self.llm.complete(FACT_EXTRACTION_SYSTEM_PROMPT, &prompt, &options),
            &self.retry,
            "extract_facts",
        )
        .await;

        match response {
            Ok(text) => {
                let facts = parse_fact_response(&text, sources);
                debug!(chunk = index + 1, facts = facts.len(), "Parsed chunk facts");
                if facts.is_empty() {
                    sink.thought(format!(
                        "No facts could be read from chunk {} of {}",
                        index + 1,
                        total
                    ));
                }
                facts
            }
            Err(error) => {
                warn!(chunk = index + 1, error = %error, "Dropping chunk after failed extraction");
                sink.thought(format!(
                    "Fact extraction failed for chunk {} of {}, continuing: {}",
                    index + 1,
                    total,
                    error
                ));
                Vec::new()
            }
        }
    }
}

fn format_source_list(sources: &[SourceInfo]) -> String {
    if sources.is_empty() {
        return "(none)".to_string();
    }
    sources
        .iter()
        .enumerate()
        .map(|(i, source)| format!("[{}] {} - {}", i + 1, source.display_name(), source.url))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Parse a model answer as structured JSON, falling back to a markdown
/// bullet list. Unreadable output yields no facts.
pub fn parse_fact_response(text: &str, sources: &[SourceInfo]) -> Vec<Fact> {
    if let Some(payload) = extract_json::<FactPayload>(text) {
        let raw = match payload {
            FactPayload::Wrapped { facts } => facts,
            FactPayload::List(facts) => facts,
        };
        return raw
            .into_iter()
            .filter_map(|raw| structured_fact(raw, sources))
            .collect();
    }

    text.lines()
        .filter_map(|line| bullet_regex().captures(line))
        .filter_map(|captures| captures.get(1).map(|m| m.as_str()))
        .filter_map(|bullet| bullet_fact(bullet, sources))
        .collect()
}

fn structured_fact(raw: RawFact, sources: &[SourceInfo]) -> Option<Fact> {
    let (fact, context, label) = match raw {
        RawFact::Structured {
            fact,
            context,
            source,
        } => {
            let label = match source {
                Some(serde_json::Value::String(s)) => Some(s),
                Some(serde_json::Value::Number(n)) => Some(n.to_string()),
                Some(serde_json::Value::Object(map)) => map
                    .get("url")
                    .or_else(|| map.get("title"))
                    .and_then(|v| v.as_str())
                    .map(str::to_string),
                _ => None,
            };
            (fact, context.unwrap_or_default(), label)
        }
        RawFact::Plain(text) => return bullet_fact(&text, sources),
    };

    let fact = fact.trim().to_string();
    if fact.is_empty() {
        return None;
    }
    Some(Fact {
        fact,
        context,
        source: resolve_source(label.as_deref(), sources),
    })
}

fn bullet_fact(bullet: &str, sources: &[SourceInfo]) -> Option<Fact> {
    let label = source_tag_regex()
        .captures(bullet)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string());
    let fact = source_tag_regex()
        .replace_all(bullet, "")
        .trim()
        .trim_matches('*')
        .trim()
        .to_string();
    if fact.is_empty() {
        return None;
    }
    Some(Fact {
        fact,
        context: String::new(),
        source: resolve_source(label.as_deref(), sources),
    })
}

/// Map a source label to one of `sources`, or the unknown placeholder
pub fn resolve_source(label: Option<&str>, sources: &[SourceInfo]) -> SourceInfo {
    let Some(label) = label
        .map(|l| l.trim().trim_matches(|c| c == '[' || c == ']').trim())
        .filter(|l| !l.is_empty())
    else {
        return unknown_source();
    };

    if let Ok(number) = label.trim_start_matches('#').parse::<usize>() {
        if let Some(source) = number.checked_sub(1).and_then(|i| sources.get(i)) {
            return source.clone();
        }
    }

    let lowered = label.to_lowercase();
    sources
        .iter()
        .find(|s| s.url.eq_ignore_ascii_case(label))
        .or_else(|| {
            sources
                .iter()
                .find(|s| lowered.contains(&s.url.to_lowercase()))
        })
        .or_else(|| {
            sources.iter().find(|s| {
                s.title
                    .as_deref()
                    .is_some_and(|t| !t.trim().is_empty() && t.trim().eq_ignore_ascii_case(label))
            })
        })
        .cloned()
        .unwrap_or_else(unknown_source)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sources() -> Vec<SourceInfo> {
        vec![
            SourceInfo::new("https://a.example/report").with_title("Report A"),
            SourceInfo::new("https://b.example/survey").with_title("Survey B"),
        ]
    }

    #[test]
    fn test_chunks_respect_paragraphs() {
        let text = "aaaa\n\nbbbb\n\n  \n\ncccc";
        assert_eq!(chunk_text(text, 10), vec!["aaaa\n\nbbbb", "cccc"]);
        assert_eq!(chunk_text(text, 4), vec!["aaaa", "bbbb", "cccc"]);
    }

    #[test]
    fn test_oversized_paragraph_is_its_own_chunk() {
        let long = "x".repeat(30);
        let text = format!("short\n\n{}\n\ntail", long);
        let chunks = chunk_text(&text, 10);
        assert_eq!(chunks, vec!["short".to_string(), long, "tail".to_string()]);
        assert!(chunk_text("   ", 10).is_empty());
    }

    #[test]
    fn test_parse_json_facts() {
        let text = r#"{"facts": [
            {"fact": "Remote workers save 40 minutes a day", "context": "commute", "source": "2"},
            {"fact": "Unattributed claim", "source": "https://elsewhere.example"},
            {"fact": "  "}
        ]}"#;
        let facts = parse_fact_response(text, &sources());
        assert_eq!(facts.len(), 2);
        assert_eq!(facts[0].source.url, "https://b.example/survey");
        assert_eq!(facts[0].context, "commute");
        assert!(is_unknown_source(&facts[1].source));
        assert!(!facts[1].is_attributed());
    }

    #[test]
    fn test_parse_markdown_facts() {
        let text = "Here are the facts:\n- Productivity rose 13% [Source: https://a.example/report]\n* Offices emptied (Source: Survey B)\n- No tag here";
        let facts = parse_fact_response(text, &sources());
        assert_eq!(facts.len(), 3);
        assert_eq!(facts[0].fact, "Productivity rose 13%");
        assert_eq!(facts[0].source.url, "https://a.example/report");
        assert_eq!(facts[1].source.url, "https://b.example/survey");
        assert!(is_unknown_source(&facts[2].source));
    }

    #[test]
    fn test_unparsable_output_yields_nothing() {
        assert!(parse_fact_response("I cannot help with that.", &sources()).is_empty());
    }
}
