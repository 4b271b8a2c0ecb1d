//! Source confidence classification
//!
//! Scores a citation from its URL domain and its wording. Every heuristic is
//! evaluated so the reasons list is complete.

use super::types::{Confidence, ConfidenceRating, ValidatedSource};
use delve_core::SourceInfo;
use regex::Regex;
use std::sync::OnceLock;

/// Domain substrings that mark a trusted source, with the reason reported
const TRUSTED_DOMAINS: &[(&[&str], &str)] = &[
    (&[".edu"], "Educational institution domain (.edu)"),
    (&["scholar.google"], "Google Scholar academic search platform"),
    (&["academia.edu", "researchgate.net"], "Academic research platform"),
    (&["arxiv.org", "jstor.org"], "Academic paper repository"),
    (&["nature.com", "science.org"], "Premier scientific journal publisher"),
    (&["sciencedirect.com", "springer.com"], "Major scientific publisher platform"),
    (&["academic.oup.com", "wiley.com"], "Academic journal publisher"),
    (&["frontiersin.org", "mdpi.com"], "Open access scientific publisher"),
    (&["cell.com", "lancet.com"], "Leading medical/scientific journal"),
    (&[".gov"], "Government domain (.gov)"),
    (&["who.int"], "World Health Organization"),
    (&["nih.gov", "pubmed"], "National Institutes of Health resource"),
    (&["europa.eu", "un.org"], "International organization"),
    (&["nsf.gov", "nasa.gov"], "Scientific government agency"),
    (&["mayoclinic.org", "hopkinsmedicine.org"], "Leading medical institution"),
    (&["ieee.org", "acm.org"], "Professional scientific/technical organization"),
    (&["aps.org", "acs.org"], "Professional scientific society"),
];

const HEALTH_SITES: &[&str] = &["webmd.com", "healthline.com"];
const BUSINESS_SITES: &[&str] = &["forbes.com", "bloomberg.com"];

/// Any single match promotes to High
const STRONG_INDICATORS: &[&str] = &[
    "journal",
    "study",
    "research",
    "clinical trial",
    "meta-analysis",
    "systematic review",
    "peer-reviewed",
    "publication",
    "proceedings",
    "conference",
    "doi:",
    "volume",
    "issue",
    "pmid:",
    "isbn:",
    "randomized controlled trial",
    "cohort study",
    "scientific paper",
    "published research",
    "empirical study",
    "longitudinal study",
    "statistical analysis",
    "clinical research",
    "experimental results",
    "laboratory findings",
];

/// Two or more matches promote to High
const MODERATE_INDICATORS: &[&str] = &[
    "expert opinion",
    "professional analysis",
    "industry report",
    "white paper",
    "technical documentation",
    "official documentation",
    "professional guidelines",
    "case study",
    "field research",
    "market research",
];

const MODERATE_THRESHOLD: usize = 2;

fn url_regex() -> &'static Regex {
    static URL: OnceLock<Regex> = OnceLock::new();
    URL.get_or_init(|| Regex::new(r"https?://\S+").expect("valid url regex"))
}

fn citation_regex() -> &'static Regex {
    static CITATION: OnceLock<Regex> = OnceLock::new();
    CITATION.get_or_init(|| {
        Regex::new(r"^(\d+)\.\s*(.*?)(?:\s*-\s*(https?://\S+))?$").expect("valid citation regex")
    })
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}

/// Classify one citation string
pub fn classify(citation: &str) -> ConfidenceRating {
    if citation.trim().is_empty() {
        return ConfidenceRating {
            confidence: Confidence::Medium,
            reasons: vec!["No source information provided".to_string()],
        };
    }

    let text = citation.to_lowercase();
    let mut confidence = Confidence::Medium;
    let mut reasons = Vec::new();

    if let Some(url) = url_regex().find(citation) {
        let domain = url.as_str().to_lowercase();

        for (needles, reason) in TRUSTED_DOMAINS {
            if contains_any(&domain, needles) {
                confidence = Confidence::High;
                reasons.push(reason.to_string());
            }
        }

        if contains_any(&domain, HEALTH_SITES) {
            if text.contains("medically reviewed") || text.contains("peer-reviewed") {
                confidence = Confidence::High;
                reasons.push("Medical information with professional review process".to_string());
            } else {
                reasons.push(
                    "Commercial health information site with medical review process".to_string(),
                );
            }
        }

        if contains_any(&domain, BUSINESS_SITES)
            && contains_any(&text, &["research", "study", "analysis"])
        {
            confidence = Confidence::High;
            reasons.push("Business publication reporting on research/studies".to_string());
        }
    }

    let strong: Vec<&str> = STRONG_INDICATORS
        .iter()
        .copied()
        .filter(|indicator| text.contains(indicator))
        .collect();
    if !strong.is_empty() {
        confidence = Confidence::High;
        reasons.push(format!(
            "Contains academic/scientific indicators: {}",
            strong.join(", ")
        ));
    }

    let moderate: Vec<&str> = MODERATE_INDICATORS
        .iter()
        .copied()
        .filter(|indicator| text.contains(indicator))
        .collect();
    if moderate.len() >= MODERATE_THRESHOLD {
        confidence = Confidence::High;
        reasons.push(format!(
            "Multiple professional/technical indicators: {}",
            moderate.join(", ")
        ));
    } else if !moderate.is_empty() {
        reasons.push(format!(
            "Contains professional/technical indicators: {}",
            moderate.join(", ")
        ));
    }

    if reasons.is_empty() {
        let fallback = if text.contains("research") || text.contains("study") {
            "Research-based content - specific methodology not specified"
        } else if text.contains("official") || text.contains("professional") {
            "Professional/official source - requires verification of credentials"
        } else {
            "General informational source - requires additional verification"
        };
        reasons.push(fallback.to_string());
    }

    ConfidenceRating {
        confidence,
        reasons,
    }
}

/// Parse a numbered citation list (`N. text - https://url` per line)
pub fn parse_sources(text: &str) -> Vec<ValidatedSource> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(parse_citation_line)
        .collect()
}

fn parse_citation_line(line: &str) -> Option<ValidatedSource> {
    let captures = citation_regex().captures(line)?;
    let number = captures.get(1)?.as_str().parse::<usize>().ok()?;
    let text = captures.get(2)?.as_str().trim().to_string();
    if text.is_empty() {
        return None;
    }
    let url = captures
        .get(3)
        .map(|m| m.as_str().trim().to_string())
        .filter(|url| !url.is_empty());

    let citation = match &url {
        Some(url) => format!("{} - {}", text, url),
        None => text.clone(),
    };
    let rating = classify(&citation);

    Some(ValidatedSource {
        number,
        text,
        url,
        confidence: rating.confidence,
        reasons: rating.reasons,
    })
}

/// Rate a result's sources, numbered from 1 in order
pub fn validate_sources(sources: &[SourceInfo]) -> Vec<ValidatedSource> {
    sources
        .iter()
        .enumerate()
        .map(|(index, source)| {
            let text = source.display_name().to_string();
            let mut citation = format!("{} - {}", text, source.url);
            if let Some(snippet) = source.snippet.as_deref() {
                citation.push(' ');
                citation.push_str(snippet);
            }
            let rating = classify(&citation);
            ValidatedSource {
                number: index + 1,
                text,
                url: Some(source.url.clone()),
                confidence: rating.confidence,
                reasons: rating.reasons,
            }
        })
        .collect()
}
