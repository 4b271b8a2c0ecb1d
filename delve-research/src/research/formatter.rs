//! Deterministic markdown report assembly from learnings

use regex::Regex;
use std::collections::HashSet;
use std::fmt::Write;
use std::sync::OnceLock;

const CONCLUSION_KEYWORDS: &[&str] = &[
    "conclude",
    "summary",
    "ultimately",
    "overall",
    "in conclusion",
    "therefore",
];

const HIGHLIGHT_KEYWORDS: &[&str] = &[
    "significant",
    "important",
    "key finding",
    "major",
    "notably",
];

const MAX_TOPICS: usize = 5;
const TOPIC_KEY_WORDS: usize = 4;
const MIN_SUMMARY_POINTS: usize = 3;
const SUMMARY_HIGHLIGHTS: usize = 2;
const FINAL_TOPIC_INSIGHTS: usize = 2;

const SECTION_BREAK: &str = "\n---\n\n";

fn statistic_regex() -> &'static Regex {
    static STATISTIC: OnceLock<Regex> = OnceLock::new();
    STATISTIC.get_or_init(|| {
        Regex::new(r"\d+%|\d+\s*(million|billion)").expect("valid statistic regex")
    })
}

fn sentence_regex() -> &'static Regex {
    static SENTENCE: OnceLock<Regex> = OnceLock::new();
    SENTENCE.get_or_init(|| Regex::new(r"\.\s+").expect("valid sentence regex"))
}

/// A learning grouped under a topic key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicBucket {
    pub key: String,
    pub entries: Vec<String>,
}

impl TopicBucket {
    /// Topic key with each word capitalised
    pub fn title(&self) -> String {
        self.key
            .split(' ')
            .map(|word| {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Learnings routed into mutually exclusive classes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LearningClassification {
    pub conclusions: Vec<String>,
    pub highlights: Vec<String>,
    pub topics: Vec<TopicBucket>,
    pub uncategorized: Vec<String>,
}

impl LearningClassification {
    /// Single pass, first matching rule wins. Blank learnings are ignored.
    pub fn classify(learnings: &[String]) -> Self {
        let mut classes = Self::default();

        for learning in learnings.iter().map(|l| l.trim()).filter(|l| !l.is_empty()) {
            let lowered = learning.to_lowercase();

            if CONCLUSION_KEYWORDS.iter().any(|k| lowered.contains(k)) {
                classes.conclusions.push(learning.to_string());
                continue;
            }

            if HIGHLIGHT_KEYWORDS.iter().any(|k| lowered.contains(k))
                || statistic_regex().is_match(&lowered)
            {
                classes.highlights.push(learning.to_string());
                continue;
            }

            let key = topic_key(&lowered);
            if let Some(bucket) = classes
                .topics
                .iter_mut()
                .find(|b| key.contains(&b.key) || b.key.contains(&key))
            {
                bucket.entries.push(learning.to_string());
            } else if classes.topics.len() < MAX_TOPICS {
                classes.topics.push(TopicBucket {
                    key,
                    entries: vec![learning.to_string()],
                });
            } else {
                classes.uncategorized.push(learning.to_string());
            }
        }

        classes
    }

    pub fn len(&self) -> usize {
        self.conclusions.len()
            + self.highlights.len()
            + self.topics.iter().map(|t| t.entries.len()).sum::<usize>()
            + self.uncategorized.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn topic_key(lowered: &str) -> String {
    lowered
        .split_whitespace()
        .take(TOPIC_KEY_WORDS)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Ordered set of bullets already emitted in a synthesized section
#[derive(Default)]
struct UsedBullets {
    seen: HashSet<String>,
}

impl UsedBullets {
    fn take(&mut self, bullet: &str) -> bool {
        self.seen.insert(bullet.to_string())
    }

    fn contains(&self, bullet: &str) -> bool {
        self.seen.contains(bullet)
    }
}

/// Renders the structured research report
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentFormatter;

impl ContentFormatter {
    pub fn new() -> Self {
        Self
    }

    pub fn format(&self, learnings: &[String]) -> String {
        let classes = LearningClassification::classify(learnings);
        let mut used = UsedBullets::default();
        let mut out = String::from("# Research Summary\n\n");

        self.write_quick_summary(&mut out, &classes, &mut used);

        if !classes.highlights.is_empty() {
            out.push_str("## 🎯 Key Findings\n\n");
            out.push_str("_Important discoveries and statistics:_\n\n");
            for highlight in &classes.highlights {
                let _ = writeln!(out, "- {}", highlight);
            }
            out.push_str(SECTION_BREAK);
        }

        out.push_str("## 📚 Detailed Analysis\n\n");
        out.push_str("_Comprehensive breakdown by topic:_\n\n");
        for bucket in &classes.topics {
            let _ = writeln!(out, "### {}\n", bucket.title());
            for entry in &bucket.entries {
                write_entry(&mut out, entry);
            }
            out.push('\n');
        }

        // Conclusions after the summary's lead one must not live only in Final Thoughts
        if !classes.uncategorized.is_empty() || classes.conclusions.len() > 1 {
            out.push_str("### 💡 Additional Insights\n\n");
            out.push_str("_Other relevant findings:_\n\n");
            let later_conclusions = classes.conclusions.iter().skip(1);
            for learning in classes.uncategorized.iter().chain(later_conclusions) {
                let _ = writeln!(out, "- {}", learning);
            }
            out.push('\n');
        }

        self.write_final_thoughts(&mut out, &classes, &mut used);
        out
    }

    fn write_quick_summary(
        &self,
        out: &mut String,
        classes: &LearningClassification,
        used: &mut UsedBullets,
    ) {
        out.push_str("## 📋 Quick Summary\n\n");
        out.push_str("_Key points at a glance:_\n\n");

        let mut points: Vec<&str> = Vec::new();
        let leading = classes
            .conclusions
            .first()
            .into_iter()
            .chain(classes.highlights.iter().take(SUMMARY_HIGHLIGHTS));
        for point in leading {
            if used.take(point) {
                points.push(point);
            }
        }

        if points.len() < MIN_SUMMARY_POINTS {
            let wanted = MIN_SUMMARY_POINTS - points.len();
            for first in classes
                .topics
                .iter()
                .take(wanted)
                .filter_map(|bucket| bucket.entries.first())
            {
                if used.take(first) {
                    points.push(first);
                }
            }
        }

        for point in points {
            let _ = writeln!(out, "- **{}**", point);
        }
        out.push_str(SECTION_BREAK);
    }

    fn write_final_thoughts(
        &self,
        out: &mut String,
        classes: &LearningClassification,
        used: &mut UsedBullets,
    ) {
        out.push_str("## 🎓 Final Thoughts\n\n");
        out.push_str("_Synthesizing the research findings:_\n\n");

        for conclusion in classes.conclusions.iter().skip(1) {
            if used.take(conclusion) {
                let _ = writeln!(out, "- {}", conclusion);
            }
        }

        out.push_str("\n_Additional insights:_\n\n");

        for bucket in classes.topics.iter().take(FINAL_TOPIC_INSIGHTS) {
            if let Some(last) = bucket.entries.last() {
                if used.take(last) {
                    let _ = writeln!(out, "- {}", last);
                }
            }
        }

        if let Some(last) = classes.highlights.last() {
            if !used.contains(last) {
                used.take(last);
                let _ = writeln!(out, "- {}", last);
            }
        }
    }
}

/// Multi-sentence entries become a lead bullet with one sub-bullet per
/// following sentence
fn write_entry(out: &mut String, entry: &str) {
    let sentences: Vec<&str> = sentence_regex().split(entry).collect();
    if sentences.len() < 2 {
        let _ = writeln!(out, "- {}", entry);
        return;
    }

    let _ = writeln!(out, "- {}", terminate(sentences[0]));
    for sentence in &sentences[1..] {
        let sentence = sentence.trim();
        if !sentence.is_empty() {
            let _ = writeln!(out, "  - {}", terminate(sentence));
        }
    }
}

fn terminate(sentence: &str) -> String {
    let sentence = sentence.trim_end();
    if sentence.ends_with(['.', '!', '?']) {
        sentence.to_string()
    } else {
        format!("{}.", sentence)
    }
}

/// Format learnings into the markdown report
pub fn format_report(learnings: &[String]) -> String {
    ContentFormatter::new().format(learnings)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_classification_priority() {
        let classes = LearningClassification::classify(&strings(&[
            "Overall, remote work is a significant shift",
            "Productivity rose 13% in one trial",
            "Remote teams rely on async tools",
            "",
        ]));
        assert_eq!(classes.conclusions.len(), 1);
        assert_eq!(classes.highlights, strings(&["Productivity rose 13% in one trial"]));
        assert_eq!(classes.topics.len(), 1);
        assert_eq!(classes.topics[0].key, "remote teams rely on");
        assert_eq!(classes.len(), 3);
    }

    #[test]
    fn test_topic_buckets_cap_and_merge() {
        let classes = LearningClassification::classify(&strings(&[
            "alpha one two three",
            "Alpha One Two Three four",
            "beta x",
            "gamma x",
            "delta x",
            "epsilon x",
            "zeta x",
        ]));
        assert_eq!(classes.topics.len(), 5);
        assert_eq!(classes.topics[0].entries.len(), 2);
        assert_eq!(classes.uncategorized, strings(&["zeta x"]));
        assert_eq!(classes.topics[0].title(), "Alpha One Two Three");
    }

    #[test]
    fn test_multi_sentence_entry_has_no_double_period() {
        let report =
            format_report(&strings(&["Hybrid schedules vary. Most firms allow two days."]));
        assert!(report.contains("- Hybrid schedules vary.\n  - Most firms allow two days.\n"));
        assert!(!report.contains(".."));
    }

    #[test]
    fn test_sections_and_order() {
        let report = format_report(&strings(&[
            "In conclusion, flexibility matters",
            "Therefore policies should adapt",
            "A major finding is reduced commuting",
        ]));
        assert!(report.starts_with("# Research Summary\n\n## 📋 Quick Summary"));
        let summary = report.find("Quick Summary").unwrap();
        let findings = report.find("Key Findings").unwrap();
        let analysis = report.find("Detailed Analysis").unwrap();
        let thoughts = report.find("Final Thoughts").unwrap();
        assert!(summary < findings && findings < analysis && analysis < thoughts);
        assert!(report.contains("- **In conclusion, flexibility matters**"));
        assert!(report.contains("- Therefore policies should adapt"));
        let insights = report.find("Additional Insights").unwrap();
        assert!(analysis < insights && insights < thoughts);
    }

    const LEARNING_POOL: &[&str] = &[
        "In conclusion, flexibility matters",
        "Therefore policies should adapt",
        "Overall the evidence favours hybrid models. Fully remote roles remain rare.",
        "Productivity rose 13% in one trial",
        "A major finding is reduced commuting",
        "Remote teams rely on async tools",
        "Remote teams rely on async tools more than offices",
        "Managers report fewer meetings",
        "Hybrid schedules vary. Most firms allow two days.",
        "Office rents fell in large cities",
        "Employees value schedule autonomy",
        "Broadband access limits rural adoption",
        "Childcare costs shape location choices",
    ];

    /// Everything before Final Thoughts
    fn core_sections(report: &str) -> &str {
        &report[..report.find("## 🎓 Final Thoughts").unwrap()]
    }

    /// Multi-sentence entries are split into bullets, so match the lead sentence
    fn lead_text(learning: &str) -> &str {
        sentence_regex()
            .split(learning.trim())
            .next()
            .unwrap()
            .trim_end_matches('.')
    }

    #[test]
    fn test_later_conclusions_appear_outside_final_thoughts() {
        let report = format_report(&strings(&[
            "In conclusion, flexibility matters",
            "Therefore policies should adapt",
            "Remote teams rely on async tools",
        ]));
        let core = core_sections(&report);
        assert!(core.contains("In conclusion, flexibility matters"));
        assert!(core.contains("- Therefore policies should adapt"));
        assert!(core.contains("Remote teams rely on async tools"));
    }

    #[test]
    fn test_every_learning_reaches_a_core_section() {
        for window in 1..=LEARNING_POOL.len() {
            for start in 0..LEARNING_POOL.len() {
                let learnings: Vec<String> = LEARNING_POOL
                    .iter()
                    .cycle()
                    .skip(start)
                    .take(window)
                    .map(|s| s.to_string())
                    .collect();

                let report = format_report(&learnings);
                let core = core_sections(&report);
                for learning in &learnings {
                    assert!(
                        core.contains(lead_text(learning)),
                        "{:?} missing before Final Thoughts in:\n{}",
                        learning,
                        report
                    );
                }
            }
        }
    }

    #[test]
    fn test_format_is_deterministic() {
        let learnings = strings(LEARNING_POOL);
        assert_eq!(format_report(&learnings), format_report(&learnings));
    }

    #[test]
    fn test_empty_input_still_renders_skeleton() {
        let report = format_report(&[]);
        assert!(report.starts_with("# Research Summary"));
        assert!(report.contains("Final Thoughts"));
        assert!(!report.contains("Key Findings"));
    }
}
