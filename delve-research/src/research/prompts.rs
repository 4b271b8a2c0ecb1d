//! Prompt templates and response parsing helpers

use chrono::Utc;
use serde::de::DeserializeOwned;

/// Maximum characters of one document handed to the summariser
pub const DOCUMENT_CHAR_LIMIT: usize = 25_000;

/// Research persona shared by every research-phase call
pub fn research_system_prompt() -> String {
    format!(
        "You are an expert researcher. Today is {}. Follow these instructions when responding:\n\
         - You may be asked to research subjects that are after your knowledge cutoff; assume the user is right when presented with news.\n\
         - The user is a highly experienced analyst, no need to simplify it, be as detailed as possible and make sure your response is correct.\n\
         - Be highly organized.\n\
         - Mistakes erode trust, so be accurate and thorough.\n\
         - Value good arguments over authorities.\n\
         - You may use high levels of speculation or prediction, just flag it.",
        Utc::now().format("%Y-%m-%d")
    )
}

pub fn clarifying_questions_prompt(query: &str, max_questions: usize) -> String {
    format!(
        "Given the following query from the user, ask some follow up questions to clarify the research direction. \
         Return a maximum of {max_questions} questions, but feel free to return less if the original query is clear.\n\n\
         <query>{query}</query>\n\n\
         Respond with JSON: {{\"questions\": [\"...\"]}}"
    )
}

pub fn sub_queries_prompt(query: &str, breadth: usize, learnings: &[String]) -> String {
    let mut prompt = format!(
        "Given the following prompt from the user, generate a list of search queries to research the topic. \
         Return a maximum of {breadth} queries, but feel free to return less if the original prompt is clear. \
         Make sure each query is unique and not similar to each other.\n\n\
         <prompt>{query}</prompt>"
    );
    if !learnings.is_empty() {
        prompt.push_str(
            "\n\nHere are some learnings from previous research, use them to generate more specific queries:\n",
        );
        prompt.push_str(&learnings.join("\n"));
    }
    prompt.push_str(
        "\n\nRespond with JSON: {\"queries\": [{\"query\": \"...\", \"researchGoal\": \"...\"}]}. \
         The research goal explains what the query should uncover and how to advance the research once results are found.",
    );
    prompt
}

pub fn summarize_results_prompt(
    query: &str,
    contents: &[String],
    max_learnings: usize,
    max_follow_ups: usize,
) -> String {
    let contents = contents
        .iter()
        .map(|content| format!("<content>\n{content}\n</content>"))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Given the following contents from a search for the query <query>{query}</query>, generate a list of learnings from the contents. \
         Return a maximum of {max_learnings} learnings, but feel free to return less if the contents are clear. \
         Make sure each learning is unique and not similar to each other. The learnings should be concise and information dense. \
         Include any entities like people, places, companies and products, as well as any exact metrics, numbers, or dates.\n\
         Also return up to {max_follow_ups} follow-up questions that would take the research further.\n\n\
         <contents>{contents}</contents>\n\n\
         Respond with JSON: {{\"learnings\": [\"...\"], \"followUpQuestions\": [\"...\"]}}"
    )
}

pub const FACT_EXTRACTION_SYSTEM_PROMPT: &str = "You extract verifiable factual statements from research notes. \
Only report statements supported by the notes. Attribute each statement to one of the numbered sources when possible.";

pub fn fact_extraction_prompt(chunk: &str, source_list: &str) -> String {
    format!(
        "Extract the factual statements from the research notes below.\n\n\
         Sources:\n{source_list}\n\n\
         Notes:\n{chunk}\n\n\
         Respond with JSON: {{\"facts\": [{{\"fact\": \"...\", \"context\": \"...\", \"source\": \"<source number or URL>\"}}]}}. \
         If JSON is not possible, answer with a markdown bullet list where each bullet ends with [Source: <number or URL>]."
    )
}

pub const READING_LEVEL_SYSTEM_PROMPT: &str = "You are a helpful assistant that adjusts content to different reading levels \
while maintaining exact structural consistency. You must keep the same sections, headings, and organizational format regardless of reading level.";

/// Truncate to at most `max_chars` characters on a char boundary
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}

/// Parse a JSON value out of a model answer.
///
/// Accepts bare JSON, fenced code blocks and JSON embedded in prose.
pub fn extract_json<T: DeserializeOwned>(text: &str) -> Option<T> {
    let trimmed = text.trim();
    if let Ok(value) = serde_json::from_str(trimmed) {
        return Some(value);
    }

    let unfenced = strip_code_fence(trimmed);
    if let Ok(value) = serde_json::from_str(unfenced) {
        return Some(value);
    }

    for (open, close) in [('{', '}'), ('[', ']')] {
        if let (Some(start), Some(end)) = (unfenced.find(open), unfenced.rfind(close)) {
            if start < end {
                if let Ok(value) = serde_json::from_str(&unfenced[start..=end]) {
                    return Some(value);
                }
            }
        }
    }
    None
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    rest.trim_end().trim_end_matches("```").trim()
}
