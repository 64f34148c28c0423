//! Prompt text, response schemas, and context assembly.
//!
//! The fallback sentence in [`NOT_FOUND_ANSWER`] is part of the answer
//! contract: callers and tests match on it verbatim.

use serde_json::{json, Value};

use crate::models::ScoredChunk;

/// What the generator must say when the retrieved context lacks the answer.
pub const NOT_FOUND_ANSWER: &str = "I cannot find the answer in the provided document.";

/// Separator placed between retrieved chunks in the context block.
pub const CONTEXT_DELIMITER: &str = "\n\n---\n\n";

pub const EXTRACTION_INSTRUCTION: &str = "You are a tool who extract text from any data given as input.";

pub const DEFAULT_SUMMARY_PROMPT: &str =
    "Summarize this document, extract key points, suggest action items, and identify the tone.";

pub const SUMMARY_INSTRUCTION: &str = "You are a helpful, cheerful, and professional document assistant. \
Analyze the provided document. Return the response in a structured JSON format. \
Keep the tone light but informative.";

/// System instruction for retrieval-augmented answers.
pub fn answer_instruction() -> String {
    format!(
        "You are a helpful assistant. Use the following pieces of retrieved context and with your \
knowledge to answer the user's question effectively so that user easily understand.\n\
If the answer is not in the given context, say \"{}\"",
        NOT_FOUND_ANSWER
    )
}

/// Join hit texts in the order given (highest similarity first).
pub fn build_context(hits: &[ScoredChunk]) -> String {
    hits.iter()
        .map(|h| h.text.as_str())
        .collect::<Vec<_>>()
        .join(CONTEXT_DELIMITER)
}

/// Final prompt: context block, separator, then the question.
pub fn build_prompt(context: &str, question: &str) -> String {
    format!("{} \n\n {}", context, question)
}

/// Schema for the extraction response: `{ "extractedText": string }`.
pub fn extraction_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "extractedText": { "type": "STRING" }
        },
        "required": ["extractedText"]
    })
}

/// Schema for [`AnalysisResult`](crate::models::AnalysisResult) responses.
pub fn analysis_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "summary": {
                "type": "STRING",
                "description": "A concise summary of the document (max 3 sentences)."
            },
            "keyPoints": {
                "type": "ARRAY",
                "items": { "type": "STRING" },
                "description": "List of 3-5 most important facts or data points."
            },
            "actionItems": {
                "type": "ARRAY",
                "items": { "type": "STRING" },
                "description": "Suggested next steps or action items based on the content."
            },
            "tone": {
                "type": "STRING",
                "description": "One word describing the tone (e.g., Professional, Urgent, Casual)."
            }
        },
        "required": ["summary", "keyPoints", "actionItems", "tone"]
    })
}
