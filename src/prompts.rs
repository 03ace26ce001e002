//! Prompts sent to the vision model.
//!
//! Callers can override both via [`crate::config::ConversionConfig`]; the
//! constants here are used only when no override is provided.

/// System message framing the model as a flashcard generator.
pub const SYSTEM_PROMPT: &str = "You are an AI flashcard generator. Your task is to convert \
multiple choice questions into Anki flashcards. You must ONLY output a valid JSON array, nothing else.";

/// Instruction sent in the user turn together with the page images.
pub const FLASHCARD_INSTRUCTION: &str = r#"Convert these multiple choice questions into flashcards.
Return ONLY a JSON array where each object has a "front" field (the question together with its answer options) and a "back" field (the correct answer, or "unanswered" if the page does not mark one).
List each answer choice on its own line and label it, for example A, B, C.
No other text."#;
