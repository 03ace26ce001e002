//! Lenient extraction of flashcards from free-form model output.
//!
//! Vision models are told to answer with a bare JSON array and frequently
//! don't: they prepend "Sure! Here are your flashcards:", wrap the array in
//! a ```` ```json ```` fence, append a closing remark, or run out of tokens
//! mid-object. This module absorbs that noise without involving the HTTP
//! layer:
//!
//! 1. [`extract_array`] trims to the span between the first `[` and the
//!    last `]`. No such span is a hard failure
//!    ([`Pdf2AnkiError::MalformedResponse`]).
//! 2. [`parse_cards`] parses that span. Invalid JSON degrades to zero cards
//!    rather than an error; elements that are not `{front, back}` string
//!    pairs are dropped and counted in the [`ParseReport`].

use crate::error::Pdf2AnkiError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

/// A validated question/answer pair. Both sides are non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    front: String,
    back: String,
}

impl Card {
    /// Returns `None` unless both sides contain non-whitespace text.
    pub fn new(front: impl Into<String>, back: impl Into<String>) -> Option<Self> {
        let (front, back) = (front.into(), back.into());
        if front.trim().is_empty() || back.trim().is_empty() {
            return None;
        }
        Some(Self { front, back })
    }

    pub fn front(&self) -> &str {
        &self.front
    }

    pub fn back(&self) -> &str {
        &self.back
    }
}

/// Outcome of parsing one model reply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParseReport {
    /// Valid cards in model output order.
    pub cards: Vec<Card>,
    /// Number of array elements seen.
    pub candidates: usize,
    /// Elements discarded for being the wrong shape.
    pub dropped: usize,
    /// Set when the bracketed span was not valid JSON.
    pub parse_error: Option<String>,
}

impl ParseReport {
    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }
}

/// Cut `raw` down to the outermost `[ … ]` span.
///
/// Leading prose before the first `[` and trailing prose after the last `]`
/// are discarded. Fails if either marker is missing.
pub fn extract_array(raw: &str) -> Result<&str, Pdf2AnkiError> {
    let text = raw.trim();
    let start = text.find('[').ok_or_else(|| Pdf2AnkiError::MalformedResponse {
        reason: "no '[' found in response".into(),
    })?;
    let text = &text[start..];
    let end = text.rfind(']').ok_or_else(|| Pdf2AnkiError::MalformedResponse {
        reason: "no ']' found after the array start".into(),
    })?;
    Ok(&text[..=end])
}

/// Parse a raw model reply into cards.
///
/// Only a reply with no array markers at all is an error. Everything else,
/// including syntactically broken JSON, yields a (possibly empty) report.
pub fn parse_cards(raw: &str) -> Result<ParseReport, Pdf2AnkiError> {
    let span = extract_array(raw)?;

    let value: Value = match serde_json::from_str(span) {
        Ok(v) => v,
        Err(e) => {
            warn!("Model reply is not valid JSON: {}", e);
            debug!("Unparseable span: {}", span);
            return Ok(ParseReport {
                parse_error: Some(e.to_string()),
                ..ParseReport::default()
            });
        }
    };

    let Value::Array(items) = value else {
        warn!("Model reply parsed, but not as an array");
        return Ok(ParseReport::default());
    };

    let candidates = items.len();
    let cards: Vec<Card> = items.into_iter().filter_map(card_from_value).collect();
    let dropped = candidates - cards.len();
    if dropped > 0 {
        warn!("Dropped {} of {} malformed flashcard entries", dropped, candidates);
    }

    Ok(ParseReport {
        cards,
        candidates,
        dropped,
        parse_error: None,
    })
}

fn card_from_value(value: Value) -> Option<Card> {
    let Value::Object(mut map) = value else {
        debug!("Dropping non-object entry");
        return None;
    };
    match (map.remove("front"), map.remove("back")) {
        (Some(Value::String(front)), Some(Value::String(back))) => Card::new(front, back),
        _ => {
            debug!("Dropping entry without string front/back");
            None
        }
    }
}
