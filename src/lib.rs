//! # pdf2anki
//!
//! Turn images and PDFs of multiple-choice questions into Anki decks using
//! Vision Language Models (VLMs).
//!
//! ## Pipeline Overview
//!
//! ```text
//! upload (PNG / JPEG / PDF)
//!  │
//!  ├─ 1. Input      sanitise the name, check the signature, stage in a temp dir
//!  ├─ 2. Normalise  decode or rasterise pages via pdfium, cap size, re-encode as JPEG
//!  ├─ 3. VLM        one request with every page to gpt-4o-mini / claude / gemini / …
//!  ├─ 4. Parse      repair the reply down to a JSON array, keep valid {front, back}
//!  └─ 5. Deck       escape text, write an Anki collection, zip it into an .apkg
//! ```
//!
//! Progress for each stage goes to a [`ProgressSink`]; the HTTP server
//! exposes it as a server-sent event stream per upload.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdf2anki::{convert_file, ConversionConfig, NoopProgress, VisionExtractor};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / GEMINI_API_KEY
//!     let config = ConversionConfig::default();
//!     let extractor = VisionExtractor::from_config(&config)?;
//!     let output = convert_file(
//!         "quiz.pdf",
//!         &extractor,
//!         &config,
//!         Path::new("decks"),
//!         &NoopProgress,
//!     )
//!     .await?;
//!     println!("{} cards → {}", output.cards.len(), output.deck.path.display());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf2anki` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! pdf2anki = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod deck;
pub mod error;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod server;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ConversionConfig, ConversionConfigBuilder, ServerConfig};
pub use convert::{convert_file, convert_input, convert_upload, ConversionOutput};
pub use deck::{assemble_deck, AssembledDeck, Deck, DeckIds};
pub use error::Pdf2AnkiError;
pub use pipeline::llm::{CardExtractor, VisionExtractor};
pub use pipeline::parse::{parse_cards, Card, ParseReport};
pub use progress::{
    JobProgress, NoopProgress, ProgressHandle, ProgressRegistry, ProgressSink, ProgressSnapshot,
};
pub use server::{router, serve, AppState};
