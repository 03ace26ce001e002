//! Pipeline stages for image/PDF-to-deck conversion.
//!
//! Each submodule implements exactly one transformation step so each can be
//! tested on its own.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ encode ──▶ llm ──▶ parse ──▶ crate::deck
//! (upload)  (pdfium)   (JPEG)    (VLM)   (JSON)     (.apkg)
//! ```
//!
//! 1. [`input`]     — classify the upload, sanitise its name, stage it in a temp dir
//! 2. [`render`]    — decode the image or rasterise PDF pages in `spawn_blocking`
//! 3. [`encode`]    — re-encode every page as baseline JPEG
//! 4. [`normalize`] — stages 2 and 3 with per-page progress
//! 5. [`llm`]       — the single network call to the vision model
//! 6. [`parse`]     — recover a card list from the noisy model reply

pub mod encode;
pub mod input;
pub mod llm;
pub mod normalize;
pub mod parse;
pub mod render;
