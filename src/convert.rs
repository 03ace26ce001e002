//! Conversion entry points: one input file → one `.apkg` deck.
//!
//! Each call runs the whole pipeline for a single upload and reports its
//! stages through the caller's [`ProgressSink`]:
//!
//! | Stage | Status | Progress |
//! |---|---|---|
//! | upload received | `Starting...` / `File uploaded...` | 0 / 10 |
//! | PDF rasterised | `Converting PDF to images...`, `Preparing page i/n...` | 10–40 |
//! | image decoded | `Processing image...` | 25 |
//! | model call | `Processing with AI...` (PDF) / `Analyzing image with AI...` | 50 |
//! | | `Generating flashcards...` | 85 |
//! | reply parsed | `Processing flashcards...` | 90 |
//! | cards validated | `Finalizing flashcards...` | 95 |
//! | packaging | `Creating Anki deck...` | 98 |
//! | delivered | `Done!` | 100 |

use crate::config::ConversionConfig;
use crate::deck::{assemble_deck, AssembledDeck, Deck, DeckIds};
use crate::error::Pdf2AnkiError;
use crate::pipeline::input::{self, deck_name_for, InputKind, ResolvedInput};
use crate::pipeline::llm::CardExtractor;
use crate::pipeline::normalize::normalize;
use crate::pipeline::parse::{parse_cards, Card};
use crate::progress::ProgressSink;
use serde::Serialize;
use std::path::Path;
use std::time::Instant;
use tracing::info;

/// Everything a finished conversion produced.
#[derive(Debug, Clone, Serialize)]
pub struct ConversionOutput {
    /// The delivered package.
    pub deck: AssembledDeck,
    /// Cards in the order the model returned them.
    pub cards: Vec<Card>,
    /// Array elements the model returned.
    pub candidates: usize,
    /// Elements discarded for missing or empty `front`/`back`.
    pub dropped: usize,
    /// Page images sent to the model.
    pub pages: usize,
}

/// Convert uploaded bytes.
///
/// `filename` is the client-supplied name. Its extension decides the input
/// kind and its sanitised stem names the deck. The staged copy of the upload is
/// removed before this returns.
pub async fn convert_upload(
    filename: &str,
    bytes: &[u8],
    extractor: &dyn CardExtractor,
    config: &ConversionConfig,
    output_dir: &Path,
    progress: &dyn ProgressSink,
) -> Result<ConversionOutput, Pdf2AnkiError> {
    progress.report("Starting...", 0);
    let (safe_name, _) = input::upload_name(filename)?;
    let resolved = input::stage_upload(&safe_name, bytes).await?;
    progress.report("File uploaded...", 10);

    convert_input(
        &resolved,
        &deck_name_for(&safe_name),
        extractor,
        config,
        output_dir,
        progress,
    )
    .await
}

/// Convert a file already on disk. The deck is named after its file stem.
pub async fn convert_file(
    path: impl AsRef<Path>,
    extractor: &dyn CardExtractor,
    config: &ConversionConfig,
    output_dir: &Path,
    progress: &dyn ProgressSink,
) -> Result<ConversionOutput, Pdf2AnkiError> {
    let path = path.as_ref();
    progress.report("Starting...", 0);
    let resolved = input::resolve_local(path)?;
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .map(deck_name_for)
        .unwrap_or_else(|| input::FALLBACK_DECK_NAME.to_string());
    progress.report("File uploaded...", 10);

    convert_input(&resolved, &name, extractor, config, output_dir, progress).await
}

/// Run normalise → extract → parse → assemble for a resolved input.
pub async fn convert_input(
    input: &ResolvedInput,
    deck_name: &str,
    extractor: &dyn CardExtractor,
    config: &ConversionConfig,
    output_dir: &Path,
    progress: &dyn ProgressSink,
) -> Result<ConversionOutput, Pdf2AnkiError> {
    let start = Instant::now();
    let kind = input.kind();
    info!("Converting {} ({:?})", input.path().display(), kind);

    // ── Step 1: Normalise pages ──────────────────────────────────────────
    if kind == InputKind::Image {
        progress.report("Processing image...", 25);
    }
    let images = normalize(input.path(), kind, config, progress).await?;

    // ── Step 2: Ask the model ────────────────────────────────────────────
    let ai_status = match kind {
        InputKind::Pdf => "Processing with AI...",
        InputKind::Image => "Analyzing image with AI...",
    };
    progress.report(ai_status, 50);
    progress.report("Generating flashcards...", 85);
    let reply = extractor.extract(&images).await?;

    // ── Step 3: Parse the reply ──────────────────────────────────────────
    progress.report("Processing flashcards...", 90);
    let report = parse_cards(&reply)?;
    if report.is_empty() {
        return Err(Pdf2AnkiError::NoCards {
            candidates: report.candidates,
            dropped: report.dropped,
        });
    }
    progress.report("Finalizing flashcards...", 95);

    // ── Step 4: Package the deck ─────────────────────────────────────────
    progress.report("Creating Anki deck...", 98);
    let deck = Deck::new(deck_name, report.cards);
    let assembled = assemble_deck(&deck, output_dir, DeckIds::from_seed(config.id_seed)).await?;
    progress.report("Done!", 100);

    info!(
        "Conversion complete: {} cards from {} page(s) in {}ms",
        assembled.note_count,
        images.len(),
        start.elapsed().as_millis()
    );

    Ok(ConversionOutput {
        deck: assembled,
        cards: deck.cards().to_vec(),
        candidates: report.candidates,
        dropped: report.dropped,
        pages: images.len(),
    })
}
