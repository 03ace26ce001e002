//! Deck assembly: validated cards → `.apkg` file on disk.
//!
//! The package is built in a scratch directory and only then copied into the
//! output directory under a temporary name and renamed into place, so a
//! reader of `<output_dir>/<deck>.apkg` sees either nothing, the previous
//! file, or the complete new one. Scratch and partial files are removed on
//! every exit path.

pub mod apkg;
pub mod ids;
pub mod text;

use crate::error::Pdf2AnkiError;
use crate::pipeline::input::{secure_filename, FALLBACK_DECK_NAME};
use crate::pipeline::parse::Card;
use serde::Serialize;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::info;

pub use ids::DeckIds;

/// A named, ordered collection of cards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deck {
    name: String,
    cards: Vec<Card>,
}

impl Deck {
    /// `name` is sanitised into something safe to use as a file name.
    pub fn new(name: &str, cards: Vec<Card>) -> Self {
        let safe = secure_filename(name);
        let name = if safe.is_empty() {
            FALLBACK_DECK_NAME.to_string()
        } else {
            safe
        };
        Self { name, cards }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cards(&self) -> &[Card] {
        &self.cards
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    /// File name the package is delivered under.
    pub fn file_name(&self) -> String {
        format!("{}.apkg", self.name)
    }
}

/// A package delivered to the output directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssembledDeck {
    pub path: PathBuf,
    pub filename: String,
    pub note_count: usize,
    /// Size of the scratch package; always equals the delivered file's size.
    pub staged_len: u64,
    pub ids: DeckIds,
}

/// Build `<output_dir>/<deck name>.apkg` from `deck`.
///
/// An existing file with the same name is replaced atomically. Concurrent
/// uploads whose names sanitise to the same stem share one target: the last
/// rename wins, and every response names that one file.
pub async fn assemble_deck(
    deck: &Deck,
    output_dir: &Path,
    ids: DeckIds,
) -> Result<AssembledDeck, Pdf2AnkiError> {
    let final_path = output_dir.join(deck.file_name());
    if deck.is_empty() {
        return Err(Pdf2AnkiError::packaging(&final_path, "deck has no cards"));
    }

    tokio::fs::create_dir_all(output_dir)
        .await
        .map_err(|e| Pdf2AnkiError::packaging(output_dir, e))?;

    let scratch = tempfile::Builder::new()
        .prefix("pdf2anki-deck-")
        .tempdir()
        .map_err(|e| Pdf2AnkiError::packaging(&final_path, format!("scratch dir: {e}")))?;
    let db_path = scratch.path().join(apkg::COLLECTION_ENTRY);
    let staged_path = scratch.path().join(deck.file_name());

    let note_count = apkg::write_collection(&db_path, deck, ids).await?;

    let out_dir = output_dir.to_path_buf();
    let target = final_path.clone();
    let staged_len = tokio::task::spawn_blocking(move || {
        let staged_len = apkg::write_package(&db_path, &staged_path)?;
        deliver(&staged_path, &out_dir, &target)?;
        Ok::<_, Pdf2AnkiError>(staged_len)
    })
    .await
    .map_err(|e| Pdf2AnkiError::Internal(format!("Packaging task panicked: {e}")))??;

    drop(scratch);
    info!(
        "Deck '{}' written: {} notes, {} bytes → {}",
        deck.name(),
        note_count,
        staged_len,
        final_path.display()
    );

    Ok(AssembledDeck {
        filename: deck.file_name(),
        path: final_path,
        note_count,
        staged_len,
        ids,
    })
}

/// Copy `staged` next to `target` under a temporary name, flush it, and
/// rename it over `target`. The temporary is deleted if any step fails.
fn deliver(staged: &Path, out_dir: &Path, target: &Path) -> Result<(), Pdf2AnkiError> {
    let io_err = |e: std::io::Error| Pdf2AnkiError::packaging(target, e);

    let mut part = tempfile::Builder::new()
        .prefix(".pdf2anki-")
        .suffix(".part")
        .tempfile_in(out_dir)
        .map_err(io_err)?;
    let mut src = File::open(staged).map_err(io_err)?;
    std::io::copy(&mut src, part.as_file_mut()).map_err(io_err)?;
    part.as_file().sync_all().map_err(io_err)?;
    part.persist(target).map_err(|e| io_err(e.error))?;
    Ok(())
}
