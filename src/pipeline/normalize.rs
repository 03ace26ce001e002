//! Page normalisation: input file → ordered `Vec<EncodedImage>`.
//!
//! Combines [`render`](super::render) and [`encode`](super::encode) and
//! reports per-page progress for multi-page documents.

use crate::config::ConversionConfig;
use crate::error::Pdf2AnkiError;
use crate::pipeline::encode::{encode_page, EncodedImage};
use crate::pipeline::input::InputKind;
use crate::pipeline::render::render_pages;
use crate::progress::ProgressSink;
use image::DynamicImage;
use std::path::Path;
use tracing::info;

/// Decode `path` and re-encode each page as JPEG, in document order.
///
/// The same file and config always produce byte-identical output.
pub async fn normalize(
    path: &Path,
    kind: InputKind,
    config: &ConversionConfig,
    progress: &dyn ProgressSink,
) -> Result<Vec<EncodedImage>, Pdf2AnkiError> {
    if kind == InputKind::Pdf {
        progress.report("Converting PDF to images...", 10);
    }

    let pages = render_pages(
        path,
        kind,
        config.max_rendered_pixels,
        config.password.as_deref(),
    )
    .await?;
    if pages.is_empty() {
        return Err(Pdf2AnkiError::NoPages {
            path: path.to_path_buf(),
        });
    }

    let encoded = encode_pages(path, kind, &pages, config.jpeg_quality, progress)?;

    info!(
        "Normalised {} into {} page image(s), {} bytes total",
        path.display(),
        encoded.len(),
        encoded.iter().map(EncodedImage::len).sum::<usize>()
    );
    Ok(encoded)
}

/// Encode already-rendered pages, numbering them from 1 in slice order.
///
/// PDFs report `Preparing page i/n...` at `10 + i * 30 / n` before each page;
/// a single image reports nothing here. `path` only labels errors.
pub fn encode_pages(
    path: &Path,
    kind: InputKind,
    pages: &[DynamicImage],
    jpeg_quality: u8,
    progress: &dyn ProgressSink,
) -> Result<Vec<EncodedImage>, Pdf2AnkiError> {
    let total = pages.len();
    let mut encoded = Vec::with_capacity(total);
    for (i, page) in pages.iter().enumerate() {
        let page_num = i + 1;
        if kind == InputKind::Pdf {
            let pct = 10 + page_num * 30 / total;
            progress.report(&format!("Preparing page {page_num}/{total}..."), pct as u8);
        }
        let image = encode_page(page_num, page, jpeg_quality).map_err(|e| {
            Pdf2AnkiError::Decode {
                path: path.to_path_buf(),
                detail: format!("page {page_num}: image encoding failed: {e}"),
            }
        })?;
        encoded.push(image);
    }
    Ok(encoded)
}
