//! Rasterisation: turn an input file into in-memory page images.
//!
//! PDFs go through pdfium, which wraps a C++ library with thread-local
//! state; it runs inside `spawn_blocking` so Tokio workers never stall on
//! CPU-heavy rendering. Plain images are decoded with the `image` crate.
//! Either way every page is capped at `max_rendered_pixels` on its longest
//! edge so payload size stays bounded for the model call.

use crate::error::Pdf2AnkiError;
use crate::pipeline::input::InputKind;
use image::imageops::FilterType;
use image::{DynamicImage, ImageReader};
use pdfium_render::prelude::*;
use std::path::Path;
use tracing::{debug, info};

/// Load every page of `path` as an image, in document order.
pub async fn render_pages(
    path: &Path,
    kind: InputKind,
    max_pixels: u32,
    password: Option<&str>,
) -> Result<Vec<DynamicImage>, Pdf2AnkiError> {
    let path = path.to_path_buf();
    let password = password.map(str::to_string);

    tokio::task::spawn_blocking(move || match kind {
        InputKind::Image => load_image_blocking(&path, max_pixels).map(|img| vec![img]),
        InputKind::Pdf => render_pdf_blocking(&path, max_pixels, password.as_deref()),
    })
    .await
    .map_err(|e| Pdf2AnkiError::Internal(format!("Render task panicked: {e}")))?
}

/// Decode a PNG/JPEG file and cap its size.
fn load_image_blocking(path: &Path, max_pixels: u32) -> Result<DynamicImage, Pdf2AnkiError> {
    let decode_err = |detail: String| Pdf2AnkiError::Decode {
        path: path.to_path_buf(),
        detail,
    };

    let image = ImageReader::open(path)
        .map_err(|e| decode_err(e.to_string()))?
        .with_guessed_format()
        .map_err(|e| decode_err(e.to_string()))?
        .decode()
        .map_err(|e| decode_err(e.to_string()))?;

    debug!(
        "Decoded image {} → {}x{} px",
        path.display(),
        image.width(),
        image.height()
    );
    Ok(cap_dimensions(image, max_pixels))
}

/// Shrink `image` so neither edge exceeds `max_pixels`. Never enlarges.
pub fn cap_dimensions(image: DynamicImage, max_pixels: u32) -> DynamicImage {
    if image.width() <= max_pixels && image.height() <= max_pixels {
        return image;
    }
    image.resize(max_pixels, max_pixels, FilterType::Triangle)
}

/// Bind pdfium from `PDFIUM_LIB_PATH` if set, else from the system library path.
fn bind_pdfium() -> Result<Pdfium, Pdf2AnkiError> {
    let bindings = match std::env::var("PDFIUM_LIB_PATH") {
        Ok(dir) if !dir.is_empty() => {
            Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(&dir))
        }
        _ => Pdfium::bind_to_system_library(),
    }
    .map_err(|e| Pdf2AnkiError::PdfiumBindingFailed(format!("{e:?}")))?;
    Ok(Pdfium::new(bindings))
}

/// Blocking implementation of PDF page rendering.
fn render_pdf_blocking(
    path: &Path,
    max_pixels: u32,
    password: Option<&str>,
) -> Result<Vec<DynamicImage>, Pdf2AnkiError> {
    let pdfium = bind_pdfium()?;

    let document = pdfium
        .load_pdf_from_file(path, password)
        .map_err(|e| Pdf2AnkiError::Decode {
            path: path.to_path_buf(),
            detail: format!("{e:?}"),
        })?;

    let pages = document.pages();
    let total_pages = pages.len() as usize;
    if total_pages == 0 {
        return Err(Pdf2AnkiError::NoPages {
            path: path.to_path_buf(),
        });
    }
    info!("PDF loaded: {} pages", total_pages);

    let render_config = PdfRenderConfig::new()
        .set_target_width(max_pixels as i32)
        .set_maximum_height(max_pixels as i32);

    let mut images = Vec::with_capacity(total_pages);
    for (idx, page) in pages.iter().enumerate() {
        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| Pdf2AnkiError::Decode {
                path: path.to_path_buf(),
                detail: format!("page {}: {e:?}", idx + 1),
            })?;

        let image = bitmap.as_image();
        debug!(
            "Rendered page {} → {}x{} px",
            idx + 1,
            image.width(),
            image.height()
        );
        images.push(image);
    }

    Ok(images)
}
