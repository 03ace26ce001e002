//! Error types for the pdf2anki library.
//!
//! Every failure in the upload → deck pipeline is a [`Pdf2AnkiError`]. The
//! variants fall into a handful of classes that the HTTP layer maps onto
//! status codes:
//!
//! * **Request** — the upload itself is unusable (missing part, wrong
//!   extension, too large).
//! * **Decode** — the file was accepted but cannot be turned into page
//!   images (corrupt image, broken PDF, zero pages).
//! * **Upstream** — the vision model could not be reached or refused.
//! * **MalformedResponse** — the model answered, but nothing resembling a
//!   JSON array came back.
//! * **Packaging** — the `.apkg` could not be written.
//!
//! Dropping a few malformed cards is *not* an error; see
//! [`crate::pipeline::parse::ParseReport`].

use std::path::{Path, PathBuf};
use thiserror::Error;

/// All errors returned by the pdf2anki library.
#[derive(Debug, Error)]
pub enum Pdf2AnkiError {
    // ── Request errors ────────────────────────────────────────────────────
    /// The multipart form had no `file` part.
    #[error("No file part")]
    MissingFile,

    /// A `file` part was sent without a filename.
    #[error("No selected file")]
    EmptyUpload,

    /// The extension is not one of png, jpg, jpeg, pdf.
    #[error("File type not allowed: '{filename}'")]
    UnsupportedFile { filename: String },

    /// The request body exceeded the configured upload ceiling.
    #[error("Upload exceeds the {limit_bytes} byte limit")]
    UploadTooLarge { limit_bytes: usize },

    /// Malformed request other than the cases above.
    #[error("Bad request: {0}")]
    BadRequest(String),

    // ── Decode errors ─────────────────────────────────────────────────────
    /// The image or page could not be decoded.
    #[error("Could not decode '{path}': {detail}")]
    Decode { path: PathBuf, detail: String },

    /// The file has an image extension but not an image signature.
    #[error("File is not a PNG or JPEG image: '{path}'\nFirst bytes: {magic:?}")]
    NotAnImage { path: PathBuf, magic: [u8; 4] },

    /// The file has a .pdf extension but not the `%PDF` signature.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    /// The PDF opened but has no pages.
    #[error("PDF '{path}' has no pages")]
    NoPages { path: PathBuf },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH to the directory containing libpdfium, or install it system-wide."
    )]
    PdfiumBindingFailed(String),

    // ── Model errors ──────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The model call itself failed (network, auth, quota).
    #[error("LLM API error: {message}")]
    Upstream { message: String },

    /// The model reply contained no salvageable JSON array.
    #[error("Model response contained no JSON array: {reason}")]
    MalformedResponse { reason: String },

    /// Parsing succeeded but no valid front/back pair survived.
    #[error("No valid flashcards found in the model response ({dropped} of {candidates} entries dropped)")]
    NoCards { candidates: usize, dropped: usize },

    // ── Output errors ─────────────────────────────────────────────────────
    /// The deck package could not be assembled or delivered.
    #[error("Failed to write deck '{path}': {detail}")]
    Packaging { path: PathBuf, detail: String },

    /// A requested deck file does not exist.
    #[error("File not found: '{name}'")]
    NotFound { name: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Pdf2AnkiError {
    /// HTTP status code used when this error reaches the request boundary.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::MissingFile
            | Self::EmptyUpload
            | Self::UnsupportedFile { .. }
            | Self::BadRequest(_) => 400,
            Self::UploadTooLarge { .. } => 413,
            Self::NotFound { .. } => 404,
            Self::Decode { .. }
            | Self::NotAnImage { .. }
            | Self::NotAPdf { .. }
            | Self::NoPages { .. }
            | Self::NoCards { .. } => 422,
            Self::Upstream { .. } | Self::MalformedResponse { .. } => 502,
            Self::PdfiumBindingFailed(_)
            | Self::ProviderNotConfigured { .. }
            | Self::Packaging { .. }
            | Self::InvalidConfig(_)
            | Self::Internal(_) => 500,
        }
    }

    /// Stable machine-readable code for JSON error payloads.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingFile | Self::EmptyUpload | Self::BadRequest(_) => "BAD_REQUEST",
            Self::UnsupportedFile { .. } => "UNSUPPORTED_FILE",
            Self::UploadTooLarge { .. } => "UPLOAD_TOO_LARGE",
            Self::Decode { .. }
            | Self::NotAnImage { .. }
            | Self::NotAPdf { .. }
            | Self::NoPages { .. }
            | Self::PdfiumBindingFailed(_) => "DECODE_ERROR",
            Self::ProviderNotConfigured { .. } | Self::Upstream { .. } => "UPSTREAM_ERROR",
            Self::MalformedResponse { .. } => "MALFORMED_RESPONSE",
            Self::NoCards { .. } => "NO_CARDS",
            Self::Packaging { .. } => "PACKAGING_ERROR",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::InvalidConfig(_) | Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Message for HTTP clients. Server-side paths are reduced to their file
    /// name; the full [`Display`](std::fmt::Display) form goes to the log.
    pub fn client_message(&self) -> String {
        match self {
            Self::Decode { path, detail } => {
                format!("Could not decode '{}': {detail}", file_name(path))
            }
            Self::NotAnImage { path, .. } => {
                format!("File is not a PNG or JPEG image: '{}'", file_name(path))
            }
            Self::NotAPdf { path, .. } => format!("File is not a valid PDF: '{}'", file_name(path)),
            Self::NoPages { path } => format!("PDF '{}' has no pages", file_name(path)),
            Self::Packaging { path, .. } => format!("Failed to write deck '{}'", file_name(path)),
            other => other.to_string(),
        }
    }

    pub(crate) fn packaging(path: impl Into<PathBuf>, detail: impl std::fmt::Display) -> Self {
        Self::Packaging {
            path: path.into(),
            detail: detail.to_string(),
        }
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
