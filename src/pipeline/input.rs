//! Input resolution: classify an upload and land it on disk.
//!
//! Uploads arrive as bytes plus a client-supplied filename. Both are
//! untrusted: the filename is sanitised before it is used for anything, the
//! extension decides between the image and PDF paths, and the leading bytes
//! must agree with that extension before any decoder sees the file.
//!
//! Uploaded bytes are written into a per-request [`TempDir`]; the directory
//! lives inside [`ResolvedInput`] and is removed when that value is dropped,
//! on success and failure alike.

use crate::error::Pdf2AnkiError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::io::Read;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::debug;
use unicode_normalization::UnicodeNormalization;

/// Extensions accepted by the upload endpoint.
pub const ALLOWED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "pdf"];

/// Deck name used when sanitising leaves nothing behind.
pub const FALLBACK_DECK_NAME: &str = "flashcards";

/// What kind of document an input is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    /// A single raster image (PNG or JPEG).
    Image,
    /// A paginated PDF document.
    Pdf,
}

impl InputKind {
    /// Classify by the last dot-separated suffix, case-insensitively.
    pub fn from_filename(filename: &str) -> Option<Self> {
        let (_, ext) = filename.rsplit_once('.')?;
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "png" | "jpg" | "jpeg" => Some(Self::Image),
            _ => None,
        }
    }
}

/// Whether the upload endpoint accepts this filename.
pub fn allowed_file(filename: &str) -> bool {
    InputKind::from_filename(filename).is_some()
}

static RE_UNSAFE_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Za-z0-9_.-]").unwrap());

/// Reduce a client-supplied filename to something safe to join onto a path.
///
/// Non-ASCII characters are folded (NFKD) or dropped, path separators become
/// spaces, whitespace runs become `_`, anything outside `[A-Za-z0-9_.-]` is
/// removed, and leading/trailing dots and underscores are stripped. The
/// result can be empty; callers must check.
pub fn secure_filename(name: &str) -> String {
    let ascii: String = name.nfkd().filter(char::is_ascii).collect();
    let spaced = ascii.replace(['/', '\\'], " ");
    let joined = spaced.split_whitespace().collect::<Vec<_>>().join("_");
    RE_UNSAFE_CHARS
        .replace_all(&joined, "")
        .trim_matches(|c| c == '.' || c == '_')
        .to_string()
}

/// Deck name for an upload: the sanitised file stem.
///
/// The extension is split off before sanitising, so a stem made only of
/// characters that sanitise away falls back to [`FALLBACK_DECK_NAME`]
/// instead of becoming the extension.
pub fn deck_name_for(filename: &str) -> String {
    let stem = match filename.rsplit_once('.') {
        Some((stem, _)) => stem,
        None => filename,
    };
    let safe = secure_filename(stem);
    if safe.is_empty() {
        FALLBACK_DECK_NAME.to_string()
    } else {
        safe
    }
}

/// On-disk name for an upload: sanitised stem plus the lowercased extension.
///
/// The kind is taken from the client's name, so `漢字.png` stages as
/// `flashcards.png` rather than being rejected.
pub fn upload_name(filename: &str) -> Result<(String, InputKind), Pdf2AnkiError> {
    if filename.is_empty() {
        return Err(Pdf2AnkiError::EmptyUpload);
    }
    let kind = InputKind::from_filename(filename).ok_or_else(|| Pdf2AnkiError::UnsupportedFile {
        filename: secure_filename(filename),
    })?;
    let ext = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    Ok((format!("{}.{ext}", deck_name_for(filename)), kind))
}

/// An input file ready for the normalizer.
pub enum ResolvedInput {
    /// A file that already existed on disk (CLI use).
    Local { path: PathBuf, kind: InputKind },
    /// Uploaded bytes written to a temporary directory. The `TempDir` is
    /// kept alive until processing completes.
    Uploaded {
        path: PathBuf,
        kind: InputKind,
        _temp_dir: TempDir,
    },
}

impl ResolvedInput {
    /// Path to the file regardless of how it was resolved.
    pub fn path(&self) -> &Path {
        match self {
            ResolvedInput::Local { path, .. } => path,
            ResolvedInput::Uploaded { path, .. } => path,
        }
    }

    pub fn kind(&self) -> InputKind {
        match self {
            ResolvedInput::Local { kind, .. } | ResolvedInput::Uploaded { kind, .. } => *kind,
        }
    }
}

/// Validate a local file: known extension, readable, matching signature.
pub fn resolve_local(path: &Path) -> Result<ResolvedInput, Pdf2AnkiError> {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
    let kind = InputKind::from_filename(name).ok_or_else(|| Pdf2AnkiError::UnsupportedFile {
        filename: name.to_string(),
    })?;
    if !path.is_file() {
        return Err(Pdf2AnkiError::NotFound {
            name: path.display().to_string(),
        });
    }
    verify_magic(path, kind)?;
    debug!("Resolved local input: {}", path.display());
    Ok(ResolvedInput::Local {
        path: path.to_path_buf(),
        kind,
    })
}

/// Write uploaded bytes to a fresh temporary directory.
///
/// `filename` must already be sanitised; an empty name or a disallowed
/// extension is rejected before anything touches the disk.
pub async fn stage_upload(filename: &str, bytes: &[u8]) -> Result<ResolvedInput, Pdf2AnkiError> {
    if filename.is_empty() {
        return Err(Pdf2AnkiError::EmptyUpload);
    }
    let kind = InputKind::from_filename(filename).ok_or_else(|| Pdf2AnkiError::UnsupportedFile {
        filename: filename.to_string(),
    })?;

    let temp_dir = tempfile::Builder::new()
        .prefix("pdf2anki-upload-")
        .tempdir()
        .map_err(|e| Pdf2AnkiError::Internal(format!("tempdir: {e}")))?;
    let path = temp_dir.path().join(filename);
    tokio::fs::write(&path, bytes)
        .await
        .map_err(|e| Pdf2AnkiError::Internal(format!("Failed to write upload: {e}")))?;

    verify_magic(&path, kind)?;
    debug!("Staged upload {} ({} bytes)", path.display(), bytes.len());

    Ok(ResolvedInput::Uploaded {
        path,
        kind,
        _temp_dir: temp_dir,
    })
}

/// Check the leading bytes agree with the declared kind.
pub fn verify_magic(path: &Path, kind: InputKind) -> Result<(), Pdf2AnkiError> {
    let mut file = std::fs::File::open(path).map_err(|e| Pdf2AnkiError::Decode {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;
    let mut magic = [0u8; 4];
    if file.read_exact(&mut magic).is_err() {
        return Err(Pdf2AnkiError::Decode {
            path: path.to_path_buf(),
            detail: "file is empty or truncated".into(),
        });
    }

    match kind {
        InputKind::Pdf if &magic != b"%PDF" => Err(Pdf2AnkiError::NotAPdf {
            path: path.to_path_buf(),
            magic,
        }),
        InputKind::Image if !is_png(&magic) && !is_jpeg(&magic) => Err(Pdf2AnkiError::NotAnImage {
            path: path.to_path_buf(),
            magic,
        }),
        _ => Ok(()),
    }
}

fn is_png(magic: &[u8; 4]) -> bool {
    magic == b"\x89PNG"
}

fn is_jpeg(magic: &[u8; 4]) -> bool {
    magic[..3] == [0xFF, 0xD8, 0xFF]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_by_last_extension() {
        assert_eq!(InputKind::from_filename("quiz.PDF"), Some(InputKind::Pdf));
        assert_eq!(InputKind::from_filename("scan.jpeg"), Some(InputKind::Image));
        assert_eq!(InputKind::from_filename("scan.Jpg"), Some(InputKind::Image));
        assert_eq!(InputKind::from_filename("archive.pdf.zip"), None);
        assert_eq!(InputKind::from_filename("pdf"), None);
        assert!(!allowed_file("notes.docx"));
        assert!(allowed_file("notes.png"));
    }

    #[test]
    fn secure_filename_strips_paths_and_unicode() {
        assert_eq!(secure_filename("My cool movie.mov"), "My_cool_movie.mov");
        assert_eq!(secure_filename("../../../etc/passwd"), "etc_passwd");
        assert_eq!(secure_filename("i contain cool \u{fc}ml\u{e4}uts.txt"), "i_contain_cool_umlauts.txt");
        assert_eq!(secure_filename("..\\quiz 1.pdf"), "quiz_1.pdf");
        assert_eq!(secure_filename("\u{6f22}\u{5b57}"), "");
    }

    #[test]
    fn deck_name_is_sanitised_stem() {
        assert_eq!(deck_name_for("Biology Midterm.pdf"), "Biology_Midterm");
        assert_eq!(deck_name_for("../x.png"), "x");
        assert_eq!(deck_name_for("\u{6f22}.pdf"), FALLBACK_DECK_NAME);
        assert_eq!(deck_name_for("...."), FALLBACK_DECK_NAME);
        assert_eq!(deck_name_for("no extension"), "no_extension");
    }

    #[test]
    fn upload_name_keeps_kind_of_non_ascii_names() {
        assert_eq!(
            upload_name("\u{6f22}\u{5b57}.png").unwrap(),
            ("flashcards.png".to_string(), InputKind::Image)
        );
        assert_eq!(
            upload_name("Week 2 Quiz.PDF").unwrap(),
            ("Week_2_Quiz.pdf".to_string(), InputKind::Pdf)
        );
        assert_eq!(
            upload_name("../../etc/quiz.jpg").unwrap().0,
            "etc_quiz.jpg"
        );
        assert!(matches!(upload_name(""), Err(Pdf2AnkiError::EmptyUpload)));
        assert!(matches!(
            upload_name("notes.docx"),
            Err(Pdf2AnkiError::UnsupportedFile { .. })
        ));
    }

    #[test]
    fn magic_mismatch_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let fake_pdf = dir.path().join("fake.pdf");
        std::fs::write(&fake_pdf, b"PK\x03\x04rest").unwrap();
        assert!(matches!(
            verify_magic(&fake_pdf, InputKind::Pdf),
            Err(Pdf2AnkiError::NotAPdf { .. })
        ));

        let fake_png = dir.path().join("fake.png");
        std::fs::write(&fake_png, b"%PDF-1.7").unwrap();
        assert!(matches!(
            verify_magic(&fake_png, InputKind::Image),
            Err(Pdf2AnkiError::NotAnImage { .. })
        ));

        let empty = dir.path().join("empty.png");
        std::fs::write(&empty, b"").unwrap();
        assert!(matches!(
            verify_magic(&empty, InputKind::Image),
            Err(Pdf2AnkiError::Decode { .. })
        ));
    }

    #[tokio::test]
    async fn staged_upload_is_removed_on_drop() {
        let jpeg_header = [0xFF, 0xD8, 0xFF, 0xE0, 0, 0x10];
        let resolved = stage_upload("photo.jpg", &jpeg_header).await.unwrap();
        let path = resolved.path().to_path_buf();
        assert!(path.exists());
        assert_eq!(resolved.kind(), InputKind::Image);
        drop(resolved);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn stage_upload_rejects_before_writing() {
        assert!(matches!(
            stage_upload("", b"x").await,
            Err(Pdf2AnkiError::EmptyUpload)
        ));
        assert!(matches!(
            stage_upload("notes.txt", b"x").await,
            Err(Pdf2AnkiError::UnsupportedFile { .. })
        ));
    }
}
