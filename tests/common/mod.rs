//! Helpers shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use image::{Rgb, RgbImage};
use pdf2anki::pipeline::encode::EncodedImage;
use pdf2anki::{CardExtractor, Pdf2AnkiError};
use sqlx::{Connection, Row, SqliteConnection};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// A model reply with three usable cards and one unusable entry.
pub const MIXED_REPLY: &str = r#"Sure! Here are your flashcards:
[
  {"front": "Which is prime?\nA. 4\nB. 7", "back": "B. 7"},
  {"front": "Solve 3 < x > 1", "back": "x = 2"},
  {"front": "", "back": "orphan answer"},
  {"front": "Capital of France?", "back": "Paris"}
]
Let me know if you need more."#;

/// Route library logs through the test harness; `RUST_LOG` picks the level.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// [`CardExtractor`] returning a canned reply and recording what it saw.
pub struct StubExtractor {
    reply: Result<String, String>,
    calls: AtomicUsize,
    pages_seen: Mutex<Vec<usize>>,
}

impl StubExtractor {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: Ok(reply.to_string()),
            calls: AtomicUsize::new(0),
            pages_seen: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            reply: Err(message.to_string()),
            calls: AtomicUsize::new(0),
            pages_seen: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn pages_seen(&self) -> Vec<usize> {
        self.pages_seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl CardExtractor for StubExtractor {
    async fn extract(&self, images: &[EncodedImage]) -> Result<String, Pdf2AnkiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.pages_seen
            .lock()
            .unwrap()
            .extend(images.iter().map(|img| img.page));
        self.reply.clone().map_err(|message| Pdf2AnkiError::Upstream { message })
    }
}

/// A small synthetic "scan": light background with a few dark bars.
pub fn quiz_image(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        if y % 12 < 3 && x > width / 10 && x < width * 9 / 10 {
            Rgb([20, 20, 20])
        } else {
            Rgb([245, 245, 240])
        }
    })
}

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    quiz_image(width, height)
        .write_to(&mut out, image::ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

pub fn write_png(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, png_bytes(width, height)).unwrap();
    path
}

/// Entry names inside an `.apkg`.
pub fn package_entries(apkg: &Path) -> Vec<String> {
    let file = std::fs::File::open(apkg).unwrap();
    let archive = zip::ZipArchive::new(file).unwrap();
    archive.file_names().map(str::to_string).collect()
}

/// `(question, answer)` for every note in the package, in card order.
pub async fn read_notes(apkg: &Path) -> Vec<(String, String)> {
    let scratch = tempfile::tempdir().unwrap();
    let db_path = scratch.path().join("collection.anki2");
    {
        let file = std::fs::File::open(apkg).unwrap();
        let mut archive = zip::ZipArchive::new(file).unwrap();
        let mut entry = archive.by_name("collection.anki2").unwrap();
        let mut out = std::fs::File::create(&db_path).unwrap();
        std::io::copy(&mut entry, &mut out).unwrap();
    }

    let url = format!("sqlite://{}", db_path.display());
    let mut conn = SqliteConnection::connect(&url).await.unwrap();
    let rows = sqlx::query(
        "SELECT n.flds FROM cards c JOIN notes n ON n.id = c.nid ORDER BY c.due, c.id",
    )
    .fetch_all(&mut conn)
    .await
    .unwrap();
    conn.close().await.unwrap();

    rows.iter()
        .map(|row| {
            let flds: String = row.get("flds");
            let (q, a) = flds.split_once('\u{1f}').unwrap();
            (q.to_string(), a.to_string())
        })
        .collect()
}
