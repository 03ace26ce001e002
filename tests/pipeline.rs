//! Offline pipeline tests: a stub extractor stands in for the vision model,
//! everything else (decode, JPEG encode, parse, SQLite, zip) is real.

mod common;

use common::{package_entries, read_notes, write_png, StubExtractor, MIXED_REPLY};
use pdf2anki::pipeline::input::{InputKind, ResolvedInput};
use pdf2anki::pipeline::normalize::normalize;
use pdf2anki::{
    convert_file, convert_upload, ConversionConfig, NoopProgress, Pdf2AnkiError, ProgressHandle,
    ProgressSink,
};
use pdfium_render::prelude::{PdfPagePaperSize, Pdfium};
use std::sync::Mutex;

/// Records every update in order.
#[derive(Default)]
struct Recorder(Mutex<Vec<(String, u8)>>);

impl ProgressSink for Recorder {
    fn report(&self, status: &str, progress: u8) {
        self.0.lock().unwrap().push((status.to_string(), progress));
    }
}

fn seeded_config() -> ConversionConfig {
    ConversionConfig::builder().id_seed(7).build().unwrap()
}

#[tokio::test]
async fn image_becomes_deck_with_valid_cards_in_order() {
    common::init_tracing();
    let input_dir = tempfile::tempdir().unwrap();
    let out_dir = tempfile::tempdir().unwrap();
    let png = write_png(input_dir.path(), "Chapter 4 Quiz.png", 320, 240);
    let stub = StubExtractor::replying(MIXED_REPLY);

    let output = convert_file(&png, &stub, &seeded_config(), out_dir.path(), &NoopProgress)
        .await
        .unwrap();

    assert_eq!(stub.calls(), 1);
    assert_eq!(stub.pages_seen(), vec![1]);
    assert_eq!(output.pages, 1);
    assert_eq!(output.candidates, 4);
    assert_eq!(output.dropped, 1);
    assert_eq!(output.cards.len(), 3);
    assert_eq!(output.deck.filename, "Chapter_4_Quiz.apkg");
    assert_eq!(output.deck.note_count, 3);

    let delivered = std::fs::metadata(&output.deck.path).unwrap().len();
    assert_eq!(delivered, output.deck.staged_len);

    let mut entries = package_entries(&output.deck.path);
    entries.sort();
    assert_eq!(entries, vec!["collection.anki2", "media"]);

    let notes = read_notes(&output.deck.path).await;
    assert_eq!(
        notes,
        vec![
            ("Which is prime?<br>A. 4<br>B. 7".to_string(), "B. 7".to_string()),
            ("Solve 3 &lt; x &gt; 1".to_string(), "x = 2".to_string()),
            ("Capital of France?".to_string(), "Paris".to_string()),
        ]
    );
}

#[tokio::test]
async fn image_upload_reports_every_stage_in_order() {
    let out_dir = tempfile::tempdir().unwrap();
    let stub = StubExtractor::replying(MIXED_REPLY);
    let recorder = Recorder::default();

    convert_upload(
        "scan.png",
        &common::png_bytes(200, 100),
        &stub,
        &seeded_config(),
        out_dir.path(),
        &recorder,
    )
    .await
    .unwrap();

    let updates = recorder.0.into_inner().unwrap();
    let statuses: Vec<&str> = updates.iter().map(|(s, _)| s.as_str()).collect();
    assert_eq!(
        statuses,
        vec![
            "Starting...",
            "File uploaded...",
            "Processing image...",
            "Analyzing image with AI...",
            "Generating flashcards...",
            "Processing flashcards...",
            "Finalizing flashcards...",
            "Creating Anki deck...",
            "Done!",
        ]
    );
    assert!(updates.windows(2).all(|w| w[0].1 <= w[1].1));
    assert_eq!(updates.last().unwrap().1, 100);
}

#[tokio::test]
async fn progress_handle_ends_on_done() {
    let out_dir = tempfile::tempdir().unwrap();
    let stub = StubExtractor::replying(r#"[{"front": "Q", "back": "A"}]"#);
    let handle = ProgressHandle::new();

    convert_upload(
        "one.png",
        &common::png_bytes(50, 50),
        &stub,
        &seeded_config(),
        out_dir.path(),
        &handle,
    )
    .await
    .unwrap();

    let snapshot = handle.snapshot();
    assert_eq!(snapshot.status, "Done!");
    assert_eq!(snapshot.progress, 100);
}

#[tokio::test]
async fn reply_without_valid_cards_fails_and_writes_nothing() {
    let input_dir = tempfile::tempdir().unwrap();
    let out_dir = tempfile::tempdir().unwrap();
    let png = write_png(input_dir.path(), "empty.png", 64, 64);
    let stub = StubExtractor::replying(r#"[{"front": "", "back": "x"}, {"question": "Q"}]"#);

    let err = convert_file(&png, &stub, &seeded_config(), out_dir.path(), &NoopProgress)
        .await
        .unwrap_err();

    match err {
        Pdf2AnkiError::NoCards { candidates, dropped } => {
            assert_eq!(candidates, 2);
            assert_eq!(dropped, 2);
        }
        other => panic!("expected NoCards, got {other:?}"),
    }
    assert_eq!(std::fs::read_dir(out_dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn unquoted_keys_are_a_no_cards_failure() {
    let input_dir = tempfile::tempdir().unwrap();
    let out_dir = tempfile::tempdir().unwrap();
    let png = write_png(input_dir.path(), "q.png", 64, 64);
    let stub = StubExtractor::replying(r#"[{front: "Q", back: "A"}]"#);

    let err = convert_file(&png, &stub, &seeded_config(), out_dir.path(), &NoopProgress)
        .await
        .unwrap_err();
    assert!(matches!(err, Pdf2AnkiError::NoCards { .. }), "{err:?}");
    assert_eq!(err.status_code(), 422);
}

#[tokio::test]
async fn reply_without_array_is_malformed() {
    let input_dir = tempfile::tempdir().unwrap();
    let out_dir = tempfile::tempdir().unwrap();
    let png = write_png(input_dir.path(), "q.png", 64, 64);
    let stub = StubExtractor::replying("I could not read this image, sorry.");

    let err = convert_file(&png, &stub, &seeded_config(), out_dir.path(), &NoopProgress)
        .await
        .unwrap_err();
    assert!(matches!(err, Pdf2AnkiError::MalformedResponse { .. }), "{err:?}");
    assert_eq!(err.status_code(), 502);
}

#[tokio::test]
async fn upstream_failure_propagates() {
    let input_dir = tempfile::tempdir().unwrap();
    let out_dir = tempfile::tempdir().unwrap();
    let png = write_png(input_dir.path(), "q.png", 64, 64);
    let stub = StubExtractor::failing("quota exceeded");

    let err = convert_file(&png, &stub, &seeded_config(), out_dir.path(), &NoopProgress)
        .await
        .unwrap_err();
    assert!(matches!(err, Pdf2AnkiError::Upstream { .. }));
    assert!(err.to_string().contains("quota exceeded"));
}

#[tokio::test]
async fn disallowed_or_mislabelled_uploads_never_reach_the_model() {
    let out_dir = tempfile::tempdir().unwrap();
    let stub = StubExtractor::replying(MIXED_REPLY);
    let png = common::png_bytes(32, 32);
    let config = seeded_config();

    let err = convert_upload("notes.txt", &png, &stub, &config, out_dir.path(), &NoopProgress)
        .await
        .unwrap_err();
    assert!(matches!(err, Pdf2AnkiError::UnsupportedFile { .. }));

    let err = convert_upload("quiz.pdf", &png, &stub, &config, out_dir.path(), &NoopProgress)
        .await
        .unwrap_err();
    assert!(matches!(err, Pdf2AnkiError::NotAPdf { .. }), "{err:?}");

    let err = convert_upload("photo.jpg", b"not an image at all", &stub, &config, out_dir.path(), &NoopProgress)
        .await
        .unwrap_err();
    assert!(matches!(err, Pdf2AnkiError::NotAnImage { .. }), "{err:?}");

    assert_eq!(stub.calls(), 0);
}

#[tokio::test]
async fn normalizing_twice_gives_identical_pages() {
    let dir = tempfile::tempdir().unwrap();
    let png = write_png(dir.path(), "page.png", 640, 480);
    let input = ResolvedInput::Local {
        path: png.clone(),
        kind: InputKind::Image,
    };
    let config = ConversionConfig::default();

    let first = normalize(input.path(), input.kind(), &config, &NoopProgress)
        .await
        .unwrap();
    let second = normalize(input.path(), input.kind(), &config, &NoopProgress)
        .await
        .unwrap();

    assert_eq!(first.len(), 1);
    assert_eq!(first.len(), second.len());
    assert_eq!(first[0].len(), second[0].len());
    assert_eq!(first, second);
    assert_eq!(&first[0].bytes[..3], &[0xFF, 0xD8, 0xFF]);
}

#[tokio::test]
async fn oversized_images_are_capped_on_the_longest_edge() {
    let dir = tempfile::tempdir().unwrap();
    let png = write_png(dir.path(), "wide.png", 900, 300);
    let config = ConversionConfig::builder()
        .max_rendered_pixels(300)
        .build()
        .unwrap();

    let pages = normalize(&png, InputKind::Image, &config, &NoopProgress)
        .await
        .unwrap();
    let decoded = image::load_from_memory(&pages[0].bytes).unwrap();
    assert_eq!(decoded.width(), 300);
    assert_eq!(decoded.height(), 100);
}

#[tokio::test]
async fn same_seed_replaces_deck_in_place() {
    let input_dir = tempfile::tempdir().unwrap();
    let out_dir = tempfile::tempdir().unwrap();
    let png = write_png(input_dir.path(), "repeat.png", 64, 64);
    let config = seeded_config();

    let first = convert_file(
        &png,
        &StubExtractor::replying(r#"[{"front": "Q1", "back": "A1"}]"#),
        &config,
        out_dir.path(),
        &NoopProgress,
    )
    .await
    .unwrap();
    let second = convert_file(
        &png,
        &StubExtractor::replying(r#"[{"front": "Q2", "back": "A2"}, {"front": "Q3", "back": "A3"}]"#),
        &config,
        out_dir.path(),
        &NoopProgress,
    )
    .await
    .unwrap();

    assert_eq!(first.deck.path, second.deck.path);
    assert_eq!(first.deck.ids, second.deck.ids);
    let notes = read_notes(&second.deck.path).await;
    assert_eq!(notes.len(), 2);
    assert_eq!(std::fs::read_dir(out_dir.path()).unwrap().count(), 1);
}

#[tokio::test]
async fn non_ascii_image_name_is_accepted_under_fallback_name() {
    let out_dir = tempfile::tempdir().unwrap();
    let stub = StubExtractor::replying(MIXED_REPLY);

    let output = convert_upload(
        "\u{6f22}\u{5b57}.png",
        &common::png_bytes(40, 40),
        &stub,
        &seeded_config(),
        out_dir.path(),
        &NoopProgress,
    )
    .await
    .unwrap();

    assert_eq!(stub.calls(), 1);
    assert_eq!(output.deck.filename, "flashcards.apkg");
    assert!(out_dir.path().join("flashcards.apkg").is_file());
}

fn assert_send<T: Send>(_: &T) {}

#[test]
fn upload_conversion_future_is_send() {
    let stub = StubExtractor::replying("[]");
    let config = ConversionConfig::default();
    let fut = convert_upload(
        "scan.png",
        b"",
        &stub,
        &config,
        std::path::Path::new("decks"),
        &NoopProgress,
    );
    assert_send(&fut);
}

/// Needs a pdfium build; skipped unless `PDFIUM_LIB_PATH` is set.
#[tokio::test]
async fn pdf_pages_render_in_document_order() {
    let lib_dir = match std::env::var("PDFIUM_LIB_PATH") {
        Ok(dir) if !dir.is_empty() => dir,
        _ => {
            println!("SKIP — set PDFIUM_LIB_PATH to run pdfium tests");
            return;
        }
    };
    let dir = tempfile::tempdir().unwrap();
    let pdf = dir.path().join("two-pages.pdf");
    {
        let bindings =
            Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(&lib_dir))
                .unwrap();
        let pdfium = Pdfium::new(bindings);
        let mut document = pdfium.create_new_pdf().unwrap();
        document
            .pages_mut()
            .create_page_at_end(PdfPagePaperSize::a4())
            .unwrap();
        document
            .pages_mut()
            .create_page_at_end(PdfPagePaperSize::a4().landscape())
            .unwrap();
        document.save_to_file(&pdf).unwrap();
    }

    let config = ConversionConfig::builder()
        .max_rendered_pixels(300)
        .build()
        .unwrap();
    let recorder = Recorder::default();
    let pages = normalize(&pdf, InputKind::Pdf, &config, &recorder)
        .await
        .unwrap();

    assert_eq!(pages.iter().map(|p| p.page).collect::<Vec<_>>(), vec![1, 2]);
    let portrait = image::load_from_memory(&pages[0].bytes).unwrap();
    let landscape = image::load_from_memory(&pages[1].bytes).unwrap();
    assert!(portrait.height() > portrait.width());
    assert!(landscape.width() > landscape.height());
    assert!(portrait.height() <= 300 && landscape.width() <= 300);

    assert_eq!(
        recorder.0.into_inner().unwrap(),
        vec![
            ("Converting PDF to images...".to_string(), 10),
            ("Preparing page 1/2...".to_string(), 25),
            ("Preparing page 2/2...".to_string(), 40),
        ]
    );
}
