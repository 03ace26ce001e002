use super::error::from_multipart;
use super::AppState;
use crate::convert::convert_upload;
use crate::error::Pdf2AnkiError;
use crate::pipeline::input::{allowed_file, secure_filename};
use crate::pipeline::parse::Card;
use crate::progress::{ProgressHandle, ProgressRegistry};
use axum::body::Bytes;
use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, Path, State};
use axum::http::header;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use futures::Stream;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::StreamExt;
use tracing::info;

const INDEX_HTML: &str = include_str!("../../assets/index.html");

pub(super) async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

#[derive(Debug, Serialize)]
pub(super) struct UploadResponse {
    success: bool,
    filename: String,
    cards: Vec<Card>,
    job: String,
    dropped: usize,
}

/// Marks the job finished however the request ends, including when the
/// client disconnects and the handler future is dropped.
struct FinishOnDrop {
    registry: Arc<ProgressRegistry>,
    id: String,
}

impl Drop for FinishOnDrop {
    fn drop(&mut self) {
        self.registry.finish_job(&self.id);
    }
}

pub(super) async fn upload(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, Pdf2AnkiError> {
    let limit = state.server.max_upload_bytes;
    let mut multipart = multipart.map_err(|e| Pdf2AnkiError::BadRequest(e.body_text()))?;

    let mut file: Option<(String, Bytes)> = None;
    let mut requested_job: Option<String> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| from_multipart(e, limit))?
    {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("file") => {
                let filename = field.file_name().unwrap_or_default().to_owned();
                let bytes = field.bytes().await.map_err(|e| from_multipart(e, limit))?;
                file = Some((filename, bytes));
            }
            Some("job") => {
                let text = field.text().await.map_err(|e| from_multipart(e, limit))?;
                let text = text.trim();
                if !text.is_empty() {
                    requested_job = Some(text.to_owned());
                }
            }
            _ => {}
        }
    }

    let (filename, bytes) = file.ok_or(Pdf2AnkiError::MissingFile)?;
    if filename.is_empty() {
        return Err(Pdf2AnkiError::EmptyUpload);
    }
    if !allowed_file(&filename) {
        return Err(Pdf2AnkiError::UnsupportedFile { filename });
    }

    let job = state.registry.start_job(requested_job.as_deref())?;
    let _finish = FinishOnDrop {
        registry: Arc::clone(&state.registry),
        id: job.id().to_owned(),
    };
    info!(job = %job.id(), "Upload '{}' ({} bytes)", filename, bytes.len());

    let output = convert_upload(
        &filename,
        &bytes,
        state.extractor.as_ref(),
        &state.conversion,
        &state.server.output_dir,
        &job,
    )
    .await?;

    Ok(Json(UploadResponse {
        success: true,
        filename: output.deck.filename,
        cards: output.cards,
        job: job.id().to_owned(),
        dropped: output.dropped,
    }))
}

pub(super) async fn download(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Response, Pdf2AnkiError> {
    let safe = secure_filename(&filename);
    if safe.is_empty() || !safe.ends_with(".apkg") {
        return Err(Pdf2AnkiError::NotFound { name: filename });
    }

    let path = state.server.output_dir.join(&safe);
    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(Pdf2AnkiError::NotFound { name: safe });
        }
        Err(e) => {
            return Err(Pdf2AnkiError::Internal(format!(
                "reading '{}': {e}",
                path.display()
            )))
        }
    };

    let headers = [
        (header::CONTENT_TYPE, "application/octet-stream".to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{safe}\""),
        ),
    ];
    Ok((headers, bytes).into_response())
}

pub(super) async fn progress(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    sse(state.registry.global(), state.server.progress_interval)
}

pub(super) async fn progress_job(
    State(state): State<AppState>,
    Path(job): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, Pdf2AnkiError> {
    let handle = state
        .registry
        .job(&job)
        .ok_or(Pdf2AnkiError::NotFound { name: job })?;
    Ok(sse(&handle, state.server.progress_interval))
}

fn sse(
    handle: &ProgressHandle,
    every: Duration,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let events = handle
        .snapshots(every)
        .map(|snapshot| Event::default().json_data(snapshot));
    Sse::new(events).keep_alive(KeepAlive::default())
}
