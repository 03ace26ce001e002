use crate::error::Pdf2AnkiError;
use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::{error, warn};

impl IntoResponse for Pdf2AnkiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            error!("{}", self);
        } else {
            warn!("{}", self);
        }
        let body = json!({ "error": self.client_message(), "code": self.code() });
        (status, Json(body)).into_response()
    }
}

/// Map a multipart read failure, recognising the body-limit case.
pub(super) fn from_multipart(err: MultipartError, limit_bytes: usize) -> Pdf2AnkiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        Pdf2AnkiError::UploadTooLarge { limit_bytes }
    } else {
        Pdf2AnkiError::BadRequest(err.body_text())
    }
}
