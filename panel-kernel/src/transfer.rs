//! Upload and download handlers
//!
//! Both directions stream: multipart fields are copied to disk chunk by
//! chunk, downloads are served with `ReaderStream`.

use crate::error::ApiError;
use crate::http::{AppState, PathQuery};
use axum::body::Body;
use axum::extract::{Multipart, Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::TryStreamExt;
use panel_core::{Console, ConsoleError, UploadReport};
use std::io;
use std::pin::pin;
use tokio_util::io::{ReaderStream, StreamReader};
use tracing::info;

/// Multipart field carrying the uploaded files
const FILE_FIELD: &str = "file";

// POST /api/upload?path=
pub async fn upload(
    State(app): State<AppState>,
    Query(q): Query<PathQuery>,
    mut multipart: Multipart,
) -> Result<Json<UploadReport>, ApiError> {
    let cfg = app.snapshot();
    let mut session = Console::new(&cfg, &app.probe).begin_upload(q.path()).await?;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.body_text()))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let mut reader = pin!(StreamReader::new(field.map_err(io::Error::other)));
        session.receive(&filename, &mut reader).await;
    }

    let report = session.finish();
    info!(
        "Upload into {:?}: {}/{} stored",
        report.directory,
        report.stored(),
        report.outcomes.len()
    );
    Ok(Json(report))
}

// GET /api/download?path=
pub async fn download(
    State(app): State<AppState>,
    Query(q): Query<PathQuery>,
) -> Result<Response, ApiError> {
    let cfg = app.snapshot();
    let (path, name) = Console::new(&cfg, &app.probe)
        .download_target(q.path())
        .await?;

    let file = tokio::fs::File::open(&path)
        .await
        .map_err(|e| ConsoleError::io(q.path(), e))?;
    let size = file
        .metadata()
        .await
        .map_err(|e| ConsoleError::io(q.path(), e))?
        .len();

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(size));
    headers.insert(header::CONTENT_DISPOSITION, attachment(&name));

    info!(path = q.path(), size, "download");
    Ok((StatusCode::OK, headers, Body::from_stream(ReaderStream::new(file))).into_response())
}

/// `attachment; filename="..."` restricted to printable ASCII
fn attachment(name: &str) -> HeaderValue {
    let safe: String = name
        .chars()
        .filter(|c| (c.is_ascii_graphic() || *c == ' ') && *c != '"' && *c != '\\')
        .collect();
    let safe = if safe.trim().is_empty() { "download".to_string() } else { safe };
    HeaderValue::from_str(&format!("attachment; filename=\"{safe}\""))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}
