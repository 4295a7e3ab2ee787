//! HTTP surface of the generator.
//!
//! - `POST /generate/docx` (and `/generate/docx/`): multipart `template` file
//!   plus `data` JSON text, answers with the rendered document
//! - `GET  /health`: `{"ok": true}`
//! - `GET  /`: liveness text
//!
//! Bad input is rejected with 400 before any archive is opened. Pipeline
//! failures are logged in full and answered with 500 and the top-level
//! message only.

use std::sync::Arc;

use anyhow::Context;
use axum::extract::multipart::Field;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::header::{self, HeaderName, HeaderValue};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::error::DocgenError;
use crate::transform;

pub const DOCX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const CONTENT_DISPOSITION: &str = "attachment; filename=\"generated.docx\"";
pub const LIVENESS_TEXT: &str = "emx-docgen API running";

type HandlerError = (StatusCode, String);

#[derive(Debug, Serialize)]
struct HealthResponse {
    ok: bool,
}

/// Build the application router
pub fn router(config: Arc<ServerConfig>) -> Router {
    let body_limit = config.body_limit();
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/generate/docx", post(generate))
        .route("/generate/docx/", post(generate))
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(config)
}

/// Bind and serve until Ctrl-C
pub async fn serve(config: ServerConfig) -> anyhow::Result<()> {
    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    info!(%addr, upload_limit = config.upload_limit, "emx-docgen listening");

    axum::serve(listener, router(Arc::new(config)))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("failed to listen for ctrl-c: {e}");
                std::future::pending::<()>().await;
            }
            info!("emx-docgen shutting down");
        })
        .await
        .context("Server error")?;

    Ok(())
}

async fn root() -> &'static str {
    LIVENESS_TEXT
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { ok: true })
}

async fn not_found() -> HandlerError {
    (StatusCode::NOT_FOUND, "Not found".to_string())
}

async fn generate(
    State(config): State<Arc<ServerConfig>>,
    mut multipart: Multipart,
) -> Result<Response, HandlerError> {
    let mut template = None;
    let mut data = None;

    while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
        let name = field.name().map(str::to_string);
        let is_file = field.file_name().is_some();
        match (name.as_deref(), is_file) {
            (Some("template"), true) => template = Some(read_bytes(field).await?),
            (Some("data"), false) => data = Some(field.text().await.map_err(bad_multipart)?),
            _ => {}
        }
    }

    let Some(template) = template else {
        return Err(bad_request("invalid request: missing file field 'template'"));
    };
    let Some(data) = data else {
        return Err(bad_request("invalid request: missing text field 'data' (JSON string)"));
    };
    if template.len() > config.upload_limit {
        return Err((
            StatusCode::PAYLOAD_TOO_LARGE,
            format!("template exceeds the upload limit of {} bytes", config.upload_limit),
        ));
    }

    let tree = transform::parse_payload(&data).map_err(|e| {
        warn!(error = %e, "rejected data field");
        bad_request("field 'data' is not valid JSON")
    })?;

    let worker = Arc::clone(&config);
    let result = tokio::task::spawn_blocking(move || worker.generator.generate(&template, tree))
        .await
        .map_err(|e| {
            error!(error = %e, "generation task failed");
            internal_error(&e.to_string())
        })?;

    match result {
        Ok(document) => {
            info!(bytes = document.len(), "generated document");
            Ok(document_response(document))
        }
        Err(e) => {
            log_failure(&e);
            Err(internal_error(&e.to_string()))
        }
    }
}

async fn read_bytes(field: Field<'_>) -> Result<Vec<u8>, HandlerError> {
    let bytes = field.bytes().await.map_err(bad_multipart)?;
    Ok(bytes.to_vec())
}

fn document_response(document: Vec<u8>) -> Response {
    let headers: [(HeaderName, HeaderValue); 5] = [
        (header::CONTENT_TYPE, HeaderValue::from_static(DOCX_CONTENT_TYPE)),
        (header::CONTENT_DISPOSITION, HeaderValue::from_static(CONTENT_DISPOSITION)),
        (header::CONTENT_LENGTH, HeaderValue::from(document.len())),
        (header::CACHE_CONTROL, HeaderValue::from_static("no-transform")),
        (header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff")),
    ];
    (StatusCode::OK, headers, document).into_response()
}

fn log_failure(err: &DocgenError) {
    error!(error = %err, "document generation failed");
    for entry in err.render_errors() {
        error!(
            entry = %entry.entry,
            offset = entry.offset,
            tag = %entry.tag,
            cause = %entry.cause,
            "render error"
        );
    }
}

fn bad_multipart(err: axum::extract::multipart::MultipartError) -> HandlerError {
    warn!(error = %err, "rejected multipart body");
    (err.status(), err.body_text())
}

fn bad_request(message: &str) -> HandlerError {
    (StatusCode::BAD_REQUEST, message.to_string())
}

fn internal_error(message: &str) -> HandlerError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        format!("error while generating the document: {message}"),
    )
}
