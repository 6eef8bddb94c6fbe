use axum::Json;
use axum::body::Bytes;
use axum::extract::multipart::MultipartError;
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use rand::Rng;
use rand::distr::Alphanumeric;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::AppState;
use crate::builder::{BuildRequest, BuildResult, build_prototype};
use crate::constants::SESSION_ID_LENGTH;
use crate::cost::CostBreakdown;
use crate::error::{AppError, SessionFailure};
use crate::history::{Session, TokenUsage};
use crate::imaging::{self, NormalizedImage};

const MAX_FILENAME_LENGTH: usize = 64;

/// Body of a successful `POST /upload`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UploadResponse {
    success: bool,
    session_id: String,
    message: String,
    demo_url: String,
    thumbnail_url: Option<String>,
    output_dir: String,
    tokens: TokenUsage,
    cost: f64,
    costs: CostBreakdown,
    duration: f64,
    files: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    warnings: Vec<String>,
}

#[derive(Debug)]
struct Upload {
    filename: String,
    bytes: Bytes,
    custom_prompt: String,
}

fn new_session_id() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(SESSION_ID_LENGTH)
        .map(|byte| char::from(byte).to_ascii_lowercase())
        .collect()
}

/// Keeps the final path component and replaces anything unusual.
fn safe_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .filter(|c| !c.is_control())
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .take(MAX_FILENAME_LENGTH)
        .collect();
    let cleaned = cleaned.trim_start_matches('.').to_string();
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned
    }
}

fn multipart_error(err: MultipartError) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge(err.body_text())
    } else {
        AppError::BadRequest(err.body_text())
    }
}

async fn read_upload(multipart: &mut Multipart) -> Result<Upload, AppError> {
    let mut image: Option<(String, Bytes)> = None;
    let mut custom_prompt = String::new();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let field_name = field.name().unwrap_or_default().to_string();
        match field_name.as_str() {
            "image" | "photo" => {
                let content_type = field.content_type().unwrap_or_default().to_string();
                if !content_type.starts_with("image/") {
                    return Err(AppError::UnsupportedMediaType(format!(
                        "Only image uploads are accepted, got '{content_type}'"
                    )));
                }
                let filename = safe_filename(field.file_name().unwrap_or_default());
                let bytes = field.bytes().await.map_err(multipart_error)?;
                image = Some((filename, bytes));
            }
            "prompt" | "customPrompt" => {
                custom_prompt = field.text().await.map_err(multipart_error)?;
            }
            other => debug!("Ignoring multipart field {:?}", other),
        }
    }

    let (filename, bytes) =
        image.ok_or_else(|| AppError::BadRequest("No image file uploaded".to_string()))?;
    if bytes.is_empty() {
        return Err(AppError::BadRequest("Uploaded image is empty".to_string()));
    }
    Ok(Upload {
        filename,
        bytes,
        custom_prompt: custom_prompt.trim().to_string(),
    })
}

/// Keeps copies of the upload under `uploads/`; failures are warnings only.
async fn keep_uploads(
    state: &AppState,
    session_id: &str,
    upload: &Upload,
    normalized: &NormalizedImage,
) -> Vec<String> {
    let dir = state.config.uploads_dir();
    let mut warnings = Vec::new();
    if let Err(err) = tokio::fs::create_dir_all(&dir).await {
        warnings.push(format!("Could not keep a copy of the upload: {err}"));
        return warnings;
    }
    let copies = [
        (
            dir.join(format!("{session_id}-{}", upload.filename)),
            upload.bytes.as_ref(),
        ),
        (
            dir.join(format!("{session_id}-normalized.jpg")),
            normalized.bytes.as_slice(),
        ),
    ];
    for (path, bytes) in copies {
        if let Err(err) = tokio::fs::write(&path, bytes).await {
            warn!("[{}] Failed to write {}: {}", session_id, path.display(), err);
            warnings.push(format!("Could not keep a copy of the upload: {err}"));
        }
    }
    warnings
}

fn session_record(
    state: &AppState,
    session_id: &str,
    started: DateTime<Utc>,
    upload: &Upload,
    result: &BuildResult,
) -> Session {
    Session {
        session_id: session_id.to_string(),
        timestamp: started,
        original_filename: upload.filename.clone(),
        custom_prompt: upload.custom_prompt.clone(),
        output_dir: state.config.relative_to_data_dir(&result.output_dir),
        prototype_url: result.prototype_url.clone(),
        thumbnail_url: result.thumbnail_url.clone(),
        tokens: result.tokens,
        cost: result.costs.total(),
        costs: result.costs.clone(),
        duration: result.duration,
        model: result.model.clone(),
        success: true,
    }
}

async fn run_upload(
    state: &AppState,
    session_id: &str,
    multipart: &mut Multipart,
) -> Result<UploadResponse, AppError> {
    let started = Utc::now();
    let upload = read_upload(multipart).await?;
    info!(
        "[{}] Received {} ({} bytes){}",
        session_id,
        upload.filename,
        upload.bytes.len(),
        if upload.custom_prompt.is_empty() {
            ""
        } else {
            " with custom instructions"
        }
    );

    let bytes = upload.bytes.clone();
    let max_dimension = state.config.max_image_dimension;
    let quality = state.config.image_quality;
    let normalized =
        tokio::task::spawn_blocking(move || imaging::normalize(&bytes, max_dimension, quality))
            .await??;

    let mut warnings = keep_uploads(state, session_id, &upload, &normalized).await;

    let request = BuildRequest {
        session_id,
        started,
        image: &normalized,
        custom_prompt: Some(upload.custom_prompt.as_str()).filter(|p| !p.is_empty()),
    };
    let result = build_prototype(&state.config, state.client.as_ref(), &request).await?;
    if let Some(err) = &result.thumbnail_error {
        warnings.push(format!("Thumbnail was not generated: {err}"));
    }

    let session = session_record(state, session_id, started, &upload, &result);
    if let Err(err) = state.history.append(session.clone()).await {
        warn!("[{}] {}", session_id, err);
        warnings.push(format!("Session was not recorded in history: {err}"));
    }

    Ok(UploadResponse {
        success: true,
        session_id: session.session_id,
        message: "Prototype built successfully".to_string(),
        demo_url: session.prototype_url,
        thumbnail_url: session.thumbnail_url,
        output_dir: session.output_dir,
        tokens: session.tokens,
        cost: session.cost,
        costs: session.costs,
        duration: session.duration,
        files: result.files,
        warnings,
    })
}

/// `POST /upload`: photo (+ optional instruction) in, prototype summary out.
pub(crate) async fn upload_handler(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, SessionFailure> {
    let session_id = new_session_id();
    match run_upload(&state, &session_id, &mut multipart).await {
        Ok(response) => {
            info!("[{}] Done: {}", session_id, response.demo_url);
            Ok(Json(response))
        }
        Err(err) => Err(SessionFailure::new(&session_id, err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_ids_are_unique_and_path_safe() {
        let a = new_session_id();
        let b = new_session_id();
        assert_eq!(a.len(), SESSION_ID_LENGTH);
        assert_ne!(a, b);
        assert!(a.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    }

    #[test]
    fn filenames_are_sanitized() {
        assert_eq!(safe_filename("board.jpg"), "board.jpg");
        assert_eq!(safe_filename("../../etc/passwd"), "passwd");
        assert_eq!(safe_filename("C:\\photos\\my board.png"), "my_board.png");
        assert_eq!(safe_filename(".hidden"), "hidden");
        assert_eq!(safe_filename(""), "upload");
        assert_eq!(safe_filename(&"x".repeat(200)).len(), MAX_FILENAME_LENGTH);
    }
}
