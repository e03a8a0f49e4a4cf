//! Request handlers for the coordination API

use super::AppState;
use crate::store::DEFAULT_USER;
use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

fn bad_request(message: &str) -> (StatusCode, Json<serde_json::Value>) {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message })))
}

/// Accept a recording upload and start a transcription job
pub async fn submit_job(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> impl IntoResponse {
    let mut upload: Option<(String, axum::body::Bytes)> = None;

    loop {
        match multipart.next_field().await {
            Ok(Some(field)) => {
                if field.name() != Some("file") {
                    continue;
                }
                let Some(filename) = field.file_name().map(str::to_string) else {
                    return bad_request("No file").into_response();
                };
                if filename.is_empty() {
                    return bad_request("No filename").into_response();
                }
                match field.bytes().await {
                    Ok(bytes) => {
                        upload = Some((filename, bytes));
                        break;
                    }
                    Err(e) => {
                        warn!("Upload read failed: {}", e);
                        return bad_request("No file").into_response();
                    }
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!("Malformed multipart request: {}", e);
                return bad_request("No file").into_response();
            }
        }
    }

    let Some((filename, bytes)) = upload else {
        return bad_request("No file").into_response();
    };

    let filename = sanitize_filename(&filename);
    let source_path = state.config.pipeline.upload_dir.join(&filename);
    if let Err(e) = tokio::fs::write(&source_path, &bytes).await {
        warn!("Failed to stage upload {}: {}", source_path.display(), e);
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "Upload failed" })),
        )
            .into_response();
    }
    info!("File saved: {}", source_path.display());

    let job_id = state.orchestrator.submit(&filename, source_path).await;

    Json(json!({ "status": "accepted", "job_id": job_id })).into_response()
}

/// Recent jobs, newest first
pub async fn get_jobs(State(state): State<AppState>) -> impl IntoResponse {
    let jobs = state.store.list_recent_jobs(50).await;
    Json(json!({ "count": jobs.len(), "jobs": jobs }))
}

/// One job record by id
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> impl IntoResponse {
    match state.store.get_job(&job_id).await {
        Some(job) => Json(job).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "Job not found" })),
        )
            .into_response(),
    }
}

/// Aggregate worker and job counts
pub async fn get_stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.store.stats().await)
}

/// Live-probe all known workers
pub async fn get_workers(State(state): State<AppState>) -> impl IntoResponse {
    let workers = state.dispatcher.list_online_workers().await;
    Json(json!({ "count": workers.len(), "workers": workers }))
}

#[derive(Debug, Deserialize)]
pub struct WorkerRequest {
    #[serde(default)]
    pub url: String,
}

/// Register a new worker URL
pub async fn add_worker(
    State(state): State<AppState>,
    Json(request): Json<WorkerRequest>,
) -> impl IntoResponse {
    let url = request.url.trim();
    if url.is_empty() {
        return bad_request("URL is empty").into_response();
    }

    let url = if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("http://{}", url)
    };

    let known = state.store.worker_urls().await;
    if known.contains(&url) {
        return bad_request("Worker already registered").into_response();
    }

    state.store.add_worker(&url).await;
    let workers = state.store.worker_urls().await;
    state.dispatcher.replace_workers(workers.clone()).await;

    Json(json!({ "status": "success", "workers": workers })).into_response()
}

/// Remove a worker URL
pub async fn remove_worker(
    State(state): State<AppState>,
    Json(request): Json<WorkerRequest>,
) -> impl IntoResponse {
    let url = request.url.trim();
    if url.is_empty() {
        return bad_request("URL is empty").into_response();
    }

    let known = state.store.worker_urls().await;
    if !known.iter().any(|u| u == url) {
        return bad_request("Unknown worker").into_response();
    }

    state.store.remove_worker(url).await;
    let workers = state.store.worker_urls().await;
    state.dispatcher.replace_workers(workers.clone()).await;

    Json(json!({ "status": "success", "workers": workers })).into_response()
}

#[derive(Debug, Deserialize)]
pub struct PurifierPreferenceRequest {
    #[serde(rename = "usePurifier", default = "default_use_purifier")]
    pub use_purifier: bool,
}

fn default_use_purifier() -> bool {
    true
}

/// Store the purifier preference
pub async fn set_purifier_preference(
    State(state): State<AppState>,
    Json(request): Json<PurifierPreferenceRequest>,
) -> impl IntoResponse {
    state
        .store
        .set_preference(DEFAULT_USER, "use_purifier", json!(request.use_purifier))
        .await;
    Json(json!({ "status": "success", "usePurifier": request.use_purifier }))
}

/// Read the purifier preference, defaulting to enabled
pub async fn get_purifier_preference(State(state): State<AppState>) -> impl IntoResponse {
    let use_purifier = state
        .store
        .get_preference(DEFAULT_USER, "use_purifier")
        .await
        .and_then(|v| v.as_bool())
        .unwrap_or(true);
    Json(json!({ "usePurifier": use_purifier }))
}

/// Reduce an uploaded filename to a safe single path component
pub(crate) fn sanitize_filename(filename: &str) -> String {
    let name = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(filename);
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = cleaned.trim_matches('.').to_string();
    if trimmed.is_empty() {
        "upload".to_string()
    } else {
        trimmed
    }
}
