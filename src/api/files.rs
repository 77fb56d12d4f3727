use axum::{
    body::Body,
    extract::{DefaultBodyLimit, Multipart, Path, Query, Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::Path as FsPath;
use tower::ServiceExt;
use tower_http::services::ServeFile;
use tracing::{info, warn};

use crate::error::{HomeCloudError, Result};
use crate::filesystem::Listing;
use crate::server::AppState;

/// Upload target query parameters
#[derive(Debug, Deserialize)]
pub struct UploadParams {
    pub path: Option<String>,
}

/// Delete query parameters
#[derive(Debug, Deserialize)]
pub struct DeleteParams {
    pub path: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RenameRequest {
    pub old: String,
    pub new: String,
}

#[derive(Debug, Deserialize)]
pub struct MoveRequest {
    pub source: String,
    pub dest: String,
}

#[derive(Debug, Deserialize)]
pub struct MkdirRequest {
    pub path: String,
}

#[derive(Debug, Deserialize)]
pub struct SettingsRequest {
    pub storage_quota_gb: u64,
}

/// Upload a file from the multipart field `file`
pub async fn upload_file(
    State(state): State<AppState>,
    Query(params): Query<UploadParams>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<Value>> {
    let dir = params.path.unwrap_or_default();
    let size_hint = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(0);

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| HomeCloudError::invalid_request(format!("File too large or corrupt: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let file_name = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| HomeCloudError::invalid_request("File name missing"))?;

        let outcome = state
            .store
            .upload(&dir, &file_name, size_hint, Box::pin(field))
            .await?;

        info!("Upload stored at {} ({} bytes)", outcome.path, outcome.size);
        return Ok(Json(json!({
            "message": format!("File uploaded successfully to {}", outcome.path),
            "path": outcome.path,
            "size": outcome.size
        })));
    }

    Err(HomeCloudError::invalid_request("File not found"))
}

/// Download a file as an attachment
pub async fn download_file(
    State(state): State<AppState>,
    Path(file_path): Path<String>,
    request: Request,
) -> Result<Response> {
    let opened = state.store.open(&file_path).await?;
    let mut response = serve_file(&opened.path, request).await?;

    let disposition = format!("attachment; filename=\"{}\"", opened.name.replace('"', ""));
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        response.headers_mut().insert(header::CONTENT_DISPOSITION, value);
    }
    Ok(response)
}

/// Stream a file with range support, for media players
pub async fn stream_file(
    State(state): State<AppState>,
    Path(file_path): Path<String>,
    request: Request,
) -> Result<Response> {
    let opened = state.store.open(&file_path).await?;
    info!("Serving stream: {}", file_path);

    let mut response = serve_file(&opened.path, request).await?;
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("public, max-age=3600"));
    Ok(response)
}

pub async fn list_root(State(state): State<AppState>, request: Request) -> Result<Response> {
    list_path(&state, "", request).await
}

pub async fn list_directory(
    State(state): State<AppState>,
    Path(dir_path): Path<String>,
    request: Request,
) -> Result<Response> {
    list_path(&state, &dir_path, request).await
}

async fn list_path(state: &AppState, path: &str, request: Request) -> Result<Response> {
    match state.store.list(path).await? {
        Listing::Directory(entries) => Ok(Json(entries).into_response()),
        Listing::File(file) => {
            let mut response = serve_file(&file, request).await?;
            response
                .headers_mut()
                .insert(header::CACHE_CONTROL, HeaderValue::from_static("public, max-age=86400"));
            Ok(response)
        }
    }
}

pub async fn rename_entry(
    State(state): State<AppState>,
    Json(request): Json<RenameRequest>,
) -> Result<Json<Value>> {
    let path = state.store.rename(&request.old, &request.new).await?;
    Ok(Json(json!({
        "message": format!("Rename successful from {} to {}", request.old, path),
        "path": path
    })))
}

pub async fn move_entry(
    State(state): State<AppState>,
    Json(request): Json<MoveRequest>,
) -> Result<Json<Value>> {
    let path = state.store.move_entry(&request.source, &request.dest).await?;
    Ok(Json(json!({
        "message": "File/folder moved successfully",
        "path": path
    })))
}

pub async fn delete_entry(
    State(state): State<AppState>,
    Query(params): Query<DeleteParams>,
) -> Result<Json<Value>> {
    let path = params.path.unwrap_or_default();
    state.store.delete(&path).await?;
    Ok(Json(json!({
        "message": "File/folder deleted successfully",
        "path": path
    })))
}

pub async fn create_directory(
    State(state): State<AppState>,
    Json(request): Json<MkdirRequest>,
) -> Result<(StatusCode, Json<Value>)> {
    let path = state.store.mkdir(&request.path).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": format!("Folder created: {path}"),
            "path": path
        })),
    ))
}

/// Storage usage and host facts
pub async fn system_info(State(state): State<AppState>) -> Json<Value> {
    let tracker = state.store.tracker();
    let quota = tracker.quota_status();
    let cpu_count = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);

    Json(json!({
        "os": {
            "os": std::env::consts::OS,
            "arch": std::env::consts::ARCH,
            "cpu_count": cpu_count.to_string()
        },
        "project_disk": {
            "path": tracker.root().to_string_lossy(),
            "used": quota.used_bytes,
            "free": quota.free_bytes,
            "total": quota.total_bytes,
            "hard_limit": quota.hard_limit_bytes,
            "quota_setting": quota.quota_gb,
            "is_project_disk": true
        },
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

pub async fn get_settings(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "storage_quota_gb": state.store.tracker().quota().quota_gb()
    }))
}

pub async fn update_settings(
    State(state): State<AppState>,
    Json(request): Json<SettingsRequest>,
) -> Result<Json<Value>> {
    state
        .store
        .tracker()
        .quota()
        .set_quota_gb(request.storage_quota_gb)?;

    info!("Storage quota updated to {} GB", request.storage_quota_gb);
    Ok(Json(json!({
        "message": format!(
            "Storage quota updated to {} GB (restart the server to reset it from the environment)",
            request.storage_quota_gb
        ),
        "storage_quota_gb": request.storage_quota_gb
    })))
}

async fn serve_file(path: &FsPath, request: Request) -> Result<Response> {
    match ServeFile::new(path).oneshot(request).await {
        Ok(response) => Ok(response.map(Body::new)),
        Err(infallible) => match infallible {},
    }
}

/// File routes, all of which sit behind the token guard
pub fn file_routes(max_upload_bytes: u64) -> Router<AppState> {
    let upload_limit = usize::try_from(max_upload_bytes).unwrap_or(usize::MAX);
    if upload_limit == 0 {
        warn!("Upload limit of 0 bytes rejects every upload");
    }

    Router::new()
        .route(
            "/upload",
            post(upload_file).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/download/*file_path", get(download_file))
        .route("/stream/*file_path", get(stream_file))
        .route("/list", get(list_root))
        .route("/list/", get(list_root))
        .route("/list/*dir_path", get(list_directory))
        .route("/rename", post(rename_entry))
        .route("/move", post(move_entry))
        .route("/delete", delete(delete_entry))
        .route("/mkdir", post(create_directory))
        .route("/info", get(system_info))
        .route("/settings", get(get_settings).post(update_settings))
}
