//! Topic API Handlers
//!
//! 主题提取与内容缓存管理。

use axum::{
    Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tracing::debug;

use crate::{
    api::{app_state::AppState, dto::topic_dto::*, handlers::detached},
    error::AppError,
    oracle::ImageInput,
};

/// POST /api/topics/extract
pub async fn extract_topics(
    State(state): State<AppState>,
    Json(request): Json<ExtractTopicsRequest>,
) -> Result<impl IntoResponse, AppError> {
    debug!(mode = ?request.mode, regenerate = request.regenerate, "Extracting topics");

    let pipeline = state.extraction.clone();
    let extraction = detached(async move {
        if request.regenerate {
            pipeline.regenerate_text(&request.text, request.mode).await
        } else {
            pipeline.extract_text(&request.text, request.mode).await
        }
    })
    .await?;

    Ok(Json(extraction))
}

/// POST /api/topics/extract-image
pub async fn extract_image_topics(
    State(state): State<AppState>,
    Json(request): Json<ExtractImageRequest>,
) -> Result<impl IntoResponse, AppError> {
    let bytes = STANDARD
        .decode(request.image_base64.trim())
        .map_err(|e| AppError::Validation(format!("Invalid base64 image: {}", e)))?;
    let image = ImageInput::new(bytes, &request.mime_type)?;
    debug!(image = %image.describe(), "Extracting topics from image");

    let pipeline = state.extraction.clone();
    let regenerate = request.regenerate;
    let extraction = detached(async move {
        if regenerate {
            pipeline.regenerate_image(image).await
        } else {
            pipeline.extract_image(image).await
        }
    })
    .await?;

    Ok(Json(extraction))
}

/// GET /api/cache
pub async fn list_cache_entries(
    State(state): State<AppState>,
    Query(params): Query<ListCacheParams>,
) -> Result<impl IntoResponse, AppError> {
    let entries: Vec<CacheEntrySummary> = state
        .cache
        .list(params.kind)
        .iter()
        .map(CacheEntrySummary::from)
        .collect();

    Ok(Json(CacheListResponse {
        total: entries.len(),
        entries,
    }))
}

/// GET /api/cache/:key
pub async fn get_cache_entry(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let entry = state
        .cache
        .get(&key)
        .ok_or_else(|| AppError::NotFound(format!("Cache entry not found: {}", key)))?;
    Ok(Json(entry))
}

/// DELETE /api/cache/:key
pub async fn delete_cache_entry(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    debug!("Deleting cache entry: {}", key);

    if !state.cache.delete(&key).await? {
        return Err(AppError::NotFound(format!("Cache entry not found: {}", key)));
    }
    Ok(Json(DeletedResponse { deleted: true }))
}
