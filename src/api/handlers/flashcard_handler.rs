//! Flashcard API Handlers
//!
//! 闪卡生成（含 NDJSON 流式进度）、增删改查、对话、蒸馏与层级整理。

use axum::{
    Json,
    body::Body,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::IntoResponse,
};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info};

use crate::{
    api::{app_state::AppState, dto::flashcard_dto::*, handlers::detached},
    error::AppError,
    storage::Repository,
};

const NDJSON: &str = "application/x-ndjson";

/// POST /api/flashcards/generate
pub async fn generate_flashcards(
    State(state): State<AppState>,
    Json(request): Json<GenerateFlashcardsRequest>,
) -> Result<impl IntoResponse, AppError> {
    debug!(topics = request.topics.len(), "Generating flashcards");

    let generation = state.generation.clone();
    let flashcards =
        detached(async move { generation.generate(request.topics, request.theme).await }).await?;

    Ok((
        StatusCode::CREATED,
        Json(GenerateFlashcardsResponse {
            total: flashcards.len(),
            flashcards,
        }),
    ))
}

/// POST /api/flashcards/generate/stream
///
/// 每行一个 JSON 事件。客户端断开只停止投递，生成与持久化照常完成。
pub async fn generate_flashcards_stream(
    State(state): State<AppState>,
    Json(request): Json<GenerateFlashcardsRequest>,
) -> Result<impl IntoResponse, AppError> {
    let receiver = state.generation.generate_stream(
        request.topics,
        request.theme,
        state.shutdown.child_token(),
    )?;

    let lines = UnboundedReceiverStream::new(receiver)
        .map(|event| serde_json::to_string(&event).map(|line| line + "\n"));

    Ok(([(header::CONTENT_TYPE, NDJSON)], Body::from_stream(lines)))
}

/// POST /api/flashcards
pub async fn create_flashcard(
    State(state): State<AppState>,
    Json(request): Json<CreateFlashcardRequest>,
) -> Result<impl IntoResponse, AppError> {
    let card = request.into_flashcard()?;
    let created = state.store.create(&card).await?;
    info!(id = %created.id, subject = %created.subject, "Flashcard created");
    Ok((StatusCode::CREATED, Json(created)))
}

/// GET /api/flashcards
pub async fn list_flashcards(
    State(state): State<AppState>,
    Query(params): Query<ListFlashcardsParams>,
) -> Result<impl IntoResponse, AppError> {
    let cards = match params.subject.as_deref() {
        Some(subject) => state.store.list_by_subject(subject),
        None => state.store.list_all(),
    };
    let total = cards.len();
    let flashcards = cards
        .into_iter()
        .skip(params.start.unwrap_or(0))
        .take(params.limit.unwrap_or(usize::MAX))
        .collect();

    Ok(Json(FlashcardListResponse { flashcards, total }))
}

/// GET /api/flashcards/:id
pub async fn get_flashcard(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let card = state.store.require(&id).await?;
    Ok(Json(card))
}

/// PUT /api/flashcards/:id
pub async fn update_flashcard(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<UpdateFlashcardRequest>,
) -> Result<impl IntoResponse, AppError> {
    let mut card = state.store.require(&id).await?;
    request.apply(&mut card)?;

    let updated = state
        .store
        .update(&id, &card)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Flashcard not found: {}", id)))?;
    Ok(Json(updated))
}

/// DELETE /api/flashcards/:id
pub async fn delete_flashcard(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    if !state.store.delete(&id).await? {
        return Err(AppError::NotFound(format!("Flashcard not found: {}", id)));
    }
    info!(id = %id, "Flashcard deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/flashcards/:id/chat
pub async fn chat_with_flashcard(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<ChatRequest>,
) -> Result<impl IntoResponse, AppError> {
    let chat = state.chat.clone();
    let reply = detached(async move { chat.send(&id, &request.message).await }).await?;
    Ok(Json(reply))
}

/// DELETE /api/flashcards/:id/chat
pub async fn clear_flashcard_chat(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let card = state.chat.clear(&id).await?;
    Ok(Json(card))
}

/// POST /api/flashcards/:id/distill
pub async fn distill_flashcard_chat(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let distiller = state.distiller.clone();
    let card = detached(async move { distiller.distill_chat(&id).await }).await?;
    Ok(Json(card))
}

/// POST /api/flashcards/organize
pub async fn organize_flashcards(
    State(state): State<AppState>,
    Json(request): Json<OrganizeRequest>,
) -> Result<impl IntoResponse, AppError> {
    debug!(count = request.flashcard_ids.len(), "Organizing flashcards");
    let organizer = state.organizer.clone();
    let outcome =
        detached(async move { organizer.organize(&request.flashcard_ids).await }).await?;
    Ok(Json(outcome))
}
