//! Subject API Handlers

use axum::{
    Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use tracing::debug;

use crate::{
    api::{app_state::AppState, dto::subject_dto::*, handlers::detached},
    error::AppError,
};

/// GET /api/subjects
pub async fn list_subjects(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let subjects = state
        .store
        .subjects()
        .into_iter()
        .map(|(subject, flashcard_count)| SubjectResponse {
            subject,
            flashcard_count,
        })
        .collect();
    Ok(Json(SubjectListResponse { subjects }))
}

/// POST /api/subjects/:subject/distill
pub async fn distill_subject(
    State(state): State<AppState>,
    Path(subject): Path<String>,
    Json(request): Json<DistillSubjectRequest>,
) -> Result<impl IntoResponse, AppError> {
    debug!(subject = %subject, regenerate = request.regenerate, "Distilling subject");
    let distiller = state.distiller.clone();
    let summary = detached(async move {
        distiller
            .distill_subject(&subject, &request.user_prompt, request.regenerate)
            .await
    })
    .await?;
    Ok(Json(summary))
}

/// GET /api/subjects/:subject/distillations
pub async fn list_subject_distillations(
    State(state): State<AppState>,
    Path(subject): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let distillations = state.distiller.list_distillations(&subject);
    Ok(Json(DistillationListResponse {
        subject,
        distillations,
    }))
}

/// POST /api/subjects/:subject/podcast
pub async fn subject_podcast(
    State(state): State<AppState>,
    Path(subject): Path<String>,
    Query(params): Query<RegenerateParams>,
) -> Result<impl IntoResponse, AppError> {
    debug!(subject = %subject, regenerate = params.regenerate, "Building subject podcast");
    let distiller = state.distiller.clone();
    let podcast = detached(async move {
        distiller
            .podcast_for_subject(&subject, params.regenerate)
            .await
    })
    .await?;
    Ok(Json(podcast))
}
