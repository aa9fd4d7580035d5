//! Flashcard Routes
//!
//! 定义闪卡相关的 API 路由。

use crate::api::handlers::flashcard_handler::*;
use axum::{
    Router,
    routing::{get, post},
};

use crate::api::app_state::AppState;

/// 创建闪卡路由器
pub fn create_flashcard_router() -> Router<AppState> {
    Router::new()
        .route("/flashcards", post(create_flashcard).get(list_flashcards))
        .route("/flashcards/generate", post(generate_flashcards))
        .route("/flashcards/generate/stream", post(generate_flashcards_stream))
        .route("/flashcards/organize", post(organize_flashcards))
        .route(
            "/flashcards/:id",
            get(get_flashcard)
                .put(update_flashcard)
                .patch(update_flashcard)
                .delete(delete_flashcard),
        )
        .route(
            "/flashcards/:id/chat",
            post(chat_with_flashcard).delete(clear_flashcard_chat),
        )
        .route("/flashcards/:id/distill", post(distill_flashcard_chat))
}
