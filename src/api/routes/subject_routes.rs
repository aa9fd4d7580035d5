//! Subject Routes

use crate::api::handlers::subject_handler::*;
use axum::{
    Router,
    routing::{get, post},
};

use crate::api::app_state::AppState;

/// 创建学科路由器
pub fn create_subject_router() -> Router<AppState> {
    Router::new()
        .route("/subjects", get(list_subjects))
        .route("/subjects/:subject/distill", post(distill_subject))
        .route(
            "/subjects/:subject/distillations",
            get(list_subject_distillations),
        )
        .route("/subjects/:subject/podcast", post(subject_podcast))
}
