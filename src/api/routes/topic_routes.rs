//! Topic Routes
//!
//! 主题提取与内容缓存路由。

use crate::api::handlers::topic_handler::*;
use axum::{
    Router,
    routing::{get, post},
};

use crate::api::app_state::AppState;

/// 创建主题路由器
pub fn create_topic_router() -> Router<AppState> {
    Router::new()
        .route("/topics/extract", post(extract_topics))
        .route("/topics/extract-image", post(extract_image_topics))
        .route("/cache", get(list_cache_entries))
        .route("/cache/:key", get(get_cache_entry).delete(delete_cache_entry))
}
