//! Routes 模块
//!
//! 定义 API 路由。

pub mod flashcard_routes;
pub mod subject_routes;
pub mod topic_routes;
