//! Handlers 模块
//!
//! HTTP 请求处理程序。

pub mod flashcard_handler;
pub mod subject_handler;
pub mod topic_handler;

pub use flashcard_handler::*;
pub use subject_handler::*;
pub use topic_handler::*;

use crate::error::AppError;

/// 在独立任务中执行服务调用
///
/// 客户端断开时 hyper 丢弃的只是等待方；已提交给 Oracle 的工作照常完成并落盘。
pub(crate) async fn detached<F, T>(work: F) -> Result<T, AppError>
where
    F: Future<Output = Result<T, AppError>> + Send + 'static,
    T: Send + 'static,
{
    tokio::spawn(work)
        .await
        .map_err(|e| AppError::Internal(format!("Background task failed: {}", e)))?
}
