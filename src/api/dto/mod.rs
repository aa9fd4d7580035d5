//! DTO 模块
//!
//! 数据传输对象，用于 API 请求和响应的序列化。

pub mod flashcard_dto;
pub mod subject_dto;
pub mod topic_dto;

pub use flashcard_dto::*;
pub use subject_dto::*;
pub use topic_dto::*;
