//! 核心数据模型模块
//!
//! 定义 Study Buddy 的核心数据结构：Topic, Flashcard, CacheEntry 等。

pub mod cache;
pub mod flashcard;
pub mod topic;

pub use cache::*;
pub use flashcard::*;
pub use topic::*;
