//! 存储层模块
//!
//! 内容缓存（每条目一个文件）与闪卡存储（单文件快照）。

pub mod content_cache;
pub mod fingerprint;
pub mod flashcard_store;
pub mod repository;

pub use content_cache::ContentCache;
pub use flashcard_store::FlashcardStore;
pub use repository::Repository;
