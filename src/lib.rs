//! StudyBuddy - 学习闪卡生成服务
//!
//! 把任意文本或图片材料转化为去重、分层组织的学习闪卡，
//! 并在其上派生学科摘要与播客脚本。

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod observability;
pub mod oracle;
pub mod services;
pub mod storage;
