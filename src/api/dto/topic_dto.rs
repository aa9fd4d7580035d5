//! 主题提取与缓存 DTO

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::cache::{CacheEntry, CacheKind, ExtractionMode};
use crate::services::prompts::excerpt;

/// 原始输入在列表中的预览长度
const INPUT_PREVIEW_CHARS: usize = 120;

/// 文本提取请求
#[derive(Debug, Deserialize)]
pub struct ExtractTopicsRequest {
    /// 学习材料
    pub text: String,
    /// 提取模式
    #[serde(default)]
    pub mode: ExtractionMode,
    /// 删除缓存后重新提取
    #[serde(default)]
    pub regenerate: bool,
}

/// 图片提取请求
#[derive(Debug, Deserialize)]
pub struct ExtractImageRequest {
    /// Base64 编码的图片
    pub image_base64: String,
    /// 图片类型，如 image/png
    pub mime_type: String,
    #[serde(default)]
    pub regenerate: bool,
}

/// 缓存列表查询参数
#[derive(Debug, Default, Deserialize)]
pub struct ListCacheParams {
    pub kind: Option<CacheKind>,
}

/// 缓存条目摘要
#[derive(Debug, Serialize)]
pub struct CacheEntrySummary {
    pub key: String,
    pub kind: CacheKind,
    pub subject: Option<String>,
    pub input_preview: String,
    pub created_at: DateTime<Utc>,
}

impl From<&CacheEntry> for CacheEntrySummary {
    fn from(entry: &CacheEntry) -> Self {
        Self {
            key: entry.key.clone(),
            kind: entry.kind,
            subject: entry.subject().map(str::to_string),
            input_preview: excerpt(&entry.original_input, INPUT_PREVIEW_CHARS),
            created_at: entry.created_at,
        }
    }
}

/// 缓存列表响应
#[derive(Debug, Serialize)]
pub struct CacheListResponse {
    pub entries: Vec<CacheEntrySummary>,
    pub total: usize,
}

/// 删除响应
#[derive(Debug, Serialize)]
pub struct DeletedResponse {
    pub deleted: bool,
}
