//! 内容缓存条目与派生产物

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::topic::Topic;

/// 文本提取模式
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMode {
    #[default]
    Default,
    Concise,
    Intelligent,
}

/// 缓存条目类别
///
/// 每个类别拥有独立的指纹前缀，不同模式或类别的相同输入不会共享键。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CacheKind {
    TextDefault,
    TextConcise,
    TextIntelligent,
    Image,
    Podcast,
    Distillation,
}

impl CacheKind {
    pub fn for_mode(mode: ExtractionMode) -> Self {
        match mode {
            ExtractionMode::Default => CacheKind::TextDefault,
            ExtractionMode::Concise => CacheKind::TextConcise,
            ExtractionMode::Intelligent => CacheKind::TextIntelligent,
        }
    }

    /// 指纹命名空间前缀
    pub fn prefix(&self) -> &'static str {
        match self {
            CacheKind::TextDefault => "text",
            CacheKind::TextConcise => "concise",
            CacheKind::TextIntelligent => "intelligent",
            CacheKind::Image => "image",
            CacheKind::Podcast => "podcast",
            CacheKind::Distillation => "distill",
        }
    }

    #[cfg(test)]
    pub fn all() -> [CacheKind; 6] {
        [
            CacheKind::TextDefault,
            CacheKind::TextConcise,
            CacheKind::TextIntelligent,
            CacheKind::Image,
            CacheKind::Podcast,
            CacheKind::Distillation,
        ]
    }
}

/// 缓存的派生产物
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CachedArtifact {
    /// 主题提取结果
    Extraction { theme: String, topics: Vec<Topic> },
    /// 学科摘要
    Distillation {
        subject: String,
        user_prompt: String,
        summary: String,
    },
    /// 学科播客脚本
    Podcast { subject: String, script: String },
}

/// 内容缓存条目
///
/// 写入后不可变；重新生成时先删除再重建。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheEntry {
    /// 指纹
    pub key: String,
    /// 类别
    pub kind: CacheKind,
    /// 原始输入（图片记录为 mime 与大小）
    pub original_input: String,
    /// 创建时间
    pub created_at: DateTime<Utc>,
    /// 产物
    pub artifact: CachedArtifact,
}

impl CacheEntry {
    pub fn new(key: &str, kind: CacheKind, original_input: &str, artifact: CachedArtifact) -> Self {
        Self {
            key: key.to_string(),
            kind,
            original_input: original_input.to_string(),
            created_at: Utc::now(),
            artifact,
        }
    }

    /// 学科（仅摘要与播客条目）
    pub fn subject(&self) -> Option<&str> {
        match &self.artifact {
            CachedArtifact::Distillation { subject, .. }
            | CachedArtifact::Podcast { subject, .. } => Some(subject),
            CachedArtifact::Extraction { .. } => None,
        }
    }
}

/// 学科摘要
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DistillSummary {
    pub cache_key: String,
    pub subject: String,
    pub user_prompt: String,
    pub summary: String,
    pub created_at: DateTime<Utc>,
    pub cached: bool,
}

impl DistillSummary {
    pub fn from_entry(entry: &CacheEntry, cached: bool) -> Option<Self> {
        match &entry.artifact {
            CachedArtifact::Distillation {
                subject,
                user_prompt,
                summary,
            } => Some(Self {
                cache_key: entry.key.clone(),
                subject: subject.clone(),
                user_prompt: user_prompt.clone(),
                summary: summary.clone(),
                created_at: entry.created_at,
                cached,
            }),
            _ => None,
        }
    }
}

/// 学科播客（叙述式概览脚本）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubjectPodcast {
    pub cache_key: String,
    pub subject: String,
    pub script: String,
    pub created_at: DateTime<Utc>,
    pub cached: bool,
}

impl SubjectPodcast {
    pub fn from_entry(entry: &CacheEntry, cached: bool) -> Option<Self> {
        match &entry.artifact {
            CachedArtifact::Podcast { subject, script } => Some(Self {
                cache_key: entry.key.clone(),
                subject: subject.clone(),
                script: script.clone(),
                created_at: entry.created_at,
                cached,
            }),
            _ => None,
        }
    }
}
