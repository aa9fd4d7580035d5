//! 闪卡 DTO
//!
//! 定义闪卡生成、增删改查、对话与整理的请求和响应数据结构。

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::flashcard::Flashcard;
use crate::models::topic::Topic;

/// 批量生成请求
#[derive(Debug, Deserialize)]
pub struct GenerateFlashcardsRequest {
    /// 按顺序生成的主题
    pub topics: Vec<Topic>,
    /// 提取时得到的整体主题
    #[serde(default)]
    pub theme: Option<String>,
}

/// 批量生成响应
#[derive(Debug, Serialize)]
pub struct GenerateFlashcardsResponse {
    pub flashcards: Vec<Flashcard>,
    pub total: usize,
}

/// 手动创建闪卡请求
#[derive(Debug, Deserialize)]
pub struct CreateFlashcardRequest {
    pub topic: String,
    /// 缺省为 "General"
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub explanation: String,
    #[serde(default)]
    pub section: Option<String>,
    #[serde(default)]
    pub subsection: Option<String>,
    #[serde(default)]
    pub origin_theme: Option<String>,
}

impl CreateFlashcardRequest {
    pub fn into_flashcard(self) -> Result<Flashcard> {
        let topic = self.topic.trim();
        if topic.is_empty() {
            return Err(AppError::Validation("Topic cannot be empty".to_string()));
        }
        let mut card = Flashcard::new(
            topic,
            self.subject.as_deref().unwrap_or_default(),
            &self.explanation,
        );
        match (self.section, self.subsection) {
            (Some(section), subsection) => card.assign_hierarchy(&section, subsection.as_deref()),
            (None, Some(_)) => {
                return Err(AppError::Validation(
                    "Subsection requires a section".to_string(),
                ));
            }
            (None, None) => {}
        }
        card.origin_theme = self.origin_theme;
        Ok(card)
    }
}

/// 部分更新请求；未提供的字段保持不变
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct UpdateFlashcardRequest {
    pub topic: Option<String>,
    pub subject: Option<String>,
    pub explanation: Option<String>,
    pub section: Option<String>,
    pub subsection: Option<String>,
    pub origin_theme: Option<String>,
}

impl UpdateFlashcardRequest {
    /// 应用到现有闪卡
    pub fn apply(self, card: &mut Flashcard) -> Result<()> {
        if let Some(topic) = self.topic {
            if topic.trim().is_empty() {
                return Err(AppError::Validation("Topic cannot be empty".to_string()));
            }
            card.topic = topic.trim().to_string();
        }
        if let Some(subject) = self.subject.filter(|s| !s.trim().is_empty()) {
            card.subject = subject.trim().to_string();
        }
        if let Some(explanation) = self.explanation {
            card.explanation = explanation;
        }
        match (self.section, self.subsection) {
            (Some(section), subsection) => card.assign_hierarchy(&section, subsection.as_deref()),
            (None, Some(subsection)) => match card.section.clone() {
                Some(section) => card.assign_hierarchy(&section, Some(&subsection)),
                None => {
                    return Err(AppError::Validation(
                        "Subsection requires a section".to_string(),
                    ));
                }
            },
            (None, None) => {}
        }
        if let Some(theme) = self.origin_theme {
            card.origin_theme = Some(theme);
        }
        Ok(())
    }
}

/// 列表查询参数
#[derive(Debug, Deserialize)]
pub struct ListFlashcardsParams {
    pub subject: Option<String>,
    pub limit: Option<usize>,
    pub start: Option<usize>,
}

/// 闪卡列表响应
#[derive(Debug, Serialize)]
pub struct FlashcardListResponse {
    pub flashcards: Vec<Flashcard>,
    pub total: usize,
}

/// 对话请求
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

/// 层级整理请求
#[derive(Debug, Deserialize)]
pub struct OrganizeRequest {
    pub flashcard_ids: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_request_defaults_subject() {
        let request: CreateFlashcardRequest =
            serde_json::from_value(serde_json::json!({"topic": "TCP"})).unwrap();
        let card = request.into_flashcard().unwrap();
        assert_eq!(card.subject, "General");
        assert!(card.section.is_none());
    }

    #[test]
    fn test_subsection_without_section_rejected() {
        let mut card = Flashcard::new("TCP", "Networking", "");
        let update = UpdateFlashcardRequest {
            subsection: Some("Handshake".into()),
            ..Default::default()
        };
        assert!(update.apply(&mut card).is_err());
        assert!(card.subsection.is_none());
    }

    #[test]
    fn test_partial_update_keeps_other_fields() {
        let mut card = Flashcard::new("TCP", "Networking", "Reliable");
        card.assign_hierarchy("Transport", None);
        let update = UpdateFlashcardRequest {
            explanation: Some("Connection oriented".into()),
            subsection: Some("Handshake".into()),
            ..Default::default()
        };
        update.apply(&mut card).unwrap();
        assert_eq!(card.topic, "TCP");
        assert_eq!(card.explanation, "Connection oriented");
        assert_eq!(card.section.as_deref(), Some("Transport"));
        assert_eq!(card.subsection.as_deref(), Some("Handshake"));
    }
}
