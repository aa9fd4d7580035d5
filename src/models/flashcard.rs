use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::topic::{DEFAULT_SUBJECT, Topic};

/// 对话角色
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

/// 闪卡对话消息（只追加）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// 闪卡实体
///
/// 持久化的学习单元。`id` 一经分配不可变；主题数据按值拷贝，
/// 与内容缓存之间不维护引用完整性。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Flashcard {
    /// 全局唯一标识
    pub id: String,
    /// 主题
    pub topic: String,
    /// 学科
    pub subject: String,
    /// 解释内容
    pub explanation: String,
    /// 章节
    #[serde(default)]
    pub section: Option<String>,
    /// 小节（只与对应章节一同设置）
    #[serde(default)]
    pub subsection: Option<String>,
    /// 对话记录
    #[serde(default)]
    pub chat_history: Vec<ChatMessage>,
    /// 来源主题
    #[serde(default)]
    pub origin_theme: Option<String>,
    /// 创建时间
    pub created_at: DateTime<Utc>,
    /// 更新时间
    pub updated_at: DateTime<Utc>,
}

impl Flashcard {
    /// 创建新闪卡
    pub fn new(topic: &str, subject: &str, explanation: &str) -> Self {
        let now = Utc::now();
        let subject = if subject.trim().is_empty() {
            DEFAULT_SUBJECT
        } else {
            subject
        };
        Self {
            id: format!("card_{}", Uuid::new_v4()),
            topic: topic.to_string(),
            subject: subject.to_string(),
            explanation: explanation.to_string(),
            section: None,
            subsection: None,
            chat_history: Vec::new(),
            origin_theme: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// 由提取的主题创建闪卡，拷贝主题的层级信息
    pub fn from_topic(topic: &Topic, explanation: &str, origin_theme: Option<&str>) -> Self {
        let mut card = Self::new(&topic.name, &topic.subject, explanation);
        card.section = topic.section.clone();
        card.subsection = topic.section.as_ref().and(topic.subsection.clone());
        card.origin_theme = origin_theme.map(str::to_string);
        card
    }

    /// 设置层级位置；小节必须与章节一同出现
    pub fn assign_hierarchy(&mut self, section: &str, subsection: Option<&str>) {
        self.section = Some(section.to_string());
        self.subsection = subsection.map(str::to_string);
        self.touch();
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_subject_defaults_to_general() {
        let card = Flashcard::new("TCP", "  ", "Transport protocol");
        assert_eq!(card.subject, DEFAULT_SUBJECT);
        assert!(card.id.starts_with("card_"));
        assert!(card.chat_history.is_empty());
    }

    #[test]
    fn test_from_topic_drops_orphan_subsection() {
        let topic = Topic {
            id: 1,
            name: "Port 22".into(),
            context: "SSH runs on port 22".into(),
            subject: "Networking".into(),
            section: None,
            subsection: Some("Remote access".into()),
        };
        let card = Flashcard::from_topic(&topic, "SSH listens on 22", Some("Ports"));
        assert_eq!(card.section, None);
        assert_eq!(card.subsection, None);
        assert_eq!(card.origin_theme.as_deref(), Some("Ports"));
    }

    #[test]
    fn test_chat_role_serializes_lowercase() {
        let msg = ChatMessage::assistant("hi");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "assistant");
    }
}
