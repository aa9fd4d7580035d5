//! Oracle 响应解码
//!
//! 把结构化响应严格解码为带标签的结果：成功值，或携带原始文本的失败。
//! 可选字段的默认值在这里显式声明。

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::error::{AppError, Result};
use crate::models::topic::{DEFAULT_SUBJECT, Topic};

static CODE_FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^\s*```[A-Za-z0-9_+-]*[ \t]*\r?\n?(.*?)\r?\n?\s*```\s*$")
        .expect("code fence pattern is valid")
});

/// 解码结果
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded<T> {
    Valid(T),
    Invalid { reason: String, raw: String },
}

impl<T> Decoded<T> {
    pub fn into_result(self) -> Result<T> {
        match self {
            Decoded::Valid(value) => Ok(value),
            Decoded::Invalid { reason, raw } => Err(AppError::parse(reason, raw)),
        }
    }

    fn map<U>(self, f: impl FnOnce(T) -> std::result::Result<U, String>) -> Decoded<U> {
        match self {
            Decoded::Valid(value) => match f(value) {
                Ok(mapped) => Decoded::Valid(mapped),
                Err(reason) => Decoded::Invalid {
                    reason,
                    raw: String::new(),
                },
            },
            Decoded::Invalid { reason, raw } => Decoded::Invalid { reason, raw },
        }
    }
}

/// 去掉可选的 ``` 代码块标记
pub fn strip_code_fences(raw: &str) -> &str {
    match CODE_FENCE.captures(raw).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str().trim(),
        None => raw.trim(),
    }
}

/// 严格解码 JSON 响应
pub fn decode<T: DeserializeOwned>(raw: &str) -> Decoded<T> {
    match serde_json::from_str::<T>(strip_code_fences(raw)) {
        Ok(value) => Decoded::Valid(value),
        Err(e) => Decoded::Invalid {
            reason: e.to_string(),
            raw: raw.to_string(),
        },
    }
}

fn default_subject() -> String {
    DEFAULT_SUBJECT.to_string()
}

#[derive(Debug, Deserialize)]
struct TopicsPayload {
    theme: String,
    topics: Vec<TopicPayload>,
}

#[derive(Debug, Deserialize)]
struct TopicPayload {
    name: String,
    context: String,
    /// 缺省为 "General"
    #[serde(default = "default_subject")]
    subject: String,
    #[serde(default)]
    section: Option<String>,
    #[serde(default)]
    subsection: Option<String>,
}

/// 解码后的主题列表
#[derive(Debug, Clone, PartialEq)]
pub struct TopicList {
    pub theme: String,
    pub topics: Vec<Topic>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// 解码主题提取响应，并按顺序分配从 1 开始的编号
pub fn decode_topics(raw: &str) -> Decoded<TopicList> {
    let decoded = decode::<TopicsPayload>(raw).map(|payload| {
        let theme = payload.theme.trim().to_string();
        if theme.is_empty() {
            return Err("theme is empty".to_string());
        }

        let mut topics = Vec::with_capacity(payload.topics.len());
        for (index, topic) in payload.topics.into_iter().enumerate() {
            let name = topic.name.trim().to_string();
            if name.is_empty() {
                return Err(format!("topic #{} has an empty name", index + 1));
            }
            let subject = topic.subject.trim();
            let section = non_blank(topic.section);
            let subsection = section.as_ref().and(non_blank(topic.subsection));
            topics.push(Topic {
                id: (index + 1) as u32,
                name,
                context: topic.context.trim().to_string(),
                subject: if subject.is_empty() {
                    default_subject()
                } else {
                    subject.to_string()
                },
                section,
                subsection,
            });
        }

        Ok(TopicList { theme, topics })
    });

    with_raw(decoded, raw)
}

/// 智能模式第一阶段产物：原文中隐含或明确的问题
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct QuestionSet {
    pub questions: Vec<String>,
}

pub fn decode_questions(raw: &str) -> Decoded<QuestionSet> {
    let decoded = decode::<QuestionSet>(raw).map(|set| {
        let questions: Vec<String> = set
            .questions
            .into_iter()
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty())
            .collect();
        Ok(QuestionSet { questions })
    });
    with_raw(decoded, raw)
}

/// 层级整理计划
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HierarchyPlan {
    pub sections: Vec<SectionPlan>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SectionPlan {
    pub name: String,
    #[serde(default)]
    pub flashcard_ids: Vec<String>,
    #[serde(default)]
    pub subsections: Vec<SubsectionPlan>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SubsectionPlan {
    pub name: String,
    #[serde(default)]
    pub flashcard_ids: Vec<String>,
}

pub fn decode_hierarchy(raw: &str) -> Decoded<HierarchyPlan> {
    decode::<HierarchyPlan>(raw)
}

fn with_raw<T>(decoded: Decoded<T>, raw: &str) -> Decoded<T> {
    match decoded {
        Decoded::Invalid { reason, raw: r } if r.is_empty() => Decoded::Invalid {
            reason,
            raw: raw.to_string(),
        },
        other => other,
    }
}
