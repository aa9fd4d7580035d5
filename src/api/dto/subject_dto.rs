//! 学科 DTO

use serde::{Deserialize, Serialize};

use crate::models::cache::DistillSummary;

/// 学科摘要请求
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DistillSubjectRequest {
    /// 学习者的附加要求（按原文参与缓存键）
    pub user_prompt: String,
    pub regenerate: bool,
}

/// 重新生成参数
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RegenerateParams {
    pub regenerate: bool,
}

/// 学科统计
#[derive(Debug, Serialize)]
pub struct SubjectResponse {
    pub subject: String,
    pub flashcard_count: usize,
}

#[derive(Debug, Serialize)]
pub struct SubjectListResponse {
    pub subjects: Vec<SubjectResponse>,
}

#[derive(Debug, Serialize)]
pub struct DistillationListResponse {
    pub subject: String,
    pub distillations: Vec<DistillSummary>,
}
