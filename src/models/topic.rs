use serde::{Deserialize, Serialize};

/// 未指定学科时使用的默认学科
pub const DEFAULT_SUBJECT: &str = "General";

/// 提取出的主题
///
/// 仅存在于一次提取响应中，由生成流程消费一次，不单独持久化。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Topic {
    /// 响应内的顺序编号（从 1 开始）
    pub id: u32,
    /// 主题名称
    pub name: String,
    /// 主题在原文中的上下文
    pub context: String,
    /// 所属学科
    pub subject: String,
    /// 章节
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    /// 小节
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subsection: Option<String>,
}

/// 提取结果
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Extraction {
    /// 整体主题
    pub theme: String,
    /// 有序主题列表
    pub topics: Vec<Topic>,
    /// 缓存键（指纹）
    pub cache_key: String,
    /// 是否命中缓存
    pub cached: bool,
}
