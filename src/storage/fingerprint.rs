//! 内容指纹
//!
//! 键格式为 `<prefix>_<sha256 hex>`。前缀同时参与摘要计算，
//! 因此不同类别的相同输入在键字符串和摘要两层都不会冲突。

use sha2::{Digest, Sha256};

use crate::models::cache::CacheKind;

/// 文本规范化：统一换行并去除首尾空白
pub fn normalize_text(text: &str) -> String {
    text.replace("\r\n", "\n").trim().to_string()
}

/// 文本输入指纹
pub fn text_fingerprint(kind: CacheKind, text: &str) -> String {
    bytes_fingerprint(kind, normalize_text(text).as_bytes())
}

/// 原始字节指纹（图片）
pub fn bytes_fingerprint(kind: CacheKind, bytes: &[u8]) -> String {
    let mut hasher = namespaced_hasher(kind);
    hasher.update(bytes);
    finish(kind, hasher)
}

/// 多段输入指纹，例如 (学科, 用户提示)
///
/// 每段带长度前缀，("ab", "c") 与 ("a", "bc") 得到不同的键。
pub fn composite_fingerprint(kind: CacheKind, parts: &[&str]) -> String {
    let mut hasher = namespaced_hasher(kind);
    for part in parts {
        hasher.update((part.len() as u64).to_le_bytes());
        hasher.update(part.as_bytes());
    }
    finish(kind, hasher)
}

/// 键只允许前缀字符和十六进制摘要，可安全用作文件名
pub fn is_valid_key(key: &str) -> bool {
    !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn namespaced_hasher(kind: CacheKind) -> Sha256 {
    let mut hasher = Sha256::new();
    hasher.update(kind.prefix().as_bytes());
    hasher.update([0u8]);
    hasher
}

fn finish(kind: CacheKind, hasher: Sha256) -> String {
    format!("{}_{}", kind.prefix(), hex::encode(hasher.finalize()))
}
