//! 生成服务（Oracle）
//!
//! 外部文本/视觉生成协作方。本层只定义调用契约，不做自动重试。

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::config::OracleConfig;
use crate::error::{AppError, Result};

pub mod ollama;

pub use ollama::OllamaOracle;

/// 单张图片上限（5MB）
pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

/// 允许的图片格式
pub const ALLOWED_IMAGE_TYPES: &[&str] = &["image/png", "image/jpeg", "image/webp", "image/gif"];

/// 内联图片输入
#[derive(Debug, Clone, PartialEq)]
pub struct ImageInput {
    bytes: Vec<u8>,
    mime_type: String,
}

impl ImageInput {
    /// 校验大小与格式后创建
    pub fn new(bytes: Vec<u8>, mime_type: &str) -> Result<Self> {
        let mime_type = mime_type.trim().to_ascii_lowercase();
        if bytes.is_empty() {
            return Err(AppError::Validation("Image is empty".to_string()));
        }
        if bytes.len() > MAX_IMAGE_BYTES {
            return Err(AppError::Validation(format!(
                "Image is {} bytes, limit is {} bytes",
                bytes.len(),
                MAX_IMAGE_BYTES
            )));
        }
        if !ALLOWED_IMAGE_TYPES.contains(&mime_type.as_str()) {
            return Err(AppError::Validation(format!(
                "Unsupported image type: {}",
                mime_type
            )));
        }
        Ok(Self { bytes, mime_type })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// 缓存条目中记录的输入描述
    pub fn describe(&self) -> String {
        format!("{} ({} bytes)", self.mime_type, self.bytes.len())
    }
}

/// Oracle 请求
#[derive(Debug, Clone, PartialEq)]
pub struct OracleRequest {
    pub prompt: String,
    pub system_instruction: Option<String>,
    pub max_output_tokens: u32,
    pub image: Option<ImageInput>,
}

impl OracleRequest {
    pub fn new(prompt: impl Into<String>, max_output_tokens: u32) -> Self {
        Self {
            prompt: prompt.into(),
            system_instruction: None,
            max_output_tokens,
            image: None,
        }
    }

    pub fn with_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = Some(instruction.into());
        self
    }

    pub fn with_image(mut self, image: ImageInput) -> Self {
        self.image = Some(image);
        self
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Oracle: Send + Sync {
    /// 调用一次生成服务，返回文本
    async fn invoke(&self, request: OracleRequest) -> Result<String>;
}

/// 未配置后端时使用，所有调用均失败，已存储的数据仍可访问
pub struct DisabledOracle;

#[async_trait]
impl Oracle for DisabledOracle {
    async fn invoke(&self, _request: OracleRequest) -> Result<String> {
        Err(AppError::Oracle("No generation backend configured".to_string()))
    }
}

pub fn create_oracle(config: &OracleConfig) -> Result<Arc<dyn Oracle>> {
    match config.backend.as_str() {
        "ollama" => Ok(Arc::new(OllamaOracle::new(config)?)),
        "disabled" => Ok(Arc::new(DisabledOracle)),
        other => Err(AppError::Config(format!("Unknown oracle backend: {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_limits() {
        assert!(ImageInput::new(vec![1, 2, 3], "image/png").is_ok());
        assert!(ImageInput::new(vec![1, 2, 3], "IMAGE/JPEG").is_ok());
        assert!(matches!(
            ImageInput::new(vec![], "image/png"),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            ImageInput::new(vec![0; MAX_IMAGE_BYTES + 1], "image/png"),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            ImageInput::new(vec![1], "image/tiff"),
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_disabled_oracle_fails() {
        let oracle = DisabledOracle;
        let result = oracle.invoke(OracleRequest::new("hello", 10)).await;
        assert!(matches!(result, Err(AppError::Oracle(_))));
    }

    #[test]
    fn test_unknown_backend_rejected() {
        let config = OracleConfig {
            backend: "carrier-pigeon".into(),
            ..OracleConfig::default()
        };
        assert!(matches!(create_oracle(&config), Err(AppError::Config(_))));
    }
}
