//! Ollama 生成客户端

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::config::config::OracleConfig;
use crate::error::{AppError, Result};
use crate::oracle::{Oracle, OracleRequest};

pub struct OllamaOracle {
    client: reqwest::Client,
    base_url: String,
    model: String,
    vision_model: String,
}

#[derive(Deserialize)]
struct OllamaGenerateResponse {
    #[serde(default)]
    response: String,
}

impl OllamaOracle {
    pub fn new(config: &OracleConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            vision_model: config.vision_model.clone(),
        })
    }

    fn build_body(&self, request: &OracleRequest) -> serde_json::Value {
        let model = if request.image.is_some() {
            &self.vision_model
        } else {
            &self.model
        };

        let mut body = serde_json::json!({
            "model": model,
            "prompt": request.prompt,
            "stream": false,
            "options": { "num_predict": request.max_output_tokens },
        });

        if let Some(obj) = body.as_object_mut() {
            if let Some(system) = &request.system_instruction {
                obj.insert("system".to_string(), serde_json::json!(system));
            }
            if let Some(image) = &request.image {
                obj.insert(
                    "images".to_string(),
                    serde_json::json!([STANDARD.encode(image.bytes())]),
                );
            }
        }

        body
    }
}

#[async_trait]
impl Oracle for OllamaOracle {
    async fn invoke(&self, request: OracleRequest) -> Result<String> {
        debug!(
            prompt_len = request.prompt.len(),
            has_image = request.image.is_some(),
            "Invoking ollama"
        );

        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&self.build_body(&request))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Oracle(format!(
                "Ollama generation failed ({}): {}",
                status, error_text
            )));
        }

        let body: OllamaGenerateResponse = response.json().await?;
        if body.response.trim().is_empty() {
            return Err(AppError::Oracle("Ollama returned an empty response".to_string()));
        }
        Ok(body.response)
    }
}
