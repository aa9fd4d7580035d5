//! 主题提取流程
//!
//! 输入先计算带命名空间的指纹并查缓存；未命中时调用 Oracle，
//! 严格解码后写入缓存。同一 (输入, 模式) 至多派生一次。

use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{AppError, Result};
use crate::models::cache::{CacheEntry, CacheKind, CachedArtifact, ExtractionMode};
use crate::models::topic::Extraction;
use crate::observability::AppMetrics;
use crate::oracle::{ImageInput, Oracle, OracleRequest};
use crate::services::parser::{QuestionSet, TopicList, decode_questions, decode_topics};
use crate::services::prompts;
use crate::storage::ContentCache;
use crate::storage::fingerprint::{bytes_fingerprint, normalize_text, text_fingerprint};

pub struct ExtractionPipeline {
    oracle: Arc<dyn Oracle>,
    cache: Arc<ContentCache>,
    metrics: Arc<AppMetrics>,
    max_output_tokens: u32,
}

impl ExtractionPipeline {
    pub fn new(
        oracle: Arc<dyn Oracle>,
        cache: Arc<ContentCache>,
        metrics: Arc<AppMetrics>,
        max_output_tokens: u32,
    ) -> Self {
        Self {
            oracle,
            cache,
            metrics,
            max_output_tokens,
        }
    }

    /// 提取文本主题，优先返回缓存
    pub async fn extract_text(&self, text: &str, mode: ExtractionMode) -> Result<Extraction> {
        let text = validated_text(text)?;
        let kind = CacheKind::for_mode(mode);
        let key = text_fingerprint(kind, &text);

        if let Some(entry) = self.lookup(&key) {
            return cached_extraction(&entry);
        }
        self.derive_text(&key, &text, mode).await
    }

    /// 删除缓存后重新提取
    pub async fn regenerate_text(&self, text: &str, mode: ExtractionMode) -> Result<Extraction> {
        let text = validated_text(text)?;
        let key = text_fingerprint(CacheKind::for_mode(mode), &text);
        self.cache.delete(&key).await?;
        info!(key = %key, ?mode, "Regenerating extraction");
        self.derive_text(&key, &text, mode).await
    }

    /// 提取图片主题
    pub async fn extract_image(&self, image: ImageInput) -> Result<Extraction> {
        let key = bytes_fingerprint(CacheKind::Image, image.bytes());
        if let Some(entry) = self.lookup(&key) {
            return cached_extraction(&entry);
        }
        self.derive_image(&key, image).await
    }

    pub async fn regenerate_image(&self, image: ImageInput) -> Result<Extraction> {
        let key = bytes_fingerprint(CacheKind::Image, image.bytes());
        self.cache.delete(&key).await?;
        info!(key = %key, "Regenerating image extraction");
        self.derive_image(&key, image).await
    }

    /// 智能模式第一阶段：提取原文隐含或明确的问题
    pub async fn extract_questions(&self, text: &str) -> Result<QuestionSet> {
        let request = OracleRequest::new(prompts::extraction_prompt(text), self.max_output_tokens)
            .with_instruction(prompts::questions_instruction());
        let raw = self.call(request).await?;
        let questions = decode_questions(&raw).into_result()?;
        debug!(count = questions.questions.len(), "Questions extracted");
        Ok(questions)
    }

    /// 智能模式第二阶段：以问题为条件生成主题
    pub async fn topics_for_questions(
        &self,
        text: &str,
        questions: &QuestionSet,
    ) -> Result<TopicList> {
        let request = OracleRequest::new(
            prompts::topics_for_questions_prompt(text, questions),
            self.max_output_tokens,
        )
        .with_instruction(prompts::extraction_instruction(ExtractionMode::Intelligent));
        let raw = self.call(request).await?;
        decode_topics(&raw).into_result()
    }

    fn lookup(&self, key: &str) -> Option<CacheEntry> {
        let entry = self.cache.get(key);
        self.metrics.record_cache_lookup(entry.is_some());
        if entry.is_some() {
            debug!(key = %key, "Extraction cache hit");
        }
        entry
    }

    async fn derive_text(&self, key: &str, text: &str, mode: ExtractionMode) -> Result<Extraction> {
        let list = match mode {
            ExtractionMode::Intelligent => {
                let questions = self.extract_questions(text).await?;
                self.topics_for_questions(text, &questions).await?
            }
            ExtractionMode::Default | ExtractionMode::Concise => {
                let request =
                    OracleRequest::new(prompts::extraction_prompt(text), self.max_output_tokens)
                        .with_instruction(prompts::extraction_instruction(mode));
                let raw = self.call(request).await?;
                decode_topics(&raw).into_result()?
            }
        };

        self.store(key, CacheKind::for_mode(mode), text, list).await
    }

    async fn derive_image(&self, key: &str, image: ImageInput) -> Result<Extraction> {
        let original_input = image.describe();
        let request = OracleRequest::new(prompts::image_prompt(), self.max_output_tokens)
            .with_instruction(prompts::image_instruction())
            .with_image(image);
        let raw = self.call(request).await?;
        let list = decode_topics(&raw).into_result()?;
        self.store(key, CacheKind::Image, &original_input, list).await
    }

    async fn store(
        &self,
        key: &str,
        kind: CacheKind,
        original_input: &str,
        list: TopicList,
    ) -> Result<Extraction> {
        let entry = CacheEntry::new(
            key,
            kind,
            original_input,
            CachedArtifact::Extraction {
                theme: list.theme.clone(),
                topics: list.topics.clone(),
            },
        );
        self.cache.put(entry).await?;
        info!(key = %key, topics = list.topics.len(), "Extraction cached");

        Ok(Extraction {
            theme: list.theme,
            topics: list.topics,
            cache_key: key.to_string(),
            cached: false,
        })
    }

    async fn call(&self, request: OracleRequest) -> Result<String> {
        let result = self.oracle.invoke(request).await;
        self.metrics.record_oracle_call(result.is_ok());
        result
    }
}

fn validated_text(text: &str) -> Result<String> {
    let text = normalize_text(text);
    if text.is_empty() {
        return Err(AppError::Validation("Text input is empty".to_string()));
    }
    Ok(text)
}

/// 缓存条目转换为提取结果
pub fn cached_extraction(entry: &CacheEntry) -> Result<Extraction> {
    match &entry.artifact {
        CachedArtifact::Extraction { theme, topics } => Ok(Extraction {
            theme: theme.clone(),
            topics: topics.clone(),
            cache_key: entry.key.clone(),
            cached: true,
        }),
        _ => Err(AppError::Internal(format!(
            "Cache entry {} does not hold an extraction",
            entry.key
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::MockOracle;
    use rstest::rstest;

    const PORTS_RESPONSE: &str = r#"```json
{"theme": "Network ports", "topics": [
  {"name": "SSH on port 22", "context": "SSH runs on port 22.", "subject": "Networking"},
  {"name": "Kafka on port 9092", "context": "Kafka uses port 9092.", "subject": "Messaging"}
]}
```"#;

    async fn pipeline(
        oracle: MockOracle,
        dir: &tempfile::TempDir,
    ) -> (ExtractionPipeline, Arc<ContentCache>) {
        let cache = Arc::new(ContentCache::load(dir.path()).await.unwrap());
        let pipeline = ExtractionPipeline::new(
            Arc::new(oracle),
            cache.clone(),
            Arc::new(AppMetrics::default()),
            2048,
        );
        (pipeline, cache)
    }

    #[rstest]
    #[case(ExtractionMode::Default)]
    #[case(ExtractionMode::Concise)]
    #[tokio::test]
    async fn test_second_extraction_is_cache_hit(#[case] mode: ExtractionMode) {
        let mut oracle = MockOracle::new();
        oracle
            .expect_invoke()
            .times(1)
            .returning(|_| Ok(PORTS_RESPONSE.to_string()));

        let dir = tempfile::tempdir().unwrap();
        let (pipeline, _) = pipeline(oracle, &dir).await;
        let text = "SSH runs on port 22. Kafka uses port 9092.";

        let first = pipeline.extract_text(text, mode).await.unwrap();
        let second = pipeline.extract_text(text, mode).await.unwrap();

        assert!(!first.cached);
        assert!(second.cached);
        assert_eq!(first.cache_key, second.cache_key);
        assert_eq!(first.theme, second.theme);
        assert_eq!(first.topics, second.topics);
    }

    #[tokio::test]
    async fn test_modes_do_not_share_entries() {
        let mut oracle = MockOracle::new();
        let mut calls = 0;
        oracle.expect_invoke().times(2).returning(move |_| {
            calls += 1;
            Ok(format!(
                r#"{{"theme": "run {}", "topics": [{{"name": "t", "context": "c"}}]}}"#,
                calls
            ))
        });

        let dir = tempfile::tempdir().unwrap();
        let (pipeline, cache) = pipeline(oracle, &dir).await;
        let text = "SSH runs on port 22.";

        let default = pipeline.extract_text(text, ExtractionMode::Default).await.unwrap();
        let concise = pipeline.extract_text(text, ExtractionMode::Concise).await.unwrap();

        assert_ne!(default.cache_key, concise.cache_key);
        assert_eq!(cache.len(), 2);
        let reread = pipeline.extract_text(text, ExtractionMode::Default).await.unwrap();
        assert_eq!(reread.theme, "run 1");
    }

    #[tokio::test]
    async fn test_delete_then_reextract_reproduces_key() {
        let mut oracle = MockOracle::new();
        oracle
            .expect_invoke()
            .times(2)
            .returning(|_| Ok(PORTS_RESPONSE.to_string()));

        let dir = tempfile::tempdir().unwrap();
        let (pipeline, cache) = pipeline(oracle, &dir).await;
        let text = "SSH runs on port 22. Kafka uses port 9092.";

        let first = pipeline.extract_text(text, ExtractionMode::Default).await.unwrap();
        assert!(cache.delete(&first.cache_key).await.unwrap());
        let second = pipeline.extract_text(text, ExtractionMode::Default).await.unwrap();

        assert!(!second.cached);
        assert_eq!(first.cache_key, second.cache_key);
    }

    #[tokio::test]
    async fn test_intelligent_mode_runs_two_stages() {
        let mut oracle = MockOracle::new();
        let mut seq = mockall::Sequence::new();
        oracle
            .expect_invoke()
            .withf(|r| {
                r.system_instruction
                    .as_deref()
                    .is_some_and(|i| i.starts_with("List the questions"))
            })
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(r#"{"questions": ["Which port does SSH use?"]}"#.to_string()));
        oracle
            .expect_invoke()
            .withf(|r| r.prompt.contains("1. Which port does SSH use?"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(PORTS_RESPONSE.to_string()));

        let dir = tempfile::tempdir().unwrap();
        let (pipeline, _) = pipeline(oracle, &dir).await;
        let result = pipeline
            .extract_text("SSH runs on port 22.", ExtractionMode::Intelligent)
            .await
            .unwrap();

        assert!(result.cache_key.starts_with("intelligent_"));
        assert_eq!(result.topics.len(), 2);
    }

    #[tokio::test]
    async fn test_parse_failure_is_terminal_and_not_cached() {
        let mut oracle = MockOracle::new();
        oracle
            .expect_invoke()
            .times(1)
            .returning(|_| Ok("Sure! Here are your topics: ...".to_string()));

        let dir = tempfile::tempdir().unwrap();
        let (pipeline, cache) = pipeline(oracle, &dir).await;
        let err = pipeline
            .extract_text("some notes", ExtractionMode::Default)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Parse { .. }));
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_empty_text_rejected_without_oracle_call() {
        let mut oracle = MockOracle::new();
        oracle.expect_invoke().times(0);

        let dir = tempfile::tempdir().unwrap();
        let (pipeline, _) = pipeline(oracle, &dir).await;
        let err = pipeline
            .extract_text("   \r\n ", ExtractionMode::Default)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_image_extraction_is_cached_by_bytes() {
        let mut oracle = MockOracle::new();
        oracle
            .expect_invoke()
            .withf(|r| r.image.is_some())
            .times(1)
            .returning(|_| Ok(PORTS_RESPONSE.to_string()));

        let dir = tempfile::tempdir().unwrap();
        let (pipeline, _) = pipeline(oracle, &dir).await;
        let image = ImageInput::new(vec![0x89, 0x50, 0x4e, 0x47], "image/png").unwrap();

        let first = pipeline.extract_image(image.clone()).await.unwrap();
        let second = pipeline.extract_image(image).await.unwrap();
        assert!(first.cache_key.starts_with("image_"));
        assert!(second.cached);
    }

    /// 每次调用返回不同主题名的 Oracle
    fn numbered_oracle(expected_calls: usize) -> MockOracle {
        let mut oracle = MockOracle::new();
        let mut calls = 0;
        oracle
            .expect_invoke()
            .times(expected_calls)
            .returning(move |_| {
                calls += 1;
                Ok(format!(
                    r#"{{"theme": "run {}", "topics": [{{"name": "t", "context": "c"}}]}}"#,
                    calls
                ))
            });
        oracle
    }

    #[tokio::test]
    async fn test_regenerate_text_replaces_cached_entry() {
        let dir = tempfile::tempdir().unwrap();
        let (pipeline, cache) = pipeline(numbered_oracle(2), &dir).await;
        let text = "SSH runs on port 22.";

        let first = pipeline.extract_text(text, ExtractionMode::Default).await.unwrap();
        assert_eq!(first.theme, "run 1");

        let regenerated = pipeline
            .regenerate_text(text, ExtractionMode::Default)
            .await
            .unwrap();
        assert!(!regenerated.cached);
        assert_eq!(regenerated.cache_key, first.cache_key);
        assert_eq!(regenerated.theme, "run 2");
        assert_eq!(cache.len(), 1);

        let reread = pipeline.extract_text(text, ExtractionMode::Default).await.unwrap();
        assert!(reread.cached);
        assert_eq!(reread.theme, "run 2");
    }

    #[tokio::test]
    async fn test_regenerate_image_replaces_cached_entry() {
        let dir = tempfile::tempdir().unwrap();
        let (pipeline, cache) = pipeline(numbered_oracle(2), &dir).await;
        let image = ImageInput::new(vec![0xff, 0xd8, 0xff, 0xe0], "image/jpeg").unwrap();

        let first = pipeline.extract_image(image.clone()).await.unwrap();
        let regenerated = pipeline.regenerate_image(image.clone()).await.unwrap();
        assert!(!regenerated.cached);
        assert_eq!(regenerated.cache_key, first.cache_key);
        assert_eq!(regenerated.theme, "run 2");
        assert_eq!(cache.len(), 1);

        let reread = pipeline.extract_image(image).await.unwrap();
        assert!(reread.cached);
        assert_eq!(reread.theme, "run 2");
    }
}
