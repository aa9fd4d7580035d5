//! 蒸馏服务
//!
//! 把有界的持久化上下文汇总成一次 Oracle 调用：
//! 对话并入闪卡解释、学科摘要、学科播客脚本。后两者按内容指纹缓存。

use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{AppError, Result};
use crate::models::cache::{CacheEntry, CacheKind, CachedArtifact, DistillSummary, SubjectPodcast};
use crate::models::flashcard::Flashcard;
use crate::observability::AppMetrics;
use crate::oracle::{Oracle, OracleRequest};
use crate::services::prompts;
use crate::storage::fingerprint::{composite_fingerprint, text_fingerprint};
use crate::storage::{ContentCache, FlashcardStore};

/// 单次汇总最多纳入的闪卡数
const MAX_CONTEXT_CARDS: usize = 60;

pub struct Distiller {
    oracle: Arc<dyn Oracle>,
    cache: Arc<ContentCache>,
    store: Arc<FlashcardStore>,
    metrics: Arc<AppMetrics>,
    excerpt_chars: usize,
    max_output_tokens: u32,
}

impl Distiller {
    pub fn new(
        oracle: Arc<dyn Oracle>,
        cache: Arc<ContentCache>,
        store: Arc<FlashcardStore>,
        metrics: Arc<AppMetrics>,
        excerpt_chars: usize,
        max_output_tokens: u32,
    ) -> Self {
        Self {
            oracle,
            cache,
            store,
            metrics,
            excerpt_chars,
            max_output_tokens,
        }
    }

    /// 把对话内容并入闪卡解释；对话记录保持不变
    pub async fn distill_chat(&self, id: &str) -> Result<Flashcard> {
        let card = self
            .store
            .get(id)
            .ok_or_else(|| AppError::NotFound(format!("Flashcard not found: {}", id)))?;
        if card.chat_history.is_empty() {
            return Err(AppError::Validation(format!(
                "Flashcard {} has no chat history to distill",
                id
            )));
        }

        let request = OracleRequest::new(
            prompts::chat_distill_prompt(&card, prompts::recent_history(&card.chat_history)),
            self.max_output_tokens,
        )
        .with_instruction(prompts::chat_distill_instruction());
        let explanation = self.call(request).await?.trim().to_string();

        let updated = self
            .store
            .modify(id, |card| card.explanation = explanation)
            .await?;
        info!(id = %id, messages = updated.chat_history.len(), "Chat distilled into explanation");
        Ok(updated)
    }

    /// 学科摘要，按 (学科, 用户提示) 缓存
    pub async fn distill_subject(
        &self,
        subject: &str,
        user_prompt: &str,
        regenerate: bool,
    ) -> Result<DistillSummary> {
        let key = composite_fingerprint(CacheKind::Distillation, &[subject, user_prompt]);
        if regenerate {
            self.cache.delete(&key).await?;
        } else if let Some(summary) = self
            .lookup(&key)
            .and_then(|entry| DistillSummary::from_entry(&entry, true))
        {
            return Ok(summary);
        }

        let cards = self.subject_cards(subject)?;
        let request = OracleRequest::new(
            prompts::subject_distill_prompt(subject, &cards, user_prompt, self.excerpt_chars),
            self.max_output_tokens,
        )
        .with_instruction(prompts::subject_distill_instruction());
        let summary = self.call(request).await?.trim().to_string();

        let entry = CacheEntry::new(
            &key,
            CacheKind::Distillation,
            &format!("{}\n{}", subject, user_prompt),
            CachedArtifact::Distillation {
                subject: subject.to_string(),
                user_prompt: user_prompt.to_string(),
                summary,
            },
        );
        self.cache.put(entry.clone()).await?;
        info!(subject = %subject, key = %key, "Subject distilled");

        DistillSummary::from_entry(&entry, false)
            .ok_or_else(|| AppError::Internal("Distillation entry lost its artifact".to_string()))
    }

    /// 某学科的全部摘要，最新的在前
    pub fn list_distillations(&self, subject: &str) -> Vec<DistillSummary> {
        self.cache
            .list_for_subject(CacheKind::Distillation, subject)
            .iter()
            .filter_map(|entry| DistillSummary::from_entry(entry, true))
            .collect()
    }

    /// 学科播客脚本，按学科缓存
    pub async fn podcast_for_subject(
        &self,
        subject: &str,
        regenerate: bool,
    ) -> Result<SubjectPodcast> {
        let key = text_fingerprint(CacheKind::Podcast, subject);
        if regenerate {
            self.cache.delete(&key).await?;
        } else if let Some(podcast) = self
            .lookup(&key)
            .and_then(|entry| SubjectPodcast::from_entry(&entry, true))
        {
            return Ok(podcast);
        }

        let cards = self.subject_cards(subject)?;
        let request = OracleRequest::new(
            prompts::podcast_prompt(subject, &cards, self.excerpt_chars),
            self.max_output_tokens,
        )
        .with_instruction(prompts::podcast_instruction());
        let script = self.call(request).await?.trim().to_string();

        let entry = CacheEntry::new(
            &key,
            CacheKind::Podcast,
            subject,
            CachedArtifact::Podcast {
                subject: subject.to_string(),
                script,
            },
        );
        self.cache.put(entry.clone()).await?;
        info!(subject = %subject, key = %key, "Podcast script generated");

        SubjectPodcast::from_entry(&entry, false)
            .ok_or_else(|| AppError::Internal("Podcast entry lost its artifact".to_string()))
    }

    fn subject_cards(&self, subject: &str) -> Result<Vec<Flashcard>> {
        let mut cards = self.store.list_by_subject(subject);
        if cards.is_empty() {
            return Err(AppError::NotFound(format!(
                "No flashcards for subject: {}",
                subject
            )));
        }
        cards.truncate(MAX_CONTEXT_CARDS);
        Ok(cards)
    }

    fn lookup(&self, key: &str) -> Option<CacheEntry> {
        let entry = self.cache.get(key);
        self.metrics.record_cache_lookup(entry.is_some());
        if entry.is_some() {
            debug!(key = %key, "Distillation cache hit");
        }
        entry
    }

    async fn call(&self, request: OracleRequest) -> Result<String> {
        let result = self.oracle.invoke(request).await;
        self.metrics.record_oracle_call(result.is_ok());
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::flashcard::ChatMessage;
    use crate::oracle::MockOracle;
    use crate::storage::Repository;

    struct Fixture {
        _dir: tempfile::TempDir,
        cache: Arc<ContentCache>,
        store: Arc<FlashcardStore>,
    }

    async fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(ContentCache::load(dir.path().join("cache")).await.unwrap());
        let store = Arc::new(
            FlashcardStore::load(dir.path().join("flashcards.json"))
                .await
                .unwrap(),
        );
        Fixture {
            _dir: dir,
            cache,
            store,
        }
    }

    fn distiller(oracle: MockOracle, f: &Fixture) -> Distiller {
        Distiller::new(
            Arc::new(oracle),
            f.cache.clone(),
            f.store.clone(),
            Arc::new(AppMetrics::default()),
            200,
            2048,
        )
    }

    #[tokio::test]
    async fn test_distill_chat_replaces_explanation_keeps_history() {
        let f = fixture().await;
        let card = Flashcard::new("SSH", "Networking", "Old explanation");
        f.store.create(&card).await.unwrap();
        f.store
            .append_chat(&card.id, ChatMessage::user("Why port 22?"))
            .await
            .unwrap();
        f.store
            .append_chat(&card.id, ChatMessage::assistant("IANA assigned it."))
            .await
            .unwrap();

        let mut oracle = MockOracle::new();
        oracle
            .expect_invoke()
            .times(1)
            .returning(|_| Ok("  New explanation  ".to_string()));

        let updated = distiller(oracle, &f).distill_chat(&card.id).await.unwrap();
        assert_eq!(updated.explanation, "New explanation");
        assert_eq!(updated.chat_history.len(), 2);
    }

    #[tokio::test]
    async fn test_distill_chat_prompt_keeps_recent_window() {
        let f = fixture().await;
        let card = Flashcard::new("SSH", "Networking", "Old explanation");
        f.store.create(&card).await.unwrap();
        for i in 0..30 {
            f.store
                .append_chat(&card.id, ChatMessage::user(format!("question {:02}", i)))
                .await
                .unwrap();
        }

        let mut oracle = MockOracle::new();
        oracle
            .expect_invoke()
            .withf(|r| {
                !r.prompt.contains("question 09")
                    && r.prompt.contains("question 10")
                    && r.prompt.contains("question 29")
            })
            .times(1)
            .returning(|_| Ok("Merged".to_string()));

        let updated = distiller(oracle, &f).distill_chat(&card.id).await.unwrap();
        assert_eq!(updated.explanation, "Merged");
        assert_eq!(updated.chat_history.len(), 30);
    }

    #[tokio::test]
    async fn test_distill_chat_without_history_mutates_nothing() {
        let f = fixture().await;
        let card = Flashcard::new("SSH", "Networking", "Old explanation");
        f.store.create(&card).await.unwrap();

        let mut oracle = MockOracle::new();
        oracle.expect_invoke().times(0);

        let err = distiller(oracle, &f).distill_chat(&card.id).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(f.store.get(&card.id).unwrap(), card);
    }

    #[tokio::test]
    async fn test_subject_distillation_cached_per_prompt() {
        let f = fixture().await;
        f.store
            .create(&Flashcard::new("SSH", "Networking", "Port 22"))
            .await
            .unwrap();

        let mut oracle = MockOracle::new();
        oracle
            .expect_invoke()
            .times(2)
            .returning(|request| Ok(format!("Summary for {}", request.prompt.len())));
        let distiller = distiller(oracle, &f);

        let first = distiller.distill_subject("Networking", "focus on ports", false).await.unwrap();
        let again = distiller.distill_subject("Networking", "focus on ports", false).await.unwrap();
        let other = distiller.distill_subject("Networking", "exam review", false).await.unwrap();

        assert!(!first.cached);
        assert!(again.cached);
        assert_eq!(first.summary, again.summary);
        assert_eq!(first.cache_key, again.cache_key);
        assert_ne!(first.cache_key, other.cache_key);
        assert_eq!(distiller.list_distillations("Networking").len(), 2);
        assert!(distiller.list_distillations("Biology").is_empty());
    }

    #[tokio::test]
    async fn test_unknown_subject_is_not_found() {
        let f = fixture().await;
        let mut oracle = MockOracle::new();
        oracle.expect_invoke().times(0);
        let distiller = distiller(oracle, &f);

        assert!(matches!(
            distiller.distill_subject("Nothing", "", false).await.unwrap_err(),
            AppError::NotFound(_)
        ));
        assert!(matches!(
            distiller.podcast_for_subject("Nothing", false).await.unwrap_err(),
            AppError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_podcast_regenerate_replaces_cached_script() {
        let f = fixture().await;
        f.store
            .create(&Flashcard::new("SSH", "Networking", "Port 22"))
            .await
            .unwrap();

        let mut oracle = MockOracle::new();
        let mut seq = mockall::Sequence::new();
        oracle
            .expect_invoke()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok("Episode one".to_string()));
        oracle
            .expect_invoke()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok("Episode two".to_string()));
        let distiller = distiller(oracle, &f);

        let first = distiller.podcast_for_subject("Networking", false).await.unwrap();
        let cached = distiller.podcast_for_subject("Networking", false).await.unwrap();
        let fresh = distiller.podcast_for_subject("Networking", true).await.unwrap();

        assert_eq!(first.script, "Episode one");
        assert!(cached.cached);
        assert_eq!(fresh.script, "Episode two");
        assert_eq!(fresh.cache_key, first.cache_key);
        assert_eq!(f.cache.list(Some(CacheKind::Podcast)).len(), 1);
    }
}
