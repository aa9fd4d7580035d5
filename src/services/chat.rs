//! 闪卡对话
//!
//! 用户消息先落盘，再请求 Oracle；Oracle 失败时用户消息仍保留。

use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{AppError, Result};
use crate::models::flashcard::{ChatMessage, Flashcard};
use crate::observability::AppMetrics;
use crate::oracle::{Oracle, OracleRequest};
use crate::services::prompts;
use crate::storage::FlashcardStore;

#[derive(Debug, Clone, Serialize)]
pub struct ChatReply {
    pub reply: String,
    pub flashcard: Flashcard,
}

pub struct ChatService {
    oracle: Arc<dyn Oracle>,
    store: Arc<FlashcardStore>,
    metrics: Arc<AppMetrics>,
    max_output_tokens: u32,
}

impl ChatService {
    pub fn new(
        oracle: Arc<dyn Oracle>,
        store: Arc<FlashcardStore>,
        metrics: Arc<AppMetrics>,
        max_output_tokens: u32,
    ) -> Self {
        Self {
            oracle,
            store,
            metrics,
            max_output_tokens,
        }
    }

    pub async fn send(&self, id: &str, message: &str) -> Result<ChatReply> {
        let message = message.trim();
        if message.is_empty() {
            return Err(AppError::Validation("Chat message is empty".to_string()));
        }

        let card = self
            .store
            .get(id)
            .ok_or_else(|| AppError::NotFound(format!("Flashcard not found: {}", id)))?;
        let request = OracleRequest::new(
            prompts::chat_prompt(prompts::recent_history(&card.chat_history), message),
            self.max_output_tokens,
        )
        .with_instruction(prompts::chat_instruction(&card));

        self.store.append_chat(id, ChatMessage::user(message)).await?;

        let result = self.oracle.invoke(request).await;
        self.metrics.record_oracle_call(result.is_ok());
        let reply = match result {
            Ok(text) => text.trim().to_string(),
            Err(e) => {
                warn!(id = %id, error = %e, "Chat reply failed");
                return Err(e);
            }
        };

        let flashcard = self
            .store
            .append_chat(id, ChatMessage::assistant(reply.clone()))
            .await?;
        info!(id = %id, messages = flashcard.chat_history.len(), "Chat reply appended");
        Ok(ChatReply { reply, flashcard })
    }

    /// 清空对话记录
    pub async fn clear(&self, id: &str) -> Result<Flashcard> {
        self.store.clear_chat(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::flashcard::ChatRole;
    use crate::oracle::MockOracle;
    use crate::storage::Repository;

    async fn setup(
        oracle: MockOracle,
    ) -> (tempfile::TempDir, ChatService, Arc<FlashcardStore>, String) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(
            FlashcardStore::load(dir.path().join("flashcards.json"))
                .await
                .unwrap(),
        );
        let card = Flashcard::new("Kafka", "Streaming", "Kafka listens on 9092.");
        store.create(&card).await.unwrap();
        let service = ChatService::new(
            Arc::new(oracle),
            store.clone(),
            Arc::new(AppMetrics::default()),
            512,
        );
        (dir, service, store, card.id)
    }

    #[tokio::test]
    async fn test_send_appends_both_messages() {
        let mut oracle = MockOracle::new();
        oracle
            .expect_invoke()
            .withf(|r| r.prompt.ends_with("Student: Which port?"))
            .times(1)
            .returning(|_| Ok("9092 by default.".to_string()));
        let (_dir, service, _, id) = setup(oracle).await;

        let reply = service.send(&id, " Which port? ").await.unwrap();
        assert_eq!(reply.reply, "9092 by default.");
        let roles: Vec<ChatRole> = reply.flashcard.chat_history.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![ChatRole::User, ChatRole::Assistant]);
    }

    #[tokio::test]
    async fn test_user_message_kept_when_oracle_fails() {
        let mut oracle = MockOracle::new();
        oracle
            .expect_invoke()
            .returning(|_| Err(AppError::Oracle("unavailable".into())));
        let (_dir, service, store, id) = setup(oracle).await;

        let err = service.send(&id, "Which port?").await.unwrap_err();
        assert!(matches!(err, AppError::Oracle(_)));

        let history = store.get(&id).unwrap().chat_history;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].role, ChatRole::User);
    }

    #[tokio::test]
    async fn test_clear_and_validation() {
        let mut oracle = MockOracle::new();
        oracle.expect_invoke().returning(|_| Ok("ok".to_string()));
        let (_dir, service, _, id) = setup(oracle).await;

        service.send(&id, "hello").await.unwrap();
        assert!(service.clear(&id).await.unwrap().chat_history.is_empty());
        assert!(matches!(
            service.send(&id, "   ").await.unwrap_err(),
            AppError::Validation(_)
        ));
        assert!(matches!(
            service.send("card_missing", "hi").await.unwrap_err(),
            AppError::NotFound(_)
        ));
    }
}
