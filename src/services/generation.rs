//! 闪卡批量生成
//!
//! 主题按固定大小分批；批内每个主题并发调用一次 Oracle，整批结束并停顿后
//! 才开始下一批。单个主题失败只会得到一张带错误说明的闪卡。
//! 每张闪卡在其调用返回的那一刻写入存储。

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::config::GenerationConfig;
use crate::error::{AppError, Result};
use crate::models::flashcard::Flashcard;
use crate::models::topic::Topic;
use crate::observability::AppMetrics;
use crate::oracle::{Oracle, OracleRequest};
use crate::services::prompts;
use crate::storage::{FlashcardStore, Repository};

/// 进度事件（按 NDJSON 逐行输出）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GenerationEvent {
    Start {
        total: usize,
    },
    BatchStart {
        batch_index: usize,
        topic_names: Vec<String>,
        topic_ids: Vec<u32>,
    },
    Progress {
        completed: usize,
        total: usize,
        topic: String,
        subject: String,
    },
    Complete {
        total: usize,
    },
    Cancelled {
        completed: usize,
        total: usize,
    },
    /// 最终快照写入失败；闪卡仍在内存中，但可能未落盘
    Failed {
        completed: usize,
        total: usize,
        error: String,
    },
}

pub struct GenerationPipeline {
    oracle: Arc<dyn Oracle>,
    store: Arc<FlashcardStore>,
    metrics: Arc<AppMetrics>,
    config: GenerationConfig,
}

/// 单次运行的共享进度
struct RunState<'a> {
    total: usize,
    theme: Option<&'a str>,
    completed: AtomicUsize,
    persist_failed: AtomicBool,
    events: Option<&'a UnboundedSender<GenerationEvent>>,
}

impl RunState<'_> {
    fn emit(&self, event: GenerationEvent) {
        if let Some(tx) = self.events {
            // 接收端断开只停止投递，不影响生成与持久化
            if tx.send(event).is_err() {
                debug!("Generation event receiver dropped");
            }
        }
    }
}

impl GenerationPipeline {
    pub fn new(
        oracle: Arc<dyn Oracle>,
        store: Arc<FlashcardStore>,
        metrics: Arc<AppMetrics>,
        config: GenerationConfig,
    ) -> Self {
        Self {
            oracle,
            store,
            metrics,
            config,
        }
    }

    /// 为每个主题生成一张闪卡
    pub async fn generate(
        &self,
        topics: Vec<Topic>,
        theme: Option<String>,
    ) -> Result<Vec<Flashcard>> {
        validate_topics(&topics)?;
        self.run(&topics, theme.as_deref(), None, &CancellationToken::new())
            .await
    }

    /// 流式生成
    ///
    /// 生成在独立任务中运行；丢弃接收端不会取消生成，只有 `cancel` 会在批次之间停止。
    pub fn generate_stream(
        self: &Arc<Self>,
        topics: Vec<Topic>,
        theme: Option<String>,
        cancel: CancellationToken,
    ) -> Result<UnboundedReceiver<GenerationEvent>> {
        validate_topics(&topics)?;

        let (tx, rx) = unbounded_channel();
        let pipeline = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = pipeline
                .run(&topics, theme.as_deref(), Some(&tx), &cancel)
                .await
            {
                error!(error = %e, "Streaming generation failed");
            }
        });
        Ok(rx)
    }

    async fn run(
        &self,
        topics: &[Topic],
        theme: Option<&str>,
        events: Option<&UnboundedSender<GenerationEvent>>,
        cancel: &CancellationToken,
    ) -> Result<Vec<Flashcard>> {
        let state = RunState {
            total: topics.len(),
            theme,
            completed: AtomicUsize::new(0),
            persist_failed: AtomicBool::new(false),
            events,
        };
        let batch_size = self.config.batch_size.max(1);
        let pause = Duration::from_millis(self.config.batch_pause_ms);

        info!(total = state.total, batch_size, "Starting flashcard generation");
        state.emit(GenerationEvent::Start { total: state.total });

        let mut cards = Vec::with_capacity(state.total);
        for (batch_index, batch) in topics.chunks(batch_size).enumerate() {
            if batch_index > 0 {
                tokio::time::sleep(pause).await;
            }
            if cancel.is_cancelled() {
                let completed = state.completed.load(Ordering::SeqCst);
                info!(
                    completed,
                    total = state.total,
                    "Generation cancelled between batches"
                );
                state.emit(GenerationEvent::Cancelled {
                    completed,
                    total: state.total,
                });
                return Ok(cards);
            }

            state.emit(GenerationEvent::BatchStart {
                batch_index,
                topic_names: batch.iter().map(|t| t.name.clone()).collect(),
                topic_ids: batch.iter().map(|t| t.id).collect(),
            });
            debug!(batch_index, size = batch.len(), "Batch started");

            let results =
                join_all(batch.iter().map(|topic| self.generate_one(topic, &state))).await;
            cards.extend(results);
        }

        if state.persist_failed.load(Ordering::SeqCst) {
            // 之前的快照写入失败，完成前再整体写一次
            if let Err(e) = self.store.flush().await {
                state.emit(GenerationEvent::Failed {
                    completed: state.completed.load(Ordering::SeqCst),
                    total: state.total,
                    error: e.to_string(),
                });
                return Err(e);
            }
        }

        info!(total = state.total, "Flashcard generation complete");
        state.emit(GenerationEvent::Complete { total: state.total });
        Ok(cards)
    }

    async fn generate_one(&self, topic: &Topic, state: &RunState<'_>) -> Flashcard {
        let request = OracleRequest::new(
            prompts::explanation_prompt(topic, state.theme),
            self.config.explanation_max_tokens,
        )
        .with_instruction(prompts::explanation_instruction());

        let result = self.oracle.invoke(request).await;
        self.metrics.record_oracle_call(result.is_ok());

        let explanation = match result {
            Ok(text) => text.trim().to_string(),
            Err(e) => {
                warn!(topic = %topic.name, error = %e, "Explanation generation failed");
                render_failure(topic, &e)
            }
        };

        let card = Flashcard::from_topic(topic, &explanation, state.theme);
        if let Err(e) = self.store.create(&card).await {
            error!(id = %card.id, error = %e, "Failed to persist flashcard");
            state.persist_failed.store(true, Ordering::SeqCst);
        }
        self.metrics.record_flashcard_generated();

        let completed = state.completed.fetch_add(1, Ordering::SeqCst) + 1;
        state.emit(GenerationEvent::Progress {
            completed,
            total: state.total,
            topic: card.topic.clone(),
            subject: card.subject.clone(),
        });
        card
    }
}

fn validate_topics(topics: &[Topic]) -> Result<()> {
    if topics.is_empty() {
        return Err(AppError::Validation("At least one topic is required".to_string()));
    }
    if let Some(topic) = topics.iter().find(|t| t.name.trim().is_empty()) {
        return Err(AppError::Validation(format!(
            "Topic #{} has an empty name",
            topic.id
        )));
    }
    Ok(())
}

fn render_failure(topic: &Topic, error: &AppError) -> String {
    format!(
        "**Error generating explanation for \"{}\".**\n\n{}\n\nRegenerate this flashcard to try again.",
        topic.name, error
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::MockOracle;

    fn topics(n: usize) -> Vec<Topic> {
        (1..=n)
            .map(|i| Topic {
                id: i as u32,
                name: format!("Topic {}", i),
                context: format!("Context {}", i),
                subject: if i % 2 == 0 { "Even".into() } else { "Odd".into() },
                section: None,
                subsection: None,
            })
            .collect()
    }

    async fn pipeline(
        oracle: MockOracle,
        dir: &tempfile::TempDir,
    ) -> (Arc<GenerationPipeline>, Arc<FlashcardStore>) {
        pipeline_at(oracle, dir.path().join("flashcards.json")).await
    }

    async fn pipeline_at(
        oracle: MockOracle,
        path: std::path::PathBuf,
    ) -> (Arc<GenerationPipeline>, Arc<FlashcardStore>) {
        let store = Arc::new(FlashcardStore::load(path).await.unwrap());
        let config = GenerationConfig {
            batch_size: 5,
            batch_pause_ms: 1,
            explanation_max_tokens: 256,
        };
        let pipeline = Arc::new(GenerationPipeline::new(
            Arc::new(oracle),
            store.clone(),
            Arc::new(AppMetrics::default()),
            config,
        ));
        (pipeline, store)
    }

    #[tokio::test]
    async fn test_failures_still_yield_one_card_per_topic() {
        let mut oracle = MockOracle::new();
        oracle.expect_invoke().times(7).returning(|request| {
            let prompt = &request.prompt;
            if prompt.contains("Topic 3\n") || prompt.contains("Topic 6\n") {
                Err(AppError::Oracle("rate limited".into()))
            } else {
                Ok("An explanation".to_string())
            }
        });

        let dir = tempfile::tempdir().unwrap();
        let (pipeline, store) = pipeline(oracle, &dir).await;
        let cards = pipeline
            .generate(topics(7), Some("Theme".into()))
            .await
            .unwrap();

        assert_eq!(cards.len(), 7);
        assert_eq!(store.len(), 7);
        let failed: Vec<_> = cards
            .iter()
            .filter(|c| c.explanation.contains("Error generating explanation"))
            .collect();
        assert_eq!(failed.len(), 2);
        assert!(cards.iter().all(|c| c.origin_theme.as_deref() == Some("Theme")));
    }

    #[tokio::test]
    async fn test_stream_emits_batches_and_single_complete() {
        let mut oracle = MockOracle::new();
        oracle
            .expect_invoke()
            .times(12)
            .returning(|_| Ok("Explained".to_string()));

        let dir = tempfile::tempdir().unwrap();
        let (pipeline, store) = pipeline(oracle, &dir).await;
        let mut rx = pipeline
            .generate_stream(topics(12), None, CancellationToken::new())
            .unwrap();

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }

        assert_eq!(events.first(), Some(&GenerationEvent::Start { total: 12 }));
        assert_eq!(events.last(), Some(&GenerationEvent::Complete { total: 12 }));

        let batch_sizes: Vec<usize> = events
            .iter()
            .filter_map(|e| match e {
                GenerationEvent::BatchStart { topic_ids, .. } => Some(topic_ids.len()),
                _ => None,
            })
            .collect();
        assert_eq!(batch_sizes, vec![5, 5, 2]);

        let progress: Vec<usize> = events
            .iter()
            .filter_map(|e| match e {
                GenerationEvent::Progress { completed, .. } => Some(*completed),
                _ => None,
            })
            .collect();
        assert_eq!(progress, (1..=12).collect::<Vec<_>>());
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(e, GenerationEvent::Complete { .. }))
                .count(),
            1
        );
        assert_eq!(store.len(), 12);
    }

    #[tokio::test]
    async fn test_dropped_receiver_does_not_stop_generation() {
        let mut oracle = MockOracle::new();
        oracle
            .expect_invoke()
            .times(6)
            .returning(|_| Ok("Explained".to_string()));

        let dir = tempfile::tempdir().unwrap();
        let (pipeline, store) = pipeline(oracle, &dir).await;
        let rx = pipeline
            .generate_stream(topics(6), None, CancellationToken::new())
            .unwrap();
        drop(rx);

        for _ in 0..200 {
            if store.len() == 6 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(store.len(), 6);
    }

    #[tokio::test]
    async fn test_cancellation_stops_between_batches() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let mut oracle = MockOracle::new();
        oracle.expect_invoke().times(5).returning(move |_| {
            trigger.cancel();
            Ok("Explained".to_string())
        });

        let dir = tempfile::tempdir().unwrap();
        let (pipeline, store) = pipeline(oracle, &dir).await;
        let mut rx = pipeline.generate_stream(topics(12), None, cancel).unwrap();

        let mut last = None;
        while let Some(event) = rx.recv().await {
            last = Some(event);
        }
        assert_eq!(
            last,
            Some(GenerationEvent::Cancelled {
                completed: 5,
                total: 12
            })
        );
        assert_eq!(store.len(), 5);
    }

    #[tokio::test]
    async fn test_stream_reports_failed_final_save() {
        let mut oracle = MockOracle::new();
        oracle
            .expect_invoke()
            .times(3)
            .returning(|_| Ok("Explained".to_string()));

        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().join("data");
        let (pipeline, store) = pipeline_at(oracle, data_dir.join("flashcards.json")).await;
        std::fs::remove_dir_all(&data_dir).unwrap();

        let mut rx = pipeline
            .generate_stream(topics(3), None, CancellationToken::new())
            .unwrap();
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }

        assert!(!events.iter().any(|e| matches!(e, GenerationEvent::Complete { .. })));
        assert!(matches!(
            events.last(),
            Some(GenerationEvent::Failed {
                completed: 3,
                total: 3,
                ..
            })
        ));
        assert_eq!(store.len(), 3);
    }

    #[tokio::test]
    async fn test_empty_topics_rejected() {
        let oracle = MockOracle::new();
        let dir = tempfile::tempdir().unwrap();
        let (pipeline, _) = pipeline(oracle, &dir).await;
        let err = pipeline.generate(vec![], None).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
