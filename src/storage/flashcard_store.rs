//! 闪卡存储
//!
//! 单文件全量快照：启动时读取全部，每次变更后整体覆盖写入。
//! 内存索引为分片 map；对同一 id 的并发写入不做协调。

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{AppError, Result};
use crate::models::flashcard::{ChatMessage, Flashcard};
use crate::storage::repository::Repository;

/// 一次层级赋值：(闪卡 id, 章节, 小节)
pub type HierarchyAssignment = (String, String, Option<String>);

pub struct FlashcardStore {
    path: PathBuf,
    cards: DashMap<String, Flashcard>,
    flush_lock: Mutex<()>,
}

impl FlashcardStore {
    /// 读取快照；单条记录无法解析时记录日志后跳过
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let cards = DashMap::new();
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let raw: Vec<serde_json::Value> = serde_json::from_slice(&bytes)?;
                for value in raw {
                    match serde_json::from_value::<Flashcard>(value) {
                        Ok(card) => {
                            cards.insert(card.id.clone(), card);
                        }
                        Err(e) => warn!(error = %e, "Skipping corrupt flashcard record"),
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        info!(path = %path.display(), count = cards.len(), "Flashcard store loaded");

        Ok(Self {
            path,
            cards,
            flush_lock: Mutex::new(()),
        })
    }

    /// 全量覆盖写入快照
    pub async fn flush(&self) -> Result<()> {
        let _guard = self.flush_lock.lock().await;

        let snapshot = self.list_all();
        let bytes = serde_json::to_vec_pretty(&snapshot)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        debug!(count = snapshot.len(), "Flashcard snapshot written");
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<Flashcard> {
        self.cards.get(id).map(|c| c.value().clone())
    }

    /// 全部闪卡，按创建时间排序
    pub fn list_all(&self) -> Vec<Flashcard> {
        let mut cards: Vec<Flashcard> = self.cards.iter().map(|c| c.value().clone()).collect();
        cards.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        cards
    }

    pub fn list_by_subject(&self, subject: &str) -> Vec<Flashcard> {
        self.list_all()
            .into_iter()
            .filter(|c| c.subject == subject)
            .collect()
    }

    /// 学科及其闪卡数量
    pub fn subjects(&self) -> BTreeMap<String, usize> {
        let mut subjects = BTreeMap::new();
        for card in self.cards.iter() {
            *subjects.entry(card.subject.clone()).or_insert(0) += 1;
        }
        subjects
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    /// 修改单张闪卡并写入快照
    pub async fn modify<F>(&self, id: &str, f: F) -> Result<Flashcard>
    where
        F: FnOnce(&mut Flashcard),
    {
        let updated = {
            let mut card = self
                .cards
                .get_mut(id)
                .ok_or_else(|| AppError::NotFound(format!("Flashcard not found: {}", id)))?;
            f(card.value_mut());
            card.touch();
            card.value().clone()
        };
        self.flush().await?;
        Ok(updated)
    }

    /// 追加对话消息
    pub async fn append_chat(&self, id: &str, message: ChatMessage) -> Result<Flashcard> {
        self.modify(id, |card| card.chat_history.push(message)).await
    }

    /// 清空整个对话记录
    pub async fn clear_chat(&self, id: &str) -> Result<Flashcard> {
        self.modify(id, |card| card.chat_history.clear()).await
    }

    /// 批量应用层级赋值，存储中不存在的 id 被忽略；只写一次快照
    pub async fn assign_hierarchy(
        &self,
        assignments: &[HierarchyAssignment],
    ) -> Result<Vec<String>> {
        let mut updated = Vec::new();
        for (id, section, subsection) in assignments {
            if let Some(mut card) = self.cards.get_mut(id) {
                card.assign_hierarchy(section, subsection.as_deref());
                updated.push(id.clone());
            } else {
                debug!(id = %id, "Ignoring hierarchy assignment for unknown flashcard");
            }
        }
        if !updated.is_empty() {
            self.flush().await?;
        }
        Ok(updated)
    }
}

#[async_trait]
impl Repository<Flashcard> for FlashcardStore {
    const ENTITY: &'static str = "Flashcard";

    async fn create(&self, card: &Flashcard) -> Result<Flashcard> {
        if self.cards.contains_key(&card.id) {
            return Err(AppError::Validation(format!(
                "Flashcard already exists: {}",
                card.id
            )));
        }
        self.cards.insert(card.id.clone(), card.clone());
        self.flush().await?;
        Ok(card.clone())
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Flashcard>> {
        Ok(self.get(id))
    }

    async fn update(&self, id: &str, card: &Flashcard) -> Result<Option<Flashcard>> {
        let updated = {
            let Some(mut existing) = self.cards.get_mut(id) else {
                return Ok(None);
            };
            let mut next = card.clone();
            next.id = existing.id.clone();
            next.created_at = existing.created_at;
            next.touch();
            *existing = next;
            existing.clone()
        };
        self.flush().await?;
        Ok(Some(updated))
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let removed = self.cards.remove(id).is_some();
        if removed {
            self.flush().await?;
        }
        Ok(removed)
    }

    async fn list(&self, limit: usize, start: usize) -> Result<Vec<Flashcard>> {
        Ok(self.list_all().into_iter().skip(start).take(limit).collect())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.cards.len())
    }
}
