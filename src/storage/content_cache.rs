//! 内容缓存
//!
//! 每个条目一个 JSON 文件，启动时全部载入内存索引。

use dashmap::DashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::models::cache::{CacheEntry, CacheKind};
use crate::storage::fingerprint::is_valid_key;

pub struct ContentCache {
    dir: PathBuf,
    entries: DashMap<String, CacheEntry>,
}

impl ContentCache {
    /// 载入目录中的所有条目；无法解析的文件记录日志后跳过
    pub async fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir).await?;

        let entries = DashMap::new();
        let mut skipped = 0usize;
        let mut read_dir = tokio::fs::read_dir(&dir).await?;
        while let Some(item) = read_dir.next_entry().await? {
            let path = item.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            let bytes = match tokio::fs::read(&path).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable cache entry");
                    skipped += 1;
                    continue;
                }
            };

            match serde_json::from_slice::<CacheEntry>(&bytes) {
                Ok(entry) => {
                    entries.insert(entry.key.clone(), entry);
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping corrupt cache entry");
                    skipped += 1;
                }
            }
        }

        info!(
            dir = %dir.display(),
            loaded = entries.len(),
            skipped,
            "Content cache loaded"
        );

        Ok(Self { dir, entries })
    }

    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        self.entries.get(key).map(|e| e.value().clone())
    }

    /// 写入条目；文件落盘后才对读者可见
    pub async fn put(&self, entry: CacheEntry) -> Result<()> {
        let path = self.entry_path(&entry.key)?;
        let tmp = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(&entry)?;
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;

        debug!(key = %entry.key, kind = ?entry.kind, "Cache entry written");
        self.entries.insert(entry.key.clone(), entry);
        Ok(())
    }

    /// 删除条目，返回是否存在
    pub async fn delete(&self, key: &str) -> Result<bool> {
        if !is_valid_key(key) {
            return Ok(false);
        }

        let existed = self.entries.remove(key).is_some();
        match tokio::fs::remove_file(self.dir.join(format!("{}.json", key))).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        if existed {
            debug!(key = %key, "Cache entry deleted");
        }
        Ok(existed)
    }

    /// 按类别列出条目，最新的在前
    pub fn list(&self, kind: Option<CacheKind>) -> Vec<CacheEntry> {
        let mut entries: Vec<CacheEntry> = self
            .entries
            .iter()
            .filter(|e| kind.is_none_or(|k| e.value().kind == k))
            .map(|e| e.value().clone())
            .collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        entries
    }

    /// 列出某学科的派生产物
    pub fn list_for_subject(&self, kind: CacheKind, subject: &str) -> Vec<CacheEntry> {
        self.list(Some(kind))
            .into_iter()
            .filter(|e| e.subject() == Some(subject))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn entry_path(&self, key: &str) -> Result<PathBuf> {
        if !is_valid_key(key) {
            return Err(crate::error::AppError::Validation(format!(
                "Invalid cache key: {}",
                key
            )));
        }
        Ok(self.dir.join(format!("{}.json", key)))
    }
}
