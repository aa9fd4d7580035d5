use async_trait::async_trait;

use crate::error::{AppError, Result};

/// 按 id 寻址的持久化实体集合
#[async_trait]
pub trait Repository<T: Clone + Send + Sync + 'static>: Send + Sync {
    /// 实体名称，用于错误信息
    const ENTITY: &'static str;

    /// 创建实体；id 已存在时返回校验错误
    async fn create(&self, entity: &T) -> Result<T>;

    async fn get_by_id(&self, id: &str) -> Result<Option<T>>;

    /// 整体替换；id 与创建时间保持不变
    async fn update(&self, id: &str, entity: &T) -> Result<Option<T>>;

    async fn delete(&self, id: &str) -> Result<bool>;

    /// 分页列出，按创建顺序
    async fn list(&self, limit: usize, start: usize) -> Result<Vec<T>>;

    async fn count(&self) -> Result<usize>;

    /// 获取实体，不存在时返回 NotFound
    async fn require(&self, id: &str) -> Result<T> {
        self.get_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("{} not found: {}", Self::ENTITY, id)))
    }
}
