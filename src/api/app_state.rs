use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::error::Result;
use crate::observability::AppMetrics;
use crate::oracle::Oracle;
use crate::services::{
    ChatService, Distiller, ExtractionPipeline, GenerationPipeline, HierarchyOrganizer,
};
use crate::storage::{ContentCache, FlashcardStore};

/// Application state containing all shared stores and services
#[derive(Clone)]
pub struct AppState {
    /// Content-addressed cache of derived artifacts
    pub cache: Arc<ContentCache>,
    /// Flashcard snapshot store
    pub store: Arc<FlashcardStore>,
    pub extraction: Arc<ExtractionPipeline>,
    pub generation: Arc<GenerationPipeline>,
    pub organizer: Arc<HierarchyOrganizer>,
    pub distiller: Arc<Distiller>,
    pub chat: Arc<ChatService>,
    pub metrics: Arc<AppMetrics>,
    /// Fired on shutdown; streaming generation stops between batches
    pub shutdown: CancellationToken,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("cache_entries", &self.cache.len())
            .field("flashcards", &self.store.len())
            .field("shutdown", &self.shutdown.is_cancelled())
            .finish()
    }
}

impl AppState {
    /// Wire every service around one oracle and the two stores
    pub fn new(
        config: &AppConfig,
        oracle: Arc<dyn Oracle>,
        cache: Arc<ContentCache>,
        store: Arc<FlashcardStore>,
        metrics: Arc<AppMetrics>,
    ) -> Self {
        let max_tokens = config.oracle.max_output_tokens;
        Self {
            extraction: Arc::new(ExtractionPipeline::new(
                oracle.clone(),
                cache.clone(),
                metrics.clone(),
                max_tokens,
            )),
            generation: Arc::new(GenerationPipeline::new(
                oracle.clone(),
                store.clone(),
                metrics.clone(),
                config.generation.clone(),
            )),
            organizer: Arc::new(HierarchyOrganizer::new(
                oracle.clone(),
                store.clone(),
                metrics.clone(),
                config.organizer.clone(),
                max_tokens,
            )),
            distiller: Arc::new(Distiller::new(
                oracle.clone(),
                cache.clone(),
                store.clone(),
                metrics.clone(),
                config.organizer.excerpt_chars,
                max_tokens,
            )),
            chat: Arc::new(ChatService::new(oracle, store.clone(), metrics.clone(), max_tokens)),
            cache,
            store,
            metrics,
            shutdown: CancellationToken::new(),
        }
    }

    /// Load both stores from the configured data directory
    pub async fn load(
        config: &AppConfig,
        oracle: Arc<dyn Oracle>,
        metrics: Arc<AppMetrics>,
    ) -> Result<Self> {
        let cache = Arc::new(ContentCache::load(config.storage.cache_path()).await?);
        let store = Arc::new(FlashcardStore::load(config.storage.flashcards_path()).await?);
        Ok(Self::new(config, oracle, cache, store, metrics))
    }
}
