//! 可观测性模块
//!
//! 提供 Prometheus 格式指标、结构化日志和健康检查。

use axum::{Json, Router, extract::State, response::IntoResponse, routing::get};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::config::LoggingConfig;
use crate::storage::{ContentCache, FlashcardStore};

// ===== Simple Metrics =====

/// 应用指标
#[derive(Default)]
pub struct AppMetrics {
    pub oracle_calls_total: AtomicU64,
    pub oracle_failures_total: AtomicU64,
    pub cache_hits_total: AtomicU64,
    pub cache_misses_total: AtomicU64,
    pub flashcards_generated_total: AtomicU64,
}

impl AppMetrics {
    /// 记录一次 Oracle 调用
    pub fn record_oracle_call(&self, success: bool) {
        self.oracle_calls_total.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.oracle_failures_total.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// 记录缓存查询
    pub fn record_cache_lookup(&self, hit: bool) {
        if hit {
            self.cache_hits_total.fetch_add(1, Ordering::Relaxed);
        } else {
            self.cache_misses_total.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_flashcard_generated(&self) {
        self.flashcards_generated_total.fetch_add(1, Ordering::Relaxed);
    }

    /// 生成 Prometheus 格式指标
    pub fn gather(&self) -> String {
        format!(
            r#"# HELP oracle_calls_total Total generation backend calls
# TYPE oracle_calls_total counter
oracle_calls_total {}
# HELP oracle_failures_total Failed generation backend calls
# TYPE oracle_failures_total counter
oracle_failures_total {}
# HELP cache_hits_total Content cache hits
# TYPE cache_hits_total counter
cache_hits_total {}
# HELP cache_misses_total Content cache misses
# TYPE cache_misses_total counter
cache_misses_total {}
# HELP flashcards_generated_total Flashcards produced by the generation pipeline
# TYPE flashcards_generated_total counter
flashcards_generated_total {}
"#,
            self.oracle_calls_total.load(Ordering::Relaxed),
            self.oracle_failures_total.load(Ordering::Relaxed),
            self.cache_hits_total.load(Ordering::Relaxed),
            self.cache_misses_total.load(Ordering::Relaxed),
            self.flashcards_generated_total.load(Ordering::Relaxed),
        )
    }
}

// ===== Health Check =====

/// 健康检查状态
#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: String,
    pub timestamp: String,
    pub version: String,
    pub uptime_seconds: f64,
    pub flashcards: usize,
    pub cache_entries: usize,
}

/// 可观测性状态
#[derive(Clone)]
pub struct ObservabilityState {
    pub metrics: Arc<AppMetrics>,
    pub cache: Arc<ContentCache>,
    pub store: Arc<FlashcardStore>,
    pub start_time: DateTime<Utc>,
    pub version: String,
}

impl ObservabilityState {
    pub fn new(
        version: String,
        metrics: Arc<AppMetrics>,
        cache: Arc<ContentCache>,
        store: Arc<FlashcardStore>,
    ) -> Self {
        Self {
            metrics,
            cache,
            store,
            start_time: Utc::now(),
            version,
        }
    }

    /// 获取应用正常运行时间
    pub fn uptime_seconds(&self) -> f64 {
        (Utc::now() - self.start_time).num_seconds() as f64
    }
}

/// 获取健康状态
pub async fn health_check(State(state): State<Arc<ObservabilityState>>) -> impl IntoResponse {
    Json(HealthStatus {
        status: "healthy".to_string(),
        timestamp: Utc::now().to_rfc3339(),
        version: state.version.clone(),
        uptime_seconds: state.uptime_seconds(),
        flashcards: state.store.len(),
        cache_entries: state.cache.len(),
    })
}

/// Prometheus 指标端点
pub async fn metrics(State(state): State<Arc<ObservabilityState>>) -> impl IntoResponse {
    state.metrics.gather()
}

/// 版本信息端点
pub async fn version(State(state): State<Arc<ObservabilityState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "version": state.version,
        "uptime_seconds": state.uptime_seconds(),
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

/// 创建可观测性路由
pub fn create_observability_router(state: Arc<ObservabilityState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .route("/version", get(version))
        .with_state(state)
}

// ===== Structured Logging =====

/// 初始化结构化日志
///
/// RUST_LOG 优先于配置的级别。配置了 `log_dir` 时额外按天写入文件，
/// 返回的 guard 需要在进程生命周期内保持存活。
pub fn init_tracing(config: &LoggingConfig) -> Option<WorkerGuard> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("{},studybuddy={}", config.level, config.level))
    });

    let (file_layer, guard) = match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "studybuddy.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().json().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let registry = tracing_subscriber::registry().with(env_filter).with(file_layer);

    let result = if config.structured {
        registry
            .with(fmt::layer().json().with_target(true).with_line_number(true))
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_target(true).with_line_number(true))
            .try_init()
    };

    if let Err(e) = result {
        eprintln!("tracing subscriber already installed: {}", e);
    }

    guard
}
