use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// 服务地址
    pub host: String,
    /// 服务端口
    pub port: u16,
    /// 允许跨域的前端地址
    pub cors_origins: Vec<String>,
}

/// 存储配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// 数据根目录
    pub data_dir: PathBuf,
    /// 内容缓存目录名（每个条目一个文件）
    pub cache_dir: String,
    /// 闪卡快照文件名
    pub flashcards_file: String,
}

impl StorageConfig {
    pub fn cache_path(&self) -> PathBuf {
        self.data_dir.join(&self.cache_dir)
    }

    pub fn flashcards_path(&self) -> PathBuf {
        self.data_dir.join(&self.flashcards_file)
    }
}

/// 生成服务（Oracle）配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    /// 后端类型: "ollama" 或 "disabled"
    pub backend: String,
    /// 服务地址
    pub base_url: String,
    /// 文本模型
    pub model: String,
    /// 视觉模型（图片输入时使用）
    pub vision_model: String,
    /// 请求超时（秒）
    pub timeout_secs: u64,
    /// 默认最大输出 token 数
    pub max_output_tokens: u32,
}

/// 批量生成配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// 每批并发数量
    pub batch_size: usize,
    /// 批次间固定停顿（毫秒）
    pub batch_pause_ms: u64,
    /// 单张闪卡解释的最大输出 token 数
    pub explanation_max_tokens: u32,
}

/// 层级整理配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrganizerConfig {
    /// 学科闪卡数达到该阈值才会整理
    pub subject_threshold: usize,
    /// 提示中每张闪卡解释的截断长度（字符）
    pub excerpt_chars: usize,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 日志级别
    pub level: String,
    /// 结构化日志格式
    pub structured: bool,
    /// 日志文件目录（按天滚动）
    pub log_dir: Option<PathBuf>,
}

/// 应用配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// 服务器配置
    pub server: ServerConfig,
    /// 存储配置
    pub storage: StorageConfig,
    /// 生成服务配置
    pub oracle: OracleConfig,
    /// 批量生成配置
    pub generation: GenerationConfig,
    /// 层级整理配置
    pub organizer: OrganizerConfig,
    /// 日志配置
    pub logging: LoggingConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8000,
            cors_origins: vec!["http://localhost:5173".into()],
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            cache_dir: "cache".into(),
            flashcards_file: "flashcards.json".into(),
        }
    }
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            backend: "ollama".into(),
            base_url: "http://localhost:11434".into(),
            model: "llama3.1".into(),
            vision_model: "llava".into(),
            timeout_secs: 120,
            max_output_tokens: 4096,
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            batch_size: 5,
            batch_pause_ms: 500,
            explanation_max_tokens: 1024,
        }
    }
}

impl Default for OrganizerConfig {
    fn default() -> Self {
        Self {
            subject_threshold: 18,
            excerpt_chars: 200,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            structured: false,
            log_dir: None,
        }
    }
}

impl AppConfig {
    /// 创建开发环境配置
    pub fn development() -> Self {
        let mut config = Self::default();
        config.logging.level = "debug".into();
        config
    }

    /// 创建生产环境配置
    pub fn production() -> Self {
        let mut config = Self::default();
        config.logging.structured = true;
        config.logging.log_dir = Some(PathBuf::from("./logs"));
        config
    }

    /// 按运行档位选择内置默认值，未知档位使用 `Default`
    pub fn for_profile(profile: &str) -> Self {
        match profile.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Self::development(),
            "production" | "prod" => Self::production(),
            _ => Self::default(),
        }
    }
}
