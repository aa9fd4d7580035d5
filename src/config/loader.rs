use crate::config::config::AppConfig;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use std::path::{Path, PathBuf};

const ENV_PREFIX: &str = "STUDYBUDDY_";

/// 选择内置默认值档位的环境变量
pub const PROFILE_ENV: &str = "STUDYBUDDY_PROFILE";

/// 配置加载器
pub struct ConfigLoader;

impl ConfigLoader {
    /// 从默认路径加载配置
    ///
    /// 合并顺序（后者覆盖前者）：
    /// 1. 内置默认值（由 `STUDYBUDDY_PROFILE` 选择 development / production）
    /// 2. ./studybuddy.toml
    /// 3. 环境变量 `STUDYBUDDY_<SECTION>__<KEY>`
    pub fn load() -> Result<AppConfig, figment::Error> {
        Self::load_from(default_config_path())
    }

    /// 从指定路径加载配置
    pub fn load_from(path: impl AsRef<Path>) -> Result<AppConfig, figment::Error> {
        Self::figment(path.as_ref()).extract()
    }

    fn figment(path: &Path) -> Figment {
        let profile = std::env::var(PROFILE_ENV).unwrap_or_default();
        Figment::from(Serialized::defaults(AppConfig::for_profile(&profile)))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).ignore(&["profile"]).split("__"))
    }

    /// 验证配置
    pub fn validate(config: &AppConfig) -> Result<(), ConfigValidationError> {
        if config.server.port == 0 {
            return Err(ConfigValidationError::InvalidPort);
        }

        if config.generation.batch_size == 0 {
            return Err(ConfigValidationError::InvalidBatchSize);
        }

        if config.organizer.subject_threshold < 2 {
            return Err(ConfigValidationError::InvalidThreshold(
                config.organizer.subject_threshold,
            ));
        }

        if config.oracle.backend != "disabled" && config.oracle.base_url.is_empty() {
            return Err(ConfigValidationError::MissingOracleUrl);
        }

        Ok(())
    }
}

/// 配置验证错误
#[derive(thiserror::Error, Debug)]
pub enum ConfigValidationError {
    #[error("服务端口无效，必须大于 0")]
    InvalidPort,

    #[error("批量大小无效，必须大于 0")]
    InvalidBatchSize,

    #[error("整理阈值无效: {0}（至少为 2）")]
    InvalidThreshold(usize),

    #[error("生成服务地址未配置")]
    MissingOracleUrl,
}

/// 获取默认配置文件路径
pub fn default_config_path() -> PathBuf {
    PathBuf::from("studybuddy.toml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_defaults_without_file() {
        Jail::expect_with(|_jail| {
            let config = ConfigLoader::load().expect("defaults load");
            assert_eq!(config.generation.batch_size, 5);
            assert_eq!(config.organizer.subject_threshold, 18);
            assert!(ConfigLoader::validate(&config).is_ok());
            Ok(())
        });
    }

    #[test]
    fn test_file_and_env_override() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "studybuddy.toml",
                r#"
                [server]
                port = 9000

                [oracle]
                model = "mistral"
                "#,
            )?;
            jail.set_env("STUDYBUDDY_ORACLE__MODEL", "qwen2");

            let config = ConfigLoader::load().expect("config load");
            assert_eq!(config.server.port, 9000);
            assert_eq!(config.oracle.model, "qwen2");
            assert_eq!(config.oracle.base_url, "http://localhost:11434");
            Ok(())
        });
    }

    #[test]
    fn test_validate_rejects_zero_batch() {
        let mut config = AppConfig::default();
        config.generation.batch_size = 0;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigValidationError::InvalidBatchSize)
        ));
    }

    #[test]
    fn test_profile_selects_preset_defaults() {
        Jail::expect_with(|jail| {
            jail.set_env(PROFILE_ENV, "production");
            let config = ConfigLoader::load().expect("production profile");
            assert!(config.logging.structured);
            assert_eq!(config.logging.log_dir, Some(PathBuf::from("./logs")));

            jail.set_env(PROFILE_ENV, "development");
            jail.create_file("studybuddy.toml", "[logging]\nstructured = true\n")?;
            let config = ConfigLoader::load().expect("development profile");
            assert_eq!(config.logging.level, "debug");
            assert!(config.logging.structured);
            Ok(())
        });
    }
}
