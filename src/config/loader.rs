use crate::config::config::AppConfig;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use std::path::PathBuf;

/// 环境变量前缀
pub const ENV_PREFIX: &str = "BOQMATE_";

/// 时长类配置（限流窗口、令牌有效期）的上限：十年
pub const MAX_DURATION_SECONDS: u64 = 10 * 365 * 24 * 60 * 60;

/// 配置加载器
pub struct ConfigLoader;

impl ConfigLoader {
    /// 从默认路径加载配置
    ///
    /// 合并顺序（后者覆盖前者）：
    /// 1. 内置默认值
    /// 2. `BOQMATE_CONFIG` 指定的文件，或 ./boqmate.toml
    /// 3. `BOQMATE_` 前缀环境变量（嵌套字段用 `__` 分隔，如 `BOQMATE_SECURITY__JWT_SECRET`）
    pub fn load() -> Result<AppConfig, figment::Error> {
        let path = std::env::var("BOQMATE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_config_path());
        Self::load_from(path)
    }

    /// 从指定路径加载配置
    pub fn load_from(path: PathBuf) -> Result<AppConfig, figment::Error> {
        Self::figment(path).extract()
    }

    fn figment(path: PathBuf) -> Figment {
        Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// 验证配置
    pub fn validate(config: &AppConfig) -> Result<(), ConfigValidationError> {
        if config.server.port == 0 {
            return Err(ConfigValidationError::InvalidPort);
        }

        if config.security.jwt_secret.is_empty() {
            return Err(ConfigValidationError::MissingSecret);
        }

        let window = config.security.rate_limit_window_seconds;
        if config.security.rate_limit_requests == 0 || window == 0 || window > MAX_DURATION_SECONDS {
            return Err(ConfigValidationError::InvalidRateLimit);
        }

        let expiry = config.security.jwt_expiry_seconds;
        if expiry == 0 || expiry > MAX_DURATION_SECONDS {
            return Err(ConfigValidationError::InvalidTokenExpiry(expiry));
        }

        if config.upload.max_file_size == 0 {
            return Err(ConfigValidationError::InvalidUploadSize);
        }

        if config.upload.allowed_extensions.is_empty() {
            return Err(ConfigValidationError::NoAllowedExtensions);
        }

        if !config.upload.route.starts_with('/') {
            return Err(ConfigValidationError::InvalidPath(config.upload.route.clone()));
        }

        Ok(())
    }

    /// 检查合法但有风险的配置，返回告警信息
    pub fn warnings(config: &AppConfig) -> Vec<String> {
        let mut warnings = Vec::new();

        if !config.security.has_custom_secret() {
            warnings.push("security.jwt_secret should be changed from the default value".to_string());
        }

        if config.security.rate_limit_requests > 1000 {
            warnings.push("security.rate_limit_requests is very high, consider reducing".to_string());
        }

        if config.upload.max_file_size > 100 * 1024 * 1024 {
            warnings.push("upload.max_file_size is very large, consider reducing".to_string());
        }

        if config.security.trust_forwarded_header {
            warnings.push(format!(
                "client identity is taken from the {} header; deploy behind a proxy that overwrites it",
                config.security.forwarded_header
            ));
        }

        warnings
    }
}

/// 配置验证错误
#[derive(thiserror::Error, Debug)]
pub enum ConfigValidationError {
    #[error("服务端口无效，必须大于 0")]
    InvalidPort,

    #[error("签名密钥未配置")]
    MissingSecret,

    #[error("限流配置无效，请求数必须大于 0，窗口必须在 1 到 {MAX_DURATION_SECONDS} 秒之间")]
    InvalidRateLimit,

    #[error("令牌有效期无效: {0}，必须在 1 到 {MAX_DURATION_SECONDS} 秒之间")]
    InvalidTokenExpiry(u64),

    #[error("上传大小上限无效，必须大于 0")]
    InvalidUploadSize,

    #[error("未配置允许的文件扩展名")]
    NoAllowedExtensions,

    #[error("配置路径无效: {0}")]
    InvalidPath(String),
}

/// 获取默认配置文件路径
pub fn default_config_path() -> PathBuf {
    PathBuf::from("boqmate.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(ConfigLoader::validate(&config).is_ok());
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = ConfigLoader::load_from(PathBuf::from("does-not-exist.toml")).unwrap();
        assert_eq!(config.upload.max_file_size, 50 * 1024 * 1024);
        assert_eq!(config.security.rate_limit_window_seconds, 3600);
    }

    #[test]
    fn test_zero_rate_limit_is_rejected() {
        let mut config = AppConfig::default();
        config.security.rate_limit_requests = 0;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigValidationError::InvalidRateLimit)
        ));
    }

    #[test]
    fn test_unrepresentable_durations_are_rejected() {
        let mut config = AppConfig::default();
        config.security.rate_limit_window_seconds = u64::MAX;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigValidationError::InvalidRateLimit)
        ));

        let mut config = AppConfig::default();
        config.security.jwt_expiry_seconds = u64::MAX;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigValidationError::InvalidTokenExpiry(u64::MAX))
        ));

        let mut config = AppConfig::default();
        config.security.rate_limit_window_seconds = MAX_DURATION_SECONDS;
        config.security.jwt_expiry_seconds = MAX_DURATION_SECONDS;
        assert!(ConfigLoader::validate(&config).is_ok());
    }

    #[test]
    fn test_empty_secret_is_rejected() {
        let mut config = AppConfig::default();
        config.security.jwt_secret.clear();
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigValidationError::MissingSecret)
        ));
    }

    #[test]
    fn test_default_secret_produces_warning() {
        let config = AppConfig::default();
        let warnings = ConfigLoader::warnings(&config);
        assert!(warnings.iter().any(|w| w.contains("jwt_secret")));

        let mut config = AppConfig::default();
        config.security.jwt_secret = "a-real-secret-from-the-vault-0123456789".into();
        config.security.trust_forwarded_header = false;
        assert!(ConfigLoader::warnings(&config).is_empty());
    }
}
