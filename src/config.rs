use crate::error::{AppError, AppResult, ConfigError};
use crate::infrastructure::rate_limiter::RateLimitSettings;
use crate::infrastructure::retry::RetryPolicy;
use crate::models::ProviderKind;
use crate::services::monitoring::MonitorSettings;
use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;

/// 程序配置文件
///
/// 启动时读取一次，之后只读。来源优先级：环境变量 > TOML 文件 > 默认值。
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    // --- LLM 配置 ---
    /// 服务商
    pub provider: ProviderKind,
    pub llm_api_key: String,
    /// 为空时使用服务商的默认地址
    pub llm_api_endpoint: Option<String>,
    pub llm_model_name: String,
    pub max_tokens: u32,
    pub temperature: f32,
    /// 单次请求超时（毫秒）
    pub request_timeout_ms: u64,
    /// OpenRouter 的 HTTP-Referer 头
    pub http_referer: Option<String>,
    /// OpenRouter 的 X-Title 头
    pub app_title: String,
    // --- 可靠性 ---
    pub retry: RetryPolicy,
    pub limits: RateLimitSettings,
    pub monitoring: MonitorSettings,
    /// 课程级刷新时对单个阶段的重试
    pub stage_retry: StageRetrySettings,
    // --- 流水线 ---
    /// 低于该分数的课时进入优化阶段
    pub quality_threshold: f64,
    // --- 批处理 ---
    /// 文档所在目录
    pub documents_folder: String,
    /// 同时处理的文档数量
    pub max_concurrent_documents: usize,
    /// 输出日志文件
    pub output_log_file: String,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    /// 批处理结束后是否对所有课程再做一次全局刷新（会重新评估刚处理过的课时）
    pub refresh_after_batch: bool,
}

/// 阶段级重试：`base_delay_ms * 2^(n-1)`，不设上限
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StageRetrySettings {
    pub max_tries: u32,
    pub base_delay_ms: u64,
}

impl StageRetrySettings {
    /// 第 `retry` 次（从 1 开始）重试前的等待时间
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u64.saturating_pow(retry.saturating_sub(1));
        Duration::from_millis(self.base_delay_ms.saturating_mul(factor))
    }
}

impl Default for StageRetrySettings {
    fn default() -> Self {
        Self {
            max_tries: 3,
            base_delay_ms: 2000,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: ProviderKind::OpenRouter,
            llm_api_key: String::new(),
            llm_api_endpoint: None,
            llm_model_name: "mistralai/mistral-7b-instruct".to_string(),
            max_tokens: 4000,
            temperature: 0.7,
            request_timeout_ms: 120_000,
            http_referer: None,
            app_title: "Educational Content Processing System".to_string(),
            retry: RetryPolicy::default(),
            limits: RateLimitSettings::default(),
            monitoring: MonitorSettings::default(),
            stage_retry: StageRetrySettings::default(),
            quality_threshold: 0.7,
            documents_folder: "documents".to_string(),
            max_concurrent_documents: 3,
            output_log_file: "output.txt".to_string(),
            verbose_logging: false,
            refresh_after_batch: false,
        }
    }
}

impl Config {
    /// 读取并校验配置
    ///
    /// 设置了 `PIPELINE_CONFIG` 时先加载该 TOML 文件，再用环境变量覆盖
    pub fn load() -> AppResult<Self> {
        let base = match std::env::var("PIPELINE_CONFIG") {
            Ok(path) => Self::from_file(&path)?,
            Err(_) => Self::default(),
        };
        let config = base.with_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// 默认值 + 环境变量
    pub fn from_env() -> AppResult<Self> {
        Ok(Self::default().with_env_overrides()?)
    }

    /// 从 TOML 文件加载
    pub fn from_file(path: &str) -> AppResult<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| AppError::file_read_failed(path, e))?;
        Ok(Self::from_toml_str(&content, path)?)
    }

    pub fn from_toml_str(content: &str, path: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::FileParseFailed {
            path: path.to_string(),
            source,
        })
    }

    /// 用环境变量覆盖已有配置
    pub fn with_env_overrides(mut self) -> Result<Self, ConfigError> {
        if let Some(provider) = std::env::var("LLM_PROVIDER").ok() {
            self.provider =
                ProviderKind::from_str(&provider).ok_or_else(|| ConfigError::EnvVarParseFailed {
                    var_name: "LLM_PROVIDER".to_string(),
                    value: provider.clone(),
                    expected_type: "openrouter | openai | anthropic | nvidia".to_string(),
                })?;
        }
        if let Ok(key) = std::env::var("LLM_API_KEY") {
            self.llm_api_key = key;
        }
        if let Ok(endpoint) = std::env::var("LLM_API_ENDPOINT") {
            self.llm_api_endpoint = Some(endpoint);
        }
        if let Ok(model) = std::env::var("LLM_MODEL") {
            self.llm_model_name = model;
        }
        if let Ok(referer) = std::env::var("LLM_HTTP_REFERER") {
            self.http_referer = Some(referer);
        }

        override_parsed(&mut self.max_tokens, "LLM_MAX_TOKENS", "u32")?;
        override_parsed(&mut self.temperature, "LLM_TEMPERATURE", "f32")?;
        override_parsed(&mut self.request_timeout_ms, "LLM_TIMEOUT_MS", "u64")?;
        override_parsed(&mut self.retry.max_attempts, "LLM_RETRY_COUNT", "u32")?;
        override_parsed(&mut self.retry.initial_delay_ms, "LLM_RETRY_DELAY_MS", "u64")?;
        override_parsed(&mut self.retry.max_delay_ms, "LLM_MAX_RETRY_DELAY_MS", "u64")?;
        override_parsed(
            &mut self.limits.max_concurrent_requests,
            "MAX_CONCURRENT_REQUESTS",
            "usize",
        )?;
        override_parsed(
            &mut self.limits.max_requests_per_minute,
            "MAX_REQUESTS_PER_MINUTE",
            "u32",
        )?;
        override_parsed(
            &mut self.limits.max_tokens_per_minute,
            "MAX_TOKENS_PER_MINUTE",
            "u64",
        )?;
        override_parsed(&mut self.quality_threshold, "QUALITY_THRESHOLD", "f64")?;
        override_parsed(
            &mut self.max_concurrent_documents,
            "MAX_CONCURRENT_DOCUMENTS",
            "usize",
        )?;
        override_parsed(&mut self.verbose_logging, "VERBOSE_LOGGING", "bool")?;
        override_parsed(&mut self.refresh_after_batch, "REFRESH_AFTER_BATCH", "bool")?;

        if let Ok(folder) = std::env::var("DOCUMENTS_FOLDER") {
            self.documents_folder = folder;
        }
        if let Ok(file) = std::env::var("OUTPUT_LOG_FILE") {
            self.output_log_file = file;
        }

        Ok(self)
    }

    /// 校验配置
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.llm_api_key.trim().is_empty() {
            return Err(invalid("llm_api_key", "缺少 API 密钥"));
        }
        if self.endpoint().trim().is_empty() {
            return Err(invalid("llm_api_endpoint", "缺少 API 地址"));
        }
        if self.llm_model_name.trim().is_empty() {
            return Err(invalid("llm_model_name", "缺少模型名称"));
        }
        if self.max_tokens == 0 {
            return Err(invalid("max_tokens", "必须大于 0"));
        }
        if !(0.0..=1.0).contains(&self.temperature) {
            return Err(invalid("temperature", "必须在 [0, 1] 之间"));
        }
        if self.request_timeout_ms == 0 {
            return Err(invalid("request_timeout_ms", "必须大于 0"));
        }
        if self.retry.initial_delay_ms == 0 || self.retry.max_delay_ms == 0 {
            return Err(invalid("retry", "重试延迟必须大于 0"));
        }
        if self.retry.backoff_factor < 1.0 {
            return Err(invalid("retry.backoff_factor", "不能小于 1"));
        }
        if self.limits.max_concurrent_requests == 0
            || self.limits.max_requests_per_minute == 0
            || self.limits.max_tokens_per_minute == 0
        {
            return Err(invalid("limits", "限流参数必须大于 0"));
        }
        if !(0.0..=1.0).contains(&self.quality_threshold) {
            return Err(invalid("quality_threshold", "必须在 [0, 1] 之间"));
        }
        if self.max_concurrent_documents == 0 {
            return Err(invalid("max_concurrent_documents", "必须大于 0"));
        }
        Ok(())
    }

    /// 实际使用的 API 地址
    pub fn endpoint(&self) -> &str {
        self.llm_api_endpoint
            .as_deref()
            .unwrap_or_else(|| self.provider.default_endpoint())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

/// 环境变量存在时解析并覆盖，解析失败报错
fn override_parsed<T: FromStr>(
    target: &mut T,
    var_name: &str,
    expected_type: &str,
) -> Result<(), ConfigError> {
    if let Ok(value) = std::env::var(var_name) {
        *target = value
            .trim()
            .parse()
            .map_err(|_| ConfigError::EnvVarParseFailed {
                var_name: var_name.to_string(),
                value: value.clone(),
                expected_type: expected_type.to_string(),
            })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        Config {
            llm_api_key: "sk-test".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.provider, ProviderKind::OpenRouter);
        assert_eq!(config.endpoint(), "https://openrouter.ai/api/v1");
        assert_eq!(config.max_tokens, 4000);
        assert_eq!(config.request_timeout(), Duration::from_secs(120));
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.limits.max_concurrent_requests, 3);
        assert_eq!(config.limits.max_requests_per_minute, 20);
        assert_eq!(config.limits.max_tokens_per_minute, 100_000);
        assert!((config.quality_threshold - 0.7).abs() < f64::EPSILON);
        assert!(!config.refresh_after_batch);
    }

    #[test]
    fn test_validate_requires_api_key() {
        let err = Config::default().validate().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "llm_api_key"));
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_validate_temperature_range() {
        let config = Config {
            temperature: 1.5,
            ..valid_config()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_toml_partial() {
        let toml = r#"
            provider = "anthropic"
            llm_api_key = "sk-ant"
            llm_model_name = "claude-3-haiku"
            quality_threshold = 0.8

            [retry]
            max_attempts = 5
            initial_delay_ms = 100

            [limits]
            max_concurrent_requests = 1
        "#;

        let config = Config::from_toml_str(toml, "inline").unwrap();
        assert_eq!(config.provider, ProviderKind::Anthropic);
        assert_eq!(config.endpoint(), "https://api.anthropic.com/v1");
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.initial_delay_ms, 100);
        assert_eq!(config.retry.max_delay_ms, 20_000);
        assert_eq!(config.limits.max_concurrent_requests, 1);
        assert_eq!(config.limits.max_requests_per_minute, 20);
        assert_eq!(config.max_tokens, 4000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_toml_enables_refresh_after_batch() {
        let config = Config::from_toml_str("refresh_after_batch = true", "inline").unwrap();
        assert!(config.refresh_after_batch);
    }

    #[test]
    fn test_from_toml_rejects_bad_type() {
        let err = Config::from_toml_str("max_tokens = \"many\"", "bad.toml").unwrap_err();
        assert!(matches!(err, ConfigError::FileParseFailed { ref path, .. } if path == "bad.toml"));
    }

    #[test]
    fn test_stage_retry_delay() {
        let settings = StageRetrySettings::default();
        assert_eq!(settings.delay_for(1), Duration::from_millis(2000));
        assert_eq!(settings.delay_for(2), Duration::from_millis(4000));
    }
}
