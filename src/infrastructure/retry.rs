//! 指数退避重试
//!
//! 只重试"暂时性"失败：没有收到响应（网络错误、超时）、HTTP 429 和 5xx。
//! 其他状态码和响应格式错误立即返回。

use crate::error::TransportError;
use serde::Deserialize;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// 重试策略
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetryPolicy {
    /// 首次调用之后最多追加的尝试次数
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 2000,
            max_delay_ms: 20_000,
            backoff_factor: 2.0,
        }
    }
}

impl RetryPolicy {
    /// 不重试
    pub fn none() -> Self {
        Self {
            max_attempts: 0,
            ..Default::default()
        }
    }

    /// 第 `retry` 次重试（从 1 开始）前的等待时间
    ///
    /// `min(initial_delay * backoff_factor^(retry-1), max_delay)`，不加随机抖动
    pub fn delay_for_attempt(&self, retry: u32) -> Duration {
        let exp = retry.saturating_sub(1) as i32;
        let raw_ms = self.initial_delay_ms as f64 * self.backoff_factor.powi(exp);
        let capped_ms = raw_ms.min(self.max_delay_ms as f64);
        Duration::from_millis(capped_ms as u64)
    }

    /// 执行操作，遇到可重试的失败时按退避策略重试
    ///
    /// # 参数
    /// - `provider`: 服务商名称（仅用于日志）
    /// - `operation`: 每次调用都会重新创建的异步操作
    ///
    /// # 返回
    /// 成功结果，或最后一次尝试的错误
    pub async fn run<T, F, Fut>(&self, provider: &str, mut operation: F) -> Result<T, TransportError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, TransportError>>,
    {
        let mut retry = 0u32;
        loop {
            match operation().await {
                Ok(value) => {
                    if retry > 0 {
                        debug!(provider, retry, "重试后请求成功");
                    }
                    return Ok(value);
                }
                Err(err) => {
                    if !is_retryable(&err) || retry >= self.max_attempts {
                        return Err(err);
                    }
                    retry += 1;
                    let delay = self.delay_for_attempt(retry);
                    warn!(
                        provider,
                        retry,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "暂时性错误，等待后重试"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

/// 判断一次失败是否值得重试
pub fn is_retryable(err: &TransportError) -> bool {
    match err {
        TransportError::Network(_) | TransportError::Timeout => true,
        TransportError::Status { status, .. } => *status == 429 || (500..=599).contains(status),
        TransportError::InvalidResponseFormat(_) => false,
    }
}
