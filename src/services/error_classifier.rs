//! 错误分类 - 业务能力层
//!
//! 把流水线内部的错误映射到固定的错误类型和面向用户的文案，
//! 并按 (服务商, 类型) 上报给监控。

use crate::error::{PipelineError, TransportError};
use crate::services::monitoring::AiMonitor;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::error;

/// 错误类型（封闭集合）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// 429
    RateLimited,
    /// 400
    InvalidRequest,
    /// 401
    AuthFailed,
    /// 402
    InsufficientCredits,
    /// 404
    ResourceUnavailable,
    /// 413
    PayloadTooLarge,
    /// 5xx
    ServiceUnavailable,
    Timeout,
    NetworkError,
    /// 响应结构不符合预期
    ValidationError,
    Unknown,
}

impl ErrorKind {
    /// 监控使用的代码
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::AuthFailed => "auth_failed",
            ErrorKind::InsufficientCredits => "insufficient_credits",
            ErrorKind::ResourceUnavailable => "resource_unavailable",
            ErrorKind::PayloadTooLarge => "payload_too_large",
            ErrorKind::ServiceUnavailable => "service_unavailable",
            ErrorKind::Timeout => "timeout",
            ErrorKind::NetworkError => "network_error",
            ErrorKind::ValidationError => "validation_error",
            ErrorKind::Unknown => "unknown",
        }
    }

    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorKind::RateLimited
                | ErrorKind::ServiceUnavailable
                | ErrorKind::NetworkError
                | ErrorKind::Timeout
        )
    }

    /// 面向用户的文案
    pub fn user_message(self, detail: &str) -> String {
        match self {
            ErrorKind::RateLimited => {
                "Rate limit exceeded. Please wait a moment and try again.".to_string()
            }
            ErrorKind::InvalidRequest => format!("Invalid request: {}", detail),
            ErrorKind::AuthFailed => {
                "Authentication failed. Please check your API key.".to_string()
            }
            ErrorKind::InsufficientCredits => {
                "Insufficient credits. Please check your provider account.".to_string()
            }
            ErrorKind::ResourceUnavailable => {
                "The requested model is currently unavailable. Please try again later.".to_string()
            }
            ErrorKind::PayloadTooLarge => {
                "Content too long for processing. Please try a shorter document.".to_string()
            }
            ErrorKind::ServiceUnavailable => {
                "Service temporarily unavailable. Please try again in a moment.".to_string()
            }
            ErrorKind::Timeout => "Request timed out. Please try again.".to_string(),
            ErrorKind::NetworkError => {
                "Network connection error. Please check your internet connection and try again."
                    .to_string()
            }
            ErrorKind::ValidationError => format!("Invalid response format: {}", detail),
            ErrorKind::Unknown => {
                if detail.trim().is_empty() {
                    "An unexpected error occurred".to_string()
                } else {
                    detail.to_string()
                }
            }
        }
    }
}

/// 分类后的错误
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("{message}")]
pub struct ErrorInfo {
    pub kind: ErrorKind,
    pub message: String,
    pub retryable: bool,
}

impl ErrorInfo {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retryable: kind.is_retryable(),
        }
    }

    fn from_kind(kind: ErrorKind, detail: &str) -> Self {
        Self::new(kind, kind.user_message(detail))
    }
}

/// 流水线对外的统一结果
pub type PipelineResult<T> = Result<T, ErrorInfo>;

/// 分类（纯函数，不上报）
pub fn classify(err: &PipelineError) -> ErrorInfo {
    match err {
        PipelineError::Transport(transport) => classify_transport(transport),
        PipelineError::EmptyDocument | PipelineError::EmptyCourse(_) => {
            ErrorInfo::from_kind(ErrorKind::InvalidRequest, &err.to_string())
        }
        PipelineError::Store(_) | PipelineError::Queue(_) => {
            ErrorInfo::from_kind(ErrorKind::Unknown, &err.to_string())
        }
    }
}

fn classify_transport(err: &TransportError) -> ErrorInfo {
    match err {
        TransportError::Status { status, message } => {
            let kind = match status {
                429 => ErrorKind::RateLimited,
                400 => ErrorKind::InvalidRequest,
                401 => ErrorKind::AuthFailed,
                402 => ErrorKind::InsufficientCredits,
                404 => ErrorKind::ResourceUnavailable,
                413 => ErrorKind::PayloadTooLarge,
                500..=599 => ErrorKind::ServiceUnavailable,
                _ => {
                    return ErrorInfo::new(
                        ErrorKind::Unknown,
                        format!("API error ({}): {}", status, message),
                    )
                }
            };
            ErrorInfo::from_kind(kind, message)
        }
        TransportError::Timeout => ErrorInfo::from_kind(ErrorKind::Timeout, ""),
        TransportError::Network(detail) => ErrorInfo::from_kind(ErrorKind::NetworkError, detail),
        TransportError::InvalidResponseFormat(detail) => {
            ErrorInfo::from_kind(ErrorKind::ValidationError, detail)
        }
    }
}

/// 带监控上报的分类器（每个服务商一个）
#[derive(Clone)]
pub struct ErrorClassifier {
    monitor: Arc<AiMonitor>,
    provider: String,
}

impl ErrorClassifier {
    pub fn new(monitor: Arc<AiMonitor>, provider: impl Into<String>) -> Self {
        Self {
            monitor,
            provider: provider.into(),
        }
    }

    /// 分类、记录日志并上报监控
    pub fn handle(&self, err: PipelineError) -> ErrorInfo {
        let info = classify(&err);
        error!(
            provider = %self.provider,
            kind = info.kind.code(),
            retryable = info.retryable,
            "❌ {} ({})",
            info.message,
            err
        );
        self.monitor.record_error(&self.provider, info.kind.code());
        info
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{RateLimitError, StoreError};
    use crate::services::monitoring::{MetricKind, MonitorSettings};
    use std::time::Duration;

    fn status(code: u16, message: &str) -> PipelineError {
        PipelineError::Transport(TransportError::Status {
            status: code,
            message: message.to_string(),
        })
    }

    #[test]
    fn test_status_mapping() {
        let cases = [
            (429, ErrorKind::RateLimited),
            (400, ErrorKind::InvalidRequest),
            (401, ErrorKind::AuthFailed),
            (402, ErrorKind::InsufficientCredits),
            (404, ErrorKind::ResourceUnavailable),
            (413, ErrorKind::PayloadTooLarge),
            (500, ErrorKind::ServiceUnavailable),
            (503, ErrorKind::ServiceUnavailable),
        ];
        for (code, kind) in cases {
            assert_eq!(classify(&status(code, "x")).kind, kind, "status {}", code);
        }
    }

    #[test]
    fn test_messages() {
        let info = classify(&status(400, "bad model id"));
        assert_eq!(info.message, "Invalid request: bad model id");
        assert!(!info.retryable);

        let info = classify(&status(429, "slow down"));
        assert_eq!(
            info.message,
            "Rate limit exceeded. Please wait a moment and try again."
        );
        assert!(info.retryable);

        let info = classify(&status(418, "teapot"));
        assert_eq!(info.kind, ErrorKind::Unknown);
        assert_eq!(info.message, "API error (418): teapot");

        let info = classify(&PipelineError::Transport(TransportError::InvalidResponseFormat(
            "missing content".into(),
        )));
        assert_eq!(info.kind, ErrorKind::ValidationError);
        assert_eq!(info.message, "Invalid response format: missing content");
    }

    #[test]
    fn test_non_transport_errors() {
        let info = classify(&PipelineError::EmptyDocument);
        assert_eq!(info.kind, ErrorKind::InvalidRequest);
        assert_eq!(info.message, "Invalid request: Empty or invalid file content");

        let info = classify(&PipelineError::Store(StoreError::NotAuthenticated));
        assert_eq!(info.kind, ErrorKind::Unknown);
        assert_eq!(info.message, "Authentication required");

        let info = classify(&PipelineError::Queue(RateLimitError::QueueDropped));
        assert_eq!(info.kind, ErrorKind::Unknown);
    }

    #[test]
    fn test_network_and_timeout() {
        let info = classify(&PipelineError::Transport(TransportError::Timeout));
        assert_eq!(info.kind, ErrorKind::Timeout);
        assert!(info.retryable);

        let info = classify(&PipelineError::Transport(TransportError::Network("refused".into())));
        assert_eq!(info.kind, ErrorKind::NetworkError);
        assert!(info.retryable);
    }

    #[test]
    fn test_handle_reports_to_monitor() {
        let monitor = Arc::new(AiMonitor::new(MonitorSettings::default()));
        let classifier = ErrorClassifier::new(monitor.clone(), "openrouter");

        for _ in 0..3 {
            let info = classifier.handle(status(503, "down"));
            assert_eq!(info.kind, ErrorKind::ServiceUnavailable);
        }

        let errors = monitor.get_metrics("openrouter", MetricKind::Errors, Duration::from_secs(60));
        assert_eq!(errors.len(), 3);
        assert_eq!(monitor.alerts().len(), 1);
    }
}
