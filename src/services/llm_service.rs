//! LLM 服务 - 业务能力层
//!
//! 只负责"受限流保护的一次模型调用"，不关心流程
//!
//! 一次调用依次经过：
//! 1. 准入控制（拿到许可，或进入等待队列）
//! 2. 传输层（超时 + 重试）
//! 3. 监控（总耗时、token 用量）

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};

use crate::config::Config;
use crate::error::PipelineError;
use crate::infrastructure::{LlmTransport, RateLimiter};
use crate::models::ChatRequest;
use crate::services::monitoring::AiMonitor;

/// LLM 服务
///
/// 职责：
/// - 按配置构造请求（模型、温度、最大 token）
/// - 在准入控制下调用传输层
/// - 上报延迟和 token 用量
/// - 不读写课时，不关心阶段顺序
#[derive(Clone)]
pub struct LlmService {
    transport: Arc<dyn LlmTransport>,
    limiter: RateLimiter,
    monitor: Arc<AiMonitor>,
    model_name: String,
    temperature: f32,
    max_tokens: u32,
}

impl LlmService {
    /// 创建新的 LLM 服务
    pub fn new(
        transport: Arc<dyn LlmTransport>,
        limiter: RateLimiter,
        monitor: Arc<AiMonitor>,
        config: &Config,
    ) -> Self {
        Self {
            transport,
            limiter,
            monitor,
            model_name: config.llm_model_name.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }

    pub fn provider_name(&self) -> &str {
        self.transport.provider_name()
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn monitor(&self) -> &Arc<AiMonitor> {
        &self.monitor
    }

    /// 通用的 LLM 调用函数
    ///
    /// # 参数
    /// - `user_message`: 用户消息内容
    /// - `system_message`: 系统消息（可选）
    /// - `estimated_tokens`: 预估 token 数，用于准入控制
    ///
    /// # 返回
    /// 模型回复的文本
    pub async fn send_to_llm(
        &self,
        user_message: &str,
        system_message: Option<&str>,
        estimated_tokens: u64,
    ) -> Result<String, PipelineError> {
        debug!(
            "调用 LLM API，模型: {}，用户消息长度: {} 字符",
            self.model_name,
            user_message.len()
        );

        let request = ChatRequest::new(
            self.model_name.as_str(),
            system_message,
            user_message,
            self.temperature,
            self.max_tokens,
        );

        self.execute_with_rate_limit(request, estimated_tokens).await
    }

    /// 在准入控制下执行请求
    ///
    /// 拿不到许可时进入等待队列。无论成功与否都记录总耗时，成功时记录 token 用量。
    pub async fn execute_with_rate_limit(
        &self,
        request: ChatRequest,
        estimated_tokens: u64,
    ) -> Result<String, PipelineError> {
        let started = Instant::now();

        let result = match self.limiter.try_acquire(estimated_tokens) {
            Some(_permit) => self
                .transport
                .call(&request)
                .await
                .map_err(PipelineError::from),
            None => {
                info!(
                    "⏳ 已达速率限制，请求进入等待队列 (队列长度: {})",
                    self.limiter.queue_len() + 1
                );
                let transport = Arc::clone(&self.transport);
                self.limiter
                    .enqueue(move || async move { transport.call(&request).await })
                    .await
                    .map_err(PipelineError::from)
                    .and_then(|outcome| outcome.map_err(PipelineError::from))
            }
        };

        let provider = self.provider_name();
        self.monitor.record_latency(provider, started.elapsed());
        if result.is_ok() {
            self.monitor.record_token_usage(provider, estimated_tokens);
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::infrastructure::RateLimitSettings;
    use crate::services::monitoring::{MetricKind, MonitorSettings};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct EchoTransport {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl LlmTransport for EchoTransport {
        fn provider_name(&self) -> &str {
            "echo"
        }

        async fn call(&self, request: &ChatRequest) -> Result<String, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            if self.fail {
                return Err(TransportError::Status {
                    status: 400,
                    message: "bad".into(),
                });
            }
            Ok(format!("echo: {}", request.messages.last().map(|m| m.content.as_str()).unwrap_or("")))
        }
    }

    fn service(fail: bool, concurrent: usize) -> (LlmService, Arc<EchoTransport>) {
        let transport = Arc::new(EchoTransport {
            calls: AtomicUsize::new(0),
            fail,
        });
        let limiter = RateLimiter::new(RateLimitSettings {
            max_concurrent_requests: concurrent,
            ..Default::default()
        });
        let monitor = Arc::new(AiMonitor::new(MonitorSettings::default()));
        let service = LlmService::new(transport.clone(), limiter, monitor, &Config::default());
        (service, transport)
    }

    #[tokio::test]
    async fn test_success_records_metrics_and_releases() {
        let (service, transport) = service(false, 3);
        let reply = service.send_to_llm("hello", Some("sys"), 2).await.unwrap();

        assert_eq!(reply, "echo: hello");
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
        assert_eq!(service.limiter().active_requests(), 0);

        let window = Duration::from_secs(60);
        assert_eq!(service.monitor().get_metrics("echo", MetricKind::Latency, window).len(), 1);
        let tokens = service.monitor().get_metrics("echo", MetricKind::Tokens, window);
        assert_eq!(tokens.len(), 1);
        assert!((tokens[0].value - 2.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_failure_records_latency_only() {
        let (service, _) = service(true, 3);
        let err = service.send_to_llm("hello", None, 2).await.unwrap_err();

        assert!(matches!(err, PipelineError::Transport(TransportError::Status { status: 400, .. })));
        assert_eq!(service.limiter().active_requests(), 0);

        let window = Duration::from_secs(60);
        assert_eq!(service.monitor().get_metrics("echo", MetricKind::Latency, window).len(), 1);
        assert!(service.monitor().get_metrics("echo", MetricKind::Tokens, window).is_empty());
    }

    #[tokio::test]
    async fn test_denied_requests_are_queued() {
        let (service, transport) = service(false, 1);

        let calls = (0..4).map(|i| {
            let service = service.clone();
            async move { service.send_to_llm(&format!("m{}", i), None, 1).await }
        });
        let replies = futures::future::join_all(calls).await;

        assert!(replies.iter().all(|r| r.is_ok()));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 4);
    }
}
