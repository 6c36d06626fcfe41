//! 流水线入口 - 编排层
//!
//! `Pipeline` 显式持有每个服务商的限流器、传输层和监控，
//! 由调用方构造后克隆共享，没有全局单例。

use std::sync::Arc;

use futures::Stream;

use crate::config::Config;
use crate::error::TransportError;
use crate::infrastructure::{HttpTransport, LessonStore, LlmTransport, RateLimiter};
use crate::models::{Document, ProgressEvent};
use crate::orchestrator::course_processor::{self, CourseStats};
use crate::services::{AiMonitor, ErrorClassifier, LessonService, LlmService, PipelineResult};
use crate::workflow::{FlowOutcome, LessonCtx, LessonFlow, ProgressReporter};

/// 流水线
#[derive(Clone)]
pub struct Pipeline {
    config: Arc<Config>,
    lessons: LessonService,
    monitor: Arc<AiMonitor>,
}

impl Pipeline {
    /// 用已构造的协作方组装流水线
    pub fn new(
        config: Config,
        transport: Arc<dyn LlmTransport>,
        store: Arc<dyn LessonStore>,
        monitor: Arc<AiMonitor>,
    ) -> Self {
        let limiter = RateLimiter::new(config.limits.clone());
        let classifier = ErrorClassifier::new(monitor.clone(), transport.provider_name());
        let llm = LlmService::new(transport, limiter, monitor.clone(), &config);

        Self {
            lessons: LessonService::new(llm, store, classifier),
            monitor,
            config: Arc::new(config),
        }
    }

    /// 按配置创建 HTTP 传输层
    pub fn from_config(
        config: Config,
        store: Arc<dyn LessonStore>,
        monitor: Arc<AiMonitor>,
    ) -> Result<Self, TransportError> {
        let transport = Arc::new(HttpTransport::from_config(&config)?);
        Ok(Self::new(config, transport, store, monitor))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn lessons(&self) -> &LessonService {
        &self.lessons
    }

    pub fn store(&self) -> &Arc<dyn LessonStore> {
        self.lessons.store()
    }

    pub fn monitor(&self) -> &Arc<AiMonitor> {
        &self.monitor
    }

    pub fn limiter(&self) -> &RateLimiter {
        self.lessons.llm().limiter()
    }

    pub fn provider_name(&self) -> &str {
        self.lessons.llm().provider_name()
    }

    /// 单个课时的流程
    pub fn flow(&self) -> LessonFlow {
        LessonFlow::new(self.lessons.clone(), self.config.quality_threshold)
    }

    /// 带模型名称的上报器
    pub fn reporter(&self) -> (ProgressReporter, futures::channel::mpsc::UnboundedReceiver<ProgressEvent>) {
        let (reporter, rx) = ProgressReporter::channel();
        (reporter.with_model(self.config.llm_model_name.clone()), rx)
    }

    /// 处理一份文档：抽取 → 评估 → （条件）优化
    pub async fn process_one(&self, document: &Document) -> PipelineResult<FlowOutcome> {
        let reporter = ProgressReporter::silent().with_model(self.config.llm_model_name.clone());
        self.process_one_with(document, &LessonCtx::for_document(1, document), &reporter)
            .await
    }

    pub async fn process_one_with(
        &self,
        document: &Document,
        ctx: &LessonCtx,
        reporter: &ProgressReporter,
    ) -> PipelineResult<FlowOutcome> {
        self.flow().run(document, ctx, reporter).await
    }

    /// 全局刷新：按课程分组重新评估当前用户的课时，再生成课程结构
    ///
    /// 在后台任务中执行，返回进度事件流；流结束即刷新结束。
    pub fn process_all(&self) -> impl Stream<Item = ProgressEvent> {
        let (reporter, rx) = self.reporter();
        let pipeline = self.clone();
        tokio::spawn(async move {
            course_processor::refresh_all(&pipeline, &reporter).await;
        });
        rx
    }

    /// 刷新单个课程中已完成的课时（带阶段级重试）
    pub async fn refresh_course(&self, course_id: &str, reporter: &ProgressReporter) -> CourseStats {
        course_processor::refresh_course(self, course_id, reporter).await
    }
}
