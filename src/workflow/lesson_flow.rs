//! 课时处理流程 - 流程层
//!
//! 核心职责：定义"一份文档 / 一个课时"的完整处理流程
//!
//! 流程顺序：
//! 1. 上传 → 抽取（创建课时）
//! 2. 质量评估，写入分数和反馈
//! 3. 分数低于阈值时优化内容
//! 4. 完成
//!
//! 任意阶段失败即停止，不回滚已完成的阶段。

use std::future::Future;

use tracing::warn;

use crate::config::StageRetrySettings;
use crate::models::{Document, LessonId, LessonStatus, PipelineStage, ProgressEvent};
use crate::services::{ErrorInfo, LessonService, PipelineResult};
use crate::workflow::lesson_ctx::LessonCtx;
use crate::workflow::progress::ProgressReporter;

/// 单个课时的处理结果
#[derive(Debug, Clone, PartialEq)]
pub struct FlowOutcome {
    pub lesson_id: LessonId,
    pub quality_score: f64,
    pub feedback: String,
    /// 是否经过了优化阶段
    pub refined: bool,
    pub final_stage: PipelineStage,
}

/// 课时处理流程
///
/// - 决定何时评估、何时优化
/// - 不持有任何资源
/// - 只依赖业务能力（services）
#[derive(Clone)]
pub struct LessonFlow {
    lessons: LessonService,
    quality_threshold: f64,
    stage_retry: Option<StageRetrySettings>,
}

impl LessonFlow {
    /// 创建新的课时处理流程
    pub fn new(lessons: LessonService, quality_threshold: f64) -> Self {
        Self {
            lessons,
            quality_threshold,
            stage_retry: None,
        }
    }

    /// 评估和优化阶段失败时整体重试
    pub fn with_stage_retry(mut self, settings: StageRetrySettings) -> Self {
        self.stage_retry = Some(settings);
        self
    }

    pub fn quality_threshold(&self) -> f64 {
        self.quality_threshold
    }

    /// 处理一份新文档
    pub async fn run(
        &self,
        document: &Document,
        ctx: &LessonCtx,
        reporter: &ProgressReporter,
    ) -> PipelineResult<FlowOutcome> {
        let mut cursor = StageCursor::new(reporter);

        cursor.enter(
            PipelineStage::Uploading,
            ProgressEvent::info(format!("{} Uploading {}", ctx, document.name)),
        );
        cursor.enter(
            PipelineStage::Processing,
            ProgressEvent::stage(PipelineStage::Processing, "Analyzing document structure"),
        );

        let processed = match self.lessons.process_document(document).await {
            Ok(processed) => processed,
            Err(info) => return Err(cursor.fail(info, None)),
        };
        reporter.emit(
            ProgressEvent::success(format!("{} Lesson created", ctx)).with_lesson(&processed.lesson_id),
        );

        self.evaluate_from(&processed.lesson_id, cursor).await
    }

    /// 对已有课时执行评估和（条件）优化
    pub async fn evaluate_and_refine(
        &self,
        lesson_id: &str,
        reporter: &ProgressReporter,
    ) -> PipelineResult<FlowOutcome> {
        let cursor = StageCursor::at(PipelineStage::Processing, reporter);
        self.evaluate_from(lesson_id, cursor).await
    }

    async fn evaluate_from(
        &self,
        lesson_id: &str,
        mut cursor: StageCursor<'_>,
    ) -> PipelineResult<FlowOutcome> {
        // ========== 评估 ==========
        cursor.enter(
            PipelineStage::Evaluating,
            ProgressEvent::stage(PipelineStage::Evaluating, "Evaluating content quality")
                .with_lesson(lesson_id),
        );

        let evaluation = match self
            .with_retry("evaluate", || self.lessons.evaluate_lesson(lesson_id))
            .await
        {
            Ok(evaluation) => evaluation,
            Err(info) => return Err(cursor.fail(info, Some(lesson_id))),
        };

        // 需要优化时只写分数和反馈，状态由优化阶段决定，失败时保持原状态
        let needs_refinement = evaluation.quality_score < self.quality_threshold;
        let status = (!needs_refinement).then_some(LessonStatus::Complete);
        if let Err(info) = self
            .lessons
            .record_evaluation(lesson_id, &evaluation, status)
            .await
        {
            return Err(cursor.fail(info, Some(lesson_id)));
        }

        cursor.reporter.emit(
            ProgressEvent::info(format!(
                "Quality score {:.2} (threshold {:.2})",
                evaluation.quality_score, self.quality_threshold
            ))
            .with_lesson(lesson_id),
        );

        // ========== 优化 ==========
        if needs_refinement {
            cursor.enter(
                PipelineStage::Refining,
                ProgressEvent::stage(PipelineStage::Refining, "Refining lesson content")
                    .with_lesson(lesson_id),
            );

            if let Err(info) = self
                .with_retry("refine", || self.lessons.refine_lesson(lesson_id))
                .await
            {
                return Err(cursor.fail(info, Some(lesson_id)));
            }
        }

        // ========== 完成 ==========
        cursor.enter(
            PipelineStage::Complete,
            ProgressEvent::stage(PipelineStage::Complete, "Lesson published").with_lesson(lesson_id),
        );

        Ok(FlowOutcome {
            lesson_id: lesson_id.to_string(),
            quality_score: evaluation.quality_score,
            feedback: evaluation.feedback,
            refined: needs_refinement,
            final_stage: cursor.stage,
        })
    }

    /// 按阶段级重试策略执行（未配置时只执行一次）
    async fn with_retry<T, F, Fut>(&self, label: &str, mut operation: F) -> PipelineResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = PipelineResult<T>>,
    {
        let Some(settings) = &self.stage_retry else {
            return operation().await;
        };

        let mut attempt = 1u32;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(info) if attempt < settings.max_tries => {
                    let delay = settings.delay_for(attempt);
                    warn!(
                        stage = label,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "阶段失败，等待后重试: {}",
                        info
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(info) => return Err(info),
            }
        }
    }
}

/// 当前阶段 + 上报
struct StageCursor<'a> {
    stage: PipelineStage,
    reporter: &'a ProgressReporter,
}

impl<'a> StageCursor<'a> {
    fn new(reporter: &'a ProgressReporter) -> Self {
        Self::at(PipelineStage::Idle, reporter)
    }

    fn at(stage: PipelineStage, reporter: &'a ProgressReporter) -> Self {
        Self { stage, reporter }
    }

    fn enter(&mut self, next: PipelineStage, event: ProgressEvent) {
        debug_assert!(
            self.stage.can_transition_to(next),
            "非法阶段迁移: {:?} -> {:?}",
            self.stage,
            next
        );
        self.stage = next;
        self.reporter.emit(event);
    }

    fn fail(&mut self, info: ErrorInfo, lesson_id: Option<&str>) -> ErrorInfo {
        let mut event = ProgressEvent::error(format!("Failed during {:?}: {}", self.stage, info));
        event.stage = Some(PipelineStage::Error);
        if let Some(id) = lesson_id {
            event = event.with_lesson(id);
        }
        self.stage = PipelineStage::Error;
        self.reporter.emit(event);
        info
    }
}
