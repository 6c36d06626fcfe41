//! 课时服务 - 业务能力层
//!
//! 提供流水线的四个远程操作：
//! - `process_document`: 抽取文档内容并创建课时
//! - `evaluate_lesson`: 质量评估
//! - `refine_lesson`: 内容优化
//! - `architect_course`: 生成课程结构
//!
//! 每个操作都返回 `PipelineResult`，内部错误统一经过分类器。

use std::sync::Arc;

use regex::Regex;
use tracing::{debug, info, warn};

use crate::error::PipelineError;
use crate::infrastructure::LessonStore;
use crate::models::document::estimate_tokens;
use crate::models::{
    CourseOutline, Document, Evaluation, LessonFilter, LessonStatus, LessonUpdate, NewLesson,
    ProcessedDocument, Refinement,
};
use crate::services::error_classifier::{ErrorClassifier, PipelineResult};
use crate::services::llm_service::LlmService;
use crate::utils::logging::truncate_text;

/// 回复中没有数字时使用的分数
pub const DEFAULT_QUALITY_SCORE: f64 = 0.5;

const SCORE_PATTERN: &str = r"(\d*\.)?\d+";

const PROCESS_SYSTEM_PROMPT: &str = "You are an expert at processing educational content and extracting structured information. Always respond with well-structured content including a title, sections, and key points.";
const EVALUATE_SYSTEM_PROMPT: &str = "You are an expert at evaluating educational content quality. Analyze the content and provide a quality score between 0 and 1, along with detailed feedback.";
const REFINE_SYSTEM_PROMPT: &str = "You are an expert at improving educational content quality. Enhance the content while maintaining its core message and structure. Focus on clarity, engagement, and educational value.";
const ARCHITECT_SYSTEM_PROMPT: &str = "You are an expert curriculum architect. Organize the given lessons into a coherent course structure with modules, ordering and learning objectives.";

/// 生成课程结构时每个课时截取的字符数
const ARCHITECT_EXCERPT_CHARS: usize = 500;

/// 课时服务
///
/// 职责：
/// - 组织提示词并调用 `LlmService`
/// - 读写课时和课程
/// - 只处理单个课时 / 单个课程
/// - 不决定阶段顺序
#[derive(Clone)]
pub struct LessonService {
    llm: LlmService,
    store: Arc<dyn LessonStore>,
    classifier: ErrorClassifier,
}

impl LessonService {
    pub fn new(llm: LlmService, store: Arc<dyn LessonStore>, classifier: ErrorClassifier) -> Self {
        Self {
            llm,
            store,
            classifier,
        }
    }

    pub fn store(&self) -> &Arc<dyn LessonStore> {
        &self.store
    }

    pub fn classifier(&self) -> &ErrorClassifier {
        &self.classifier
    }

    pub fn llm(&self) -> &LlmService {
        &self.llm
    }

    /// 抽取文档内容，并以 `processing` 状态创建课时
    pub async fn process_document(&self, document: &Document) -> PipelineResult<ProcessedDocument> {
        self.try_process_document(document)
            .await
            .map_err(|e| self.classifier.handle(e))
    }

    /// 评估课时质量
    pub async fn evaluate_lesson(&self, lesson_id: &str) -> PipelineResult<Evaluation> {
        self.try_evaluate_lesson(lesson_id)
            .await
            .map_err(|e| self.classifier.handle(e))
    }

    /// 优化课时内容，写回内容并置为 `complete`
    pub async fn refine_lesson(&self, lesson_id: &str) -> PipelineResult<Refinement> {
        self.try_refine_lesson(lesson_id)
            .await
            .map_err(|e| self.classifier.handle(e))
    }

    /// 根据课程下的课时生成课程结构
    pub async fn architect_course(&self, course_id: &str) -> PipelineResult<CourseOutline> {
        self.try_architect_course(course_id)
            .await
            .map_err(|e| self.classifier.handle(e))
    }

    /// 写入分数、反馈，以及可选的状态
    pub async fn record_evaluation(
        &self,
        lesson_id: &str,
        evaluation: &Evaluation,
        status: Option<LessonStatus>,
    ) -> PipelineResult<()> {
        let update = LessonUpdate {
            status,
            metadata: Some(serde_json::json!({
                "quality_score": evaluation.quality_score,
                "feedback": evaluation.feedback,
            })),
            ..Default::default()
        };
        self.store
            .update_lesson(lesson_id, update)
            .await
            .map_err(|e| self.classifier.handle(e.into()))
    }

    async fn try_process_document(
        &self,
        document: &Document,
    ) -> Result<ProcessedDocument, PipelineError> {
        let user_id = self.store.current_user().await?;

        if document.is_blank() {
            return Err(PipelineError::EmptyDocument);
        }

        let estimated_tokens = document.estimated_tokens();
        debug!(
            "处理文档: {} ({} 字节, 预估 {} tokens)",
            document.name, document.size_bytes, estimated_tokens
        );

        let user_message = format!(
            "Process this educational document and extract key information in a structured format with clear sections and subsections: {}",
            document.content
        );
        let content = self
            .llm
            .send_to_llm(&user_message, Some(PROCESS_SYSTEM_PROMPT), estimated_tokens)
            .await?;

        let lesson_id = self
            .store
            .create_lesson(NewLesson {
                title: document.title().to_string(),
                content: content.clone(),
                user_id,
                status: LessonStatus::Processing,
                course_id: None,
            })
            .await?;

        info!("✓ 文档处理完成，已创建课时 {}", lesson_id);
        Ok(ProcessedDocument { lesson_id, content })
    }

    async fn try_evaluate_lesson(&self, lesson_id: &str) -> Result<Evaluation, PipelineError> {
        let content = self.store.read_lesson_content(lesson_id).await?;
        let estimated_tokens = estimate_tokens(content.len() as u64);

        let user_message = format!(
            "Evaluate this lesson content and provide a quality assessment: {}",
            content
        );
        let feedback = self
            .llm
            .send_to_llm(&user_message, Some(EVALUATE_SYSTEM_PROMPT), estimated_tokens)
            .await?;

        let quality_score = parse_quality_score(&feedback);
        debug!("课时 {} 评分: {:.2}", lesson_id, quality_score);

        Ok(Evaluation {
            quality_score,
            feedback,
        })
    }

    async fn try_refine_lesson(&self, lesson_id: &str) -> Result<Refinement, PipelineError> {
        let content = self.store.read_lesson_content(lesson_id).await?;
        let estimated_tokens = estimate_tokens(content.len() as u64);

        let user_message = format!(
            "Improve this lesson content while maintaining its core message and structure: {}",
            content
        );
        let refined_content = self
            .llm
            .send_to_llm(&user_message, Some(REFINE_SYSTEM_PROMPT), estimated_tokens)
            .await?;

        self.store
            .update_lesson(
                lesson_id,
                LessonUpdate::status(LessonStatus::Complete).with_content(refined_content.clone()),
            )
            .await?;

        info!("✓ 课时 {} 优化完成", lesson_id);
        Ok(Refinement { refined_content })
    }

    async fn try_architect_course(&self, course_id: &str) -> Result<CourseOutline, PipelineError> {
        let user_id = self.store.current_user().await?;
        let course = self.store.get_course(course_id).await?;
        let lessons = self
            .store
            .query_lessons(LessonFilter::for_user(user_id).in_course(course_id))
            .await?;

        if lessons.is_empty() {
            warn!("课程 {} 下没有课时，跳过结构生成", course.title);
            return Err(PipelineError::EmptyCourse(course_id.to_string()));
        }

        let listing = lessons
            .iter()
            .enumerate()
            .map(|(i, lesson)| {
                format!(
                    "{}. {}\n{}",
                    i + 1,
                    lesson.title,
                    truncate_text(&lesson.content, ARCHITECT_EXCERPT_CHARS)
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n");

        let user_message = format!(
            "Design the structure of the course \"{}\" from these lessons:\n\n{}",
            course.title, listing
        );
        let estimated_tokens = estimate_tokens(user_message.len() as u64);

        let structure = self
            .llm
            .send_to_llm(&user_message, Some(ARCHITECT_SYSTEM_PROMPT), estimated_tokens)
            .await?;

        self.store
            .update_course_structure(course_id, structure.clone())
            .await?;

        info!("✓ 课程 {} 结构已生成 ({} 个课时)", course.title, lessons.len());
        Ok(CourseOutline {
            course_id: course_id.to_string(),
            structure,
        })
    }
}

/// 取回复中第一个数字作为分数，夹到 [0, 1]，没有数字时为 0.5
pub fn parse_quality_score(text: &str) -> f64 {
    let Ok(pattern) = Regex::new(SCORE_PATTERN) else {
        return DEFAULT_QUALITY_SCORE;
    };

    pattern
        .find(text)
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .map(|score| score.clamp(0.0, 1.0))
        .unwrap_or(DEFAULT_QUALITY_SCORE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_quality_score() {
        assert!((parse_quality_score("Quality score: 0.42 out of 1.0") - 0.42).abs() < 1e-9);
        assert!((parse_quality_score("Score .8") - 0.8).abs() < 1e-9);
        assert!((parse_quality_score("no numbers here") - 0.5).abs() < 1e-9);
        // 第一个数字大于 1 时夹到 1
        assert!((parse_quality_score("I rate this 7 out of 10") - 1.0).abs() < 1e-9);
    }
}
