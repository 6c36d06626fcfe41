//! 课程与课时
//!
//! 实体的生命周期由持久化协作方管理，流水线只按 id 引用并读写
//! `content` / `status` / `metadata`。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

pub type LessonId = String;
pub type CourseId = String;
pub type UserId = String;

/// 课时状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LessonStatus {
    Processing,
    Complete,
    Failed,
    NeedsRefinement,
    Incomplete,
}

impl LessonStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            LessonStatus::Processing => "processing",
            LessonStatus::Complete => "complete",
            LessonStatus::Failed => "failed",
            LessonStatus::NeedsRefinement => "needs_refinement",
            LessonStatus::Incomplete => "incomplete",
        }
    }
}

/// 课时分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LessonCategory {
    #[default]
    Core,
    Supplementary,
    Exploratory,
}

/// 课时
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lesson {
    pub id: LessonId,
    pub title: String,
    pub content: String,
    pub category: LessonCategory,
    pub status: LessonStatus,
    pub metadata: JsonValue,
    pub user_id: UserId,
    pub course_id: Option<CourseId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 新建课时所需字段
#[derive(Debug, Clone, PartialEq)]
pub struct NewLesson {
    pub title: String,
    pub content: String,
    pub user_id: UserId,
    pub status: LessonStatus,
    pub course_id: Option<CourseId>,
}

/// 课时的部分更新，`None` 表示不修改
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LessonUpdate {
    pub content: Option<String>,
    pub status: Option<LessonStatus>,
    /// 与已有 metadata 做浅合并
    pub metadata: Option<JsonValue>,
}

impl LessonUpdate {
    pub fn status(status: LessonStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn with_metadata(mut self, metadata: JsonValue) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// 查询条件，字段之间为 AND
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LessonFilter {
    pub user_id: Option<UserId>,
    pub course_id: Option<CourseId>,
    pub status: Option<LessonStatus>,
    pub exclude_status: Option<LessonStatus>,
}

impl LessonFilter {
    pub fn for_user(user_id: impl Into<UserId>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ..Default::default()
        }
    }

    pub fn in_course(mut self, course_id: impl Into<CourseId>) -> Self {
        self.course_id = Some(course_id.into());
        self
    }

    pub fn with_status(mut self, status: LessonStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn excluding_status(mut self, status: LessonStatus) -> Self {
        self.exclude_status = Some(status);
        self
    }

    pub fn matches(&self, lesson: &Lesson) -> bool {
        self.user_id.as_ref().map_or(true, |u| &lesson.user_id == u)
            && self
                .course_id
                .as_ref()
                .map_or(true, |c| lesson.course_id.as_ref() == Some(c))
            && self.status.map_or(true, |s| lesson.status == s)
            && self.exclude_status.map_or(true, |s| lesson.status != s)
    }
}

/// 课程
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Course {
    pub id: CourseId,
    pub title: String,
    pub description: Option<String>,
    /// 课程结构步骤的输出
    pub structure: Option<String>,
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
}

// ========== 各阶段的产出 ==========

/// 文档抽取结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessedDocument {
    pub lesson_id: LessonId,
    pub content: String,
}

/// 质量评估结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evaluation {
    /// [0, 1]
    pub quality_score: f64,
    pub feedback: String,
}

/// 优化结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Refinement {
    pub refined_content: String,
}

/// 课程结构
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CourseOutline {
    pub course_id: CourseId,
    pub structure: String,
}
