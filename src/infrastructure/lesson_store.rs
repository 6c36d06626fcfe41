//! 持久化协作方
//!
//! 流水线只通过 `LessonStore` 读写课时和课程，不关心背后的存储。
//! `InMemoryLessonStore` 用于命令行程序和测试。

use crate::error::StoreError;
use crate::models::{
    Course, CourseId, Lesson, LessonCategory, LessonFilter, LessonId, LessonUpdate, NewLesson,
    UserId,
};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value as JsonValue;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

/// 课时存储接口
#[async_trait]
pub trait LessonStore: Send + Sync {
    /// 当前登录用户，未登录返回 `StoreError::NotAuthenticated`
    async fn current_user(&self) -> Result<UserId, StoreError>;

    async fn create_lesson(&self, lesson: NewLesson) -> Result<LessonId, StoreError>;

    async fn read_lesson_content(&self, id: &str) -> Result<String, StoreError>;

    async fn get_lesson(&self, id: &str) -> Result<Lesson, StoreError>;

    /// 部分更新，`metadata` 做浅合并
    async fn update_lesson(&self, id: &str, update: LessonUpdate) -> Result<(), StoreError>;

    /// 按条件查询，保持插入顺序
    async fn query_lessons(&self, filter: LessonFilter) -> Result<Vec<Lesson>, StoreError>;

    async fn get_course(&self, id: &str) -> Result<Course, StoreError>;

    async fn update_course_structure(
        &self,
        course_id: &str,
        structure: String,
    ) -> Result<(), StoreError>;
}

#[derive(Default)]
struct StoreState {
    user: Option<UserId>,
    lessons: Vec<Lesson>,
    courses: Vec<Course>,
}

/// 内存实现
#[derive(Default)]
pub struct InMemoryLessonStore {
    state: Mutex<StoreState>,
}

impl InMemoryLessonStore {
    /// 未登录的空存储
    pub fn new() -> Self {
        Self::default()
    }

    /// 以指定用户登录的空存储
    pub fn with_user(user_id: impl Into<UserId>) -> Self {
        let store = Self::default();
        store.lock().user = Some(user_id.into());
        store
    }

    pub fn sign_out(&self) {
        self.lock().user = None;
    }

    /// 为当前用户创建课程
    pub fn create_course(&self, title: impl Into<String>) -> Result<CourseId, StoreError> {
        let mut state = self.lock();
        let user_id = state.user.clone().ok_or(StoreError::NotAuthenticated)?;
        let id = Uuid::new_v4().to_string();
        state.courses.push(Course {
            id: id.clone(),
            title: title.into(),
            description: None,
            structure: None,
            user_id,
            created_at: Utc::now(),
        });
        Ok(id)
    }

    /// 把课时归入课程
    pub fn assign_course(&self, lesson_id: &str, course_id: &str) -> Result<(), StoreError> {
        let mut state = self.lock();
        if !state.courses.iter().any(|c| c.id == course_id) {
            return Err(not_found("course", course_id));
        }
        let lesson = state
            .lessons
            .iter_mut()
            .find(|l| l.id == lesson_id)
            .ok_or_else(|| not_found("lesson", lesson_id))?;
        lesson.course_id = Some(course_id.to_string());
        lesson.updated_at = Utc::now();
        Ok(())
    }

    pub fn lesson_count(&self) -> usize {
        self.lock().lessons.len()
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl LessonStore for InMemoryLessonStore {
    async fn current_user(&self) -> Result<UserId, StoreError> {
        self.lock().user.clone().ok_or(StoreError::NotAuthenticated)
    }

    async fn create_lesson(&self, lesson: NewLesson) -> Result<LessonId, StoreError> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        self.lock().lessons.push(Lesson {
            id: id.clone(),
            title: lesson.title,
            content: lesson.content,
            category: LessonCategory::default(),
            status: lesson.status,
            metadata: JsonValue::Object(Default::default()),
            user_id: lesson.user_id,
            course_id: lesson.course_id,
            created_at: now,
            updated_at: now,
        });
        Ok(id)
    }

    async fn read_lesson_content(&self, id: &str) -> Result<String, StoreError> {
        self.get_lesson(id).await.map(|lesson| lesson.content)
    }

    async fn get_lesson(&self, id: &str) -> Result<Lesson, StoreError> {
        self.lock()
            .lessons
            .iter()
            .find(|l| l.id == id)
            .cloned()
            .ok_or_else(|| not_found("lesson", id))
    }

    async fn update_lesson(&self, id: &str, update: LessonUpdate) -> Result<(), StoreError> {
        let mut state = self.lock();
        let lesson = state
            .lessons
            .iter_mut()
            .find(|l| l.id == id)
            .ok_or_else(|| not_found("lesson", id))?;

        if let Some(content) = update.content {
            lesson.content = content;
        }
        if let Some(status) = update.status {
            lesson.status = status;
        }
        if let Some(metadata) = update.metadata {
            merge_metadata(&mut lesson.metadata, metadata);
        }
        lesson.updated_at = Utc::now();
        Ok(())
    }

    async fn query_lessons(&self, filter: LessonFilter) -> Result<Vec<Lesson>, StoreError> {
        Ok(self
            .lock()
            .lessons
            .iter()
            .filter(|l| filter.matches(l))
            .cloned()
            .collect())
    }

    async fn get_course(&self, id: &str) -> Result<Course, StoreError> {
        self.lock()
            .courses
            .iter()
            .find(|c| c.id == id)
            .cloned()
            .ok_or_else(|| not_found("course", id))
    }

    async fn update_course_structure(
        &self,
        course_id: &str,
        structure: String,
    ) -> Result<(), StoreError> {
        let mut state = self.lock();
        let course = state
            .courses
            .iter_mut()
            .find(|c| c.id == course_id)
            .ok_or_else(|| not_found("course", course_id))?;
        course.structure = Some(structure);
        Ok(())
    }
}

fn not_found(entity: &'static str, id: &str) -> StoreError {
    StoreError::NotFound {
        entity,
        id: id.to_string(),
    }
}

/// 顶层 key 覆盖，非对象直接替换
fn merge_metadata(target: &mut JsonValue, patch: JsonValue) {
    match patch {
        JsonValue::Object(incoming) if target.is_object() => {
            if let Some(existing) = target.as_object_mut() {
                existing.extend(incoming);
            }
        }
        other => *target = other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LessonStatus;
    use serde_json::json;

    fn new_lesson(user: &str, title: &str) -> NewLesson {
        NewLesson {
            title: title.to_string(),
            content: format!("{} content", title),
            user_id: user.to_string(),
            status: LessonStatus::Processing,
            course_id: None,
        }
    }

    #[tokio::test]
    async fn test_unauthenticated_store() {
        let store = InMemoryLessonStore::new();
        assert_eq!(store.current_user().await, Err(StoreError::NotAuthenticated));
        assert!(store.create_course("c").is_err());
    }

    #[tokio::test]
    async fn test_create_and_update_lesson() {
        let store = InMemoryLessonStore::with_user("u1");
        let id = store.create_lesson(new_lesson("u1", "Intro")).await.unwrap();

        store
            .update_lesson(&id, LessonUpdate::default().with_metadata(json!({"quality_score": 0.4})))
            .await
            .unwrap();
        store
            .update_lesson(
                &id,
                LessonUpdate::status(LessonStatus::Complete)
                    .with_content("refined")
                    .with_metadata(json!({"feedback": "ok"})),
            )
            .await
            .unwrap();

        let lesson = store.get_lesson(&id).await.unwrap();
        assert_eq!(lesson.status, LessonStatus::Complete);
        assert_eq!(lesson.content, "refined");
        assert_eq!(lesson.metadata, json!({"quality_score": 0.4, "feedback": "ok"}));
        assert_eq!(store.read_lesson_content(&id).await.unwrap(), "refined");
    }

    #[tokio::test]
    async fn test_missing_lesson() {
        let store = InMemoryLessonStore::with_user("u1");
        let err = store.get_lesson("nope").await.unwrap_err();
        assert_eq!(err.to_string(), "lesson not found: nope");
    }

    #[tokio::test]
    async fn test_query_keeps_insertion_order() {
        let store = InMemoryLessonStore::with_user("u1");
        let course = store.create_course("Rust").unwrap();
        let a = store.create_lesson(new_lesson("u1", "A")).await.unwrap();
        let _b = store.create_lesson(new_lesson("u2", "B")).await.unwrap();
        let c = store.create_lesson(new_lesson("u1", "C")).await.unwrap();
        store.assign_course(&c, &course).unwrap();

        let mine = store.query_lessons(LessonFilter::for_user("u1")).await.unwrap();
        let titles: Vec<_> = mine.iter().map(|l| l.title.as_str()).collect();
        assert_eq!(titles, vec!["A", "C"]);

        let in_course = store
            .query_lessons(LessonFilter::for_user("u1").in_course(course.clone()))
            .await
            .unwrap();
        assert_eq!(in_course.len(), 1);
        assert_ne!(in_course[0].id, a);

        store
            .update_course_structure(&course, "1. Basics".into())
            .await
            .unwrap();
        assert_eq!(
            store.get_course(&course).await.unwrap().structure.as_deref(),
            Some("1. Basics")
        );
    }
}
