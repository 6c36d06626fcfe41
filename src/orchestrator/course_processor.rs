//! 课程级处理器 - 编排层
//!
//! 顺序遍历课时，单个课时失败只记录，不影响其他课时；
//! 每个课程处理完后生成课程结构。

use tracing::info;

use crate::models::{
    Agent, CourseId, Lesson, LessonFilter, LessonStatus, ProgressEvent, ProgressLevel,
};
use crate::orchestrator::pipeline::Pipeline;
use crate::services::LessonService;
use crate::workflow::{LessonFlow, ProgressReporter};

/// 课程级处理统计
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CourseStats {
    /// 完成评估（及必要的优化）的课时
    pub evaluated: usize,
    /// 其中经过优化的课时
    pub refined: usize,
    /// 失败的课时
    pub failed: usize,
    /// 成功生成结构的课程
    pub courses_architected: usize,
}

/// 同一课程下的课时（`course_id` 为 None 表示未归入课程）
#[derive(Debug, Clone, PartialEq)]
pub struct CourseGroup {
    pub course_id: Option<CourseId>,
    pub lessons: Vec<Lesson>,
}

/// 按课程分组，课程按首次出现的顺序排列，未归入课程的课时排在最后
pub fn group_by_course(lessons: Vec<Lesson>) -> Vec<CourseGroup> {
    let mut groups: Vec<CourseGroup> = Vec::new();
    let mut unassigned = Vec::new();

    for lesson in lessons {
        match lesson.course_id.clone() {
            Some(course_id) => {
                match groups
                    .iter_mut()
                    .find(|g| g.course_id.as_deref() == Some(course_id.as_str()))
                {
                    Some(group) => group.lessons.push(lesson),
                    None => groups.push(CourseGroup {
                        course_id: Some(course_id),
                        lessons: vec![lesson],
                    }),
                }
            }
            None => unassigned.push(lesson),
        }
    }

    if !unassigned.is_empty() {
        groups.push(CourseGroup {
            course_id: None,
            lessons: unassigned,
        });
    }
    groups
}

/// 全局刷新
pub async fn refresh_all(pipeline: &Pipeline, reporter: &ProgressReporter) -> CourseStats {
    let mut stats = CourseStats::default();
    let lessons = pipeline.lessons();

    reporter.emit(ProgressEvent::info("Starting global refresh"));

    let user_id = match lessons.store().current_user().await {
        Ok(user_id) => user_id,
        Err(e) => {
            let info = lessons.classifier().handle(e.into());
            reporter.emit(ProgressEvent::error(format!("Refresh aborted: {}", info)));
            return stats;
        }
    };

    let filter = LessonFilter::for_user(user_id).excluding_status(LessonStatus::Incomplete);
    let all_lessons = match lessons.store().query_lessons(filter).await {
        Ok(all_lessons) => all_lessons,
        Err(e) => {
            let info = lessons.classifier().handle(e.into());
            reporter.emit(ProgressEvent::error(format!("Refresh aborted: {}", info)));
            return stats;
        }
    };

    if all_lessons.is_empty() {
        reporter.emit(ProgressEvent::info("No lessons to refresh"));
        return stats;
    }

    let groups = group_by_course(all_lessons);
    let flow = pipeline.flow();

    for group in groups {
        let label = match &group.course_id {
            Some(course_id) => course_title(lessons, course_id).await,
            None => "Unassigned lessons".to_string(),
        };
        reporter.emit(ProgressEvent::info(format!(
            "Processing course: {} ({} lessons)",
            label,
            group.lessons.len()
        )));

        for lesson in &group.lessons {
            refresh_lesson(&flow, lesson, reporter, &mut stats).await;
        }

        if let Some(course_id) = &group.course_id {
            architect(lessons, course_id, &label, reporter, &mut stats).await;
        }
    }

    reporter.emit(ProgressEvent::success(format!(
        "Global refresh complete: {} evaluated, {} refined, {} failed, {} courses structured",
        stats.evaluated, stats.refined, stats.failed, stats.courses_architected
    )));
    stats
}

/// 刷新单个课程中状态为 `complete` 的课时
pub async fn refresh_course(
    pipeline: &Pipeline,
    course_id: &str,
    reporter: &ProgressReporter,
) -> CourseStats {
    let mut stats = CourseStats::default();
    let lessons = pipeline.lessons();

    let user_id = match lessons.store().current_user().await {
        Ok(user_id) => user_id,
        Err(e) => {
            let info = lessons.classifier().handle(e.into());
            reporter.emit(ProgressEvent::error(format!("Refresh aborted: {}", info)));
            return stats;
        }
    };

    let filter = LessonFilter::for_user(user_id)
        .in_course(course_id)
        .with_status(LessonStatus::Complete);
    let course_lessons = match lessons.store().query_lessons(filter).await {
        Ok(course_lessons) => course_lessons,
        Err(e) => {
            let info = lessons.classifier().handle(e.into());
            reporter.emit(ProgressEvent::error(format!("Refresh aborted: {}", info)));
            return stats;
        }
    };

    let title = course_title(lessons, course_id).await;
    reporter.emit(ProgressEvent::info(format!(
        "Refreshing course: {} ({} lessons)",
        title,
        course_lessons.len()
    )));

    let flow = pipeline
        .flow()
        .with_stage_retry(pipeline.config().stage_retry.clone());
    for lesson in &course_lessons {
        refresh_lesson(&flow, lesson, reporter, &mut stats).await;
    }

    info!(
        "课程 {} 刷新完成: 评估 {}，优化 {}，失败 {}",
        title, stats.evaluated, stats.refined, stats.failed
    );
    stats
}

async fn refresh_lesson(
    flow: &LessonFlow,
    lesson: &Lesson,
    reporter: &ProgressReporter,
    stats: &mut CourseStats,
) {
    reporter.emit(ProgressEvent::info(format!("Lesson: {}", lesson.title)).with_lesson(&lesson.id));

    match flow.evaluate_and_refine(&lesson.id, reporter).await {
        Ok(outcome) => {
            stats.evaluated += 1;
            if outcome.refined {
                stats.refined += 1;
            }
        }
        // 失败已由流程上报，继续下一个
        Err(_) => stats.failed += 1,
    }
}

async fn architect(
    lessons: &LessonService,
    course_id: &str,
    title: &str,
    reporter: &ProgressReporter,
    stats: &mut CourseStats,
) {
    let mut event = ProgressEvent::new(
        ProgressLevel::Agent,
        format!("Designing course structure: {}", title),
    );
    event.agent = Some(Agent::Architect);
    reporter.emit(event);

    match lessons.architect_course(course_id).await {
        Ok(_) => {
            stats.courses_architected += 1;
            reporter.emit(ProgressEvent::success(format!("Course structured: {}", title)));
        }
        Err(info) => {
            reporter.emit(ProgressEvent::error(format!(
                "Course structure failed for {}: {}",
                title, info
            )));
        }
    }
}

async fn course_title(lessons: &LessonService, course_id: &str) -> String {
    lessons
        .store()
        .get_course(course_id)
        .await
        .map(|course| course.title)
        .unwrap_or_else(|_| course_id.to_string())
}
