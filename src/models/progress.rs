//! 流水线进度事件

use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use std::fmt::Display;

use crate::models::lesson::LessonId;

/// 单个课时在流水线中的阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Idle,
    Uploading,
    Processing,
    Evaluating,
    Refining,
    Complete,
    Error,
}

impl PipelineStage {
    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineStage::Complete | PipelineStage::Error)
    }

    /// 合法的阶段迁移
    ///
    /// `Idle → Uploading → Processing → Evaluating → (Refining) → Complete`，
    /// 任何非终止阶段都可以进入 `Error`。
    pub fn can_transition_to(self, next: PipelineStage) -> bool {
        use PipelineStage::*;
        match (self, next) {
            (from, Error) => !from.is_terminal(),
            (Idle, Uploading)
            | (Uploading, Processing)
            | (Processing, Evaluating)
            | (Evaluating, Refining)
            | (Evaluating, Complete)
            | (Refining, Complete) => true,
            _ => false,
        }
    }

    /// 负责该阶段的智能体
    pub fn agent(self) -> Option<Agent> {
        match self {
            PipelineStage::Processing => Some(Agent::Architect),
            PipelineStage::Evaluating => Some(Agent::ContentEvaluator),
            PipelineStage::Refining => Some(Agent::Innovator),
            PipelineStage::Complete => Some(Agent::Publisher),
            _ => None,
        }
    }
}

/// 进度展示中使用的智能体标签
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Agent {
    Architect,
    ContentEvaluator,
    Innovator,
    Publisher,
}

impl Agent {
    pub fn label(self) -> &'static str {
        match self {
            Agent::Architect => "Architect Agent",
            Agent::ContentEvaluator => "Content Evaluator Agent",
            Agent::Innovator => "Innovator Agent",
            Agent::Publisher => "Publisher Agent",
        }
    }
}

/// 事件级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressLevel {
    Info,
    Success,
    Error,
    Agent,
}

/// 一条进度事件
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressEvent {
    pub timestamp: DateTime<Utc>,
    pub level: ProgressLevel,
    pub message: String,
    pub agent: Option<Agent>,
    pub model: Option<String>,
    pub stage: Option<PipelineStage>,
    pub lesson_id: Option<LessonId>,
}

impl ProgressEvent {
    pub fn new(level: ProgressLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            message: message.into(),
            agent: None,
            model: None,
            stage: None,
            lesson_id: None,
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(ProgressLevel::Info, message)
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(ProgressLevel::Success, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(ProgressLevel::Error, message)
    }

    /// 阶段事件，智能体取该阶段的负责者
    pub fn stage(stage: PipelineStage, message: impl Into<String>) -> Self {
        let mut event = Self::new(ProgressLevel::Agent, message);
        event.agent = stage.agent();
        event.stage = Some(stage);
        event
    }

    pub fn with_lesson(mut self, lesson_id: impl Into<LessonId>) -> Self {
        self.lesson_id = Some(lesson_id.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

impl Display for ProgressEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}]",
            self.timestamp.with_timezone(&Local).format("%H:%M:%S")
        )?;
        if let Some(agent) = self.agent {
            write!(f, " [{}]", agent.label())?;
        }
        write!(f, " {}", self.message)?;
        if let Some(model) = &self.model {
            write!(f, " ({})", model)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_transitions() {
        use PipelineStage::*;
        assert!(Idle.can_transition_to(Uploading));
        assert!(Evaluating.can_transition_to(Complete));
        assert!(Evaluating.can_transition_to(Refining));
        assert!(Processing.can_transition_to(Error));
        assert!(!Processing.can_transition_to(Refining));
        assert!(!Complete.can_transition_to(Error));
        assert!(!Error.can_transition_to(Error));
    }

    #[test]
    fn test_stage_event_carries_agent() {
        let event = ProgressEvent::stage(PipelineStage::Refining, "Refining lesson")
            .with_lesson("l1")
            .with_model("m");
        assert_eq!(event.agent, Some(Agent::Innovator));
        assert_eq!(event.level, ProgressLevel::Agent);

        let line = event.to_string();
        assert!(line.contains("[Innovator Agent] Refining lesson (m)"));
    }
}
