//! 进度上报
//!
//! 事件同时写入 tracing 和（可选的）事件通道，通道关闭后只写 tracing。

use futures::channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use tracing::{error, info};

use crate::models::{ProgressEvent, ProgressLevel};

/// 进度上报器，克隆后共享同一个通道
#[derive(Debug, Clone, Default)]
pub struct ProgressReporter {
    sender: Option<UnboundedSender<ProgressEvent>>,
    model: Option<String>,
}

impl ProgressReporter {
    /// 只写 tracing
    pub fn silent() -> Self {
        Self::default()
    }

    /// 创建带通道的上报器
    pub fn channel() -> (Self, UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = unbounded();
        (
            Self {
                sender: Some(tx),
                model: None,
            },
            rx,
        )
    }

    /// 智能体事件附带的模型名称
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn emit(&self, mut event: ProgressEvent) {
        if event.level == ProgressLevel::Agent && event.model.is_none() {
            event.model = self.model.clone();
        }

        let lesson = event.lesson_id.as_deref().unwrap_or("-");
        let agent = event.agent.map(|a| a.label()).unwrap_or("");
        match event.level {
            ProgressLevel::Error => error!(lesson, agent, "{}", event.message),
            ProgressLevel::Success => info!(lesson, agent, "✓ {}", event.message),
            ProgressLevel::Info | ProgressLevel::Agent => info!(lesson, agent, "{}", event.message),
        }

        if let Some(sender) = &self.sender {
            // 接收端已关闭时忽略
            let _ = sender.unbounded_send(event);
        }
    }
}
