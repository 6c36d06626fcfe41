//! # Lesson Pipeline
//!
//! 把文档送入"抽取 → 评估 → 条件优化"的 AI 流水线，
//! 面对有速率限制、不稳定的远程模型 API
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有稀缺资源，只暴露能力
//! - `RateLimiter` - 每分钟请求/token 预算 + 并发上限 + FIFO 等待队列
//! - `HttpTransport` - 带超时、响应校验和指数退避重试的模型调用
//! - `LessonStore` - 课时与课程的持久化接口
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，只处理单个课时
//! - `LlmService` - 限流保护下的一次模型调用
//! - `LessonService` - 抽取 / 评估 / 优化 / 课程结构
//! - `ErrorClassifier` - 错误分类与用户文案
//! - `AiMonitor` - 延迟、token、错误指标与告警
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一个课时"的完整处理流程
//! - `LessonFlow` - 阶段编排（processing → evaluating → refining → complete）
//! - `ProgressReporter` - 进度事件
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/pipeline` - 流水线入口
//! - `orchestrator/course_processor` - 按课程遍历课时
//! - `orchestrator/batch_processor` - 命令行批量处理
//!
//! ## 模块结构

pub mod config;
pub mod error;
pub mod infrastructure;
pub mod logger;
pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::Config;
pub use error::{AppError, AppResult, PipelineError, TransportError};
pub use infrastructure::{HttpTransport, InMemoryLessonStore, LessonStore, LlmTransport, RateLimiter};
pub use models::{Document, ProgressEvent};
pub use orchestrator::{App, Pipeline};
pub use services::{AiMonitor, ErrorInfo, ErrorKind, PipelineResult};
pub use workflow::{FlowOutcome, LessonFlow, ProgressReporter};
