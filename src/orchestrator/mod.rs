//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责批量处理和流程调度，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `pipeline` - 流水线入口
//! - 组装限流器、传输层、监控、分类器和存储
//! - `process_one`：单个文档
//! - `process_all`：全局刷新，返回进度事件流
//! - `refresh_course`：单个课程刷新
//!
//! ### `course_processor` - 课程级处理器
//! - 按课程分组遍历课时（`Vec<Lesson>`）
//! - 单个课时失败不影响其他课时
//! - 每个课程结束后生成课程结构
//!
//! ### `batch_processor` - 批量文档处理器
//! - 管理命令行程序的生命周期（初始化、运行）
//! - 控制并发数量（Semaphore）
//! - 输出全局统计信息
//!
//! ## 层次关系
//!
//! ```text
//! batch_processor (处理 Vec<Document>)
//!     ↓
//! pipeline / course_processor (处理 Vec<Lesson>)
//!     ↓
//! workflow::LessonFlow (处理单个课时)
//!     ↓
//! services (能力层：lesson / llm / classifier / monitoring)
//!     ↓
//! infrastructure (基础设施：RateLimiter / HttpTransport / LessonStore)
//! ```

pub mod batch_processor;
pub mod course_processor;
pub mod pipeline;

// 重新导出主要类型
pub use batch_processor::App;
pub use course_processor::{group_by_course, CourseGroup, CourseStats};
pub use pipeline::Pipeline;
