pub mod lesson_ctx;
pub mod lesson_flow;
pub mod progress;

pub use lesson_ctx::LessonCtx;
pub use lesson_flow::{FlowOutcome, LessonFlow};
pub use progress::ProgressReporter;
