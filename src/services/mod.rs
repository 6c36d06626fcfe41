pub mod error_classifier;
pub mod lesson_service;
pub mod llm_service;
pub mod monitoring;
pub mod progress_writer;

pub use error_classifier::{classify, ErrorClassifier, ErrorInfo, ErrorKind, PipelineResult};
pub use lesson_service::{parse_quality_score, LessonService};
pub use llm_service::LlmService;
pub use monitoring::{AiMonitor, Alert, MetricKind, MetricPoint, MonitorSettings};
pub use progress_writer::ProgressWriter;
