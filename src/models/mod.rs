pub mod chat;
pub mod document;
pub mod lesson;
pub mod loaders;
pub mod progress;
pub mod provider;

pub use chat::{ChatMessage, ChatRequest, ChatRole};
pub use document::Document;
pub use lesson::{
    Course, CourseId, CourseOutline, Evaluation, Lesson, LessonCategory, LessonFilter, LessonId,
    LessonStatus, LessonUpdate, NewLesson, ProcessedDocument, Refinement, UserId,
};
pub use loaders::{load_all_documents, load_document};
pub use progress::{Agent, PipelineStage, ProgressEvent, ProgressLevel};
pub use provider::{ProviderKind, WireFormat};
