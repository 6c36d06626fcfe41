//! 基础设施层（Infrastructure Layer）
//!
//! 持有稀缺资源（HTTP 客户端、限流计数器、存储），只暴露能力，不含业务流程。

pub mod lesson_store;
pub mod rate_limiter;
pub mod retry;
pub mod transport;

pub use lesson_store::{InMemoryLessonStore, LessonStore};
pub use rate_limiter::{LimiterSnapshot, Permit, RateLimitSettings, RateLimiter};
pub use retry::{is_retryable, RetryPolicy};
pub use transport::{HttpTransport, LlmTransport};
