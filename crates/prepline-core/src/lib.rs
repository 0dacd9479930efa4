//! Prepline Core - shared runtime for the preprint harvest pipeline
//!
//! HTTP access with bounded retries and a process-wide rate limit,
//! logging and progress plumbing, graceful shutdown, and the parquet
//! sink used for exports.

pub mod error;
pub mod http;
pub mod logging;
pub mod progress;
pub mod rate_limit;
pub mod retry;
pub mod shutdown;
pub mod sink;
pub mod work_queue;

// Re-exports for convenience
pub use error::FetchError;
pub use http::{SHARED_RUNTIME, get_text, http_client};
pub use logging::{IndicatifLogger, init_logging};
pub use progress::{ProgressContext, SharedProgress, fmt_num};
pub use rate_limit::RateLimiter;
pub use retry::{RetryPolicy, retry_with_backoff};
pub use shutdown::{install_signal_handlers, is_shutdown_requested, shutdown_flag};
pub use sink::{ParquetSink, is_valid_parquet};
pub use work_queue::WorkQueue;
