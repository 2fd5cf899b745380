//! Shared helpers reused across the agent runtime crates: error
//! categorization, path normalization, secret sanitization, slug
//! generation and rough token estimation. Kept decoupled from
//! `agentsdk-core` so these leaf concerns can be unit-tested and reused
//! independently of the runtime's async machinery.

pub mod error_category;
pub mod errors;
pub mod paths;
pub mod sanitizer;
pub mod slug;
pub mod telemetry;
pub mod tokens;
pub mod utils;

pub use error_category::{BackoffStrategy, ErrorCategory, Retryability, classify_error_message};
pub use errors::{DisplayErrorFormatter, ErrorFormatter, ErrorReporter, NoopErrorReporter};
pub use paths::{file_name_from_path, is_safe_relative_path, normalize_ascii_identifier};
pub use telemetry::{NoopTelemetry, TelemetrySink};
pub use tokens::{estimate_tokens, truncate_to_tokens};
