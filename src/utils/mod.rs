//! Utility modules.

pub mod file;
pub mod retry;
pub mod text;

pub use file::{collect_text_files, file_title, is_text_file, read_file_content};
pub use retry::{RetryPolicy, Retryable, with_retry};
pub use text::{preview, truncate_chars};
