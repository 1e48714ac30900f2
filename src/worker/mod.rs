//! Job execution.
//!
//! [`ChapterDownloader`] turns one claimed job into a downloaded chapter:
//!
//! 1. Load the story and resolve its provider
//! 2. Fetch, clean and length-check the chapter text
//! 3. Save it to chapter storage
//! 4. Merge the result into the story record under the story's lock
//!
//! Failures at any step are reported in the returned
//! [`ExecutionResult`](executor::ExecutionResult); they never escape.

pub mod executor;

pub use executor::{ChapterDownloader, ExecutionResult};
