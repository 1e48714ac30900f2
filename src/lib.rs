pub mod config;
pub mod dashboard;
pub mod error;
pub mod manager;
pub mod progress;
pub mod provider;
pub mod scheduler;
pub mod shutdown;
pub mod storage;
pub mod story;
pub mod worker;

pub use error::{DownloadError, Result};
pub use manager::DownloadManager;
