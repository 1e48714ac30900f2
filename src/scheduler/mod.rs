//! Download queue primitives.
//!
//! - [`JobStore`]: durable, insertion-ordered job list with crash recovery
//! - [`StoryLocks`]: per-story serialization of story record merges
//! - [`EventBus`]: lifecycle event fan-out
//!
//! The scheduling loop that drives these lives in [`crate::manager`].

pub mod events;
pub mod job;
pub mod lock;
pub mod persistence;
pub mod queue;

pub use events::{EventBus, QueueEvent};
pub use job::{ChapterRef, Job, JobStats, JobStatus};
pub use lock::StoryLocks;
pub use persistence::{FilePersistence, JobPersistence, MemoryPersistence};
pub use queue::{AddOutcome, JobStore};
