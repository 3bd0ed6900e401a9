//! Result publishing: debounced requests and ordered delivery to subscribers.

pub mod publisher;
pub mod scheduler;

pub use publisher::{ChangedKeys, ResultPublisher, SEARCH_TASK, SearchStatus, SnapshotKey, Trigger};
pub use scheduler::{Scheduler, Task, TokioScheduler};
