pub mod tasks;

pub use tasks::{BackgroundTaskManager, TaskId, TaskManagerConfig, TaskPriority, TaskResult};
