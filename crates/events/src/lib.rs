//! Task lifecycle events.
//!
//! The queue manager and worker publish; external sinks (audit log,
//! notifier) subscribe. Nothing in this crate delivers anywhere.

pub mod bus;

pub use bus::{EventBus, TaskEvent};
pub use bus::{TASK_CANCELLED, TASK_COMPLETED, TASK_CREATED, TASK_FAILED, TASK_STARTED};
