//! Task queue manager: admission, claiming, transitions, and maintenance.

pub mod error;
pub mod manager;

pub use error::QueueError;
pub use manager::{QueueConfig, TaskQueue};
