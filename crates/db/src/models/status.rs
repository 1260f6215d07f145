//! Task status enum mapping to the `task_statuses` SMALLINT lookup table.
//!
//! Variant discriminants match the seed data order (1-based) in the
//! `task_statuses` migration. No magic numbers; every status literal in
//! SQL goes through this enum.

/// Status ID type matching SMALLINT/SMALLSERIAL in the database.
pub type StatusId = i16;

/// Task lifecycle status.
///
/// Transitions: queued -> running (claim), queued|running -> cancelled
/// (cancel), running -> completed|failed (complete/fail). Everything else
/// is rejected by the conditional updates in `TaskRepo`.
#[repr(i16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Queued = 1,
    Running = 2,
    Completed = 3,
    Failed = 4,
    Cancelled = 5,
}

/// Terminal statuses: completed, failed, cancelled.
pub const TERMINAL_STATUSES: [StatusId; 3] = [
    TaskStatus::Completed as StatusId,
    TaskStatus::Failed as StatusId,
    TaskStatus::Cancelled as StatusId,
];

impl TaskStatus {
    /// Return the database status ID.
    pub fn id(self) -> StatusId {
        self as StatusId
    }

    /// Parse a database status ID; `None` for ids outside the seed data.
    pub fn from_id(id: StatusId) -> Option<Self> {
        match id {
            1 => Some(Self::Queued),
            2 => Some(Self::Running),
            3 => Some(Self::Completed),
            4 => Some(Self::Failed),
            5 => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Whether no further transitions are possible from this status.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl From<TaskStatus> for StatusId {
    fn from(value: TaskStatus) -> Self {
        value as StatusId
    }
}
