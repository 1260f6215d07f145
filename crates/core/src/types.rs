/// Primary keys of externally-owned entities (users, platform connections)
/// are PostgreSQL BIGSERIAL.
pub type DbId = i64;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Tasks are keyed by time-ordered UUIDs (v7), assigned at enqueue.
pub type TaskId = uuid::Uuid;
