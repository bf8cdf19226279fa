/// User primary keys are PostgreSQL BIGSERIAL.
pub type DbId = i64;

/// Session ids are random UUIDs so they cannot be enumerated.
pub type SessionId = uuid::Uuid;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
