/// Partners, endpoints, delivery logs and inbound log entries are keyed by UUID.
pub type EntityId = uuid::Uuid;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
