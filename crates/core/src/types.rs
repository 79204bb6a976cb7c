/// Worker connections are identified by a UUID v4 string assigned on accept.
pub type ClientId = String;

/// Tasks are identified by a UUID v4 string; sent to workers as `commandId`.
pub type TaskId = String;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
