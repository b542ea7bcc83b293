use crate::Timestamp;
use std::time::{SystemTime, UNIX_EPOCH};

/// Returns the current wall-clock time as nanoseconds since the Unix epoch.
#[must_use]
pub fn timestamp() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("Time went backwards")
        .as_nanos()
}
