use crate::{Timestamp, Value};

/// Error type
#[derive(Debug)]
pub enum Error {
    /// An IO error.
    Io(std::io::Error),

    /// Error in the storage engine.
    Storage(fjall::Error),

    /// The engine was configured with missing or contradictory parameters.
    InvalidConfig(&'static str),

    /// The hot bucket index disagrees with the durable reading store.
    ///
    /// Raised by rebuild when a replayed aggregate does not reproduce the
    /// live one bit for bit; the engine refuses to serve stale aggregates.
    CorruptedIndex {
        /// Formatted entity key of the mismatched bucket.
        entity: String,
        /// Start of the mismatched bucket.
        bucket_start: Timestamp,
    },

    /// The reading store failed.
    Store(StoreError),

    /// A reading was rejected during ingestion.
    Ingest(IngestError),

    /// A range-average query failed.
    Query(QueryError),
}

impl From<fjall::Error> for Error {
    fn from(value: fjall::Error) -> Self {
        Self::Storage(value)
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<StoreError> for Error {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

impl From<IngestError> for Error {
    fn from(value: IngestError) -> Self {
        Self::Ingest(value)
    }
}

impl From<QueryError> for Error {
    fn from(value: QueryError) -> Self {
        Self::Query(value)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "{e}"),
            Self::Storage(e) => write!(f, "{e}"),
            Self::InvalidConfig(msg) => write!(f, "invalid configuration: {msg}"),
            Self::CorruptedIndex {
                entity,
                bucket_start,
            } => {
                write!(f, "bucket index corrupted for {entity} at {bucket_start}")
            }
            Self::Store(e) => write!(f, "{e}"),
            Self::Ingest(e) => write!(f, "{e}"),
            Self::Query(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for Error {}

/// Result helper type
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the durable reading store.
#[derive(Debug)]
pub enum StoreError {
    /// The backing store failed or timed out during an I/O operation.
    ///
    /// Transient; the caller decides between retrying and surfacing it.
    Unavailable(Box<dyn std::error::Error + Send + Sync>),
}

impl StoreError {
    pub(crate) fn timed_out() -> Self {
        Self::Unavailable(Box::new(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            "scan exceeded the query deadline",
        )))
    }
}

impl From<fjall::Error> for StoreError {
    fn from(value: fjall::Error) -> Self {
        Self::Unavailable(Box::new(value))
    }
}

impl From<std::io::Error> for StoreError {
    fn from(value: std::io::Error) -> Self {
        Self::Unavailable(Box::new(value))
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unavailable(e) => write!(f, "store unavailable: {e}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Error type for rejected or failed ingestions.
#[derive(Debug)]
pub enum IngestError {
    /// The reading's value lies outside the configured sane range.
    OutOfRange {
        /// The rejected value.
        value: Value,
        /// Lower bound of the accepted range.
        min: Value,
        /// Upper bound of the accepted range.
        max: Value,
    },

    /// The reading arrived too late to be folded into its bucket.
    ///
    /// Late data beyond the tolerance cannot be folded into an already
    /// closed bucket and must not silently corrupt closed aggregates.
    TooLate {
        /// Timestamp of the rejected reading.
        ts: Timestamp,
        /// Start of the bucket the reading targeted.
        bucket_start: Timestamp,
    },

    /// The reading store rejected the append.
    ///
    /// Fatal for this reading; nothing was recorded on either side.
    Store(StoreError),
}

impl std::fmt::Display for IngestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OutOfRange { value, min, max } => {
                write!(f, "value {value} outside accepted range [{min}, {max}]")
            }
            Self::TooLate { ts, bucket_start } => {
                write!(f, "reading at {ts} is too late for bucket {bucket_start}")
            }
            Self::Store(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for IngestError {}

/// Error type for range-average queries.
#[derive(Debug)]
pub enum QueryError {
    /// No readings fell into the queried range.
    ///
    /// A valid empty result, not an engine failure.
    NoData,

    /// The reading store failed or timed out while serving the query.
    StoreUnavailable(StoreError),
}

impl From<StoreError> for QueryError {
    fn from(value: StoreError) -> Self {
        Self::StoreUnavailable(value)
    }
}

impl std::fmt::Display for QueryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoData => write!(f, "no data in range"),
            Self::StoreUnavailable(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for QueryError {}
