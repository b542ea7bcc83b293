use crate::Timestamp;

/// Computes the fixed-grid bucket start a timestamp falls into.
///
/// A reading with `ts == start + width` belongs to the *next* bucket.
pub fn bucket_start(ts: Timestamp, width: Timestamp) -> Timestamp {
    ts - ts % width
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BucketState {
    /// Further readings may still land in the bucket.
    Open,
    /// The aggregate is frozen; the bucket is shared read-only.
    Closed,
}

/// Running aggregate for one `(entity, bucket start)` cell.
#[derive(Copy, Clone, Debug)]
pub struct Bucket {
    pub start: Timestamp,
    pub sum: f64,
    pub count: u64,
    pub state: BucketState,

    /// Whether the closed aggregate has reached the summary table.
    pub persisted: bool,

    /// Ingestions that reserved this bucket but have not committed yet.
    /// A bucket with reservations in flight is never closed.
    pub inflight: u32,
}

impl Bucket {
    pub fn new_open(start: Timestamp) -> Self {
        Self {
            start,
            sum: 0.0,
            count: 0,
            state: BucketState::Open,
            persisted: false,
            inflight: 0,
        }
    }

    pub fn add(&mut self, value: f64) {
        debug_assert_eq!(self.state, BucketState::Open);
        self.sum += value;
        self.count += 1;
    }

    /// Transitions to CLOSED. Idempotent; returns whether this call closed it.
    pub fn close(&mut self) -> bool {
        if self.state == BucketState::Closed {
            return false;
        }
        self.state = BucketState::Closed;
        true
    }

    pub fn is_open(&self) -> bool {
        self.state == BucketState::Open
    }

    /// Bitwise aggregate equality, used by rebuild verification.
    pub fn same_aggregate(&self, other: &Self) -> bool {
        self.start == other.start
            && self.count == other.count
            && self.sum.to_bits() == other.sum.to_bits()
    }
}
