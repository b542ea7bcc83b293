use crate::error::StoreError;
use crate::{EntityKey, Timestamp, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

/// A single raw reading, as returned by [`ReadingStore::scan`].
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct DataPoint {
    /// Timestamp of the reading in nanoseconds.
    pub ts: Timestamp,

    /// The recorded value.
    pub value: Value,
}

/// Iterator over raw readings, ordered by timestamp.
pub type ScanIter = Box<dyn Iterator<Item = Result<DataPoint, StoreError>>>;

/// Durable append-only record of raw readings.
///
/// The store is the system of record; the in-memory bucket index is a
/// derived cache that can always be rebuilt by replaying [`Self::scan`].
/// Closed bucket aggregates are additionally written through to a summary
/// table so evicted buckets can be answered without rescanning history.
pub trait ReadingStore: Send + Sync {
    /// Appends one reading.
    ///
    /// Readings are immutable once stored; appending never replaces
    /// earlier data, even for identical timestamps.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the backing store fails.
    fn append(&self, entity: &EntityKey<'_>, ts: Timestamp, value: Value)
        -> Result<(), StoreError>;

    /// Scans readings of one entity over the half-open range `[from, to)`,
    /// ordered by timestamp. Every call returns a fresh, restartable
    /// iterator.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the backing store fails.
    fn scan(
        &self,
        entity: &EntityKey<'_>,
        from: Timestamp,
        to: Timestamp,
    ) -> Result<ScanIter, StoreError>;

    /// Lists every `(building, room)` pair that has at least one reading.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the backing store fails.
    fn entities(&self) -> Result<Vec<(String, String)>, StoreError>;

    /// Writes a closed bucket's aggregate through to the summary table.
    ///
    /// Overwriting an existing summary with the same aggregate is a no-op,
    /// so retries are safe.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the backing store fails.
    fn persist_summary(
        &self,
        entity: &EntityKey<'_>,
        bucket_start: Timestamp,
        sum: f64,
        count: u64,
    ) -> Result<(), StoreError>;

    /// Looks up a previously persisted bucket aggregate.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the backing store fails.
    fn load_summary(
        &self,
        entity: &EntityKey<'_>,
        bucket_start: Timestamp,
    ) -> Result<Option<(f64, u64)>, StoreError>;
}

/// Ephemeral in-memory reading store.
///
/// Useful for tests and short-lived embeddings; nothing survives the
/// process.
pub struct MemoryStore {
    readings: RwLock<BTreeMap<String, BTreeMap<(Timestamp, u64), Value>>>,
    summaries: RwLock<crate::HashMap<(String, Timestamp), (f64, u64)>>,
    seq: AtomicU64,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            readings: RwLock::new(BTreeMap::new()),
            summaries: RwLock::new(crate::HashMap::default()),
            seq: AtomicU64::new(0),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadingStore for MemoryStore {
    fn append(
        &self,
        entity: &EntityKey<'_>,
        ts: Timestamp,
        value: Value,
    ) -> Result<(), StoreError> {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let mut readings = self.readings.write().expect("lock is poisoned");

        readings
            .entry(entity.format())
            .or_default()
            .insert((ts, seq), value);

        Ok(())
    }

    fn scan(
        &self,
        entity: &EntityKey<'_>,
        from: Timestamp,
        to: Timestamp,
    ) -> Result<ScanIter, StoreError> {
        let readings = self.readings.read().expect("lock is poisoned");

        let points: Vec<DataPoint> = readings
            .get(&entity.format())
            .map(|series| {
                series
                    .range((from, 0)..(to, 0))
                    .map(|(&(ts, _), &value)| DataPoint { ts, value })
                    .collect()
            })
            .unwrap_or_default();

        Ok(Box::new(points.into_iter().map(Ok)))
    }

    fn entities(&self) -> Result<Vec<(String, String)>, StoreError> {
        let readings = self.readings.read().expect("lock is poisoned");

        Ok(readings
            .keys()
            .filter_map(|key| {
                key.split_once('#')
                    .map(|(building, room)| (building.to_owned(), room.to_owned()))
            })
            .collect())
    }

    fn persist_summary(
        &self,
        entity: &EntityKey<'_>,
        bucket_start: Timestamp,
        sum: f64,
        count: u64,
    ) -> Result<(), StoreError> {
        let mut summaries = self.summaries.write().expect("lock is poisoned");
        summaries.insert((entity.format(), bucket_start), (sum, count));
        Ok(())
    }

    fn load_summary(
        &self,
        entity: &EntityKey<'_>,
        bucket_start: Timestamp,
    ) -> Result<Option<(f64, u64)>, StoreError> {
        let summaries = self.summaries.read().expect("lock is poisoned");
        Ok(summaries.get(&(entity.format(), bucket_start)).copied())
    }
}
