use crate::db::{Config, Database};
use crate::disk::DiskStore;
use crate::duration::Duration;
use crate::error::Error;
use crate::store::ReadingStore;
use crate::{Timestamp, Value};
use fjall::{BlockCache, TxKeyspace};
use std::path::Path;
use std::sync::Arc;

/// Builder for [`Database`].
///
/// The bucket width is required configuration; the staleness policy
/// defaults mirror a typical continuous-aggregate deployment
/// (`start_offset` 1 h, `end_offset` 10 s, `schedule_interval` 5 s).
pub struct Builder {
    bucket_width: Option<Timestamp>,
    start_offset: Timestamp,
    end_offset: Timestamp,
    lateness: Option<Timestamp>,
    schedule_interval: std::time::Duration,
    value_range: (Value, Value),
    scan_timeout: std::time::Duration,
    auto_refresh: bool,
    cache_size_mib: u64,
}

impl Builder {
    pub(crate) fn new() -> Self {
        Self {
            bucket_width: None,
            start_offset: Duration::hours(1.0),
            end_offset: Duration::seconds(10.0),
            lateness: None,
            schedule_interval: std::time::Duration::from_secs(5),
            value_range: (-100.0, 100.0),
            scan_timeout: std::time::Duration::from_secs(10),
            auto_refresh: true,
            cache_size_mib: 64,
        }
    }

    /// Sets the bucket width in nanoseconds. Required.
    ///
    /// All readings with timestamps in `[start, start + width)` aggregate
    /// into exactly one bucket per entity.
    #[must_use]
    pub fn bucket_width(mut self, width: Timestamp) -> Self {
        self.bucket_width = Some(width);
        self
    }

    /// Sets how long closed buckets stay in the hot index before they are
    /// evicted (answered from the summary table afterwards), in
    /// nanoseconds.
    ///
    /// Default = 1 hour
    #[must_use]
    pub fn start_offset(mut self, offset: Timestamp) -> Self {
        self.start_offset = offset;
        self
    }

    /// Sets how long a bucket stays open past its own end to absorb
    /// slightly out-of-order arrivals, in nanoseconds.
    ///
    /// Larger values tolerate more lateness at the cost of query
    /// freshness.
    ///
    /// Default = 10 seconds
    #[must_use]
    pub fn end_offset(mut self, offset: Timestamp) -> Self {
        self.end_offset = offset;
        self
    }

    /// Sets the lateness tolerance: the maximum delay between a reading's
    /// timestamp and its arrival before it is rejected, in nanoseconds.
    ///
    /// Default = the end offset
    #[must_use]
    pub fn lateness(mut self, tolerance: Timestamp) -> Self {
        self.lateness = Some(tolerance);
        self
    }

    /// Sets how often the background refresh pass runs.
    ///
    /// Default = 5 seconds
    #[must_use]
    pub fn schedule_interval(mut self, interval: std::time::Duration) -> Self {
        self.schedule_interval = interval;
        self
    }

    /// Sets the accepted value range; readings outside it are rejected.
    ///
    /// Default = -100..=100
    #[must_use]
    pub fn value_range(mut self, min: Value, max: Value) -> Self {
        self.value_range = (min, max);
        self
    }

    /// Sets the deadline for raw-store scans during a query.
    ///
    /// Default = 10 seconds
    #[must_use]
    pub fn scan_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.scan_timeout = timeout;
        self
    }

    /// If `false`, no background refresh thread is spawned; buckets are
    /// only closed by explicit [`Database::refresh`] calls.
    ///
    /// Default = `true`
    #[must_use]
    pub fn auto_refresh(mut self, enabled: bool) -> Self {
        self.auto_refresh = enabled;
        self
    }

    /// Sets the storage engine's block cache size in MiB.
    ///
    /// Default = 64 MiB
    #[must_use]
    pub fn cache_size_mib(mut self, mib: u64) -> Self {
        self.cache_size_mib = mib;
        self
    }

    fn config(&self) -> crate::Result<Config> {
        let Some(bucket_width) = self.bucket_width else {
            return Err(Error::InvalidConfig("bucket width is required"));
        };
        if bucket_width == 0 {
            return Err(Error::InvalidConfig("bucket width must be positive"));
        }
        if self.schedule_interval.is_zero() {
            return Err(Error::InvalidConfig("schedule interval must be positive"));
        }
        if self.start_offset < self.end_offset {
            return Err(Error::InvalidConfig(
                "start offset must not be smaller than end offset",
            ));
        }

        let (min, max) = self.value_range;
        if min >= max {
            return Err(Error::InvalidConfig("value range must be non-empty"));
        }

        Ok(Config {
            bucket_width,
            start_offset: self.start_offset,
            end_offset: self.end_offset,
            lateness: self.lateness.unwrap_or(self.end_offset),
            schedule_interval: self.schedule_interval,
            value_range: self.value_range,
            scan_timeout: self.scan_timeout,
        })
    }

    /// Opens or recovers an engine backed by a fjall keyspace at `path`.
    ///
    /// # Errors
    ///
    /// Returns error if the configuration is invalid or an I/O error
    /// occurred.
    pub fn open<P: AsRef<Path>>(self, path: P) -> crate::Result<Database> {
        let keyspace = fjall::Config::new(path)
            .block_cache(Arc::new(BlockCache::with_capacity_bytes(
                self.cache_size_mib * 1_024 * 1_024,
            )))
            .open_transactional()?;

        self.open_in_keyspace(keyspace)
    }

    /// Uses an existing fjall keyspace as the durable reading store.
    ///
    /// Partitions are prefixed with `_tempora#` to avoid name clashes with
    /// other applications.
    ///
    /// # Errors
    ///
    /// Returns error if the configuration is invalid or an I/O error
    /// occurred.
    pub fn open_in_keyspace(self, keyspace: TxKeyspace) -> crate::Result<Database> {
        let store = Arc::new(DiskStore::new(keyspace)?);
        self.build_with_store(store)
    }

    /// Builds the engine on a custom [`ReadingStore`] implementation.
    ///
    /// # Errors
    ///
    /// Returns error if the configuration is invalid.
    pub fn build_with_store(self, store: Arc<dyn ReadingStore>) -> crate::Result<Database> {
        let config = self.config()?;
        Database::from_parts(store, config, self.auto_refresh)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test_log::test]
    fn bucket_width_is_required() {
        let result = Builder::new().build_with_store(Arc::new(MemoryStore::new()));
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test_log::test]
    fn rejects_zero_width() {
        let result = Builder::new()
            .bucket_width(0)
            .build_with_store(Arc::new(MemoryStore::new()));
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test_log::test]
    fn rejects_inverted_value_range() {
        let result = Builder::new()
            .bucket_width(Duration::minutes(2.0))
            .value_range(50.0, -50.0)
            .build_with_store(Arc::new(MemoryStore::new()));
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test_log::test]
    fn rejects_offsets_out_of_order() {
        let result = Builder::new()
            .bucket_width(Duration::minutes(2.0))
            .start_offset(Duration::seconds(1.0))
            .end_offset(Duration::seconds(10.0))
            .build_with_store(Arc::new(MemoryStore::new()));
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test_log::test]
    fn lateness_defaults_to_end_offset() {
        let config = Builder::new()
            .bucket_width(Duration::minutes(2.0))
            .end_offset(Duration::seconds(30.0))
            .config()
            .unwrap();

        assert_eq!(Duration::seconds(30.0), config.lateness);
    }
}
