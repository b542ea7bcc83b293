use crate::bucket::{bucket_start, Bucket};
use crate::db_builder::Builder;
use crate::error::{Error, IngestError, QueryError};
use crate::index::{BucketIndex, SeriesBuckets};
use crate::scheduler::{RefreshScheduler, RefreshStats};
use crate::store::ReadingStore;
use crate::{query, time, EntityKey, Timestamp, Value};
use std::sync::{Arc, RwLock};

/// Engine parameters, assembled by [`Builder`].
#[derive(Clone, Debug)]
pub struct Config {
    pub bucket_width: Timestamp,
    pub start_offset: Timestamp,
    pub end_offset: Timestamp,
    pub lateness: Timestamp,
    pub schedule_interval: std::time::Duration,
    pub value_range: (Value, Value),
    pub scan_timeout: std::time::Duration,
}

pub struct DatabaseInner {
    pub store: Arc<dyn ReadingStore>,
    pub index: BucketIndex,
    pub config: Config,
}

/// The windowed continuous-aggregation engine.
///
/// Owns the hot bucket index and a handle to the durable reading store;
/// optionally runs a background refresh pass that closes, persists and
/// evicts aged buckets. See the crate docs for an end-to-end example.
pub struct Database {
    // Declared first so the refresh thread stops before the engine state
    // it references is torn down.
    scheduler: Option<RefreshScheduler>,
    inner: Arc<DatabaseInner>,
}

impl Database {
    /// Returns a builder for configuring and opening an engine.
    #[must_use]
    pub fn builder() -> Builder {
        Builder::new()
    }

    pub(crate) fn from_parts(
        store: Arc<dyn ReadingStore>,
        config: Config,
        auto_refresh: bool,
    ) -> crate::Result<Self> {
        let inner = Arc::new(DatabaseInner {
            store,
            index: BucketIndex::new(),
            config,
        });

        let scheduler = if auto_refresh {
            let interval = inner.config.schedule_interval;
            Some(RefreshScheduler::spawn(inner.clone(), interval)?)
        } else {
            None
        };

        Ok(Self { scheduler, inner })
    }

    /// Ingests one reading.
    ///
    /// The raw reading is appended to the reading store and folded into its
    /// bucket's running aggregate. The two effects are not transactional,
    /// but a failure on either side leaves both untouched.
    ///
    /// # Errors
    ///
    /// - [`IngestError::OutOfRange`] if the value is outside the configured
    ///   range
    /// - [`IngestError::TooLate`] if the reading's bucket is already closed
    ///   or beyond the lateness tolerance
    /// - [`IngestError::Store`] if the reading store rejected the append
    pub fn ingest(
        &self,
        entity: EntityKey<'_>,
        value: Value,
        ts: Timestamp,
    ) -> Result<(), IngestError> {
        self.inner.ingest_at(entity, value, ts, time::timestamp())
    }

    /// Returns the arithmetic mean of all readings of `entity` with
    /// timestamps in `[from, to)`.
    ///
    /// No resampling or interpolation happens; buckets fully contained in
    /// the range contribute whole, partial edges are recomputed from raw
    /// readings.
    ///
    /// # Errors
    ///
    /// - [`QueryError::NoData`] if no readings fall into the range
    /// - [`QueryError::StoreUnavailable`] if the reading store failed or
    ///   timed out
    pub fn average(
        &self,
        entity: EntityKey<'_>,
        from: Timestamp,
        to: Timestamp,
    ) -> Result<f64, QueryError> {
        self.inner.average(entity, from, to)
    }

    /// Replays the reading store to repopulate the bucket index, e.g. after
    /// a restart. Intended to run before serving traffic; concurrent
    /// ingestion may be lost from the hot index until the next rebuild.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CorruptedIndex`] if a bucket currently in the index
    /// does not reproduce bit-identically from the store, and
    /// [`Error::Store`] if the replay scan fails.
    pub fn rebuild(&self) -> crate::Result<()> {
        self.inner.rebuild_at(time::timestamp())
    }

    /// Runs one close/persist/evict pass immediately, in addition to the
    /// scheduled ones.
    pub fn refresh(&self) {
        self.inner.refresh_at(time::timestamp());
    }

    /// Whether a background refresh thread is running.
    #[must_use]
    pub fn auto_refresh_enabled(&self) -> bool {
        self.scheduler.is_some()
    }
}

impl DatabaseInner {
    pub fn ingest_at(
        &self,
        entity: EntityKey<'_>,
        value: Value,
        ts: Timestamp,
        now: Timestamp,
    ) -> Result<(), IngestError> {
        let (min, max) = self.config.value_range;
        if !(min..=max).contains(&value) {
            return Err(IngestError::OutOfRange { value, min, max });
        }

        let width = self.config.bucket_width;
        let start = bucket_start(ts, width);

        if start + width + self.config.lateness < now {
            log::debug!("rejecting late reading for {entity} at {ts}");
            return Err(IngestError::TooLate {
                ts,
                bucket_start: start,
            });
        }

        let key = entity.format();
        let Ok(reservation) = self.index.reserve(&key, start) else {
            log::debug!("rejecting reading for {entity} at {ts}: bucket {start} already closed");
            return Err(IngestError::TooLate {
                ts,
                bucket_start: start,
            });
        };

        // Append before committing: the reservation keeps the bucket from
        // closing in the meantime, and dropping it on failure leaves the
        // index untouched. No bucket lock is held during the append.
        self.store
            .append(&entity, ts, value)
            .map_err(IngestError::Store)?;

        reservation.commit(f64::from(value));
        Ok(())
    }

    pub fn average(
        &self,
        entity: EntityKey<'_>,
        from: Timestamp,
        to: Timestamp,
    ) -> Result<f64, QueryError> {
        query::average(self.store.as_ref(), &self.index, &self.config, entity, from, to)
    }

    /// One close/persist/evict pass with an explicit clock snapshot.
    pub fn refresh_at(&self, now: Timestamp) -> RefreshStats {
        let width = self.config.bucket_width;
        let mut stats = RefreshStats::default();
        let mut to_persist = Vec::new();
        let mut to_evict = Vec::new();

        for (key, start, cell) in self.index.entries() {
            let mut bucket = cell.write().expect("lock is poisoned");

            if bucket.is_open()
                && bucket.inflight == 0
                && start + width + self.config.end_offset < now
            {
                bucket.close();
                if bucket.count == 0 {
                    // Leftover of an aborted reservation; nothing to write
                    // through.
                    bucket.persisted = true;
                }
                log::debug!("closed bucket {key}@{start} (count={})", bucket.count);
                stats.closed += 1;
            }

            if !bucket.is_open() {
                if !bucket.persisted {
                    to_persist.push((key, start, bucket.sum, bucket.count, cell.clone()));
                } else if start + width + self.config.start_offset < now {
                    to_evict.push((key, start));
                }
            }
        }

        // Write-through happens outside any bucket lock.
        for (key, start, sum, count, cell) in to_persist {
            let Some(entity) = EntityKey::parse(&key) else {
                continue;
            };

            match self.store.persist_summary(&entity, start, sum, count) {
                Ok(()) => {
                    cell.write().expect("lock is poisoned").persisted = true;
                    stats.persisted += 1;
                }
                Err(e) => {
                    log::warn!("failed to persist bucket {key}@{start}, will retry: {e}");
                }
            }
        }

        stats.evicted = self.index.evict(&to_evict);
        stats
    }

    pub fn rebuild_at(&self, now: Timestamp) -> crate::Result<()> {
        let width = self.config.bucket_width;
        log::info!("rebuilding bucket index from the reading store");

        let mut replayed: crate::HashMap<String, std::collections::BTreeMap<Timestamp, Bucket>> =
            crate::HashMap::default();

        for (building, room) in self.store.entities().map_err(Error::Store)? {
            let Ok(entity) = EntityKey::try_from((building.as_str(), room.as_str())) else {
                log::warn!("skipping malformed entity key {building:?}/{room:?}");
                continue;
            };

            let buckets = replayed.entry(entity.format()).or_default();

            for data_point in self
                .store
                .scan(&entity, 0, Timestamp::MAX)
                .map_err(Error::Store)?
            {
                let data_point = data_point.map_err(Error::Store)?;
                let start = bucket_start(data_point.ts, width);

                buckets
                    .entry(start)
                    .or_insert_with(|| Bucket::new_open(start))
                    .add(f64::from(data_point.value));
            }
        }

        // Every bucket the live index holds must reproduce bit-identically
        // from the store, or we refuse to keep serving it.
        for (key, start, live) in self.index.snapshot() {
            if live.count == 0 {
                continue;
            }

            let matches = replayed
                .get(&key)
                .and_then(|buckets| buckets.get(&start))
                .is_some_and(|bucket| bucket.same_aggregate(&live));

            if !matches {
                return Err(Error::CorruptedIndex {
                    entity: key,
                    bucket_start: start,
                });
            }
        }

        // Re-derive OPEN/CLOSED from the close rule; the next refresh pass
        // catches up on persistence (idempotent overwrites).
        let mut fresh: crate::HashMap<String, SeriesBuckets> = crate::HashMap::default();
        for (key, buckets) in replayed {
            let cells = buckets
                .into_iter()
                .map(|(start, mut bucket)| {
                    if start + width + self.config.end_offset < now {
                        bucket.close();
                    }
                    (start, Arc::new(RwLock::new(bucket)))
                })
                .collect();

            fresh.insert(key, cells);
        }

        self.index.replace(fresh);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::store::{MemoryStore, ScanIter};
    use crate::Duration;

    const WIDTH: Timestamp = 120_000_000_000; // 2 minutes
    const T0: Timestamp = WIDTH * 15_000_000;

    fn entity<'a>() -> EntityKey<'a> {
        EntityKey::try_from(("b7", "r101")).unwrap()
    }

    fn test_db() -> Database {
        test_db_with_store(Arc::new(MemoryStore::new()))
    }

    fn test_db_with_store(store: Arc<dyn ReadingStore>) -> Database {
        Database::builder()
            .bucket_width(WIDTH)
            .start_offset(Duration::hours(1.0))
            .end_offset(Duration::seconds(10.0))
            .auto_refresh(false)
            .build_with_store(store)
            .unwrap()
    }

    #[test_log::test]
    fn scenario_two_readings_average() {
        let db = test_db();
        let now = T0 + Duration::minutes(1.0);

        db.inner.ingest_at(entity(), 20.0, T0, now).unwrap();
        db.inner
            .ingest_at(entity(), 22.0, T0 + Duration::seconds(30.0), now)
            .unwrap();

        let avg = db.inner.average(entity(), T0, T0 + WIDTH).unwrap();
        assert!((avg - 21.0).abs() < f64::EPSILON);
    }

    #[test_log::test]
    fn order_independence_within_bucket() {
        let values: [Value; 5] = [19.5, 22.25, 20.0, 21.75, 18.5];
        let offsets = [0_u128, 10, 20, 30, 40];

        let expected = values.iter().map(|v| f64::from(*v)).sum::<f64>() / values.len() as f64;

        for rotation in 0..values.len() {
            let db = test_db();
            let now = T0 + Duration::minutes(1.0);

            for i in 0..values.len() {
                let i = (i + rotation) % values.len();
                let ts = T0 + offsets[i] * Duration::seconds(1.0);
                db.inner.ingest_at(entity(), values[i], ts, now).unwrap();
            }

            let avg = db.inner.average(entity(), T0, T0 + WIDTH).unwrap();
            assert!(
                (avg - expected).abs() < f64::EPSILON,
                "rotation {rotation}: {avg} != {expected}"
            );
        }
    }

    #[test_log::test]
    fn boundary_reading_lands_in_next_bucket() {
        let db = test_db();
        let now = T0 + WIDTH + 1;

        db.inner.ingest_at(entity(), 20.0, T0, now).unwrap();
        db.inner.ingest_at(entity(), 40.0, T0 + WIDTH, now).unwrap();

        let first = db.inner.average(entity(), T0, T0 + WIDTH).unwrap();
        assert!((first - 20.0).abs() < f64::EPSILON);

        let second = db.inner.average(entity(), T0 + WIDTH, T0 + 2 * WIDTH).unwrap();
        assert!((second - 40.0).abs() < f64::EPSILON);
    }

    #[test_log::test]
    fn no_data_for_unknown_entity() {
        let db = test_db();
        let other = EntityKey::try_from(("b2", "r201")).unwrap();

        db.inner
            .ingest_at(entity(), 20.0, T0, T0)
            .unwrap();

        assert!(matches!(
            db.inner.average(other, T0, T0 + WIDTH),
            Err(QueryError::NoData)
        ));
    }

    #[test_log::test]
    fn empty_range_is_no_data() {
        let db = test_db();
        db.inner.ingest_at(entity(), 20.0, T0, T0).unwrap();

        assert!(matches!(
            db.inner.average(entity(), T0, T0),
            Err(QueryError::NoData)
        ));
        assert!(matches!(
            db.inner.average(entity(), T0 + WIDTH, T0),
            Err(QueryError::NoData)
        ));
    }

    #[test_log::test]
    fn rejects_out_of_range_value() {
        let db = test_db();

        assert!(matches!(
            db.inner.ingest_at(entity(), 250.0, T0, T0),
            Err(IngestError::OutOfRange { .. })
        ));
        assert!(matches!(
            db.inner.ingest_at(entity(), Value::NAN, T0, T0),
            Err(IngestError::OutOfRange { .. })
        ));

        // Nothing reached the store either.
        assert!(matches!(
            db.inner.average(entity(), T0, T0 + WIDTH),
            Err(QueryError::NoData)
        ));
    }

    #[test_log::test]
    fn rejects_reading_beyond_lateness_tolerance() {
        let db = test_db();
        let now = T0 + WIDTH + Duration::hours(2.0);

        assert!(matches!(
            db.inner.ingest_at(entity(), 20.0, T0, now),
            Err(IngestError::TooLate { .. })
        ));
    }

    #[test_log::test]
    fn closed_bucket_rejects_late_reading_and_stays_clean() {
        let db = test_db();
        let ingest_now = T0 + Duration::minutes(1.0);

        db.inner.ingest_at(entity(), 20.0, T0, ingest_now).unwrap();
        db.inner
            .ingest_at(entity(), 22.0, T0 + Duration::seconds(30.0), ingest_now)
            .unwrap();

        // Age the bucket past its close boundary.
        let close_now = T0 + WIDTH + Duration::seconds(11.0);
        let stats = db.inner.refresh_at(close_now);
        assert_eq!(1, stats.closed);

        // A straggler targeting the closed bucket is rejected even though
        // it is within the (generous) lateness tolerance.
        let err = db
            .inner
            .ingest_at(entity(), 99.0, T0 + Duration::seconds(45.0), close_now)
            .unwrap_err();
        assert!(matches!(err, IngestError::TooLate { .. }));

        // Whole-bucket and partial-range queries are both unaffected.
        let avg = db.inner.average(entity(), T0, T0 + WIDTH).unwrap();
        assert!((avg - 21.0).abs() < f64::EPSILON);

        let partial = db
            .inner
            .average(entity(), T0 + Duration::seconds(25.0), T0 + Duration::seconds(35.0))
            .unwrap();
        assert!((partial - 22.0).abs() < f64::EPSILON);

        // The rejected reading never reached the raw store either.
        assert!(matches!(
            db.inner
                .average(entity(), T0 + Duration::seconds(40.0), T0 + Duration::seconds(50.0)),
            Err(QueryError::NoData)
        ));
    }

    #[test_log::test]
    fn refresh_pass_is_idempotent() {
        let db = test_db();
        let ingest_now = T0 + Duration::minutes(1.0);

        db.inner.ingest_at(entity(), 20.0, T0, ingest_now).unwrap();

        let close_now = T0 + WIDTH + Duration::seconds(11.0);

        let first = db.inner.refresh_at(close_now);
        assert_eq!(1, first.closed);
        assert_eq!(1, first.persisted);

        let snapshot = db.inner.index.snapshot();

        let second = db.inner.refresh_at(close_now);
        assert_eq!(0, second.closed);
        assert_eq!(0, second.persisted);

        let after = db.inner.index.snapshot();
        assert_eq!(snapshot.len(), after.len());

        for ((key_a, start_a, bucket_a), (key_b, start_b, bucket_b)) in
            snapshot.iter().zip(after.iter())
        {
            assert_eq!(key_a, key_b);
            assert_eq!(start_a, start_b);
            assert!(bucket_a.same_aggregate(bucket_b));
            assert_eq!(bucket_a.state, bucket_b.state);
            assert_eq!(bucket_a.persisted, bucket_b.persisted);
        }
    }

    #[test_log::test]
    fn adjacent_closed_buckets_merge() {
        let db = test_db();

        // First bucket: 10 readings summing to 100.
        let now = T0 + WIDTH - 1;
        for i in 0..10_u128 {
            db.inner
                .ingest_at(entity(), 10.0, T0 + i * Duration::seconds(1.0), now)
                .unwrap();
        }

        // Second bucket: 5 readings summing to 60.
        let now = T0 + 2 * WIDTH - 1;
        for i in 0..5_u128 {
            db.inner
                .ingest_at(entity(), 12.0, T0 + WIDTH + i * Duration::seconds(1.0), now)
                .unwrap();
        }

        db.inner.refresh_at(T0 + 2 * WIDTH + Duration::seconds(11.0));

        let avg = db.inner.average(entity(), T0, T0 + 2 * WIDTH).unwrap();
        assert!((avg - 160.0 / 15.0).abs() < 1e-9);
    }

    #[test_log::test]
    fn rebuild_round_trip_is_bit_identical() {
        let db = test_db();
        let now = T0 + WIDTH + Duration::seconds(5.0);

        let readings: [(Value, Timestamp); 5] = [
            (19.75, T0),
            (21.5, T0 + Duration::seconds(7.0)),
            (20.25, T0 + Duration::seconds(90.0)),
            (22.0, T0 + WIDTH),
            (18.25, T0 + WIDTH + Duration::seconds(30.0)),
        ];

        for (value, ts) in readings {
            db.inner.ingest_at(entity(), value, ts, now).unwrap();
        }

        let mut before = db.inner.index.snapshot();
        before.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));

        db.inner.rebuild_at(now).unwrap();

        let mut after = db.inner.index.snapshot();
        after.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));

        assert_eq!(before.len(), after.len());
        for ((key_a, start_a, bucket_a), (key_b, start_b, bucket_b)) in
            before.iter().zip(after.iter())
        {
            assert_eq!(key_a, key_b);
            assert_eq!(start_a, start_b);
            assert!(bucket_a.same_aggregate(bucket_b));
        }
    }

    #[test_log::test]
    fn rebuild_detects_tampered_index() {
        let db = test_db();
        let now = T0 + Duration::minutes(1.0);

        db.inner.ingest_at(entity(), 20.0, T0, now).unwrap();

        {
            let cell = db.inner.index.get(&entity().format(), T0).unwrap();
            cell.write().unwrap().sum += 1.0;
        }

        assert!(matches!(
            db.inner.rebuild_at(now),
            Err(Error::CorruptedIndex { .. })
        ));
    }

    #[test_log::test]
    fn eviction_falls_back_to_summary_table() {
        let db = test_db();
        let ingest_now = T0 + Duration::minutes(1.0);

        db.inner.ingest_at(entity(), 20.0, T0, ingest_now).unwrap();
        db.inner
            .ingest_at(entity(), 22.0, T0 + Duration::seconds(30.0), ingest_now)
            .unwrap();

        // First pass closes and persists, second pass (well past
        // start_offset) evicts.
        db.inner.refresh_at(T0 + WIDTH + Duration::seconds(11.0));
        let stats = db.inner.refresh_at(T0 + WIDTH + Duration::hours(2.0));

        assert_eq!(1, stats.evicted);
        assert_eq!(0, db.inner.index.bucket_count());

        // Whole bucket comes from the summary table.
        let avg = db.inner.average(entity(), T0, T0 + WIDTH).unwrap();
        assert!((avg - 21.0).abs() < f64::EPSILON);

        // Partial range goes back to raw readings.
        let partial = db
            .inner
            .average(entity(), T0, T0 + Duration::seconds(10.0))
            .unwrap();
        assert!((partial - 20.0).abs() < f64::EPSILON);
    }

    #[test_log::test]
    fn unaligned_range_merges_partials_with_buckets() {
        let db = test_db();

        let now = T0 + Duration::seconds(61.0);
        db.inner.ingest_at(entity(), 10.0, T0, now).unwrap();
        db.inner
            .ingest_at(entity(), 20.0, T0 + Duration::seconds(60.0), now)
            .unwrap();

        let now = T0 + WIDTH + Duration::seconds(11.0);
        db.inner
            .ingest_at(entity(), 30.0, T0 + WIDTH + Duration::seconds(10.0), now)
            .unwrap();

        // Skips the first reading, covers the second and third.
        let avg = db
            .inner
            .average(entity(), T0 + Duration::seconds(30.0), T0 + 2 * WIDTH)
            .unwrap();
        assert!((avg - 25.0).abs() < f64::EPSILON);
    }

    struct FailingStore;

    impl ReadingStore for FailingStore {
        fn append(
            &self,
            _: &EntityKey<'_>,
            _: Timestamp,
            _: Value,
        ) -> Result<(), StoreError> {
            Err(StoreError::Unavailable(Box::new(std::io::Error::other(
                "disk on fire",
            ))))
        }

        fn scan(
            &self,
            _: &EntityKey<'_>,
            _: Timestamp,
            _: Timestamp,
        ) -> Result<ScanIter, StoreError> {
            Ok(Box::new(std::iter::empty()))
        }

        fn entities(&self) -> Result<Vec<(String, String)>, StoreError> {
            Ok(Vec::new())
        }

        fn persist_summary(
            &self,
            _: &EntityKey<'_>,
            _: Timestamp,
            _: f64,
            _: u64,
        ) -> Result<(), StoreError> {
            Ok(())
        }

        fn load_summary(
            &self,
            _: &EntityKey<'_>,
            _: Timestamp,
        ) -> Result<Option<(f64, u64)>, StoreError> {
            Ok(None)
        }
    }

    #[test_log::test]
    fn failed_append_leaves_index_untouched() {
        let db = test_db_with_store(Arc::new(FailingStore));

        let err = db.inner.ingest_at(entity(), 20.0, T0, T0).unwrap_err();
        assert!(matches!(err, IngestError::Store(_)));

        // The reservation may have created an empty bucket, but no value
        // was folded in.
        for (_, _, bucket) in db.inner.index.snapshot() {
            assert_eq!(0, bucket.count);
            assert_eq!(0, bucket.inflight);
        }

        assert!(matches!(
            db.inner.average(entity(), T0, T0 + WIDTH),
            Err(QueryError::NoData)
        ));
    }

    struct SlowStore {
        inner: MemoryStore,
    }

    impl ReadingStore for SlowStore {
        fn append(
            &self,
            entity: &EntityKey<'_>,
            ts: Timestamp,
            value: Value,
        ) -> Result<(), StoreError> {
            self.inner.append(entity, ts, value)
        }

        fn scan(
            &self,
            entity: &EntityKey<'_>,
            from: Timestamp,
            to: Timestamp,
        ) -> Result<ScanIter, StoreError> {
            let iter = self.inner.scan(entity, from, to)?;
            Ok(Box::new(iter.map(|item| {
                std::thread::sleep(std::time::Duration::from_millis(50));
                item
            })))
        }

        fn entities(&self) -> Result<Vec<(String, String)>, StoreError> {
            self.inner.entities()
        }

        fn persist_summary(
            &self,
            entity: &EntityKey<'_>,
            bucket_start: Timestamp,
            sum: f64,
            count: u64,
        ) -> Result<(), StoreError> {
            self.inner.persist_summary(entity, bucket_start, sum, count)
        }

        fn load_summary(
            &self,
            entity: &EntityKey<'_>,
            bucket_start: Timestamp,
        ) -> Result<Option<(f64, u64)>, StoreError> {
            self.inner.load_summary(entity, bucket_start)
        }
    }

    #[test_log::test]
    fn slow_scan_hits_query_deadline() {
        let db = Database::builder()
            .bucket_width(WIDTH)
            .scan_timeout(std::time::Duration::from_millis(5))
            .auto_refresh(false)
            .build_with_store(Arc::new(SlowStore {
                inner: MemoryStore::new(),
            }))
            .unwrap();

        db.inner.ingest_at(entity(), 20.0, T0, T0).unwrap();
        db.inner
            .ingest_at(entity(), 22.0, T0 + 1, T0)
            .unwrap();

        // Unaligned range forces a raw scan through the slow store.
        let err = db
            .inner
            .average(entity(), T0, T0 + Duration::seconds(10.0))
            .unwrap_err();
        assert!(matches!(err, QueryError::StoreUnavailable(_)));
    }

    #[test_log::test]
    fn background_scheduler_closes_buckets() {
        let store = Arc::new(MemoryStore::new());
        let db = Database::builder()
            .bucket_width(Duration::millis(20.0))
            .start_offset(Duration::hours(1.0))
            .end_offset(Duration::millis(1.0))
            .schedule_interval(std::time::Duration::from_millis(10))
            .build_with_store(store.clone())
            .unwrap();

        let now = time::timestamp();
        let t0 = now - now % Duration::millis(20.0);
        db.ingest(entity(), 21.0, t0).unwrap();

        // Give the scheduler a few ticks to close and persist the bucket.
        let mut persisted = None;
        for _ in 0..100 {
            std::thread::sleep(std::time::Duration::from_millis(10));
            persisted = store.load_summary(&entity(), t0).unwrap();
            if persisted.is_some() {
                break;
            }
        }

        let (sum, count) = persisted.expect("bucket should have been persisted");
        assert_eq!(1, count);
        assert!((sum - 21.0).abs() < f64::EPSILON);
    }
}
