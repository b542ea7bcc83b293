use crate::bucket::Bucket;
use crate::Timestamp;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

pub type Cell = Arc<RwLock<Bucket>>;
pub type SeriesBuckets = BTreeMap<Timestamp, Cell>;

/// Marker error: the target bucket is already CLOSED.
pub struct ClosedBucket;

/// In-memory map from `(entity key, bucket start)` to the running aggregate.
///
/// The outer lock is written only to create or evict buckets; every
/// sum/count mutation goes through the per-bucket lock, so different
/// buckets never contend with each other.
pub struct BucketIndex {
    map: RwLock<crate::HashMap<String, SeriesBuckets>>,
}

impl BucketIndex {
    pub fn new() -> Self {
        Self {
            map: RwLock::new(crate::HashMap::default()),
        }
    }

    pub fn get(&self, entity: &str, start: Timestamp) -> Option<Cell> {
        let map = self.map.read().expect("lock is poisoned");
        map.get(entity).and_then(|buckets| buckets.get(&start)).cloned()
    }

    fn get_or_create(&self, entity: &str, start: Timestamp) -> Cell {
        if let Some(cell) = self.get(entity, start) {
            return cell;
        }

        let mut map = self.map.write().expect("lock is poisoned");

        map.entry(entity.to_owned())
            .or_default()
            .entry(start)
            .or_insert_with(|| Arc::new(RwLock::new(Bucket::new_open(start))))
            .clone()
    }

    /// Reserves the bucket for one ingestion.
    ///
    /// While the reservation is alive the refresh pass will not close the
    /// bucket; committing folds the value in, dropping without a commit
    /// leaves the aggregate untouched.
    pub fn reserve(&self, entity: &str, start: Timestamp) -> Result<Reservation, ClosedBucket> {
        let cell = self.get_or_create(entity, start);

        {
            let mut bucket = cell.write().expect("lock is poisoned");
            if !bucket.is_open() {
                return Err(ClosedBucket);
            }
            bucket.inflight += 1;
        }

        Ok(Reservation {
            cell,
            committed: false,
        })
    }

    /// Snapshot of every cell, for the refresh pass.
    pub fn entries(&self) -> Vec<(String, Timestamp, Cell)> {
        let map = self.map.read().expect("lock is poisoned");

        map.iter()
            .flat_map(|(entity, buckets)| {
                buckets
                    .iter()
                    .map(|(start, cell)| (entity.clone(), *start, cell.clone()))
            })
            .collect()
    }

    /// Copy of every bucket's current aggregate, for rebuild verification.
    pub fn snapshot(&self) -> Vec<(String, Timestamp, Bucket)> {
        self.entries()
            .into_iter()
            .map(|(entity, start, cell)| {
                let bucket = *cell.read().expect("lock is poisoned");
                (entity, start, bucket)
            })
            .collect()
    }

    /// Removes the given buckets from the hot index.
    ///
    /// Each victim is re-checked under the lock: only CLOSED, persisted
    /// buckets without in-flight reservations actually leave the map.
    pub fn evict(&self, victims: &[(String, Timestamp)]) -> usize {
        if victims.is_empty() {
            return 0;
        }

        let mut map = self.map.write().expect("lock is poisoned");
        let mut evicted = 0;

        for (entity, start) in victims {
            let Some(buckets) = map.get_mut(entity) else {
                continue;
            };

            let still_evictable = buckets.get(start).is_some_and(|cell| {
                let bucket = cell.read().expect("lock is poisoned");
                !bucket.is_open() && bucket.persisted && bucket.inflight == 0
            });

            if still_evictable {
                buckets.remove(start);
                evicted += 1;
            }

            if buckets.is_empty() {
                map.remove(entity);
            }
        }

        evicted
    }

    /// Swaps in a freshly rebuilt map.
    pub fn replace(&self, fresh: crate::HashMap<String, SeriesBuckets>) {
        *self.map.write().expect("lock is poisoned") = fresh;
    }

    pub fn bucket_count(&self) -> usize {
        let map = self.map.read().expect("lock is poisoned");
        map.values().map(BTreeMap::len).sum()
    }
}

pub struct Reservation {
    cell: Cell,
    committed: bool,
}

impl Reservation {
    /// Folds the value into the bucket and releases the reservation.
    pub fn commit(mut self, value: f64) {
        let mut bucket = self.cell.write().expect("lock is poisoned");
        bucket.add(value);
        bucket.inflight -= 1;
        drop(bucket);

        self.committed = true;
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if !self.committed {
            self.cell.write().expect("lock is poisoned").inflight -= 1;
        }
    }
}
