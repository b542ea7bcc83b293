use crate::error::StoreError;
use crate::reader::Reader;
use crate::smap::SeriesMapping;
use crate::store::{DataPoint, ReadingStore, ScanIter};
use crate::{EntityKey, SeriesId, Timestamp, Value};
use byteorder::{BigEndian, ByteOrder, ReadBytesExt, WriteBytesExt};
use fjall::{Partition, PartitionCreateOptions, TxKeyspace};
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

const SUMMARY_PARTITION: &str = "_tempora#v1#agg";

/// Durable reading store on top of a fjall keyspace.
///
/// Each entity gets its own `s#<id>` partition; reading keys are the
/// timestamp plus a sequence suffix, so identical timestamps never
/// overwrite each other and the partition stays truly append-only.
pub struct DiskStore {
    keyspace: TxKeyspace,
    series: RwLock<BTreeMap<SeriesId, Partition>>,
    smap: SeriesMapping,
    summaries: Partition,
    seq: AtomicU64,
}

impl DiskStore {
    pub fn new(keyspace: TxKeyspace) -> crate::Result<Self> {
        let smap = SeriesMapping::new(&keyspace)?;

        let summaries = keyspace
            .open_partition(
                SUMMARY_PARTITION,
                PartitionCreateOptions::default()
                    .block_size(4_096)
                    .compression(fjall::CompressionType::Lz4),
            )?
            .inner()
            .clone();

        // Recover series partitions from the mapping.
        let mut series = BTreeMap::new();
        for (entity_key, series_id) in smap.list_all()? {
            log::trace!("recovering series {series_id} for entity {entity_key:?}");

            let partition =
                keyspace.open_partition(&Self::series_name(series_id), Self::series_options())?;

            series.insert(series_id, partition.inner().clone());
        }

        Ok(Self {
            keyspace,
            series: RwLock::new(series),
            smap,
            summaries,
            seq: AtomicU64::new(0),
        })
    }

    fn series_name(series_id: SeriesId) -> String {
        format!("s#{series_id}")
    }

    fn series_options() -> PartitionCreateOptions {
        PartitionCreateOptions::default()
            .block_size(64_000)
            .compression(fjall::CompressionType::Lz4)
    }

    fn get_series(&self, entity_key: &str) -> Result<Option<Partition>, StoreError> {
        let Some(series_id) = self.smap.get(entity_key)? else {
            return Ok(None);
        };

        Ok(self
            .series
            .read()
            .expect("lock is poisoned")
            .get(&series_id)
            .cloned())
    }

    fn get_or_create_series(&self, entity_key: &str) -> Result<Partition, StoreError> {
        if let Some(series) = self.get_series(entity_key)? {
            return Ok(series);
        }

        let mut tx = self.keyspace.write_tx();
        let mut series_lock = self.series.write().expect("lock is poisoned");

        // Re-check: a concurrent ingest may have created the series already.
        if let Some(series_id) = self.smap.get(entity_key)? {
            if let Some(series) = series_lock.get(&series_id) {
                return Ok(series.clone());
            }
        }

        let next_series_id = series_lock.keys().max().map(|x| x + 1).unwrap_or_default();
        log::trace!("creating series {next_series_id} for entity {entity_key:?}");

        let series = self
            .keyspace
            .open_partition(&Self::series_name(next_series_id), Self::series_options())?;

        series_lock.insert(next_series_id, series.inner().clone());
        drop(series_lock);

        self.smap.insert(&mut tx, entity_key, next_series_id);
        tx.commit()?;

        Ok(series.inner().clone())
    }

    fn reading_key(ts: Timestamp, seq: u64) -> [u8; 24] {
        let mut key = [0_u8; 24];
        BigEndian::write_u128(&mut key[..16], ts);
        BigEndian::write_u64(&mut key[16..], seq);
        key
    }

    fn summary_key(series_id: SeriesId, bucket_start: Timestamp) -> [u8; 24] {
        let mut key = [0_u8; 24];
        BigEndian::write_u64(&mut key[..8], series_id);
        BigEndian::write_u128(&mut key[8..], bucket_start);
        key
    }
}

impl ReadingStore for DiskStore {
    fn append(
        &self,
        entity: &EntityKey<'_>,
        ts: Timestamp,
        value: Value,
    ) -> Result<(), StoreError> {
        let series = self.get_or_create_series(&entity.format())?;
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);

        series.insert(Self::reading_key(ts, seq), encode_value(value))?;
        Ok(())
    }

    fn scan(
        &self,
        entity: &EntityKey<'_>,
        from: Timestamp,
        to: Timestamp,
    ) -> Result<ScanIter, StoreError> {
        let Some(series) = self.get_series(&entity.format())? else {
            return Ok(Box::new(std::iter::empty()));
        };

        let range = (
            Bound::Included(Self::reading_key(from, 0)),
            Bound::Excluded(Self::reading_key(to, 0)),
        );

        let reader = Reader::new(series, |partition| {
            Box::new(partition.range(range).map(|kv| match kv {
                Ok((k, v)) => {
                    let mut key = &k[..];
                    let ts = key.read_u128::<BigEndian>().expect("should deserialize");

                    Ok(DataPoint {
                        ts,
                        value: decode_value(&v),
                    })
                }
                Err(e) => Err(StoreError::from(e)),
            }))
        });

        Ok(Box::new(reader))
    }

    fn entities(&self) -> Result<Vec<(String, String)>, StoreError> {
        Ok(self
            .smap
            .list_all()?
            .into_iter()
            .filter_map(|(entity_key, _)| {
                entity_key
                    .split_once('#')
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
        let Some(series_id) = self.smap.get(&entity.format())? else {
            // A bucket only exists for entities with appended readings.
            return Ok(());
        };

        let mut value = Vec::with_capacity(16);
        value.write_f64::<BigEndian>(sum).expect("should serialize");
        value.write_u64::<BigEndian>(count).expect("should serialize");

        self.summaries
            .insert(Self::summary_key(series_id, bucket_start), value)?;

        Ok(())
    }

    fn load_summary(
        &self,
        entity: &EntityKey<'_>,
        bucket_start: Timestamp,
    ) -> Result<Option<(f64, u64)>, StoreError> {
        let Some(series_id) = self.smap.get(&entity.format())? else {
            return Ok(None);
        };

        Ok(self
            .summaries
            .get(Self::summary_key(series_id, bucket_start))?
            .map(|bytes| {
                let mut reader = &bytes[..];
                let sum = reader.read_f64::<BigEndian>().expect("should deserialize");
                let count = reader.read_u64::<BigEndian>().expect("should deserialize");
                (sum, count)
            }))
    }
}

#[cfg(not(feature = "high_precision"))]
fn encode_value(value: Value) -> [u8; 4] {
    value.to_be_bytes()
}

#[cfg(feature = "high_precision")]
fn encode_value(value: Value) -> [u8; 8] {
    value.to_be_bytes()
}

#[cfg(not(feature = "high_precision"))]
fn decode_value(bytes: &[u8]) -> Value {
    let mut reader = bytes;
    reader.read_f32::<BigEndian>().expect("should deserialize")
}

#[cfg(feature = "high_precision")]
fn decode_value(bytes: &[u8]) -> Value {
    let mut reader = bytes;
    reader.read_f64::<BigEndian>().expect("should deserialize")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn entity<'a>() -> EntityKey<'a> {
        EntityKey::try_from(("b7", "r101")).unwrap()
    }

    fn open_store(path: &std::path::Path) -> DiskStore {
        let keyspace = fjall::Config::new(path).open_transactional().unwrap();
        DiskStore::new(keyspace).unwrap()
    }

    #[test_log::test]
    fn append_scan_round_trip() -> crate::Result<()> {
        let path = tempfile::tempdir()?;
        let store = open_store(path.path());

        store.append(&entity(), 30, 3.0)?;
        store.append(&entity(), 10, 1.0)?;
        store.append(&entity(), 20, 2.0)?;

        let points: Vec<_> = store
            .scan(&entity(), 10, 30)?
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(
            vec![
                DataPoint { ts: 10, value: 1.0 },
                DataPoint { ts: 20, value: 2.0 },
            ],
            points
        );

        Ok(())
    }

    #[test_log::test]
    fn identical_timestamps_are_both_kept() -> crate::Result<()> {
        let path = tempfile::tempdir()?;
        let store = open_store(path.path());

        store.append(&entity(), 10, 1.0)?;
        store.append(&entity(), 10, 2.0)?;

        assert_eq!(2, store.scan(&entity(), 0, 100)?.count());

        Ok(())
    }

    #[test_log::test]
    fn recovers_series_after_reopen() -> crate::Result<()> {
        let path = tempfile::tempdir()?;

        {
            let store = open_store(path.path());
            store.append(&entity(), 10, 21.5)?;
            store.persist_summary(&entity(), 0, 21.5, 1)?;
        }

        let store = open_store(path.path());

        assert_eq!(
            vec![("b7".to_owned(), "r101".to_owned())],
            store.entities()?
        );
        assert_eq!(1, store.scan(&entity(), 0, 100)?.count());
        assert_eq!(Some((21.5, 1)), store.load_summary(&entity(), 0)?);

        Ok(())
    }

    #[test_log::test]
    fn summary_for_unknown_entity_is_none() -> crate::Result<()> {
        let path = tempfile::tempdir()?;
        let store = open_store(path.path());

        assert!(store.load_summary(&entity(), 0)?.is_none());

        Ok(())
    }
}
