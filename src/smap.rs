use crate::SeriesId;
use byteorder::{BigEndian, ReadBytesExt};
use fjall::{PartitionCreateOptions, TxKeyspace, TxPartition, WriteTransaction};

const PARTITION_NAME: &str = "_tempora#v1#smap";

/// Maps entity keys to their series IDs.
pub struct SeriesMapping {
    partition: TxPartition,
}

impl SeriesMapping {
    pub fn new(keyspace: &TxKeyspace) -> fjall::Result<Self> {
        use fjall::compaction::{SizeTiered, Strategy};
        use fjall::CompressionType;

        let opts = PartitionCreateOptions::default()
            .block_size(4_096)
            .compression(CompressionType::Lz4)
            .max_memtable_size(4_000_000)
            .compaction_strategy(Strategy::SizeTiered(SizeTiered::new(4_000_000, 4)));

        let partition = keyspace.open_partition(PARTITION_NAME, opts)?;

        Ok(Self { partition })
    }

    pub fn insert(&self, tx: &mut WriteTransaction, entity_key: &str, series_id: SeriesId) {
        tx.insert(&self.partition, entity_key, series_id.to_be_bytes());
    }

    pub fn get(&self, entity_key: &str) -> fjall::Result<Option<SeriesId>> {
        Ok(self.partition.get(entity_key)?.map(|bytes| {
            let mut reader = &bytes[..];
            reader.read_u64::<BigEndian>().expect("should deserialize")
        }))
    }

    /// Lists all known entities with their series IDs, for recovery and
    /// rebuild.
    pub fn list_all(&self) -> fjall::Result<Vec<(String, SeriesId)>> {
        self.partition
            .inner()
            .iter()
            .map(|kv| match kv {
                Ok((k, v)) => {
                    let entity_key = std::str::from_utf8(&k)
                        .expect("should be utf-8")
                        .to_owned();

                    let mut reader = &v[..];
                    let series_id = reader.read_u64::<BigEndian>().expect("should deserialize");

                    Ok((entity_key, series_id))
                }
                Err(e) => Err(e),
            })
            .collect()
    }
}
