use crate::db::Config;
use crate::error::{QueryError, StoreError};
use crate::index::BucketIndex;
use crate::store::ReadingStore;
use crate::{EntityKey, Timestamp};
use std::time::Instant;

/// Answers a range-average request over `[from, to)`.
///
/// Fully-covered buckets are taken whole from the index (or the summary
/// table once evicted); partial leading/trailing portions and buckets the
/// engine never materialized are recomputed from raw readings. A bucket is
/// counted once, in full, for any range that fully contains it.
pub fn average(
    store: &dyn ReadingStore,
    index: &BucketIndex,
    config: &Config,
    entity: EntityKey<'_>,
    from: Timestamp,
    to: Timestamp,
) -> Result<f64, QueryError> {
    if from >= to {
        return Err(QueryError::NoData);
    }

    log::debug!("querying {entity} [{from}..{to})");

    let width = config.bucket_width;
    let deadline = Instant::now() + config.scan_timeout;
    let key = entity.format();

    let mut sum = 0.0_f64;
    let mut count = 0_u64;

    let first_aligned = align_up(from, width);
    let last_aligned = from.max(to - to % width);

    if first_aligned >= last_aligned {
        // No fully-covered bucket in range.
        scan_into(store, &entity, from, to, deadline, &mut sum, &mut count)?;
    } else {
        if from < first_aligned {
            scan_into(
                store,
                &entity,
                from,
                first_aligned,
                deadline,
                &mut sum,
                &mut count,
            )?;
        }

        // Consecutive buckets missing from both index and summary table are
        // recomputed from the store in a single scan.
        let mut missing_from: Option<Timestamp> = None;
        let mut bucket = first_aligned;

        while bucket < last_aligned {
            let mut hit = false;

            if let Some(cell) = index.get(&key, bucket) {
                let aggregate = cell.read().expect("lock is poisoned");
                sum += aggregate.sum;
                count += aggregate.count;
                hit = true;
            } else if let Some((bucket_sum, bucket_count)) = store.load_summary(&entity, bucket)? {
                sum += bucket_sum;
                count += bucket_count;
                hit = true;
            }

            if hit {
                if let Some(run_start) = missing_from.take() {
                    scan_into(
                        store,
                        &entity,
                        run_start,
                        bucket,
                        deadline,
                        &mut sum,
                        &mut count,
                    )?;
                }
            } else if missing_from.is_none() {
                missing_from = Some(bucket);
            }

            bucket += width;
        }

        if let Some(run_start) = missing_from {
            scan_into(
                store,
                &entity,
                run_start,
                last_aligned,
                deadline,
                &mut sum,
                &mut count,
            )?;
        }

        if last_aligned < to {
            scan_into(
                store,
                &entity,
                last_aligned,
                to,
                deadline,
                &mut sum,
                &mut count,
            )?;
        }
    }

    if count == 0 {
        return Err(QueryError::NoData);
    }

    Ok(sum / count as f64)
}

fn align_up(ts: Timestamp, width: Timestamp) -> Timestamp {
    let rem = ts % width;
    if rem == 0 {
        ts
    } else {
        ts - rem + width
    }
}

fn scan_into(
    store: &dyn ReadingStore,
    entity: &EntityKey<'_>,
    from: Timestamp,
    to: Timestamp,
    deadline: Instant,
    sum: &mut f64,
    count: &mut u64,
) -> Result<(), QueryError> {
    for data_point in store.scan(entity, from, to)? {
        if Instant::now() > deadline {
            log::warn!("scan of {entity} [{from}..{to}) exceeded the query deadline");
            return Err(QueryError::StoreUnavailable(StoreError::timed_out()));
        }

        let data_point = data_point?;
        *sum += f64::from(data_point.value);
        *count += 1;
    }

    Ok(())
}
