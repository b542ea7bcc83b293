//! An embeddable windowed continuous-aggregation engine for timestamped
//! sensor readings.
//!
//! Readings (temperature per building/room) are ingested at high frequency;
//! the engine incrementally maintains per-bucket sum/count aggregates so that
//! range-average queries never rescan raw history. Buckets are OPEN while
//! out-of-order readings may still land in them; a background refresh pass
//! CLOSEs them once they age past the configured staleness offset, writes
//! them through to a summary table and eventually evicts them from the hot
//! index. Queries combine closed buckets with the freshest unmaterialized
//! tail, which is served by scanning the durable reading store.
//!
//! The durable store defaults to <https://github.com/fjall-rs/fjall>, an
//! LSM-based storage engine that keeps write ingestion fast even for large
//! datasets; any [`ReadingStore`] implementation can be plugged in instead.
//!
//! Reading values are f32s by default, but can be switched to f64 using the
//! `high_precision` feature flag. Aggregates always accumulate in f64.
//!
//! ```
//! use tempora::{Database, Duration, EntityKey, MemoryStore, timestamp};
//! use std::sync::Arc;
//!
//! let db = Database::builder()
//!     .bucket_width(Duration::minutes(2.0))
//!     .build_with_store(Arc::new(MemoryStore::new()))?;
//!
//! let room = EntityKey::try_from(("b7", "r101")).unwrap();
//!
//! let now = timestamp();
//! let t0 = now - now % Duration::minutes(2.0);
//!
//! db.ingest(room, 20.0, t0)?;
//! db.ingest(room, 22.0, t0 + Duration::seconds(30.0))?;
//!
//! let avg = db.average(room, t0, t0 + Duration::minutes(2.0))?;
//! assert!((avg - 21.0).abs() < f64::EPSILON);
//!
//! # Ok::<(), tempora::Error>(())
//! ```

#![forbid(unsafe_code)]
#![deny(clippy::all, missing_docs, clippy::cargo)]
#![deny(clippy::unwrap_used)]
#![warn(clippy::indexing_slicing)]
#![warn(clippy::pedantic, clippy::nursery)]
#![warn(clippy::expect_used)]
#![allow(clippy::missing_const_for_fn)]
#![warn(clippy::multiple_crate_versions)]
#![warn(clippy::result_unit_err)]

mod bucket;
mod db;
mod db_builder;
mod disk;
mod duration;
mod entity_key;
mod error;
mod index;
mod query;
mod reader;
mod scheduler;
mod smap;
mod store;
mod time;

type SeriesId = u64;
type HashMap<K, V> = std::collections::HashMap<K, V, rustc_hash::FxBuildHasher>;

pub use db::Database;
pub use db_builder::Builder;
pub use duration::Duration;
pub use entity_key::EntityKey;
pub use error::{Error, IngestError, QueryError, Result, StoreError};
pub use store::{DataPoint, MemoryStore, ReadingStore, ScanIter};
pub use time::timestamp;

/// Timestamp in nanoseconds since the Unix epoch.
pub type Timestamp = u128;

/// Value carried by a reading
#[cfg(feature = "high_precision")]
pub type Value = f64;

/// Value carried by a reading
#[cfg(not(feature = "high_precision"))]
pub type Value = f32;
