use std::path::Path;
use std::time::Instant;
use tempora::{Database, Duration, EntityKey, IngestError, QueryError, Value};

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

fn main() -> tempora::Result<()> {
    env_logger::builder()
        .filter_module("lsm_tree", log::LevelFilter::Warn)
        .filter_module("fjall", log::LevelFilter::Info)
        .filter_module("tempora", log::LevelFilter::Trace)
        .parse_default_env()
        .init();

    let path = Path::new(".testy");

    if path.try_exists()? {
        std::fs::remove_dir_all(path)?;
    }

    let db = Database::builder()
        .bucket_width(Duration::minutes(2.0))
        .start_offset(Duration::hours(1.0))
        .end_offset(Duration::seconds(10.0))
        .lateness(Duration::hours(1.0))
        .schedule_interval(std::time::Duration::from_secs(5))
        .value_range(-50.0, 50.0)
        .open(path)?;

    let start = Instant::now();

    {
        use rand::Rng;
        let mut rng = rand::thread_rng();

        let now = tempora::timestamp();
        let step = Duration::seconds(5.0);

        for (building, room, base) in [
            ("b-1", "r-101", 20.5),
            ("b-1", "r-102", 22.0),
            ("b-2", "r-201", 18.0),
        ] {
            let entity = EntityKey::try_from((building, room)).expect("ids are valid");

            // One reading every 5 seconds for the last 30 minutes, drifting
            // around the room's base temperature.
            let mut ts = now - Duration::minutes(30.0);

            while ts < now {
                let value: Value = base + rng.gen_range(-1.5..1.5);

                match db.ingest(entity, value, ts) {
                    Ok(()) | Err(IngestError::TooLate { .. }) => {}
                    Err(e) => return Err(e.into()),
                }

                ts += step;
            }
        }
    }

    log::info!("ingested in {:?}", start.elapsed());

    // Close and persist everything older than the end offset right away.
    db.refresh();

    let entity = EntityKey::try_from(("b-1", "r-101")).expect("ids are valid");
    let now = tempora::timestamp();

    for minutes in [2.0, 10.0, 30.0] {
        let start = Instant::now();

        match db.average(entity, now - Duration::minutes(minutes), now) {
            Ok(avg) => log::info!(
                "avg over the last {minutes} min: {avg:.2} (in {:?})",
                start.elapsed(),
            ),
            Err(QueryError::NoData) => log::info!("no data in the last {minutes} min"),
            Err(e) => return Err(e.into()),
        }
    }

    Ok(())
}
