use criterion::{criterion_group, criterion_main, Criterion};
use std::sync::Arc;
use tempora::{Database, Duration, EntityKey, MemoryStore};

fn format_entity_key(c: &mut Criterion) {
    let entity = EntityKey::try_from(("building-7", "room-1337")).unwrap();

    c.bench_function("format entity key", |b| {
        b.iter(|| entity.to_string());
    });
}

fn ingest(c: &mut Criterion) {
    let db = Database::builder()
        .bucket_width(Duration::minutes(2.0))
        .auto_refresh(false)
        .build_with_store(Arc::new(MemoryStore::new()))
        .unwrap();

    let entity = EntityKey::try_from(("b-1", "r-101")).unwrap();
    let mut ts = tempora::timestamp();

    c.bench_function("ingest", |b| {
        b.iter(|| {
            ts += Duration::millis(1.0);
            db.ingest(entity, 21.0, ts).unwrap();
        });
    });
}

fn average(c: &mut Criterion) {
    let db = Database::builder()
        .bucket_width(Duration::minutes(2.0))
        .lateness(Duration::hours(2.0))
        .auto_refresh(false)
        .build_with_store(Arc::new(MemoryStore::new()))
        .unwrap();

    let entity = EntityKey::try_from(("b-1", "r-101")).unwrap();

    let now = tempora::timestamp();
    let t0 = now - now % Duration::minutes(2.0);
    let from = t0 - Duration::hours(1.0);

    // One reading per second for an hour of history.
    let mut ts = from;
    while ts < now {
        db.ingest(entity, 21.0, ts).unwrap();
        ts += Duration::seconds(1.0);
    }

    c.bench_function("average over 1h", |b| {
        b.iter(|| db.average(entity, from, now).unwrap());
    });
}

criterion_group!(benches, format_entity_key, ingest, average);
criterion_main!(benches);
