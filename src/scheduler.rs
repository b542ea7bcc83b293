use crate::db::DatabaseInner;
use crate::time;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

/// Background task that periodically closes aged buckets, writes them
/// through to the summary table and evicts them from the hot index.
///
/// The pass itself lives in [`DatabaseInner::refresh_at`] so it can be
/// driven with an explicit clock; this type only owns the thread.
pub struct RefreshScheduler {
    stop: Arc<(Mutex<bool>, Condvar)>,
    thread: Option<JoinHandle<()>>,
}

impl RefreshScheduler {
    pub fn spawn(inner: Arc<DatabaseInner>, interval: Duration) -> std::io::Result<Self> {
        let stop = Arc::new((Mutex::new(false), Condvar::new()));
        let thread_stop = stop.clone();

        let thread = std::thread::Builder::new()
            .name("tempora-refresh".to_owned())
            .spawn(move || {
                let (lock, cvar) = &*thread_stop;
                let mut stopped = lock.lock().expect("lock is poisoned");

                loop {
                    let (guard, _) = cvar
                        .wait_timeout(stopped, interval)
                        .expect("lock is poisoned");
                    stopped = guard;

                    if *stopped {
                        break;
                    }
                    drop(stopped);

                    let stats = inner.refresh_at(time::timestamp());
                    if stats.closed + stats.persisted + stats.evicted > 0 {
                        log::trace!(
                            "refresh pass: closed={} persisted={} evicted={}",
                            stats.closed,
                            stats.persisted,
                            stats.evicted,
                        );
                    }

                    stopped = lock.lock().expect("lock is poisoned");
                }
            })?;

        Ok(Self {
            stop,
            thread: Some(thread),
        })
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        let (lock, cvar) = &*self.stop;
        *lock.lock().expect("lock is poisoned") = true;
        cvar.notify_all();

        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Outcome of one refresh pass.
#[derive(Copy, Clone, Debug, Default)]
pub struct RefreshStats {
    pub closed: usize,
    pub persisted: usize,
    pub evicted: usize,
}
