//! Background reaper for a connection pool.
//!
//! Every `frequency` the reaper drops idle connections that fail a liveness
//! check and closes those idle longer than the pool's `idle_timeout`. It
//! holds only a weak reference, so it never keeps a pool alive.

use crate::pool::Shared;
use std::sync::{Arc, Condvar, Mutex, PoisonError, Weak};
use std::thread::JoinHandle;
use std::time::Duration;

pub(crate) struct Reaper {
    stop: Arc<(Mutex<bool>, Condvar)>,
    handle: Option<JoinHandle<()>>,
}

impl Reaper {
    pub(crate) fn spawn(pool: Weak<Shared>, frequency: Duration) -> Self {
        let stop = Arc::new((Mutex::new(false), Condvar::new()));
        let signal = Arc::clone(&stop);

        let spawned = std::thread::Builder::new()
            .name("sqlshift-reaper".to_string())
            .spawn(move || run(&pool, &signal, frequency));

        let handle = match spawned {
            Ok(handle) => Some(handle),
            Err(err) => {
                tracing::warn!(error = %err, "could not start connection reaper");
                None
            }
        };
        Self { stop, handle }
    }
}

fn run(pool: &Weak<Shared>, signal: &(Mutex<bool>, Condvar), frequency: Duration) {
    let (lock, cvar) = signal;
    loop {
        let stopped = lock.lock().unwrap_or_else(PoisonError::into_inner);
        let (stopped, _) = cvar
            .wait_timeout_while(stopped, frequency, |stopped| !*stopped)
            .unwrap_or_else(PoisonError::into_inner);
        if *stopped {
            return;
        }
        drop(stopped);

        let Some(shared) = pool.upgrade() else {
            return;
        };
        let reaped = shared.reap();
        let flushed = shared.flush_expired();
        if reaped + flushed > 0 {
            tracing::debug!(reaped, flushed, "reaper pass");
        }
    }
}

impl Drop for Reaper {
    fn drop(&mut self) {
        let (lock, cvar) = &*self.stop;
        *lock.lock().unwrap_or_else(PoisonError::into_inner) = true;
        cvar.notify_all();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::warn!("connection reaper panicked");
            }
        }
    }
}
