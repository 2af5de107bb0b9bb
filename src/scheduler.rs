//! Shared periodic rollover timer
//!
//! One background thread serves every registered writer. Each
//! registration fires at a fixed rate: the next firing is computed from
//! the previous scheduled time, not from when the callback finished, so a
//! slow rollover makes later firings bunch up rather than be skipped.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::{debug, error};

use crate::config::WriterConfig;
use crate::error::{RolloverError, RolloverResult};

/// Identifies one writer's registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WriterId(u64);

impl WriterId {
    /// Allocate a process-unique id
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        WriterId(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

type Callback = Arc<dyn Fn() + Send + Sync>;

struct Entry {
    next_fire: Instant,
    period: Duration,
    callback: Callback,
}

#[derive(Default)]
struct State {
    entries: HashMap<WriterId, Entry>,
    running: Option<WriterId>,
    worker_thread: Option<ThreadId>,
    shutdown: bool,
}

#[derive(Default)]
struct Inner {
    state: Mutex<State>,
    changed: Condvar,
}

/// First firing time for a writer
///
/// An explicit positive start time wins; otherwise the next midnight in
/// the configured zone.
pub fn resolve_start(config: &WriterConfig, now: DateTime<Utc>) -> DateTime<Utc> {
    config
        .rollover_start()
        .unwrap_or_else(|| config.time_zone.next_midnight(now))
}

/// Periodic timer shared by writers
pub struct RolloverScheduler {
    inner: Arc<Inner>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl RolloverScheduler {
    /// Create a private scheduler; its thread starts on first registration
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner::default()),
            worker: Mutex::new(None),
        }
    }

    /// The process-wide scheduler, created lazily
    pub fn global() -> Arc<RolloverScheduler> {
        static GLOBAL: OnceLock<Arc<RolloverScheduler>> = OnceLock::new();
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(RolloverScheduler::new())))
    }

    /// Schedule `callback` at `start`, then every `period`
    ///
    /// A start time in the past fires immediately. Registering an id again
    /// replaces its previous schedule.
    pub fn register<F>(
        &self,
        id: WriterId,
        start: DateTime<Utc>,
        period: Duration,
        callback: F,
    ) -> RolloverResult<()>
    where
        F: Fn() + Send + Sync + 'static,
    {
        if period.is_zero() {
            return Err(RolloverError::config("Rollover period must be positive"));
        }

        let delay = (start - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        let entry = Entry {
            next_fire: Instant::now() + delay,
            period,
            callback: Arc::new(callback),
        };

        self.ensure_worker()?;

        let mut state = self.inner.state.lock();
        state.entries.insert(id, entry);
        self.inner.changed.notify_all();
        debug!(writer = id.as_u64(), start = %start, period_ms = period.as_millis() as u64, "Registered rollover schedule");
        Ok(())
    }

    /// Remove a registration
    ///
    /// If the callback is running on the timer thread, waits for it to
    /// return (unless called from that callback). Returns whether the id
    /// was registered.
    pub fn cancel(&self, id: WriterId) -> bool {
        let mut state = self.inner.state.lock();
        let removed = state.entries.remove(&id).is_some();

        let on_timer_thread = state.worker_thread == Some(thread::current().id());
        while !on_timer_thread && state.running == Some(id) {
            self.inner.changed.wait(&mut state);
        }

        self.inner.changed.notify_all();
        removed
    }

    pub fn is_registered(&self, id: WriterId) -> bool {
        self.inner.state.lock().entries.contains_key(&id)
    }

    pub fn registered_count(&self) -> usize {
        self.inner.state.lock().entries.len()
    }

    fn ensure_worker(&self) -> RolloverResult<()> {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return Ok(());
        }

        let inner = Arc::clone(&self.inner);
        let handle = thread::Builder::new()
            .name("rollover-timer".to_string())
            .spawn(move || run_timer(inner))
            .map_err(|e| RolloverError::io("spawning rollover timer", e))?;

        self.inner.state.lock().worker_thread = Some(handle.thread().id());
        *worker = Some(handle);
        Ok(())
    }
}

impl Default for RolloverScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for RolloverScheduler {
    fn drop(&mut self) {
        {
            let mut state = self.inner.state.lock();
            state.shutdown = true;
            state.entries.clear();
            self.inner.changed.notify_all();
        }
        if let Some(handle) = self.worker.lock().take() {
            if handle.thread().id() != thread::current().id() && handle.join().is_err() {
                error!("Rollover timer thread panicked");
            }
        }
    }
}

fn run_timer(inner: Arc<Inner>) {
    let mut state = inner.state.lock();
    loop {
        if state.shutdown {
            break;
        }

        let now = Instant::now();
        let due = state
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.next_fire)
            .map(|(id, entry)| (*id, entry.next_fire));

        match due {
            None => {
                inner.changed.wait(&mut state);
            }
            Some((_, at)) if at > now => {
                inner.changed.wait_until(&mut state, at);
            }
            Some((id, _)) => fire(&inner, &mut state, id),
        }
    }
}

fn fire(inner: &Inner, state: &mut MutexGuard<'_, State>, id: WriterId) {
    let Some(entry) = state.entries.get_mut(&id) else {
        return;
    };
    entry.next_fire += entry.period;
    let callback = Arc::clone(&entry.callback);
    state.running = Some(id);

    MutexGuard::unlocked(state, || {
        if panic::catch_unwind(AssertUnwindSafe(|| callback())).is_err() {
            error!(writer = id.as_u64(), "Rollover callback panicked");
        }
    });

    state.running = None;
    inner.changed.notify_all();
}
