//! Cooperative cancellation for the long-lived loops (capture, processing, render).
//!
//! Every loop owns a `StopSignal` it checks at the top of each iteration and
//! inside its sleeps. Stopping a `Worker` raises the signal and waits a bounded
//! time for the thread to finish; a thread that misses the deadline is left to
//! exit on its own and the timeout is logged as a warning.

use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Longest single sleep inside [`StopSignal::wait`]; bounds stop latency.
const WAIT_SLICE: Duration = Duration::from_millis(5);

/// Poll interval while waiting for a worker to finish.
const JOIN_POLL: Duration = Duration::from_millis(2);

/// Lock a mutex shared with a loop thread. A panic in the other thread does
/// not make the protected value unusable here, so poisoning is ignored.
pub(crate) fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Shared stop flag.
#[derive(Clone, Debug, Default)]
pub struct StopSignal {
    flag: Arc<AtomicBool>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Sleep for `duration`, waking early if the signal is raised.
    /// Returns true when the signal was raised.
    pub fn wait(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_raised() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            std::thread::sleep(WAIT_SLICE.min(deadline - now));
        }
    }
}

/// How a worker stop ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopOutcome {
    /// Thread finished within the timeout.
    Joined,
    /// Thread finished by panicking.
    Panicked,
    /// Thread was still running at the deadline and has been detached.
    TimedOut,
}

/// A named background thread paired with its stop signal.
#[derive(Debug)]
pub struct Worker {
    name: String,
    stop: StopSignal,
    join: Option<JoinHandle<()>>,
}

impl Worker {
    /// Spawn `body` on a named thread. The body receives the worker's signal
    /// and must return once it is raised.
    pub fn spawn<F>(name: &str, body: F) -> Result<Self>
    where
        F: FnOnce(StopSignal) + Send + 'static,
    {
        let stop = StopSignal::new();
        let thread_stop = stop.clone();
        let join = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || body(thread_stop))
            .with_context(|| format!("failed to spawn {} thread", name))?;
        Ok(Self {
            name: name.to_string(),
            stop,
            join: Some(join),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn signal(&self) -> &StopSignal {
        &self.stop
    }

    /// True once the thread body has returned (or was never started).
    pub fn is_finished(&self) -> bool {
        self.join.as_ref().map_or(true, |join| join.is_finished())
    }

    /// Raise the signal and wait up to `timeout` for the thread to exit.
    pub fn stop(mut self, timeout: Duration) -> StopOutcome {
        self.stop.raise();
        let Some(join) = self.join.take() else {
            return StopOutcome::Joined;
        };

        let deadline = Instant::now() + timeout;
        while !join.is_finished() {
            if Instant::now() >= deadline {
                log::warn!(
                    "{} thread did not stop within {} ms; detaching",
                    self.name,
                    timeout.as_millis()
                );
                return StopOutcome::TimedOut;
            }
            std::thread::sleep(JOIN_POLL);
        }

        match join.join() {
            Ok(()) => {
                log::debug!("{} thread stopped", self.name);
                StopOutcome::Joined
            }
            Err(_) => {
                log::warn!("{} thread panicked before stopping", self.name);
                StopOutcome::Panicked
            }
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        // Dropped without an explicit stop: still ask the loop to exit.
        if self.join.is_some() {
            self.stop.raise();
        }
    }
}
