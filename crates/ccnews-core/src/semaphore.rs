//! Download slots.
//!
//! A permit is taken before an archive is probed and given back only once
//! the downloaded file has been handed to a parser, which caps how many
//! archives sit on disk at once. Blocked callers poll the shutdown signal.

use std::sync::{Condvar, Mutex, PoisonError};
use std::time::Duration;

use crate::shutdown::ShutdownSignal;

const SHUTDOWN_POLL: Duration = Duration::from_millis(100);

#[derive(Debug)]
pub struct Semaphore {
    free: Mutex<usize>,
    returned: Condvar,
}

/// One held slot; dropping it frees the slot
#[derive(Debug)]
#[must_use = "dropping a permit frees the slot immediately"]
pub struct Permit<'a> {
    owner: &'a Semaphore,
}

impl Semaphore {
    pub fn new(permits: usize) -> Self {
        Self {
            free: Mutex::new(permits),
            returned: Condvar::new(),
        }
    }

    /// Wait for a free slot. `None` once shutdown has been requested, even
    /// if a slot is free.
    pub fn acquire_unless(&self, shutdown: &ShutdownSignal) -> Option<Permit<'_>> {
        let mut free = self.free.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if shutdown.is_requested() {
                return None;
            }
            if *free > 0 {
                *free -= 1;
                return Some(Permit { owner: self });
            }
            (free, _) = self
                .returned
                .wait_timeout(free, SHUTDOWN_POLL)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    pub fn available(&self) -> usize {
        *self.free.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        *self
            .owner
            .free
            .lock()
            .unwrap_or_else(PoisonError::into_inner) += 1;
        self.owner.returned.notify_one();
    }
}
