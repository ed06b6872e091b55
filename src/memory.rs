use std::{
    path::Path,
    sync::{Condvar, Mutex},
};

use tracing::trace;

use crate::errors::{FormatterError, Result};

const PERMIT_BYTES: usize = 1024 * 1024;

/// Fraction of the configured budget actually handed out as permits.
const BUDGET_NUMERATOR: usize = 7;
const BUDGET_DENOMINATOR: usize = 10;

/// Default per-file multiplier: tokens + arena + rule temporaries + output
/// buffer, measured empirically at roughly five times the file size.
pub const DEFAULT_FILE_MULTIPLIER: usize = 5;

/// Counting semaphore proportional to a memory budget: one permit per MiB
/// of 70% of the budget. Files reserve permits proportional to their size
/// before processing and release them on drop. Requests that could never be
/// satisfied fail immediately instead of deadlocking.
pub struct MemoryReservationManager {
    total_permits: usize,
    file_multiplier: usize,
    available: Mutex<usize>,
    released: Condvar,
}

impl MemoryReservationManager {
    pub fn new(total_budget_bytes: usize) -> Self {
        Self::with_multiplier(total_budget_bytes, DEFAULT_FILE_MULTIPLIER)
    }

    pub fn with_multiplier(total_budget_bytes: usize, file_multiplier: usize) -> Self {
        let total_permits =
            (total_budget_bytes * BUDGET_NUMERATOR / BUDGET_DENOMINATOR / PERMIT_BYTES).max(1);
        Self {
            total_permits,
            file_multiplier,
            available: Mutex::new(total_permits),
            released: Condvar::new(),
        }
    }

    pub fn total_permits(&self) -> usize {
        self.total_permits
    }

    pub fn permits_for(&self, file_size_bytes: usize) -> usize {
        (file_size_bytes * self.file_multiplier / PERMIT_BYTES).max(1)
    }

    /// Blocks until enough permits are free. Fails fast with
    /// `FileTooLargeForHeap` when the request exceeds the whole pool.
    pub fn reserve(&self, path: &Path, file_size_bytes: usize) -> Result<MemoryReservation<'_>> {
        let requested = self.permits_for(file_size_bytes);
        if requested > self.total_permits {
            return Err(FormatterError::FileTooLargeForHeap {
                path: path.to_owned(),
                requested,
                total: self.total_permits,
            });
        }
        let mut available = self.available.lock().unwrap();
        while *available < requested {
            available = self.released.wait(available).unwrap();
        }
        *available -= requested;
        trace!(?path, requested, remaining = *available, "memory reserved");
        Ok(MemoryReservation {
            manager: self,
            permits: requested,
        })
    }

    fn release(&self, permits: usize) {
        let mut available = self.available.lock().unwrap();
        *available += permits;
        self.released.notify_all();
    }

    #[cfg(test)]
    fn available_permits(&self) -> usize {
        *self.available.lock().unwrap()
    }
}

/// Held for the duration of one file's processing; releases its permits on
/// drop, on every exit path.
pub struct MemoryReservation<'m> {
    manager: &'m MemoryReservationManager,
    permits: usize,
}

impl MemoryReservation<'_> {
    pub fn permits(&self) -> usize {
        self.permits
    }
}

impl Drop for MemoryReservation<'_> {
    fn drop(&mut self) {
        self.manager.release(self.permits);
    }
}
