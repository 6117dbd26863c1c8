use parking_lot::{Condvar, Mutex};

/// A counting semaphore.
///
/// [`acquire`](Self::acquire) blocks until a permit is available and takes
/// it; [`release`](Self::release) returns one and wakes at most one waiter.
/// There is no fairness between waiters and no timeout.
///
/// The list uses it as the wake-up signal of its compactor thread, and
/// [`set_permits`](Self::set_permits) lets the compactor discard signals that
/// piled up while it was busy.
pub struct Semaphore {
    permits: Mutex<usize>,
    available: Condvar,
}

impl Semaphore {
    /// Creates a semaphore holding `permits` permits.
    pub fn new(permits: usize) -> Self {
        Self {
            permits: Mutex::new(permits),
            available: Condvar::new(),
        }
    }

    /// Blocks until the permit count is positive, then decrements it.
    pub fn acquire(&self) {
        let mut permits = self.permits.lock();
        while *permits == 0 {
            self.available.wait(&mut permits);
        }
        *permits -= 1;
    }

    /// Increments the permit count and wakes one blocked acquirer, if any.
    pub fn release(&self) {
        let mut permits = self.permits.lock();
        *permits += 1;
        self.available.notify_one();
    }

    /// Overwrites the permit count.
    ///
    /// Waiters are woken if the new count is positive.
    pub fn set_permits(&self, permits: usize) {
        let mut current = self.permits.lock();
        *current = permits;
        if permits > 0 {
            self.available.notify_all();
        }
    }

    /// Returns the current permit count.
    pub fn available_permits(&self) -> usize {
        *self.permits.lock()
    }
}

impl Default for Semaphore {
    fn default() -> Self {
        Self::new(1)
    }
}
