use std::{
    cell::UnsafeCell,
    fmt,
    ops::{Deref, DerefMut},
};

use parking_lot::{Condvar, Mutex, MutexGuard};

/// A reader-writer lock with gate admission.
///
/// Any number of readers may hold the lock at once, or a single writer.
/// Admission goes through one mutex, the *gate*:
///
/// * a reader takes the gate just long enough to register itself in the
///   active-reader count, then lets go of it;
/// * a writer takes the gate and keeps it until its guard is dropped, then
///   waits for the active-reader count to drain to zero.
///
/// So a writer shuts out new readers the moment it arrives, but waits out
/// the readers that got in before it. Readers that keep arriving before a
/// writer reaches the gate can starve it.
///
/// The lock is not reentrant: a thread already holding a guard must not
/// ask for another one on the same lock.
///
/// ## Example
///
/// ```
/// use seglist::GateLock;
///
/// let lock = GateLock::new(vec![1, 2]);
/// {
///     let a = lock.read();
///     let b = lock.read();
///     assert_eq!(a.len() + b.len(), 4);
/// }
/// lock.write().push(3);
/// assert_eq!(*lock.read(), [1, 2, 3]);
/// ```
pub struct GateLock<T: ?Sized> {
    gate: Mutex<()>,
    readers: Mutex<usize>,
    drained: Condvar,
    data: UnsafeCell<T>,
}

// SAFETY: the guards hand out `&T` to many threads only while no `&mut T`
// exists, and `&mut T` to one thread only while no reader is registered.
unsafe impl<T: ?Sized + Send> Send for GateLock<T> {}
unsafe impl<T: ?Sized + Send + Sync> Sync for GateLock<T> {}

impl<T> GateLock<T> {
    /// Creates a new, unlocked lock protecting `data`.
    pub fn new(data: T) -> Self {
        Self {
            gate: Mutex::new(()),
            readers: Mutex::new(0),
            drained: Condvar::new(),
            data: UnsafeCell::new(data),
        }
    }

    /// Consumes the lock, returning the protected data.
    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

impl<T: ?Sized> GateLock<T> {
    /// Acquires shared access.
    ///
    /// Blocks only while a writer holds the gate.
    pub fn read(&self) -> ReadGuard<'_, T> {
        let _gate = self.gate.lock();
        *self.readers.lock() += 1;
        ReadGuard { lock: self }
    }

    /// Acquires exclusive access.
    ///
    /// Closes the gate to new readers immediately, then blocks until every
    /// reader already admitted has released.
    pub fn write(&self) -> WriteGuard<'_, T> {
        let gate = self.gate.lock();
        let mut readers = self.readers.lock();
        while *readers > 0 {
            self.drained.wait(&mut readers);
        }
        drop(readers);
        WriteGuard { lock: self, _gate: gate }
    }

    /// Returns a mutable reference to the data without locking.
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }

    /// Returns the number of readers currently holding the lock.
    pub fn active_readers(&self) -> usize {
        *self.readers.lock()
    }

    fn read_release(&self) {
        let mut readers = self.readers.lock();
        debug_assert!(*readers > 0, "read release without a matching read");
        *readers -= 1;
        if *readers == 0 {
            self.drained.notify_one();
        }
    }
}

impl<T: Default> Default for GateLock<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: ?Sized> fmt::Debug for GateLock<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GateLock")
            .field("active_readers", &self.active_readers())
            .finish_non_exhaustive()
    }
}

/// Shared access to the data of a [`GateLock`]. Released on drop.
#[must_use = "the read lock is released as soon as the guard is dropped"]
pub struct ReadGuard<'a, T: ?Sized> {
    lock: &'a GateLock<T>,
}

impl<T: ?Sized> Deref for ReadGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: this guard is counted as an active reader, so no writer
        // can be past its drain wait.
        unsafe { &*self.lock.data.get() }
    }
}

impl<T: ?Sized> Drop for ReadGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.read_release();
    }
}

/// Exclusive access to the data of a [`GateLock`]. Holds the gate until
/// dropped.
#[must_use = "the write lock is released as soon as the guard is dropped"]
pub struct WriteGuard<'a, T: ?Sized> {
    lock: &'a GateLock<T>,
    _gate: MutexGuard<'a, ()>,
}

impl<T: ?Sized> Deref for WriteGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the gate is held and the reader count drained to zero.
        unsafe { &*self.lock.data.get() }
    }
}

impl<T: ?Sized> DerefMut for WriteGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: as above; `&mut self` makes this the only live borrow.
        unsafe { &mut *self.lock.data.get() }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            Arc,
            atomic::{AtomicBool, AtomicUsize, Ordering},
        },
        thread,
        time::Duration,
    };

    use parking_lot::Mutex;

    use super::*;

    #[test]
    fn test_readers_coexist() {
        let lock = GateLock::new(5);
        let a = lock.read();
        let b = lock.read();
        assert_eq!(lock.active_readers(), 2);
        assert_eq!(*a + *b, 10);
        drop(a);
        drop(b);
        assert_eq!(lock.active_readers(), 0);
    }

    #[test]
    fn test_writers_are_exclusive() {
        let lock = GateLock::new(0usize);
        crossbeam_utils::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|_| {
                    for _ in 0..1000 {
                        let mut guard = lock.write();
                        let value = *guard;
                        *guard = value + 1;
                    }
                });
            }
        })
        .unwrap();
        assert_eq!(lock.into_inner(), 8000);
    }

    #[test]
    fn test_writer_waits_for_admitted_readers() {
        let lock = Arc::new(GateLock::new(()));
        let written = Arc::new(AtomicBool::new(false));

        let reader = lock.read();
        let writer = {
            let lock = Arc::clone(&lock);
            let written = Arc::clone(&written);
            thread::spawn(move || {
                let _guard = lock.write();
                written.store(true, Ordering::SeqCst);
            })
        };

        thread::sleep(Duration::from_millis(50));
        assert!(!written.load(Ordering::SeqCst));
        drop(reader);
        writer.join().unwrap();
        assert!(written.load(Ordering::SeqCst));
    }

    #[test]
    fn test_waiting_writer_blocks_new_readers() {
        let lock = Arc::new(GateLock::new(()));
        let events = Arc::new(Mutex::new(Vec::new()));

        let early_reader = lock.read();

        let writer = {
            let lock = Arc::clone(&lock);
            let events = Arc::clone(&events);
            thread::spawn(move || {
                let _guard = lock.write();
                thread::sleep(Duration::from_millis(20));
                events.lock().push("writer");
            })
        };
        // Let the writer take the gate and start draining.
        thread::sleep(Duration::from_millis(50));

        let late_reader = {
            let lock = Arc::clone(&lock);
            let events = Arc::clone(&events);
            thread::spawn(move || {
                let _guard = lock.read();
                events.lock().push("reader");
            })
        };
        thread::sleep(Duration::from_millis(50));
        assert!(events.lock().is_empty());

        drop(early_reader);
        writer.join().unwrap();
        late_reader.join().unwrap();
        assert_eq!(*events.lock(), ["writer", "reader"]);
    }

    #[test]
    fn test_readers_run_concurrently() {
        let lock = GateLock::new(());
        let inside = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);

        crossbeam_utils::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|_| {
                    let _guard = lock.read();
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(50));
                    inside.fetch_sub(1, Ordering::SeqCst);
                });
            }
        })
        .unwrap();
        assert!(peak.load(Ordering::SeqCst) > 1);
    }
}
