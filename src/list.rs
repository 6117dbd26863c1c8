use std::{
    fmt, mem,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    thread::{self, JoinHandle},
    time::Instant,
};

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::{Config, Error, GateLock, Partition, Result, Semaphore, chain::Chain};

/// A concurrent list split into fixed-capacity partitions.
///
/// Any number of threads may [`append`](Self::append),
/// [`search`](Self::search) and [`remove_element`](Self::remove_element) at
/// the same time. Each partition has its own [`GateLock`], so operations on
/// different partitions only meet on the structure-wide lock, which they
/// all take for reading.
///
/// ## How it works
///
/// Elements live in a backing sequence cut into windows of
/// `partition_capacity` slots, one window per [`Partition`]. A partition
/// owns the first [`size`](Partition::size) slots of its window.
///
/// * **Append** is serialised by an insertion mutex. It fills the last
///   partition, or opens a new one when the last window is physically full.
/// * **Remove** rotates the match to the end of its partition's live window
///   and shrinks the window by one. The slot it leaves behind is a *hole*,
///   always at the tail of the window. The order of the elements is not
///   preserved.
/// * **Compaction** runs on a background thread once more than
///   `compaction_threshold` of the backing sequence consists of holes. It
///   takes the structure-wide lock for writing, which stops new operations
///   and waits out the ones in flight, packs the live elements into a
///   prefix of full partitions and drops the empty tail.
///
/// ## Example
///
/// ```
/// use seglist::SegList;
///
/// let list = SegList::new()?;
///
/// std::thread::scope(|s| {
///     for t in 0..4 {
///         let list = &list;
///         s.spawn(move || {
///             for i in 0..100 {
///                 list.append(t * 100 + i);
///             }
///         });
///     }
/// });
///
/// assert_eq!(list.len(), 400);
/// assert!(list.remove_element(&42));
/// assert!(!list.search(&42));
///
/// list.close();
/// # Ok::<(), seglist::Error>(())
/// ```
pub struct SegList<T> {
    shared: Arc<Shared<T>>,
    compactor: Mutex<Option<JoinHandle<()>>>,
}

/// State shared with the compactor thread.
struct Shared<T> {
    capacity: usize,
    threshold: f64,
    /// The structure-wide lock. Normal operations read, compaction writes.
    storage: GateLock<Storage<T>>,
    insertion: Mutex<()>,
    /// Removals since the last compaction. Updated without ordering: it only
    /// decides when compaction runs.
    deletions: AtomicUsize,
    signal: Semaphore,
    destroyed: AtomicBool,
    compactions: AtomicUsize,
}

struct Storage<T> {
    partitions: Chain<T>,
    /// Length of the backing sequence, holes included.
    physical_len: AtomicUsize,
}

/// Outcome of one compaction pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct ShrinkReport {
    moved: usize,
    dropped_partitions: usize,
    freed_slots: usize,
}

impl<T: Send + Sync + 'static> SegList<T> {
    /// Creates an empty list with the default [`Config`] and starts its
    /// compactor thread.
    pub fn new() -> Result<Self> {
        Self::with_config(Config::default())
    }

    /// Creates an empty list and starts its compactor thread.
    ///
    /// Fails if the configuration is invalid or the thread cannot be
    /// spawned.
    pub fn with_config(config: Config) -> Result<Self> {
        config.validate()?;

        let shared = Arc::new(Shared {
            capacity: config.partition_capacity,
            threshold: config.compaction_threshold,
            storage: GateLock::new(Storage {
                partitions: Chain::new(Partition::new(0, config.partition_capacity)),
                physical_len: AtomicUsize::new(0),
            }),
            insertion: Mutex::new(()),
            deletions: AtomicUsize::new(0),
            signal: Semaphore::new(0),
            destroyed: AtomicBool::new(false),
            compactions: AtomicUsize::new(0),
        });

        let worker = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name(config.thread_name)
            .spawn(move || worker.run_compactor())
            .map_err(Error::Spawn)?;

        Ok(Self {
            shared,
            compactor: Mutex::new(Some(handle)),
        })
    }
}

impl<T> SegList<T> {
    /// Appends an element at the logical end of the list.
    pub fn append(&self, element: T) {
        let _insertion = self.shared.insertion.lock();
        let storage = self.shared.storage.read();
        storage.append(element, self.shared.capacity);
    }

    /// Returns the number of live elements.
    pub fn len(&self) -> usize {
        let storage = self.shared.storage.read();
        storage.partitions.iter().map(Partition::size).sum()
    }

    /// Returns `true` if the list holds no live element.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the length of the backing sequence, holes included.
    pub fn physical_len(&self) -> usize {
        let storage = self.shared.storage.read();
        storage.physical_len.load(Ordering::Acquire)
    }

    /// Returns the number of partitions.
    pub fn partition_count(&self) -> usize {
        self.shared.storage.read().partitions.len()
    }

    /// Returns the live count of every partition, in order.
    pub fn partition_sizes(&self) -> Vec<usize> {
        let storage = self.shared.storage.read();
        storage.partitions.iter().map(Partition::size).collect()
    }

    /// Calls `f` with every partition, in order.
    ///
    /// The structure-wide lock is held for reading throughout, so no
    /// compaction can run until `f` returns. The lock is not reentrant, so
    /// `f` must not call back into the list.
    pub fn inspect<R>(&self, f: impl FnOnce(&[&Partition<T>]) -> R) -> R {
        let storage = self.shared.storage.read();
        let partitions: Vec<_> = storage.partitions.iter().collect();
        f(&partitions)
    }

    /// Returns the number of removals since the last compaction.
    pub fn pending_deletions(&self) -> usize {
        self.shared.deletions.load(Ordering::Relaxed)
    }

    /// Returns the number of compaction passes run so far.
    pub fn compactions(&self) -> usize {
        self.shared.compactions.load(Ordering::Acquire)
    }

    /// Runs a compaction pass on the calling thread.
    ///
    /// Blocks new operations and waits for the ones in flight, like the
    /// background pass does.
    pub fn compact(&self) {
        self.shared.compact();
    }

    /// Stops the compactor thread and waits for it to exit.
    ///
    /// The list stays usable afterwards, but is no longer compacted in the
    /// background. Calling `close` again does nothing. Dropping the list
    /// closes it.
    pub fn close(&self) {
        let Some(handle) = self.compactor.lock().take() else {
            return;
        };
        self.shared.destroyed.store(true, Ordering::SeqCst);
        self.shared.signal.release();
        if handle.join().is_err() {
            warn!("compactor thread panicked");
        }
    }
}

impl<T: PartialEq> SegList<T> {
    /// Returns `true` if the list contains `element`.
    pub fn search(&self, element: &T) -> bool {
        let storage = self.shared.storage.read();
        storage.partitions.iter().any(|partition| {
            let slots = partition.lock().read();
            partition.live_window(&slots).contains(element)
        })
    }

    /// Removes one occurrence of `element`. Returns whether one was found.
    ///
    /// The partition is scanned under its read lock first and only
    /// write-locked on a hit; the scan is then repeated, since the element
    /// may have moved or gone in between.
    pub fn remove_element(&self, element: &T) -> bool {
        let storage = self.shared.storage.read();

        for partition in storage.partitions.iter() {
            let seen = {
                let slots = partition.lock().read();
                partition.live_window(&slots).contains(element)
            };
            if !seen {
                continue;
            }

            let mut slots = partition.lock().write();
            let live = partition.size();
            let Some(position) = slots[..live].iter().position(|e| e == element) else {
                continue;
            };
            slots[position..live].rotate_left(1);
            partition.remove_element();
            drop(slots);

            self.shared.deletions.fetch_add(1, Ordering::Relaxed);
            self.shared.trigger(&storage);
            return true;
        }

        false
    }
}

impl<T> Drop for SegList<T> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<T> fmt::Debug for SegList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SegList")
            .field("partitions", &self.partition_sizes())
            .field("physical_len", &self.physical_len())
            .field("pending_deletions", &self.pending_deletions())
            .finish()
    }
}

/// Dumps the list, one line per partition, with `*` for unused slots.
///
/// The header gives `size`, the live count, and `physical`, the backing
/// length with holes included. Takes the structure-wide lock for writing.
impl<T: fmt::Display> fmt::Display for SegList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut storage = self.shared.storage.write();
        let live: usize = storage.partitions.iter().map(Partition::size).sum();
        writeln!(f, "size: {live}")?;
        writeln!(f, "physical: {}", storage.physical_len.load(Ordering::Acquire))?;
        writeln!(f, "partitions: {}", storage.partitions.len())?;

        for partition in storage.partitions.iter_mut() {
            let begin = partition.begin();
            let capacity = partition.capacity();
            let (slots, live) = partition.parts_mut();
            write!(f, "@{begin}:")?;
            for element in &slots[..*live] {
                write!(f, " {element}")?;
            }
            for _ in *live..capacity {
                f.write_str(" *")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

impl<T> Shared<T> {
    /// Wakes the compactor if the deletion ratio is over the threshold.
    fn trigger(&self, storage: &Storage<T>) {
        let deletions = self.deletions.load(Ordering::Relaxed);
        let len = storage.physical_len.load(Ordering::Relaxed);
        if len == 0 {
            return;
        }
        let ratio = deletions as f64 / len as f64;
        if ratio > self.threshold {
            trace!(deletions, len, ratio, "signalling compactor");
            self.signal.release();
        }
    }

    fn compact(&self) -> ShrinkReport {
        let start = Instant::now();
        let mut storage = self.storage.write();
        let report = storage.shrink_to_fit(self.capacity);
        self.deletions.store(0, Ordering::Relaxed);
        self.compactions.fetch_add(1, Ordering::AcqRel);
        drop(storage);

        debug!(
            moved = report.moved,
            dropped_partitions = report.dropped_partitions,
            freed_slots = report.freed_slots,
            elapsed = ?start.elapsed(),
            "compaction pass finished"
        );
        report
    }

    fn run_compactor(&self) {
        debug!("compactor started");
        loop {
            self.signal.acquire();
            if self.destroyed.load(Ordering::SeqCst) {
                break;
            }
            self.compact();
            // Signals raised during the pass are covered by it.
            self.signal.set_permits(0);
            // `close` may have released just before the reset.
            if self.destroyed.load(Ordering::SeqCst) {
                break;
            }
        }
        debug!("compactor stopped");
    }
}

impl<T> Storage<T> {
    /// Places `element` in the last partition, opening a new one when its
    /// window is physically full. Callers hold the insertion mutex.
    fn append(&self, element: T, capacity: usize) {
        let offset = self.physical_len.fetch_add(1, Ordering::AcqRel);

        let last = self.partitions.last();
        let mut slots = last.lock().write();
        if offset < last.begin() + capacity {
            debug_assert_eq!(slots.len(), offset - last.begin());
            slots.push(element);
            let end = slots.len() - 1;
            slots.swap(last.size(), end);
            last.add_element();
            return;
        }
        drop(slots);

        let partition = self.partitions.push(Partition::new(offset, capacity));
        let mut slots = partition.lock().write();
        slots.push(element);
        partition.add_element();
    }

    /// Packs live elements into a prefix of full partitions, then drops the
    /// empty partitions and the holes after the new logical end.
    ///
    /// Holes are always at the tail of a window, so a partition's live
    /// elements are its first `size()` slots.
    fn shrink_to_fit(&mut self, capacity: usize) -> ShrinkReport {
        let old_len = *self.physical_len.get_mut();
        let mut partitions: Vec<&mut Partition<T>> = self.partitions.iter_mut().collect();
        let old_count = partitions.len();

        let Some(first_sink) = partitions.iter().position(|p| p.size() < capacity) else {
            return ShrinkReport::default();
        };

        let mut moved = 0;
        let mut sink = first_sink;
        for source in first_sink + 1..partitions.len() {
            let live = partitions[source].size();
            partitions[source].clear();

            for from in 0..live {
                if sink < source {
                    let (head, tail) = partitions.split_at_mut(source);
                    let (sink_slots, sink_live) = head[sink].parts_mut();
                    let (source_slots, _) = tail[0].parts_mut();
                    mem::swap(&mut sink_slots[*sink_live], &mut source_slots[from]);
                    *sink_live += 1;
                    moved += 1;
                } else {
                    let (slots, sink_live) = partitions[source].parts_mut();
                    if *sink_live != from {
                        slots.swap(*sink_live, from);
                        moved += 1;
                    }
                    *sink_live += 1;
                }
                if partitions[sink].size() == capacity {
                    sink += 1;
                }
            }
        }

        let keep = partitions
            .iter()
            .rposition(|p| !p.is_destroyed())
            .map_or(1, |last| last + 1);
        let last = &mut partitions[keep - 1];
        let new_len = last.begin() + last.size();
        let (slots, live) = last.parts_mut();
        slots.truncate(*live);
        drop(partitions);

        self.partitions.truncate(keep);
        *self.physical_len.get_mut() = new_len;

        ShrinkReport {
            moved,
            dropped_partitions: old_count - keep,
            freed_slots: old_len - new_len,
        }
    }
}
