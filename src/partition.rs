use std::{
    cmp::Ordering as CmpOrdering,
    fmt, ptr,
    sync::atomic::{AtomicUsize, Ordering},
};

use crate::GateLock;

/// A fixed-capacity window of the backing sequence.
///
/// The partition reserves the physical slots
/// `[begin(), begin() + capacity())` and logically owns the first `size()`
/// of them. Slots past `size()` are either holes left behind by removals
/// (always at the tail of the window) or not yet allocated.
///
/// The slots themselves live behind the partition's [`GateLock`]; the live
/// count sits next to it so it can be read without locking. It is only ever
/// changed by a thread holding the partition's write lock, or by the
/// compactor while it owns the whole list.
pub struct Partition<T> {
    start: usize,
    capacity: usize,
    live: AtomicUsize,
    slots: GateLock<Vec<T>>,
}

impl<T> Partition<T> {
    pub(crate) fn new(start: usize, capacity: usize) -> Self {
        Self {
            start,
            capacity,
            live: AtomicUsize::new(0),
            slots: GateLock::new(Vec::with_capacity(capacity)),
        }
    }

    /// Offset of the first reserved slot in the backing sequence.
    #[inline]
    pub fn begin(&self) -> usize {
        self.start
    }

    /// Number of live elements.
    #[inline]
    pub fn size(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    /// Number of reserved slots.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether the partition holds no live element and may be dropped by
    /// compaction.
    #[inline]
    pub fn is_destroyed(&self) -> bool {
        self.size() == 0
    }

    /// Orders partitions by live count.
    pub fn cmp_size(&self, other: &Self) -> CmpOrdering {
        self.size().cmp(&other.size())
    }

    /// Calls `f` with the live elements, under this partition's read lock.
    pub fn with_live<R>(&self, f: impl FnOnce(&[T]) -> R) -> R {
        let slots = self.slots.read();
        f(self.live_window(&slots))
    }

    /// The lock guarding this partition's physical slots.
    #[inline]
    pub(crate) fn lock(&self) -> &GateLock<Vec<T>> {
        &self.slots
    }

    /// Narrows a view of this partition's slots to its live window.
    #[inline]
    pub(crate) fn live_window<'a>(&self, slots: &'a [T]) -> &'a [T] {
        &slots[..self.size()]
    }

    // Callers hold the write lock.
    pub(crate) fn add_element(&self) {
        let prev = self.live.fetch_add(1, Ordering::AcqRel);
        debug_assert!(prev < self.capacity, "partition overflow");
    }

    // Callers hold the write lock.
    pub(crate) fn remove_element(&self) {
        let prev = self.live.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "partition underflow");
    }

    pub(crate) fn clear(&mut self) {
        *self.live.get_mut() = 0;
    }

    /// Exclusive access to slots and live count, bypassing the lock.
    pub(crate) fn parts_mut(&mut self) -> (&mut Vec<T>, &mut usize) {
        (self.slots.get_mut(), self.live.get_mut())
    }
}

impl<T> PartialEq for Partition<T> {
    fn eq(&self, other: &Self) -> bool {
        ptr::eq(self, other)
    }
}

impl<T> Eq for Partition<T> {}

impl<T> fmt::Debug for Partition<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Partition")
            .field("begin", &self.start)
            .field("size", &self.size())
            .field("capacity", &self.capacity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts() {
        let partition = Partition::<u32>::new(20, 10);
        assert_eq!(partition.begin(), 20);
        assert_eq!(partition.capacity(), 10);
        assert!(partition.is_destroyed());

        partition.add_element();
        partition.add_element();
        assert_eq!(partition.size(), 2);
        partition.remove_element();
        assert_eq!(partition.size(), 1);
        assert!(!partition.is_destroyed());
    }

    #[test]
    fn test_clear() {
        let mut partition = Partition::<u32>::new(0, 10);
        partition.add_element();
        partition.clear();
        assert!(partition.is_destroyed());
    }

    #[test]
    fn test_identity_and_ordering() {
        let a = Partition::<u32>::new(0, 10);
        let b = Partition::<u32>::new(10, 10);
        assert_eq!(a, a);
        assert_ne!(a, b);
        assert_eq!(a.cmp_size(&b), CmpOrdering::Equal);

        b.add_element();
        assert_eq!(a.cmp_size(&b), CmpOrdering::Less);
        assert_eq!(b.cmp_size(&a), CmpOrdering::Greater);
    }

    #[test]
    fn test_live_window() {
        let partition = Partition::new(0, 4);
        {
            let mut slots = partition.lock().write();
            slots.extend([1, 2, 3]);
            partition.add_element();
            partition.add_element();
        }
        let slots = partition.lock().read();
        assert_eq!(partition.live_window(&slots), [1, 2]);
        drop(slots);
        assert_eq!(partition.with_live(<[i32]>::to_vec), [1, 2]);
    }
}
