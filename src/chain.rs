use std::{
    marker::PhantomData,
    ptr,
    sync::atomic::{AtomicPtr, AtomicUsize, Ordering},
};

use crate::Partition;

/// A single link in the chain.
struct Link<T> {
    /// The partition stored in the link.
    partition: Partition<T>,
    /// A pointer to the next link, null at the tail.
    next: AtomicPtr<Link<T>>,
}

impl<T> Link<T> {
    fn alloc(partition: Partition<T>) -> *mut Self {
        Box::into_raw(Box::new(Self {
            partition,
            next: AtomicPtr::new(ptr::null_mut()),
        }))
    }
}

/// The ordered sequence of partitions.
///
/// A singly-linked list in creation order. Appending goes through `&self`
/// and is lock-free: the new link is published with a compare-and-swap on
/// the tail's `next` pointer, so readers walking the chain concurrently see
/// either the old tail or the fully initialised new link. Links are never
/// freed while the chain is shared; unlinking needs `&mut self`, which the
/// list only has under its structure-wide write lock or on drop.
///
/// The chain is never empty.
pub(crate) struct Chain<T> {
    head: AtomicPtr<Link<T>>,
    /// Last link, or one that precedes it while a push is in flight.
    tail: AtomicPtr<Link<T>>,
    len: AtomicUsize,
    _marker: PhantomData<Partition<T>>,
}

impl<T> Chain<T> {
    /// Creates a chain holding a single partition.
    pub(crate) fn new(first: Partition<T>) -> Self {
        let link = Link::alloc(first);
        Self {
            head: AtomicPtr::new(link),
            tail: AtomicPtr::new(link),
            len: AtomicUsize::new(1),
            _marker: PhantomData,
        }
    }

    /// Appends a partition and returns a reference to it.
    pub(crate) fn push(&self, partition: Partition<T>) -> &Partition<T> {
        let link = Link::alloc(partition);

        let mut tail = self.tail.load(Ordering::Acquire);
        loop {
            // SAFETY: links are only freed through `&mut self`.
            let next = unsafe { &(*tail).next };
            match next.compare_exchange_weak(
                ptr::null_mut(),
                link,
                Ordering::Release,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    let _ = self.tail.compare_exchange(
                        tail,
                        link,
                        Ordering::Release,
                        Ordering::Relaxed,
                    );
                    break;
                }
                // Spurious failure.
                Err(current) if current.is_null() => {}
                Err(current) => {
                    let _ = self.tail.compare_exchange(
                        tail,
                        current,
                        Ordering::Release,
                        Ordering::Relaxed,
                    );
                    tail = current;
                }
            }
        }
        self.len.fetch_add(1, Ordering::Release);

        // SAFETY: `link` was just published and outlives `&self`.
        unsafe { &(*link).partition }
    }

    /// Returns the number of partitions.
    pub(crate) fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    /// Returns the last partition.
    pub(crate) fn last(&self) -> &Partition<T> {
        let mut link = self.tail.load(Ordering::Acquire);
        loop {
            // SAFETY: see `push`.
            let next = unsafe { (*link).next.load(Ordering::Acquire) };
            if next.is_null() {
                break;
            }
            link = next;
        }
        // SAFETY: see `push`.
        unsafe { &(*link).partition }
    }

    /// Iterates over the partitions in creation order.
    pub(crate) fn iter(&self) -> Iter<'_, T> {
        Iter {
            next: self.head.load(Ordering::Acquire),
            _marker: PhantomData,
        }
    }

    /// Iterates mutably over the partitions in creation order.
    pub(crate) fn iter_mut(&mut self) -> IterMut<'_, T> {
        IterMut {
            next: *self.head.get_mut(),
            _marker: PhantomData,
        }
    }

    /// Keeps the first `keep` partitions and frees the rest.
    pub(crate) fn truncate(&mut self, keep: usize) {
        let keep = keep.max(1);
        if keep >= *self.len.get_mut() {
            return;
        }

        let mut last = *self.head.get_mut();
        for _ in 1..keep {
            // SAFETY: `keep` is below the chain length, so every step lands
            // on a live link.
            last = unsafe { *(*last).next.get_mut() };
        }
        // SAFETY: `last` is a live link and we hold `&mut self`.
        let rest = unsafe { (*last).next.swap(ptr::null_mut(), Ordering::AcqRel) };
        *self.tail.get_mut() = last;
        *self.len.get_mut() = keep;
        free_from(rest);
    }
}

impl<T> Drop for Chain<T> {
    fn drop(&mut self) {
        free_from(*self.head.get_mut());
    }
}

/// Frees every link from `link` to the end of the chain.
fn free_from<T>(mut link: *mut Link<T>) {
    while !link.is_null() {
        // SAFETY: the caller has unlinked `link` and owns it exclusively.
        let mut boxed = unsafe { Box::from_raw(link) };
        link = *boxed.next.get_mut();
    }
}

/// Iterator over the partitions of a [`Chain`].
pub(crate) struct Iter<'a, T> {
    next: *const Link<T>,
    _marker: PhantomData<&'a Partition<T>>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a Partition<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next.is_null() {
            return None;
        }
        // SAFETY: the chain is borrowed for `'a`, so no link is freed.
        let link = unsafe { &*self.next };
        self.next = link.next.load(Ordering::Acquire);
        Some(&link.partition)
    }
}

/// Mutable iterator over the partitions of a [`Chain`].
pub(crate) struct IterMut<'a, T> {
    next: *mut Link<T>,
    _marker: PhantomData<&'a mut Partition<T>>,
}

impl<'a, T> Iterator for IterMut<'a, T> {
    type Item = &'a mut Partition<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next.is_null() {
            return None;
        }
        // SAFETY: the chain is mutably borrowed for `'a` and every link is
        // yielded at most once.
        let link = unsafe { &mut *self.next };
        self.next = *link.next.get_mut();
        Some(&mut link.partition)
    }
}
