#![doc = include_str!("../README.md")]

//! A concurrent, partitioned list.
//!
//! This crate provides a [`SegList<T>`] type, a growable list that many
//! threads can append to, search and remove from at once, while a
//! background thread periodically packs away the holes left by removals.
//! See [`SegList<T>`] for more details.
//!
//! The synchronisation primitives it is built from are exported as well:
//! [`GateLock`], a reader-writer lock whose writers shut out new readers as
//! soon as they arrive, and [`Semaphore`], a counting semaphore whose permit
//! count can be reset.

mod chain;
mod config;
mod error;
mod list;
mod partition;
mod rw_lock;
mod semaphore;

pub use config::Config;
pub use error::{Error, Result};
pub use list::SegList;
pub use partition::Partition;
pub use rw_lock::{GateLock, ReadGuard, WriteGuard};
pub use semaphore::Semaphore;
