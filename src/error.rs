use std::io;

use thiserror::Error;

/// Errors that can occur while constructing a [`SegList`](crate::SegList).
///
/// Lookups never fail: an absent element is reported as `false` by
/// [`search`](crate::SegList::search) and
/// [`remove_element`](crate::SegList::remove_element).
#[derive(Error, Debug)]
pub enum Error {
    /// The background compactor thread could not be spawned.
    #[error("failed to spawn compactor thread: {0}")]
    Spawn(#[source] io::Error),

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for list construction.
pub type Result<T> = std::result::Result<T, Error>;
