use crate::{Error, Result};

/// Construction-time settings for a [`SegList`](crate::SegList).
///
/// ```
/// use seglist::Config;
///
/// let config = Config::default()
///     .with_partition_capacity(32)
///     .with_compaction_threshold(0.25);
/// assert_eq!(config.partition_capacity, 32);
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    /// Number of slots reserved by every partition. Fixed for the lifetime
    /// of the list.
    pub partition_capacity: usize,
    /// Compaction is signalled once `deletions / physical_len` exceeds this.
    pub compaction_threshold: f64,
    /// Name given to the compactor thread.
    pub thread_name: String,
}

impl Config {
    /// Partition capacity used when none is configured.
    pub const DEFAULT_PARTITION_CAPACITY: usize = 10;
    /// Deletion ratio used when none is configured.
    pub const DEFAULT_COMPACTION_THRESHOLD: f64 = 0.15;

    /// Sets the partition capacity.
    #[must_use]
    pub fn with_partition_capacity(mut self, capacity: usize) -> Self {
        self.partition_capacity = capacity;
        self
    }

    /// Sets the deletion ratio that triggers compaction.
    #[must_use]
    pub fn with_compaction_threshold(mut self, threshold: f64) -> Self {
        self.compaction_threshold = threshold;
        self
    }

    /// Sets the compactor thread name.
    #[must_use]
    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.partition_capacity == 0 {
            return Err(Error::InvalidConfig(
                "partition capacity must be greater than zero".into(),
            ));
        }
        // NaN fails both comparisons.
        if !(self.compaction_threshold > 0.0 && self.compaction_threshold <= 1.0) {
            return Err(Error::InvalidConfig(format!(
                "compaction threshold must be in (0, 1], got {}",
                self.compaction_threshold
            )));
        }
        if self.thread_name.is_empty() {
            return Err(Error::InvalidConfig("thread name must not be empty".into()));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            partition_capacity: Self::DEFAULT_PARTITION_CAPACITY,
            compaction_threshold: Self::DEFAULT_COMPACTION_THRESHOLD,
            thread_name: "seglist-compactor".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = Config::default();
        assert_eq!(config.partition_capacity, 10);
        assert_eq!(config.compaction_threshold, 0.15);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_capacity() {
        let config = Config::default().with_partition_capacity(0);
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_rejects_bad_threshold() {
        for threshold in [0.0, -0.5, 1.5, f64::NAN] {
            let config = Config::default().with_compaction_threshold(threshold);
            assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
        }
        let config = Config::default().with_compaction_threshold(1.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_empty_thread_name() {
        let config = Config::default().with_thread_name("");
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }
}
