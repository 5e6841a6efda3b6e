use serde::{Deserialize, Serialize};

use crate::common::MAX_SHARD_COUNT;
use crate::errors::{ErrorKind, KvError, KvResult};

/// Parameters fixed when a store is created.
///
/// Ordering decides the index kind: ordered stores keep a radix tree per
/// shard, unordered stores a hash map. The shard count decides how many
/// independently locked partitions the keyspace is split into.
///
/// # Examples
///
/// ```rust
/// use shardkv::store::StoreConfig;
///
/// let config = StoreConfig::new(true, 8).unwrap();
/// assert!(config.ordered());
/// assert_eq!(config.shard_count(), 8);
/// assert!(StoreConfig::new(true, 0).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StoreConfig {
    ordered: bool,
    shard_count: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            ordered: true,
            shard_count: 1,
        }
    }
}

impl StoreConfig {
    pub fn new(ordered: bool, shard_count: usize) -> KvResult<Self> {
        if shard_count == 0 || shard_count > MAX_SHARD_COUNT {
            log::error!(
                "Shard count {} is outside 1..={}",
                shard_count,
                MAX_SHARD_COUNT
            );
            return Err(KvError::new(
                &format!(
                    "Shard count {} is outside 1..={}",
                    shard_count, MAX_SHARD_COUNT
                ),
                ErrorKind::InvalidConfiguration,
            ));
        }
        Ok(StoreConfig {
            ordered,
            shard_count,
        })
    }

    // images carry counts that were validated when they were written
    pub(crate) fn unchecked(ordered: bool, shard_count: usize) -> Self {
        StoreConfig {
            ordered,
            shard_count: shard_count.clamp(1, MAX_SHARD_COUNT),
        }
    }

    /// Same ordering, different shard count.
    pub fn with_shards(self, shard_count: usize) -> KvResult<Self> {
        StoreConfig::new(self.ordered, shard_count)
    }

    /// Same shard count, different ordering.
    pub fn with_ordered(self, ordered: bool) -> Self {
        StoreConfig { ordered, ..self }
    }

    #[inline]
    pub fn ordered(&self) -> bool {
        self.ordered
    }

    #[inline]
    pub fn shard_count(&self) -> usize {
        self.shard_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StoreConfig::default();
        assert!(config.ordered());
        assert_eq!(config.shard_count(), 1);
    }

    #[test]
    fn test_shard_count_bounds() {
        assert!(StoreConfig::new(false, 1).is_ok());
        assert!(StoreConfig::new(false, MAX_SHARD_COUNT).is_ok());
        assert_eq!(
            StoreConfig::new(false, MAX_SHARD_COUNT + 1).unwrap_err().kind(),
            &ErrorKind::InvalidConfiguration
        );
        assert!(StoreConfig::default().with_shards(0).is_err());
    }

    #[test]
    fn test_with_helpers() {
        let config = StoreConfig::default().with_ordered(false).with_shards(4).unwrap();
        assert!(!config.ordered());
        assert_eq!(config.shard_count(), 4);
        assert_eq!(StoreConfig::unchecked(true, 0).shard_count(), 1);
    }
}
