use std::sync::Arc;

use xxhash_rust::xxh3::xxh3_64;

use crate::vmm::Vmm;

use super::Shard;

/// Maps keys to the shards of one store.
///
/// The assignment is a pure function of the key bytes and the shard count,
/// so it is stable across restarts and a reloaded image lands on the same
/// shards it was saved from.
pub(crate) struct ShardRouter {
    shards: Vec<Arc<Shard>>,
}

impl ShardRouter {
    pub(crate) fn new(shard_count: usize, ordered: bool, vmm: &Vmm) -> Self {
        let shards = (0..shard_count.max(1))
            .map(|number| Arc::new(Shard::new(number, ordered, vmm.clone())))
            .collect();
        ShardRouter { shards }
    }

    #[inline]
    pub(crate) fn shard_count(&self) -> usize {
        self.shards.len()
    }

    #[inline]
    pub(crate) fn route(&self, key: &[u8]) -> usize {
        if self.shards.len() == 1 {
            return 0;
        }
        (xxh3_64(key) % self.shards.len() as u64) as usize
    }

    #[inline]
    pub(crate) fn shard_for(&self, key: &[u8]) -> &Arc<Shard> {
        &self.shards[self.route(key)]
    }

    pub(crate) fn for_all_shards(&self) -> impl Iterator<Item = &Arc<Shard>> {
        self.shards.iter()
    }

    /// Number of live entries across all shards.
    pub(crate) fn len(&self) -> usize {
        self.shards.iter().map(|shard| shard.len()).sum()
    }
}
