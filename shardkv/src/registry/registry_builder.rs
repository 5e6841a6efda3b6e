use std::path::Path;

use crate::common::{
    ACTIVE_DEFRAG, EVICTION_POLICY, MAX_DEFRAG_PAGE_COUNT, MAX_MEMORY_BYTES, MAX_POOLED_PAGES,
    MIN_FRAGMENTATION_RATIO,
};
use crate::context::EngineContext;
use crate::errors::{KvError, KvResult};
use crate::eviction::EvictionPolicy;
use crate::persistence::{
    FileSnapshotProvider, InMemorySnapshotProvider, SnapshotProvider, SnapshotStore,
};

use super::{GlobalConfig, Registry};

/// Builder for a [`Registry`].
///
/// Configuration errors are captured as they happen and returned from
/// [`RegistryBuilder::open`]; later calls after the first error are ignored.
/// Settings made here take precedence over tunables recorded in a saved
/// configuration store.
///
/// # Examples
///
/// ```rust
/// use shardkv::{EvictionPolicy, Registry};
///
/// let registry = Registry::builder()
///     .max_memory_bytes(256 * 1024 * 1024)
///     .eviction_policy(EvictionPolicy::AllKeysLru)
///     .min_fragmentation_ratio(0.5)
///     .open()
///     .unwrap();
/// assert_eq!(registry.global_config().unwrap().min_fragmentation_ratio(), 0.5);
///
/// let err = Registry::builder().min_fragmentation_ratio(3.0).open();
/// assert!(err.is_err());
/// ```
#[derive(Default)]
pub struct RegistryBuilder {
    error: Option<KvError>,
    config: GlobalConfig,
    pinned: Vec<&'static str>,
    snapshots: Option<SnapshotStore>,
}

impl RegistryBuilder {
    /// In-memory images and default tunables.
    pub fn new() -> Self {
        RegistryBuilder::default()
    }

    /// Saves images as files under `dir`, creating it if needed.
    pub fn data_dir(mut self, dir: impl AsRef<Path>) -> Self {
        if self.error.is_none() {
            match FileSnapshotProvider::new(dir) {
                Ok(provider) => self.snapshots = Some(SnapshotStore::new(provider)),
                Err(e) => self.error = Some(e),
            }
        }
        self
    }

    /// Saves images through a custom provider.
    pub fn snapshot_provider<T: SnapshotProvider + 'static>(mut self, provider: T) -> Self {
        self.snapshots = Some(SnapshotStore::new(provider));
        self
    }

    /// Memory ceiling in bytes; 0 disables eviction.
    pub fn max_memory_bytes(self, bytes: u64) -> Self {
        self.set(MAX_MEMORY_BYTES, &bytes.to_string())
    }

    pub fn eviction_policy(self, policy: EvictionPolicy) -> Self {
        self.set(EVICTION_POLICY, policy.as_str())
    }

    pub fn min_fragmentation_ratio(self, ratio: f32) -> Self {
        self.set(MIN_FRAGMENTATION_RATIO, &ratio.to_string())
    }

    pub fn max_defrag_page_count(self, pages: usize) -> Self {
        self.set(MAX_DEFRAG_PAGE_COUNT, &pages.to_string())
    }

    pub fn active_defrag(self, active: bool) -> Self {
        self.set(ACTIVE_DEFRAG, &active.to_string())
    }

    pub fn max_pooled_pages(self, pages: usize) -> Self {
        self.set(MAX_POOLED_PAGES, &pages.to_string())
    }

    /// Sets any tunable from its textual form, as
    /// [`Registry::set_global_config`] would.
    pub fn setting(self, key: &str, value: &str) -> Self {
        self.set(key, value)
    }

    fn set(mut self, key: &str, value: &str) -> Self {
        if self.error.is_none() {
            match self.config.set(key, value) {
                Ok(()) => {
                    if let Some(&known) = GlobalConfig::KEYS.iter().find(|known| **known == key) {
                        if !self.pinned.contains(&known) {
                            self.pinned.push(known);
                        }
                    }
                }
                Err(e) => self.error = Some(e),
            }
        }
        self
    }

    /// Opens the registry, loading the configuration store if its image
    /// exists.
    pub fn open(self) -> KvResult<Registry> {
        if let Some(error) = self.error {
            return Err(error);
        }
        let snapshots = self
            .snapshots
            .unwrap_or_else(|| SnapshotStore::new(InMemorySnapshotProvider::new()));
        let context = EngineContext::new(snapshots, self.config);
        Registry::open_with_context(context, &self.pinned)
    }
}
