use std::sync::Arc;

use crate::common::{atomic, Atomic, ReadExecutor, WriteExecutor};
use crate::errors::KvResult;
use crate::eviction::EvictionController;
use crate::index::RecencyClock;
use crate::persistence::SnapshotStore;
use crate::registry::GlobalConfig;
use crate::stats::{OpCounters, StatsCollector};
use crate::vmm::Vmm;

/// State shared by a registry and every store it hands out.
#[derive(Clone)]
pub(crate) struct EngineContext {
    pub(crate) vmm: Vmm,
    pub(crate) clock: Arc<RecencyClock>,
    pub(crate) eviction: EvictionController,
    pub(crate) counters: OpCounters,
    pub(crate) snapshots: SnapshotStore,
    tunables: Atomic<GlobalConfig>,
}

impl EngineContext {
    pub(crate) fn new(snapshots: SnapshotStore, config: GlobalConfig) -> Self {
        let vmm = Vmm::new(config.max_pooled_pages());
        let context = EngineContext {
            eviction: EvictionController::new(vmm.clone()),
            vmm,
            clock: Arc::new(RecencyClock::default()),
            counters: OpCounters::new(),
            snapshots,
            tunables: atomic(config),
        };
        context.sync_tunables();
        context
    }

    pub(crate) fn global_config(&self) -> GlobalConfig {
        self.tunables.read_with(|config| config.clone())
    }

    /// Validates and applies one tunable.
    pub(crate) fn apply_setting(&self, key: &str, value: &str) -> KvResult<()> {
        self.tunables.write_with(|config| config.set(key, value))?;
        self.sync_tunables();
        Ok(())
    }

    pub(crate) fn tracks_all_reads(&self) -> bool {
        self.eviction.policy().tracks_all_reads()
    }

    pub(crate) fn defrag_params(&self) -> (f32, usize) {
        self.tunables.read_with(|config| {
            (
                config.min_fragmentation_ratio(),
                config.max_defrag_page_count(),
            )
        })
    }

    pub(crate) fn stats_collector(&self) -> StatsCollector {
        StatsCollector::new(
            self.vmm.clone(),
            self.eviction.clone(),
            self.counters.clone(),
        )
    }

    fn sync_tunables(&self) {
        let config = self.global_config();
        self.eviction.set_policy(config.eviction_policy());
        self.eviction.set_active_defrag(config.active_defrag());
        if config.max_memory_bytes() == 0 {
            self.eviction.disable();
        } else {
            self.eviction.enable(config.max_memory_bytes());
        }
        self.vmm.set_max_pooled_pages(config.max_pooled_pages());
    }
}

impl Default for EngineContext {
    fn default() -> Self {
        EngineContext::new(
            SnapshotStore::new(crate::persistence::InMemorySnapshotProvider::new()),
            GlobalConfig::default(),
        )
    }
}
