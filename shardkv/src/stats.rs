//! Point-in-time engine statistics.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::eviction::EvictionController;
use crate::vmm::Vmm;

/// Store operations counted by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Get,
    Set,
    Delete,
    Min,
    Max,
    Range,
    LowerBound,
    Size,
    Incr,
}

impl Operation {
    const COUNT: usize = 9;

    fn slot(self) -> usize {
        match self {
            Operation::Get => 0,
            Operation::Set => 1,
            Operation::Delete => 2,
            Operation::Min => 3,
            Operation::Max => 4,
            Operation::Range => 5,
            Operation::LowerBound => 6,
            Operation::Size => 7,
            Operation::Incr => 8,
        }
    }
}

/// Registry-wide operation counters, shared by every store.
#[derive(Clone, Default)]
pub struct OpCounters {
    inner: Arc<[AtomicU64; Operation::COUNT]>,
}

impl OpCounters {
    pub fn new() -> Self {
        OpCounters::default()
    }

    #[inline]
    pub fn record(&self, operation: Operation) {
        self.inner[operation.slot()].fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self, operation: Operation) -> u64 {
        self.inner[operation.slot()].load(Ordering::Relaxed)
    }
}

/// Immutable snapshot of the VMM, eviction and operation counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    pub heap_bytes_allocated: u64,
    pub vmm_bytes_allocated: u64,
    pub bytes_in_free_lists: u64,
    pub logical_allocated: u64,
    pub vmm_pages_defragged: u64,
    pub vmm_pages_popped: u64,
    pub pages_pooled: u64,
    pub keys_evicted: u64,
    pub keys_expired: u64,
    pub get_ops: u64,
    pub set_ops: u64,
    pub delete_ops: u64,
    pub min_ops: u64,
    pub max_ops: u64,
    pub range_ops: u64,
    pub lb_ops: u64,
    pub size_ops: u64,
    pub incr_ops: u64,
}

/// Reads live counters on every call; nothing is cached.
#[derive(Clone)]
pub struct StatsCollector {
    vmm: Vmm,
    eviction: EvictionController,
    counters: OpCounters,
}

impl StatsCollector {
    pub fn new(vmm: Vmm, eviction: EvictionController, counters: OpCounters) -> Self {
        StatsCollector {
            vmm,
            eviction,
            counters,
        }
    }

    pub fn snapshot(&self) -> Stats {
        let vmm = self.vmm.stats();
        Stats {
            heap_bytes_allocated: vmm.heap_bytes,
            vmm_bytes_allocated: vmm.vmm_bytes,
            bytes_in_free_lists: vmm.free_list_bytes,
            logical_allocated: vmm.logical_bytes,
            vmm_pages_defragged: vmm.pages_defragged,
            vmm_pages_popped: vmm.pages_popped,
            pages_pooled: vmm.pages_pooled,
            keys_evicted: self.eviction.keys_evicted(),
            keys_expired: self.eviction.keys_expired(),
            get_ops: self.counters.get(Operation::Get),
            set_ops: self.counters.get(Operation::Set),
            delete_ops: self.counters.get(Operation::Delete),
            min_ops: self.counters.get(Operation::Min),
            max_ops: self.counters.get(Operation::Max),
            range_ops: self.counters.get(Operation::Range),
            lb_ops: self.counters.get(Operation::LowerBound),
            size_ops: self.counters.get(Operation::Size),
            incr_ops: self.counters.get(Operation::Incr),
        }
    }
}
