use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::common::{atomic, Atomic, ReadExecutor, WriteExecutor};
use crate::errors::KvResult;
use crate::vmm::Vmm;

use super::EvictionPolicy;

const UNLIMITED: u64 = u64::MAX;

/// Something the controller can evict entries from. Stores implement it.
pub trait EvictionSource: Send + Sync {
    fn source_name(&self) -> String;

    /// Whether this source takes part in eviction under `policy`.
    fn eviction_enabled(&self, policy: EvictionPolicy) -> bool;

    /// Tick of the least recently used entry, or `None` when the source is
    /// empty or busy.
    fn oldest_tick(&self) -> Option<u64>;

    /// Evicts least recently used entries, aiming to release `budget`
    /// bytes. Returns the number of keys removed.
    fn evict_oldest(&self, budget: u64) -> KvResult<usize>;

    /// Compacts memory after entries were evicted. Returns pages released.
    fn compact(&self) -> KvResult<usize>;

    /// Drops entries whose expiry deadline has passed. Returns how many.
    fn purge_expired(&self) -> KvResult<usize>;
}

/// Enforces the memory ceiling by evicting least recently used entries.
///
/// Eviction is synchronous: the writer whose allocation pushed logical
/// bytes over the threshold runs [`evict_until_under_threshold`] itself,
/// after releasing its own shard lock. Only one thread evicts at a time;
/// writers that find a pass in progress return immediately. Each pass
/// first sweeps expired entries out of every source, then falls back to
/// LRU order.
///
/// [`evict_until_under_threshold`]: EvictionController::evict_until_under_threshold
#[derive(Clone)]
pub struct EvictionController {
    inner: Arc<EvictionControllerInner>,
}

struct EvictionControllerInner {
    vmm: Vmm,
    threshold: AtomicU64,
    policy: Atomic<EvictionPolicy>,
    active_defrag: AtomicBool,
    sources: DashMap<String, Weak<dyn EvictionSource>>,
    keys_evicted: AtomicU64,
    keys_expired: AtomicU64,
    running: Mutex<()>,
}

impl EvictionController {
    pub fn new(vmm: Vmm) -> Self {
        EvictionController {
            inner: Arc::new(EvictionControllerInner {
                vmm,
                threshold: AtomicU64::new(UNLIMITED),
                policy: atomic(EvictionPolicy::default()),
                active_defrag: AtomicBool::new(false),
                sources: DashMap::new(),
                keys_evicted: AtomicU64::new(0),
                keys_expired: AtomicU64::new(0),
                running: Mutex::new(()),
            }),
        }
    }

    /// Starts enforcing a ceiling on logical bytes. Zero disables eviction.
    pub fn enable(&self, threshold_bytes: u64) {
        if threshold_bytes == 0 {
            self.disable();
            return;
        }
        log::info!("Eviction enabled above {} logical bytes", threshold_bytes);
        self.inner.threshold.store(threshold_bytes, Ordering::Relaxed);
    }

    /// Stops future enforcement. Entries already evicted stay gone.
    pub fn disable(&self) {
        self.inner.threshold.store(UNLIMITED, Ordering::Relaxed);
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.threshold.load(Ordering::Relaxed) != UNLIMITED
    }

    pub fn threshold(&self) -> Option<u64> {
        let threshold = self.inner.threshold.load(Ordering::Relaxed);
        (threshold != UNLIMITED).then_some(threshold)
    }

    pub fn policy(&self) -> EvictionPolicy {
        self.inner.policy.read_with(|policy| *policy)
    }

    pub fn set_policy(&self, policy: EvictionPolicy) {
        self.inner.policy.write_with(|current| *current = policy);
    }

    pub fn set_active_defrag(&self, active: bool) {
        self.inner.active_defrag.store(active, Ordering::Relaxed);
    }

    pub fn keys_evicted(&self) -> u64 {
        self.inner.keys_evicted.load(Ordering::Relaxed)
    }

    pub fn keys_expired(&self) -> u64 {
        self.inner.keys_expired.load(Ordering::Relaxed)
    }

    pub fn register(&self, name: &str, source: Weak<dyn EvictionSource>) {
        self.inner.sources.insert(name.to_string(), source);
    }

    /// Drops the registration of `name` if it still belongs to `source`. A
    /// source registered later under the same name is left alone.
    pub fn unregister(&self, name: &str, source: &Weak<dyn EvictionSource>) {
        self.inner
            .sources
            .remove_if(name, |_, registered| Weak::ptr_eq(registered, source));
    }

    pub fn clear_sources(&self) {
        self.inner.sources.clear();
    }

    /// Hook run after every allocation of `size` bytes. The caller must not
    /// hold any shard lock.
    pub fn on_allocation(&self, size: usize) -> KvResult<usize> {
        let threshold = self.inner.threshold.load(Ordering::Relaxed);
        if threshold == UNLIMITED || self.inner.vmm.logical_bytes() <= threshold {
            return Ok(0);
        }
        log::trace!("Allocation of {} bytes crossed the memory ceiling", size);
        self.evict_until_under_threshold()
    }

    /// Evicts from the source holding the globally oldest entry, batch by
    /// batch, until logical bytes are back under the threshold or nothing
    /// is left to evict. Returns the number of keys evicted.
    pub fn evict_until_under_threshold(&self) -> KvResult<usize> {
        let threshold = self.inner.threshold.load(Ordering::Relaxed);
        let policy = self.policy();
        if threshold == UNLIMITED || policy == EvictionPolicy::NoEviction {
            return Ok(0);
        }
        let Some(_running) = self.inner.running.try_lock() else {
            return Ok(0);
        };
        if self.inner.vmm.logical_bytes() <= threshold {
            return Ok(0);
        }
        self.sweep_expired()?;

        let mut total = 0;
        let mut evicted_from: Vec<Arc<dyn EvictionSource>> = Vec::new();
        loop {
            let logical = self.inner.vmm.logical_bytes();
            if logical <= threshold {
                break;
            }
            let Some(source) = self.pick_candidate(policy) else {
                log::debug!(
                    "No eviction candidate left with {} logical bytes over a ceiling of {}",
                    logical,
                    threshold
                );
                break;
            };

            let evicted = source.evict_oldest(logical - threshold)?;
            if evicted == 0 {
                break;
            }
            total += evicted;
            self.inner
                .keys_evicted
                .fetch_add(evicted as u64, Ordering::Relaxed);
            let name = source.source_name();
            if !evicted_from.iter().any(|s| s.source_name() == name) {
                evicted_from.push(source);
            }
        }

        if total > 0 {
            log::debug!(
                "Evicted {} keys, logical bytes now {}",
                total,
                self.inner.vmm.logical_bytes()
            );
        }
        if self.inner.active_defrag.load(Ordering::Relaxed) {
            for source in evicted_from {
                source.compact()?;
            }
        }
        Ok(total)
    }

    /// Purges expired entries from every registered source. Returns the
    /// number of entries dropped.
    pub fn sweep_expired(&self) -> KvResult<usize> {
        let mut total = 0;
        for source in self.live_sources() {
            total += source.purge_expired()?;
        }
        if total > 0 {
            log::debug!("Purged {} expired keys", total);
        }
        self.record_expired(total);
        Ok(total)
    }

    /// Counts entries dropped because their deadline passed.
    pub fn record_expired(&self, count: usize) {
        self.inner
            .keys_expired
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    fn pick_candidate(&self, policy: EvictionPolicy) -> Option<Arc<dyn EvictionSource>> {
        let mut best: Option<(u64, Arc<dyn EvictionSource>)> = None;
        for source in self.live_sources() {
            if !source.eviction_enabled(policy) {
                continue;
            }
            let Some(tick) = source.oldest_tick() else {
                continue;
            };
            if best.as_ref().map_or(true, |(oldest, _)| tick < *oldest) {
                best = Some((tick, source));
            }
        }
        best.map(|(_, source)| source)
    }

    fn live_sources(&self) -> Vec<Arc<dyn EvictionSource>> {
        let mut live = Vec::with_capacity(self.inner.sources.len());
        let mut dead = Vec::new();
        for entry in self.inner.sources.iter() {
            match entry.value().upgrade() {
                Some(source) => live.push(source),
                None => dead.push(entry.key().clone()),
            }
        }
        for name in dead {
            self.inner
                .sources
                .remove_if(&name, |_, source| source.strong_count() == 0);
        }
        live
    }
}
