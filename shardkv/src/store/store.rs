use std::ops::Bound;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, RwLock, RwLockReadGuard};

use crate::common::{
    deadline_after, format_number, now_millis, parse_bool, parse_number, CONFIGURATION_STORE,
    CURSOR_BATCH_SIZE, EVICTION_BATCH_SIZE,
};
use crate::context::EngineContext;
use crate::errors::{ErrorKind, KvError, KvResult};
use crate::eviction::{EvictionPolicy, EvictionSource};
use crate::index::RecencyClock;
use crate::persistence::StoreImage;
use crate::shard::{ShardCursor, ShardRouter, StoreIter};
use crate::stats::Operation;

use super::StoreConfig;

/// A named, sharded key-value map.
///
/// Keys and values are arbitrary byte strings. Every key is routed to one
/// shard by its hash; each shard is locked independently, so writers to
/// different shards never wait for each other. Ordered stores keep their
/// keys in byte order and answer [`Store::min`], [`Store::max`],
/// [`Store::count`] and [`Store::lower_bound`] without scanning; unordered
/// stores give the same answers by scanning.
///
/// Cross-shard answers (`size`, `min`, `max`, `count`, iteration) read each
/// shard in turn and are not a snapshot of the whole store.
///
/// Keys may carry an expiry set with [`Store::expire`]. An expired key reads
/// as absent straight away; it keeps its memory, and still counts towards
/// `size`, `min`, `max` and `count`, until it is purged by
/// [`Store::purge_expired`] or by the next eviction pass.
///
/// `Store` is a cheap handle: clones share the same data. Once the store is
/// removed from its registry, or the registry is closed, every operation
/// fails with [`ErrorKind::StoreClosed`].
///
/// # Examples
///
/// ```rust
/// use shardkv::Registry;
///
/// let registry = Registry::builder().open().unwrap();
/// let store = registry.open("users").unwrap();
///
/// store.put("alice", "1").unwrap();
/// store.put("bob", "2").unwrap();
/// assert_eq!(store.get("alice").unwrap(), Some(b"1".to_vec()));
/// assert_eq!(store.min().unwrap(), Some(b"alice".to_vec()));
/// assert_eq!(store.count("a", "az").unwrap(), 1);
/// ```
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("name", &self.inner.name)
            .finish_non_exhaustive()
    }
}

/// Expiry state of a key, as reported by [`Store::ttl`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
    /// The key is absent or has expired.
    Missing,
    /// The key never expires.
    Persistent,
    /// Time left before the key expires.
    Remaining(Duration),
}

pub(crate) struct StoreInner {
    name: String,
    config: StoreConfig,
    /// Read for ordinary operations, write for save, reload, clear and close.
    router: RwLock<ShardRouter>,
    /// Serializes saves from copy-out to the end of the provider write.
    save_lock: Mutex<()>,
    closed: AtomicBool,
    lru: AtomicBool,
    context: EngineContext,
}

impl Store {
    pub(crate) fn create(name: &str, config: StoreConfig, context: EngineContext) -> Store {
        let router = ShardRouter::new(config.shard_count(), config.ordered(), &context.vmm);
        Store::with_router(name, config, router, context)
    }

    /// Rebuilds a store from a saved image. The image's parameters win.
    pub(crate) fn restore(image: StoreImage, context: EngineContext) -> KvResult<Store> {
        let config = image.meta.config();
        let router = build_router(config, &image, &context)?;
        let store = Store::with_router(&image.meta.name, config, router, context);
        log::info!(
            "Loaded store {} with {} entries",
            store.name(),
            image.entries.len()
        );
        store.inner.context.eviction.on_allocation(0)?;
        Ok(store)
    }

    fn with_router(
        name: &str,
        config: StoreConfig,
        router: ShardRouter,
        context: EngineContext,
    ) -> Store {
        let inner = Arc::new(StoreInner {
            name: name.to_string(),
            config,
            router: RwLock::new(router),
            save_lock: Mutex::new(()),
            closed: AtomicBool::new(false),
            lru: AtomicBool::new(false),
            context,
        });
        let weak = Arc::downgrade(&inner);
        let source: Weak<dyn EvictionSource> = weak;
        inner.context.eviction.register(name, source);
        Store { inner }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn config(&self) -> StoreConfig {
        self.inner.config
    }

    pub fn is_ordered(&self) -> bool {
        self.inner.config.ordered()
    }

    /// Alias of [`Store::is_ordered`].
    pub fn get_ordered(&self) -> bool {
        self.is_ordered()
    }

    pub fn shard_count(&self) -> usize {
        self.inner.config.shard_count()
    }

    /// Alias of [`Store::shard_count`].
    pub fn get_shard_count(&self) -> usize {
        self.shard_count()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Inserts or replaces the value for `key`.
    ///
    /// When a memory ceiling is set, the write may trigger eviction of least
    /// recently used entries, possibly from other stores.
    pub fn put(&self, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> KvResult<()> {
        let (key, value) = (key.as_ref(), value.as_ref());
        self.inner.context.counters.record(Operation::Set);
        {
            let router = self.inner.open_router()?;
            router
                .shard_for(key)
                .put(key, value, &self.inner.context.clock)?;
        }
        self.inner
            .context
            .eviction
            .on_allocation(key.len() + value.len())?;
        Ok(())
    }

    /// Inserts `key` only if it is absent (or expired). Returns whether the
    /// value was written.
    pub fn add(&self, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> KvResult<bool> {
        let (key, value) = (key.as_ref(), value.as_ref());
        self.inner.context.counters.record(Operation::Set);
        let added = {
            let router = self.inner.open_router()?;
            router
                .shard_for(key)
                .add(key, value, &self.inner.context.clock)?
        };
        if added {
            self.inner
                .context
                .eviction
                .on_allocation(key.len() + value.len())?;
        }
        Ok(added)
    }

    /// Writes every pair in order, then runs eviction once for the batch.
    pub fn put_many<K, V>(&self, entries: impl IntoIterator<Item = (K, V)>) -> KvResult<()>
    where
        K: AsRef<[u8]>,
        V: AsRef<[u8]>,
    {
        let mut written = 0;
        {
            let router = self.inner.open_router()?;
            for (key, value) in entries {
                let (key, value) = (key.as_ref(), value.as_ref());
                self.inner.context.counters.record(Operation::Set);
                router
                    .shard_for(key)
                    .put(key, value, &self.inner.context.clock)?;
                written += key.len() + value.len();
            }
        }
        self.inner.context.eviction.on_allocation(written)?;
        Ok(())
    }

    pub fn get(&self, key: impl AsRef<[u8]>) -> KvResult<Option<Vec<u8>>> {
        let key = key.as_ref();
        self.inner.context.counters.record(Operation::Get);
        let router = self.inner.open_router()?;
        Ok(router.shard_for(key).get(key, self.inner.read_clock()))
    }

    /// Values of `keys`, in the same order, `None` for absent keys.
    pub fn get_many<K: AsRef<[u8]>>(
        &self,
        keys: impl IntoIterator<Item = K>,
    ) -> KvResult<Vec<Option<Vec<u8>>>> {
        let router = self.inner.open_router()?;
        let touch = self.inner.read_clock();
        Ok(keys
            .into_iter()
            .map(|key| {
                let key = key.as_ref();
                self.inner.context.counters.record(Operation::Get);
                router.shard_for(key).get(key, touch)
            })
            .collect())
    }

    pub fn contains(&self, key: impl AsRef<[u8]>) -> KvResult<bool> {
        let key = key.as_ref();
        self.inner.context.counters.record(Operation::Get);
        let router = self.inner.open_router()?;
        Ok(router.shard_for(key).contains(key))
    }

    /// Removes `key`, returning whether it was present.
    pub fn remove(&self, key: impl AsRef<[u8]>) -> KvResult<bool> {
        let key = key.as_ref();
        self.inner.context.counters.record(Operation::Delete);
        let router = self.inner.open_router()?;
        Ok(router.shard_for(key).remove(key))
    }

    pub fn size(&self) -> KvResult<usize> {
        self.inner.context.counters.record(Operation::Size);
        let router = self.inner.open_router()?;
        Ok(router.len())
    }

    pub fn is_empty(&self) -> KvResult<bool> {
        Ok(self.size()? == 0)
    }

    /// Smallest key in byte order.
    pub fn min(&self) -> KvResult<Option<Vec<u8>>> {
        self.inner.context.counters.record(Operation::Min);
        let router = self.inner.open_router()?;
        Ok(router.for_all_shards().filter_map(|shard| shard.min()).min())
    }

    /// Largest key in byte order.
    pub fn max(&self) -> KvResult<Option<Vec<u8>>> {
        self.inner.context.counters.record(Operation::Max);
        let router = self.inner.open_router()?;
        Ok(router.for_all_shards().filter_map(|shard| shard.max()).max())
    }

    /// Number of keys `k` with `low <= k <= high`. Zero when `low > high`.
    pub fn count(&self, low: impl AsRef<[u8]>, high: impl AsRef<[u8]>) -> KvResult<usize> {
        let (low, high) = (low.as_ref(), high.as_ref());
        self.inner.context.counters.record(Operation::Range);
        let router = self.inner.open_router()?;
        if low > high {
            return Ok(0);
        }
        Ok(router
            .for_all_shards()
            .map(|shard| shard.count(low, high))
            .sum())
    }

    /// First entry whose key is greater than or equal to `key`.
    pub fn lower_bound(&self, key: impl AsRef<[u8]>) -> KvResult<Option<(Vec<u8>, Vec<u8>)>> {
        let key = key.as_ref();
        self.inner.context.counters.record(Operation::LowerBound);
        let router = self.inner.open_router()?;
        Ok(router
            .for_all_shards()
            .filter_map(|shard| shard.lower_bound(key))
            .min_by(|a, b| a.0.cmp(&b.0)))
    }

    /// Every entry in ascending key order.
    pub fn iter(&self) -> KvResult<StoreIter> {
        self.inner.context.counters.record(Operation::Range);
        self.inner.cursor(Bound::Unbounded, Bound::Unbounded)
    }

    /// Entries with `low <= key <= high` in ascending key order.
    pub fn range(&self, low: impl AsRef<[u8]>, high: impl AsRef<[u8]>) -> KvResult<StoreIter> {
        let (low, high) = (low.as_ref(), high.as_ref());
        self.inner.context.counters.record(Operation::Range);
        if low > high {
            self.inner.check_opened()?;
            return Ok(StoreIter::empty());
        }
        self.inner.cursor(
            Bound::Included(low.to_vec()),
            Bound::Included(high.to_vec()),
        )
    }

    /// Removes every entry and returns the store's pages to the VMM.
    pub fn clear(&self) -> KvResult<()> {
        let router = self.inner.router.write();
        self.inner.check_opened()?;
        for shard in router.for_all_shards() {
            shard.clear();
        }
        log::info!("Cleared store {}", self.inner.name);
        Ok(())
    }

    /// Makes `key` expire `ttl` from now; a zero `ttl` expires it at once.
    /// Returns whether the key was found.
    pub fn expire(&self, key: impl AsRef<[u8]>, ttl: Duration) -> KvResult<bool> {
        let key = key.as_ref();
        self.inner.context.counters.record(Operation::Set);
        let deadline = deadline_after(now_millis(), ttl);
        let router = self.inner.open_router()?;
        Ok(router.shard_for(key).expire(key, deadline))
    }

    /// How long `key` has left before it expires.
    pub fn ttl(&self, key: impl AsRef<[u8]>) -> KvResult<Ttl> {
        let key = key.as_ref();
        self.inner.context.counters.record(Operation::Get);
        let router = self.inner.open_router()?;
        Ok(match router.shard_for(key).deadline(key) {
            None => Ttl::Missing,
            Some(None) => Ttl::Persistent,
            Some(Some(deadline)) => {
                Ttl::Remaining(Duration::from_millis(deadline.saturating_sub(now_millis())))
            }
        })
    }

    /// Drops every expired entry now. Returns how many were dropped.
    pub fn purge_expired(&self) -> KvResult<usize> {
        let router = self.inner.open_router()?;
        let purged = purge_shards(&router);
        self.inner.context.eviction.record_expired(purged);
        Ok(purged)
    }

    /// Adds `by` to the decimal number stored at `key` and returns the
    /// result. An absent key counts as 0; an expiring key keeps its expiry.
    pub fn incr(&self, key: impl AsRef<[u8]>, by: f64) -> KvResult<f64> {
        let key = key.as_ref();
        self.inner.context.counters.record(Operation::Incr);
        let mut result = 0.0;
        let stored = {
            let router = self.inner.open_router()?;
            router.shard_for(key).update(key, &self.inner.context.clock, |current| {
                let base = match current {
                    Some(bytes) => parse_number(bytes)?,
                    None => 0.0,
                };
                result = base + by;
                Ok(format_number(result).into_bytes())
            })?
        };
        self.inner
            .context
            .eviction
            .on_allocation(key.len() + stored.len())?;
        Ok(result)
    }

    pub fn decr(&self, key: impl AsRef<[u8]>, by: f64) -> KvResult<f64> {
        self.incr(key, -by)
    }

    /// Switches LRU tracking for this store on (`"ON"`) or off (`"OFF"`).
    ///
    /// With the `store-lru` policy only stores with LRU on are evicted from;
    /// their reads also refresh recency.
    pub fn set_lru(&self, flag: &str) -> KvResult<()> {
        self.inner.check_opened()?;
        let enabled = parse_bool(flag).map_err(|_| {
            log::error!("Invalid LRU flag '{}' for store {}", flag, self.inner.name);
            KvError::new(
                &format!("Invalid LRU flag '{}', expected ON or OFF", flag),
                ErrorKind::InvalidConfiguration,
            )
        })?;
        self.inner.lru.store(enabled, Ordering::Release);
        log::debug!("LRU for store {} set to {}", self.inner.name, enabled);
        if enabled {
            self.inner.context.eviction.on_allocation(0)?;
        }
        Ok(())
    }

    pub fn lru_enabled(&self) -> bool {
        self.inner.lru.load(Ordering::Acquire)
    }

    /// Writes an image of the store through the registry's snapshot provider.
    ///
    /// Writers are held off only while entries are copied out. Concurrent
    /// saves of one store run one after the other, so the last image
    /// written is the last one taken. Expired entries are left out.
    pub fn save(&self) -> KvResult<()> {
        let _saving = self.inner.save_lock.lock();
        let image = {
            let router = self.inner.router.write();
            self.inner.check_opened()?;
            let (entries, deadlines) = export_entries(&router);
            StoreImage::new(&self.inner.name, self.inner.config, entries).with_deadlines(deadlines)
        };

        self.inner
            .context
            .snapshots
            .write_image(&image)
            .map_err(|err| {
                log::error!("Failed to save store {}: {}", self.inner.name, err);
                persistence_failure(&format!("Failed to save store {}", self.inner.name), err)
            })?;
        log::info!(
            "Saved store {} with {} entries",
            self.inner.name,
            image.len()
        );
        Ok(())
    }

    /// Replaces the store's contents with its last saved image.
    ///
    /// The image is read and validated before anything changes; on failure
    /// the store keeps its current contents.
    pub fn reload(&self) -> KvResult<()> {
        self.inner.check_opened()?;
        let name = &self.inner.name;
        let image = match self.inner.context.snapshots.read_image(name)? {
            Some(image) => image,
            None => {
                log::error!("No saved image for store {}", name);
                return Err(KvError::new(
                    &format!("No saved image for store {}", name),
                    ErrorKind::ImageNotFound,
                ));
            }
        };
        if image.meta.config() != self.inner.config {
            log::error!(
                "Image of store {} was saved with {:?}, store uses {:?}",
                name,
                image.meta.config(),
                self.inner.config
            );
            return Err(KvError::new(
                &format!(
                    "Image of store {} was saved with different parameters",
                    name
                ),
                ErrorKind::ConfigurationConflict,
            ));
        }

        let fresh = build_router(self.inner.config, &image, &self.inner.context)?;
        let stale = {
            let mut router = self.inner.router.write();
            self.inner.check_opened()?;
            std::mem::replace(&mut *router, fresh)
        };
        drop(stale);
        log::info!("Reloaded store {} with {} entries", name, image.len());
        self.inner.context.eviction.on_allocation(0)?;
        Ok(())
    }

    /// Compacts sparsely used pages of every shard. Returns the number of
    /// pages released.
    pub fn defragment(&self) -> KvResult<usize> {
        let router = self.inner.open_router()?;
        self.inner.defragment_shards(&router)
    }

    /// Point read that neither counts as an operation nor refreshes recency.
    pub(crate) fn peek(&self, key: &[u8]) -> KvResult<Option<Vec<u8>>> {
        let router = self.inner.open_router()?;
        Ok(router.shard_for(key).get(key, None))
    }

    /// Every entry in key order, copied out shard by shard.
    pub(crate) fn entries(&self) -> KvResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let router = self.inner.open_router()?;
        Ok(collect_entries(&router))
    }

    /// Drops all data and detaches the store from eviction. Later calls on
    /// any handle fail with `StoreClosed`.
    pub(crate) fn close(&self) {
        let router = self.inner.router.write();
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        for shard in router.for_all_shards() {
            shard.clear();
        }
        let weak = Arc::downgrade(&self.inner);
        let source: Weak<dyn EvictionSource> = weak;
        self.inner.context.eviction.unregister(&self.inner.name, &source);
        log::debug!("Closed store {}", self.inner.name);
    }
}

impl StoreInner {
    fn check_opened(&self) -> KvResult<()> {
        if self.closed.load(Ordering::Acquire) {
            log::error!("Store {} is closed", self.name);
            return Err(KvError::new(
                &format!("Store {} is closed", self.name),
                ErrorKind::StoreClosed,
            ));
        }
        Ok(())
    }

    fn open_router(&self) -> KvResult<RwLockReadGuard<'_, ShardRouter>> {
        let router = self.router.read();
        self.check_opened()?;
        Ok(router)
    }

    fn tracks_reads(&self) -> bool {
        self.lru.load(Ordering::Acquire) || self.context.tracks_all_reads()
    }

    /// The clock a read stamps recency with, when reads are tracked.
    fn read_clock(&self) -> Option<&RecencyClock> {
        self.tracks_reads().then(|| self.context.clock.as_ref())
    }

    fn cursor(&self, lower: Bound<Vec<u8>>, upper: Bound<Vec<u8>>) -> KvResult<StoreIter> {
        let router = self.open_router()?;
        // hashed shards sort on every fetch, so one batch is cheaper than many
        let batch_size = if self.config.ordered() {
            CURSOR_BATCH_SIZE
        } else {
            usize::MAX
        };
        let cursors = router
            .for_all_shards()
            .map(|shard| ShardCursor::new(shard.clone(), lower.clone(), upper.clone(), batch_size))
            .collect();
        Ok(StoreIter::merge(cursors))
    }

    fn defragment_shards(&self, router: &ShardRouter) -> KvResult<usize> {
        let (min_ratio, max_pages) = self.context.defrag_params();
        let mut released = 0;
        for shard in router.for_all_shards() {
            released += shard.defragment(min_ratio, max_pages)?;
        }
        if released > 0 {
            log::debug!("Defragmented store {}: {} pages released", self.name, released);
        }
        Ok(released)
    }
}

impl EvictionSource for StoreInner {
    fn source_name(&self) -> String {
        self.name.clone()
    }

    fn eviction_enabled(&self, policy: EvictionPolicy) -> bool {
        if self.name == CONFIGURATION_STORE || self.closed.load(Ordering::Acquire) {
            return false;
        }
        match policy {
            EvictionPolicy::NoEviction => false,
            EvictionPolicy::StoreLru => self.lru.load(Ordering::Acquire),
            EvictionPolicy::AllKeysLru => true,
        }
    }

    fn oldest_tick(&self) -> Option<u64> {
        let router = self.router.try_read()?;
        router
            .for_all_shards()
            .filter_map(|shard| shard.oldest_tick())
            .min()
    }

    fn evict_oldest(&self, budget: u64) -> KvResult<usize> {
        // a store under maintenance sits this round out
        let Some(router) = self.router.try_read() else {
            return Ok(0);
        };
        let oldest = router
            .for_all_shards()
            .filter_map(|shard| shard.oldest_tick().map(|tick| (tick, shard)))
            .min_by_key(|(tick, _)| *tick);
        match oldest {
            Some((_, shard)) => {
                let (evicted, released) = shard.evict_oldest(budget, EVICTION_BATCH_SIZE);
                log::debug!(
                    "Evicted {} entries ({} bytes) from shard {} of store {}",
                    evicted,
                    released,
                    shard.number(),
                    self.name
                );
                Ok(evicted)
            }
            None => Ok(0),
        }
    }

    fn compact(&self) -> KvResult<usize> {
        let Some(router) = self.router.try_read() else {
            return Ok(0);
        };
        self.defragment_shards(&router)
    }

    fn purge_expired(&self) -> KvResult<usize> {
        if self.closed.load(Ordering::Acquire) {
            return Ok(0);
        }
        let Some(router) = self.router.try_read() else {
            return Ok(0);
        };
        Ok(purge_shards(&router))
    }
}

fn build_router(
    config: StoreConfig,
    image: &StoreImage,
    context: &EngineContext,
) -> KvResult<ShardRouter> {
    let router = ShardRouter::new(config.shard_count(), config.ordered(), &context.vmm);
    for (key, value) in &image.entries {
        router.shard_for(key).put(key, value, &context.clock)?;
    }
    for (key, deadline) in &image.deadlines {
        router.shard_for(key).expire(key, *deadline);
    }
    Ok(router)
}

fn collect_entries(router: &ShardRouter) -> Vec<(Vec<u8>, Vec<u8>)> {
    let mut entries = Vec::with_capacity(router.len());
    for shard in router.for_all_shards() {
        entries.extend(shard.entries());
    }
    if router.shard_count() > 1 {
        entries.sort_unstable_by(|a, b| a.0.cmp(&b.0));
    }
    entries
}

/// Live entries in key order, and the deadlines of those that expire.
fn export_entries(router: &ShardRouter) -> (Vec<(Vec<u8>, Vec<u8>)>, Vec<(Vec<u8>, u64)>) {
    let mut exported = Vec::with_capacity(router.len());
    for shard in router.for_all_shards() {
        exported.extend(shard.export());
    }
    if router.shard_count() > 1 {
        exported.sort_unstable_by(|a, b| a.0.cmp(&b.0));
    }

    let mut deadlines = Vec::new();
    let entries = exported
        .into_iter()
        .map(|(key, value, expires_at)| {
            if let Some(deadline) = expires_at {
                deadlines.push((key.clone(), deadline));
            }
            (key, value)
        })
        .collect();
    (entries, deadlines)
}

fn purge_shards(router: &ShardRouter) -> usize {
    router
        .for_all_shards()
        .map(|shard| shard.purge_expired())
        .sum()
}

fn persistence_failure(message: &str, err: KvError) -> KvError {
    match err.kind() {
        ErrorKind::PersistenceFailure => err,
        _ => KvError::new_with_cause(message, ErrorKind::PersistenceFailure, err),
    }
}
