use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::common::{
    parse_bool, CONFIGURATION_STORE, MAX_STORE_NAME_LEN, ORDERED_SUFFIX, SHARDS_SUFFIX,
};
use crate::context::EngineContext;
use crate::errors::{ErrorKind, KvError, KvResult};
use crate::stats::Stats;
use crate::store::{Store, StoreConfig};

use super::{GlobalConfig, RegistryBuilder};

/// Process-wide collection of named stores sharing one VMM, one eviction
/// controller and one snapshot provider.
///
/// Stores are created on first [`Registry::open`] and stay resident until
/// removed or until the registry is closed. A store named `configuration`
/// always exists; it records per-store parameters (`<store>.ordered`,
/// `<store>.shards`) and the tunables set through
/// [`Registry::set_global_config`].
///
/// The registry is closed when the last clone is dropped, or explicitly with
/// [`Registry::close`].
///
/// # Examples
///
/// ```rust
/// use shardkv::Registry;
///
/// let registry = Registry::builder().max_memory_bytes(64 * 1024 * 1024).open().unwrap();
/// registry.set_global_config("events.shards", "8").unwrap();
///
/// let events = registry.open("events").unwrap();
/// assert_eq!(events.shard_count(), 8);
///
/// events.put("e1", "login").unwrap();
/// registry.save("events").unwrap();
/// events.put("e2", "logout").unwrap();
/// registry.reload("events").unwrap();
/// assert_eq!(events.size().unwrap(), 1);
/// ```
#[derive(Clone)]
pub struct Registry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    context: EngineContext,
    configuration: Store,
    /// Held while a store is looked up, created or loaded from its image.
    stores: Mutex<HashMap<String, Store>>,
    closed: AtomicBool,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Loads the configuration store and re-applies recorded tunables,
    /// except those in `pinned`.
    pub(crate) fn open_with_context(context: EngineContext, pinned: &[&str]) -> KvResult<Registry> {
        let configuration = match context.snapshots.read_image(CONFIGURATION_STORE)? {
            Some(image) => Store::restore(image, context.clone())?,
            None => Store::create(CONFIGURATION_STORE, StoreConfig::default(), context.clone()),
        };
        replay_tunables(&context, &configuration, pinned)?;

        log::info!(
            "Registry opened with memory ceiling {:?} and policy {}",
            context.eviction.threshold(),
            context.eviction.policy()
        );
        Ok(Registry {
            inner: Arc::new(RegistryInner {
                context,
                configuration,
                stores: Mutex::new(HashMap::new()),
                closed: AtomicBool::new(false),
            }),
        })
    }

    /// Returns the store named `name`, creating it if needed.
    ///
    /// A store that is not resident but has a saved image is loaded from
    /// it. Otherwise it is created with the parameters recorded in the
    /// configuration store, falling back to an ordered single-shard store.
    pub fn open(&self, name: &str) -> KvResult<Store> {
        self.inner.open(name, None)
    }

    /// Like [`Registry::open`], but fails with `ConfigurationConflict` if the
    /// store exists, was saved or was declared with different parameters.
    pub fn open_with(&self, name: &str, config: StoreConfig) -> KvResult<Store> {
        self.inner.open(name, Some(config))
    }

    /// Whether `name` is resident or has a saved image.
    pub fn contains(&self, name: &str) -> KvResult<bool> {
        self.inner.check_opened()?;
        if name == CONFIGURATION_STORE || self.inner.stores.lock().contains_key(name) {
            return Ok(true);
        }
        self.inner.context.snapshots.has_image(name)
    }

    /// Names of the resident data stores, sorted.
    pub fn store_names(&self) -> KvResult<Vec<String>> {
        self.inner.check_opened()?;
        let mut names: Vec<String> = self.inner.stores.lock().keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    /// Drops a store and its saved image. Handles to it fail afterwards.
    pub fn remove(&self, name: &str) -> KvResult<()> {
        self.inner.check_opened()?;
        if name == CONFIGURATION_STORE {
            log::error!("The configuration store cannot be removed");
            return Err(KvError::new(
                "The configuration store cannot be removed",
                ErrorKind::InvalidOperation,
            ));
        }
        let removed = self.inner.stores.lock().remove(name);
        if let Some(store) = removed {
            store.close();
        }
        self.inner.context.snapshots.remove_image(name)?;
        log::info!("Removed store {}", name);
        Ok(())
    }

    pub fn configuration(&self) -> KvResult<Store> {
        self.inner.check_opened()?;
        Ok(self.inner.configuration.clone())
    }

    /// Clears a store that is resident, saved or declared. Unknown names
    /// fail with `StoreNotFound` rather than creating a store.
    pub fn clear(&self, name: &str) -> KvResult<()> {
        self.inner.existing(name)?.clear()
    }

    /// Clears every resident data store. The configuration store is left
    /// alone.
    pub fn clear_all(&self) -> KvResult<()> {
        for store in self.inner.resident_stores()? {
            store.clear()?;
        }
        Ok(())
    }

    /// Saves a store that is resident, saved or declared.
    pub fn save(&self, name: &str) -> KvResult<()> {
        self.inner.existing(name)?.save()
    }

    /// Saves every resident store, the configuration store included. Every
    /// store is attempted; the first failure is returned.
    pub fn save_all(&self) -> KvResult<()> {
        let mut stores = self.inner.resident_stores()?;
        stores.push(self.inner.configuration.clone());

        let mut first_error = None;
        for store in stores {
            if let Err(err) = store.save() {
                if first_error.is_none() {
                    first_error = Some(err);
                }
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Reloads a store from its image. A store that is neither resident,
    /// saved nor declared fails with `StoreNotFound`.
    pub fn reload(&self, name: &str) -> KvResult<()> {
        self.inner.existing(name)?.reload()
    }

    /// Drops expired entries from every resident store. Returns how many.
    pub fn purge_expired_all(&self) -> KvResult<usize> {
        let mut stores = self.inner.resident_stores()?;
        stores.push(self.inner.configuration.clone());
        let mut purged = 0;
        for store in stores {
            purged += store.purge_expired()?;
        }
        Ok(purged)
    }

    /// Defragments every resident store. Returns the number of pages
    /// released.
    pub fn defragment_all(&self) -> KvResult<usize> {
        let mut stores = self.inner.resident_stores()?;
        stores.push(self.inner.configuration.clone());
        let mut released = 0;
        for store in stores {
            released += store.defragment()?;
        }
        Ok(released)
    }

    /// Sets a tunable or a store parameter and records it in the
    /// configuration store.
    ///
    /// Tunables take effect immediately. Store parameters are read when the
    /// named store is next created.
    pub fn set_global_config(&self, key: &str, value: &str) -> KvResult<()> {
        self.inner.check_opened()?;
        if GlobalConfig::is_tunable(key) {
            self.inner.context.apply_setting(key, value)?;
            log::info!("Set {} to {}", key, value);
        } else {
            GlobalConfig::validate_store_parameter(key, value)?;
        }
        self.inner.configuration.put(key, value.trim())
    }

    pub fn global_config(&self) -> KvResult<GlobalConfig> {
        self.inner.check_opened()?;
        Ok(self.inner.context.global_config())
    }

    pub fn stats(&self) -> KvResult<Stats> {
        self.inner.check_opened()?;
        Ok(self.inner.context.stats_collector().snapshot())
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Closes every store and releases pooled pages. Unsaved data is lost.
    pub fn close(&self) -> KvResult<()> {
        self.inner.close();
        Ok(())
    }
}

impl RegistryInner {
    fn check_opened(&self) -> KvResult<()> {
        if self.closed.load(Ordering::Acquire) {
            log::error!("Registry is closed");
            return Err(KvError::new("Registry is closed", ErrorKind::RegistryClosed));
        }
        Ok(())
    }

    fn resident_stores(&self) -> KvResult<Vec<Store>> {
        self.check_opened()?;
        Ok(self.stores.lock().values().cloned().collect())
    }

    fn open(&self, name: &str, requested: Option<StoreConfig>) -> KvResult<Store> {
        self.check_opened()?;
        validate_name(name)?;
        if name == CONFIGURATION_STORE {
            let store = self.configuration.clone();
            check_conflict(name, requested, store.config())?;
            return Ok(store);
        }

        let mut stores = self.stores.lock();
        if let Some(store) = stores.get(name) {
            check_conflict(name, requested, store.config())?;
            return Ok(store.clone());
        }

        let declared = self.declared_parameters(name)?;
        let store = match self.context.snapshots.read_image(name)? {
            Some(image) => {
                let saved = image.meta.config();
                declared.check(name, saved)?;
                check_conflict(name, requested, saved)?;
                Store::restore(image, self.context.clone())?
            }
            None => {
                let config = match requested {
                    Some(config) => {
                        declared.check(name, config)?;
                        config
                    }
                    None => declared.resolve()?,
                };
                let store = Store::create(name, config, self.context.clone());
                log::info!(
                    "Created store {} (ordered: {}, shards: {})",
                    name,
                    config.ordered(),
                    config.shard_count()
                );
                store
            }
        };
        stores.insert(name.to_string(), store.clone());
        Ok(store)
    }

    /// Opens `name` only if it is already known to the registry.
    fn existing(&self, name: &str) -> KvResult<Store> {
        self.check_opened()?;
        validate_name(name)?;
        let known = name == CONFIGURATION_STORE
            || self.stores.lock().contains_key(name)
            || self.context.snapshots.has_image(name)?
            || self.declared_parameters(name)?.is_declared();
        if !known {
            log::error!("Store {} does not exist", name);
            return Err(KvError::new(
                &format!("Store {} does not exist", name),
                ErrorKind::StoreNotFound,
            ));
        }
        self.open(name, None)
    }

    /// Parameters recorded for `name` in the configuration store.
    fn declared_parameters(&self, name: &str) -> KvResult<Declared> {
        let ordered = match self.configuration.peek(format!("{name}{ORDERED_SUFFIX}").as_bytes())? {
            Some(value) => match parse_bool(&String::from_utf8_lossy(&value)) {
                Ok(flag) => Some(flag),
                Err(_) => {
                    log::warn!("Ignoring unparsable ordering recorded for store {}", name);
                    None
                }
            },
            None => None,
        };
        let shards = match self.configuration.peek(format!("{name}{SHARDS_SUFFIX}").as_bytes())? {
            Some(value) => match String::from_utf8_lossy(&value).trim().parse::<usize>() {
                Ok(count) => Some(count),
                Err(_) => {
                    log::warn!("Ignoring unparsable shard count recorded for store {}", name);
                    None
                }
            },
            None => None,
        };
        Ok(Declared { ordered, shards })
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let stores: Vec<Store> = self.stores.lock().drain().map(|(_, store)| store).collect();
        for store in &stores {
            store.close();
        }
        self.configuration.close();
        self.context.eviction.clear_sources();
        let released = self.context.vmm.release_pooled();
        log::info!(
            "Registry closed: {} stores dropped, {} pooled pages released",
            stores.len(),
            released
        );
    }
}

impl Drop for RegistryInner {
    fn drop(&mut self) {
        self.close();
    }
}

/// Store parameters found in the configuration store.
struct Declared {
    ordered: Option<bool>,
    shards: Option<usize>,
}

impl Declared {
    fn is_declared(&self) -> bool {
        self.ordered.is_some() || self.shards.is_some()
    }

    fn resolve(&self) -> KvResult<StoreConfig> {
        let defaults = StoreConfig::default();
        StoreConfig::new(
            self.ordered.unwrap_or(defaults.ordered()),
            self.shards.unwrap_or(defaults.shard_count()),
        )
    }

    fn check(&self, name: &str, actual: StoreConfig) -> KvResult<()> {
        let ordered_differs = self.ordered.is_some_and(|ordered| ordered != actual.ordered());
        let shards_differ = self.shards.is_some_and(|shards| shards != actual.shard_count());
        if ordered_differs || shards_differ {
            log::error!(
                "Store {} is declared with different parameters than {:?}",
                name,
                actual
            );
            return Err(KvError::new(
                &format!(
                    "Store {} is declared with different parameters than {:?}",
                    name, actual
                ),
                ErrorKind::ConfigurationConflict,
            ));
        }
        Ok(())
    }
}

fn check_conflict(name: &str, requested: Option<StoreConfig>, actual: StoreConfig) -> KvResult<()> {
    match requested {
        Some(config) if config != actual => {
            log::error!(
                "Store {} exists with {:?}, requested {:?}",
                name,
                actual,
                config
            );
            Err(KvError::new(
                &format!("Store {} exists with {:?}, requested {:?}", name, actual, config),
                ErrorKind::ConfigurationConflict,
            ))
        }
        _ => Ok(()),
    }
}

fn validate_name(name: &str) -> KvResult<()> {
    if name.is_empty() || name.len() > MAX_STORE_NAME_LEN {
        log::error!("Invalid store name '{}'", name);
        return Err(KvError::new(
            &format!(
                "Store name must be 1 to {} bytes long",
                MAX_STORE_NAME_LEN
            ),
            ErrorKind::InvalidOperation,
        ));
    }
    Ok(())
}

fn replay_tunables(context: &EngineContext, configuration: &Store, pinned: &[&str]) -> KvResult<()> {
    for (key, value) in configuration.entries()? {
        let key = String::from_utf8_lossy(&key).into_owned();
        if key.contains('.') || pinned.contains(&key.as_str()) {
            continue;
        }
        let value = String::from_utf8_lossy(&value);
        if let Err(err) = context.apply_setting(&key, &value) {
            log::warn!("Ignoring recorded setting {}={}: {}", key, value, err.message());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eviction::EvictionPolicy;
    use crate::persistence::InMemorySnapshotProvider;

    #[ctor::ctor]
    fn init() {
        colog::init();
    }

    fn registry() -> Registry {
        Registry::builder().open().unwrap()
    }

    #[test]
    fn test_open_returns_same_store() {
        let registry = registry();
        let first = registry.open("users").unwrap();
        first.put("alice", "1").unwrap();

        let second = registry.open("users").unwrap();
        assert_eq!(second.get("alice").unwrap(), Some(b"1".to_vec()));
        assert_eq!(registry.store_names().unwrap(), vec!["users".to_string()]);
        assert!(registry.contains("users").unwrap());
        assert!(!registry.contains("nobody").unwrap());
    }

    #[test]
    fn test_default_store_parameters() {
        let registry = registry();
        let store = registry.open("plain").unwrap();
        assert!(store.is_ordered());
        assert_eq!(store.shard_count(), 1);
    }

    #[test]
    fn test_declared_parameters_apply_at_creation() {
        let registry = registry();
        registry.set_global_config("events.ordered", "false").unwrap();
        registry.set_global_config("events.shards", "4").unwrap();

        let events = registry.open("events").unwrap();
        assert!(!events.get_ordered());
        assert_eq!(events.get_shard_count(), 4);

        // later changes do not touch the resident store
        registry.set_global_config("events.shards", "2").unwrap();
        assert_eq!(registry.open("events").unwrap().shard_count(), 4);
    }

    #[test]
    fn test_open_with_conflicts() {
        let registry = registry();
        registry
            .open_with("a", StoreConfig::new(true, 4).unwrap())
            .unwrap();
        let err = registry
            .open_with("a", StoreConfig::new(true, 2).unwrap())
            .err()
            .unwrap();
        assert_eq!(err.kind(), &ErrorKind::ConfigurationConflict);

        registry.set_global_config("b.shards", "8").unwrap();
        let err = registry
            .open_with("b", StoreConfig::new(true, 2).unwrap())
            .err()
            .unwrap();
        assert_eq!(err.kind(), &ErrorKind::ConfigurationConflict);
        assert!(!registry.store_names().unwrap().contains(&"b".to_string()));
    }

    #[test]
    fn test_saved_image_wins_and_conflicts_are_reported() {
        let provider = InMemorySnapshotProvider::new();
        let first = Registry::builder()
            .snapshot_provider(provider.clone())
            .open()
            .unwrap();
        let store = first.open_with("data", StoreConfig::new(false, 3).unwrap()).unwrap();
        store.put("k", "v").unwrap();
        first.save_all().unwrap();
        first.close().unwrap();

        let second = Registry::builder()
            .snapshot_provider(provider.clone())
            .open()
            .unwrap();
        let store = second.open("data").unwrap();
        assert!(!store.is_ordered());
        assert_eq!(store.shard_count(), 3);
        assert_eq!(store.get("k").unwrap(), Some(b"v".to_vec()));
        second.close().unwrap();

        let third = Registry::builder()
            .snapshot_provider(provider)
            .open()
            .unwrap();
        third.set_global_config("data.shards", "5").unwrap();
        let err = third.open("data").err().unwrap();
        assert_eq!(err.kind(), &ErrorKind::ConfigurationConflict);
    }

    #[test]
    fn test_tunables_are_recorded_and_replayed() {
        let provider = InMemorySnapshotProvider::new();
        let first = Registry::builder()
            .snapshot_provider(provider.clone())
            .open()
            .unwrap();
        first.set_global_config("max_memory_bytes", "2m").unwrap();
        first.set_global_config("eviction_policy", "allkeys-lru").unwrap();
        assert_eq!(
            first.configuration().unwrap().get("max_memory_bytes").unwrap(),
            Some(b"2m".to_vec())
        );
        first.save("configuration").unwrap();
        first.close().unwrap();

        let second = Registry::builder()
            .snapshot_provider(provider.clone())
            .open()
            .unwrap();
        let config = second.global_config().unwrap();
        assert_eq!(config.max_memory_bytes(), 2 * 1024 * 1024);
        assert_eq!(config.eviction_policy(), EvictionPolicy::AllKeysLru);
        second.close().unwrap();

        // explicit builder settings take precedence over recorded ones
        let third = Registry::builder()
            .snapshot_provider(provider)
            .max_memory_bytes(4096)
            .open()
            .unwrap();
        let config = third.global_config().unwrap();
        assert_eq!(config.max_memory_bytes(), 4096);
        assert_eq!(config.eviction_policy(), EvictionPolicy::AllKeysLru);
    }

    #[test]
    fn test_invalid_settings() {
        let registry = registry();
        for (key, value) in [
            ("max_memory_bytes", "much"),
            ("eviction_policy", "fifo"),
            ("users.shards", "0"),
            ("nonsense", "1"),
        ] {
            let err = registry.set_global_config(key, value).unwrap_err();
            assert_eq!(err.kind(), &ErrorKind::InvalidConfiguration);
        }
        assert_eq!(registry.configuration().unwrap().size().unwrap(), 0);
    }

    #[test]
    fn test_clear_and_clear_all() {
        let registry = registry();
        registry.set_global_config("a.shards", "2").unwrap();
        let a = registry.open("a").unwrap();
        let b = registry.open("b").unwrap();
        a.put("1", "1").unwrap();
        b.put("1", "1").unwrap();

        registry.clear("a").unwrap();
        assert_eq!(a.size().unwrap(), 0);
        assert_eq!(a.shard_count(), 2);
        assert_eq!(b.size().unwrap(), 1);

        a.put("2", "2").unwrap();
        registry.clear_all().unwrap();
        assert_eq!(a.size().unwrap(), 0);
        assert_eq!(b.size().unwrap(), 0);
        assert_eq!(registry.configuration().unwrap().size().unwrap(), 1);
    }

    #[test]
    fn test_reload_through_registry() {
        let registry = registry();
        let store = registry.open("r").unwrap();
        store.put("a", "1").unwrap();
        registry.save("r").unwrap();
        store.put("b", "2").unwrap();
        registry.reload("r").unwrap();
        assert_eq!(store.size().unwrap(), 1);

        let err = registry.reload("fresh").unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::StoreNotFound);

        // a declared store exists even before its first open
        registry.set_global_config("declared.shards", "2").unwrap();
        let err = registry.reload("declared").unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::ImageNotFound);
        assert_eq!(registry.open("declared").unwrap().shard_count(), 2);
    }

    #[test]
    fn test_unknown_names_are_not_created() {
        let registry = registry();
        for result in [
            registry.clear("ghost"),
            registry.save("ghost"),
            registry.reload("ghost"),
        ] {
            assert_eq!(result.unwrap_err().kind(), &ErrorKind::StoreNotFound);
        }
        assert!(registry.store_names().unwrap().is_empty());
        assert!(!registry.contains("ghost").unwrap());

        // a saved but not resident store is loaded, not rejected
        let store = registry.open("kept").unwrap();
        store.put("k", "v").unwrap();
        store.save().unwrap();
        registry.remove("kept").unwrap();
        assert_eq!(
            registry.clear("kept").unwrap_err().kind(),
            &ErrorKind::StoreNotFound
        );
        registry.open("kept").unwrap().put("k", "v").unwrap();
        registry.save("kept").unwrap();
        registry.inner.stores.lock().clear();
        registry.clear("kept").unwrap();
        assert_eq!(registry.store_names().unwrap(), vec!["kept".to_string()]);
    }

    #[test]
    fn test_purge_expired_all() {
        let registry = registry();
        let a = registry.open("a").unwrap();
        let b = registry.open("b").unwrap();
        a.put("x", "1").unwrap();
        b.put("y", "2").unwrap();
        b.put("z", "3").unwrap();
        a.expire("x", std::time::Duration::ZERO).unwrap();
        b.expire("y", std::time::Duration::ZERO).unwrap();

        assert_eq!(registry.purge_expired_all().unwrap(), 2);
        assert_eq!(a.size().unwrap(), 0);
        assert_eq!(b.size().unwrap(), 1);
        assert_eq!(registry.stats().unwrap().keys_expired, 2);
    }

    #[test]
    fn test_remove_store() {
        let registry = registry();
        let store = registry.open("gone").unwrap();
        store.put("a", "1").unwrap();
        store.save().unwrap();

        registry.remove("gone").unwrap();
        assert!(!registry.contains("gone").unwrap());
        assert_eq!(store.get("a").unwrap_err().kind(), &ErrorKind::StoreClosed);

        let reopened = registry.open("gone").unwrap();
        assert_eq!(reopened.size().unwrap(), 0);

        let err = registry.remove("configuration").unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::InvalidOperation);
    }

    #[test]
    fn test_invalid_store_names() {
        let registry = registry();
        assert_eq!(
            registry.open("").err().unwrap().kind(),
            &ErrorKind::InvalidOperation
        );
        let long = "x".repeat(MAX_STORE_NAME_LEN + 1);
        assert!(registry.open(&long).is_err());
    }

    #[test]
    fn test_allkeys_eviction_spans_stores() {
        let registry = Registry::builder()
            .max_memory_bytes(128 * 1024)
            .eviction_policy(EvictionPolicy::AllKeysLru)
            .open()
            .unwrap();
        let old = registry.open("old").unwrap();
        let new = registry.open("new").unwrap();
        for i in 0..1000 {
            old.put(format!("k{i:04}"), vec![0u8; 100]).unwrap();
        }
        for i in 0..1000 {
            new.put(format!("k{i:04}"), vec![0u8; 100]).unwrap();
        }

        let stats = registry.stats().unwrap();
        assert!(stats.logical_allocated <= 128 * 1024);
        assert!(stats.keys_evicted > 0);
        assert!(old.size().unwrap() < new.size().unwrap());
        assert!(new.get("k0999").unwrap().is_some());
    }

    #[test]
    fn test_configuration_store_is_never_evicted() {
        let registry = Registry::builder()
            .eviction_policy(EvictionPolicy::AllKeysLru)
            .open()
            .unwrap();
        registry.set_global_config("x.shards", "2").unwrap();
        registry.set_global_config("max_memory_bytes", "64k").unwrap();
        let data = registry.open("data").unwrap();
        for i in 0..5000 {
            data.put(format!("k{i}"), vec![0u8; 64]).unwrap();
        }
        let configuration = registry.configuration().unwrap();
        assert_eq!(configuration.size().unwrap(), 2);
        assert_eq!(configuration.get("x.shards").unwrap(), Some(b"2".to_vec()));
    }

    #[test]
    fn test_stats_snapshot() {
        let registry = registry();
        let store = registry.open("s").unwrap();
        store.put("a", vec![0u8; 1000]).unwrap();
        store.get("a").unwrap();
        store.remove("a").unwrap();

        let stats = registry.stats().unwrap();
        assert_eq!(stats.set_ops, 1);
        assert_eq!(stats.get_ops, 1);
        assert_eq!(stats.delete_ops, 1);
        assert_eq!(stats.logical_allocated, 0);
        assert!(stats.vmm_pages_popped >= 1);
        assert!(stats.heap_bytes_allocated >= stats.vmm_bytes_allocated);
    }

    #[test]
    fn test_closed_registry() {
        let registry = registry();
        let store = registry.open("c").unwrap();
        store.put("a", "1").unwrap();
        registry.close().unwrap();
        registry.close().unwrap();

        assert!(registry.is_closed());
        assert_eq!(
            registry.open("c").err().unwrap().kind(),
            &ErrorKind::RegistryClosed
        );
        assert_eq!(registry.stats().unwrap_err().kind(), &ErrorKind::RegistryClosed);
        assert_eq!(store.get("a").unwrap_err().kind(), &ErrorKind::StoreClosed);
    }

    #[test]
    fn test_dropping_last_clone_closes_stores() {
        let store = {
            let registry = registry();
            registry.open("orphan").unwrap()
        };
        assert!(store.is_closed());
    }
}
