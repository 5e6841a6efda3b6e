//! Registry factory functions for benchmarks

use shardkv::{FileSnapshotProvider, Registry, RegistryBuilder, Store, StoreConfig};
use shardkv_fjall_adapter::FjallSnapshotProvider;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

use crate::config::StoreType;

/// Result type for store operations
pub type StoreResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Counter for unique image paths within a run
static DB_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Get the test-data directory path at the project root
fn get_test_data_dir() -> PathBuf {
    let manifest_dir = std::env::var("CARGO_MANIFEST_DIR").unwrap_or_else(|_| ".".to_string());
    let manifest_dir = PathBuf::from(manifest_dir);
    manifest_dir
        .parent()
        .map(|root| root.join("test-data"))
        .unwrap_or_else(|| manifest_dir.join("test-data"))
}

/// Create a unique image path within the test-data directory
fn create_unique_path() -> PathBuf {
    let test_data_dir = get_test_data_dir();
    std::fs::create_dir_all(&test_data_dir).ok();

    let counter = DB_COUNTER.fetch_add(1, Ordering::SeqCst);
    let unique_id = Uuid::new_v4();
    test_data_dir.join(format!("bench_{}_{}", counter, unique_id))
}

/// Context holding a registry and its image path for cleanup
pub struct BenchContext {
    registry: Registry,
    path: Option<PathBuf>,
}

impl BenchContext {
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Opens `name` with the given parameters.
    pub fn store(&self, name: &str, ordered: bool, shards: usize) -> StoreResult<Store> {
        Ok(self
            .registry
            .open_with(name, StoreConfig::new(ordered, shards)?)?)
    }
}

impl Drop for BenchContext {
    fn drop(&mut self) {
        let _ = self.registry.close();
        if let Some(ref path) = self.path {
            let _ = std::fs::remove_dir_all(path);
        }
    }
}

/// Clean up all benchmark data in the test-data directory
pub fn cleanup_all_bench_data() {
    let test_data_dir = get_test_data_dir();
    if let Ok(entries) = std::fs::read_dir(&test_data_dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                let _ = std::fs::remove_dir_all(&path);
            } else {
                let _ = std::fs::remove_file(&path);
            }
        }
    }
}

/// Create a registry with in-memory images
pub fn create_inmemory_registry() -> StoreResult<BenchContext> {
    create_registry_with(StoreType::InMemory, Registry::builder())
}

/// Create a registry with file images
pub fn create_file_registry() -> StoreResult<BenchContext> {
    create_registry_with(StoreType::File, Registry::builder())
}

/// Create a registry with fjall images
pub fn create_fjall_registry() -> StoreResult<BenchContext> {
    create_registry_with(StoreType::Fjall, Registry::builder())
}

/// Create a registry of the given type from a configured builder
pub fn create_registry_with(
    store_type: StoreType,
    builder: RegistryBuilder,
) -> StoreResult<BenchContext> {
    let (registry, path) = match store_type {
        StoreType::InMemory => (builder.open()?, None),
        StoreType::File => {
            let path = create_unique_path();
            let provider = FileSnapshotProvider::new(&path)?;
            (builder.snapshot_provider(provider).open()?, Some(path))
        }
        StoreType::Fjall => {
            let path = create_unique_path();
            let provider = FjallSnapshotProvider::open(&path)?;
            (builder.snapshot_provider(provider).open()?, Some(path))
        }
    };
    log::debug!("Created {} bench registry", store_type);
    Ok(BenchContext { registry, path })
}

/// Create a registry by type
pub fn create_registry(store_type: StoreType) -> StoreResult<BenchContext> {
    create_registry_with(store_type, Registry::builder())
}

/// Fill `store` with `entries`
pub fn populate(store: &Store, entries: &[(Vec<u8>, Vec<u8>)]) -> StoreResult<()> {
    for (key, value) in entries {
        store.put(key, value)?;
    }
    Ok(())
}
