use std::path::Path;
use std::sync::Arc;

use fjall::{Keyspace, PartitionHandle, PersistMode};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use shardkv::{ImageMeta, KvResult, SnapshotProvider, StoreImage};
use xxhash_rust::xxh3::xxh3_64;

use crate::{FjallImageConfig, FjallImageError};

const META_PARTITION: &str = "shardkv_images";

// fjall rejects empty keys, so every stored key carries one leading byte
const KEY_TAG: u8 = 0;
const MAX_KEY_LEN: usize = u16::MAX as usize;

/// Where the entries of one image live, how many there must be, and the
/// expiry deadlines that go with them.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ImageRecord {
    meta: ImageMeta,
    generation: u64,
    count: u64,
    deadlines: Vec<(Vec<u8>, u64)>,
}

/// Keeps store images in a fjall keyspace.
///
/// Each image's entries live in their own partition; a metadata partition
/// maps store names to the partition of the current generation. A write
/// fills a fresh partition and switches the metadata record in the same
/// batch, so readers see either the old image or the new one.
#[derive(Clone)]
pub struct FjallSnapshotProvider {
    inner: Arc<FjallProviderInner>,
}

struct FjallProviderInner {
    config: FjallImageConfig,
    keyspace: Keyspace,
    meta: PartitionHandle,
    /// Serialises writers and removers; readers go straight to fjall.
    write_lock: Mutex<()>,
}

impl FjallSnapshotProvider {
    pub fn open(path: impl AsRef<Path>) -> KvResult<Self> {
        Self::open_with(FjallImageConfig::new(path))
    }

    pub fn open_with(config: FjallImageConfig) -> KvResult<Self> {
        let keyspace = Keyspace::open(config.keyspace_config()).map_err(|err| {
            log::error!(
                "Failed to open fjall keyspace at {}: {}",
                config.path().display(),
                err
            );
            FjallImageError::from(err)
        })?;
        let meta = keyspace
            .open_partition(META_PARTITION, config.partition_config())
            .map_err(FjallImageError::from)?;
        log::info!("Opened fjall image keyspace at {}", config.path().display());
        Ok(FjallSnapshotProvider {
            inner: Arc::new(FjallProviderInner {
                config,
                keyspace,
                meta,
                write_lock: Mutex::new(()),
            }),
        })
    }

    pub fn config(&self) -> &FjallImageConfig {
        &self.inner.config
    }
}

impl FjallProviderInner {
    fn partition_name(name: &str, generation: u64) -> String {
        format!("img_{:016x}_{}", xxh3_64(name.as_bytes()), generation)
    }

    fn record(&self, name: &str) -> Result<Option<ImageRecord>, FjallImageError> {
        let Some(bytes) = self.meta.get(name.as_bytes())? else {
            return Ok(None);
        };
        let (record, _): (ImageRecord, usize) =
            bincode::serde::decode_from_slice(&bytes, bincode::config::standard())
                .map_err(|err| FjallImageError::Decode(err.to_string()))?;
        Ok(Some(record))
    }

    fn drop_partition(&self, partition_name: &str) -> Result<(), FjallImageError> {
        if self.keyspace.partition_exists(partition_name) {
            let partition = self
                .keyspace
                .open_partition(partition_name, self.config.partition_config())?;
            self.keyspace.delete_partition(partition)?;
        }
        Ok(())
    }

    fn write(&self, image: &StoreImage) -> Result<(), FjallImageError> {
        let _guard = self.write_lock.lock();
        let name = image.name();
        let previous = self.record(name)?;
        let generation = previous.as_ref().map_or(1, |record| record.generation + 1);

        // leftovers of an interrupted write
        let partition_name = Self::partition_name(name, generation);
        self.drop_partition(&partition_name)?;
        let partition = self
            .keyspace
            .open_partition(&partition_name, self.config.partition_config())?;

        let record = ImageRecord {
            meta: image.meta.clone(),
            generation,
            count: image.len() as u64,
            deadlines: image.deadlines.clone(),
        };
        let encoded = bincode::serde::encode_to_vec(&record, bincode::config::standard())
            .map_err(|err| FjallImageError::Encode(err.to_string()))?;

        let mut batch = self.keyspace.batch();
        for (key, value) in &image.entries {
            if key.len() + 1 > MAX_KEY_LEN {
                return Err(FjallImageError::KeyTooLarge(key.len()));
            }
            let mut tagged = Vec::with_capacity(key.len() + 1);
            tagged.push(KEY_TAG);
            tagged.extend_from_slice(key);
            batch.insert(&partition, tagged, value.clone());
        }
        batch.insert(&self.meta, name.as_bytes().to_vec(), encoded);
        batch.commit()?;
        self.keyspace.persist(PersistMode::SyncAll)?;

        if let Some(previous) = previous {
            self.drop_partition(&Self::partition_name(name, previous.generation))?;
        }
        log::debug!(
            "Wrote fjall image of store {} (generation {}, {} entries)",
            name,
            generation,
            image.len()
        );
        Ok(())
    }

    fn read(&self, name: &str) -> Result<Option<StoreImage>, FjallImageError> {
        let Some(record) = self.record(name)? else {
            return Ok(None);
        };
        if record.meta.name != name {
            return Err(FjallImageError::Incomplete(name.to_string()));
        }
        let partition_name = Self::partition_name(name, record.generation);
        if !self.keyspace.partition_exists(&partition_name) {
            return Err(FjallImageError::Incomplete(name.to_string()));
        }
        let partition = self
            .keyspace
            .open_partition(&partition_name, self.config.partition_config())?;

        let mut entries = Vec::with_capacity(record.count as usize);
        for item in partition.iter() {
            let (key, value) = item?;
            match key.split_first() {
                Some((&KEY_TAG, key)) => entries.push((key.to_vec(), value.to_vec())),
                _ => return Err(FjallImageError::Incomplete(name.to_string())),
            }
        }
        if entries.len() as u64 != record.count {
            return Err(FjallImageError::Incomplete(name.to_string()));
        }
        Ok(Some(StoreImage {
            meta: record.meta,
            entries,
            deadlines: record.deadlines,
        }))
    }

    fn remove(&self, name: &str) -> Result<(), FjallImageError> {
        let _guard = self.write_lock.lock();
        let Some(record) = self.record(name)? else {
            return Ok(());
        };
        self.meta.remove(name.as_bytes())?;
        self.keyspace.persist(PersistMode::SyncAll)?;
        self.drop_partition(&Self::partition_name(name, record.generation))
    }

    fn names(&self) -> Result<Vec<String>, FjallImageError> {
        let mut names = Vec::new();
        for item in self.meta.keys() {
            let key = item?;
            names.push(String::from_utf8_lossy(&key).into_owned());
        }
        Ok(names)
    }
}

impl SnapshotProvider for FjallSnapshotProvider {
    fn write_image(&self, image: &StoreImage) -> KvResult<()> {
        self.inner.write(image).map_err(|err| {
            log::error!("Failed to write fjall image of {}: {}", image.name(), err);
            err.into()
        })
    }

    fn read_image(&self, name: &str) -> KvResult<Option<StoreImage>> {
        self.inner.read(name).map_err(|err| {
            log::error!("Failed to read fjall image of {}: {}", name, err);
            err.into()
        })
    }

    fn has_image(&self, name: &str) -> KvResult<bool> {
        Ok(self
            .inner
            .meta
            .contains_key(name.as_bytes())
            .map_err(FjallImageError::from)?)
    }

    fn remove_image(&self, name: &str) -> KvResult<()> {
        self.inner.remove(name).map_err(|err| {
            log::error!("Failed to remove fjall image of {}: {}", name, err);
            err.into()
        })
    }

    fn image_names(&self) -> KvResult<Vec<String>> {
        Ok(self.inner.names()?)
    }
}
