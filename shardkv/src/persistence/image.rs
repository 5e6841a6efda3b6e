use serde::{Deserialize, Serialize};

use crate::store::StoreConfig;

/// Identity and parameters of a saved store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageMeta {
    pub name: String,
    pub ordered: bool,
    pub shard_count: usize,
}

impl ImageMeta {
    pub fn config(&self) -> StoreConfig {
        StoreConfig::unchecked(self.ordered, self.shard_count)
    }
}

/// Everything needed to rebuild a store: its metadata, its live entries
/// and the expiry deadlines (Unix milliseconds) of the entries that have one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreImage {
    pub meta: ImageMeta,
    pub entries: Vec<(Vec<u8>, Vec<u8>)>,
    pub deadlines: Vec<(Vec<u8>, u64)>,
}

impl StoreImage {
    pub fn new(name: &str, config: StoreConfig, entries: Vec<(Vec<u8>, Vec<u8>)>) -> Self {
        StoreImage {
            meta: ImageMeta {
                name: name.to_string(),
                ordered: config.ordered(),
                shard_count: config.shard_count(),
            },
            entries,
            deadlines: Vec::new(),
        }
    }

    pub fn with_deadlines(mut self, deadlines: Vec<(Vec<u8>, u64)>) -> Self {
        self.deadlines = deadlines;
        self
    }

    pub fn name(&self) -> &str {
        &self.meta.name
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
