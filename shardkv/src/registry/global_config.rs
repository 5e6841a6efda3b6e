//! Process-wide engine tunables.

use std::str::FromStr;

use crate::common::{
    parse_bool, parse_memory_size, ACTIVE_DEFRAG, EVICTION_POLICY, MAX_DEFRAG_PAGE_COUNT,
    MAX_MEMORY_BYTES, MAX_POOLED_PAGES, MAX_SHARD_COUNT, MIN_FRAGMENTATION_RATIO, ORDERED_SUFFIX,
    SHARDS_SUFFIX,
};
use crate::errors::{ErrorKind, KvError, KvResult};
use crate::eviction::EvictionPolicy;
use crate::vmm::DEFAULT_MAX_POOLED_PAGES;

/// Tunables shared by every store of a registry.
///
/// Values are set from their textual form through [`GlobalConfig::set`], which
/// is also how the registry re-applies the pairs recorded in its
/// configuration store.
///
/// # Examples
///
/// ```rust
/// use shardkv::GlobalConfig;
///
/// let mut config = GlobalConfig::default();
/// config.set("max_memory_bytes", "64m").unwrap();
/// assert_eq!(config.max_memory_bytes(), 64 * 1024 * 1024);
/// assert!(config.set("max_memory_bytes", "lots").is_err());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalConfig {
    max_memory_bytes: u64,
    eviction_policy: EvictionPolicy,
    min_fragmentation_ratio: f32,
    max_defrag_page_count: usize,
    active_defrag: bool,
    max_pooled_pages: usize,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        GlobalConfig {
            max_memory_bytes: 0,
            eviction_policy: EvictionPolicy::default(),
            min_fragmentation_ratio: 0.6,
            max_defrag_page_count: 16,
            active_defrag: false,
            max_pooled_pages: DEFAULT_MAX_POOLED_PAGES,
        }
    }
}

impl GlobalConfig {
    /// Names of every recognised tunable.
    pub const KEYS: [&'static str; 6] = [
        MAX_MEMORY_BYTES,
        EVICTION_POLICY,
        MIN_FRAGMENTATION_RATIO,
        MAX_DEFRAG_PAGE_COUNT,
        ACTIVE_DEFRAG,
        MAX_POOLED_PAGES,
    ];

    pub fn new() -> Self {
        GlobalConfig::default()
    }

    /// Memory ceiling in bytes; 0 means unlimited.
    pub fn max_memory_bytes(&self) -> u64 {
        self.max_memory_bytes
    }

    pub fn eviction_policy(&self) -> EvictionPolicy {
        self.eviction_policy
    }

    pub fn min_fragmentation_ratio(&self) -> f32 {
        self.min_fragmentation_ratio
    }

    pub fn max_defrag_page_count(&self) -> usize {
        self.max_defrag_page_count
    }

    pub fn active_defrag(&self) -> bool {
        self.active_defrag
    }

    pub fn max_pooled_pages(&self) -> usize {
        self.max_pooled_pages
    }

    pub fn is_tunable(key: &str) -> bool {
        Self::KEYS.contains(&key)
    }

    /// Parses `value` and assigns it to `key`. On error the config is left
    /// unchanged.
    pub fn set(&mut self, key: &str, value: &str) -> KvResult<()> {
        let value = value.trim();
        match key {
            MAX_MEMORY_BYTES => {
                self.max_memory_bytes = parse_memory_size(value)?;
            }
            EVICTION_POLICY => {
                self.eviction_policy = EvictionPolicy::from_str(value)?;
            }
            MIN_FRAGMENTATION_RATIO => {
                let ratio = value
                    .parse::<f32>()
                    .map_err(|_| invalid_value(key, value))?;
                if !(ratio > 0.0 && ratio <= 1.0) {
                    return Err(invalid_value(key, value));
                }
                self.min_fragmentation_ratio = ratio;
            }
            MAX_DEFRAG_PAGE_COUNT => {
                let pages = value
                    .parse::<usize>()
                    .map_err(|_| invalid_value(key, value))?;
                if pages == 0 {
                    return Err(invalid_value(key, value));
                }
                self.max_defrag_page_count = pages;
            }
            ACTIVE_DEFRAG => {
                self.active_defrag = parse_bool(value)?;
            }
            MAX_POOLED_PAGES => {
                self.max_pooled_pages = value
                    .parse::<usize>()
                    .map_err(|_| invalid_value(key, value))?;
            }
            _ => {
                log::error!("Unknown configuration key '{}'", key);
                return Err(KvError::new(
                    &format!("Unknown configuration key '{}'", key),
                    ErrorKind::InvalidConfiguration,
                ));
            }
        }
        Ok(())
    }

    /// Textual form of a tunable, as it would be recorded.
    pub fn get(&self, key: &str) -> Option<String> {
        match key {
            MAX_MEMORY_BYTES => Some(self.max_memory_bytes.to_string()),
            EVICTION_POLICY => Some(self.eviction_policy.to_string()),
            MIN_FRAGMENTATION_RATIO => Some(self.min_fragmentation_ratio.to_string()),
            MAX_DEFRAG_PAGE_COUNT => Some(self.max_defrag_page_count.to_string()),
            ACTIVE_DEFRAG => Some(self.active_defrag.to_string()),
            MAX_POOLED_PAGES => Some(self.max_pooled_pages.to_string()),
            _ => None,
        }
    }

    /// Checks a `<store>.ordered` or `<store>.shards` pair without applying it.
    pub fn validate_store_parameter(key: &str, value: &str) -> KvResult<()> {
        if let Some(store) = key.strip_suffix(ORDERED_SUFFIX) {
            if store.is_empty() {
                return Err(invalid_key(key));
            }
            parse_bool(value)?;
            Ok(())
        } else if let Some(store) = key.strip_suffix(SHARDS_SUFFIX) {
            if store.is_empty() {
                return Err(invalid_key(key));
            }
            match value.trim().parse::<usize>() {
                Ok(count) if (1..=MAX_SHARD_COUNT).contains(&count) => Ok(()),
                _ => Err(invalid_value(key, value)),
            }
        } else {
            Err(invalid_key(key))
        }
    }
}

fn invalid_value(key: &str, value: &str) -> KvError {
    log::error!("Invalid value '{}' for configuration key '{}'", value, key);
    KvError::new(
        &format!("Invalid value '{}' for configuration key '{}'", value, key),
        ErrorKind::InvalidConfiguration,
    )
}

fn invalid_key(key: &str) -> KvError {
    log::error!("Unknown configuration key '{}'", key);
    KvError::new(
        &format!("Unknown configuration key '{}'", key),
        ErrorKind::InvalidConfiguration,
    )
}
