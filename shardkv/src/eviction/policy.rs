use std::fmt::{Display, Formatter};
use std::str::FromStr;

use crate::errors::{ErrorKind, KvError};

/// Which stores take part in eviction once memory exceeds the ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EvictionPolicy {
    /// Never evict; memory may grow past the ceiling.
    NoEviction,
    /// Only stores that switched LRU on with `set_lru("ON")`.
    #[default]
    StoreLru,
    /// Every store, whether or not its LRU flag is set.
    AllKeysLru,
}

impl EvictionPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvictionPolicy::NoEviction => "noeviction",
            EvictionPolicy::StoreLru => "store-lru",
            EvictionPolicy::AllKeysLru => "allkeys-lru",
        }
    }

    /// Whether reads must refresh recency for every store.
    pub fn tracks_all_reads(&self) -> bool {
        matches!(self, EvictionPolicy::AllKeysLru)
    }
}

impl Display for EvictionPolicy {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EvictionPolicy {
    type Err = KvError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "noeviction" | "none" => Ok(EvictionPolicy::NoEviction),
            "store-lru" | "store_lru" => Ok(EvictionPolicy::StoreLru),
            "allkeys-lru" | "allkeys_lru" => Ok(EvictionPolicy::AllKeysLru),
            _ => {
                log::error!("Unknown eviction policy '{}'", value);
                Err(KvError::new(
                    &format!("Unknown eviction policy '{}'", value),
                    ErrorKind::InvalidConfiguration,
                ))
            }
        }
    }
}
