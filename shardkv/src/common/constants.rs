/// Size of a VMM page in bytes. Must be a power of two.
pub const PAGE_SIZE: usize = 64 * 1024;

/// Granularity of VMM size classes.
pub const SIZE_CLASS_ALIGN: usize = 8;

/// Name of the store holding store parameters and process-wide tunables.
pub const CONFIGURATION_STORE: &str = "configuration";

/// Suffix of the configuration key declaring whether a store is ordered.
pub const ORDERED_SUFFIX: &str = ".ordered";

/// Suffix of the configuration key declaring a store's shard count.
pub const SHARDS_SUFFIX: &str = ".shards";

/// Upper bound on shards per store.
pub const MAX_SHARD_COUNT: usize = 1024;

/// Longest accepted store name, in bytes.
pub const MAX_STORE_NAME_LEN: usize = 255;

/// Entries fetched per shard by a store cursor between lock acquisitions.
pub const CURSOR_BATCH_SIZE: usize = 256;

/// Upper bound on entries removed by one eviction step on a single shard.
pub const EVICTION_BATCH_SIZE: usize = 64;

pub const MAX_MEMORY_BYTES: &str = "max_memory_bytes";
pub const EVICTION_POLICY: &str = "eviction_policy";
pub const MIN_FRAGMENTATION_RATIO: &str = "min_fragmentation_ratio";
pub const MAX_DEFRAG_PAGE_COUNT: &str = "max_defrag_page_count";
pub const ACTIVE_DEFRAG: &str = "active_defrag";
pub const MAX_POOLED_PAGES: &str = "max_pooled_pages";

/// Version tag written at the start of every store image.
pub const IMAGE_FORMAT_VERSION: u32 = 2;
