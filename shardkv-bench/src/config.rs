//! Benchmark configuration

/// Image backend type for benchmarks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreType {
    /// Images kept in process memory
    InMemory,
    /// One checksummed file per image
    File,
    /// Fjall keyspace
    Fjall,
}

impl StoreType {
    pub const ALL: [StoreType; 3] = [StoreType::InMemory, StoreType::File, StoreType::Fjall];
}

impl std::fmt::Display for StoreType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreType::InMemory => write!(f, "inmemory"),
            StoreType::File => write!(f, "file"),
            StoreType::Fjall => write!(f, "fjall"),
        }
    }
}

/// Configuration for benchmark runs
#[derive(Debug, Clone)]
pub struct BenchmarkConfig {
    /// Key counts to benchmark
    pub key_counts: Vec<usize>,
    /// Shard counts to benchmark
    pub shard_counts: Vec<usize>,
    /// Value size in bytes
    pub value_size: usize,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            key_counts: vec![1_000, 10_000, 100_000],
            shard_counts: vec![1, 4, 16],
            value_size: 64,
        }
    }
}

impl BenchmarkConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Quick config with smaller key counts for fast runs
    pub fn quick() -> Self {
        Self {
            key_counts: vec![1_000, 10_000],
            shard_counts: vec![1, 4],
            ..Default::default()
        }
    }
}
