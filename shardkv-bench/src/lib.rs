//! shardkv Benchmark Library
//!
//! Provides registries over each image backend and key/value generators for
//! the criterion benches.

pub mod config;
pub mod data_gen;
pub mod stores;
