//! Key and value generators for benchmarks

use rand::distributions::Alphanumeric;
use rand::seq::SliceRandom;
use rand::Rng;

/// Sequential zero-padded keys, so byte order matches numeric order
pub fn sequential_keys(count: usize) -> Vec<Vec<u8>> {
    (0..count)
        .map(|i| format!("key-{:010}", i).into_bytes())
        .collect()
}

/// The same keys as [`sequential_keys`] in random order
pub fn shuffled_keys(count: usize) -> Vec<Vec<u8>> {
    let mut keys = sequential_keys(count);
    keys.shuffle(&mut rand::thread_rng());
    keys
}

/// Random alphanumeric keys of 8 to 32 bytes
pub fn random_keys(count: usize) -> Vec<Vec<u8>> {
    let mut rng = rand::thread_rng();
    (0..count)
        .map(|_| {
            let len = rng.gen_range(8..=32);
            (&mut rng).sample_iter(&Alphanumeric).take(len).collect()
        })
        .collect()
}

/// A random value of `size` bytes
pub fn random_value(size: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..size).map(|_| rng.gen()).collect()
}

/// Key/value pairs over shuffled sequential keys
pub fn generate_entries(count: usize, value_size: usize) -> Vec<(Vec<u8>, Vec<u8>)> {
    shuffled_keys(count)
        .into_iter()
        .map(|key| (key, random_value(value_size)))
        .collect()
}

/// Splits `items` into `parts` chunks of nearly equal length
pub fn partition<T: Clone>(items: &[T], parts: usize) -> Vec<Vec<T>> {
    let parts = parts.max(1);
    let chunk = items.len().div_ceil(parts).max(1);
    items.chunks(chunk).map(|c| c.to_vec()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_keys_sort_numerically() {
        let keys = sequential_keys(1000);
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }

    #[test]
    fn test_partition_covers_everything() {
        let items: Vec<usize> = (0..10).collect();
        let parts = partition(&items, 3);
        assert_eq!(parts.len(), 3);
        assert_eq!(parts.concat(), items);
    }
}
