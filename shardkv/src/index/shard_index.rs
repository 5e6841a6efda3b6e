use std::ops::Bound;

use super::{HashIndex, RadixTree};

/// The index behind one shard: a radix tree for ordered stores, a hash map
/// otherwise. Both answer the same queries with the same results.
pub enum ShardIndex<V> {
    Ordered(RadixTree<V>),
    Hashed(HashIndex<V>),
}

impl<V> ShardIndex<V> {
    pub fn new(ordered: bool) -> Self {
        if ordered {
            ShardIndex::Ordered(RadixTree::new())
        } else {
            ShardIndex::Hashed(HashIndex::new())
        }
    }

    pub fn is_ordered(&self) -> bool {
        matches!(self, ShardIndex::Ordered(_))
    }

    pub fn len(&self) -> usize {
        match self {
            ShardIndex::Ordered(tree) => tree.len(),
            ShardIndex::Hashed(map) => map.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        match self {
            ShardIndex::Ordered(tree) => tree.clear(),
            ShardIndex::Hashed(map) => map.clear(),
        }
    }

    pub fn insert(&mut self, key: &[u8], value: V) -> Option<V> {
        match self {
            ShardIndex::Ordered(tree) => tree.insert(key, value),
            ShardIndex::Hashed(map) => map.insert(key, value),
        }
    }

    pub fn get(&self, key: &[u8]) -> Option<&V> {
        match self {
            ShardIndex::Ordered(tree) => tree.get(key),
            ShardIndex::Hashed(map) => map.get(key),
        }
    }

    pub fn get_mut(&mut self, key: &[u8]) -> Option<&mut V> {
        match self {
            ShardIndex::Ordered(tree) => tree.get_mut(key),
            ShardIndex::Hashed(map) => map.get_mut(key),
        }
    }

    pub fn remove(&mut self, key: &[u8]) -> Option<V> {
        match self {
            ShardIndex::Ordered(tree) => tree.remove(key),
            ShardIndex::Hashed(map) => map.remove(key),
        }
    }

    pub fn min(&self) -> Option<(Vec<u8>, &V)> {
        match self {
            ShardIndex::Ordered(tree) => tree.min(),
            ShardIndex::Hashed(map) => map.min(),
        }
    }

    pub fn max(&self) -> Option<(Vec<u8>, &V)> {
        match self {
            ShardIndex::Ordered(tree) => tree.max(),
            ShardIndex::Hashed(map) => map.max(),
        }
    }

    pub fn count(&self, low: &[u8], high: &[u8]) -> usize {
        match self {
            ShardIndex::Ordered(tree) => tree.count(low, high),
            ShardIndex::Hashed(map) => map.count(low, high),
        }
    }

    pub fn lower_bound(&self, key: &[u8]) -> Option<(Vec<u8>, &V)> {
        self.lower_bound_where(key, |_| true)
    }

    /// First entry at or after `key` whose value passes `keep`.
    pub fn lower_bound_where(
        &self,
        key: &[u8],
        keep: impl Fn(&V) -> bool,
    ) -> Option<(Vec<u8>, &V)> {
        match self {
            ShardIndex::Ordered(tree) => tree.iter_from(key).find(|(_, value)| keep(*value)),
            ShardIndex::Hashed(map) => map
                .sorted_where(|k| k >= key)
                .into_iter()
                .find(|(_, value)| keep(*value)),
        }
    }

    /// Up to `limit` entries in ascending key order, starting at `from` and
    /// stopping after `to`.
    pub fn scan(
        &self,
        from: Bound<&[u8]>,
        to: Bound<&[u8]>,
        limit: usize,
    ) -> Vec<(Vec<u8>, &V)> {
        self.scan_where(from, to, limit, |_| true)
    }

    /// Like [`ShardIndex::scan`], counting only values that pass `keep`
    /// towards `limit`.
    pub fn scan_where(
        &self,
        from: Bound<&[u8]>,
        to: Bound<&[u8]>,
        limit: usize,
        keep: impl Fn(&V) -> bool,
    ) -> Vec<(Vec<u8>, &V)> {
        let below_upper = |key: &[u8]| match to {
            Bound::Included(high) => key <= high,
            Bound::Excluded(high) => key < high,
            Bound::Unbounded => true,
        };

        match self {
            ShardIndex::Ordered(tree) => {
                let iter = match from {
                    Bound::Included(low) | Bound::Excluded(low) => tree.iter_from(low),
                    Bound::Unbounded => tree.iter(),
                };
                iter.skip_while(|(key, _)| {
                    matches!(from, Bound::Excluded(low) if key.as_slice() == low)
                })
                .take_while(|(key, _)| below_upper(key.as_slice()))
                .filter(|(_, value)| keep(*value))
                .take(limit)
                .collect()
            }
            ShardIndex::Hashed(map) => {
                let mut entries = map.sorted_where(|key| {
                    let above_lower = match from {
                        Bound::Included(low) => key >= low,
                        Bound::Excluded(low) => key > low,
                        Bound::Unbounded => true,
                    };
                    above_lower && below_upper(key)
                });
                entries.retain(|(_, value)| keep(*value));
                entries.truncate(limit);
                entries
            }
        }
    }

    pub fn for_each_mut(&mut self, f: impl FnMut(&mut V)) {
        match self {
            ShardIndex::Ordered(tree) => tree.for_each_mut(f),
            ShardIndex::Hashed(map) => map.for_each_mut(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn populated(ordered: bool) -> ShardIndex<u32> {
        let mut index = ShardIndex::new(ordered);
        for i in 0..50u32 {
            index.insert(format!("key{:02}", i).as_bytes(), i);
        }
        index
    }

    fn keys(entries: Vec<(Vec<u8>, &u32)>) -> Vec<u32> {
        entries.into_iter().map(|(_, v)| *v).collect()
    }

    #[test]
    fn test_both_variants_agree() {
        for ordered in [true, false] {
            let index = populated(ordered);
            assert_eq!(index.is_ordered(), ordered);
            assert_eq!(index.len(), 50);
            assert_eq!(index.min().map(|(_, v)| *v), Some(0));
            assert_eq!(index.max().map(|(_, v)| *v), Some(49));
            assert_eq!(index.count(b"key10", b"key19"), 10);
            assert_eq!(index.count(b"key19", b"key10"), 0);
            assert_eq!(index.lower_bound(b"key105").map(|(_, v)| *v), Some(11));
        }
    }

    #[test]
    fn test_scan_bounds_and_limit() {
        for ordered in [true, false] {
            let index = populated(ordered);
            let got = index.scan(
                Bound::Excluded(b"key10".as_slice()),
                Bound::Included(b"key14".as_slice()),
                10,
            );
            assert_eq!(keys(got), vec![11, 12, 13, 14]);

            let got = index.scan(Bound::Included(b"key10".as_slice()), Bound::Unbounded, 3);
            assert_eq!(keys(got), vec![10, 11, 12]);

            let got = index.scan(Bound::Unbounded, Bound::Excluded(b"key02".as_slice()), 10);
            assert_eq!(keys(got), vec![0, 1]);
        }
    }

    #[test]
    fn test_filtered_queries_skip_rejected_values() {
        for ordered in [true, false] {
            let index = populated(ordered);
            let even = |value: &u32| value % 2 == 0;
            let got = index.scan_where(
                Bound::Included(b"key11".as_slice()),
                Bound::Unbounded,
                3,
                even,
            );
            assert_eq!(keys(got), vec![12, 14, 16]);
            assert_eq!(
                index.lower_bound_where(b"key13", even).map(|(_, v)| *v),
                Some(14)
            );
            assert_eq!(index.lower_bound_where(b"key49", even), None);
        }
    }

    #[test]
    fn test_for_each_mut_reaches_every_value() {
        for ordered in [true, false] {
            let mut index = populated(ordered);
            index.for_each_mut(|value| *value += 100);
            assert_eq!(index.get(b"key07"), Some(&107));
            let mut total = 0;
            index.for_each_mut(|value| total += *value);
            assert_eq!(total, (100..150).sum::<u32>());
        }
    }
}
