use std::collections::HashMap;

/// Index for stores opened without ordering.
///
/// Point operations are hash lookups. Ordered queries still answer
/// correctly but scan every key, so they cost O(n).
pub struct HashIndex<V> {
    map: HashMap<Vec<u8>, V>,
}

impl<V> Default for HashIndex<V> {
    fn default() -> Self {
        HashIndex::new()
    }
}

impl<V> HashIndex<V> {
    pub fn new() -> Self {
        HashIndex {
            map: HashMap::new(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn clear(&mut self) {
        self.map.clear();
    }

    pub fn insert(&mut self, key: &[u8], value: V) -> Option<V> {
        match self.map.get_mut(key) {
            Some(slot) => Some(std::mem::replace(slot, value)),
            None => {
                self.map.insert(key.to_vec(), value);
                None
            }
        }
    }

    pub fn get(&self, key: &[u8]) -> Option<&V> {
        self.map.get(key)
    }

    pub fn get_mut(&mut self, key: &[u8]) -> Option<&mut V> {
        self.map.get_mut(key)
    }

    pub fn remove(&mut self, key: &[u8]) -> Option<V> {
        self.map.remove(key)
    }

    pub fn min(&self) -> Option<(Vec<u8>, &V)> {
        self.map
            .iter()
            .min_by(|a, b| a.0.cmp(b.0))
            .map(|(key, value)| (key.clone(), value))
    }

    pub fn max(&self) -> Option<(Vec<u8>, &V)> {
        self.map
            .iter()
            .max_by(|a, b| a.0.cmp(b.0))
            .map(|(key, value)| (key.clone(), value))
    }

    pub fn count(&self, low: &[u8], high: &[u8]) -> usize {
        if low > high {
            return 0;
        }
        self.map
            .keys()
            .filter(|key| key.as_slice() >= low && key.as_slice() <= high)
            .count()
    }

    /// Entries accepted by `filter`, sorted by key.
    pub fn sorted_where(&self, filter: impl Fn(&[u8]) -> bool) -> Vec<(Vec<u8>, &V)> {
        let mut entries: Vec<(Vec<u8>, &V)> = self
            .map
            .iter()
            .filter(|(key, _)| filter(key))
            .map(|(key, value)| (key.clone(), value))
            .collect();
        entries.sort_unstable_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    pub fn for_each_mut(&mut self, mut f: impl FnMut(&mut V)) {
        self.map.values_mut().for_each(|value| f(value));
    }
}
