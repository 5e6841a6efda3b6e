use std::collections::VecDeque;
use std::ops::Bound;
use std::sync::Arc;

use itertools::Itertools;

use super::Shard;

fn as_slice_bound(bound: &Bound<Vec<u8>>) -> Bound<&[u8]> {
    match bound {
        Bound::Included(key) => Bound::Included(key.as_slice()),
        Bound::Excluded(key) => Bound::Excluded(key.as_slice()),
        Bound::Unbounded => Bound::Unbounded,
    }
}

/// Ascending cursor over one shard.
///
/// It holds no lock between calls: each refill takes the shard read lock
/// just long enough to copy out one batch, then resumes after the last key
/// it returned. Entries written behind the cursor are not seen.
pub(crate) struct ShardCursor {
    shard: Arc<Shard>,
    next: Bound<Vec<u8>>,
    upper: Bound<Vec<u8>>,
    buffer: VecDeque<(Vec<u8>, Vec<u8>)>,
    batch_size: usize,
    exhausted: bool,
}

impl ShardCursor {
    pub(crate) fn new(
        shard: Arc<Shard>,
        lower: Bound<Vec<u8>>,
        upper: Bound<Vec<u8>>,
        batch_size: usize,
    ) -> Self {
        ShardCursor {
            shard,
            next: lower,
            upper,
            buffer: VecDeque::new(),
            batch_size: batch_size.max(1),
            exhausted: false,
        }
    }

    fn refill(&mut self) {
        let batch = self.shard.fetch(
            as_slice_bound(&self.next),
            as_slice_bound(&self.upper),
            self.batch_size,
        );
        if batch.len() < self.batch_size {
            self.exhausted = true;
        }
        if let Some((last, _)) = batch.last() {
            self.next = Bound::Excluded(last.clone());
        }
        self.buffer.extend(batch);
    }
}

impl Iterator for ShardCursor {
    type Item = (Vec<u8>, Vec<u8>);

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.exhausted {
            self.refill();
        }
        self.buffer.pop_front()
    }
}

/// Ascending iterator over the entries of a whole store.
///
/// Per-shard cursors are merged by key, so the sequence is strictly
/// increasing even when the store has many shards. Iteration is weakly
/// consistent: concurrent writes may or may not be observed.
pub struct StoreIter {
    inner: Box<dyn Iterator<Item = (Vec<u8>, Vec<u8>)> + Send>,
}

impl StoreIter {
    pub(crate) fn merge(cursors: Vec<ShardCursor>) -> Self {
        let merged = cursors
            .into_iter()
            .kmerge_by(|a: &(Vec<u8>, Vec<u8>), b: &(Vec<u8>, Vec<u8>)| a.0 < b.0);
        StoreIter {
            inner: Box::new(merged),
        }
    }

    pub(crate) fn empty() -> Self {
        StoreIter {
            inner: Box::new(std::iter::empty()),
        }
    }
}

impl Iterator for StoreIter {
    type Item = (Vec<u8>, Vec<u8>);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}
