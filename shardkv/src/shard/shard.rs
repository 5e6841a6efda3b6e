use std::collections::BTreeSet;
use std::ops::Bound;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::{Mutex, RwLock};

use crate::common::now_millis;
use crate::errors::KvResult;
use crate::index::{RecencyClock, RecencyList, ShardIndex, SlotId, TouchTable};
use crate::vmm::{Arena, SpanHandle, Vmm};

/// What the index stores for each key: where the entry's bytes live, which
/// recency slot tracks it and when it expires. The span holds the key
/// followed by the value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct EntryRef {
    pub(crate) span: SpanHandle,
    pub(crate) key_len: u32,
    pub(crate) slot: SlotId,
    /// Unix milliseconds after which the entry reads as absent.
    pub(crate) expires_at: Option<u64>,
}

impl EntryRef {
    #[inline]
    fn is_expired(&self) -> bool {
        self.expires_at
            .is_some_and(|deadline| deadline <= now_millis())
    }
}

/// A live entry copied out of a shard, with its expiry deadline.
pub(crate) type ExportedEntry = (Vec<u8>, Vec<u8>, Option<u64>);

pub(crate) struct ShardState {
    index: ShardIndex<EntryRef>,
    arena: Arena,
    touches: TouchTable,
    /// `(deadline, slot)` of every entry that has one.
    deadlines: BTreeSet<(u64, SlotId)>,
}

impl ShardState {
    fn value_of(&self, entry: &EntryRef) -> Vec<u8> {
        self.arena.read(entry.span)[entry.key_len as usize..].to_vec()
    }

    fn live(&self, key: &[u8]) -> Option<&EntryRef> {
        self.index.get(key).filter(|entry| !entry.is_expired())
    }

    /// Unlinks `key` from the index, the arena, the recency list and the
    /// deadline set.
    fn take(&mut self, key: &[u8], recency: &mut RecencyList) -> Option<EntryRef> {
        let entry = self.index.remove(key)?;
        self.arena.free(entry.span);
        recency.remove(entry.slot);
        if let Some(deadline) = entry.expires_at {
            self.deadlines.remove(&(deadline, entry.slot));
        }
        Some(entry)
    }

    fn set_deadline(&mut self, key: &[u8], expires_at: Option<u64>) -> bool {
        let ShardState {
            index, deadlines, ..
        } = self;
        let Some(entry) = index.get_mut(key) else {
            return false;
        };
        if entry.expires_at != expires_at {
            if let Some(deadline) = entry.expires_at {
                deadlines.remove(&(deadline, entry.slot));
            }
            if let Some(deadline) = expires_at {
                deadlines.insert((deadline, entry.slot));
            }
            entry.expires_at = expires_at;
        }
        true
    }
}

/// One independently locked partition of a store.
///
/// Mutations hold the state write lock for their duration only and take
/// their recency tick while holding it. Reads take the state read lock and
/// nothing else: a tracked read stamps the entry's slot in the touch table,
/// and the stamps are folded into the recency list when eviction looks for
/// the oldest entry. The lock order is always state, then recency.
pub(crate) struct Shard {
    number: usize,
    state: RwLock<ShardState>,
    recency: Mutex<RecencyList>,
    len: AtomicUsize,
}

impl Shard {
    pub(crate) fn new(number: usize, ordered: bool, vmm: Vmm) -> Self {
        Shard {
            number,
            state: RwLock::new(ShardState {
                index: ShardIndex::new(ordered),
                arena: Arena::new(vmm),
                touches: TouchTable::new(),
                deadlines: BTreeSet::new(),
            }),
            recency: Mutex::new(RecencyList::new()),
            len: AtomicUsize::new(0),
        }
    }

    pub(crate) fn number(&self) -> usize {
        self.number
    }

    /// Entries held, counting expired ones not yet purged.
    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    pub(crate) fn is_ordered(&self) -> bool {
        self.state.read().index.is_ordered()
    }

    pub(crate) fn logical_bytes(&self) -> usize {
        self.state.read().arena.logical_bytes()
    }

    /// Inserts or replaces `key`. A replaced entry loses its expiry.
    pub(crate) fn put(&self, key: &[u8], value: &[u8], clock: &RecencyClock) -> KvResult<()> {
        let mut state = self.state.write();
        self.write_entry(&mut state, key, value, clock.tick(), None)
    }

    /// Inserts `key` only when it holds no live entry. Returns whether the
    /// value was written.
    pub(crate) fn add(&self, key: &[u8], value: &[u8], clock: &RecencyClock) -> KvResult<bool> {
        let mut state = self.state.write();
        if state.live(key).is_some() {
            return Ok(false);
        }
        self.write_entry(&mut state, key, value, clock.tick(), None)?;
        Ok(true)
    }

    /// Reads a value; with `touch`, the read refreshes the entry's recency.
    pub(crate) fn get(&self, key: &[u8], touch: Option<&RecencyClock>) -> Option<Vec<u8>> {
        let state = self.state.read();
        let entry = state.live(key)?;
        let value = state.value_of(entry);
        if let Some(clock) = touch {
            state.touches.touch(entry.slot, clock.tick());
        }
        Some(value)
    }

    pub(crate) fn contains(&self, key: &[u8]) -> bool {
        self.state.read().live(key).is_some()
    }

    /// Removes `key`, returning whether a live entry was there.
    pub(crate) fn remove(&self, key: &[u8]) -> bool {
        let mut state = self.state.write();
        let taken = state.take(key, &mut self.recency.lock());
        match taken {
            Some(entry) => {
                self.len.fetch_sub(1, Ordering::Relaxed);
                !entry.is_expired()
            }
            None => false,
        }
    }

    /// Read-modify-write of one key under the shard write lock. `apply`
    /// receives the current value and returns the one to store. A live
    /// entry keeps its expiry.
    pub(crate) fn update(
        &self,
        key: &[u8],
        clock: &RecencyClock,
        apply: impl FnOnce(Option<&[u8]>) -> KvResult<Vec<u8>>,
    ) -> KvResult<Vec<u8>> {
        let mut state = self.state.write();
        let (current, expires_at) = match state.live(key) {
            Some(entry) => (Some(state.value_of(entry)), entry.expires_at),
            None => (None, None),
        };
        let updated = apply(current.as_deref())?;
        self.write_entry(&mut state, key, &updated, clock.tick(), expires_at)?;
        Ok(updated)
    }

    /// Sets the absolute expiry deadline of a live entry. Returns whether
    /// the key was found.
    pub(crate) fn expire(&self, key: &[u8], deadline: u64) -> bool {
        let mut state = self.state.write();
        if state.live(key).is_none() {
            return false;
        }
        state.set_deadline(key, Some(deadline))
    }

    /// `None` when the key is absent, otherwise its deadline if it has one.
    pub(crate) fn deadline(&self, key: &[u8]) -> Option<Option<u64>> {
        self.state.read().live(key).map(|entry| entry.expires_at)
    }

    /// Drops every entry whose deadline has passed. Returns how many.
    pub(crate) fn purge_expired(&self) -> usize {
        let now = now_millis();
        let mut state = self.state.write();
        if !matches!(state.deadlines.first(), Some(&(deadline, _)) if deadline <= now) {
            return 0;
        }

        let mut recency = self.recency.lock();
        let mut purged = 0;
        while let Some(&(deadline, slot)) = state.deadlines.first() {
            if deadline > now {
                break;
            }
            state.deadlines.pop_first();
            let Some(tracked) = recency.entry(slot) else {
                continue;
            };
            let key = state.arena.read(tracked.span)[..tracked.key_len as usize].to_vec();
            if state.take(&key, &mut recency).is_some() {
                purged += 1;
            }
        }
        self.len.fetch_sub(purged, Ordering::Relaxed);
        purged
    }

    pub(crate) fn min(&self) -> Option<Vec<u8>> {
        self.state.read().index.min().map(|(key, _)| key)
    }

    pub(crate) fn max(&self) -> Option<Vec<u8>> {
        self.state.read().index.max().map(|(key, _)| key)
    }

    pub(crate) fn count(&self, low: &[u8], high: &[u8]) -> usize {
        self.state.read().index.count(low, high)
    }

    pub(crate) fn lower_bound(&self, key: &[u8]) -> Option<(Vec<u8>, Vec<u8>)> {
        let state = self.state.read();
        let (found, entry) = state
            .index
            .lower_bound_where(key, |entry| !entry.is_expired())?;
        let value = state.value_of(entry);
        Some((found, value))
    }

    /// Up to `limit` live entries between the bounds, ascending.
    pub(crate) fn fetch(
        &self,
        from: Bound<&[u8]>,
        to: Bound<&[u8]>,
        limit: usize,
    ) -> Vec<(Vec<u8>, Vec<u8>)> {
        let state = self.state.read();
        state
            .index
            .scan_where(from, to, limit, |entry| !entry.is_expired())
            .into_iter()
            .map(|(key, entry)| {
                let value = state.value_of(entry);
                (key, value)
            })
            .collect()
    }

    pub(crate) fn entries(&self) -> Vec<(Vec<u8>, Vec<u8>)> {
        self.fetch(Bound::Unbounded, Bound::Unbounded, usize::MAX)
    }

    /// Every live entry with its deadline, ascending.
    pub(crate) fn export(&self) -> Vec<ExportedEntry> {
        let state = self.state.read();
        state
            .index
            .scan_where(Bound::Unbounded, Bound::Unbounded, usize::MAX, |entry| {
                !entry.is_expired()
            })
            .into_iter()
            .map(|(key, entry)| {
                let value = state.value_of(entry);
                (key, value, entry.expires_at)
            })
            .collect()
    }

    /// Drops every entry and hands the shard's pages back to the VMM.
    pub(crate) fn clear(&self) {
        let mut state = self.state.write();
        state.index.clear();
        let vmm = state.arena.vmm().clone();
        state.arena = Arena::new(vmm);
        state.touches.clear();
        state.deadlines.clear();
        self.recency.lock().clear();
        self.len.store(0, Ordering::Relaxed);
    }

    /// Tick of the least recently used entry, after folding recorded reads.
    pub(crate) fn oldest_tick(&self) -> Option<u64> {
        let state = self.state.read();
        let oldest = self.recency.lock().settle(&state.touches);
        oldest.map(|entry| entry.tick)
    }

    /// Removes least recently used entries until `budget` bytes have been
    /// released or `max_entries` entries are gone. Returns the number of
    /// entries removed and the bytes they held.
    pub(crate) fn evict_oldest(&self, budget: u64, max_entries: usize) -> (usize, u64) {
        let mut state = self.state.write();
        let mut recency = self.recency.lock();

        let mut evicted = 0;
        let mut released = 0u64;
        while evicted < max_entries && released < budget {
            let Some(oldest) = recency.settle(&state.touches) else {
                break;
            };
            let key = state.arena.read(oldest.span)[..oldest.key_len as usize].to_vec();
            if state.take(&key, &mut recency).is_none() {
                break;
            }
            released += oldest.span.len() as u64;
            evicted += 1;
        }
        self.len.fetch_sub(evicted, Ordering::Relaxed);
        (evicted, released)
    }

    /// Compacts up to `max_pages` pages whose utilisation is below
    /// `min_ratio`. Returns the number of pages released.
    pub(crate) fn defragment(&self, min_ratio: f32, max_pages: usize) -> KvResult<usize> {
        let mut state = self.state.write();
        let ShardState { index, arena, .. } = &mut *state;
        let planned = arena.plan_defrag(min_ratio, max_pages);
        if planned == 0 {
            return Ok(0);
        }

        let mut recency = self.recency.lock();
        let mut failure = None;
        index.for_each_mut(|entry| {
            if failure.is_some() || !arena.is_evacuating(entry.span) {
                return;
            }
            match arena.relocate(entry.span) {
                Ok(span) => {
                    entry.span = span;
                    recency.update(entry.slot, span, entry.key_len);
                }
                Err(err) => failure = Some(err),
            }
        });
        let stranded = arena.finish_defrag();
        if let Some(err) = failure {
            log::error!("Defragmentation of shard {} failed: {}", self.number, err);
            return Err(err);
        }

        log::debug!(
            "Shard {} released {} of {} planned pages",
            self.number,
            planned - stranded,
            planned
        );
        Ok(planned - stranded)
    }

    fn write_entry(
        &self,
        state: &mut ShardState,
        key: &[u8],
        value: &[u8],
        tick: u64,
        expires_at: Option<u64>,
    ) -> KvResult<()> {
        let ShardState {
            index,
            arena,
            touches,
            ..
        } = &mut *state;
        if let Some(entry) = index.get_mut(key) {
            let span = match arena.rewrite(entry.span, &[key, value]) {
                Some(span) => span,
                None => {
                    let span = arena.allocate_with(&[key, value])?;
                    arena.free(entry.span);
                    span
                }
            };
            entry.span = span;
            touches.reset(entry.slot, tick);
            {
                let mut recency = self.recency.lock();
                recency.update(entry.slot, span, entry.key_len);
                recency.touch(entry.slot, tick);
            }
            state.set_deadline(key, expires_at);
            return Ok(());
        }

        let span = arena.allocate_with(&[key, value])?;
        let key_len = key.len() as u32;
        let slot = self.recency.lock().push_back(span, key_len, tick);
        touches.reset(slot, tick);
        index.insert(
            key,
            EntryRef {
                span,
                key_len,
                slot,
                expires_at: None,
            },
        );
        self.len.fetch_add(1, Ordering::Relaxed);
        state.set_deadline(key, expires_at);
        Ok(())
    }
}
