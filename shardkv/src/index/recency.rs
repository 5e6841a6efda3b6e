use std::sync::atomic::{AtomicU64, Ordering};

use crate::vmm::SpanHandle;

/// Identifier of a slot in a [`RecencyList`].
pub type SlotId = u32;

const NIL: SlotId = SlotId::MAX;

/// Monotonic access counter shared by every store of a registry, so that
/// recency is comparable across stores.
#[derive(Debug, Default)]
pub struct RecencyClock {
    ticks: AtomicU64,
}

impl RecencyClock {
    pub fn new() -> Self {
        RecencyClock::default()
    }

    #[inline]
    pub fn tick(&self) -> u64 {
        self.ticks.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn now(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }
}

/// Last read tick of every recency slot.
///
/// Readers stamp it under the shard read lock only; the stamps are folded
/// into the [`RecencyList`] order when eviction looks for the oldest entry.
#[derive(Debug, Default)]
pub struct TouchTable {
    ticks: Vec<AtomicU64>,
}

impl TouchTable {
    pub fn new() -> Self {
        TouchTable::default()
    }

    /// Starts tracking a (possibly reused) slot at `tick`.
    pub fn reset(&mut self, slot: SlotId, tick: u64) {
        let index = slot as usize;
        if index >= self.ticks.len() {
            self.ticks.resize_with(index + 1, || AtomicU64::new(0));
        }
        *self.ticks[index].get_mut() = tick;
    }

    #[inline]
    pub fn touch(&self, slot: SlotId, tick: u64) {
        if let Some(last) = self.ticks.get(slot as usize) {
            last.fetch_max(tick, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn last(&self, slot: SlotId) -> u64 {
        self.ticks
            .get(slot as usize)
            .map_or(0, |last| last.load(Ordering::Relaxed))
    }

    pub fn clear(&mut self) {
        self.ticks.clear();
    }
}

/// The entry an eviction step should remove next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecencyEntry {
    pub slot: SlotId,
    pub tick: u64,
    pub span: SpanHandle,
    pub key_len: u32,
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    prev: SlotId,
    next: SlotId,
    tick: u64,
    span: SpanHandle,
    key_len: u32,
}

/// Doubly-linked list of entries ordered from least to most recently used.
///
/// Slots live in a slab and are addressed by [`SlotId`]; the index stores
/// the id next to each entry so a touch is O(1) without hashing the key.
#[derive(Debug, Default)]
pub struct RecencyList {
    slots: Vec<Option<Slot>>,
    vacant: Vec<SlotId>,
    head: Option<SlotId>,
    tail: Option<SlotId>,
    len: usize,
}

impl RecencyList {
    pub fn new() -> Self {
        RecencyList::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn clear(&mut self) {
        *self = RecencyList::default();
    }

    /// Appends a new most-recent entry.
    pub fn push_back(&mut self, span: SpanHandle, key_len: u32, tick: u64) -> SlotId {
        let slot = Slot {
            prev: NIL,
            next: NIL,
            tick,
            span,
            key_len,
        };
        let id = match self.vacant.pop() {
            Some(id) => {
                self.slots[id as usize] = Some(slot);
                id
            }
            None => {
                self.slots.push(Some(slot));
                (self.slots.len() - 1) as SlotId
            }
        };
        self.link_back(id);
        self.len += 1;
        id
    }

    /// Marks an entry as just used.
    pub fn touch(&mut self, id: SlotId, tick: u64) {
        let Some(slot) = self.slot_mut(id) else {
            return;
        };
        slot.tick = tick;
        if self.tail != Some(id) {
            self.unlink(id);
            self.link_back(id);
        }
    }

    /// Points an entry at a new span (after an overwrite or relocation).
    pub fn update(&mut self, id: SlotId, span: SpanHandle, key_len: u32) {
        if let Some(slot) = self.slot_mut(id) {
            slot.span = span;
            slot.key_len = key_len;
        }
    }

    pub fn remove(&mut self, id: SlotId) {
        if self.slot_mut(id).is_none() {
            return;
        }
        self.unlink(id);
        self.slots[id as usize] = None;
        self.vacant.push(id);
        self.len -= 1;
    }

    pub fn oldest(&self) -> Option<RecencyEntry> {
        let id = self.head?;
        self.entry(id)
    }

    /// Moves entries read since they were last linked behind the others,
    /// then returns the least recently used one.
    pub fn settle(&mut self, touches: &TouchTable) -> Option<RecencyEntry> {
        for _ in 0..self.len {
            let oldest = self.oldest()?;
            let last = touches.last(oldest.slot);
            if last <= oldest.tick {
                return Some(oldest);
            }
            self.touch(oldest.slot, last);
        }
        self.oldest()
    }

    #[inline]
    pub fn oldest_tick(&self) -> Option<u64> {
        self.oldest().map(|entry| entry.tick)
    }

    pub fn entry(&self, id: SlotId) -> Option<RecencyEntry> {
        let slot = self.slots.get(id as usize)?.as_ref()?;
        Some(RecencyEntry {
            slot: id,
            tick: slot.tick,
            span: slot.span,
            key_len: slot.key_len,
        })
    }

    /// Entries from least to most recently used.
    pub fn iter(&self) -> impl Iterator<Item = RecencyEntry> + '_ {
        let mut cursor = self.head;
        std::iter::from_fn(move || {
            let entry = self.entry(cursor?)?;
            cursor = self.slots[entry.slot as usize]
                .as_ref()
                .and_then(|slot| (slot.next != NIL).then_some(slot.next));
            Some(entry)
        })
    }

    fn slot_mut(&mut self, id: SlotId) -> Option<&mut Slot> {
        self.slots.get_mut(id as usize)?.as_mut()
    }

    fn link_back(&mut self, id: SlotId) {
        let previous_tail = self.tail;
        if let Some(slot) = self.slot_mut(id) {
            slot.prev = previous_tail.unwrap_or(NIL);
            slot.next = NIL;
        }
        match previous_tail {
            Some(tail) => {
                if let Some(slot) = self.slot_mut(tail) {
                    slot.next = id;
                }
            }
            None => self.head = Some(id),
        }
        self.tail = Some(id);
    }

    fn unlink(&mut self, id: SlotId) {
        let Some((prev, next)) = self.slot_mut(id).map(|slot| (slot.prev, slot.next)) else {
            return;
        };
        if prev == NIL {
            self.head = (next != NIL).then_some(next);
        } else if let Some(slot) = self.slot_mut(prev) {
            slot.next = next;
        }
        if next == NIL {
            self.tail = (prev != NIL).then_some(prev);
        } else if let Some(slot) = self.slot_mut(next) {
            slot.prev = prev;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span(n: u32) -> SpanHandle {
        SpanHandle::new(0, n * 8, 8)
    }

    fn order(list: &RecencyList) -> Vec<u64> {
        list.iter().map(|entry| entry.tick).collect()
    }

    #[test]
    fn test_clock_is_monotonic() {
        let clock = RecencyClock::new();
        let a = clock.tick();
        let b = clock.tick();
        assert!(b > a);
        assert_eq!(clock.now(), b);
    }

    #[test]
    fn test_push_and_oldest() {
        let mut list = RecencyList::new();
        assert!(list.oldest().is_none());
        let a = list.push_back(span(0), 1, 1);
        list.push_back(span(1), 1, 2);
        list.push_back(span(2), 1, 3);

        assert_eq!(list.len(), 3);
        let oldest = list.oldest().unwrap();
        assert_eq!(oldest.slot, a);
        assert_eq!(oldest.tick, 1);
        assert_eq!(order(&list), vec![1, 2, 3]);
    }

    #[test]
    fn test_touch_moves_to_back() {
        let mut list = RecencyList::new();
        let a = list.push_back(span(0), 1, 1);
        let b = list.push_back(span(1), 1, 2);
        list.push_back(span(2), 1, 3);

        list.touch(a, 4);
        assert_eq!(order(&list), vec![2, 3, 4]);
        list.touch(b, 5);
        assert_eq!(order(&list), vec![3, 4, 5]);
        // touching the tail only refreshes its tick
        list.touch(b, 6);
        assert_eq!(order(&list), vec![3, 4, 6]);
    }

    #[test]
    fn test_remove_and_reuse_slots() {
        let mut list = RecencyList::new();
        let a = list.push_back(span(0), 1, 1);
        let b = list.push_back(span(1), 1, 2);
        let c = list.push_back(span(2), 1, 3);

        list.remove(b);
        assert_eq!(order(&list), vec![1, 3]);
        list.remove(a);
        assert_eq!(list.oldest().map(|e| e.slot), Some(c));
        list.remove(c);
        assert!(list.is_empty());
        assert!(list.oldest().is_none());

        let d = list.push_back(span(3), 2, 7);
        assert!(d == a || d == b || d == c);
        assert_eq!(list.entry(d).unwrap().key_len, 2);
    }

    #[test]
    fn test_settle_folds_recorded_reads() {
        let mut list = RecencyList::new();
        let mut touches = TouchTable::new();
        for tick in 1..=3 {
            let slot = list.push_back(span(tick as u32), 1, tick);
            touches.reset(slot, tick);
        }
        let first = list.oldest().unwrap().slot;

        // a read of the oldest entry is only stamped
        touches.touch(first, 9);
        assert_eq!(list.oldest_tick(), Some(1));

        let settled = list.settle(&touches).unwrap();
        assert_eq!(settled.tick, 2);
        assert_eq!(order(&list), vec![2, 3, 9]);

        // stale stamps never move an entry backwards
        touches.touch(first, 4);
        assert_eq!(touches.last(first), 9);
        assert_eq!(list.settle(&touches).map(|e| e.tick), Some(2));
    }

    #[test]
    fn test_touch_table_reset_on_reuse() {
        let mut touches = TouchTable::new();
        touches.reset(5, 10);
        touches.touch(5, 20);
        assert_eq!(touches.last(5), 20);
        touches.reset(5, 3);
        assert_eq!(touches.last(5), 3);
        assert_eq!(touches.last(99), 0);
        touches.touch(99, 1);
        touches.clear();
        assert_eq!(touches.last(5), 0);
    }

    #[test]
    fn test_update_span() {
        let mut list = RecencyList::new();
        let a = list.push_back(span(0), 1, 1);
        list.update(a, span(9), 3);
        let entry = list.entry(a).unwrap();
        assert_eq!(entry.span, span(9));
        assert_eq!(entry.key_len, 3);
    }
}
