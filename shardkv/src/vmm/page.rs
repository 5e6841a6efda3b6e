use std::collections::HashMap;

/// One page (or one huge buffer) owned by an arena.
pub(crate) struct Page {
    pub(crate) data: Box<[u8]>,
    /// Next unused offset; spans below it were handed out at least once.
    pub(crate) bump: usize,
    pub(crate) live_spans: usize,
    /// Size-class bytes of live spans.
    pub(crate) live_bytes: usize,
    /// Freed offsets per size class, reused before bumping.
    pub(crate) free: HashMap<usize, Vec<u32>>,
    /// Set while a defragmentation pass empties the page.
    pub(crate) evacuating: bool,
    pub(crate) huge: bool,
}

impl Page {
    pub(crate) fn new(data: Box<[u8]>) -> Self {
        Page {
            data,
            bump: 0,
            live_spans: 0,
            live_bytes: 0,
            free: HashMap::new(),
            evacuating: false,
            huge: false,
        }
    }

    /// Placeholder for a released page slot.
    pub(crate) fn vacant() -> Self {
        Page::new(Box::default())
    }

    #[inline]
    pub(crate) fn is_vacant(&self) -> bool {
        self.data.is_empty()
    }

    pub(crate) fn huge(data: Box<[u8]>, class: usize) -> Self {
        Page {
            data,
            bump: class,
            live_spans: 1,
            live_bytes: class,
            free: HashMap::new(),
            evacuating: false,
            huge: true,
        }
    }

    #[inline]
    pub(crate) fn remaining(&self) -> usize {
        self.data.len() - self.bump
    }

    /// Carves `class` bytes off the unused tail.
    pub(crate) fn bump(&mut self, class: usize) -> Option<u32> {
        if self.remaining() < class {
            return None;
        }
        let offset = self.bump;
        self.bump += class;
        self.live_spans += 1;
        self.live_bytes += class;
        Some(offset as u32)
    }

    /// Reuses a freed slot of `class`, if the page has one.
    pub(crate) fn take_free(&mut self, class: usize) -> Option<u32> {
        let slots = self.free.get_mut(&class)?;
        let offset = slots.pop()?;
        if slots.is_empty() {
            self.free.remove(&class);
        }
        self.live_spans += 1;
        self.live_bytes += class;
        Some(offset)
    }

    pub(crate) fn has_free(&self, class: usize) -> bool {
        self.free.get(&class).is_some_and(|slots| !slots.is_empty())
    }

    pub(crate) fn release_span(&mut self, class: usize) {
        self.live_spans -= 1;
        self.live_bytes -= class;
    }

    /// Drops every free-list entry, yielding the classes and bytes removed.
    pub(crate) fn drain_free(&mut self) -> (Vec<usize>, usize) {
        let mut classes = Vec::with_capacity(self.free.len());
        let mut bytes = 0;
        for (class, slots) in self.free.drain() {
            bytes += class * slots.len();
            classes.push(class);
        }
        (classes, bytes)
    }

    /// Restarts bump allocation on a page with no live spans.
    pub(crate) fn reset(&mut self) -> (Vec<usize>, usize) {
        self.bump = 0;
        self.drain_free()
    }

    pub(crate) fn utilisation(&self) -> f32 {
        self.live_bytes as f32 / self.data.len() as f32
    }
}
