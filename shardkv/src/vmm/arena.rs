use std::collections::{BTreeMap, BTreeSet};

use crate::common::PAGE_SIZE;
use crate::errors::{ErrorKind, KvError, KvResult};

use super::handle::{huge_span_bytes, size_class, SpanHandle};
use super::page::Page;
use super::pool::Vmm;

/// Shard-local sub-allocator.
///
/// An arena is only ever touched under its shard's lock, so it needs no
/// synchronisation of its own. Freed spans go to per-page free lists and are
/// reused by size class before the current page is bumped; a page whose last
/// span is freed goes back to the [`Vmm`].
///
/// Defragmentation is a three-step protocol driven by the owner, which is the
/// only party that knows where handles are stored:
///
/// 1. [`plan_defrag`](Arena::plan_defrag) marks sparse pages as evacuating,
/// 2. the owner walks its handles and calls [`relocate`](Arena::relocate) on
///    each one for which [`is_evacuating`](Arena::is_evacuating) holds,
/// 3. [`finish_defrag`](Arena::finish_defrag) clears whatever is left.
pub struct Arena {
    vmm: Vmm,
    pages: Vec<Page>,
    vacant: Vec<u32>,
    current: Option<u32>,
    // size class -> pages holding free slots of that class
    class_pages: BTreeMap<usize, BTreeSet<u32>>,
    logical_bytes: usize,
    free_list_bytes: usize,
}

impl Arena {
    pub fn new(vmm: Vmm) -> Self {
        Arena {
            vmm,
            pages: Vec::new(),
            vacant: Vec::new(),
            current: None,
            class_pages: BTreeMap::new(),
            logical_bytes: 0,
            free_list_bytes: 0,
        }
    }

    pub fn vmm(&self) -> &Vmm {
        &self.vmm
    }

    /// Requested bytes of the spans currently live in this arena.
    pub fn logical_bytes(&self) -> usize {
        self.logical_bytes
    }

    pub fn free_list_bytes(&self) -> usize {
        self.free_list_bytes
    }

    /// Number of pages (huge buffers included) held by this arena.
    pub fn page_count(&self) -> usize {
        self.pages.iter().filter(|page| !page.is_vacant()).count()
    }

    pub fn allocate(&mut self, len: usize) -> KvResult<SpanHandle> {
        if len > u32::MAX as usize {
            log::error!("Cannot allocate a span of {} bytes", len);
            return Err(KvError::new(
                &format!("Span of {} bytes exceeds the largest allocatable size", len),
                ErrorKind::AllocationFailure,
            ));
        }

        let class = size_class(len);
        let handle = if class > PAGE_SIZE {
            self.allocate_huge(len, class)
        } else {
            self.allocate_small(len, class)?
        };

        self.logical_bytes += len;
        self.vmm.add_logical(len);
        Ok(handle)
    }

    /// Allocates a span holding the concatenation of `parts`.
    pub fn allocate_with(&mut self, parts: &[&[u8]]) -> KvResult<SpanHandle> {
        let len = parts.iter().map(|part| part.len()).sum();
        let handle = self.allocate(len)?;
        self.write(handle, parts);
        Ok(handle)
    }

    /// Overwrites a span in place when the new contents fit the same size
    /// class. Returns the updated handle, or `None` if a new span is needed.
    pub fn rewrite(&mut self, handle: SpanHandle, parts: &[&[u8]]) -> Option<SpanHandle> {
        let len: usize = parts.iter().map(|part| part.len()).sum();
        let page = &self.pages[handle.page() as usize];
        if page.huge || page.evacuating || size_class(len) != handle.class() {
            return None;
        }

        let updated = handle.with_len(len as u32);
        self.write(updated, parts);
        if len >= handle.len() {
            let grown = len - handle.len();
            self.logical_bytes += grown;
            self.vmm.add_logical(grown);
        } else {
            let shrunk = handle.len() - len;
            self.logical_bytes -= shrunk;
            self.vmm.sub_logical(shrunk);
        }
        Some(updated)
    }

    #[inline]
    pub fn read(&self, handle: SpanHandle) -> &[u8] {
        let start = handle.offset() as usize;
        &self.pages[handle.page() as usize].data[start..start + handle.len()]
    }

    pub fn free(&mut self, handle: SpanHandle) {
        let id = handle.page();
        let class = handle.class();
        self.logical_bytes -= handle.len();
        self.vmm.sub_logical(handle.len());

        let page = &mut self.pages[id as usize];
        if page.huge {
            let data = std::mem::take(&mut page.data);
            *page = Page::vacant();
            self.vacant.push(id);
            self.vmm.return_huge(data);
            return;
        }

        page.release_span(class);
        if page.live_spans == 0 {
            if self.current == Some(id) {
                let (classes, bytes) = page.reset();
                self.forget_free(id, classes, bytes);
            } else {
                let evacuated = page.evacuating;
                self.release_page(id);
                if evacuated {
                    self.vmm.record_defragged_page();
                }
            }
            return;
        }

        // slots on an evacuating page are never handed out again
        if !page.evacuating {
            page.free.entry(class).or_default().push(handle.offset());
            self.free_list_bytes += class;
            self.vmm.add_free_list(class);
            self.class_pages.entry(class).or_default().insert(id);
        }
    }

    /// Marks up to `max_pages` of the sparsest pages as evacuating. A page
    /// qualifies when its live bytes are below `min_ratio` of the page size.
    /// Returns the number of pages marked.
    pub fn plan_defrag(&mut self, min_ratio: f32, max_pages: usize) -> usize {
        let mut candidates: Vec<(usize, u32)> = self
            .pages
            .iter()
            .enumerate()
            .filter(|(id, page)| {
                !page.is_vacant()
                    && !page.huge
                    && !page.evacuating
                    && self.current != Some(*id as u32)
                    && page.utilisation() < min_ratio
            })
            .map(|(id, page)| (page.live_bytes, id as u32))
            .collect();
        candidates.sort_unstable();
        candidates.truncate(max_pages);

        for (_, id) in &candidates {
            let page = &mut self.pages[*id as usize];
            page.evacuating = true;
            let (classes, bytes) = page.drain_free();
            self.forget_free(*id, classes, bytes);
        }
        candidates.len()
    }

    #[inline]
    pub fn is_evacuating(&self, handle: SpanHandle) -> bool {
        self.pages[handle.page() as usize].evacuating
    }

    /// Moves a span off an evacuating page, returning its new handle.
    pub fn relocate(&mut self, handle: SpanHandle) -> KvResult<SpanHandle> {
        let bytes = self.read(handle).to_vec();
        let moved = self.allocate_with(&[&bytes])?;
        self.free(handle);
        Ok(moved)
    }

    /// Ends a defragmentation pass. Pages that still hold spans go back to
    /// normal service; their count is returned.
    pub fn finish_defrag(&mut self) -> usize {
        let mut remaining = 0;
        for page in self.pages.iter_mut().filter(|page| page.evacuating) {
            page.evacuating = false;
            remaining += 1;
        }
        remaining
    }

    fn allocate_small(&mut self, len: usize, class: usize) -> KvResult<SpanHandle> {
        let reusable = self
            .class_pages
            .get(&class)
            .and_then(|pages| pages.first().copied());
        if let Some(id) = reusable {
            let page = &mut self.pages[id as usize];
            if let Some(offset) = page.take_free(class) {
                if !page.has_free(class) {
                    self.forget_class(id, class);
                }
                self.free_list_bytes -= class;
                self.vmm.sub_free_list(class);
                return Ok(SpanHandle::new(id, offset, len as u32));
            }
        }

        if let Some(id) = self.current {
            if let Some(offset) = self.pages[id as usize].bump(class) {
                return Ok(SpanHandle::new(id, offset, len as u32));
            }
        }

        let id = self.install(Page::new(self.vmm.pop_page()));
        self.current = Some(id);
        match self.pages[id as usize].bump(class) {
            Some(offset) => Ok(SpanHandle::new(id, offset, len as u32)),
            None => {
                log::error!("Fresh page cannot hold a span of class {}", class);
                Err(KvError::new(
                    &format!("Fresh page cannot hold a span of class {}", class),
                    ErrorKind::InternalError,
                ))
            }
        }
    }

    fn allocate_huge(&mut self, len: usize, class: usize) -> SpanHandle {
        let data = self.vmm.pop_huge(huge_span_bytes(len));
        let id = self.install(Page::huge(data, class));
        SpanHandle::new(id, 0, len as u32)
    }

    fn write(&mut self, handle: SpanHandle, parts: &[&[u8]]) {
        let page = &mut self.pages[handle.page() as usize];
        let mut at = handle.offset() as usize;
        for part in parts {
            page.data[at..at + part.len()].copy_from_slice(part);
            at += part.len();
        }
    }

    fn install(&mut self, page: Page) -> u32 {
        match self.vacant.pop() {
            Some(id) => {
                self.pages[id as usize] = page;
                id
            }
            None => {
                self.pages.push(page);
                (self.pages.len() - 1) as u32
            }
        }
    }

    fn release_page(&mut self, id: u32) {
        let page = &mut self.pages[id as usize];
        let (classes, bytes) = page.drain_free();
        let data = std::mem::take(&mut page.data);
        *page = Page::vacant();
        self.forget_free(id, classes, bytes);
        self.vacant.push(id);
        self.vmm.return_page(data);
    }

    fn forget_free(&mut self, id: u32, classes: Vec<usize>, bytes: usize) {
        for class in classes {
            self.forget_class(id, class);
        }
        self.free_list_bytes -= bytes;
        self.vmm.sub_free_list(bytes);
    }

    fn forget_class(&mut self, id: u32, class: usize) {
        if let Some(pages) = self.class_pages.get_mut(&class) {
            pages.remove(&id);
            if pages.is_empty() {
                self.class_pages.remove(&class);
            }
        }
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        for page in self.pages.drain(..) {
            if page.is_vacant() {
                continue;
            }
            if page.huge {
                self.vmm.return_huge(page.data);
            } else {
                self.vmm.return_page(page.data);
            }
        }
        self.vmm.sub_logical(self.logical_bytes);
        self.vmm.sub_free_list(self.free_list_bytes);
    }
}
