use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::common::PAGE_SIZE;

/// Default number of empty pages kept for reuse.
pub const DEFAULT_MAX_POOLED_PAGES: usize = 256;

/// Point-in-time view of the VMM counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VmmStats {
    /// Bytes held from the heap: pages assigned to arenas plus pooled pages.
    pub heap_bytes: u64,
    /// Bytes of pages currently assigned to arenas.
    pub vmm_bytes: u64,
    /// Requested bytes of all live spans.
    pub logical_bytes: u64,
    /// Size-class bytes sitting in arena free lists.
    pub free_list_bytes: u64,
    pub pages_defragged: u64,
    pub pages_popped: u64,
    pub pages_pooled: u64,
}

/// Process-wide page source shared by every arena.
///
/// The only lock is the pool mutex, taken to pop or return a whole page.
/// Everything else is an atomic counter updated by the arenas.
#[derive(Clone)]
pub struct Vmm {
    inner: Arc<VmmInner>,
}

struct VmmInner {
    pool: Mutex<Vec<Box<[u8]>>>,
    max_pooled_pages: AtomicUsize,
    heap_bytes: AtomicU64,
    vmm_bytes: AtomicU64,
    logical_bytes: AtomicU64,
    free_list_bytes: AtomicU64,
    pages_defragged: AtomicU64,
    pages_popped: AtomicU64,
}

impl Default for Vmm {
    fn default() -> Self {
        Vmm::new(DEFAULT_MAX_POOLED_PAGES)
    }
}

impl Vmm {
    pub fn new(max_pooled_pages: usize) -> Self {
        Vmm {
            inner: Arc::new(VmmInner {
                pool: Mutex::new(Vec::new()),
                max_pooled_pages: AtomicUsize::new(max_pooled_pages),
                heap_bytes: AtomicU64::new(0),
                vmm_bytes: AtomicU64::new(0),
                logical_bytes: AtomicU64::new(0),
                free_list_bytes: AtomicU64::new(0),
                pages_defragged: AtomicU64::new(0),
                pages_popped: AtomicU64::new(0),
            }),
        }
    }

    pub fn stats(&self) -> VmmStats {
        VmmStats {
            heap_bytes: self.inner.heap_bytes.load(Ordering::Relaxed),
            vmm_bytes: self.inner.vmm_bytes.load(Ordering::Relaxed),
            logical_bytes: self.inner.logical_bytes.load(Ordering::Relaxed),
            free_list_bytes: self.inner.free_list_bytes.load(Ordering::Relaxed),
            pages_defragged: self.inner.pages_defragged.load(Ordering::Relaxed),
            pages_popped: self.inner.pages_popped.load(Ordering::Relaxed),
            pages_pooled: self.inner.pool.lock().len() as u64,
        }
    }

    #[inline]
    pub fn logical_bytes(&self) -> u64 {
        self.inner.logical_bytes.load(Ordering::Relaxed)
    }

    pub fn max_pooled_pages(&self) -> usize {
        self.inner.max_pooled_pages.load(Ordering::Relaxed)
    }

    /// Changes the pool capacity, handing surplus pages back to the OS.
    pub fn set_max_pooled_pages(&self, max_pooled_pages: usize) {
        self.inner
            .max_pooled_pages
            .store(max_pooled_pages, Ordering::Relaxed);
        let mut pool = self.inner.pool.lock();
        if pool.len() > max_pooled_pages {
            let surplus = pool.len() - max_pooled_pages;
            pool.truncate(max_pooled_pages);
            self.sub(&self.inner.heap_bytes, (surplus * PAGE_SIZE) as u64);
        }
    }

    /// Returns every pooled page to the OS. Yields the number of pages released.
    pub fn release_pooled(&self) -> usize {
        let mut pool = self.inner.pool.lock();
        let released = pool.len();
        pool.clear();
        self.sub(&self.inner.heap_bytes, (released * PAGE_SIZE) as u64);
        released
    }

    /// Hands out one page, reusing a pooled page when one is available.
    pub(crate) fn pop_page(&self) -> Box<[u8]> {
        let pooled = self.inner.pool.lock().pop();
        let page = match pooled {
            Some(page) => page,
            None => {
                self.inner
                    .heap_bytes
                    .fetch_add(PAGE_SIZE as u64, Ordering::Relaxed);
                self.inner.pages_popped.fetch_add(1, Ordering::Relaxed);
                vec![0u8; PAGE_SIZE].into_boxed_slice()
            }
        };
        self.inner
            .vmm_bytes
            .fetch_add(PAGE_SIZE as u64, Ordering::Relaxed);
        page
    }

    /// Takes an empty page back. It is pooled unless the pool is full.
    pub(crate) fn return_page(&self, page: Box<[u8]>) {
        self.sub(&self.inner.vmm_bytes, PAGE_SIZE as u64);
        let mut pool = self.inner.pool.lock();
        if pool.len() < self.max_pooled_pages() {
            pool.push(page);
        } else {
            drop(pool);
            self.sub(&self.inner.heap_bytes, PAGE_SIZE as u64);
        }
    }

    /// Allocates a dedicated multi-page buffer straight from the heap.
    pub(crate) fn pop_huge(&self, bytes: usize) -> Box<[u8]> {
        self.inner
            .heap_bytes
            .fetch_add(bytes as u64, Ordering::Relaxed);
        self.inner
            .vmm_bytes
            .fetch_add(bytes as u64, Ordering::Relaxed);
        self.inner
            .pages_popped
            .fetch_add(bytes.div_ceil(PAGE_SIZE) as u64, Ordering::Relaxed);
        vec![0u8; bytes].into_boxed_slice()
    }

    /// Huge buffers are never pooled.
    pub(crate) fn return_huge(&self, buffer: Box<[u8]>) {
        let bytes = buffer.len() as u64;
        drop(buffer);
        self.sub(&self.inner.vmm_bytes, bytes);
        self.sub(&self.inner.heap_bytes, bytes);
    }

    pub(crate) fn add_logical(&self, bytes: usize) {
        self.inner
            .logical_bytes
            .fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub(crate) fn sub_logical(&self, bytes: usize) {
        self.sub(&self.inner.logical_bytes, bytes as u64);
    }

    pub(crate) fn add_free_list(&self, bytes: usize) {
        self.inner
            .free_list_bytes
            .fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub(crate) fn sub_free_list(&self, bytes: usize) {
        self.sub(&self.inner.free_list_bytes, bytes as u64);
    }

    pub(crate) fn record_defragged_page(&self) {
        self.inner.pages_defragged.fetch_add(1, Ordering::Relaxed);
    }

    // counters never go below zero, even if callers race on a drop
    fn sub(&self, counter: &AtomicU64, bytes: u64) {
        let _ = counter.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
            Some(current.saturating_sub(bytes))
        });
    }
}
