use crate::common::{PAGE_SIZE, SIZE_CLASS_ALIGN};

/// Location of an allocated span inside an [`Arena`](super::Arena).
///
/// Handles are plain values: they stay valid until the span is freed or
/// relocated by a defragmentation pass, which hands out a replacement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpanHandle {
    page: u32,
    offset: u32,
    len: u32,
}

impl SpanHandle {
    pub(crate) fn new(page: u32, offset: u32, len: u32) -> Self {
        SpanHandle { page, offset, len }
    }

    #[inline]
    pub fn page(&self) -> u32 {
        self.page
    }

    #[inline]
    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// Requested length in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.len as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bytes actually reserved for this span.
    #[inline]
    pub fn class(&self) -> usize {
        size_class(self.len as usize)
    }

    pub(crate) fn with_len(&self, len: u32) -> Self {
        SpanHandle { len, ..*self }
    }
}

/// Rounds a request up to its size class. Zero-length requests still occupy
/// the smallest class so that every live span has a distinct offset.
#[inline]
pub fn size_class(len: usize) -> usize {
    let len = len.max(1);
    len.div_ceil(SIZE_CLASS_ALIGN) * SIZE_CLASS_ALIGN
}

/// Whether a request of `len` bytes needs a dedicated multi-page span.
#[inline]
pub fn is_huge(len: usize) -> bool {
    size_class(len) > PAGE_SIZE
}

/// Bytes reserved from the heap for a huge span.
#[inline]
pub(crate) fn huge_span_bytes(len: usize) -> usize {
    size_class(len).div_ceil(PAGE_SIZE) * PAGE_SIZE
}
