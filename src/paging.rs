//! Page arithmetic for offset-based paging over a queue or collection.

/// Number of pages needed to cover `total - offset` items.
///
/// Returns 0 when `page_size` is 0 or `offset` is past the end.
pub fn page_count(total: u64, page_size: u64, offset: u64) -> u64 {
    if page_size == 0 || offset >= total {
        return 0;
    }
    (total - offset).div_ceil(page_size)
}

/// Position within a paged collection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageInfo {
    pub total: u64,
    pub page_size: u64,
    pub offset: u64,
}

impl PageInfo {
    pub fn new(total: u64, page_size: u64, offset: u64) -> Self {
        Self {
            total,
            page_size,
            offset,
        }
    }

    pub fn pages(&self) -> u64 {
        page_count(self.total, self.page_size, self.offset)
    }

    /// Offset of the following page, or `None` when this is the last one
    pub fn next_offset(&self) -> Option<u64> {
        let next = self.offset.saturating_add(self.page_size);
        (self.page_size > 0 && next < self.total).then_some(next)
    }
}
