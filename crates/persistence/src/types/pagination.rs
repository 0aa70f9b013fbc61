//! Offset pagination of search results.

use serde::{Deserialize, Serialize};

/// One page of search results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    /// The items in this page.
    pub items: Vec<T>,

    /// Number of matches across all pages.
    pub total: u64,

    /// Offset of the first item.
    pub offset: u32,

    /// The page size that was applied.
    pub count: u32,
}

impl<T> Page<T> {
    /// Creates a page.
    pub fn new(items: Vec<T>, total: u64, offset: u32, count: u32) -> Self {
        Self {
            items,
            total,
            offset,
            count,
        }
    }

    /// Returns true if this page has no items.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns the number of items in this page.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if matches exist beyond this page.
    pub fn has_next(&self) -> bool {
        u64::from(self.offset) + (self.items.len() as u64) < self.total
    }

    /// Returns the offset of the next page, if there is one.
    pub fn next_offset(&self) -> Option<u32> {
        self.has_next().then(|| self.offset + self.items.len() as u32)
    }
}
