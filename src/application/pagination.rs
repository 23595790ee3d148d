//! Offset pagination over filtered, sorted result sets.

use serde::Serialize;

use crate::application::repos::SearchResults;
use crate::domain::Post;

pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// A validated page request: `page >= 1`, `size >= 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub page: u32,
    pub size: u32,
}

impl PageWindow {
    /// Page numbers below 1 become 1, a zero size falls back to [`DEFAULT_PAGE_SIZE`].
    pub fn new(page: u32, size: u32) -> Self {
        Self {
            page: page.max(1),
            size: if size == 0 { DEFAULT_PAGE_SIZE } else { size },
        }
    }

    pub fn offset(&self) -> usize {
        (self.page as usize - 1).saturating_mul(self.size as usize)
    }

    /// Slice bounds for a list of `len` items; out-of-range pages give an empty range.
    pub fn bounds(&self, len: usize) -> (usize, usize) {
        let start = self.offset().min(len);
        let end = start.saturating_add(self.size as usize).min(len);
        (start, end)
    }

    pub fn slice<T: Clone>(&self, items: &[T]) -> Vec<T> {
        let (start, end) = self.bounds(items.len());
        items[start..end].to_vec()
    }

    pub fn take<T>(&self, items: Vec<T>) -> Vec<T> {
        items
            .into_iter()
            .skip(self.offset())
            .take(self.size as usize)
            .collect()
    }
}

impl Default for PageWindow {
    fn default() -> Self {
        Self::new(1, DEFAULT_PAGE_SIZE)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub total: usize,
    pub total_pages: u32,
    pub current: u32,
    pub next: u32,
    pub previous: u32,
    pub page_size: u32,
    pub has_next: bool,
    pub has_previous: bool,
    pub items: Vec<T>,
    /// Only populated when pinned items were split out of the result.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub pinned: Vec<T>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unpinned: Vec<T>,
}

impl<T> Page<T> {
    /// Build page metadata around an already-sliced list of items.
    pub fn assemble(items: Vec<T>, total: usize, window: PageWindow) -> Self {
        let size = window.size as usize;
        let total_pages = u32::try_from(total.div_ceil(size)).unwrap_or(u32::MAX);
        let current = window.page;
        Self {
            total,
            total_pages,
            current,
            next: current.saturating_add(1).min(total_pages).max(1),
            previous: current.saturating_sub(1).min(total_pages).max(1),
            page_size: window.size,
            has_next: current < total_pages,
            has_previous: current > 1,
            items,
            pinned: Vec::new(),
            unpinned: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T: Clone> Page<T> {
    /// Partition `items` into pinned and unpinned groups, preserving order.
    pub fn split_by(mut self, is_pinned: impl Fn(&T) -> bool) -> Self {
        let (pinned, unpinned) = self.items.iter().cloned().partition(|item| is_pinned(item));
        self.pinned = pinned;
        self.unpinned = unpinned;
        self
    }
}

impl Page<Post> {
    /// Wrap a store's search output. The store has already applied the window.
    pub fn from_results(results: SearchResults, window: PageWindow, split_pinned: bool) -> Self {
        let page = Self::assemble(results.posts, results.total, window);
        if split_pinned {
            page.split_by(|post| post.pinned)
        } else {
            page
        }
    }
}

/// Slice `items` for the requested page and describe the result.
pub fn paginate<T: Clone>(items: &[T], total: usize, page: u32, page_size: u32) -> Page<T> {
    let window = PageWindow::new(page, page_size);
    Page::assemble(window.slice(items), total, window)
}
