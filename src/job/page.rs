// src/job/page.rs

//! 1-based pagination.

use serde::Serialize;

use crate::errors::{EvalflowError, Result};

pub const DEFAULT_PAGE: usize = 1;
pub const DEFAULT_PAGE_SIZE: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    page: usize,
    size: usize,
}

impl PageRequest {
    /// Both `page` and `size` must be >= 1.
    pub fn new(page: usize, size: usize) -> Result<Self> {
        if page == 0 || size == 0 {
            return Err(EvalflowError::InvalidPage { page, size });
        }
        Ok(Self { page, size })
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Cut the requested page out of an already-ordered collection. A page
    /// past the end is empty.
    pub fn slice<T: Clone>(&self, items: &[T]) -> Page<T> {
        let start = (self.page - 1).saturating_mul(self.size);
        let page_items = items
            .iter()
            .skip(start)
            .take(self.size)
            .cloned()
            .collect();

        Page {
            items: page_items,
            page: self.page,
            size: self.size,
            total: items.len(),
        }
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            size: DEFAULT_PAGE_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub size: usize,
    /// Size of the whole collection.
    pub total: usize,
}

impl<T> Page<T> {
    pub fn total_pages(&self) -> usize {
        self.total.div_ceil(self.size.max(1))
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
