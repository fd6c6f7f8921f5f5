// src/pagination.rs
use serde::Serialize;

use crate::error::ValidationError;

/// A 1-based page number and a page size, both known to be at least 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    page: u32,
    page_size: u32,
}

impl PageRequest {
    pub fn new(page: u32, page_size: u32) -> Result<Self, ValidationError> {
        let mut errors = ValidationError::default();
        if page == 0 {
            errors.push("page", "page must be at least 1");
        }
        if page_size == 0 {
            errors.push("pageSize", "pageSize must be at least 1");
        }
        errors.into_result()?;
        Ok(PageRequest { page, page_size })
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn offset(&self) -> usize {
        (self.page as usize - 1).saturating_mul(self.page_size as usize)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    pub records: Vec<T>,
    pub total: usize,
}

/// Slices `items` for the requested page. `total` is the length of `items`,
/// whatever the page holds; a page past the end is empty.
pub fn paginate<T>(items: Vec<T>, request: PageRequest) -> Page<T> {
    let total = items.len();
    let records = items
        .into_iter()
        .skip(request.offset())
        .take(request.page_size() as usize)
        .collect();
    Page { records, total }
}
