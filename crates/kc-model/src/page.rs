//! Pagination types.

use serde::{Deserialize, Serialize};

/// Default page size.
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Largest page size a caller may request.
pub const MAX_PAGE_SIZE: u32 = 200;

/// Zero-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    /// Page index, starting at 0.
    pub page: u32,
    /// Number of elements per page.
    pub size: u32,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 0,
            size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl PageRequest {
    /// Creates a page request.
    #[must_use]
    pub const fn new(page: u32, size: u32) -> Self {
        Self { page, size }
    }

    /// Checks that the size is within `1..=MAX_PAGE_SIZE`.
    ///
    /// # Errors
    ///
    /// Returns a message describing the rejected size.
    pub fn validate(&self) -> Result<(), String> {
        if self.size == 0 || self.size > MAX_PAGE_SIZE {
            return Err(format!(
                "page size must be between 1 and {MAX_PAGE_SIZE}, got {}",
                self.size
            ));
        }
        Ok(())
    }

    /// Number of elements to skip.
    #[must_use]
    pub const fn offset(&self) -> u64 {
        self.page as u64 * self.size as u64
    }
}

/// One page of results with totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    /// Elements on this page.
    pub content: Vec<T>,
    /// Page index.
    pub page: u32,
    /// Requested page size.
    pub size: u32,
    /// Total matching elements across all pages.
    pub total_elements: u64,
    /// Total number of pages.
    pub total_pages: u64,
}

impl<T> Page<T> {
    /// Builds a page, deriving the page count from the total.
    #[must_use]
    pub fn new(content: Vec<T>, request: PageRequest, total_elements: u64) -> Self {
        let total_pages = if request.size == 0 {
            0
        } else {
            total_elements.div_ceil(u64::from(request.size))
        };
        Self {
            content,
            page: request.page,
            size: request.size,
            total_elements,
            total_pages,
        }
    }

    /// Maps the page content, keeping the totals.
    #[must_use]
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            content: self.content.into_iter().map(f).collect(),
            page: self.page,
            size: self.size,
            total_elements: self.total_elements,
            total_pages: self.total_pages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_pages_rounds_up() {
        let page: Page<u8> = Page::new(vec![], PageRequest::new(0, 20), 41);
        assert_eq!(page.total_pages, 3);

        let page: Page<u8> = Page::new(vec![], PageRequest::new(0, 20), 40);
        assert_eq!(page.total_pages, 2);

        let page: Page<u8> = Page::new(vec![], PageRequest::new(0, 20), 0);
        assert_eq!(page.total_pages, 0);
    }

    #[test]
    fn size_bounds() {
        assert!(PageRequest::new(0, 0).validate().is_err());
        assert!(PageRequest::new(0, MAX_PAGE_SIZE + 1).validate().is_err());
        assert!(PageRequest::default().validate().is_ok());
    }

    #[test]
    fn offset_uses_page_and_size() {
        assert_eq!(PageRequest::new(3, 25).offset(), 75);
    }
}
