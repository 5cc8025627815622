use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

/// A 1-based page window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: u32,
    pub limit: u32,
}

impl Page {
    pub fn new(page: u32, limit: u32) -> Self {
        Self {
            page: page.max(1),
            limit: limit.max(1),
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page as i64 - 1) * self.limit as i64
    }

    pub fn limit(&self) -> i64 {
        self.limit as i64
    }

    pub fn total_pages(&self, total: i64) -> u32 {
        ((total as f64) / (self.limit as f64)).ceil() as u32
    }

    /// Slice an in-memory, already sorted collection to this window.
    pub fn slice<T: Clone>(&self, items: &[T]) -> Vec<T> {
        items
            .iter()
            .skip(self.offset() as usize)
            .take(self.limit as usize)
            .cloned()
            .collect()
    }
}

#[derive(Debug, Default, Deserialize, Validate, IntoParams)]
pub struct PageQuery {
    /// Page number, starting at 1
    #[validate(range(min = 1))]
    pub page: Option<u32>,
    /// Items per page
    #[validate(range(min = 1, max = 100))]
    pub limit: Option<u32>,
}

impl PageQuery {
    pub fn to_page(&self, default_limit: u32) -> Page {
        Page::new(self.page.unwrap_or(1), self.limit.unwrap_or(default_limit))
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub limit: u32,
    pub total_pages: u32,
}

impl<T> PaginatedResponse<T> {
    pub fn new(data: Vec<T>, total: i64, page: Page) -> Self {
        Self {
            data,
            total,
            page: page.page,
            limit: page.limit,
            total_pages: page.total_pages(total),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_offsets() {
        let page = Page::new(3, 20);
        assert_eq!(page.offset(), 40);
        assert_eq!(page.total_pages(41), 3);
        assert_eq!(page.total_pages(0), 0);
    }

    #[test]
    fn test_page_clamps_zero() {
        let page = Page::new(0, 0);
        assert_eq!(page, Page { page: 1, limit: 1 });
    }

    #[test]
    fn test_page_slice() {
        let items: Vec<u32> = (0..10).collect();
        assert_eq!(Page::new(2, 4).slice(&items), vec![4, 5, 6, 7]);
        assert!(Page::new(4, 4).slice(&items).is_empty());
    }
}
