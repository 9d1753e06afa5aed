//! Pagination utilities
//!
//! All list endpoints page with a fixed size and a 1-indexed `page` query
//! parameter.

use serde::{Deserialize, Serialize};

/// Page size constant for all pagination
pub const PAGE_SIZE: i64 = 20;

/// Pagination metadata calculated from total results
#[derive(Debug, Clone, Copy)]
pub struct Pagination {
    /// Current page number (1-indexed)
    pub page: i64,
    /// Total number of pages
    pub total_pages: i64,
    /// Offset for SQL LIMIT/OFFSET query
    pub offset: i64,
}

/// Calculate pagination metadata from total results and requested page
///
/// Clamps the page into `[1, total_pages]`.
///
/// # Examples
/// ```
/// use aedpics_api::pagination::calculate_pagination;
///
/// // 45 total results = 3 pages (20 + 20 + 5)
/// let p = calculate_pagination(45, 2);
/// assert_eq!(p.page, 2);
/// assert_eq!(p.total_pages, 3);
/// assert_eq!(p.offset, 20);
///
/// let p = calculate_pagination(45, 99);
/// assert_eq!(p.page, 3);
/// assert_eq!(p.offset, 40);
/// ```
pub fn calculate_pagination(total_results: i64, requested_page: i64) -> Pagination {
    let total_pages = (total_results + PAGE_SIZE - 1) / PAGE_SIZE;
    let page = requested_page.max(1).min(total_pages.max(1));
    let offset = (page - 1) * PAGE_SIZE;

    Pagination {
        page,
        total_pages,
        offset,
    }
}

/// `?page=` query parameter shared by list endpoints
#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default = "default_page")]
    pub page: i64,
}

pub fn default_page() -> i64 {
    1
}

/// Paginated list response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
    pub total_pages: i64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: i64, pagination: Pagination) -> Self {
        Self {
            items,
            total,
            page: pagination.page,
            page_size: PAGE_SIZE,
            total_pages: pagination.total_pages,
        }
    }
}
