use serde::Serialize;

pub(crate) const MAX_PAGE_LIMIT: i64 = 1000;

pub(crate) const fn default_limit() -> i64 {
    100
}

/// `skip`/`limit` from a query string, clamped to what the repositories accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PageWindow {
    pub(crate) skip: i64,
    pub(crate) limit: i64,
}

impl PageWindow {
    pub(crate) fn new(skip: i64, limit: i64) -> Self {
        Self { skip: skip.max(0), limit: limit.clamp(1, MAX_PAGE_LIMIT) }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct PaginatedResponse<T> {
    pub(crate) items: Vec<T>,
    pub(crate) total_count: i64,
    pub(crate) skip: i64,
    pub(crate) limit: i64,
}

impl<T> PaginatedResponse<T> {
    pub(crate) fn new(items: Vec<T>, total_count: i64, window: PageWindow) -> Self {
        Self { items, total_count, skip: window.skip, limit: window.limit }
    }
}
