//! Response envelopes.

use crate::store::Paginated;
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Serialize)]
pub struct PageMeta {
    pub current_page: u64,
    pub last_page: u64,
    pub per_page: u64,
    pub total: u64,
}

/// `{data: [...], meta: {current_page, last_page, per_page, total}}`
#[derive(Debug, Serialize)]
pub struct PageResponse {
    pub data: Vec<Value>,
    pub meta: PageMeta,
}

impl PageResponse {
    /// Wrap a page whose records were already transformed into `data`.
    pub fn new(page: &Paginated, data: Vec<Value>) -> Self {
        Self {
            data,
            meta: PageMeta {
                current_page: page.page,
                last_page: page.last_page(),
                per_page: page.per_page,
                total: page.total,
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BulkResponse {
    pub message: String,
    pub operation: &'static str,
    pub affected_count: usize,
    pub requested_count: usize,
}
