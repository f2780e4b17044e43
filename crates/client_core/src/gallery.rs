//! Paginated, filterable view over previously classified documents.

use std::sync::Arc;

use shared::{domain::DocumentId, protocol::DocumentSummary};
use tracing::{info, warn};

use crate::{config::DEFAULT_PAGE_LIMIT, error::ClientError, DocumentApi};

pub const PAGE_LIMIT_CHOICES: &[u32] = &[10, 25, 50];

#[derive(Debug, Clone, PartialEq)]
pub struct GalleryFilter {
    pub search: String,
    /// `None` matches every category.
    pub category: Option<String>,
    pub min_confidence: f64,
    pub max_confidence: f64,
}

impl Default for GalleryFilter {
    fn default() -> Self {
        Self {
            search: String::new(),
            category: None,
            min_confidence: 0.0,
            max_confidence: 1.0,
        }
    }
}

impl GalleryFilter {
    pub fn matches(&self, doc: &DocumentSummary) -> bool {
        let search = self.search.to_lowercase();
        doc.original_name.to_lowercase().contains(&search)
            && self
                .category
                .as_deref()
                .map_or(true, |category| doc.classification == category)
            && doc.confidence >= self.min_confidence
            && doc.confidence <= self.max_confidence
    }

    pub fn apply<'a>(&self, docs: &'a [DocumentSummary]) -> Vec<&'a DocumentSummary> {
        docs.iter().filter(|doc| self.matches(doc)).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    page: u32,
    limit: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_LIMIT)
    }
}

impl Pagination {
    pub fn new(limit: u32) -> Self {
        Self {
            page: 1,
            limit: limit.max(1),
        }
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn has_prev(&self) -> bool {
        self.page > 1
    }

    /// A further page can only exist when the last fetch filled the page.
    pub fn has_next(&self, fetched: usize) -> bool {
        fetched >= self.limit as usize
    }

    pub fn prev(&mut self) -> bool {
        if !self.has_prev() {
            return false;
        }
        self.page -= 1;
        true
    }

    pub fn next(&mut self, fetched: usize) -> bool {
        if !self.has_next(fetched) {
            return false;
        }
        match self.page.checked_add(1) {
            Some(page) => {
                self.page = page;
                true
            }
            None => false,
        }
    }

    pub fn go_to(&mut self, page: u32) {
        self.page = page.max(1);
    }

    /// Changing the page size starts over from the first page.
    pub fn set_limit(&mut self, limit: u32) {
        self.limit = limit.max(1);
        self.page = 1;
    }
}

/// Moves the element at `from` so it ends up at index `to`, shifting the
/// elements in between.
pub fn move_item<T>(items: &mut [T], from: usize, to: usize) {
    if from >= items.len() || to >= items.len() || from == to {
        return;
    }
    if from < to {
        items[from..=to].rotate_left(1);
    } else {
        items[to..=from].rotate_right(1);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    NotDeleted { reason: String },
}

pub struct Gallery {
    api: Arc<dyn DocumentApi>,
    pagination: Pagination,
    docs: Vec<DocumentSummary>,
}

impl Gallery {
    pub fn new(api: Arc<dyn DocumentApi>, pagination: Pagination) -> Self {
        Self {
            api,
            pagination,
            docs: Vec::new(),
        }
    }

    pub fn pagination(&self) -> Pagination {
        self.pagination
    }

    pub fn docs(&self) -> &[DocumentSummary] {
        &self.docs
    }

    /// Fetches the current page, replacing whatever was loaded before.
    pub async fn load(&mut self) -> Result<&[DocumentSummary], ClientError> {
        let docs = self
            .api
            .list_documents(self.pagination.page(), self.pagination.limit())
            .await?;
        self.docs = docs;
        Ok(&self.docs)
    }

    pub fn has_next_page(&self) -> bool {
        self.pagination.has_next(self.docs.len())
    }

    pub async fn next_page(&mut self) -> Result<bool, ClientError> {
        if !self.pagination.next(self.docs.len()) {
            return Ok(false);
        }
        self.load().await?;
        Ok(true)
    }

    pub async fn prev_page(&mut self) -> Result<bool, ClientError> {
        if !self.pagination.prev() {
            return Ok(false);
        }
        self.load().await?;
        Ok(true)
    }

    pub async fn set_limit(&mut self, limit: u32) -> Result<(), ClientError> {
        self.pagination.set_limit(limit);
        self.load().await?;
        Ok(())
    }

    pub fn filtered(&self, filter: &GalleryFilter) -> Vec<&DocumentSummary> {
        filter.apply(&self.docs)
    }

    /// Moves `active` to the position currently held by `over`. Positions
    /// are taken from the full list, so a filtered view reorders correctly.
    pub fn reorder(&mut self, active: &DocumentId, over: &DocumentId) -> bool {
        if active == over {
            return false;
        }
        let Some(from) = self.docs.iter().position(|doc| &doc.id == active) else {
            return false;
        };
        let Some(to) = self.docs.iter().position(|doc| &doc.id == over) else {
            return false;
        };
        move_item(&mut self.docs, from, to);
        true
    }

    /// Deletes remotely, then drops the document from the loaded page.
    pub async fn delete(&mut self, id: &DocumentId) -> DeleteOutcome {
        match self.api.delete_document(id).await {
            Ok(()) => {
                self.docs.retain(|doc| &doc.id != id);
                info!(document_id = %id, "document deleted");
                DeleteOutcome::Deleted
            }
            Err(err) => {
                warn!(document_id = %id, error = %err, "failed to delete document");
                DeleteOutcome::NotDeleted {
                    reason: err.to_string(),
                }
            }
        }
    }
}

pub fn format_size(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = 1024.0 * 1024.0;
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / KB)
    } else {
        format!("{:.1} MB", bytes as f64 / MB)
    }
}

pub fn format_confidence(fraction: f64) -> String {
    format!("{:.1}%", fraction * 100.0)
}

#[cfg(test)]
#[path = "tests/gallery_tests.rs"]
mod tests;
