use crate::service::{MemoryService, SearchRequest};
use async_trait::async_trait;
use loom_core::{Memory, MemoryEntry, Result};
use std::sync::Arc;

/// Binds a [`MemoryService`] to one app/user pair so callers can use the
/// simpler `loom_core::Memory` contract without repeating scope on every
/// search, and drops the richer `MemoryEntry::timestamp` that
/// `loom_core::MemoryEntry` has no field for.
pub struct ScopedMemory {
    service: Arc<dyn MemoryService>,
    app_name: String,
    user_id: String,
}

impl ScopedMemory {
    pub fn new(service: Arc<dyn MemoryService>, app_name: String, user_id: String) -> Self {
        Self { service, app_name, user_id }
    }
}

#[async_trait]
impl Memory for ScopedMemory {
    async fn search(&self, query: &str) -> Result<Vec<MemoryEntry>> {
        let resp = self
            .service
            .search(SearchRequest { query: query.to_string(), user_id: self.user_id.clone(), app_name: self.app_name.clone() })
            .await?;
        Ok(resp.memories.into_iter().map(|e| MemoryEntry { content: e.content, author: e.author }).collect())
    }
}
