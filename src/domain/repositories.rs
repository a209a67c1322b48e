//! Repository interfaces for ingest tracking

use anyhow::Result;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};

use crate::domain::ingest::{IngestRecord, IngestScope, IngestStatus};

#[async_trait]
pub trait IngestRepository: Send + Sync {
    async fn find(&self, scope: &IngestScope, content_id: &str) -> Result<Option<IngestRecord>>;

    /// Insert or replace the record for `record.content_id`
    async fn save(&self, scope: &IngestScope, record: &IngestRecord) -> Result<()>;

    /// Ids whose status keeps them out of a new crawl
    async fn processed_ids(&self, scope: &IngestScope) -> Result<HashSet<String>>;

    async fn status_counts(&self, scope: &IngestScope) -> Result<HashMap<IngestStatus, u64>>;
}
