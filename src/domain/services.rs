//! Collaborator interfaces used by the crawl loop
//!
//! Transport and per-item extraction live behind these traits so the loop can
//! be driven by scripted fakes in tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::content_item::{ContentItem, ContentKind};
use crate::domain::crawl_state::PageCursor;
use crate::domain::errors::{FetchResult, MaterializeError};

/// What to fetch: the first page of a channel tab, or the page behind a cursor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub channel: String,
    pub kind: ContentKind,
    pub cursor: Option<PageCursor>,
}

impl PageRequest {
    pub fn first_page(channel: impl Into<String>, kind: ContentKind) -> Self {
        Self {
            channel: channel.into(),
            kind,
            cursor: None,
        }
    }

    pub fn is_continuation(&self) -> bool {
        self.cursor.is_some()
    }
}

/// Fetch capability returning the parsed page tree
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch_page(&self, request: &PageRequest) -> FetchResult<serde_json::Value>;
}

/// Full record produced for one kept item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaterializedRecord {
    pub content_id: String,
    pub url: String,
    pub item: ContentItem,
    /// Extra metadata gathered beyond the listing, if any
    pub details: Option<serde_json::Value>,
    pub collected_at: DateTime<Utc>,
}

impl MaterializedRecord {
    /// Record carrying only what the listing already provided
    pub fn from_listing(item: ContentItem) -> Self {
        Self {
            content_id: item.id().to_string(),
            url: item.url(),
            item,
            details: None,
            collected_at: Utc::now(),
        }
    }
}

/// Per-item metadata extraction
#[async_trait]
pub trait ItemMaterializer: Send + Sync {
    async fn materialize(&self, item: &ContentItem) -> Result<MaterializedRecord, MaterializeError>;
}

/// Destination for materialized records, written one complete record at a time
#[async_trait]
pub trait RecordSink: Send + Sync {
    async fn accept(&self, record: &MaterializedRecord) -> anyhow::Result<()>;
}

/// Sink that keeps records in memory
#[derive(Debug, Default)]
pub struct CollectingSink {
    records: tokio::sync::Mutex<Vec<MaterializedRecord>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn records(&self) -> Vec<MaterializedRecord> {
        self.records.lock().await.clone()
    }
}

#[async_trait]
impl RecordSink for CollectingSink {
    async fn accept(&self, record: &MaterializedRecord) -> anyhow::Result<()> {
        self.records.lock().await.push(record.clone());
        Ok(())
    }
}
