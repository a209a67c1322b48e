//! Item materializers
//!
//! `WatchPageMaterializer` opens the watch page of each kept video, short or
//! live stream and reads the player response. Other kinds are recorded from
//! their listing data. `ListingMaterializer` never touches the network.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::domain::content_item::ContentItem;
use crate::domain::errors::{FetchError, MaterializeError};
use crate::domain::platform;
use crate::domain::services::{ItemMaterializer, MaterializedRecord};
use crate::infrastructure::http_client::HttpClient;
use crate::infrastructure::parsing::numbers::normalize_count;
use crate::infrastructure::parsing::tree_path::{lookup, lookup_str, ExpectedType};
use crate::infrastructure::parsing::PageDataExtractor;

/// Playability statuses that mean the item will never be readable
const UNAVAILABLE_STATUSES: [&str; 3] = ["ERROR", "UNPLAYABLE", "LOGIN_REQUIRED"];

/// Details read from a watch page's player response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoDetails {
    pub title: Option<String>,
    pub description: Option<String>,
    pub length_seconds: Option<u64>,
    pub view_count: Option<u64>,
    pub keywords: Vec<String>,
    pub is_live: bool,
    pub publish_date: Option<String>,
    pub category: Option<String>,
    pub is_family_safe: Option<bool>,
}

/// Read `VideoDetails` from a player response, or explain why the item is unavailable
pub fn video_details(content_id: &str, player: &Value) -> Result<VideoDetails, MaterializeError> {
    let status = lookup_str(player, "playabilityStatus.status").unwrap_or("OK");
    if UNAVAILABLE_STATUSES.contains(&status) {
        let reason = lookup_str(player, "playabilityStatus.reason").unwrap_or(status);
        return Err(MaterializeError::unavailable(content_id, reason));
    }

    let Some(details) = lookup(player, "videoDetails", ExpectedType::Mapping) else {
        return Err(MaterializeError::transient(content_id, "player response has no videoDetails"));
    };
    let microformat = lookup(player, "microformat.playerMicroformatRenderer", ExpectedType::Mapping);

    let text = |node: &Value, key: &str| node.get(key).and_then(Value::as_str).map(str::to_string);
    let length_seconds = microformat
        .and_then(|m| text(m, "lengthSeconds"))
        .or_else(|| text(details, "lengthSeconds"))
        .and_then(|s| s.parse().ok());

    Ok(VideoDetails {
        title: text(details, "title"),
        description: text(details, "shortDescription"),
        length_seconds,
        view_count: text(details, "viewCount").as_deref().and_then(normalize_count),
        keywords: details
            .get("keywords")
            .and_then(Value::as_array)
            .map(|words| words.iter().filter_map(Value::as_str).map(str::to_string).collect())
            .unwrap_or_default(),
        is_live: details
            .get("isLive")
            .or_else(|| details.get("isLiveContent"))
            .and_then(Value::as_bool)
            .unwrap_or(false),
        publish_date: microformat.and_then(|m| text(m, "publishDate")),
        category: microformat.and_then(|m| text(m, "category")),
        is_family_safe: microformat.and_then(|m| m.get("isFamilySafe")).and_then(Value::as_bool),
    })
}

pub struct WatchPageMaterializer {
    http: Arc<HttpClient>,
    extractor: PageDataExtractor,
    cancel: CancellationToken,
}

impl WatchPageMaterializer {
    pub fn new(http: Arc<HttpClient>, extractor: PageDataExtractor) -> Self {
        Self {
            http,
            extractor,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

#[async_trait]
impl ItemMaterializer for WatchPageMaterializer {
    async fn materialize(&self, item: &ContentItem) -> Result<MaterializedRecord, MaterializeError> {
        if !item.is_video_like() {
            return Ok(MaterializedRecord::from_listing(item.clone()));
        }

        let id = item.id();
        let url = platform::watch_url(id);
        let html = self.http.get_text(&url, &self.cancel).await.map_err(|e| match e {
            FetchError::NotFound { .. } => MaterializeError::unavailable(id, "watch page not found"),
            other => MaterializeError::transient(id, other.to_string()),
        })?;
        let player = self
            .extractor
            .player_response(&html)
            .map_err(|e| MaterializeError::transient(id, e.to_string()))?;
        let details = video_details(id, &player)?;
        debug!(id, title = ?details.title, "materialized from watch page");

        let details = serde_json::to_value(&details).map_err(|e| MaterializeError::transient(id, e.to_string()))?;
        Ok(MaterializedRecord {
            content_id: id.to_string(),
            url: item.url(),
            item: item.clone(),
            details: Some(details),
            collected_at: Utc::now(),
        })
    }
}

/// Records every item from its listing data alone
#[derive(Debug, Clone, Copy, Default)]
pub struct ListingMaterializer;

#[async_trait]
impl ItemMaterializer for ListingMaterializer {
    async fn materialize(&self, item: &ContentItem) -> Result<MaterializedRecord, MaterializeError> {
        Ok(MaterializedRecord::from_listing(item.clone()))
    }
}
