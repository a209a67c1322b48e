//! Channel tab fetcher
//!
//! The first page of a tab is the tab's HTML with embedded initial data;
//! every later page is a browse API call carrying the continuation token and
//! the session values learned from that first page.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::domain::channel::ChannelMetadata;
use crate::domain::content_item::ContentKind;
use crate::domain::errors::{FetchError, FetchResult};
use crate::domain::platform;
use crate::domain::services::{PageFetcher, PageRequest};
use crate::infrastructure::config::InnertubeConfig;
use crate::infrastructure::http_client::HttpClient;
use crate::infrastructure::parsing::{ChannelMetadataParser, InnertubeSession, LocateContext, PageDataExtractor};

/// Request body for one continuation page
pub fn browse_payload(config: &InnertubeConfig, session: &InnertubeSession, token: &str) -> Value {
    json!({
        "context": {
            "client": {
                "clientName": config.client_name,
                "clientVersion": session.client_version,
                "hl": config.hl,
                "gl": config.gl,
            }
        },
        "continuation": token,
    })
}

pub fn browse_url(session: &InnertubeSession) -> String {
    format!("{}?key={}", platform::BROWSE_API_URL, session.api_key)
}

pub struct InnertubeFetcher {
    http: Arc<HttpClient>,
    extractor: PageDataExtractor,
    metadata_parser: ChannelMetadataParser,
    config: InnertubeConfig,
    /// Session per channel handle, learned from its first page
    sessions: RwLock<HashMap<String, InnertubeSession>>,
    cancel: CancellationToken,
}

impl InnertubeFetcher {
    pub fn new(http: Arc<HttpClient>, config: InnertubeConfig) -> Self {
        Self {
            http,
            extractor: PageDataExtractor::new(config.clone()),
            metadata_parser: ChannelMetadataParser::default(),
            config,
            sessions: RwLock::new(HashMap::new()),
            cancel: CancellationToken::new(),
        }
    }

    /// Abort in-flight requests when `cancel` fires
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    async fn session_for(&self, channel: &str) -> InnertubeSession {
        match self.sessions.read().await.get(channel) {
            Some(session) => session.clone(),
            None => {
                debug!(channel, "no session learned yet, using configured fallbacks");
                InnertubeSession::fallback(&self.config)
            }
        }
    }

    async fn fetch_first_page(&self, channel: &str, kind: ContentKind) -> FetchResult<Value> {
        let url = platform::channel_tab_url(channel, kind.tab_path());
        let html = self.http.get_text(&url, &self.cancel).await?;
        let page = self
            .extractor
            .extract(&html)
            .map_err(|source| FetchError::PageData { url: url.clone(), source })?;

        if page.session.from_page {
            debug!(channel, client_version = %page.session.client_version, "learned session from page");
        }
        self.sessions
            .write()
            .await
            .insert(channel.to_string(), page.session);
        Ok(page.initial_data)
    }

    async fn fetch_continuation(&self, channel: &str, token: &str) -> FetchResult<Value> {
        let session = self.session_for(channel).await;
        let payload = browse_payload(&self.config, &session, token);
        self.http.post_json(&browse_url(&session), &payload, &self.cancel).await
    }

    /// Fetch and parse the channel's metadata from its about page
    pub async fn fetch_channel_metadata(&self, channel: &str) -> FetchResult<ChannelMetadata> {
        let url = platform::channel_tab_url(channel, "about");
        let html = self.http.get_text(&url, &self.cancel).await?;
        let page = self
            .extractor
            .extract(&html)
            .map_err(|source| FetchError::PageData { url: url.clone(), source })?;
        let context = LocateContext::new(channel, ContentKind::Videos);
        let metadata = self
            .metadata_parser
            .parse_page(&page, &context)
            .map_err(|source| FetchError::PageData { url, source })?;
        info!(
            "Channel {} resolved to {}",
            channel,
            metadata.channel_id.as_deref().unwrap_or("<unknown id>")
        );
        Ok(metadata)
    }
}

#[async_trait]
impl PageFetcher for InnertubeFetcher {
    async fn fetch_page(&self, request: &PageRequest) -> FetchResult<Value> {
        match &request.cursor {
            None => self.fetch_first_page(&request.channel, request.kind).await,
            Some(cursor) => self.fetch_continuation(&request.channel, cursor.token()).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_browse_payload_shape() {
        let config = InnertubeConfig::default();
        let session = InnertubeSession {
            api_key: "key123".to_string(),
            client_version: "2.20250101.00.00".to_string(),
            from_page: true,
        };
        let payload = browse_payload(&config, &session, "tok1");
        assert_eq!(payload["continuation"], "tok1");
        assert_eq!(payload["context"]["client"]["clientName"], "WEB");
        assert_eq!(payload["context"]["client"]["clientVersion"], "2.20250101.00.00");
        assert_eq!(payload["context"]["client"]["hl"], "en");
        assert_eq!(
            browse_url(&session),
            "https://www.youtube.com/youtubei/v1/browse?key=key123"
        );
    }

    #[tokio::test]
    async fn test_unknown_channel_uses_fallback_session() {
        let http = Arc::new(HttpClient::new(crate::infrastructure::config::HttpConfig::default()).unwrap());
        let fetcher = InnertubeFetcher::new(http, InnertubeConfig::default());
        let session = fetcher.session_for("nobody").await;
        assert!(!session.from_page);
        assert_eq!(session.api_key, InnertubeConfig::default().fallback_api_key);
    }
}
