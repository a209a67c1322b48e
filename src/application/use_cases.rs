//! Application use cases behind the command line
//!
//! Each use case wires the configured transport, ingest store and sinks
//! around the pagination crawler.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::pagination_crawler::{CrawlRequest, PaginationCrawler};
use crate::domain::channel::ChannelMetadata;
use crate::domain::content_item::ContentKind;
use crate::domain::crawl_state::CrawlReport;
use crate::domain::ingest::{IngestEvent, IngestRecord, IngestScope, IngestStateMachine, IngestStatus};
use crate::domain::repositories::IngestRepository;
use crate::domain::services::{ItemMaterializer, MaterializedRecord, PageFetcher, RecordSink};
use crate::infrastructure::config::AppConfig;
use crate::infrastructure::database_connection::DatabaseConnection;
use crate::infrastructure::http_client::HttpClient;
use crate::infrastructure::ingest_repository::{InMemoryIngestRepository, SqliteIngestRepository};
use crate::infrastructure::innertube_client::InnertubeFetcher;
use crate::infrastructure::materializer::{ListingMaterializer, WatchPageMaterializer};
use crate::infrastructure::parsing::PageDataExtractor;

/// Writes each record as one JSON line
pub struct JsonLinesSink {
    writer: Mutex<Box<dyn AsyncWrite + Send + Unpin>>,
    written: AtomicUsize,
}

impl JsonLinesSink {
    pub fn new(writer: Box<dyn AsyncWrite + Send + Unpin>) -> Self {
        Self {
            writer: Mutex::new(writer),
            written: AtomicUsize::new(0),
        }
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(tokio::io::stdout()))
    }

    /// Append to `path`, creating it and its parent directory as needed
    pub async fn to_file(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create output directory {}", parent.display()))?;
        }
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .with_context(|| format!("Failed to open output file {}", path.display()))?;
        Ok(Self::new(Box::new(file)))
    }

    pub fn written(&self) -> usize {
        self.written.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl RecordSink for JsonLinesSink {
    async fn accept(&self, record: &MaterializedRecord) -> Result<()> {
        let mut line = serde_json::to_string(record).context("Failed to serialize record")?;
        line.push('\n');

        let mut writer = self.writer.lock().await;
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
        self.written.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// One channel tab to crawl
#[derive(Debug, Clone)]
pub struct CrawlOptions {
    pub channel: String,
    pub kind: ContentKind,
    /// Overrides the configured per-run cap
    pub max_items: Option<usize>,
    pub reingest: bool,
}

impl CrawlOptions {
    pub fn new(channel: impl Into<String>, kind: ContentKind) -> Self {
        Self {
            channel: channel.into(),
            kind,
            max_items: None,
            reingest: false,
        }
    }
}

/// Per-status counts of one scope, in status order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusSummary {
    pub channel: String,
    pub kind: ContentKind,
    pub counts: Vec<(IngestStatus, u64)>,
    pub total: u64,
}

pub struct HarvestUseCases {
    config: AppConfig,
    repository: Arc<dyn IngestRepository>,
    state_machine: IngestStateMachine,
}

impl HarvestUseCases {
    pub fn new(config: AppConfig, repository: Arc<dyn IngestRepository>) -> Self {
        let state_machine = IngestStateMachine::new(config.crawl.item_retry_budget);
        Self {
            config,
            repository,
            state_machine,
        }
    }

    /// Use cases over the SQLite ingest store named by the configuration
    pub async fn open(config: AppConfig) -> Result<Self> {
        let database_url = config.database_url()?;
        let db = DatabaseConnection::new(&database_url).await?;
        db.migrate().await?;
        info!("✅ Ingest store ready: {}", database_url);
        let repository = Arc::new(SqliteIngestRepository::new(db.pool().clone()));
        Ok(Self::new(config, repository))
    }

    /// Use cases whose ingest state lives only as long as the process
    pub fn dry_run(config: AppConfig) -> Self {
        Self::new(config, Arc::new(InMemoryIngestRepository::new()))
    }

    pub const fn config(&self) -> &AppConfig {
        &self.config
    }

    fn http_client(&self) -> Result<Arc<HttpClient>> {
        Ok(Arc::new(HttpClient::new(self.config.http.clone())?))
    }

    /// Crawl channel tabs over the network, concurrently.
    /// Setup failures fail the call; each crawl reports its own outcome.
    pub async fn crawl(
        &self,
        requests: &[CrawlOptions],
        listing_only: bool,
        sink: Arc<dyn RecordSink>,
        cancel: CancellationToken,
    ) -> Result<Vec<Result<CrawlReport>>> {
        let http = self.http_client()?;
        let fetcher = Arc::new(
            InnertubeFetcher::new(Arc::clone(&http), self.config.innertube.clone()).with_cancellation(cancel.clone()),
        );
        let materializer: Arc<dyn ItemMaterializer> = if listing_only {
            Arc::new(ListingMaterializer)
        } else {
            Arc::new(
                WatchPageMaterializer::new(http, PageDataExtractor::new(self.config.innertube.clone()))
                    .with_cancellation(cancel.clone()),
            )
        };
        Ok(self.crawl_with(fetcher, materializer, requests, sink, cancel).await)
    }

    /// Crawl with explicit collaborators
    pub async fn crawl_with(
        &self,
        fetcher: Arc<dyn PageFetcher>,
        materializer: Arc<dyn ItemMaterializer>,
        requests: &[CrawlOptions],
        sink: Arc<dyn RecordSink>,
        cancel: CancellationToken,
    ) -> Vec<Result<CrawlReport>> {
        let crawler = PaginationCrawler::from_config(&self.config, fetcher, materializer, Arc::clone(&self.repository))
            .with_sink(sink);

        let requests: Vec<CrawlRequest> = requests
            .iter()
            .map(|options| {
                CrawlRequest::new(options.channel.clone(), options.kind)
                    .with_max_items(options.max_items)
                    .with_reingest(options.reingest)
                    .with_cancellation(cancel.clone())
            })
            .collect();

        crawler
            .crawl_many(&requests)
            .await
            .into_iter()
            .zip(&requests)
            .map(|(result, request)| {
                result.with_context(|| format!("Crawl of {}/{} failed", request.channel, request.kind))
            })
            .collect()
    }

    pub async fn channel_metadata(&self, channel: &str, cancel: CancellationToken) -> Result<ChannelMetadata> {
        let fetcher = InnertubeFetcher::new(self.http_client()?, self.config.innertube.clone()).with_cancellation(cancel);
        let metadata = fetcher
            .fetch_channel_metadata(channel)
            .await
            .with_context(|| format!("Failed to read metadata of {channel}"))?;
        Ok(metadata)
    }

    pub async fn status(&self, channel: &str, kind: ContentKind) -> Result<StatusSummary> {
        let scope = IngestScope::new(channel, kind);
        let counts = self.repository.status_counts(&scope).await?;

        let counts: Vec<(IngestStatus, u64)> = IngestStatus::ALL
            .iter()
            .filter_map(|status| counts.get(status).map(|count| (*status, *count)))
            .collect();
        let total = counts.iter().map(|(_, count)| count).sum();
        Ok(StatusSummary {
            channel: channel.to_string(),
            kind,
            counts,
            total,
        })
    }

    /// Record that `ids` were uploaded by another process; returns how many were stored
    pub async fn mark_uploaded(&self, channel: &str, kind: ContentKind, ids: &[String]) -> Result<usize> {
        let scope = IngestScope::new(channel, kind);
        let now = Utc::now();
        let mut marked = 0;

        for id in ids.iter().map(|id| id.trim()).filter(|id| !id.is_empty()) {
            let mut record = self
                .repository
                .find(&scope, id)
                .await?
                .unwrap_or_else(|| IngestRecord::new(id, now));
            record.apply(&self.state_machine, IngestEvent::AlreadyUploadedExternally, now);
            self.repository.save(&scope, &record).await?;
            marked += 1;
        }

        info!("Marked {} item(s) of {} as uploaded", marked, scope);
        Ok(marked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::content_item::{ContentItem, ShortSummary};
    use tempfile::tempdir;

    fn video(id: &str) -> MaterializedRecord {
        MaterializedRecord::from_listing(ContentItem::Short(ShortSummary {
            id: id.to_string(),
            title: format!("short {id}"),
            view_count: None,
        }))
    }

    #[tokio::test]
    async fn test_json_lines_sink_appends_one_line_per_record() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("out").join("records.jsonl");

        let sink = JsonLinesSink::to_file(&path).await?;
        sink.accept(&video("a")).await?;
        sink.accept(&video("b")).await?;
        assert_eq!(sink.written(), 2);
        drop(sink);

        let content = tokio::fs::read_to_string(&path).await?;
        let ids: Vec<String> = content
            .lines()
            .map(|line| serde_json::from_str::<MaterializedRecord>(line).map(|r| r.content_id))
            .collect::<Result<_, _>>()?;
        assert_eq!(ids, vec!["a", "b"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_mark_uploaded_then_status() -> Result<()> {
        let use_cases = HarvestUseCases::dry_run(AppConfig::default());
        let ids = vec!["a".to_string(), " ".to_string(), "b".to_string()];

        let marked = use_cases.mark_uploaded("chan", ContentKind::Videos, &ids).await?;
        assert_eq!(marked, 2);

        let summary = use_cases.status("chan", ContentKind::Videos).await?;
        assert_eq!(summary.counts, vec![(IngestStatus::Uploaded, 2)]);
        assert_eq!(summary.total, 2);

        let other = use_cases.status("chan", ContentKind::Shorts).await?;
        assert!(other.counts.is_empty());
        assert_eq!(other.total, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_open_creates_sqlite_store() -> Result<()> {
        let dir = tempdir()?;
        let mut config = AppConfig::default();
        config.storage.database_url = format!("sqlite:{}", dir.path().join("ingest.db").display());

        let use_cases = HarvestUseCases::open(config).await?;
        use_cases
            .mark_uploaded("chan", ContentKind::Shorts, &["s1".to_string()])
            .await?;
        let summary = use_cases.status("chan", ContentKind::Shorts).await?;
        assert_eq!(summary.counts, vec![(IngestStatus::Uploaded, 1)]);
        Ok(())
    }
}
