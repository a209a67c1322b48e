//! End-to-end crawl scenarios driven by scripted fetchers and materializers

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use proptest::prelude::*;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use channel_harvest_lib::application::{
    Clock, CrawlOptions, CrawlRequest, CrawlSettings, FastRandSource, HarvestUseCases, JsonLinesSink, PageDelay,
    PaginationCrawler,
};
use channel_harvest_lib::domain::{
    CollectingSink, ContentItem, ContentKind, FetchError, FetchResult, IngestRecord, IngestRepository, IngestScope,
    IngestStatus, ItemMaterializer, MaterializeError, MaterializedRecord, PageFetcher, PageRequest, RecordSink,
    StopReason,
};
use channel_harvest_lib::infrastructure::{
    AppConfig, BackoffPolicy, CrawlError, DatabaseConnection, InMemoryIngestRepository, SqliteIngestRepository,
};

const CHANNEL: &str = "@scripted";

fn video(id: &str) -> Value {
    json!({ "richItemRenderer": { "content": { "videoRenderer": {
        "videoId": id,
        "title": { "runs": [ { "text": format!("Video {id}") } ] }
    } } } })
}

fn marker(token: &str) -> Value {
    json!({ "continuationItemRenderer": {
        "continuationEndpoint": { "continuationCommand": { "token": token } }
    } })
}

fn first_page(ids: &[&str], next: Option<&str>) -> Value {
    let mut items: Vec<Value> = ids.iter().map(|id| video(id)).collect();
    items.extend(next.map(marker));
    json!({ "contents": { "twoColumnBrowseResultsRenderer": { "tabs": [
        { "tabRenderer": { "title": "Home" } },
        { "tabRenderer": { "selected": true, "content": { "richGridRenderer": { "contents": items } } } }
    ] } } })
}

fn continuation(ids: &[&str], next: Option<&str>) -> Value {
    let mut items: Vec<Value> = ids.iter().map(|id| video(id)).collect();
    items.extend(next.map(marker));
    json!({ "onResponseReceivedActions": [
        { "appendContinuationItemsAction": { "continuationItems": items } }
    ] })
}

fn ids(report_items: &[ContentItem]) -> Vec<&str> {
    report_items.iter().map(ContentItem::id).collect()
}

type PageKey = (String, Option<String>);

/// Replays scripted responses per (channel, token). The last response for a
/// key repeats once the queue is down to one entry.
#[derive(Default)]
struct ScriptedFetcher {
    responses: Mutex<HashMap<PageKey, VecDeque<FetchResult<Value>>>>,
    calls: Mutex<Vec<PageKey>>,
}

impl ScriptedFetcher {
    fn new() -> Self {
        Self::default()
    }

    fn respond(self, channel: &str, token: Option<&str>, response: FetchResult<Value>) -> Self {
        self.responses
            .lock()
            .unwrap()
            .entry((channel.to_string(), token.map(str::to_string)))
            .or_default()
            .push_back(response);
        self
    }

    fn page(self, token: Option<&str>, tree: Value) -> Self {
        self.respond(CHANNEL, token, Ok(tree))
    }

    fn calls(&self) -> Vec<PageKey> {
        self.calls.lock().unwrap().clone()
    }

    fn calls_for(&self, token: Option<&str>) -> usize {
        self.calls()
            .iter()
            .filter(|(_, t)| t.as_deref() == token)
            .count()
    }
}

#[async_trait]
impl PageFetcher for ScriptedFetcher {
    async fn fetch_page(&self, request: &PageRequest) -> FetchResult<Value> {
        let key = (
            request.channel.clone(),
            request.cursor.as_ref().map(|c| c.token().to_string()),
        );
        self.calls.lock().unwrap().push(key.clone());

        let mut responses = self.responses.lock().unwrap();
        let Some(queue) = responses.get_mut(&key) else {
            return Err(FetchError::NotFound {
                url: format!("{}/{:?}", key.0, key.1),
            });
        };
        if queue.len() > 1 {
            queue.pop_front().unwrap()
        } else {
            queue.front().cloned().unwrap()
        }
    }
}

/// Materializes from listing data, with scripted unavailable and flaky ids
#[derive(Default)]
struct ScriptedMaterializer {
    unavailable: HashSet<String>,
    /// Remaining transient failures per id; `u32::MAX` fails forever
    flaky: Mutex<HashMap<String, u32>>,
    cancel_after: Option<(String, CancellationToken)>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedMaterializer {
    fn new() -> Self {
        Self::default()
    }

    fn unavailable(mut self, id: &str) -> Self {
        self.unavailable.insert(id.to_string());
        self
    }

    fn flaky(self, id: &str, failures: u32) -> Self {
        self.flaky.lock().unwrap().insert(id.to_string(), failures);
        self
    }

    fn cancel_after(mut self, id: &str, token: CancellationToken) -> Self {
        self.cancel_after = Some((id.to_string(), token));
        self
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ItemMaterializer for ScriptedMaterializer {
    async fn materialize(&self, item: &ContentItem) -> Result<MaterializedRecord, MaterializeError> {
        let id = item.id();
        self.calls.lock().unwrap().push(id.to_string());

        if self.unavailable.contains(id) {
            return Err(MaterializeError::unavailable(id, "private video"));
        }
        if let Some(remaining) = self.flaky.lock().unwrap().get_mut(id) {
            if *remaining > 0 {
                if *remaining != u32::MAX {
                    *remaining -= 1;
                }
                return Err(MaterializeError::transient(id, "watch page timed out"));
            }
        }
        if let Some((after, token)) = &self.cancel_after {
            if after == id {
                token.cancel();
            }
        }
        Ok(MaterializedRecord::from_listing(item.clone()))
    }
}

/// Clock that returns immediately and records every requested sleep
#[derive(Default)]
struct ManualClock {
    sleeps: Mutex<Vec<Duration>>,
}

impl ManualClock {
    fn new() -> Self {
        Self::default()
    }

    fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

#[async_trait]
impl Clock for ManualClock {
    async fn sleep(&self, duration: Duration, cancel: &CancellationToken) -> bool {
        self.sleeps.lock().unwrap().push(duration);
        !cancel.is_cancelled()
    }
}

fn settings() -> CrawlSettings {
    CrawlSettings {
        page_delay: PageDelay::from_millis(100, 300),
        backoff: BackoffPolicy {
            max_retries: 2,
            base: Duration::from_millis(10),
            max: Duration::from_secs(1),
        },
        max_items: None,
    }
}

struct Harness {
    fetcher: Arc<ScriptedFetcher>,
    materializer: Arc<ScriptedMaterializer>,
    repository: Arc<dyn IngestRepository>,
    clock: Arc<ManualClock>,
    sink: Arc<CollectingSink>,
}

impl Harness {
    fn new(fetcher: ScriptedFetcher, materializer: ScriptedMaterializer) -> Self {
        Self::with_repository(fetcher, materializer, Arc::new(InMemoryIngestRepository::new()))
    }

    fn with_repository(
        fetcher: ScriptedFetcher,
        materializer: ScriptedMaterializer,
        repository: Arc<dyn IngestRepository>,
    ) -> Self {
        Self {
            fetcher: Arc::new(fetcher),
            materializer: Arc::new(materializer),
            repository,
            clock: Arc::new(ManualClock::new()),
            sink: Arc::new(CollectingSink::new()),
        }
    }

    fn crawler(&self) -> PaginationCrawler {
        PaginationCrawler::new(
            Arc::clone(&self.fetcher) as Arc<dyn PageFetcher>,
            Arc::clone(&self.materializer) as Arc<dyn ItemMaterializer>,
            Arc::clone(&self.repository),
        )
        .with_clock(Arc::clone(&self.clock) as Arc<dyn Clock>)
        .with_random(Arc::new(FastRandSource::seeded(7)))
        .with_settings(settings())
        .with_sink(Arc::clone(&self.sink) as Arc<dyn RecordSink>)
    }
}

/// Five videos and a token, then three more and the end of the chain
fn two_page_chain() -> ScriptedFetcher {
    ScriptedFetcher::new()
        .page(None, first_page(&["v0", "v1", "v2", "v3", "v4"], Some("tok1")))
        .page(Some("tok1"), continuation(&["v5", "v6", "v7"], None))
}

fn videos() -> CrawlRequest {
    CrawlRequest::new(CHANNEL, ContentKind::Videos)
}

#[tokio::test]
async fn test_two_page_chain_collects_every_item_in_order() {
    let harness = Harness::new(two_page_chain(), ScriptedMaterializer::new());

    let report = harness.crawler().crawl(&videos()).await.unwrap();

    assert_eq!(ids(&report.items), vec!["v0", "v1", "v2", "v3", "v4", "v5", "v6", "v7"]);
    assert_eq!(report.newly_processed(), 8);
    assert_eq!(report.pages_fetched, 2);
    assert_eq!(report.stop_reason, StopReason::EndOfChain);
    assert_eq!(harness.fetcher.calls().len(), 2);
    assert_eq!(harness.sink.records().await.len(), 8);

    let scope = IngestScope::new(CHANNEL, ContentKind::Videos);
    let counts = harness.repository.status_counts(&scope).await.unwrap();
    assert_eq!(counts.get(&IngestStatus::Scraped), Some(&8));
}

#[tokio::test]
async fn test_uploaded_item_is_never_materialized() {
    let repository = Arc::new(InMemoryIngestRepository::new());
    let scope = IngestScope::new(CHANNEL, ContentKind::Videos);
    let mut uploaded = IngestRecord::new("v2", chrono::Utc::now());
    uploaded.status = IngestStatus::Uploaded;
    repository.insert(&scope, uploaded).await;

    let harness = Harness::with_repository(two_page_chain(), ScriptedMaterializer::new(), repository);
    let report = harness.crawler().crawl(&videos()).await.unwrap();

    assert_eq!(report.newly_processed(), 7);
    assert_eq!(report.skipped, 1);
    assert!(!harness.materializer.calls().contains(&"v2".to_string()));
    assert!(!ids(&report.items).contains(&"v2"));
}

#[tokio::test]
async fn test_second_run_processes_nothing_new() {
    let harness = Harness::new(two_page_chain(), ScriptedMaterializer::new());
    let crawler = harness.crawler();

    let first = crawler.crawl(&videos()).await.unwrap();
    let second = crawler.crawl(&videos()).await.unwrap();

    assert_eq!(first.newly_processed(), 8);
    assert_eq!(second.newly_processed(), 0);
    assert_eq!(second.skipped, 8);
    assert_eq!(second.stop_reason, StopReason::EndOfChain);
    assert_eq!(harness.materializer.calls().len(), 8);
}

#[tokio::test]
async fn test_reingest_processes_everything_again() {
    let harness = Harness::new(two_page_chain(), ScriptedMaterializer::new());
    let crawler = harness.crawler();

    crawler.crawl(&videos()).await.unwrap();
    let again = crawler.crawl(&videos().with_reingest(true)).await.unwrap();

    assert_eq!(again.newly_processed(), 8);
    assert_eq!(harness.materializer.calls().len(), 16);
}

#[tokio::test]
async fn test_cap_stops_without_fetching_further_pages() {
    let harness = Harness::new(two_page_chain(), ScriptedMaterializer::new());

    let report = harness
        .crawler()
        .crawl(&videos().with_max_items(Some(3)))
        .await
        .unwrap();

    assert_eq!(ids(&report.items), vec!["v0", "v1", "v2"]);
    assert_eq!(report.stop_reason, StopReason::LimitReached);
    assert_eq!(report.pages_fetched, 1);
    assert_eq!(harness.fetcher.calls_for(Some("tok1")), 0);
    assert!(harness.clock.sleeps().is_empty());
}

#[tokio::test]
async fn test_cap_counts_only_newly_kept_items() {
    let repository = Arc::new(InMemoryIngestRepository::new());
    let scope = IngestScope::new(CHANNEL, ContentKind::Videos);
    for id in ["v0", "v1"] {
        let mut record = IngestRecord::new(id, chrono::Utc::now());
        record.status = IngestStatus::Scraped;
        repository.insert(&scope, record).await;
    }

    let harness = Harness::with_repository(two_page_chain(), ScriptedMaterializer::new(), repository);
    let report = harness
        .crawler()
        .crawl(&videos().with_max_items(Some(4)))
        .await
        .unwrap();

    assert_eq!(ids(&report.items), vec!["v2", "v3", "v4", "v5"]);
    assert_eq!(report.skipped, 2);
    assert_eq!(report.stop_reason, StopReason::LimitReached);
}

#[tokio::test]
async fn test_zero_cap_fetches_nothing() {
    let harness = Harness::new(two_page_chain(), ScriptedMaterializer::new());

    let report = harness
        .crawler()
        .crawl(&videos().with_max_items(Some(0)))
        .await
        .unwrap();

    assert_eq!(report.stop_reason, StopReason::LimitReached);
    assert_eq!(report.pages_fetched, 0);
    assert!(harness.fetcher.calls().is_empty());
}

#[tokio::test]
async fn test_pacing_delays_stay_within_bounds() {
    let fetcher = ScriptedFetcher::new()
        .page(None, first_page(&["a"], Some("t1")))
        .page(Some("t1"), continuation(&["b"], Some("t2")))
        .page(Some("t2"), continuation(&["c"], Some("t3")))
        .page(Some("t3"), continuation(&["d"], None));
    let harness = Harness::new(fetcher, ScriptedMaterializer::new());

    let report = harness.crawler().crawl(&videos()).await.unwrap();

    assert_eq!(report.pages_fetched, 4);
    let sleeps = harness.clock.sleeps();
    // one pause between each pair of pages, none after the last
    assert_eq!(sleeps.len(), 3);
    for delay in sleeps {
        assert!(delay >= Duration::from_millis(100), "{delay:?} below minimum");
        assert!(delay <= Duration::from_millis(300), "{delay:?} above maximum");
    }
}

#[tokio::test]
async fn test_repeated_token_ends_the_chain() {
    let fetcher = ScriptedFetcher::new()
        .page(None, first_page(&["a"], Some("t1")))
        .page(Some("t1"), continuation(&["b"], Some("t2")))
        .page(Some("t2"), continuation(&["c"], Some("t1")));
    let harness = Harness::new(fetcher, ScriptedMaterializer::new());

    let report = harness.crawler().crawl(&videos()).await.unwrap();

    assert_eq!(ids(&report.items), vec!["a", "b", "c"]);
    assert_eq!(report.pages_fetched, 3);
    assert_eq!(report.stop_reason, StopReason::EndOfChain);
    assert_eq!(harness.fetcher.calls().len(), 3);
}

#[tokio::test]
async fn test_duplicates_within_a_run_are_counted_once() {
    let fetcher = ScriptedFetcher::new()
        .page(None, first_page(&["a", "b"], Some("t1")))
        .page(Some("t1"), continuation(&["b", "c"], None));
    let harness = Harness::new(fetcher, ScriptedMaterializer::new());

    let report = harness.crawler().crawl(&videos()).await.unwrap();

    assert_eq!(ids(&report.items), vec!["a", "b", "c"]);
    assert_eq!(report.duplicates, 1);
    assert_eq!(harness.materializer.calls(), vec!["a", "b", "c"]);
}

#[tokio::test]
async fn test_unrecognized_first_page_fails_without_retry() {
    let fetcher = ScriptedFetcher::new().page(None, json!({ "contents": { "somethingNew": { "items": [] } } }));
    let harness = Harness::new(fetcher, ScriptedMaterializer::new());

    let error = harness.crawler().crawl(&videos()).await.unwrap_err();

    assert!(matches!(error, CrawlError::StructureNotFound { .. }), "{error:?}");
    assert!(error.is_structural());
    assert_eq!(error.pages_completed(), Some(0));
    assert_eq!(harness.fetcher.calls().len(), 1);
    assert!(harness.clock.sleeps().is_empty());
}

#[tokio::test]
async fn test_unrecognized_continuation_keeps_earlier_pages() {
    let fetcher = ScriptedFetcher::new()
        .page(None, first_page(&["v0", "v1", "v2", "v3", "v4"], Some("tok1")))
        .page(Some("tok1"), json!({ "unexpected": true }));
    let harness = Harness::new(fetcher, ScriptedMaterializer::new());

    let error = harness.crawler().crawl(&videos()).await.unwrap_err();

    assert!(error.is_structural());
    assert_eq!(error.pages_completed(), Some(1));
    assert_eq!(harness.fetcher.calls_for(Some("tok1")), 1);

    // items from the completed page were committed
    assert_eq!(harness.sink.records().await.len(), 5);
    let scope = IngestScope::new(CHANNEL, ContentKind::Videos);
    assert_eq!(harness.repository.processed_ids(&scope).await.unwrap().len(), 5);
}

#[tokio::test]
async fn test_missing_tab_is_a_missing_section() {
    let harness = Harness::new(ScriptedFetcher::new(), ScriptedMaterializer::new());

    let error = harness.crawler().crawl(&videos()).await.unwrap_err();

    match error {
        CrawlError::MissingExpectedSection { section, pages_completed, .. } => {
            assert_eq!(section, "videos tab");
            assert_eq!(pages_completed, 0);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(harness.fetcher.calls().len(), 1);
}

#[tokio::test]
async fn test_transient_failures_exhaust_the_retry_budget() {
    let fetcher = ScriptedFetcher::new().respond(
        CHANNEL,
        None,
        Err(FetchError::transient("https://www.youtube.com/@scripted/videos", "timed out")),
    );
    let harness = Harness::new(fetcher, ScriptedMaterializer::new());

    let error = harness.crawler().crawl(&videos()).await.unwrap_err();

    match &error {
        CrawlError::Exhausted { attempts, pages_completed, .. } => {
            assert_eq!(*attempts, 3);
            assert_eq!(*pages_completed, 0);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(!error.is_structural());
    assert_eq!(harness.fetcher.calls().len(), 3);

    let backoff = harness.clock.sleeps();
    assert_eq!(backoff.len(), 2);
    assert!(backoff[0] >= Duration::from_millis(10) && backoff[0] <= Duration::from_millis(15));
    assert!(backoff[1] >= Duration::from_millis(20) && backoff[1] <= Duration::from_millis(25));
}

#[tokio::test]
async fn test_transient_failure_recovers_on_retry() {
    let fetcher = ScriptedFetcher::new()
        .respond(CHANNEL, None, Err(FetchError::Http { status: 503, url: "u".to_string() }))
        .page(None, first_page(&["a", "b"], None));
    let harness = Harness::new(fetcher, ScriptedMaterializer::new());

    let report = harness.crawler().crawl(&videos()).await.unwrap();

    assert_eq!(ids(&report.items), vec!["a", "b"]);
    assert_eq!(report.pages_fetched, 1);
    assert_eq!(harness.fetcher.calls().len(), 2);
    let backoff = harness.clock.sleeps();
    // server errors wait at least the five second hint
    assert_eq!(backoff, vec![Duration::from_secs(5)]);
}

#[tokio::test]
async fn test_unavailable_item_is_parked_and_crawl_continues() {
    let harness = Harness::new(two_page_chain(), ScriptedMaterializer::new().unavailable("v1"));
    let crawler = harness.crawler();

    let report = crawler.crawl(&videos()).await.unwrap();

    assert_eq!(report.unavailable, 1);
    assert_eq!(report.newly_processed(), 7);
    assert_eq!(report.stop_reason, StopReason::EndOfChain);

    let scope = IngestScope::new(CHANNEL, ContentKind::Videos);
    let record = harness.repository.find(&scope, "v1").await.unwrap().unwrap();
    assert_eq!(record.status, IngestStatus::Unavailable);

    // never attempted again
    crawler.crawl(&videos()).await.unwrap();
    let attempts = harness.materializer.calls().iter().filter(|id| *id == "v1").count();
    assert_eq!(attempts, 1);
}

#[tokio::test]
async fn test_flaky_item_retries_then_parks_as_failed() {
    let materializer = ScriptedMaterializer::new().flaky("v3", 1).flaky("v4", u32::MAX);
    let harness = Harness::new(two_page_chain(), materializer);
    let crawler = harness.crawler();

    let report = crawler.crawl(&videos()).await.unwrap();

    assert!(ids(&report.items).contains(&"v3"));
    assert!(!ids(&report.items).contains(&"v4"));
    assert_eq!(report.failed, 1);
    assert_eq!(report.newly_processed(), 7);

    let calls = harness.materializer.calls();
    assert_eq!(calls.iter().filter(|id| *id == "v3").count(), 2);
    // the default budget tolerates two failures before parking
    assert_eq!(calls.iter().filter(|id| *id == "v4").count(), 3);

    let scope = IngestScope::new(CHANNEL, ContentKind::Videos);
    let parked = harness.repository.find(&scope, "v4").await.unwrap().unwrap();
    assert_eq!(parked.status, IngestStatus::Failed);

    // failed items are tried again by a later run
    let next = crawler.crawl(&videos()).await.unwrap();
    assert_eq!(next.failed, 1);
    assert_eq!(next.skipped, 7);
}

#[tokio::test]
async fn test_cancellation_stops_after_the_current_item() {
    let cancel = CancellationToken::new();
    let materializer = ScriptedMaterializer::new().cancel_after("v2", cancel.clone());
    let harness = Harness::new(two_page_chain(), materializer);

    let report = harness
        .crawler()
        .crawl(&videos().with_cancellation(cancel))
        .await
        .unwrap();

    assert_eq!(report.stop_reason, StopReason::Cancelled);
    assert_eq!(ids(&report.items), vec!["v0", "v1", "v2"]);
    assert_eq!(harness.fetcher.calls_for(Some("tok1")), 0);
}

#[tokio::test]
async fn test_cancelled_before_start_fetches_nothing() {
    let cancel = CancellationToken::new();
    cancel.cancel();
    let harness = Harness::new(two_page_chain(), ScriptedMaterializer::new());

    let report = harness
        .crawler()
        .crawl(&videos().with_cancellation(cancel))
        .await
        .unwrap();

    assert_eq!(report.stop_reason, StopReason::Cancelled);
    assert_eq!(report.pages_fetched, 0);
    assert!(harness.fetcher.calls().is_empty());
}

#[tokio::test]
async fn test_concurrent_crawls_are_isolated() {
    let fetcher = two_page_chain()
        .respond("@broken", None, Err(FetchError::NotFound { url: "gone".to_string() }))
        .respond("@other", None, Ok(first_page(&["o1", "o2"], None)));
    let harness = Harness::new(fetcher, ScriptedMaterializer::new());

    let results = harness
        .crawler()
        .crawl_many(&[
            videos(),
            CrawlRequest::new("@broken", ContentKind::Videos),
            CrawlRequest::new("@other", ContentKind::Videos),
        ])
        .await;

    assert_eq!(results.len(), 3);
    assert_eq!(results[0].as_ref().unwrap().newly_processed(), 8);
    assert!(matches!(results[1], Err(CrawlError::MissingExpectedSection { .. })));
    assert_eq!(ids(&results[2].as_ref().unwrap().items), vec!["o1", "o2"]);
}

#[tokio::test]
async fn test_sqlite_store_makes_runs_idempotent() {
    let db = DatabaseConnection::new("sqlite::memory:").await.unwrap();
    db.migrate().await.unwrap();
    let repository = Arc::new(SqliteIngestRepository::new(db.pool().clone()));

    let harness = Harness::with_repository(two_page_chain(), ScriptedMaterializer::new(), repository);
    let crawler = harness.crawler();

    assert_eq!(crawler.crawl(&videos()).await.unwrap().newly_processed(), 8);
    assert_eq!(crawler.crawl(&videos()).await.unwrap().newly_processed(), 0);

    let scope = IngestScope::new(CHANNEL, ContentKind::Videos);
    let counts = harness.repository.status_counts(&scope).await.unwrap();
    assert_eq!(counts.get(&IngestStatus::Scraped), Some(&8));
}

#[tokio::test]
async fn test_use_cases_write_json_lines() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("records.jsonl");

    let mut config = AppConfig::default();
    config.crawl.min_page_delay_ms = 0;
    config.crawl.max_page_delay_ms = 1;
    config.crawl.max_items_per_run = None;
    let use_cases = HarvestUseCases::dry_run(config);

    let sink = Arc::new(JsonLinesSink::to_file(&output).await.unwrap());
    let results = use_cases
        .crawl_with(
            Arc::new(two_page_chain()),
            Arc::new(ScriptedMaterializer::new()),
            &[CrawlOptions::new(CHANNEL, ContentKind::Videos)],
            Arc::clone(&sink) as Arc<dyn RecordSink>,
            CancellationToken::new(),
        )
        .await;

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].as_ref().unwrap().newly_processed(), 8);
    assert_eq!(sink.written(), 8);
    drop(sink);

    let content = tokio::fs::read_to_string(&output).await.unwrap();
    let first: MaterializedRecord = serde_json::from_str(content.lines().next().unwrap()).unwrap();
    assert_eq!(first.content_id, "v0");
    assert_eq!(first.url, "https://www.youtube.com/watch?v=v0");
    assert_eq!(content.lines().count(), 8);
}

/// Chain of pages tokened `t1..tN`; page `i` links to `i + 1`
fn scripted_chain(pages: &[Vec<String>]) -> ScriptedFetcher {
    let mut fetcher = ScriptedFetcher::new();
    for (i, page_ids) in pages.iter().enumerate() {
        let page_ids: Vec<&str> = page_ids.iter().map(String::as_str).collect();
        let next = (i + 1 < pages.len()).then(|| format!("t{}", i + 1));
        fetcher = if i == 0 {
            fetcher.page(None, first_page(&page_ids, next.as_deref()))
        } else {
            let token = format!("t{i}");
            fetcher.page(Some(&token), continuation(&page_ids, next.as_deref()))
        };
    }
    fetcher
}

fn arb_pages() -> impl Strategy<Value = Vec<Vec<String>>> {
    prop::collection::vec(
        prop::collection::vec((0u8..12).prop_map(|n| format!("id{n}")), 1..6),
        1..6,
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_generated_chains_keep_unique_items_in_discovery_order(
        pages in arb_pages(),
        cap in prop::option::of(0usize..10),
    ) {
        let mut seen = HashSet::new();
        let discovered: Vec<String> = pages
            .iter()
            .flatten()
            .filter(|id| seen.insert(id.as_str()))
            .cloned()
            .collect();

        let harness = Harness::new(scripted_chain(&pages), ScriptedMaterializer::new());
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        let report = runtime
            .block_on(harness.crawler().crawl(&videos().with_max_items(cap)))
            .unwrap();

        let kept: Vec<String> = report.items.iter().map(|item| item.id().to_string()).collect();
        let unique: HashSet<&String> = kept.iter().collect();
        prop_assert_eq!(unique.len(), kept.len());
        prop_assert!(matches!(report.stop_reason, StopReason::EndOfChain | StopReason::LimitReached));

        match cap {
            None => {
                prop_assert_eq!(&kept, &discovered);
                prop_assert_eq!(report.pages_fetched as usize, pages.len());
                prop_assert_eq!(report.stop_reason, StopReason::EndOfChain);
            }
            Some(cap) => {
                prop_assert!(kept.len() <= cap);
                let expected: Vec<String> = discovered.iter().take(cap).cloned().collect();
                prop_assert_eq!(&kept, &expected);
                let expected_stop = if cap <= discovered.len() {
                    StopReason::LimitReached
                } else {
                    StopReason::EndOfChain
                };
                prop_assert_eq!(report.stop_reason, expected_stop);
            }
        }
    }
}
