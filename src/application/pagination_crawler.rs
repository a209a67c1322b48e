//! Continuation-token pagination crawler
//!
//! Drives fetch -> locate -> filter over a chain of pages for one
//! (channel, kind) scope. Items on a page are handled strictly in order; the
//! only suspension points are the page fetch, the per-item materializer call
//! and the pacing sleeps, and cancellation is honoured at each of them.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::limit_controller::{Admission, LimitController};
use super::pacing::{Clock, FastRandSource, PageDelay, RandomSource, SystemClock};
use crate::domain::content_item::{ContentItem, ContentKind};
use crate::domain::crawl_state::{CrawlPhase, CrawlReport, CrawlRunState, PageCursor, StopReason};
use crate::domain::errors::{ExtractionError, FetchError, MaterializeError};
use crate::domain::ingest::{IngestAction, IngestEvent, IngestRecord, IngestScope, IngestStateMachine};
use crate::domain::repositories::IngestRepository;
use crate::domain::services::{ItemMaterializer, PageFetcher, PageRequest, RecordSink};
use crate::infrastructure::config::{AppConfig, CrawlConfig};
use crate::infrastructure::crawl_error::{CrawlError, CrawlResult};
use crate::infrastructure::parsing::{ContentLocator, ItemNormalizer, LocateContext};
use crate::infrastructure::retry_manager::{BackoffPolicy, ErrorClassification};

/// Pacing and retry knobs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrawlSettings {
    pub page_delay: PageDelay,
    pub backoff: BackoffPolicy,
    /// Default cap when a request does not set one
    pub max_items: Option<usize>,
}

impl CrawlSettings {
    pub fn from_config(config: &CrawlConfig) -> Self {
        Self {
            page_delay: PageDelay::from_millis(config.min_page_delay_ms, config.max_page_delay_ms),
            backoff: BackoffPolicy::from_config(config),
            max_items: config.max_items_per_run,
        }
    }
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self::from_config(&CrawlConfig::default())
    }
}

/// One crawl to run
#[derive(Debug, Clone)]
pub struct CrawlRequest {
    pub channel: String,
    pub kind: ContentKind,
    pub max_items: Option<usize>,
    /// Process every discovered item again regardless of stored status
    pub reingest: bool,
    pub cancel: CancellationToken,
}

impl CrawlRequest {
    pub fn new(channel: impl Into<String>, kind: ContentKind) -> Self {
        Self {
            channel: channel.into(),
            kind,
            max_items: None,
            reingest: false,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_max_items(mut self, max_items: Option<usize>) -> Self {
        self.max_items = max_items;
        self
    }

    pub fn with_reingest(mut self, reingest: bool) -> Self {
        self.reingest = reingest;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ItemOutcome {
    Kept,
    Skipped,
    Unavailable,
    Failed,
    Cancelled,
}

/// Counters and output accumulated over one run
#[derive(Debug, Default)]
struct Tally {
    items: Vec<ContentItem>,
    skipped: usize,
    duplicates: usize,
    unavailable: usize,
    failed: usize,
}

pub struct PaginationCrawler {
    fetcher: Arc<dyn PageFetcher>,
    materializer: Arc<dyn ItemMaterializer>,
    repository: Arc<dyn IngestRepository>,
    sink: Option<Arc<dyn RecordSink>>,
    clock: Arc<dyn Clock>,
    random: Arc<dyn RandomSource>,
    locator: ContentLocator,
    normalizer: ItemNormalizer,
    state_machine: IngestStateMachine,
    settings: CrawlSettings,
}

impl PaginationCrawler {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        materializer: Arc<dyn ItemMaterializer>,
        repository: Arc<dyn IngestRepository>,
    ) -> Self {
        Self {
            fetcher,
            materializer,
            repository,
            sink: None,
            clock: Arc::new(SystemClock),
            random: Arc::new(FastRandSource::new()),
            locator: ContentLocator::default(),
            normalizer: ItemNormalizer::new(),
            state_machine: IngestStateMachine::default(),
            settings: CrawlSettings::default(),
        }
    }

    /// Crawler wired with the configured shapes, pacing and retry budgets
    pub fn from_config(
        config: &AppConfig,
        fetcher: Arc<dyn PageFetcher>,
        materializer: Arc<dyn ItemMaterializer>,
        repository: Arc<dyn IngestRepository>,
    ) -> Self {
        Self::new(fetcher, materializer, repository)
            .with_locator(
                ContentLocator::new(config.shape_catalog()).with_find_key_max_depth(config.crawl.find_key_max_depth),
            )
            .with_state_machine(IngestStateMachine::new(config.crawl.item_retry_budget))
            .with_settings(CrawlSettings::from_config(&config.crawl))
    }

    pub fn with_sink(mut self, sink: Arc<dyn RecordSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_random(mut self, random: Arc<dyn RandomSource>) -> Self {
        self.random = random;
        self
    }

    pub fn with_locator(mut self, locator: ContentLocator) -> Self {
        self.locator = locator;
        self
    }

    pub fn with_state_machine(mut self, state_machine: IngestStateMachine) -> Self {
        self.state_machine = state_machine;
        self
    }

    pub fn with_settings(mut self, settings: CrawlSettings) -> Self {
        self.settings = settings;
        self
    }

    pub const fn settings(&self) -> &CrawlSettings {
        &self.settings
    }

    /// Run independent crawls concurrently; one failing does not stop the others
    pub async fn crawl_many(&self, requests: &[CrawlRequest]) -> Vec<CrawlResult<CrawlReport>> {
        join_all(requests.iter().map(|request| self.crawl(request))).await
    }

    pub async fn crawl(&self, request: &CrawlRequest) -> CrawlResult<CrawlReport> {
        let scope = IngestScope::new(request.channel.clone(), request.kind);
        let mut state = CrawlRunState::new(request.channel.clone(), request.kind);
        let mut tally = Tally::default();

        let known: HashSet<String> = if request.reingest {
            HashSet::new()
        } else {
            self.repository
                .processed_ids(&scope)
                .await
                .map_err(|e| CrawlError::persistence(&e))?
        };
        let max_items = request.max_items.or(self.settings.max_items);
        let mut limits = LimitController::new(max_items).with_known_processed(known);

        info!(
            "🚀 Starting crawl {} for {} (run {}, cap {:?}, reingest {})",
            request.kind, request.channel, state.run_id, max_items, request.reingest
        );

        state.enter(CrawlPhase::Fetching);
        if limits.limit_reached() {
            state.enter(CrawlPhase::Done);
            return Ok(finish(&state, tally, StopReason::LimitReached));
        }

        loop {
            let page_request = PageRequest {
                channel: request.channel.clone(),
                kind: request.kind,
                cursor: state.cursor().cloned(),
            };
            let page_index = state.current_page();

            let Some(tree) = self.fetch_with_retry(&mut state, &page_request, &request.cancel).await? else {
                state.enter(CrawlPhase::Done);
                return Ok(finish(&state, tally, StopReason::Cancelled));
            };
            state.record_page_fetched();
            state.enter(CrawlPhase::Locating);

            let located = match self.locator.locate(&tree, request.kind, page_request.is_continuation()) {
                Ok(located) => located,
                Err(e) => {
                    state.enter(CrawlPhase::Error);
                    error!("Page {} of {} unreadable: {}", page_index, scope, e);
                    return Err(structural_error(&state, e, page_index));
                }
            };
            state.enter(CrawlPhase::Filtering);

            let context = LocateContext::new(request.channel.clone(), request.kind)
                .at_page(page_index)
                .with_shape(located.shape.clone());
            let items = self.normalizer.normalize_all(&located.nodes, &context);
            let next_token = located.next_token.clone();
            debug!(
                page = page_index,
                shape = %located.shape,
                nodes = located.nodes.len(),
                items = items.len(),
                has_next = next_token.is_some(),
                "page located"
            );

            if let Some(stop) = self
                .filter_page(items, &scope, request, &mut limits, &mut tally)
                .await?
            {
                state.enter(CrawlPhase::Done);
                return Ok(finish(&state, tally, stop));
            }

            let Some(token) = next_token else {
                state.enter(CrawlPhase::Done);
                return Ok(finish(&state, tally, StopReason::EndOfChain));
            };
            if !state.advance(PageCursor::issued_by(page_index, token)) {
                warn!("Page {} of {} repeated a consumed token, ending the chain", page_index, scope);
                state.enter(CrawlPhase::Done);
                return Ok(finish(&state, tally, StopReason::EndOfChain));
            }

            let delay = self.settings.page_delay.draw(self.random.as_ref());
            debug!(delay_ms = delay.as_millis() as u64, "pacing before next page");
            if !self.clock.sleep(delay, &request.cancel).await {
                state.enter(CrawlPhase::Done);
                return Ok(finish(&state, tally, StopReason::Cancelled));
            }
            state.enter(CrawlPhase::Fetching);
        }
    }

    /// Fetch one page, retrying transient failures. `None` means cancelled.
    async fn fetch_with_retry(
        &self,
        state: &mut CrawlRunState,
        page: &PageRequest,
        cancel: &CancellationToken,
    ) -> CrawlResult<Option<Value>> {
        loop {
            if cancel.is_cancelled() {
                return Ok(None);
            }
            let result = tokio::select! {
                result = self.fetcher.fetch_page(page) => result,
                _ = cancel.cancelled() => Err(FetchError::Cancelled),
            };
            let failure = match result {
                Ok(tree) => return Ok(Some(tree)),
                Err(e) => e,
            };

            match ErrorClassification::of_fetch(&failure) {
                ErrorClassification::Cancelled => return Ok(None),
                ErrorClassification::Structural(source) => {
                    state.enter(CrawlPhase::Error);
                    error!("Page data for {}/{} unreadable: {}", page.channel, page.kind, source);
                    return Err(structural_error(state, source, state.pages_fetched()));
                }
                ErrorClassification::NonRecoverable { reason } => {
                    state.enter(CrawlPhase::Error);
                    error!("Fetch for {}/{} failed permanently: {}", page.channel, page.kind, reason);
                    return Err(CrawlError::MissingExpectedSection {
                        channel: state.channel.clone(),
                        kind: state.kind,
                        section: format!("{} tab", page.kind.tab_path()),
                        pages_completed: state.pages_fetched(),
                    });
                }
                ErrorClassification::Recoverable { retry_after } => {
                    let attempts = state.record_failure();
                    if !self.settings.backoff.allows_retry_after(attempts) {
                        state.enter(CrawlPhase::Error);
                        error!(
                            "❌ Giving up on {}/{} page {} after {} attempts: {}",
                            page.channel,
                            page.kind,
                            state.current_page(),
                            attempts,
                            failure
                        );
                        return Err(CrawlError::Exhausted {
                            channel: state.channel.clone(),
                            kind: state.kind,
                            pages_completed: state.pages_fetched(),
                            attempts,
                            last_error: failure.to_string(),
                        });
                    }
                    let delay = self
                        .settings
                        .backoff
                        .delay_with_hint(attempts, retry_after, self.random.as_ref());
                    warn!(
                        "🔄 Fetch attempt {} for {}/{} failed ({}), retrying in {:?}",
                        attempts, page.channel, page.kind, failure, delay
                    );
                    if !self.clock.sleep(delay, cancel).await {
                        return Ok(None);
                    }
                }
            }
        }
    }

    /// Gate each item through dedupe, the cap and the ingest state machine.
    /// Returns a stop reason when the run should end after this page.
    async fn filter_page(
        &self,
        items: Vec<ContentItem>,
        scope: &IngestScope,
        request: &CrawlRequest,
        limits: &mut LimitController,
        tally: &mut Tally,
    ) -> CrawlResult<Option<StopReason>> {
        for item in items {
            if limits.limit_reached() {
                info!("🎯 Item cap reached for {} with {} kept", scope, limits.kept());
                return Ok(Some(StopReason::LimitReached));
            }
            if request.cancel.is_cancelled() {
                return Ok(Some(StopReason::Cancelled));
            }

            match limits.admit(item.id()) {
                Admission::Duplicate => {
                    debug!(id = item.id(), "duplicate within run");
                    tally.duplicates += 1;
                    continue;
                }
                Admission::KnownProcessed => {
                    debug!(id = item.id(), "already processed");
                    tally.skipped += 1;
                    continue;
                }
                Admission::Fresh => {}
            }

            match self.process_item(&item, scope, request).await? {
                ItemOutcome::Kept => {
                    limits.record_kept();
                    tally.items.push(item);
                }
                ItemOutcome::Skipped => tally.skipped += 1,
                ItemOutcome::Unavailable => tally.unavailable += 1,
                ItemOutcome::Failed => tally.failed += 1,
                ItemOutcome::Cancelled => return Ok(Some(StopReason::Cancelled)),
            }
        }

        if limits.limit_reached() {
            info!("🎯 Item cap reached for {} with {} kept", scope, limits.kept());
            return Ok(Some(StopReason::LimitReached));
        }
        Ok(None)
    }

    async fn process_item(
        &self,
        item: &ContentItem,
        scope: &IngestScope,
        request: &CrawlRequest,
    ) -> CrawlResult<ItemOutcome> {
        let id = item.id();
        let mut record = self
            .repository
            .find(scope, id)
            .await
            .map_err(|e| CrawlError::persistence(&e))?
            .unwrap_or_else(|| IngestRecord::new(id, Utc::now()));

        let event = if request.reingest {
            IngestEvent::ReingestRequested
        } else {
            IngestEvent::SeenFirstTime
        };
        let action = record.apply(&self.state_machine, event, Utc::now());
        if action != IngestAction::Process {
            debug!(id, status = %record.status, ?action, "filtered by ingest status");
            return Ok(ItemOutcome::Skipped);
        }
        self.save(scope, &record).await?;

        let mut attempts = 0;
        loop {
            let result = tokio::select! {
                result = self.materializer.materialize(item) => result,
                _ = request.cancel.cancelled() => return Ok(ItemOutcome::Cancelled),
            };

            match result {
                Ok(materialized) => {
                    let action = record.apply(&self.state_machine, IngestEvent::ScrapeSucceeded, Utc::now());
                    if action != IngestAction::Persist {
                        warn!(id, ?action, "scrape result not persisted");
                        return Ok(ItemOutcome::Failed);
                    }
                    if let Some(sink) = &self.sink {
                        sink.accept(&materialized)
                            .await
                            .map_err(|e| CrawlError::persistence(&e))?;
                    }
                    self.save(scope, &record).await?;
                    debug!(id, "item kept");
                    return Ok(ItemOutcome::Kept);
                }
                Err(MaterializeError::ItemUnavailable { reason, .. }) => {
                    record.apply(&self.state_machine, IngestEvent::ExtractionUnavailable, Utc::now());
                    self.save(scope, &record).await?;
                    info!("Item {} in {} is unavailable: {}", id, scope, reason);
                    return Ok(ItemOutcome::Unavailable);
                }
                Err(failure @ MaterializeError::Transient { .. }) => {
                    attempts += 1;
                    let action =
                        record.apply(&self.state_machine, IngestEvent::ScrapeFailed { attempts }, Utc::now());
                    if action != IngestAction::Retry {
                        self.save(scope, &record).await?;
                        warn!("Item {} in {} failed {} times, parked: {}", id, scope, attempts, failure);
                        return Ok(ItemOutcome::Failed);
                    }
                    let delay = self.settings.backoff.delay_for(attempts, self.random.as_ref());
                    debug!(id, attempts, delay_ms = delay.as_millis() as u64, "retrying item");
                    if !self.clock.sleep(delay, &request.cancel).await {
                        return Ok(ItemOutcome::Cancelled);
                    }
                }
            }
        }
    }

    async fn save(&self, scope: &IngestScope, record: &IngestRecord) -> CrawlResult<()> {
        self.repository
            .save(scope, record)
            .await
            .map_err(|e| CrawlError::persistence(&e))
    }
}

fn structural_error(state: &CrawlRunState, error: ExtractionError, pages_completed: u32) -> CrawlError {
    match error {
        ExtractionError::MissingExpectedSection { section, .. } => CrawlError::MissingExpectedSection {
            channel: state.channel.clone(),
            kind: state.kind,
            section,
            pages_completed,
        },
        source => CrawlError::StructureNotFound {
            channel: state.channel.clone(),
            kind: state.kind,
            pages_completed,
            source,
        },
    }
}

fn finish(state: &CrawlRunState, tally: Tally, stop_reason: StopReason) -> CrawlReport {
    let report = CrawlReport {
        run_id: state.run_id,
        channel: state.channel.clone(),
        kind: state.kind,
        items: tally.items,
        pages_fetched: state.pages_fetched(),
        skipped: tally.skipped,
        duplicates: tally.duplicates,
        unavailable: tally.unavailable,
        failed: tally.failed,
        stop_reason,
    };
    info!(
        "✅ Crawl {}/{} finished ({:?}): {} new items over {} pages, {} skipped, {} duplicates, {} unavailable, {} failed",
        report.channel,
        report.kind,
        report.stop_reason,
        report.newly_processed(),
        report.pages_fetched,
        report.skipped,
        report.duplicates,
        report.unavailable,
        report.failed
    );
    report
}
