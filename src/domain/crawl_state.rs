//! Run-scoped crawl state
//!
//! One `CrawlRunState` is owned by exactly one crawl invocation. Page counters
//! only move forward and a cursor is replaced, never rewound.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use uuid::Uuid;

use super::content_item::{ContentItem, ContentKind};

/// Continuation token issued by a fetched page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageCursor {
    token: String,
    page: u32,
}

impl PageCursor {
    /// Cursor pointing at the page after `page`
    pub fn issued_by(page: u32, token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            page: page + 1,
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Zero-based index of the page this cursor fetches
    pub const fn page(&self) -> u32 {
        self.page
    }
}

/// Crawl loop phases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CrawlPhase {
    Init,
    Fetching,
    Locating,
    Filtering,
    Done,
    Error,
}

impl CrawlPhase {
    /// Allowed phase changes of the crawl loop
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Init, Self::Fetching)
                | (Self::Fetching, Self::Locating | Self::Error | Self::Done)
                | (Self::Locating, Self::Filtering | Self::Error)
                | (Self::Filtering, Self::Fetching | Self::Done | Self::Error)
        )
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }
}

impl fmt::Display for CrawlPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Init => "INIT",
            Self::Fetching => "FETCHING",
            Self::Locating => "LOCATING",
            Self::Filtering => "FILTERING",
            Self::Done => "DONE",
            Self::Error => "ERROR",
        };
        f.write_str(name)
    }
}

/// Mutable state of a single crawl
#[derive(Debug, Clone)]
pub struct CrawlRunState {
    pub run_id: Uuid,
    pub channel: String,
    pub kind: ContentKind,
    phase: CrawlPhase,
    cursor: Option<PageCursor>,
    pages_fetched: u32,
    consecutive_failures: u32,
    consumed_tokens: HashSet<String>,
}

impl CrawlRunState {
    pub fn new(channel: impl Into<String>, kind: ContentKind) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            channel: channel.into(),
            kind,
            phase: CrawlPhase::Init,
            cursor: None,
            pages_fetched: 0,
            consecutive_failures: 0,
            consumed_tokens: HashSet::new(),
        }
    }

    pub const fn phase(&self) -> CrawlPhase {
        self.phase
    }

    pub const fn cursor(&self) -> Option<&PageCursor> {
        self.cursor.as_ref()
    }

    pub const fn pages_fetched(&self) -> u32 {
        self.pages_fetched
    }

    pub const fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Index of the page about to be fetched
    pub fn current_page(&self) -> u32 {
        self.cursor.as_ref().map_or(0, PageCursor::page)
    }

    /// Move to `next`; returns false and leaves the phase alone if the move is not allowed
    pub fn enter(&mut self, next: CrawlPhase) -> bool {
        if self.phase.can_transition_to(next) {
            tracing::trace!(run_id = %self.run_id, from = %self.phase, to = %next, "crawl phase change");
            self.phase = next;
            true
        } else {
            tracing::warn!(run_id = %self.run_id, from = %self.phase, to = %next, "rejected crawl phase change");
            false
        }
    }

    pub fn record_page_fetched(&mut self) {
        self.pages_fetched += 1;
        self.consecutive_failures = 0;
    }

    pub fn record_failure(&mut self) -> u32 {
        self.consecutive_failures += 1;
        self.consecutive_failures
    }

    /// Replace the held cursor. A cursor for an earlier page, or one repeating
    /// any token already consumed in this run, is refused.
    pub fn advance(&mut self, next: PageCursor) -> bool {
        if self.cursor.as_ref().is_some_and(|current| next.page <= current.page)
            || self.consumed_tokens.contains(&next.token)
        {
            return false;
        }
        self.consumed_tokens.insert(next.token.clone());
        self.cursor = Some(next);
        true
    }
}

/// Why a crawl finished successfully
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    /// The last page carried no continuation token
    EndOfChain,
    /// The per-run item cap was reached
    LimitReached,
    Cancelled,
}

/// Outcome of a finished crawl
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlReport {
    pub run_id: Uuid,
    pub channel: String,
    pub kind: ContentKind,
    /// Kept items in discovery order
    pub items: Vec<ContentItem>,
    pub pages_fetched: u32,
    pub skipped: usize,
    pub duplicates: usize,
    pub unavailable: usize,
    pub failed: usize,
    pub stop_reason: StopReason,
}

impl CrawlReport {
    /// Number of items processed for the first time in this run
    pub fn newly_processed(&self) -> usize {
        self.items.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_pages_increase() {
        let first = PageCursor::issued_by(0, "tok1");
        assert_eq!(first.page(), 1);
        assert_eq!(first.token(), "tok1");

        let mut state = CrawlRunState::new("chan", ContentKind::Videos);
        assert_eq!(state.current_page(), 0);
        assert!(state.advance(first.clone()));
        assert_eq!(state.current_page(), 1);

        // consumed token and rewinds are refused
        assert!(!state.advance(PageCursor::issued_by(1, "tok1")));
        assert!(!state.advance(PageCursor::issued_by(0, "tok9")));
        assert!(state.advance(PageCursor::issued_by(1, "tok2")));
        assert_eq!(state.cursor().map(PageCursor::token), Some("tok2"));

        // a cycle back to an older token is refused too
        assert!(!state.advance(PageCursor::issued_by(2, "tok1")));
    }

    #[test]
    fn test_phase_transitions() {
        let mut state = CrawlRunState::new("chan", ContentKind::Posts);
        assert!(!state.enter(CrawlPhase::Done));
        assert!(state.enter(CrawlPhase::Fetching));
        assert!(state.enter(CrawlPhase::Locating));
        assert!(!state.enter(CrawlPhase::Fetching));
        assert!(state.enter(CrawlPhase::Filtering));
        assert!(state.enter(CrawlPhase::Done));
        assert!(state.phase().is_terminal());
    }

    #[test]
    fn test_failure_counter_resets_on_fetch() {
        let mut state = CrawlRunState::new("chan", ContentKind::Shorts);
        assert_eq!(state.record_failure(), 1);
        assert_eq!(state.record_failure(), 2);
        state.record_page_fetched();
        assert_eq!(state.consecutive_failures(), 0);
        assert_eq!(state.pages_fetched(), 1);
    }
}
