//! Per-item ingest status tracking
//!
//! `IngestStateMachine` is the only place where an item's status changes. It
//! decides, for every sighting and every scrape outcome, whether the crawler
//! should touch the network for that item.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::content_item::ContentKind;

/// Persisted processing status of one content id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum IngestStatus {
    #[default]
    None,
    Pending,
    Scraped,
    Uploaded,
    Failed,
    Unavailable,
}

impl IngestStatus {
    pub const ALL: [Self; 6] = [
        Self::None,
        Self::Pending,
        Self::Scraped,
        Self::Uploaded,
        Self::Failed,
        Self::Unavailable,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Pending => "pending",
            Self::Scraped => "scraped",
            Self::Uploaded => "uploaded",
            Self::Failed => "failed",
            Self::Unavailable => "unavailable",
        }
    }

    /// Statuses that keep an id out of a crawl before any fetch is attempted
    pub const fn blocks_reprocessing(self) -> bool {
        matches!(self, Self::Scraped | Self::Uploaded | Self::Unavailable)
    }
}

impl fmt::Display for IngestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IngestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "pending" => Ok(Self::Pending),
            "scraped" => Ok(Self::Scraped),
            "uploaded" => Ok(Self::Uploaded),
            "failed" => Ok(Self::Failed),
            "unavailable" => Ok(Self::Unavailable),
            other => Err(format!("unknown ingest status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IngestEvent {
    SeenFirstTime,
    ScrapeSucceeded,
    /// `attempts` counts failures so far for this item in the current run, including this one
    ScrapeFailed { attempts: u32 },
    AlreadyUploadedExternally,
    ExtractionUnavailable,
    ReingestRequested,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IngestAction {
    Process,
    Persist,
    Skip,
    SkipPermanently,
    Retry,
    SkipThisRun,
}

/// Result of applying one event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub status: IngestStatus,
    pub action: IngestAction,
}

impl Transition {
    const fn new(status: IngestStatus, action: IngestAction) -> Self {
        Self { status, action }
    }
}

/// Crawl scope an ingest record belongs to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IngestScope {
    pub channel: String,
    pub kind: ContentKind,
}

impl IngestScope {
    pub fn new(channel: impl Into<String>, kind: ContentKind) -> Self {
        Self {
            channel: channel.into(),
            kind,
        }
    }
}

impl fmt::Display for IngestScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.channel, self.kind)
    }
}

/// Status of one content id within one scope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestRecord {
    pub content_id: String,
    pub status: IngestStatus,
    pub failure_count: u32,
    pub updated_at: DateTime<Utc>,
}

impl IngestRecord {
    pub fn new(content_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            content_id: content_id.into(),
            status: IngestStatus::None,
            failure_count: 0,
            updated_at: now,
        }
    }

    /// Apply an event, updating the record only when the status moves
    pub fn apply(&mut self, machine: &IngestStateMachine, event: IngestEvent, now: DateTime<Utc>) -> IngestAction {
        let transition = machine.transition(self.status, event);
        if let IngestEvent::ScrapeFailed { attempts } = event {
            self.failure_count = self.failure_count.max(attempts);
        }
        if transition.status != self.status {
            self.status = transition.status;
            self.updated_at = now;
        }
        transition.action
    }
}

/// Failed scrapes tolerated per item before it is parked as failed
pub const DEFAULT_ITEM_RETRY_BUDGET: u32 = 2;

/// Transition table for ingest statuses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestStateMachine {
    retry_budget: u32,
}

impl Default for IngestStateMachine {
    fn default() -> Self {
        Self::new(DEFAULT_ITEM_RETRY_BUDGET)
    }
}

impl IngestStateMachine {
    /// `retry_budget` is the number of failed scrapes tolerated before an item is parked as failed
    pub const fn new(retry_budget: u32) -> Self {
        Self { retry_budget }
    }

    pub const fn retry_budget(&self) -> u32 {
        self.retry_budget
    }

    pub fn transition(&self, current: IngestStatus, event: IngestEvent) -> Transition {
        use IngestAction as A;
        use IngestStatus as S;

        match (current, event) {
            (_, IngestEvent::ReingestRequested) => Transition::new(S::Pending, A::Process),
            (S::Uploaded, _) => Transition::new(S::Uploaded, A::Skip),
            (_, IngestEvent::AlreadyUploadedExternally) => Transition::new(S::Uploaded, A::Skip),
            (_, IngestEvent::ExtractionUnavailable) => {
                Transition::new(S::Unavailable, A::SkipPermanently)
            }
            (S::Unavailable, _) => Transition::new(S::Unavailable, A::SkipPermanently),

            (S::None | S::Pending | S::Failed, IngestEvent::SeenFirstTime) => {
                Transition::new(S::Pending, A::Process)
            }
            (S::Scraped, IngestEvent::SeenFirstTime) => Transition::new(S::Scraped, A::Skip),

            (S::None | S::Pending | S::Scraped, IngestEvent::ScrapeSucceeded) => {
                Transition::new(S::Scraped, A::Persist)
            }
            (S::Failed, IngestEvent::ScrapeSucceeded) => Transition::new(S::Failed, A::SkipThisRun),

            (S::Failed, IngestEvent::ScrapeFailed { .. }) => Transition::new(S::Failed, A::SkipThisRun),
            (status, IngestEvent::ScrapeFailed { attempts }) => {
                if attempts <= self.retry_budget {
                    Transition::new(status, A::Retry)
                } else {
                    Transition::new(S::Failed, A::SkipThisRun)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(IngestStatus::None, IngestEvent::SeenFirstTime, IngestStatus::Pending, IngestAction::Process)]
    #[case(IngestStatus::Pending, IngestEvent::ScrapeSucceeded, IngestStatus::Scraped, IngestAction::Persist)]
    #[case(IngestStatus::Scraped, IngestEvent::ScrapeSucceeded, IngestStatus::Scraped, IngestAction::Persist)]
    #[case(IngestStatus::Pending, IngestEvent::ExtractionUnavailable, IngestStatus::Unavailable, IngestAction::SkipPermanently)]
    #[case(IngestStatus::None, IngestEvent::ExtractionUnavailable, IngestStatus::Unavailable, IngestAction::SkipPermanently)]
    #[case(IngestStatus::Uploaded, IngestEvent::SeenFirstTime, IngestStatus::Uploaded, IngestAction::Skip)]
    #[case(IngestStatus::Uploaded, IngestEvent::ExtractionUnavailable, IngestStatus::Uploaded, IngestAction::Skip)]
    #[case(IngestStatus::Uploaded, IngestEvent::ReingestRequested, IngestStatus::Pending, IngestAction::Process)]
    #[case(IngestStatus::Pending, IngestEvent::AlreadyUploadedExternally, IngestStatus::Uploaded, IngestAction::Skip)]
    #[case(IngestStatus::Failed, IngestEvent::SeenFirstTime, IngestStatus::Pending, IngestAction::Process)]
    #[case(IngestStatus::Unavailable, IngestEvent::SeenFirstTime, IngestStatus::Unavailable, IngestAction::SkipPermanently)]
    fn test_transition_table(
        #[case] current: IngestStatus,
        #[case] event: IngestEvent,
        #[case] expected_status: IngestStatus,
        #[case] expected_action: IngestAction,
    ) {
        let machine = IngestStateMachine::new(2);
        let transition = machine.transition(current, event);
        assert_eq!(transition.status, expected_status);
        assert_eq!(transition.action, expected_action);
    }

    #[test]
    fn test_scrape_failures_respect_retry_budget() {
        let machine = IngestStateMachine::new(2);

        let first = machine.transition(IngestStatus::Pending, IngestEvent::ScrapeFailed { attempts: 1 });
        assert_eq!(first, Transition::new(IngestStatus::Pending, IngestAction::Retry));

        let second = machine.transition(IngestStatus::Pending, IngestEvent::ScrapeFailed { attempts: 2 });
        assert_eq!(second.action, IngestAction::Retry);

        let third = machine.transition(IngestStatus::Pending, IngestEvent::ScrapeFailed { attempts: 3 });
        assert_eq!(third, Transition::new(IngestStatus::Failed, IngestAction::SkipThisRun));
    }

    #[test]
    fn test_record_apply_tracks_status_and_failures() {
        let machine = IngestStateMachine::new(1);
        let t0 = Utc::now();
        let mut record = IngestRecord::new("vid", t0);

        assert_eq!(record.apply(&machine, IngestEvent::SeenFirstTime, t0), IngestAction::Process);
        assert_eq!(record.status, IngestStatus::Pending);

        let action = record.apply(&machine, IngestEvent::ScrapeFailed { attempts: 2 }, t0);
        assert_eq!(action, IngestAction::SkipThisRun);
        assert_eq!(record.status, IngestStatus::Failed);
        assert_eq!(record.failure_count, 2);
    }

    #[test]
    fn test_blocking_statuses() {
        assert!(IngestStatus::Uploaded.blocks_reprocessing());
        assert!(IngestStatus::Unavailable.blocks_reprocessing());
        assert!(!IngestStatus::Failed.blocks_reprocessing());
        assert!(!IngestStatus::Pending.blocks_reprocessing());
    }

    #[test]
    fn test_status_string_round_trip_through_storage_names() {
        assert_eq!("unavailable".parse::<IngestStatus>(), Ok(IngestStatus::Unavailable));
        assert!("UPLOADED".parse::<IngestStatus>().is_err());
    }
}
