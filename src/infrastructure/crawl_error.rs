//! Crawl-level error taxonomy
//!
//! Transport failures and per-item failures are absorbed by the crawl loop
//! where possible. Whatever escapes a crawl is a `CrawlError` naming the
//! channel, the content kind and how far it got.

use thiserror::Error;

use crate::domain::content_item::ContentKind;
use crate::domain::errors::ExtractionError;

/// Terminal failure of one crawl
#[derive(Error, Debug)]
pub enum CrawlError {
    #[error("Layout not recognized for {channel}/{kind} after {pages_completed} pages: {source}")]
    StructureNotFound {
        channel: String,
        kind: ContentKind,
        pages_completed: u32,
        #[source]
        source: ExtractionError,
    },

    #[error("Section '{section}' missing for {channel}/{kind} after {pages_completed} pages")]
    MissingExpectedSection {
        channel: String,
        kind: ContentKind,
        section: String,
        pages_completed: u32,
    },

    #[error("Retry budget exhausted for {channel}/{kind} after {pages_completed} pages ({attempts} attempts): {last_error}")]
    Exhausted {
        channel: String,
        kind: ContentKind,
        pages_completed: u32,
        attempts: u32,
        last_error: String,
    },

    #[error("Ingest store failure: {message}")]
    Persistence { message: String },
}

impl CrawlError {
    pub fn persistence(error: &anyhow::Error) -> Self {
        Self::Persistence {
            message: format!("{error:#}"),
        }
    }

    /// Layout failures, as opposed to transport exhaustion
    pub const fn is_structural(&self) -> bool {
        matches!(self, Self::StructureNotFound { .. } | Self::MissingExpectedSection { .. })
    }

    /// Pages fully processed before the failure, for resumption or alerting
    pub const fn pages_completed(&self) -> Option<u32> {
        match self {
            Self::StructureNotFound { pages_completed, .. }
            | Self::MissingExpectedSection { pages_completed, .. }
            | Self::Exhausted { pages_completed, .. } => Some(*pages_completed),
            Self::Persistence { .. } => None,
        }
    }
}

pub type CrawlResult<T> = Result<T, CrawlError>;
