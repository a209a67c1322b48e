//! Failures reported across the collaborator seams
//!
//! `ExtractionError` says why a page tree could not be read, `FetchError`
//! why a page could not be obtained and `MaterializeError` why one item could
//! not be turned into a full record.

use thiserror::Error;

use crate::domain::content_item::ContentKind;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("No known {phase} layout matched for {kind} (tried: {})", tried_shapes.join(", "))]
    StructureNotFound {
        kind: ContentKind,
        phase: &'static str,
        tried_shapes: Vec<String>,
    },

    #[error("Expected section '{section}' is missing: {detail}")]
    MissingExpectedSection { section: String, detail: String },

    #[error("Embedded '{variable}' data not found in page ({tried_patterns} patterns tried)")]
    InitialDataNotFound {
        variable: &'static str,
        tried_patterns: usize,
    },

    #[error("Invalid payload: {message}")]
    InvalidPayload { message: String },
}

impl ExtractionError {
    pub fn structure_not_found(kind: ContentKind, is_continuation: bool, tried_shapes: Vec<String>) -> Self {
        Self::StructureNotFound {
            kind,
            phase: if is_continuation { "continuation" } else { "first-page" },
            tried_shapes,
        }
    }

    pub fn missing_section(section: &str, detail: impl Into<String>) -> Self {
        Self::MissingExpectedSection {
            section: section.to_string(),
            detail: detail.into(),
        }
    }

    pub fn invalid_payload(message: impl Into<String>) -> Self {
        Self::InvalidPayload {
            message: message.into(),
        }
    }

    /// Only a garbled payload is worth refetching
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::InvalidPayload { .. })
    }

    /// The page was readable but its layout was not
    pub const fn is_structural(&self) -> bool {
        matches!(self, Self::StructureNotFound { .. } | Self::MissingExpectedSection { .. })
    }
}

pub type ExtractionResult<T> = Result<T, ExtractionError>;

/// Failure of the fetch collaborator
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("Transient fetch failure for {url}: {reason}")]
    Transient {
        url: String,
        reason: String,
        retry_after_seconds: Option<u64>,
    },

    #[error("HTTP request failed: {status} - {url}")]
    Http { status: u16, url: String },

    #[error("Not found: {url}")]
    NotFound { url: String },

    #[error("Failed to decode response from {url}: {reason}")]
    Decode { url: String, reason: String },

    #[error("Page data unreadable for {url}: {source}")]
    PageData {
        url: String,
        #[source]
        source: ExtractionError,
    },

    #[error("Request cancelled")]
    Cancelled,
}

impl FetchError {
    pub fn transient(url: &str, reason: impl Into<String>) -> Self {
        Self::Transient {
            url: url.to_string(),
            reason: reason.into(),
            retry_after_seconds: None,
        }
    }

    pub fn from_status(status: u16, url: &str) -> Self {
        match status {
            404 | 410 => Self::NotFound { url: url.to_string() },
            429 => Self::Transient {
                url: url.to_string(),
                reason: "rate limited".to_string(),
                retry_after_seconds: Some(60),
            },
            _ => Self::Http {
                status,
                url: url.to_string(),
            },
        }
    }

    /// Everything except a missing page and cancellation is worth another attempt
    pub const fn is_recoverable(&self) -> bool {
        !matches!(self, Self::NotFound { .. } | Self::Cancelled)
    }

    /// Server-suggested delay before the next attempt
    pub fn retry_delay_seconds(&self) -> Option<u64> {
        match self {
            Self::Transient {
                retry_after_seconds, ..
            } => *retry_after_seconds,
            Self::Http { status, .. } if *status >= 500 => Some(5),
            _ => None,
        }
    }
}

pub type FetchResult<T> = Result<T, FetchError>;

/// Failure of the item materializer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MaterializeError {
    #[error("Item {content_id} is unavailable: {reason}")]
    ItemUnavailable { content_id: String, reason: String },

    #[error("Materializing {content_id} failed: {reason}")]
    Transient { content_id: String, reason: String },
}

impl MaterializeError {
    pub fn unavailable(content_id: &str, reason: impl Into<String>) -> Self {
        Self::ItemUnavailable {
            content_id: content_id.to_string(),
            reason: reason.into(),
        }
    }

    pub fn transient(content_id: &str, reason: impl Into<String>) -> Self {
        Self::Transient {
            content_id: content_id.to_string(),
            reason: reason.into(),
        }
    }
}
