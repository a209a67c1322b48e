//! Retry classification and backoff for page fetches
//!
//! Decides whether a failed page attempt is worth repeating and how long to
//! wait first: `base * 2^(attempt-1)` plus jitter, capped, with any
//! server-suggested delay taking precedence when it is longer.

use std::time::Duration;

use crate::application::pacing::RandomSource;
use crate::infrastructure::config::CrawlConfig;
use crate::domain::errors::{ExtractionError, FetchError};

/// Classification of one failed page attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorClassification {
    /// Worth another attempt after the given minimum delay
    Recoverable { retry_after: Option<Duration> },
    /// Shape mismatch; retrying will not help
    Structural(ExtractionError),
    /// Permanent transport failure
    NonRecoverable { reason: String },
    Cancelled,
}

impl ErrorClassification {
    pub fn of_fetch(error: &FetchError) -> Self {
        match error {
            FetchError::Cancelled => Self::Cancelled,
            FetchError::PageData { source, .. } => Self::of_extraction(source),
            e if e.is_recoverable() => Self::Recoverable {
                retry_after: e.retry_delay_seconds().map(Duration::from_secs),
            },
            e => Self::NonRecoverable { reason: e.to_string() },
        }
    }

    pub fn of_extraction(error: &ExtractionError) -> Self {
        if error.is_structural() {
            Self::Structural(error.clone())
        } else {
            Self::Recoverable { retry_after: None }
        }
    }
}

/// Exponential backoff with jitter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub max_retries: u32,
    pub base: Duration,
    pub max: Duration,
}

impl BackoffPolicy {
    pub fn from_config(config: &CrawlConfig) -> Self {
        Self {
            max_retries: config.max_fetch_retries,
            base: Duration::from_millis(config.backoff_base_ms),
            max: Duration::from_millis(config.backoff_max_ms),
        }
    }

    /// Whether attempt number `attempt` (1-based, counting failures) may be followed by another
    pub const fn allows_retry_after(&self, attempt: u32) -> bool {
        attempt <= self.max_retries
    }

    /// Delay before retrying after failed attempt `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32, random: &dyn RandomSource) -> Duration {
        let base_ms = self.base.as_millis() as u64;
        let exponent = attempt.saturating_sub(1).min(32);
        let exponential = base_ms.saturating_mul(1_u64 << exponent);
        let jitter = random.between(0, base_ms / 2);
        let total = exponential.saturating_add(jitter).min(self.max.as_millis() as u64);
        Duration::from_millis(total)
    }

    /// Delay honouring a server hint when it is longer than the computed backoff
    pub fn delay_with_hint(&self, attempt: u32, hint: Option<Duration>, random: &dyn RandomSource) -> Duration {
        let computed = self.delay_for(attempt, random);
        hint.map_or(computed, |hint| hint.max(computed))
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from_config(&CrawlConfig::default())
    }
}
