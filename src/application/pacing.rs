//! Time and randomness sources for crawl pacing
//!
//! The crawler never sleeps or draws random numbers directly. It goes
//! through `Clock` and `RandomSource` so tests can replay a crawl exactly.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

#[async_trait]
pub trait Clock: Send + Sync {
    /// Suspend for `duration`; returns `false` if cancelled first
    async fn sleep(&self, duration: Duration, cancel: &CancellationToken) -> bool;
}

/// Tokio-backed clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    async fn sleep(&self, duration: Duration, cancel: &CancellationToken) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(duration) => true,
            _ = cancel.cancelled() => false,
        }
    }
}

pub trait RandomSource: Send + Sync {
    /// Uniform draw from the inclusive range `[low, high]`
    fn between(&self, low: u64, high: u64) -> u64;
}

/// `fastrand`-backed source; seed it for reproducible runs
#[derive(Debug)]
pub struct FastRandSource {
    rng: Mutex<fastrand::Rng>,
}

impl FastRandSource {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(fastrand::Rng::new()),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(fastrand::Rng::with_seed(seed)),
        }
    }
}

impl Default for FastRandSource {
    fn default() -> Self {
        Self::new()
    }
}

impl RandomSource for FastRandSource {
    fn between(&self, low: u64, high: u64) -> u64 {
        if high <= low {
            return low;
        }
        match self.rng.lock() {
            Ok(mut rng) => rng.u64(low..=high),
            Err(_) => low,
        }
    }
}

/// Randomized inter-page delay bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageDelay {
    pub min: Duration,
    pub max: Duration,
}

impl PageDelay {
    /// Bounds in milliseconds; a reversed pair is reordered
    pub fn from_millis(min_ms: u64, max_ms: u64) -> Self {
        let (low, high) = if min_ms <= max_ms { (min_ms, max_ms) } else { (max_ms, min_ms) };
        Self {
            min: Duration::from_millis(low),
            max: Duration::from_millis(high),
        }
    }

    pub fn draw(&self, random: &dyn RandomSource) -> Duration {
        let low = self.min.as_millis() as u64;
        let high = self.max.as_millis() as u64;
        Duration::from_millis(random.between(low, high))
    }
}
