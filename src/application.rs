//! Application layer module
//!
//! The pagination crawler, its pacing and limit helpers, and the use cases
//! that wire them to the infrastructure.

pub mod limit_controller;
pub mod pacing;
pub mod pagination_crawler;
pub mod use_cases;

pub use pacing::{Clock, FastRandSource, PageDelay, RandomSource, SystemClock};
pub use pagination_crawler::{CrawlRequest, CrawlSettings, PaginationCrawler};
pub use use_cases::{CrawlOptions, HarvestUseCases, JsonLinesSink, StatusSummary};
