//! Domain module - content model, ingest tracking and crawl state
//!
//! Each module is its own file in the domain/ directory; commonly used
//! items are re-exported here.

pub mod channel;
pub mod content_item;
pub mod crawl_state;
pub mod errors;
pub mod ingest;
pub mod platform;
pub mod repositories;
pub mod services;

pub use channel::ChannelMetadata;
pub use content_item::{ContentItem, ContentKind};
pub use crawl_state::{CrawlPhase, CrawlReport, CrawlRunState, PageCursor, StopReason};
pub use errors::{ExtractionError, FetchError, FetchResult, MaterializeError};
pub use ingest::{IngestAction, IngestEvent, IngestRecord, IngestScope, IngestStateMachine, IngestStatus};
pub use repositories::IngestRepository;
pub use services::{CollectingSink, ItemMaterializer, MaterializedRecord, PageFetcher, PageRequest, RecordSink};
