//! Infrastructure layer for transport, parsing, persistence and logging

pub mod config;
pub mod crawl_error;
pub mod database_connection;
pub mod http_client;
pub mod ingest_repository;
pub mod innertube_client;
pub mod logging;
pub mod materializer;
pub mod parsing;
pub mod retry_manager;

// Re-export commonly used items
pub use config::{AppConfig, ConfigManager};
pub use crawl_error::{CrawlError, CrawlResult};
pub use database_connection::DatabaseConnection;
pub use http_client::HttpClient;
pub use ingest_repository::{InMemoryIngestRepository, SqliteIngestRepository};
pub use innertube_client::InnertubeFetcher;
pub use logging::{get_log_directory, init_logging, init_logging_with_config};
pub use materializer::{ListingMaterializer, WatchPageMaterializer};
pub use retry_manager::{BackoffPolicy, ErrorClassification};
