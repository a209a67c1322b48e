//! Page tree parsing infrastructure
//!
//! Turns fetched page trees into content items: embedded data extraction,
//! multi-shape list location, and per-renderer normalization.

pub mod error;
pub mod tree_path;
pub mod numbers;
pub mod context;
pub mod config;
pub mod page_data;
pub mod content_locator;
pub mod item_normalizer;
pub mod channel_metadata;

// Re-export public types
pub use error::{ExtractionError, ExtractionResult};
pub use context::LocateContext;
pub use config::{PagePhase, ShapeCatalog, ShapePattern, ShapeSet};
pub use tree_path::{ExpectedType, KeyPath};
pub use page_data::{InnertubeSession, PageData, PageDataExtractor};
pub use content_locator::{ContentLocator, LocatedPage};
pub use item_normalizer::ItemNormalizer;
pub use channel_metadata::ChannelMetadataParser;

use serde_json::Value;

/// Extractor over a decoded page tree with contextual information
pub trait ContextualExtractor {
    type Output;
    type Context;

    /// Extract from `tree` using the given context
    fn extract_with_context(&self, tree: &Value, context: &Self::Context) -> ExtractionResult<Self::Output>;
}
