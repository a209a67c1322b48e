//! Locate context for page extraction
//!
//! Carries what the extractor needs to know about the page it is reading.

use crate::domain::content_item::ContentKind;

/// Context information for locating and normalizing one page
#[derive(Debug, Clone)]
pub struct LocateContext {
    /// Channel the page belongs to
    pub channel: String,

    /// Kind of content being enumerated
    pub kind: ContentKind,

    /// Zero-based page index within the crawl
    pub page: u32,

    /// Name of the shape pattern the item list was found with
    pub shape: Option<String>,
}

impl LocateContext {
    pub fn new(channel: impl Into<String>, kind: ContentKind) -> Self {
        Self {
            channel: channel.into(),
            kind,
            page: 0,
            shape: None,
        }
    }

    pub fn at_page(mut self, page: u32) -> Self {
        self.page = page;
        self
    }

    pub fn with_shape(mut self, shape: impl Into<String>) -> Self {
        self.shape = Some(shape.into());
        self
    }
}
