//! Channel-level metadata

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::platform;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelMetadata {
    /// Platform channel id (`UC...`)
    pub channel_id: Option<String>,
    /// Handle the channel was requested by, without the leading `@`
    pub handle: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub rss_url: Option<String>,
    pub vanity_url: Option<String>,
    pub keywords: Vec<String>,
    pub is_family_safe: Option<bool>,
    pub available_country_codes: Vec<String>,
    /// Country as shown in the about panel
    pub country: Option<String>,
    pub joined_date: Option<NaiveDate>,
    pub subscriber_count: Option<u64>,
    pub video_count: Option<u64>,
    /// Lifetime views across all uploads
    pub view_count: Option<u64>,
    pub verified: bool,
    pub external_urls: Vec<ExternalLink>,
    /// Featured channels listed on the home tab
    pub linked_channels: Vec<LinkedChannel>,
    /// Avatar images, smallest first
    pub thumbnails: Vec<Thumbnail>,
    pub banners: Vec<Thumbnail>,
}

impl ChannelMetadata {
    pub fn new(handle: impl Into<String>) -> Self {
        Self {
            handle: handle.into(),
            ..Self::default()
        }
    }

    pub fn channel_url(&self) -> String {
        platform::channel_url(&self.handle)
    }
}

/// Link from the channel header or about panel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalLink {
    pub title: Option<String>,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkedChannel {
    pub handle: String,
    pub subscriber_count: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thumbnail {
    pub url: String,
    pub width: Option<u64>,
    pub height: Option<u64>,
    /// Banner variant (`banner`, `tvBanner`, `mobileBanner`); absent for avatars
    pub display_hint: Option<String>,
}
