//! Channel metadata parser
//!
//! Reads `channelMetadataRenderer`, the page header and the about panel from
//! a channel page's initial data. Only the renderer is required; every other
//! section fills in what it can and is skipped when absent.

use std::collections::HashSet;

use chrono::NaiveDate;
use serde_json::Value;
use tracing::debug;

use super::context::LocateContext;
use super::numbers::{normalize_count, split_quoted};
use super::page_data::PageData;
use super::tree_path::{find_key, lookup, lookup_array, lookup_str, lookup_text, text_of, ExpectedType};
use super::ContextualExtractor;
use crate::domain::channel::{ChannelMetadata, ExternalLink, LinkedChannel, Thumbnail};
use crate::domain::errors::{ExtractionError, ExtractionResult};
use crate::infrastructure::config::defaults;

const METADATA_RENDERER: &str = "channelMetadataRenderer";
const ABOUT_VIEW_MODEL: &str = "aboutChannelViewModel";
const PAGE_HEADER: &str = "header.pageHeaderRenderer.content.pageHeaderViewModel";
const HEADER_ROWS: &str =
    "header.pageHeaderRenderer.content.pageHeaderViewModel.metadata.contentMetadataViewModel.metadataRows";
const AVATAR_SOURCES: &str = "image.decoratedAvatarViewModel.avatar.avatarViewModel.image.sources";
const BANNER_VARIANTS: [&str; 3] = ["banner", "tvBanner", "mobileBanner"];
const HEADER_RENDERERS: [&str; 2] = ["c4TabbedHeaderRenderer", "pageHeaderRenderer"];
const SHELF_ITEMS: &str = "contents.twoColumnBrowseResultsRenderer.tabs";
const JOINED_PREFIX: &str = "Joined ";
const JOINED_FORMAT: &str = "%b %d, %Y";

#[derive(Debug, Clone)]
pub struct ChannelMetadataParser {
    find_key_max_depth: usize,
}

impl Default for ChannelMetadataParser {
    fn default() -> Self {
        Self {
            find_key_max_depth: defaults::FIND_KEY_MAX_DEPTH,
        }
    }
}

impl ChannelMetadataParser {
    pub fn new(find_key_max_depth: usize) -> Self {
        Self { find_key_max_depth }
    }

    /// Parse metadata and merge in what the raw page revealed
    pub fn parse_page(&self, page: &PageData, context: &LocateContext) -> ExtractionResult<ChannelMetadata> {
        let mut metadata = self.extract_with_context(&page.initial_data, context)?;
        if metadata.channel_id.is_none() {
            metadata.channel_id = page.channel_id.clone();
        }
        metadata.verified = page.verified;
        Ok(metadata)
    }

    fn metadata_renderer<'a>(&self, tree: &'a Value) -> Option<&'a Value> {
        lookup(tree, "metadata.channelMetadataRenderer", ExpectedType::Mapping).or_else(|| {
            debug!("channel metadata not at its usual path, searching");
            find_key(tree, METADATA_RENDERER, self.find_key_max_depth).filter(|v| v.is_object())
        })
    }

    fn about_panel<'a>(&self, tree: &'a Value) -> Option<&'a Value> {
        find_key(tree, ABOUT_VIEW_MODEL, self.find_key_max_depth).filter(|v| v.is_object())
    }
}

/// First header row part whose text mentions `label`, as a count
fn header_count(tree: &Value, label: &str) -> Option<u64> {
    lookup_array(tree, HEADER_ROWS)?
        .iter()
        .filter_map(|row| lookup_array(row, "metadataParts"))
        .flatten()
        .filter_map(|part| lookup_str(part, "text.content"))
        .find(|content| content.contains(label))
        .and_then(normalize_count)
}

fn string_field(renderer: &Value, key: &str) -> Option<String> {
    renderer
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn count_text(node: &Value, key: &str) -> Option<u64> {
    node.get(key).and_then(text_of).as_deref().and_then(normalize_count)
}

fn absolute_url(url: &str) -> String {
    if url.starts_with("//") {
        format!("https:{url}")
    } else {
        url.to_string()
    }
}

fn thumbnails(sources: &[Value], display_hint: Option<&str>) -> Vec<Thumbnail> {
    sources
        .iter()
        .filter_map(|source| {
            let url = source.get("url").and_then(Value::as_str)?;
            Some(Thumbnail {
                url: absolute_url(url),
                width: source.get("width").and_then(Value::as_u64),
                height: source.get("height").and_then(Value::as_u64),
                display_hint: display_hint.map(str::to_string),
            })
        })
        .collect()
}

fn avatar(tree: &Value, renderer: &Value) -> Vec<Thumbnail> {
    let sources = lookup_array(tree, &format!("{PAGE_HEADER}.{AVATAR_SOURCES}"))
        .or_else(|| lookup_array(renderer, "avatar.thumbnails"));
    sources.map(|s| thumbnails(s, None)).unwrap_or_default()
}

fn banners(tree: &Value) -> Vec<Thumbnail> {
    BANNER_VARIANTS
        .iter()
        .filter_map(|variant| {
            let path = format!("{PAGE_HEADER}.{variant}.imageBannerViewModel.image.sources");
            lookup_array(tree, &path).map(|sources| thumbnails(sources, Some(*variant)))
        })
        .flatten()
        .collect()
}

/// `"Joined Mar 3, 2011"` as a date
fn joined_date(text: &str) -> Option<NaiveDate> {
    let date = text.trim().strip_prefix(JOINED_PREFIX).unwrap_or(text).trim();
    NaiveDate::parse_from_str(date, JOINED_FORMAT).ok()
}

/// About panel links carry the target without a scheme
fn about_links(panel: &Value) -> Vec<ExternalLink> {
    panel
        .get("links")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|link| link.get("channelExternalLinkViewModel"))
        .filter_map(|model| {
            let target = lookup_str(model, "link.content").filter(|s| !s.is_empty())?;
            let bare = target
                .trim_start_matches("https://")
                .trim_start_matches("http://");
            Some(ExternalLink {
                title: lookup_str(model, "title.content").map(str::to_string),
                url: format!("https://{bare}"),
            })
        })
        .collect()
}

fn header_links(tree: &Value) -> Vec<ExternalLink> {
    HEADER_RENDERERS
        .iter()
        .filter_map(|renderer| {
            lookup_array(tree, &format!("header.{renderer}.headerLinks.channelHeaderLinksRenderer.primaryLinks"))
        })
        .flatten()
        .filter_map(|link| {
            let url = lookup_str(link, "navigationEndpoint.urlEndpoint.url")?;
            Some(ExternalLink {
                title: lookup_text(link, "title"),
                url: url.to_string(),
            })
        })
        .collect()
}

/// Featured channels from the home tab's horizontal shelves
fn linked_channels(tree: &Value) -> Vec<LinkedChannel> {
    let Some(tabs) = lookup_array(tree, SHELF_ITEMS) else {
        return Vec::new();
    };
    tabs.iter()
        .filter_map(|tab| lookup_array(tab, "tabRenderer.content.sectionListRenderer.contents"))
        .flatten()
        .filter_map(|section| lookup_array(section, "itemSectionRenderer.contents"))
        .flatten()
        .filter_map(|shelf| lookup_array(shelf, "shelfRenderer.content.horizontalListRenderer.items"))
        .flatten()
        .filter_map(|item| item.get("gridChannelRenderer"))
        .filter_map(|channel| {
            let url = lookup_str(channel, "navigationEndpoint.commandMetadata.webCommandMetadata.url")?;
            let subscribers = lookup_text(channel, "subscriberCountText")?;
            let handle = url.trim_start_matches('/').trim_start_matches('@');
            (!handle.is_empty()).then(|| LinkedChannel {
                handle: handle.to_string(),
                subscriber_count: normalize_count(&subscribers),
            })
        })
        .collect()
}

fn dedup_by<T, K: Eq + std::hash::Hash>(items: Vec<T>, key: impl Fn(&T) -> K) -> Vec<T> {
    let mut seen = HashSet::new();
    items.into_iter().filter(|item| seen.insert(key(item))).collect()
}

impl ContextualExtractor for ChannelMetadataParser {
    type Output = ChannelMetadata;
    type Context = LocateContext;

    fn extract_with_context(&self, tree: &Value, context: &Self::Context) -> ExtractionResult<Self::Output> {
        let renderer = self.metadata_renderer(tree).ok_or_else(|| {
            ExtractionError::missing_section(METADATA_RENDERER, format!("no channel metadata for {}", context.channel))
        })?;

        let mut metadata = ChannelMetadata::new(context.channel.trim_start_matches('@'));
        metadata.channel_id = string_field(renderer, "externalId");
        metadata.title = string_field(renderer, "title");
        metadata.description = string_field(renderer, "description");
        metadata.rss_url = string_field(renderer, "rssUrl");
        metadata.vanity_url = string_field(renderer, "vanityChannelUrl");
        metadata.keywords = renderer
            .get("keywords")
            .and_then(Value::as_str)
            .map(split_quoted)
            .unwrap_or_default();
        metadata.is_family_safe = renderer.get("isFamilySafe").and_then(Value::as_bool);
        metadata.available_country_codes = renderer
            .get("availableCountryCodes")
            .and_then(Value::as_array)
            .map(|codes| codes.iter().filter_map(Value::as_str).map(str::to_string).collect())
            .unwrap_or_default();
        metadata.subscriber_count = header_count(tree, "subscriber");
        metadata.video_count = header_count(tree, "video");
        metadata.view_count = lookup_text(tree, "header.c4TabbedHeaderRenderer.viewCountText")
            .as_deref()
            .and_then(normalize_count);
        metadata.thumbnails = avatar(tree, renderer);
        metadata.banners = banners(tree);

        let mut links = header_links(tree);
        if let Some(panel) = self.about_panel(tree) {
            metadata.view_count = count_text(panel, "viewCountText").or(metadata.view_count);
            metadata.subscriber_count = metadata
                .subscriber_count
                .or_else(|| count_text(panel, "subscriberCountText"));
            metadata.video_count = metadata.video_count.or_else(|| count_text(panel, "videoCountText"));
            metadata.country = panel.get("country").and_then(text_of).filter(|s| !s.is_empty());
            metadata.joined_date = panel
                .get("joinedDateText")
                .and_then(text_of)
                .as_deref()
                .and_then(joined_date);
            if metadata.description.is_none() {
                metadata.description = panel.get("description").and_then(text_of).filter(|s| !s.is_empty());
            }
            links.extend(about_links(panel));
        } else {
            debug!("no about panel for {}", context.channel);
        }
        metadata.external_urls = dedup_by(links, |link| link.url.clone());
        metadata.linked_channels = dedup_by(linked_channels(tree), |channel| channel.handle.clone());
        Ok(metadata)
    }
}
