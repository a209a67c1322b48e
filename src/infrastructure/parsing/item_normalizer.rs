//! Raw renderer node to `ContentItem` normalization
//!
//! Each node is classified once by the renderer key it carries. Unknown
//! renderers (shelves, ads, new layouts) are skipped with a debug log rather
//! than failing the page.

use serde_json::Value;
use tracing::debug;

use super::context::LocateContext;
use super::numbers::{normalize_count, parse_duration};
use super::tree_path::{lookup, lookup_array, lookup_str, lookup_text, text_of, ExpectedType};
use crate::domain::content_item::{
    ContentItem, ContentKind, CourseSummary, CourseVideo, PlaylistSummary, PostAttachment, PostSummary,
    ShortSummary, VideoSummary,
};

/// Renderer family of a raw node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeClass {
    Video,
    Reel,
    ShortsLockup,
    Lockup,
    Playlist,
    GridPlaylist,
    Post,
    ContinuationMarker,
    Unknown,
}

/// Renderer keys in the order they are probed
const RENDERER_KEYS: [(&str, NodeClass); 10] = [
    ("videoRenderer", NodeClass::Video),
    ("gridVideoRenderer", NodeClass::Video),
    ("reelItemRenderer", NodeClass::Reel),
    ("shortsLockupViewModel", NodeClass::ShortsLockup),
    ("lockupViewModel", NodeClass::Lockup),
    ("playlistRenderer", NodeClass::Playlist),
    ("gridPlaylistRenderer", NodeClass::GridPlaylist),
    ("backstagePostThreadRenderer", NodeClass::Post),
    ("backstagePostRenderer", NodeClass::Post),
    ("continuationItemRenderer", NodeClass::ContinuationMarker),
];

/// Classify a node, returning the renderer body to read fields from
pub fn classify(node: &Value) -> (NodeClass, Option<&Value>) {
    let inner = node
        .get("richItemRenderer")
        .and_then(|rich| rich.get("content"))
        .unwrap_or(node);

    for (key, class) in RENDERER_KEYS {
        if let Some(body) = inner.get(key) {
            let body = match key {
                "backstagePostThreadRenderer" => body
                    .get("post")
                    .and_then(|post| post.get("backstagePostRenderer"))
                    .unwrap_or(body),
                _ => body,
            };
            return (class, Some(body));
        }
    }
    (NodeClass::Unknown, None)
}

/// Turns located nodes into content items
#[derive(Debug, Clone, Copy, Default)]
pub struct ItemNormalizer;

impl ItemNormalizer {
    pub const fn new() -> Self {
        Self
    }

    /// Normalize every node, skipping those that cannot be read
    pub fn normalize_all(&self, nodes: &[&Value], context: &LocateContext) -> Vec<ContentItem> {
        nodes
            .iter()
            .filter_map(|node| self.normalize(node, context))
            .collect()
    }

    pub fn normalize(&self, node: &Value, context: &LocateContext) -> Option<ContentItem> {
        let (class, body) = classify(node);
        let Some(body) = body else {
            debug!(
                channel = %context.channel,
                page = context.page,
                shape = context.shape.as_deref().unwrap_or("-"),
                keys = ?node.as_object().map(|m| m.keys().cloned().collect::<Vec<_>>()),
                "skipping unrecognized node"
            );
            return None;
        };

        let item = match class {
            NodeClass::Video => video_item(body, context.kind),
            NodeClass::Reel => reel_item(body),
            NodeClass::ShortsLockup => shorts_lockup_item(body),
            NodeClass::Lockup => lockup_item(body, context.kind),
            NodeClass::Playlist => playlist_renderer_item(body, context.kind),
            NodeClass::GridPlaylist => grid_playlist_item(body, context.kind),
            NodeClass::Post => post_item(body),
            NodeClass::ContinuationMarker | NodeClass::Unknown => None,
        };

        if item.is_none() {
            debug!(channel = %context.channel, class = ?class, "node lacks an id, skipped");
        }
        item
    }
}

fn non_empty(text: Option<&str>) -> Option<String> {
    text.filter(|s| !s.is_empty()).map(str::to_string)
}

fn is_live(body: &Value) -> bool {
    let badge_live = lookup_array(body, "badges")
        .into_iter()
        .flatten()
        .filter_map(|badge| lookup_str(badge, "metadataBadgeRenderer.style"))
        .any(|style| style == "BADGE_STYLE_TYPE_LIVE_NOW");
    let overlay_live = lookup_array(body, "thumbnailOverlays")
        .into_iter()
        .flatten()
        .filter_map(|overlay| lookup_str(overlay, "thumbnailOverlayTimeStatusRenderer.style"))
        .any(|style| style == "LIVE");
    badge_live || overlay_live
}

fn video_item(body: &Value, kind: ContentKind) -> Option<ContentItem> {
    let id = non_empty(lookup_str(body, "videoId"))?;
    let duration_text = lookup_text(body, "lengthText").or_else(|| {
        lookup_text(body, "thumbnailOverlays[*].thumbnailOverlayTimeStatusRenderer.text")
    });
    let views = lookup_text(body, "viewCountText").or_else(|| lookup_text(body, "shortViewCountText"));

    let summary = VideoSummary {
        id,
        title: lookup_text(body, "title").unwrap_or_default(),
        view_count: views.as_deref().and_then(normalize_count),
        published_text: lookup_text(body, "publishedTimeText"),
        duration_seconds: duration_text.as_deref().and_then(parse_duration),
        thumbnail_url: lookup_str(body, "thumbnail.thumbnails[-1].url").map(str::to_string),
    };

    Some(match kind {
        ContentKind::Shorts => ContentItem::Short(ShortSummary {
            id: summary.id,
            title: summary.title,
            view_count: summary.view_count,
        }),
        ContentKind::Live => ContentItem::LiveVideo(summary),
        _ if is_live(body) => ContentItem::LiveVideo(summary),
        _ => ContentItem::Video(summary),
    })
}

fn reel_item(body: &Value) -> Option<ContentItem> {
    Some(ContentItem::Short(ShortSummary {
        id: non_empty(lookup_str(body, "videoId"))?,
        title: lookup_text(body, "headline").unwrap_or_default(),
        view_count: lookup_text(body, "viewCountText").as_deref().and_then(normalize_count),
    }))
}

fn shorts_lockup_item(body: &Value) -> Option<ContentItem> {
    let id = non_empty(lookup_str(body, "onTap.innertubeCommand.reelWatchEndpoint.videoId")).or_else(|| {
        lookup_str(body, "entityId")
            .and_then(|entity| entity.strip_prefix("shorts-shelf-item-"))
            .and_then(|id| non_empty(Some(id)))
    })?;
    Some(ContentItem::Short(ShortSummary {
        id,
        title: lookup_text(body, "overlayMetadata.primaryText").unwrap_or_default(),
        view_count: lookup_text(body, "overlayMetadata.secondaryText")
            .as_deref()
            .and_then(normalize_count),
    }))
}

/// Count from a label like "22 videos" or "1 episode"
fn leading_count(label: &str) -> Option<u64> {
    label
        .split_whitespace()
        .next()
        .filter(|word| word.chars().next().is_some_and(|c| c.is_ascii_digit()))
        .and_then(normalize_count)
}

fn lockup_item(body: &Value, kind: ContentKind) -> Option<ContentItem> {
    let content_type = lookup_str(body, "contentType").unwrap_or_default();
    let id = non_empty(lookup_str(body, "contentId"))?;
    let thumb = lookup(
        body,
        "contentImage.collectionThumbnailViewModel.primaryThumbnail.thumbnailViewModel",
        ExpectedType::Mapping,
    );

    let item_count = thumb
        .and_then(|t| lookup_array(t, "overlays"))
        .into_iter()
        .flatten()
        .filter_map(|overlay| lookup_array(overlay, "thumbnailOverlayBadgeViewModel.thumbnailBadges"))
        .flatten()
        .filter_map(|badge| lookup_str(badge, "thumbnailBadgeViewModel.text"))
        .find_map(leading_count);

    let summary = PlaylistSummary {
        id,
        title: lookup_text(body, "metadata.lockupMetadataViewModel.title").unwrap_or_default(),
        item_count,
        child_video_ids: Vec::new(),
        thumbnail_url: thumb
            .and_then(|t| lookup_str(t, "image.sources[0].url"))
            .map(str::to_string),
    };

    match content_type {
        "LOCKUP_CONTENT_TYPE_PODCAST" => Some(ContentItem::Podcast(summary)),
        "LOCKUP_CONTENT_TYPE_PLAYLIST" if kind == ContentKind::Podcasts => Some(ContentItem::Podcast(summary)),
        "LOCKUP_CONTENT_TYPE_PLAYLIST" => Some(ContentItem::Playlist(summary)),
        other => {
            debug!(content_type = other, "skipping non-playlist lockup");
            None
        }
    }
}

fn playlist_renderer_item(body: &Value, kind: ContentKind) -> Option<ContentItem> {
    let id = non_empty(lookup_str(body, "playlistId"))?;
    let title = lookup_text(body, "title").unwrap_or_default();
    let count = lookup(body, "videoCount", ExpectedType::Any)
        .and_then(|v| v.as_u64().or_else(|| v.as_str().and_then(normalize_count)))
        .or_else(|| lookup_text(body, "videoCountText").as_deref().and_then(leading_count));
    let thumbnail_url = lookup_str(body, "thumbnails[0].thumbnails[0].url").map(str::to_string);

    let children = lookup_array(body, "videos").map(Vec::as_slice).unwrap_or_default();

    if kind == ContentKind::Courses {
        let videos = children
            .iter()
            .filter_map(|child| child.get("childVideoRenderer"))
            .filter_map(|child| {
                Some(CourseVideo {
                    video_id: non_empty(
                        lookup_str(child, "navigationEndpoint.watchEndpoint.videoId")
                            .or_else(|| lookup_str(child, "videoId")),
                    )?,
                    title: lookup_text(child, "title").unwrap_or_default(),
                    duration_label: lookup_str(child, "lengthText.accessibility.accessibilityData.label")
                        .map(str::to_string)
                        .or_else(|| lookup_text(child, "lengthText")),
                })
            })
            .collect();
        return Some(ContentItem::Course(CourseSummary {
            id,
            title,
            video_count: count,
            thumbnail_url,
            videos,
        }));
    }

    let child_video_ids = children
        .iter()
        .filter_map(|child| lookup_str(child, "childVideoRenderer.videoId"))
        .map(str::to_string)
        .collect();
    let summary = PlaylistSummary {
        id,
        title,
        item_count: count,
        child_video_ids,
        thumbnail_url,
    };
    Some(if kind == ContentKind::Podcasts {
        ContentItem::Podcast(summary)
    } else {
        ContentItem::Playlist(summary)
    })
}

fn grid_playlist_item(body: &Value, kind: ContentKind) -> Option<ContentItem> {
    let summary = PlaylistSummary {
        id: non_empty(lookup_str(body, "playlistId"))?,
        title: lookup_text(body, "title").unwrap_or_default(),
        item_count: lookup_text(body, "videoCountText").as_deref().and_then(leading_count),
        child_video_ids: Vec::new(),
        thumbnail_url: lookup_str(body, "thumbnail.thumbnails[-1].url").map(str::to_string),
    };
    Some(if kind == ContentKind::Podcasts {
        ContentItem::Podcast(summary)
    } else {
        ContentItem::Playlist(summary)
    })
}

fn image_url(image_renderer: &Value) -> Option<String> {
    lookup_str(image_renderer, "image.thumbnails[-1].url").map(str::to_string)
}

fn post_attachment(body: &Value) -> PostAttachment {
    let Some(attachment) = lookup(body, "backstageAttachment", ExpectedType::Mapping) else {
        return PostAttachment::None;
    };

    if let Some(url) = attachment.get("backstageImageRenderer").and_then(image_url) {
        return PostAttachment::Image { url };
    }
    if let Some(images) = lookup_array(attachment, "postMultiImageRenderer.images") {
        let urls = images
            .iter()
            .filter_map(|image| image.get("backstageImageRenderer"))
            .filter_map(image_url)
            .collect();
        return PostAttachment::MultiImage { urls };
    }
    if let Some(video_id) = lookup_str(attachment, "videoRenderer.videoId") {
        return PostAttachment::Video {
            video_id: video_id.to_string(),
        };
    }
    if let Some(choices) = lookup_array(attachment, "pollRenderer.choices") {
        let choices = choices
            .iter()
            .filter_map(|choice| choice.get("text").and_then(text_of))
            .collect();
        return PostAttachment::Poll { choices };
    }
    PostAttachment::None
}

fn post_item(body: &Value) -> Option<ContentItem> {
    Some(ContentItem::Post(PostSummary {
        id: non_empty(lookup_str(body, "postId"))?,
        text: lookup_text(body, "contentText").unwrap_or_default(),
        published_text: lookup_str(body, "publishedTimeText.runs[0].text").map(str::to_string),
        like_count: lookup_text(body, "voteCount").as_deref().and_then(normalize_count),
        attachment: post_attachment(body),
    }))
}
