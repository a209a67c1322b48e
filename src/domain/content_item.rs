//! Content items discovered on a channel
//!
//! A `ContentItem` is the normalized form of one renderer node. The variant is
//! decided once during normalization so downstream code switches on the
//! discriminant instead of re-probing the raw tree.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::platform;

/// Category of enumeration being performed on a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Videos,
    Shorts,
    Live,
    Podcasts,
    Playlists,
    Courses,
    Posts,
}

impl ContentKind {
    pub const ALL: [Self; 7] = [
        Self::Videos,
        Self::Shorts,
        Self::Live,
        Self::Podcasts,
        Self::Playlists,
        Self::Courses,
        Self::Posts,
    ];

    /// Stable identifier used in storage and logs
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Videos => "videos",
            Self::Shorts => "shorts",
            Self::Live => "live",
            Self::Podcasts => "podcasts",
            Self::Playlists => "playlists",
            Self::Courses => "courses",
            Self::Posts => "posts",
        }
    }

    /// Path segment of the channel tab listing this kind
    pub const fn tab_path(self) -> &'static str {
        match self {
            Self::Live => "streams",
            other => other.as_str(),
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "videos" | "video" => Ok(Self::Videos),
            "shorts" | "short" => Ok(Self::Shorts),
            "live" | "streams" | "stream" => Ok(Self::Live),
            "podcasts" | "podcast" => Ok(Self::Podcasts),
            "playlists" | "playlist" => Ok(Self::Playlists),
            "courses" | "course" => Ok(Self::Courses),
            "posts" | "post" | "community" => Ok(Self::Posts),
            other => Err(format!("unknown content kind: {other}")),
        }
    }
}

/// Fields shared by long-form, live and podcast episode videos
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoSummary {
    pub id: String,
    pub title: String,
    pub view_count: Option<u64>,
    pub published_text: Option<String>,
    pub duration_seconds: Option<u64>,
    pub thumbnail_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShortSummary {
    pub id: String,
    pub title: String,
    pub view_count: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistSummary {
    pub id: String,
    pub title: String,
    pub item_count: Option<u64>,
    /// Only populated when the listing embeds child entries
    pub child_video_ids: Vec<String>,
    pub thumbnail_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseVideo {
    pub video_id: String,
    pub title: String,
    pub duration_label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseSummary {
    pub id: String,
    pub title: String,
    pub video_count: Option<u64>,
    pub thumbnail_url: Option<String>,
    pub videos: Vec<CourseVideo>,
}

/// Media attached to a community post
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PostAttachment {
    None,
    Image { url: String },
    MultiImage { urls: Vec<String> },
    Video { video_id: String },
    Poll { choices: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostSummary {
    pub id: String,
    /// Post body; doubles as the title
    pub text: String,
    pub published_text: Option<String>,
    pub like_count: Option<u64>,
    pub attachment: PostAttachment,
}

/// One enumerated piece of channel content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentItem {
    Video(VideoSummary),
    Short(ShortSummary),
    LiveVideo(VideoSummary),
    Podcast(PlaylistSummary),
    Playlist(PlaylistSummary),
    Course(CourseSummary),
    Post(PostSummary),
}

impl ContentItem {
    /// Stable platform id
    pub fn id(&self) -> &str {
        match self {
            Self::Video(v) | Self::LiveVideo(v) => &v.id,
            Self::Short(s) => &s.id,
            Self::Podcast(p) | Self::Playlist(p) => &p.id,
            Self::Course(c) => &c.id,
            Self::Post(p) => &p.id,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Self::Video(v) | Self::LiveVideo(v) => &v.title,
            Self::Short(s) => &s.title,
            Self::Podcast(p) | Self::Playlist(p) => &p.title,
            Self::Course(c) => &c.title,
            Self::Post(p) => &p.text,
        }
    }

    /// Whether the item is backed by a single watchable video
    pub const fn is_video_like(&self) -> bool {
        matches!(self, Self::Video(_) | Self::LiveVideo(_) | Self::Short(_))
    }

    /// Canonical URL, computed on demand from the id
    pub fn url(&self) -> String {
        match self {
            Self::Video(v) | Self::LiveVideo(v) => platform::watch_url(&v.id),
            Self::Short(s) => platform::shorts_url(&s.id),
            Self::Podcast(p) | Self::Playlist(p) => platform::playlist_url(&p.id),
            Self::Course(c) => platform::playlist_url(&c.id),
            Self::Post(p) => platform::post_url(&p.id),
        }
    }
}
