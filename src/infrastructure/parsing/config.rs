//! Shape catalog for locating content lists in page trees
//!
//! Centralized, ordered layouts per content kind and page phase. Earlier
//! patterns win, so the most specific or most recently observed layout goes
//! first. The catalog is plain data and can be replaced from the config file.

use serde::{Deserialize, Serialize};

use super::tree_path::{ExpectedType, KeyPath, PathSegment};
use crate::domain::content_item::ContentKind;

/// First page of a tab, or a page fetched with a continuation token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PagePhase {
    FirstPage,
    Continuation,
}

impl PagePhase {
    pub const fn from_continuation(is_continuation: bool) -> Self {
        if is_continuation { Self::Continuation } else { Self::FirstPage }
    }
}

/// One known layout: where the item list lives, and optionally where a
/// token lives when it is not carried by a trailing marker node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShapePattern {
    pub name: String,
    pub items: KeyPath,
    #[serde(default)]
    pub items_type: ExpectedType,
    #[serde(default)]
    pub token: Option<KeyPath>,
}

impl ShapePattern {
    /// Build a pattern from dotted paths. A malformed path becomes the empty
    /// path, which resolves to the root mapping and never matches a list.
    fn builtin(name: &str, items: &str, token: Option<&str>) -> Self {
        let parse = |path: &str| -> KeyPath {
            path.parse().unwrap_or_else(|e| {
                tracing::error!("built-in shape '{}' has a bad path: {}", name, e);
                KeyPath::new(Vec::new())
            })
        };
        Self {
            name: name.to_string(),
            items: parse(items),
            items_type: ExpectedType::Sequence,
            token: token.map(parse),
        }
    }
}

/// Depth-bounded search for a renderer that drifted away from every known path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyFallback {
    /// Key searched for anywhere in the tree
    pub key: String,
    /// Path from the found node to the item list
    pub items: KeyPath,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShapeSet {
    pub kind: ContentKind,
    pub phase: PagePhase,
    pub patterns: Vec<ShapePattern>,
    #[serde(default)]
    pub fallback: Option<KeyFallback>,
}

impl ShapeSet {
    pub fn pattern_names(&self) -> Vec<String> {
        self.patterns.iter().map(|p| p.name.clone()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShapeCatalog {
    /// Paths to the token inside a continuation marker node, tried in order
    pub marker_tokens: Vec<KeyPath>,
    pub sets: Vec<ShapeSet>,
}

impl ShapeCatalog {
    pub fn set_for(&self, kind: ContentKind, phase: PagePhase) -> Option<&ShapeSet> {
        self.sets.iter().find(|set| set.kind == kind && set.phase == phase)
    }

    /// Marker nodes are keyed by this renderer name
    pub const MARKER_KEY: &'static str = "continuationItemRenderer";
}

const TAB_CONTENT: &str = "contents.twoColumnBrowseResultsRenderer.tabs[*].tabRenderer.content";

fn rich_grid() -> ShapePattern {
    ShapePattern::builtin("rich_grid", &format!("{TAB_CONTENT}.richGridRenderer.contents"), None)
}

fn section_grid() -> ShapePattern {
    let grid = format!(
        "{TAB_CONTENT}.sectionListRenderer.contents[*].itemSectionRenderer.contents[*].gridRenderer"
    );
    ShapePattern::builtin(
        "section_grid",
        &format!("{grid}.items"),
        Some(&format!("{grid}.continuations[0].nextContinuationData.continuation")),
    )
}

fn section_items() -> ShapePattern {
    ShapePattern::builtin(
        "section_items",
        &format!("{TAB_CONTENT}.sectionListRenderer.contents[*].itemSectionRenderer.contents"),
        None,
    )
}

fn continuation_patterns() -> Vec<ShapePattern> {
    vec![
        ShapePattern::builtin(
            "append_actions",
            "onResponseReceivedActions[*].appendContinuationItemsAction.continuationItems",
            None,
        ),
        ShapePattern::builtin(
            "append_endpoints",
            "onResponseReceivedEndpoints[*].appendContinuationItemsAction.continuationItems",
            None,
        ),
        ShapePattern::builtin(
            "reload_actions",
            "onResponseReceivedActions[*].reloadContinuationItemsCommand.continuationItems",
            None,
        ),
        ShapePattern::builtin(
            "grid_continuation",
            "continuationContents.gridContinuation.items",
            Some("continuationContents.gridContinuation.continuations[0].nextContinuationData.continuation"),
        ),
    ]
}

fn first_page_patterns(kind: ContentKind) -> Vec<ShapePattern> {
    match kind {
        ContentKind::Posts => vec![section_items(), rich_grid()],
        ContentKind::Playlists | ContentKind::Podcasts => vec![rich_grid(), section_grid(), section_items()],
        _ => vec![rich_grid(), section_grid()],
    }
}

fn first_page_fallback(kind: ContentKind) -> KeyFallback {
    let (key, items) = match kind {
        ContentKind::Posts => ("itemSectionRenderer", "contents"),
        _ => ("richGridRenderer", "contents"),
    };
    KeyFallback {
        key: key.to_string(),
        items: KeyPath::new(vec![PathSegment::Key(items.to_string())]),
    }
}

impl Default for ShapeCatalog {
    fn default() -> Self {
        let mut sets = Vec::with_capacity(ContentKind::ALL.len() * 2);
        for kind in ContentKind::ALL {
            sets.push(ShapeSet {
                kind,
                phase: PagePhase::FirstPage,
                patterns: first_page_patterns(kind),
                fallback: Some(first_page_fallback(kind)),
            });
            sets.push(ShapeSet {
                kind,
                phase: PagePhase::Continuation,
                patterns: continuation_patterns(),
                fallback: None,
            });
        }

        Self {
            marker_tokens: vec![
                KeyPath::from_keys(&[
                    ShapeCatalog::MARKER_KEY,
                    "continuationEndpoint",
                    "continuationCommand",
                    "token",
                ]),
                KeyPath::from_keys(&[
                    ShapeCatalog::MARKER_KEY,
                    "button",
                    "buttonRenderer",
                    "command",
                    "continuationCommand",
                    "token",
                ]),
            ],
            sets,
        }
    }
}
