//! Multi-shape content list locator
//!
//! Tries the ordered shape patterns for a (kind, phase) pair and returns the
//! raw item nodes of the first non-empty list, with the trailing continuation
//! marker split off and turned into the next token.

use serde_json::Value;
use tracing::{debug, warn};

use super::config::{PagePhase, ShapeCatalog, ShapePattern, ShapeSet};
use super::tree_path::{find_key, resolve, ExpectedType};
use crate::domain::content_item::ContentKind;
use crate::domain::errors::{ExtractionError, ExtractionResult};
use crate::infrastructure::config::defaults;

/// Items and token found on one page
#[derive(Debug, Clone, PartialEq)]
pub struct LocatedPage<'a> {
    /// Raw item nodes, marker excluded, in page order
    pub nodes: Vec<&'a Value>,
    pub next_token: Option<String>,
    /// Name of the pattern that matched
    pub shape: String,
}

#[derive(Debug, Clone)]
pub struct ContentLocator {
    catalog: ShapeCatalog,
    find_key_max_depth: usize,
}

impl Default for ContentLocator {
    fn default() -> Self {
        Self::new(ShapeCatalog::default())
    }
}

impl ContentLocator {
    pub fn new(catalog: ShapeCatalog) -> Self {
        Self {
            catalog,
            find_key_max_depth: defaults::FIND_KEY_MAX_DEPTH,
        }
    }

    pub const fn with_find_key_max_depth(mut self, depth: usize) -> Self {
        self.find_key_max_depth = depth;
        self
    }

    pub const fn catalog(&self) -> &ShapeCatalog {
        &self.catalog
    }

    pub fn locate<'a>(
        &self,
        tree: &'a Value,
        kind: ContentKind,
        is_continuation: bool,
    ) -> ExtractionResult<LocatedPage<'a>> {
        let phase = PagePhase::from_continuation(is_continuation);
        let set = self.catalog.set_for(kind, phase).ok_or_else(|| {
            ExtractionError::missing_section(
                "shape catalog",
                format!("no {phase:?} shapes configured for {kind}"),
            )
        })?;

        for pattern in &set.patterns {
            if let Some(items) = non_empty_list(resolve(tree, &pattern.items, pattern.items_type)) {
                debug!(shape = %pattern.name, %kind, count = items.len(), "shape matched");
                return Ok(self.split_marker(tree, items, Some(pattern), &pattern.name));
            }
        }

        if let Some(page) = self.locate_by_fallback(tree, set) {
            return Ok(page);
        }

        Err(ExtractionError::structure_not_found(kind, is_continuation, set.pattern_names()))
    }

    fn locate_by_fallback<'a>(&self, tree: &'a Value, set: &ShapeSet) -> Option<LocatedPage<'a>> {
        let fallback = set.fallback.as_ref()?;
        let anchor = find_key(tree, &fallback.key, self.find_key_max_depth)?;
        let items = non_empty_list(resolve(anchor, &fallback.items, ExpectedType::Sequence))?;
        warn!(
            kind = %set.kind,
            key = %fallback.key,
            "no known shape matched; items found by key search, layout may have changed"
        );
        let name = format!("fallback:{}", fallback.key);
        Some(self.split_marker(tree, items, None, &name))
    }

    fn split_marker<'a>(
        &self,
        tree: &'a Value,
        items: &'a [Value],
        pattern: Option<&ShapePattern>,
        shape: &str,
    ) -> LocatedPage<'a> {
        let (content, marker) = match items.split_last() {
            Some((last, rest)) if is_marker(last) => (rest, Some(last)),
            _ => (items, None),
        };

        let nodes: Vec<&Value> = content
            .iter()
            .filter(|node| {
                let marker = is_marker(node);
                if marker {
                    debug!(shape, "ignoring continuation marker inside item list");
                }
                !marker
            })
            .collect();

        let next_token = marker
            .and_then(|node| self.marker_token(node))
            .or_else(|| {
                pattern
                    .and_then(|p| p.token.as_ref())
                    .and_then(|path| resolve(tree, path, ExpectedType::String))
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
            .filter(|token| !token.is_empty());

        LocatedPage {
            nodes,
            next_token,
            shape: shape.to_string(),
        }
    }

    fn marker_token(&self, marker: &Value) -> Option<String> {
        self.catalog
            .marker_tokens
            .iter()
            .find_map(|path| resolve(marker, path, ExpectedType::String))
            .and_then(Value::as_str)
            .map(str::to_string)
    }
}

fn non_empty_list(value: Option<&Value>) -> Option<&Vec<Value>> {
    value.and_then(Value::as_array).filter(|items| !items.is_empty())
}

fn is_marker(node: &Value) -> bool {
    node.get(ShapeCatalog::MARKER_KEY).is_some()
}
