//! Type-checked traversal of schema-less JSON trees
//!
//! Every lookup fails soft: a missing key, a wrong node type or a truncated
//! path yields `None`. Nothing in here panics on malformed input.
//!
//! Paths are written in dotted notation:
//!
//! ```text
//! contents.twoColumnBrowseResultsRenderer.tabs[*].tabRenderer.content
//! thumbnail.thumbnails[-1].url
//! ```
//!
//! `[n]` indexes a sequence, `[-1]` takes its last element and `[*]` tries
//! every element, keeping the first one for which the rest of the path
//! resolves to the expected type.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    Key(String),
    Index(usize),
    Last,
    AnyElement,
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(key) => f.write_str(key),
            Self::Index(index) => write!(f, "[{index}]"),
            Self::Last => f.write_str("[-1]"),
            Self::AnyElement => f.write_str("[*]"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid key path '{path}': {reason}")]
pub struct PathParseError {
    pub path: String,
    pub reason: String,
}

/// Parsed key path
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct KeyPath {
    segments: Vec<PathSegment>,
}

impl KeyPath {
    pub fn new(segments: Vec<PathSegment>) -> Self {
        Self { segments }
    }

    /// Path made only of mapping keys
    pub fn from_keys(keys: &[&str]) -> Self {
        Self::new(keys.iter().map(|key| PathSegment::Key((*key).to_string())).collect())
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

impl FromStr for KeyPath {
    type Err = PathParseError;

    fn from_str(path: &str) -> Result<Self, Self::Err> {
        let fail = |reason: &str| PathParseError {
            path: path.to_string(),
            reason: reason.to_string(),
        };

        let mut segments = Vec::new();
        if path.is_empty() {
            return Ok(Self::new(segments));
        }

        for part in path.split('.') {
            let (key, mut rest) = match part.find('[') {
                Some(pos) => (&part[..pos], &part[pos..]),
                None => (part, ""),
            };
            if key.is_empty() && rest.is_empty() {
                return Err(fail("empty segment"));
            }
            if !key.is_empty() {
                segments.push(PathSegment::Key(key.to_string()));
            }
            while !rest.is_empty() {
                let close = rest.find(']').ok_or_else(|| fail("unclosed '['"))?;
                let inner = rest.get(1..close).ok_or_else(|| fail("malformed index"))?;
                let segment = match inner {
                    "*" => PathSegment::AnyElement,
                    "-1" => PathSegment::Last,
                    digits => PathSegment::Index(
                        digits
                            .parse::<usize>()
                            .map_err(|_| fail("index must be a non-negative integer, -1 or *"))?,
                    ),
                };
                segments.push(segment);
                rest = &rest[close + 1..];
                if !rest.is_empty() && !rest.starts_with('[') {
                    return Err(fail("unexpected text after ']'"));
                }
            }
        }
        Ok(Self::new(segments))
    }
}

impl TryFrom<String> for KeyPath {
    type Error = PathParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<KeyPath> for String {
    fn from(path: KeyPath) -> Self {
        path.to_string()
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 && matches!(segment, PathSegment::Key(_)) {
                f.write_str(".")?;
            }
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}

/// Node type a resolved value must have
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExpectedType {
    Mapping,
    #[default]
    Sequence,
    String,
    Number,
    Bool,
    Any,
}

impl ExpectedType {
    pub fn matches(self, value: &Value) -> bool {
        match self {
            Self::Mapping => value.is_object(),
            Self::Sequence => value.is_array(),
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Bool => value.is_boolean(),
            Self::Any => true,
        }
    }
}

const fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "sequence",
        Value::Object(_) => "mapping",
    }
}

/// Walk `path` from `root`; the located value is returned only if it has the expected type
pub fn resolve<'a>(root: &'a Value, path: &KeyPath, expected: ExpectedType) -> Option<&'a Value> {
    walk(root, path.segments(), expected, path)
}

fn walk<'a>(node: &'a Value, segments: &[PathSegment], expected: ExpectedType, full: &KeyPath) -> Option<&'a Value> {
    let Some((segment, rest)) = segments.split_first() else {
        if expected.matches(node) {
            return Some(node);
        }
        debug!(
            path = %full,
            expected = ?expected,
            found = type_name(node),
            "resolved value has unexpected type"
        );
        return None;
    };

    match segment {
        PathSegment::Key(key) => walk(node.as_object()?.get(key)?, rest, expected, full),
        PathSegment::Index(index) => walk(node.as_array()?.get(*index)?, rest, expected, full),
        PathSegment::Last => walk(node.as_array()?.last()?, rest, expected, full),
        PathSegment::AnyElement => node
            .as_array()?
            .iter()
            .find_map(|element| walk(element, rest, expected, full)),
    }
}

/// Parse and resolve a dotted path in one step; an unparsable path resolves to `None`
pub fn lookup<'a>(root: &'a Value, path: &str, expected: ExpectedType) -> Option<&'a Value> {
    match path.parse::<KeyPath>() {
        Ok(parsed) => resolve(root, &parsed, expected),
        Err(e) => {
            debug!("{}", e);
            None
        }
    }
}

pub fn lookup_str<'a>(root: &'a Value, path: &str) -> Option<&'a str> {
    lookup(root, path, ExpectedType::String).and_then(Value::as_str)
}

pub fn lookup_array<'a>(root: &'a Value, path: &str) -> Option<&'a Vec<Value>> {
    lookup(root, path, ExpectedType::Sequence).and_then(Value::as_array)
}

/// Display text of a text node: `simpleText`, joined `runs[*].text`, or view-model `content`
pub fn text_of(node: &Value) -> Option<String> {
    if let Some(text) = node.as_str() {
        return Some(text.to_string());
    }
    if let Some(text) = node.get("simpleText").and_then(Value::as_str) {
        return Some(text.to_string());
    }
    if let Some(text) = node.get("content").and_then(Value::as_str) {
        return Some(text.to_string());
    }
    let runs = node.get("runs")?.as_array()?;
    let joined: String = runs
        .iter()
        .filter_map(|run| run.get("text").and_then(Value::as_str))
        .collect();
    (!joined.is_empty()).then_some(joined)
}

/// Resolve a text node at `path` and render it
pub fn lookup_text(root: &Value, path: &str) -> Option<String> {
    lookup(root, path, ExpectedType::Any).and_then(text_of)
}

/// Depth-first search for the first value stored under `key`.
///
/// Last-resort helper for layouts that moved a known node; visits at most
/// the nodes within `max_depth` levels of `root`, so cost is bounded by the
/// size of that part of the tree.
pub fn find_key<'a>(root: &'a Value, key: &str, max_depth: usize) -> Option<&'a Value> {
    match root {
        Value::Object(map) => {
            if let Some(found) = map.get(key) {
                return Some(found);
            }
            if max_depth == 0 {
                return None;
            }
            map.values().find_map(|child| find_key(child, key, max_depth - 1))
        }
        Value::Array(items) if max_depth > 0 => {
            items.iter().find_map(|child| find_key(child, key, max_depth - 1))
        }
        _ => None,
    }
}
