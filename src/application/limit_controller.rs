//! Per-run dedupe and item cap

use std::collections::HashSet;

/// Outcome of offering a content id to the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// First sighting in this run and not known to be processed
    Fresh,
    /// Already seen earlier in this run
    Duplicate,
    /// Present in the known-processed set loaded before the run
    KnownProcessed,
}

#[derive(Debug, Clone, Default)]
pub struct LimitController {
    seen: HashSet<String>,
    known_processed: HashSet<String>,
    max_items: Option<usize>,
    kept: usize,
}

impl LimitController {
    pub fn new(max_items: Option<usize>) -> Self {
        Self {
            max_items,
            ..Self::default()
        }
    }

    pub fn with_known_processed(mut self, ids: HashSet<String>) -> Self {
        self.known_processed = ids;
        self
    }

    /// Record a sighting of `id`; an id is fresh at most once per run
    pub fn admit(&mut self, id: &str) -> Admission {
        if !self.seen.insert(id.to_string()) {
            return Admission::Duplicate;
        }
        if self.known_processed.contains(id) {
            return Admission::KnownProcessed;
        }
        Admission::Fresh
    }

    pub fn record_kept(&mut self) {
        self.kept += 1;
    }

    pub const fn kept(&self) -> usize {
        self.kept
    }

    pub fn limit_reached(&self) -> bool {
        self.max_items.is_some_and(|max| self.kept >= max)
    }
}
