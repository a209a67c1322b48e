//! Channel Harvest - content enumeration and ingest tracking for video platform channels
//!
//! Walks the continuation-token chain of a channel tab, normalizes every
//! listed item, and records per-item ingest status so repeated runs only
//! process what is new.

pub mod application;
pub mod domain;
pub mod infrastructure;
