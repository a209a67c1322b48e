//! Extraction error re-export

pub use crate::domain::errors::{ExtractionError, ExtractionResult};
