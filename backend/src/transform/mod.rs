//! Transformation module.
//!
//! This module turns parsed sheets into validated records:
//! - Mapper: header row to field mapping
//! - Materializer: raw cells to typed records
//! - Pipeline: batch orchestration

pub mod mapper;
pub mod materializer;
pub mod pipeline;

pub use mapper::{build_mapping, normalize_header, unmapped_required, FieldMapping, MatchMode};
pub use materializer::{materialize, MaterializeFailure};
pub use pipeline::*;
