#![warn(missing_docs)]
//! Replistat Report - Analysis Output Tables
//!
//! Serializable tables for the three analyses, consumed by external
//! plotting/reporting collaborators: one row per (configuration, metric)
//! aggregate, one row per warm-up estimate, and the factor-effect tables as
//! produced. JSON is the machine-readable format.

mod json;
mod report;

pub use json::generate_json_report;
pub use report::{AggregateRow, AnalysisReport, ReportMeta, WarmupRow};

/// Report schema version embedded in `ReportMeta`.
pub const SCHEMA_VERSION: u32 = 1;
