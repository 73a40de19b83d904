#![warn(missing_docs)]
//! # Replistat
//!
//! Analysis pipeline for discrete-event simulation results: parses scalar
//! and vector result files into normalized run records and derives three
//! kinds of statistics from them:
//! - **Replication aggregates**: per-configuration mean and Student-t
//!   confidence half-width for a selected metric
//! - **Warm-up estimates**: Welch's ensemble procedure with a swappable
//!   stabilization criterion and an explicit detection-status flag
//! - **Factor-effect tables**: balanced factorial ANOVA attributing
//!   percentages of total variation to factors and interactions
//!
//! ## Quick Start
//!
//! ```ignore
//! use replistat::prelude::*;
//!
//! let config = AnalysisConfig::discover().unwrap_or_default();
//! let pipeline = Pipeline::new(config);
//! let outcome = pipeline.load_dir("results".as_ref())?;
//!
//! let throughput = MetricSelector::sum("table", "throughput");
//! let analysis = pipeline.analyze(
//!     &outcome.runs,
//!     &[throughput.clone()],   // aggregates
//!     &[MetricSelector::average("table", "waitTime")], // warm-up series
//!     &[throughput],           // ANOVA responses
//! );
//! println!("{}", generate_json_report(&analysis.report)?);
//! ```

mod config;
mod pipeline;

pub use config::{AggregateSection, AnalysisConfig, OutputSection, WarmupSection};
pub use pipeline::{AnalysisIssue, AnalysisRun, Pipeline};

// Re-export the record model
pub use replistat_core::{
    Configuration, FactorValue, Run, RunIdentity, RunSet, RunSetError, ScalarKey, TimeSeries,
};

// Re-export the parser surface
pub use replistat_parse::{
    load_dir, load_files, parse_file, parse_str, Diagnostic, DiagnosticReason, FailedFile,
    FileParse, ParseError, ParseOutcome,
};

// Re-export the statistics engine
pub use replistat_stats::{
    aggregate_runs, decompose, estimate_warmup, estimate_warmup_with, Aggregate, AnovaError,
    AnovaWarning, DerivativeThreshold, DetectionStatus, FactorEffect, FactorEffectTable,
    MetricSelector, SelectorMode, StabilizationCriterion, ToleranceBand, WarmupConfig,
    WarmupError, WarmupEstimate, DEFAULT_CONFIDENCE_LEVEL, RESIDUAL_EFFECT,
};

// Re-export the report surface
pub use replistat_report::{
    generate_json_report, AggregateRow, AnalysisReport, ReportMeta, WarmupRow,
};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        aggregate_runs, decompose, estimate_warmup, generate_json_report, AnalysisConfig,
        Configuration, MetricSelector, Pipeline, Run, RunSet, WarmupConfig,
    };
}
