//! Report Data Structures

use chrono::{DateTime, Utc};
use replistat_core::Configuration;
use replistat_stats::{Aggregate, DetectionStatus, FactorEffectTable, WarmupEstimate};
use serde::Serialize;
use std::collections::BTreeMap;

/// Complete analysis report.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    /// Provenance and schema metadata.
    pub meta: ReportMeta,
    /// One row per (configuration, metric) aggregate.
    pub aggregates: Vec<AggregateRow>,
    /// One row per (configuration, metric) warm-up estimate.
    pub warmups: Vec<WarmupRow>,
    /// Factor-effect tables, one per response metric.
    pub factor_effects: Vec<FactorEffectTable>,
}

/// Report metadata.
#[derive(Debug, Clone, Serialize)]
pub struct ReportMeta {
    /// Schema version of this report layout.
    pub schema_version: u32,
    /// Version of the tool that produced the report.
    pub tool_version: String,
    /// Generation timestamp.
    pub generated: DateTime<Utc>,
}

impl ReportMeta {
    /// Metadata stamped with the current crate version and time.
    pub fn new() -> Self {
        Self {
            schema_version: crate::SCHEMA_VERSION,
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            generated: Utc::now(),
        }
    }
}

impl Default for ReportMeta {
    fn default() -> Self {
        Self::new()
    }
}

/// One aggregate: {mean, CI half-width, n} for a (configuration, metric).
#[derive(Debug, Clone, Serialize)]
pub struct AggregateRow {
    /// Stable configuration key, e.g. `N=100,dist=Uniform,p=0.5`.
    pub configuration: String,
    /// Factor levels rendered as strings.
    pub factors: BTreeMap<String, String>,
    /// Entity class the metric was read from.
    pub entity_class: String,
    /// Metric name.
    pub metric: String,
    /// Sample mean across replications.
    pub mean: f64,
    /// Sample standard deviation.
    pub std_dev: f64,
    /// Confidence half-width.
    pub ci_half_width: f64,
    /// Confidence level of the half-width.
    pub confidence_level: f64,
    /// Contributing replication count.
    pub n: usize,
    /// Single-replication trust signal.
    pub low_confidence: bool,
}

impl From<&Aggregate> for AggregateRow {
    fn from(aggregate: &Aggregate) -> Self {
        Self {
            configuration: aggregate.configuration.key(),
            factors: render_factors(&aggregate.configuration),
            entity_class: aggregate.entity_class.clone(),
            metric: aggregate.metric.clone(),
            mean: aggregate.mean,
            std_dev: aggregate.std_dev,
            ci_half_width: aggregate.ci_half_width,
            confidence_level: aggregate.confidence_level,
            n: aggregate.n,
            low_confidence: aggregate.low_confidence,
        }
    }
}

/// One warm-up estimate: {ensemble curve, cut-point, steady-state value,
/// detection-status flag} for a (configuration, metric).
#[derive(Debug, Clone, Serialize)]
pub struct WarmupRow {
    /// Stable configuration key.
    pub configuration: String,
    /// Entity class the series was read from.
    pub entity_class: String,
    /// Metric name.
    pub metric: String,
    /// Estimated warm-up period.
    pub cut_time: f64,
    /// Steady-state value after the cut-point.
    pub steady_state: f64,
    /// Whether the cut was detected, defaulted, or unnecessary.
    pub status: DetectionStatus,
    /// Fewer-than-two-replications trust signal.
    pub low_confidence: bool,
    /// Smoothed ensemble curve as (time, value) pairs.
    pub curve: Vec<(f64, f64)>,
}

impl WarmupRow {
    /// Flatten a warm-up estimate into a report row.
    pub fn new(
        configuration: &Configuration,
        entity_class: &str,
        metric: &str,
        estimate: &WarmupEstimate,
    ) -> Self {
        Self {
            configuration: configuration.key(),
            entity_class: entity_class.to_string(),
            metric: metric.to_string(),
            cut_time: estimate.cut_time,
            steady_state: estimate.steady_state,
            status: estimate.status,
            low_confidence: estimate.low_confidence,
            curve: estimate.curve.clone(),
        }
    }
}

fn render_factors(configuration: &Configuration) -> BTreeMap<String, String> {
    configuration
        .iter()
        .map(|(name, value)| (name.clone(), value.to_string()))
        .collect()
}
