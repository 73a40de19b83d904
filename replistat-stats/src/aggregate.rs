//! Replication aggregation.
//!
//! Groups runs by configuration and summarizes one metric across the
//! replications of each group: sample mean, sample standard deviation, and
//! the 95% (configurable) confidence half-width via Student's t with n−1
//! degrees of freedom.

use crate::student::t_quantile;
use replistat_core::{Configuration, Run, RunSet};
use serde::Serialize;

/// How a metric combines across the entity instances of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectorMode {
    /// Additive metrics (e.g. per-table throughput → system throughput).
    Sum,
    /// Intensive metrics (e.g. utilization).
    Average,
}

/// Selects one scalar per run: an entity class, a metric name, and how to
/// combine the class's instances.
#[derive(Debug, Clone, Serialize)]
pub struct MetricSelector {
    /// Entity class to match, e.g. `table`.
    pub entity_class: String,
    /// Metric name to match, e.g. `throughput`.
    pub metric: String,
    /// Combination mode across instances.
    pub mode: SelectorMode,
    /// Restrict to a single entity index instead of the whole class.
    pub entity_index: Option<u32>,
}

impl MetricSelector {
    /// Additive selector: the run's value is the sum over entity instances.
    pub fn sum(entity_class: impl Into<String>, metric: impl Into<String>) -> Self {
        Self {
            entity_class: entity_class.into(),
            metric: metric.into(),
            mode: SelectorMode::Sum,
            entity_index: None,
        }
    }

    /// Intensive selector: the run's value is the mean over entity instances.
    pub fn average(entity_class: impl Into<String>, metric: impl Into<String>) -> Self {
        Self {
            entity_class: entity_class.into(),
            metric: metric.into(),
            mode: SelectorMode::Average,
            entity_index: None,
        }
    }

    /// Pin the selector to one entity instance.
    pub fn instance(mut self, entity_index: u32) -> Self {
        self.entity_index = Some(entity_index);
        self
    }

    /// Extract this selector's value from one run. `None` when the run has
    /// no matching scalar: such a run contributes no sample.
    pub fn extract(&self, run: &Run) -> Option<f64> {
        let values: Vec<f64> = run
            .scalars_matching(&self.entity_class, &self.metric, self.entity_index)
            .collect();
        if values.is_empty() {
            return None;
        }
        let sum: f64 = values.iter().sum();
        match self.mode {
            SelectorMode::Sum => Some(sum),
            SelectorMode::Average => Some(sum / values.len() as f64),
        }
    }
}

/// One metric's cross-replication summary for one configuration.
/// Immutable once produced.
#[derive(Debug, Clone, Serialize)]
pub struct Aggregate {
    /// The configuration whose replications were summarized.
    pub configuration: Configuration,
    /// Entity class the metric was read from.
    pub entity_class: String,
    /// Metric name.
    pub metric: String,
    /// Sample mean across replications.
    pub mean: f64,
    /// Sample standard deviation (0 when n < 2).
    pub std_dev: f64,
    /// Confidence half-width via Student's t (0 when n < 2).
    pub ci_half_width: f64,
    /// Confidence level the half-width was computed at.
    pub confidence_level: f64,
    /// Number of replications that contributed a value.
    pub n: usize,
    /// Set when n = 1: the numbers are real but carry no spread information.
    pub low_confidence: bool,
}

/// Aggregate a metric across the replications of every configuration.
///
/// Configurations with no contributing run produce no aggregate (absent row,
/// not a zero-value row). Output is ordered by configuration key.
pub fn aggregate_runs(
    runs: &RunSet,
    selector: &MetricSelector,
    confidence_level: f64,
) -> Vec<Aggregate> {
    let mut aggregates = Vec::new();
    for (configuration, members) in runs.by_configuration() {
        let values: Vec<f64> = members.iter().filter_map(|run| selector.extract(run)).collect();
        if values.is_empty() {
            continue;
        }

        let n = values.len();
        let mean = values.iter().sum::<f64>() / n as f64;
        let (std_dev, ci_half_width) = if n < 2 {
            (0.0, 0.0)
        } else {
            let variance =
                values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
            let std_dev = variance.sqrt();
            let t = t_quantile(1.0 - (1.0 - confidence_level) / 2.0, (n - 1) as f64);
            (std_dev, t * std_dev / (n as f64).sqrt())
        };

        aggregates.push(Aggregate {
            configuration,
            entity_class: selector.entity_class.clone(),
            metric: selector.metric.clone(),
            mean,
            std_dev,
            ci_half_width,
            confidence_level,
            n,
            low_confidence: n < 2,
        });
    }
    aggregates
}
