//! Pipeline driver.
//!
//! Orchestrates parse → analyses → report. The three analyses are
//! independent consumers of the same run set; per-metric work parallelizes
//! with rayon. Insufficient-data conditions are collected as typed issues on
//! the output, never raised.

use crate::config::AnalysisConfig;
use rayon::prelude::*;
use replistat_core::{Configuration, Run, RunSet, TimeSeries};
use replistat_parse::{load_dir, ParseError, ParseOutcome};
use replistat_report::{AggregateRow, AnalysisReport, ReportMeta, WarmupRow};
use replistat_stats::{
    aggregate_runs, decompose, estimate_warmup, AnovaError, MetricSelector, WarmupConfig,
    WarmupError,
};
use std::path::Path;
use tracing::info;

/// Analysis driver configured once, reused across directories.
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    config: AnalysisConfig,
}

/// The product of one `analyze` call: the report plus everything that was
/// skipped and why.
#[derive(Debug)]
pub struct AnalysisRun {
    /// The serializable report.
    pub report: AnalysisReport,
    /// Typed skip reasons (insufficient data is not an error).
    pub issues: Vec<AnalysisIssue>,
}

/// Why part of an analysis was skipped.
#[derive(Debug)]
pub enum AnalysisIssue {
    /// Warm-up detection could not run for a configuration.
    Warmup {
        /// The configuration whose series were insufficient.
        configuration: Configuration,
        /// Metric the series were read from.
        metric: String,
        /// The typed reason.
        error: WarmupError,
    },
    /// Factor decomposition could not run for a response metric.
    FactorEffects {
        /// The response metric.
        response: String,
        /// The typed reason.
        error: AnovaError,
    },
}

impl Pipeline {
    /// Build a pipeline from a configuration.
    pub fn new(config: AnalysisConfig) -> Self {
        Self { config }
    }

    /// The active configuration.
    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Load every `*.sca` / `*.vec` file under a results directory.
    pub fn load_dir(&self, dir: &Path) -> Result<ParseOutcome, ParseError> {
        let outcome = load_dir(dir)?;
        info!(
            runs = outcome.runs.len(),
            diagnostics = outcome.diagnostics.len(),
            failed_files = outcome.failed_files.len(),
            "loaded results directory"
        );
        Ok(outcome)
    }

    /// Run all three analyses over one run set.
    ///
    /// `scalar_metrics` feed the aggregator, `series_metrics` the warm-up
    /// detector, and `responses` the factor decomposer. Each list may be
    /// empty; the analyses never depend on each other's output.
    pub fn analyze(
        &self,
        runs: &RunSet,
        scalar_metrics: &[MetricSelector],
        series_metrics: &[MetricSelector],
        responses: &[MetricSelector],
    ) -> AnalysisRun {
        let confidence = self.config.aggregate.confidence_level;
        let aggregates: Vec<AggregateRow> = scalar_metrics
            .par_iter()
            .flat_map(|selector| {
                aggregate_runs(runs, selector, confidence)
                    .iter()
                    .map(AggregateRow::from)
                    .collect::<Vec<_>>()
            })
            .collect();

        let warmup_config = WarmupConfig::from(&self.config.warmup);
        let mut warmups = Vec::new();
        let mut issues = Vec::new();
        for selector in series_metrics {
            for (configuration, members) in runs.by_configuration() {
                let series: Vec<TimeSeries> = members
                    .iter()
                    .filter_map(|run| merged_series(run, selector))
                    .collect();
                if series.is_empty() {
                    continue;
                }
                let refs: Vec<&TimeSeries> = series.iter().collect();
                match estimate_warmup(&refs, &warmup_config) {
                    Ok(estimate) => warmups.push(WarmupRow::new(
                        &configuration,
                        &selector.entity_class,
                        &selector.metric,
                        &estimate,
                    )),
                    Err(error) => issues.push(AnalysisIssue::Warmup {
                        configuration,
                        metric: selector.metric.clone(),
                        error,
                    }),
                }
            }
        }

        let mut factor_effects = Vec::new();
        for selector in responses {
            match decompose(runs, selector) {
                Ok(table) => factor_effects.push(table),
                Err(error) => issues.push(AnalysisIssue::FactorEffects {
                    response: selector.metric.clone(),
                    error,
                }),
            }
        }

        info!(
            aggregates = aggregates.len(),
            warmups = warmups.len(),
            factor_effects = factor_effects.len(),
            issues = issues.len(),
            "analysis complete"
        );
        AnalysisRun {
            report: AnalysisReport {
                meta: ReportMeta::new(),
                aggregates,
                warmups,
                factor_effects,
            },
            issues,
        }
    }
}

/// One run's replication series for a selector: all matching vectors merged
/// into a single time-ordered series. `None` when the run has no matching
/// vector.
fn merged_series(run: &Run, selector: &MetricSelector) -> Option<TimeSeries> {
    let mut samples: Vec<(f64, f64)> = Vec::new();
    for series in run.vectors_matching(&selector.entity_class, &selector.metric, selector.entity_index)
    {
        samples.extend_from_slice(series.samples());
    }
    if samples.is_empty() {
        None
    } else {
        Some(TimeSeries::from_samples(samples))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use replistat_core::{FactorValue, ScalarKey};

    fn scalar_run(rep: u32, value: f64) -> Run {
        let mut run = Run {
            source: format!("r{rep}.sca"),
            repetition: Some(rep),
            ..Run::default()
        };
        run.factors.set("N", FactorValue::parse("100"));
        run.scalars
            .insert(ScalarKey::new("table", 0, "throughput"), value);
        run
    }

    fn vector_run(rep: u32) -> Run {
        let mut run = Run {
            source: format!("r{rep}.vec"),
            repetition: Some(rep),
            ..Run::default()
        };
        run.factors.set("N", FactorValue::parse("100"));
        let mut series = TimeSeries::new();
        let mut t = 0.0;
        while t <= 4_000.0 {
            series.push(t, 1.0 - (-t / 100.0_f64).exp());
            t += 5.0;
        }
        run.vectors
            .insert(ScalarKey::new("table", 0, "waittime"), series);
        run
    }

    #[test]
    fn test_analyze_produces_all_three_outputs() {
        let mut set = RunSet::new();
        for rep in 0..3 {
            let mut run = scalar_run(rep, 48.0 + rep as f64);
            let vectors = vector_run(rep).vectors;
            run.vectors = vectors;
            run.source = format!("r{rep}.sca");
            set.insert(run).unwrap();
        }

        let pipeline = Pipeline::default();
        let throughput = MetricSelector::sum("table", "throughput");
        let waittime = MetricSelector::average("table", "waittime");
        let analysis = pipeline.analyze(
            &set,
            std::slice::from_ref(&throughput),
            std::slice::from_ref(&waittime),
            std::slice::from_ref(&throughput),
        );

        assert_eq!(analysis.report.aggregates.len(), 1);
        assert_eq!(analysis.report.aggregates[0].n, 3);
        assert_eq!(analysis.report.warmups.len(), 1);
        assert_eq!(analysis.report.factor_effects.len(), 1);
        assert!(analysis.issues.is_empty());
    }

    #[test]
    fn test_insufficient_series_becomes_issue_not_error() {
        let mut set = RunSet::new();
        let mut run = scalar_run(0, 48.0);
        // a sparse series: one sample per bin, below min_bin_samples
        let mut series = TimeSeries::new();
        for i in 0..10 {
            series.push(i as f64 * 100.0, 1.0);
        }
        run.vectors
            .insert(ScalarKey::new("table", 0, "waittime"), series);
        set.insert(run).unwrap();

        let pipeline = Pipeline::default();
        let waittime = MetricSelector::average("table", "waittime");
        let analysis = pipeline.analyze(&set, &[], std::slice::from_ref(&waittime), &[]);

        assert!(analysis.report.warmups.is_empty());
        assert_eq!(analysis.issues.len(), 1);
        assert!(matches!(
            analysis.issues[0],
            AnalysisIssue::Warmup {
                error: WarmupError::NoBins { .. },
                ..
            }
        ));
    }

    #[test]
    fn test_anova_error_becomes_issue() {
        let mut set = RunSet::new();
        set.insert(scalar_run(0, 48.0)).unwrap();

        let pipeline = Pipeline::default();
        let missing = MetricSelector::sum("table", "no_such_metric");
        let analysis = pipeline.analyze(&set, &[], &[], std::slice::from_ref(&missing));

        assert!(analysis.report.factor_effects.is_empty());
        assert!(matches!(
            analysis.issues[0],
            AnalysisIssue::FactorEffects {
                error: AnovaError::NoResponse { .. },
                ..
            }
        ));
    }
}
