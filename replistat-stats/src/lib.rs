#![warn(missing_docs)]
//! Replistat Statistical Engine
//!
//! The three analyses over normalized run records:
//! - Replication aggregation: per-configuration mean and Student-t
//!   confidence interval for a selected metric
//! - Warm-up detection: Welch's ensemble-averaging procedure with a
//!   swappable stabilization criterion
//! - Factor-effect decomposition: balanced factorial ANOVA generalized to
//!   any number of factors
//!
//! All three are stateless pure transformations over read-only run
//! collections; none depends on another's output.

mod aggregate;
mod anova;
mod student;
mod warmup;

pub use aggregate::{aggregate_runs, Aggregate, MetricSelector, SelectorMode};
pub use anova::{
    decompose, AnovaError, AnovaWarning, FactorEffect, FactorEffectTable, RESIDUAL_EFFECT,
};
pub use student::{ln_gamma, regularized_incomplete_beta, t_cdf, t_quantile};
pub use warmup::{
    estimate_warmup, estimate_warmup_with, DerivativeThreshold, DetectionStatus,
    StabilizationCriterion, ToleranceBand, WarmupConfig, WarmupError, WarmupEstimate,
};

/// Default confidence level (95%)
pub const DEFAULT_CONFIDENCE_LEVEL: f64 = 0.95;

/// Relative tolerance under which balanced-design percentages must sum to 100
pub const PERCENT_SUM_TOLERANCE: f64 = 1e-6;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constants() {
        assert!((DEFAULT_CONFIDENCE_LEVEL - 0.95).abs() < f64::EPSILON);
        assert!(PERCENT_SUM_TOLERANCE > 0.0);
    }
}
