//! Warm-up detection via Welch's procedure.
//!
//! Multiple independent replications of one time-series metric are binned
//! onto a common time grid, ensemble-averaged, and smoothed; the cut-point
//! is the first time the smoothed curve enters a tolerance band around the
//! steady-state value (mean of the last quartile).
//!
//! The stabilization predicate is a trait so alternative criteria can be
//! swapped in without touching the alignment/smoothing stages.

use replistat_core::TimeSeries;
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

/// Alignment and smoothing parameters.
#[derive(Debug, Clone)]
pub struct WarmupConfig {
    /// Width of one alignment bin, in the series' time unit.
    pub bin_width: f64,
    /// Bins with fewer raw samples than this are dropped, not averaged on
    /// scant data.
    pub min_bin_samples: usize,
    /// Moving-average window (in bins) for the smoothing stage.
    pub smoothing_window: usize,
    /// Relative tolerance of the steady-state band.
    pub tolerance: f64,
}

impl Default for WarmupConfig {
    fn default() -> Self {
        Self {
            bin_width: 50.0,
            min_bin_samples: 3,
            smoothing_window: 5,
            tolerance: 0.05,
        }
    }
}

/// How the cut-point was arrived at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionStatus {
    /// The smoothed curve entered the steady-state band.
    Detected,
    /// The curve never stabilized within tolerance; the cut-point is one
    /// quarter of the observed horizon.
    Fallback,
    /// Steady state is zero (empty or constant-zero metric): no warm-up
    /// needed, cut at the first bin.
    Immediate,
}

/// Warm-up estimate for one configuration and one time-series metric.
#[derive(Debug, Clone, Serialize)]
pub struct WarmupEstimate {
    /// Smoothed ensemble curve as (bin time, value) pairs.
    pub curve: Vec<(f64, f64)>,
    /// Per-bin ensemble standard deviation (zeros for a single replication).
    pub ensemble_std: Vec<f64>,
    /// Estimated warm-up period, in the series' time unit. Always within the
    /// aligned ensemble's time range.
    pub cut_time: f64,
    /// Representative metric value after the cut-point (last-quartile mean).
    pub steady_state: f64,
    /// Whether the cut-point was detected, defaulted, or unnecessary.
    pub status: DetectionStatus,
    /// Set when fewer than 2 replications were available.
    pub low_confidence: bool,
}

/// Errors for inputs the procedure cannot run on.
#[derive(Debug, Clone, Error)]
pub enum WarmupError {
    /// No replications were supplied.
    #[error("no replications supplied")]
    NoReplications,
    /// After binning, no replication had a populated bin.
    #[error("no time bin collected at least {min_bin_samples} samples")]
    NoBins {
        /// The configured per-bin sample minimum.
        min_bin_samples: usize,
    },
}

/// A stabilization predicate over the smoothed ensemble curve.
///
/// Returns the index of the first bin considered stable, or `None` when the
/// curve never qualifies (the caller then applies the quarter-horizon
/// fallback).
pub trait StabilizationCriterion {
    /// Locate the cut-point index on the smoothed curve.
    fn locate(&self, times: &[f64], smoothed: &[f64], steady_state: f64) -> Option<usize>;
}

/// Default criterion: first bin within a relative tolerance band around the
/// steady-state value.
#[derive(Debug, Clone)]
pub struct ToleranceBand {
    /// Relative tolerance, e.g. 0.05 for a ±5% band.
    pub tolerance: f64,
}

impl StabilizationCriterion for ToleranceBand {
    fn locate(&self, _times: &[f64], smoothed: &[f64], steady_state: f64) -> Option<usize> {
        let threshold = steady_state.abs() * self.tolerance;
        smoothed
            .iter()
            .position(|value| (value - steady_state).abs() <= threshold)
    }
}

/// Alternative criterion: the curve's rate of change stays below a fraction
/// of the steady-state value for a run of consecutive bins.
#[derive(Debug, Clone)]
pub struct DerivativeThreshold {
    /// Maximum |dy/dt| relative to |steady state| that still counts as flat.
    pub relative_threshold: f64,
    /// Number of consecutive flat gaps required.
    pub hold_bins: usize,
}

impl Default for DerivativeThreshold {
    fn default() -> Self {
        Self {
            relative_threshold: 1e-4,
            hold_bins: 10,
        }
    }
}

impl StabilizationCriterion for DerivativeThreshold {
    fn locate(&self, times: &[f64], smoothed: &[f64], steady_state: f64) -> Option<usize> {
        if smoothed.len() < 2 || steady_state == 0.0 {
            return None;
        }
        let limit = self.relative_threshold * steady_state.abs();
        let flat: Vec<bool> = smoothed
            .windows(2)
            .zip(times.windows(2))
            .map(|(values, ts)| {
                let dt = ts[1] - ts[0];
                dt > 0.0 && ((values[1] - values[0]) / dt).abs() < limit
            })
            .collect();
        let hold = self.hold_bins.max(1).min(flat.len());
        (0..=flat.len() - hold).find(|&i| flat[i..i + hold].iter().all(|&f| f))
    }
}

/// Run Welch's procedure with the default tolerance-band criterion.
pub fn estimate_warmup(
    replications: &[&TimeSeries],
    config: &WarmupConfig,
) -> Result<WarmupEstimate, WarmupError> {
    let criterion = ToleranceBand {
        tolerance: config.tolerance,
    };
    estimate_warmup_with(replications, config, &criterion)
}

/// Run Welch's procedure with an explicit stabilization criterion.
pub fn estimate_warmup_with(
    replications: &[&TimeSeries],
    config: &WarmupConfig,
    criterion: &dyn StabilizationCriterion,
) -> Result<WarmupEstimate, WarmupError> {
    if replications.is_empty() {
        return Err(WarmupError::NoReplications);
    }

    // Stage 1: per-replication alignment onto the bin grid.
    let binned: Vec<Vec<(f64, f64)>> = replications
        .iter()
        .map(|series| bin_series(series, config))
        .filter(|bins| !bins.is_empty())
        .collect();
    if binned.is_empty() {
        return Err(WarmupError::NoBins {
            min_bin_samples: config.min_bin_samples,
        });
    }
    let low_confidence = binned.len() < 2;

    // Stage 2: truncate to the shortest common horizon so the ensemble
    // average is defined at every point used.
    let len = binned.iter().map(Vec::len).min().unwrap_or(0);
    let times: Vec<f64> = binned[0][..len].iter().map(|&(t, _)| t).collect();

    // Stage 3: ensemble mean and per-bin ensemble std.
    let reps = binned.len() as f64;
    let mut ensemble = vec![0.0; len];
    for bins in &binned {
        for (slot, &(_, value)) in ensemble.iter_mut().zip(bins[..len].iter()) {
            *slot += value;
        }
    }
    for slot in &mut ensemble {
        *slot /= reps;
    }
    let ensemble_std: Vec<f64> = (0..len)
        .map(|i| {
            if binned.len() < 2 {
                0.0
            } else {
                let mean = ensemble[i];
                let var = binned
                    .iter()
                    .map(|bins| (bins[i].1 - mean).powi(2))
                    .sum::<f64>()
                    / reps;
                var.sqrt()
            }
        })
        .collect();

    // Stage 4: moving average; boundary bins use a reduced window rather
    // than padding with invented data.
    let smoothed = moving_average(&ensemble, config.smoothing_window);

    // Stage 5: cut-point detection against the last-quartile steady state.
    let quartile_start = (0.75 * len as f64) as usize;
    let quartile = &smoothed[quartile_start.min(len - 1)..];
    let steady_state = quartile.iter().sum::<f64>() / quartile.len() as f64;

    let (cut_index, status) = if steady_state == 0.0 {
        (0, DetectionStatus::Immediate)
    } else {
        match criterion.locate(&times, &smoothed, steady_state) {
            Some(index) => (index, DetectionStatus::Detected),
            None => (len / 4, DetectionStatus::Fallback),
        }
    };

    Ok(WarmupEstimate {
        curve: times.iter().copied().zip(smoothed).collect(),
        ensemble_std,
        cut_time: times[cut_index],
        steady_state,
        status,
        low_confidence,
    })
}

/// Average raw samples into fixed-width bins, dropping underpopulated bins.
/// Returns (bin center time, bin mean) in time order.
fn bin_series(series: &TimeSeries, config: &WarmupConfig) -> Vec<(f64, f64)> {
    let mut bins: BTreeMap<i64, (f64, usize)> = BTreeMap::new();
    for &(time, value) in series.samples() {
        let index = (time / config.bin_width).floor() as i64;
        let entry = bins.entry(index).or_insert((0.0, 0));
        entry.0 += value;
        entry.1 += 1;
    }
    bins.into_iter()
        .filter(|&(_, (_, count))| count >= config.min_bin_samples)
        .map(|(index, (sum, count))| {
            let center = (index as f64 + 0.5) * config.bin_width;
            (center, sum / count as f64)
        })
        .collect()
}

/// Centered moving average whose window shrinks at the boundaries.
fn moving_average(values: &[f64], window: usize) -> Vec<f64> {
    if values.is_empty() || window <= 1 {
        return values.to_vec();
    }
    let half = window / 2;
    (0..values.len())
        .map(|i| {
            let lo = i.saturating_sub(half);
            let hi = (i + half).min(values.len() - 1);
            let span = &values[lo..=hi];
            span.iter().sum::<f64>() / span.len() as f64
        })
        .collect()
}
