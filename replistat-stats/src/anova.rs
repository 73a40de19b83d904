//! Balanced factorial ANOVA.
//!
//! Decomposes the total variation of a response metric over a full factorial
//! run set into the contributions of each factor and each interaction, plus
//! a residual term. Generalizes the classical three-factor textbook
//! procedure to any number of factors via bitmask subset enumeration:
//! an effect's deviations are its marginal means minus every lower-order
//! effect already accounted for (inclusion-exclusion), and its sum of
//! squares is the squared deviations scaled by the replication count and the
//! level counts of the factors outside the effect.

use crate::aggregate::MetricSelector;
use replistat_core::{FactorValue, Run, RunSet};
use serde::Serialize;
use std::cmp::Ordering;
use std::fmt;
use thiserror::Error;

/// Name of the residual row in a `FactorEffectTable`.
pub const RESIDUAL_EFFECT: &str = "Residual";

/// One row of the decomposition: a main effect, an interaction, or the
/// residual.
#[derive(Debug, Clone, Serialize)]
pub struct FactorEffect {
    /// Factor name, `×`-joined factor names for interactions, or `Residual`.
    pub name: String,
    /// Sum of squares attributed to this effect.
    pub sum_of_squares: f64,
    /// Degrees of freedom.
    pub degrees_of_freedom: usize,
    /// Sum of squares per degree of freedom (0 when dof is 0).
    pub mean_square: f64,
    /// Non-negative percentage of total variation explained.
    pub percent: f64,
}

/// Conditions worth reporting that do not stop the decomposition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum AnovaWarning {
    /// Cell replication counts were unequal; the decomposition used the
    /// minimum count per cell and discarded the excess.
    Imbalanced {
        /// Smallest cell count (the count actually used).
        min: usize,
        /// Largest cell count observed.
        max: usize,
    },
    /// Every observation equals the grand mean; all percentages are zero.
    ZeroTotalVariance,
}

impl fmt::Display for AnovaWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnovaWarning::Imbalanced { min, max } => write!(
                f,
                "unequal cell replication counts (min {min}, max {max}); using {min} per cell"
            ),
            AnovaWarning::ZeroTotalVariance => write!(f, "total variance is zero"),
        }
    }
}

/// The full decomposition for one response metric.
#[derive(Debug, Clone, Serialize)]
pub struct FactorEffectTable {
    /// Response metric name.
    pub response: String,
    /// Factor names in effect-name order.
    pub factors: Vec<String>,
    /// Level counts per factor, aligned with `factors`.
    pub levels: Vec<usize>,
    /// Replications used per cell (the minimum cell count).
    pub replications: usize,
    /// Grand mean of the used observations.
    pub grand_mean: f64,
    /// Effects ordered main effects first, then interactions by order, with
    /// the `Residual` row last. Percentages sum to 100 (within tolerance)
    /// for a balanced design.
    pub effects: Vec<FactorEffect>,
    /// Total sum of squares (every observation against the grand mean).
    pub total_sum_of_squares: f64,
    /// Imbalance and degeneracy signals; never silently dropped.
    pub warnings: Vec<AnovaWarning>,
}

impl FactorEffectTable {
    /// Percentage attributed to a named effect, if present.
    pub fn percent_of(&self, name: &str) -> Option<f64> {
        self.effects
            .iter()
            .find(|effect| effect.name == name)
            .map(|effect| effect.percent)
    }
}

/// Inputs the decomposition cannot run on.
#[derive(Debug, Error)]
pub enum AnovaError {
    /// The run set was empty.
    #[error("no runs supplied")]
    NoRuns,
    /// The runs carry no experimental factors at all.
    #[error("runs carry no experimental factors")]
    NoFactors,
    /// A run spans a different factor set than the rest.
    #[error("run `{origin}` does not span the same factors as the rest")]
    MismatchedFactors {
        /// Source of the offending run.
        origin: String,
    },
    /// No run provides the response metric.
    #[error("no run provides the response metric `{metric}`")]
    NoResponse {
        /// The selector's metric name.
        metric: String,
    },
    /// Some level combination has no replication at all.
    #[error("cell {cell} is unpopulated; the design is not full factorial")]
    IncompleteDesign {
        /// Rendered level combination of the empty cell.
        cell: String,
    },
}

/// Decompose the response metric's variation over the runs' factorial design.
pub fn decompose(
    runs: &RunSet,
    selector: &MetricSelector,
) -> Result<FactorEffectTable, AnovaError> {
    let all: Vec<&Run> = runs.iter().collect();
    let first = all.first().ok_or(AnovaError::NoRuns)?;

    let factors: Vec<String> = first.factors.factor_names().cloned().collect();
    if factors.is_empty() {
        return Err(AnovaError::NoFactors);
    }
    for run in &all {
        let same = run.factors.len() == factors.len()
            && factors.iter().all(|name| run.factors.contains(name));
        if !same {
            return Err(AnovaError::MismatchedFactors {
                origin: run.source.clone(),
            });
        }
    }

    // Distinct levels per factor, in a stable order.
    let mut levels: Vec<Vec<FactorValue>> = vec![Vec::new(); factors.len()];
    for run in &all {
        for (slot, name) in levels.iter_mut().zip(&factors) {
            if let Some(value) = run.factors.get(name) {
                if !slot.contains(value) {
                    slot.push(value.clone());
                }
            }
        }
    }
    for slot in &mut levels {
        slot.sort_by(cmp_levels);
    }
    let dims: Vec<usize> = levels.iter().map(Vec::len).collect();
    let cell_count: usize = dims.iter().product();

    // Sort observations into cells.
    let mut cells: Vec<Vec<(u32, String, f64)>> = vec![Vec::new(); cell_count];
    let mut any_response = false;
    for run in &all {
        let Some(value) = selector.extract(run) else {
            continue;
        };
        any_response = true;
        let combo: Vec<usize> = factors
            .iter()
            .enumerate()
            .map(|(f, name)| {
                let level = run.factors.get(name).expect("factor presence checked");
                levels[f].iter().position(|l| l == level).expect("level collected")
            })
            .collect();
        cells[flat_index(&combo, &dims)].push((
            run.repetition.unwrap_or(u32::MAX),
            run.source.clone(),
            value,
        ));
    }
    if !any_response {
        return Err(AnovaError::NoResponse {
            metric: selector.metric.clone(),
        });
    }
    if let Some(empty) = cells.iter().position(Vec::is_empty) {
        return Err(AnovaError::IncompleteDesign {
            cell: render_cell(empty, &factors, &levels, &dims),
        });
    }

    let min_count = cells.iter().map(Vec::len).min().unwrap_or(0);
    let max_count = cells.iter().map(Vec::len).max().unwrap_or(0);
    let mut warnings = Vec::new();
    if min_count != max_count {
        warnings.push(AnovaWarning::Imbalanced {
            min: min_count,
            max: max_count,
        });
    }
    let reps = min_count;

    // Deterministic truncation to the balanced count: earliest replications
    // (by replication index, then source) survive.
    let data: Vec<Vec<f64>> = cells
        .into_iter()
        .map(|mut cell| {
            cell.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
            cell.into_iter().take(reps).map(|(_, _, v)| v).collect()
        })
        .collect();

    let n_total = (reps * cell_count) as f64;
    let grand_mean = data.iter().flatten().sum::<f64>() / n_total;
    let total_ss: f64 = data
        .iter()
        .flatten()
        .map(|v| (v - grand_mean).powi(2))
        .sum();

    // Cell sums feed every marginal mean.
    let cell_sums: Vec<f64> = data.iter().map(|cell| cell.iter().sum()).collect();

    let k = factors.len();
    let masks = effect_masks(k);

    // Marginal means and effect deviations per factor subset, in popcount
    // order so lower-order effects are available when interactions subtract
    // them out.
    let mut deviations: Vec<Vec<f64>> = vec![Vec::new(); 1 << k];
    let mut effects: Vec<FactorEffect> = Vec::with_capacity(masks.len() + 1);

    for &mask in &masks {
        let size = subset_size(mask, &dims);
        let mut sums = vec![0.0; size];
        for (cell, &sum) in cell_sums.iter().enumerate() {
            let combo = decode(cell, &dims);
            sums[subset_index(&combo, &dims, mask)] += sum;
        }
        // balanced after truncation: equal weight behind every marginal mean
        let weight = n_total / size as f64;
        let means: Vec<f64> = sums.iter().map(|s| s / weight).collect();

        let devs: Vec<f64> = (0..size)
            .map(|i| {
                let combo = decode_subset(i, &dims, mask);
                let mut dev = means[i] - grand_mean;
                for &sub in &masks {
                    if sub != mask && sub & mask == sub && sub.count_ones() < mask.count_ones() {
                        dev -= deviations[sub as usize][subset_index(&combo, &dims, sub)];
                    }
                }
                dev
            })
            .collect();

        // reps · Π(levels outside the effect) is exactly the weight behind
        // each marginal mean
        let ss: f64 = weight * devs.iter().map(|d| d * d).sum::<f64>();
        let dof: usize = (0..k)
            .filter(|f| mask & (1 << f) != 0)
            .map(|f| dims[f] - 1)
            .product();
        effects.push(FactorEffect {
            name: effect_name(mask, &factors),
            sum_of_squares: ss,
            degrees_of_freedom: dof,
            mean_square: if dof > 0 { ss / dof as f64 } else { 0.0 },
            percent: 0.0, // filled below once total is known
        });
        deviations[mask as usize] = devs;
    }

    // Residual: within-cell variation around the cell means.
    let residual_ss: f64 = data
        .iter()
        .zip(&cell_sums)
        .map(|(cell, &sum)| {
            let mean = sum / reps as f64;
            cell.iter().map(|v| (v - mean).powi(2)).sum::<f64>()
        })
        .sum();
    let residual_dof = cell_count * reps.saturating_sub(1);
    effects.push(FactorEffect {
        name: RESIDUAL_EFFECT.to_string(),
        sum_of_squares: residual_ss,
        degrees_of_freedom: residual_dof,
        mean_square: if residual_dof > 0 {
            residual_ss / residual_dof as f64
        } else {
            0.0
        },
        percent: 0.0,
    });

    if total_ss > 0.0 {
        for effect in &mut effects {
            effect.percent = effect.sum_of_squares.max(0.0) / total_ss * 100.0;
        }
    } else {
        warnings.push(AnovaWarning::ZeroTotalVariance);
    }

    Ok(FactorEffectTable {
        response: selector.metric.clone(),
        factors,
        levels: dims,
        replications: reps,
        grand_mean,
        effects,
        total_sum_of_squares: total_ss,
        warnings,
    })
}

/// Order levels numbers-first (by value), then texts lexicographically.
fn cmp_levels(a: &FactorValue, b: &FactorValue) -> Ordering {
    match (a, b) {
        (FactorValue::Number(x), FactorValue::Number(y)) => {
            x.partial_cmp(y).unwrap_or(Ordering::Equal)
        }
        (FactorValue::Number(_), FactorValue::Text(_)) => Ordering::Less,
        (FactorValue::Text(_), FactorValue::Number(_)) => Ordering::Greater,
        (FactorValue::Text(x), FactorValue::Text(y)) => x.cmp(y),
    }
}

/// Non-empty factor subsets, ordered by effect order then factor position.
fn effect_masks(k: usize) -> Vec<u32> {
    let mut masks: Vec<u32> = (1..(1u32 << k)).collect();
    masks.sort_by_key(|m| (m.count_ones(), *m));
    masks
}

fn effect_name(mask: u32, factors: &[String]) -> String {
    let names: Vec<&str> = factors
        .iter()
        .enumerate()
        .filter(|(f, _)| mask & (1 << f) != 0)
        .map(|(_, name)| name.as_str())
        .collect();
    names.join("×")
}

fn flat_index(combo: &[usize], dims: &[usize]) -> usize {
    combo
        .iter()
        .zip(dims)
        .fold(0, |acc, (&c, &d)| acc * d + c)
}

fn decode(mut index: usize, dims: &[usize]) -> Vec<usize> {
    let mut combo = vec![0; dims.len()];
    for f in (0..dims.len()).rev() {
        combo[f] = index % dims[f];
        index /= dims[f];
    }
    combo
}

/// Index into a subset's marginal array given a full level combination.
fn subset_index(combo: &[usize], dims: &[usize], mask: u32) -> usize {
    let mut index = 0;
    for f in 0..dims.len() {
        if mask & (1 << f) != 0 {
            index = index * dims[f] + combo[f];
        }
    }
    index
}

fn subset_size(mask: u32, dims: &[usize]) -> usize {
    (0..dims.len())
        .filter(|f| mask & (1 << f) != 0)
        .map(|f| dims[f])
        .product()
}

/// Expand a subset-array index back into a full combination (factors outside
/// the subset get level 0; they are never read through this path).
fn decode_subset(mut index: usize, dims: &[usize], mask: u32) -> Vec<usize> {
    let mut combo = vec![0; dims.len()];
    for f in (0..dims.len()).rev() {
        if mask & (1 << f) != 0 {
            combo[f] = index % dims[f];
            index /= dims[f];
        }
    }
    combo
}

fn render_cell(index: usize, factors: &[String], levels: &[Vec<FactorValue>], dims: &[usize]) -> String {
    let combo = decode(index, dims);
    factors
        .iter()
        .zip(&combo)
        .enumerate()
        .map(|(f, (name, &level))| format!("{name}={}", levels[f][level]))
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use replistat_core::ScalarKey;

    fn run(factors: &[(&str, &str)], rep: u32, value: f64) -> Run {
        let mut run = Run {
            source: format!(
                "{}-#{rep}.sca",
                factors.iter().map(|(_, v)| *v).collect::<Vec<_>>().join("_")
            ),
            repetition: Some(rep),
            ..Run::default()
        };
        for (name, level) in factors {
            run.factors.set(*name, FactorValue::parse(level));
        }
        run.scalars
            .insert(ScalarKey::new("net", 0, "throughput"), value);
        run
    }

    fn selector() -> MetricSelector {
        MetricSelector::sum("net", "throughput")
    }

    fn percent_sum(table: &FactorEffectTable) -> f64 {
        table.effects.iter().map(|e| e.percent).sum()
    }

    #[test]
    fn test_two_factor_hand_computed_sums_of_squares() {
        // 2x2 design, 2 replications per cell, hand-computed decomposition:
        // SS_A = 968, SS_B = 288, SS_AB = 8, SS_residual = 8, total = 1272.
        let cells = [
            (("A", "0"), ("B", "0"), [10.0, 12.0]),
            (("A", "0"), ("B", "1"), [20.0, 22.0]),
            (("A", "1"), ("B", "0"), [30.0, 32.0]),
            (("A", "1"), ("B", "1"), [44.0, 46.0]),
        ];
        let mut set = RunSet::new();
        for (a, b, values) in cells {
            for (rep, value) in values.into_iter().enumerate() {
                set.insert(run(&[a, b], rep as u32, value)).unwrap();
            }
        }

        let table = decompose(&set, &selector()).unwrap();
        assert_eq!(table.replications, 2);
        assert_eq!(table.grand_mean, 27.0);
        assert_eq!(table.total_sum_of_squares, 1272.0);

        let ss_of = |name: &str| {
            table
                .effects
                .iter()
                .find(|e| e.name == name)
                .map(|e| e.sum_of_squares)
                .unwrap()
        };
        assert!((ss_of("A") - 968.0).abs() < 1e-9);
        assert!((ss_of("B") - 288.0).abs() < 1e-9);
        assert!((ss_of("A×B") - 8.0).abs() < 1e-9);
        assert!((ss_of(RESIDUAL_EFFECT) - 8.0).abs() < 1e-9);
        assert!((percent_sum(&table) - 100.0).abs() < crate::PERCENT_SUM_TOLERANCE);
    }

    #[test]
    fn test_three_factor_dominant_main_effect() {
        // 2x2x2 with the response driven by A (plus a sliver of B): A must
        // take >90% and the table must still sum to 100%.
        let mut set = RunSet::new();
        for (i, a) in ["10", "100"].iter().enumerate() {
            for (j, b) in ["0.3", "0.8"].iter().enumerate() {
                for c in ["dist1", "dist2"] {
                    for rep in 0..2 {
                        let value = 10.0 * i as f64 + 0.1 * j as f64;
                        set.insert(run(&[("N", a), ("p", b), ("dist", c)], rep, value))
                            .unwrap();
                    }
                }
            }
        }

        let table = decompose(&set, &selector()).unwrap();
        assert!(table.warnings.is_empty());
        assert!(table.percent_of("N").unwrap() > 90.0);
        assert!(table.percent_of("p").unwrap() < 5.0);
        assert_eq!(table.percent_of("dist").unwrap(), 0.0);
        assert!((percent_sum(&table) - 100.0).abs() < crate::PERCENT_SUM_TOLERANCE);

        // main effects first, residual last
        assert_eq!(table.effects.first().unwrap().name, "N");
        assert_eq!(table.effects.last().unwrap().name, RESIDUAL_EFFECT);
    }

    #[test]
    fn test_effect_ordering_and_names() {
        let mut set = RunSet::new();
        for a in ["0", "1"] {
            for b in ["0", "1"] {
                for c in ["0", "1"] {
                    set.insert(run(&[("A", a), ("B", b), ("C", c)], 0, 1.0))
                        .unwrap();
                }
            }
        }
        let table = decompose(&set, &selector()).unwrap();
        let names: Vec<&str> = table.effects.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["A", "B", "C", "A×B", "A×C", "B×C", "A×B×C", RESIDUAL_EFFECT]
        );
        // constant response: zero variance is reported, not hidden
        assert!(table.warnings.contains(&AnovaWarning::ZeroTotalVariance));
        assert!(table.effects.iter().all(|e| e.percent == 0.0));
    }

    #[test]
    fn test_imbalanced_cells_warn_and_truncate() {
        let mut set = RunSet::new();
        for a in ["0", "1"] {
            for b in ["0", "1"] {
                for rep in 0..2 {
                    set.insert(run(&[("A", a), ("B", b)], rep, 5.0)).unwrap();
                }
            }
        }
        // one extra replication in a single cell
        set.insert(run(&[("A", "0"), ("B", "0")], 2, 500.0)).unwrap();

        let table = decompose(&set, &selector()).unwrap();
        assert_eq!(table.replications, 2);
        assert!(table
            .warnings
            .contains(&AnovaWarning::Imbalanced { min: 2, max: 3 }));
        // the excess (highest repetition index) was the discarded one, so
        // the outlier value never enters the decomposition
        assert_eq!(table.grand_mean, 5.0);
    }

    #[test]
    fn test_four_factor_identity() {
        // Balanced 2^4 design with one observation per cell: the effect sums
        // of squares must reconstruct the total exactly.
        let mut set = RunSet::new();
        for a in 0..2 {
            for b in 0..2 {
                for c in 0..2 {
                    for d in 0..2 {
                        let value = (3 * a + 5 * b + 2 * a * b + 7 * c + d * (1 + a)) as f64
                            + 0.25 * (a * b * c * d) as f64;
                        set.insert(run(
                            &[
                                ("A", &a.to_string()),
                                ("B", &b.to_string()),
                                ("C", &c.to_string()),
                                ("D", &d.to_string()),
                            ],
                            0,
                            value,
                        ))
                        .unwrap();
                    }
                }
            }
        }

        let table = decompose(&set, &selector()).unwrap();
        let explained: f64 = table
            .effects
            .iter()
            .map(|e| e.sum_of_squares)
            .sum();
        assert!(
            (explained - table.total_sum_of_squares).abs()
                < 1e-9 * table.total_sum_of_squares.max(1.0)
        );
        assert!((percent_sum(&table) - 100.0).abs() < crate::PERCENT_SUM_TOLERANCE);
        // 15 effect subsets + residual
        assert_eq!(table.effects.len(), 16);
    }

    #[test]
    fn test_incomplete_design_is_error() {
        let mut set = RunSet::new();
        set.insert(run(&[("A", "0"), ("B", "0")], 0, 1.0)).unwrap();
        set.insert(run(&[("A", "1"), ("B", "1")], 0, 2.0)).unwrap();

        let err = decompose(&set, &selector()).unwrap_err();
        assert!(matches!(err, AnovaError::IncompleteDesign { .. }));
    }

    #[test]
    fn test_mismatched_factors_is_error() {
        let mut set = RunSet::new();
        set.insert(run(&[("A", "0")], 0, 1.0)).unwrap();
        set.insert(run(&[("A", "1"), ("B", "0")], 0, 2.0)).unwrap();

        let err = decompose(&set, &selector()).unwrap_err();
        assert!(matches!(err, AnovaError::MismatchedFactors { .. }));
    }

    #[test]
    fn test_missing_response_is_error() {
        let mut set = RunSet::new();
        set.insert(run(&[("A", "0")], 0, 1.0)).unwrap();
        set.insert(run(&[("A", "1")], 0, 2.0)).unwrap();

        let bad = MetricSelector::sum("net", "no_such_metric");
        let err = decompose(&set, &bad).unwrap_err();
        assert!(matches!(err, AnovaError::NoResponse { .. }));
    }

    #[test]
    fn test_no_runs_is_error() {
        let err = decompose(&RunSet::new(), &selector()).unwrap_err();
        assert!(matches!(err, AnovaError::NoRuns));
    }
}
