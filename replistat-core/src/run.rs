//! Run records and their identity.

use fxhash::FxHashMap;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

/// A typed experimental factor level.
///
/// Factor values coming out of result files are plain tokens; numeric tokens
/// become `Number` so that `0.50` and `0.5` group together, everything else
/// stays `Text`.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum FactorValue {
    /// Numeric level, e.g. `N=100` or `p=0.5`.
    Number(f64),
    /// Categorical level, e.g. `dist=Uniform`.
    Text(String),
}

impl FactorValue {
    /// Parse a raw token into a typed level.
    pub fn parse(token: &str) -> Self {
        let token = token.trim();
        match token.parse::<f64>() {
            Ok(v) if v.is_finite() => FactorValue::Number(v),
            _ => FactorValue::Text(token.to_string()),
        }
    }

    /// Numeric view of the level, if it has one.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FactorValue::Number(v) => Some(*v),
            FactorValue::Text(_) => None,
        }
    }
}

impl fmt::Display for FactorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FactorValue::Number(v) => {
                if v.fract() == 0.0 && v.abs() < 1e15 {
                    write!(f, "{}", *v as i64)
                } else {
                    write!(f, "{v}")
                }
            }
            FactorValue::Text(s) => write!(f, "{s}"),
        }
    }
}

// Equality and hashing go through the bit pattern so that levels group
// exactly as parsed. NaN never reaches here (`parse` rejects non-finite).
impl PartialEq for FactorValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (FactorValue::Number(a), FactorValue::Number(b)) => a.to_bits() == b.to_bits(),
            (FactorValue::Text(a), FactorValue::Text(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for FactorValue {}

impl Hash for FactorValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            FactorValue::Number(v) => {
                0u8.hash(state);
                v.to_bits().hash(state);
            }
            FactorValue::Text(s) => {
                1u8.hash(state);
                s.hash(state);
            }
        }
    }
}

/// A fixed assignment of factor levels, independent of replication.
///
/// Derived by grouping runs; the ordered map keeps grouping keys and output
/// ordering deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Configuration(BTreeMap<String, FactorValue>);

impl Configuration {
    /// Empty configuration (a run parsed from a file without metadata).
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a factor level. Returns the previous level if the factor was
    /// already assigned.
    pub fn set(&mut self, factor: impl Into<String>, value: FactorValue) -> Option<FactorValue> {
        self.0.insert(factor.into(), value)
    }

    /// Look up a factor level.
    pub fn get(&self, factor: &str) -> Option<&FactorValue> {
        self.0.get(factor)
    }

    /// Whether a factor is assigned.
    pub fn contains(&self, factor: &str) -> bool {
        self.0.contains_key(factor)
    }

    /// Iterate factor assignments in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &FactorValue)> {
        self.0.iter()
    }

    /// Factor names in order.
    pub fn factor_names(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    /// Number of assigned factors.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no factor is assigned.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Stable display key, e.g. `N=100,dist=Uniform,p=0.5`.
    ///
    /// Used to order aggregates and report rows deterministically.
    pub fn key(&self) -> String {
        let mut out = String::new();
        for (i, (name, value)) in self.0.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            out.push_str(name);
            out.push('=');
            out.push_str(&value.to_string());
        }
        out
    }
}

impl fmt::Display for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// Key of one scalar or one time-series result inside a run:
/// (entity class, entity index, metric name).
///
/// Class and metric are stored lowercase and trimmed so lookups are
/// insensitive to the casing quirks of result writers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScalarKey {
    /// Entity class, e.g. `table` from `Network.table[3]`.
    pub entity_class: String,
    /// Bracketed entity index; 0 when the path carries none.
    pub entity_index: u32,
    /// Metric name, e.g. `utilization`.
    pub metric: String,
}

impl ScalarKey {
    /// Build a key, normalizing class and metric (trim + lowercase).
    pub fn new(entity_class: &str, entity_index: u32, metric: &str) -> Self {
        Self {
            entity_class: entity_class.trim().to_ascii_lowercase(),
            entity_index,
            metric: metric.trim().to_ascii_lowercase(),
        }
    }
}

impl fmt::Display for ScalarKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}].{}", self.entity_class, self.entity_index, self.metric)
    }
}

/// An ordered sequence of (time, value) samples.
///
/// Time is non-decreasing once finalized; the parser appends in file order
/// and sorts on finalization.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimeSeries {
    samples: Vec<(f64, f64)>,
}

impl TimeSeries {
    /// Empty series.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a series from samples, establishing the time ordering.
    pub fn from_samples(samples: Vec<(f64, f64)>) -> Self {
        let mut series = Self { samples };
        series.finalize();
        series
    }

    /// Append a sample in arrival order.
    pub fn push(&mut self, time: f64, value: f64) {
        self.samples.push((time, value));
    }

    /// Establish the non-decreasing time invariant.
    pub fn finalize(&mut self) {
        self.samples
            .sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
    }

    /// The samples in time order.
    pub fn samples(&self) -> &[(f64, f64)] {
        &self.samples
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the series holds no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Time of the last sample, if any.
    pub fn max_time(&self) -> Option<f64> {
        self.samples.last().map(|&(t, _)| t)
    }
}

/// One execution of the simulated system under a fixed configuration and a
/// fixed replication index.
#[derive(Debug, Clone, Default)]
pub struct Run {
    /// File-provided identity (file name, possibly suffixed by run block).
    pub source: String,
    /// Factor-level mapping from `itervar` lines.
    pub factors: Configuration,
    /// Replication index from `attr repetition`; `None` when absent.
    pub repetition: Option<u32>,
    /// Remaining `attr` metadata, kept opaque.
    pub attrs: BTreeMap<String, String>,
    /// Scalar results keyed by (entity class, entity index, metric).
    pub scalars: FxHashMap<ScalarKey, f64>,
    /// Time-series results keyed like scalars.
    pub vectors: FxHashMap<ScalarKey, TimeSeries>,
}

impl Run {
    /// The identity under which this run is deduplicated.
    pub fn identity(&self) -> RunIdentity {
        if self.factors.is_empty() && self.repetition.is_none() {
            RunIdentity::Anonymous {
                source: self.source.clone(),
            }
        } else {
            RunIdentity::Keyed {
                configuration: self.factors.clone(),
                repetition: self.repetition,
            }
        }
    }

    /// Scalar values matching an entity class and metric, optionally pinned
    /// to a single entity index. Class and metric are normalized before the
    /// lookup, matching `ScalarKey` storage.
    pub fn scalars_matching<'a>(
        &'a self,
        entity_class: &str,
        metric: &str,
        entity_index: Option<u32>,
    ) -> impl Iterator<Item = f64> + 'a {
        let class = entity_class.trim().to_ascii_lowercase();
        let metric = metric.trim().to_ascii_lowercase();
        self.scalars.iter().filter_map(move |(key, &value)| {
            let index_ok = entity_index.map_or(true, |idx| idx == key.entity_index);
            (key.entity_class == class && key.metric == metric && index_ok).then_some(value)
        })
    }

    /// Time series matching an entity class and metric, optionally pinned to
    /// a single entity index.
    pub fn vectors_matching<'a>(
        &'a self,
        entity_class: &str,
        metric: &str,
        entity_index: Option<u32>,
    ) -> impl Iterator<Item = &'a TimeSeries> + 'a {
        let class = entity_class.trim().to_ascii_lowercase();
        let metric = metric.trim().to_ascii_lowercase();
        self.vectors.iter().filter_map(move |(key, series)| {
            let index_ok = entity_index.map_or(true, |idx| idx == key.entity_index);
            (key.entity_class == class && key.metric == metric && index_ok).then_some(series)
        })
    }
}

/// The deduplication identity of a run.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RunIdentity {
    /// Runs carrying experiment metadata: same configuration + same
    /// replication index means the same run.
    Keyed {
        /// The run's factor-level mapping.
        configuration: Configuration,
        /// The run's replication index.
        repetition: Option<u32>,
    },
    /// Runs without metadata are keyed by where they came from.
    Anonymous {
        /// File-provided identity.
        source: String,
    },
}

impl fmt::Display for RunIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunIdentity::Keyed {
                configuration,
                repetition,
            } => match repetition {
                Some(rep) => write!(f, "{{{configuration}}} #{rep}"),
                None => write!(f, "{{{configuration}}}"),
            },
            RunIdentity::Anonymous { source } => write!(f, "{source}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factor_value_numeric_grouping() {
        assert_eq!(FactorValue::parse("0.50"), FactorValue::parse("0.5"));
        assert_eq!(FactorValue::parse("100"), FactorValue::Number(100.0));
        assert_ne!(FactorValue::parse("uniform"), FactorValue::parse("0.5"));
    }

    #[test]
    fn test_factor_value_display() {
        assert_eq!(FactorValue::parse("100").to_string(), "100");
        assert_eq!(FactorValue::parse("0.5").to_string(), "0.5");
        assert_eq!(FactorValue::parse("Uniform").to_string(), "Uniform");
    }

    #[test]
    fn test_configuration_key_is_ordered() {
        let mut config = Configuration::new();
        config.set("p", FactorValue::parse("0.5"));
        config.set("N", FactorValue::parse("100"));
        assert_eq!(config.key(), "N=100,p=0.5");
    }

    #[test]
    fn test_scalar_key_normalization() {
        let key = ScalarKey::new("  Table ", 3, "Utilization");
        assert_eq!(key.entity_class, "table");
        assert_eq!(key.metric, "utilization");
    }

    #[test]
    fn test_time_series_finalize_orders_samples() {
        let series = TimeSeries::from_samples(vec![(2.0, 1.0), (1.0, 3.0), (3.0, 2.0)]);
        assert_eq!(series.samples(), &[(1.0, 3.0), (2.0, 1.0), (3.0, 2.0)]);
        assert_eq!(series.max_time(), Some(3.0));
    }

    #[test]
    fn test_run_identity_falls_back_to_source() {
        let run = Run {
            source: "results/run-0.sca".to_string(),
            ..Run::default()
        };
        assert_eq!(
            run.identity(),
            RunIdentity::Anonymous {
                source: "results/run-0.sca".to_string()
            }
        );
    }

    #[test]
    fn test_scalars_matching_modes() {
        let mut run = Run::default();
        run.scalars.insert(ScalarKey::new("table", 0, "throughput"), 10.0);
        run.scalars.insert(ScalarKey::new("table", 1, "throughput"), 20.0);
        run.scalars.insert(ScalarKey::new("user", 0, "throughput"), 99.0);

        let mut all: Vec<f64> = run.scalars_matching("Table", "Throughput", None).collect();
        all.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(all, vec![10.0, 20.0]);

        let pinned: Vec<f64> = run.scalars_matching("table", "throughput", Some(1)).collect();
        assert_eq!(pinned, vec![20.0]);
    }
}
