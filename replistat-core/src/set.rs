//! Run collections with duplicate-identity rejection.

use crate::run::{Configuration, Run, RunIdentity};
use fxhash::FxHashSet;
use thiserror::Error;

/// Errors raised while building a run collection.
#[derive(Debug, Clone, Error)]
pub enum RunSetError {
    /// The same (configuration, replication) identity was seen twice.
    /// Silently overwriting would corrupt aggregate statistics, so this is a
    /// hard error for the caller.
    #[error("duplicate run identity: {identity} (second copy from {origin})")]
    DuplicateRun {
        /// Rendered identity of the colliding run.
        identity: String,
        /// Source of the rejected copy.
        origin: String,
    },
}

/// Append-only collection of parsed runs.
///
/// Merging two sets is associative and commutative over well-formed inputs;
/// a duplicate identity anywhere is rejected rather than merged.
#[derive(Debug, Clone, Default)]
pub struct RunSet {
    runs: Vec<Run>,
    seen: FxHashSet<RunIdentity>,
}

impl RunSet {
    /// Empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert one run, rejecting duplicate identities.
    pub fn insert(&mut self, run: Run) -> Result<(), RunSetError> {
        let identity = run.identity();
        if !self.seen.insert(identity.clone()) {
            return Err(RunSetError::DuplicateRun {
                identity: identity.to_string(),
                origin: run.source,
            });
        }
        self.runs.push(run);
        Ok(())
    }

    /// Merge another set into this one.
    pub fn merge(&mut self, other: RunSet) -> Result<(), RunSetError> {
        for run in other.runs {
            self.insert(run)?;
        }
        Ok(())
    }

    /// The runs in insertion order.
    pub fn runs(&self) -> &[Run] {
        &self.runs
    }

    /// Number of runs.
    pub fn len(&self) -> usize {
        self.runs.len()
    }

    /// Whether the set holds no runs.
    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    /// Iterate the runs.
    pub fn iter(&self) -> impl Iterator<Item = &Run> {
        self.runs.iter()
    }

    /// Consume the set, yielding the runs.
    pub fn into_runs(self) -> Vec<Run> {
        self.runs
    }

    /// Group runs by configuration, ordered by configuration key.
    ///
    /// Configurations are derived on demand; the grouping is recomputed from
    /// the current run set every call.
    pub fn by_configuration(&self) -> Vec<(Configuration, Vec<&Run>)> {
        let mut groups: Vec<(Configuration, Vec<&Run>)> = Vec::new();
        for run in &self.runs {
            match groups.iter_mut().find(|(config, _)| *config == run.factors) {
                Some((_, members)) => members.push(run),
                None => groups.push((run.factors.clone(), vec![run])),
            }
        }
        groups.sort_by(|a, b| a.0.key().cmp(&b.0.key()));
        groups
    }
}

impl FromIterator<Run> for RunSet {
    /// Collect runs, panicking on duplicates. Use `insert` when duplicate
    /// identities must be surfaced to the caller.
    fn from_iter<T: IntoIterator<Item = Run>>(iter: T) -> Self {
        let mut set = RunSet::new();
        for run in iter {
            if let Err(err) = set.insert(run) {
                panic!("FromIterator<Run> on duplicate identities: {err}");
            }
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run::FactorValue;

    fn keyed_run(n: &str, rep: u32) -> Run {
        let mut run = Run {
            source: format!("n{n}-#{rep}.sca"),
            repetition: Some(rep),
            ..Run::default()
        };
        run.factors.set("N", FactorValue::parse(n));
        run
    }

    #[test]
    fn test_insert_rejects_duplicate_identity() {
        let mut set = RunSet::new();
        set.insert(keyed_run("100", 0)).unwrap();
        set.insert(keyed_run("100", 1)).unwrap();

        let err = set.insert(keyed_run("100", 0)).unwrap_err();
        assert!(matches!(err, RunSetError::DuplicateRun { .. }));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_anonymous_runs_keyed_by_source() {
        let mut set = RunSet::new();
        set.insert(Run {
            source: "a.sca".to_string(),
            ..Run::default()
        })
        .unwrap();
        set.insert(Run {
            source: "b.sca".to_string(),
            ..Run::default()
        })
        .unwrap();

        let err = set
            .insert(Run {
                source: "a.sca".to_string(),
                ..Run::default()
            })
            .unwrap_err();
        assert!(matches!(err, RunSetError::DuplicateRun { .. }));
    }

    #[test]
    fn test_merge_is_union() {
        let mut left = RunSet::new();
        left.insert(keyed_run("100", 0)).unwrap();

        let mut right = RunSet::new();
        right.insert(keyed_run("100", 1)).unwrap();
        right.insert(keyed_run("500", 0)).unwrap();

        left.merge(right).unwrap();
        assert_eq!(left.len(), 3);
    }

    #[test]
    fn test_by_configuration_groups_replications() {
        let mut set = RunSet::new();
        set.insert(keyed_run("100", 0)).unwrap();
        set.insert(keyed_run("500", 0)).unwrap();
        set.insert(keyed_run("100", 1)).unwrap();

        let groups = set.by_configuration();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0.key(), "N=100");
        assert_eq!(groups[0].1.len(), 2);
        assert_eq!(groups[1].0.key(), "N=500");
        assert_eq!(groups[1].1.len(), 1);
    }
}
