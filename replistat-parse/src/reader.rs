//! File and directory loading.
//!
//! File reads are the parser's only suspension point. Each file is parsed
//! independently (worker-per-file via rayon); a file that cannot be read is
//! reported and skipped without aborting the rest. Results merge by simple
//! concatenation into a `RunSet`, where a duplicate run identity surfaces as
//! the one hard error.

use crate::assemble::parse_str;
use crate::line::Diagnostic;
use crate::FileParse;
use rayon::prelude::*;
use replistat_core::{RunSet, RunSetError};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// Errors that abort loading outright.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The same (configuration, replication) identity was parsed twice.
    #[error(transparent)]
    Duplicate(#[from] RunSetError),
    /// The results directory itself could not be read.
    #[error("failed to read results directory {path}: {source}")]
    Directory {
        /// Directory that failed.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

/// A file that could not be read; the rest of the load continues.
#[derive(Debug)]
pub struct FailedFile {
    /// Path of the failing file.
    pub path: PathBuf,
    /// Rendered I/O error.
    pub error: String,
}

/// The merged result of loading many files.
#[derive(Debug, Default)]
pub struct ParseOutcome {
    /// All parsed runs, duplicate-free.
    pub runs: RunSet,
    /// Dropped-line diagnostics across all files.
    pub diagnostics: Vec<Diagnostic>,
    /// Files that failed to read.
    pub failed_files: Vec<FailedFile>,
}

/// Parse a single result file.
pub fn parse_file(path: &Path) -> Result<FileParse, std::io::Error> {
    let text = std::fs::read_to_string(path)?;
    let source = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let parsed = parse_str(&text, &source);
    debug!(
        file = %path.display(),
        runs = parsed.runs.len(),
        diagnostics = parsed.diagnostics.len(),
        "parsed result file"
    );
    Ok(parsed)
}

/// Parse an explicit list of files in parallel and merge the results.
pub fn load_files(paths: &[PathBuf]) -> Result<ParseOutcome, ParseError> {
    let parses: Vec<(PathBuf, Result<FileParse, std::io::Error>)> = paths
        .par_iter()
        .map(|path| (path.clone(), parse_file(path)))
        .collect();

    let mut outcome = ParseOutcome::default();
    for (path, result) in parses {
        match result {
            Ok(parsed) => {
                outcome.diagnostics.extend(parsed.diagnostics);
                for run in parsed.runs {
                    outcome.runs.insert(run).map_err(ParseError::Duplicate)?;
                }
            }
            Err(err) => {
                warn!(file = %path.display(), error = %err, "skipping unreadable result file");
                outcome.failed_files.push(FailedFile {
                    path,
                    error: err.to_string(),
                });
            }
        }
    }
    Ok(outcome)
}

/// Scan a directory for `*.sca` / `*.vec` files and load them.
pub fn load_dir(dir: &Path) -> Result<ParseOutcome, ParseError> {
    let entries = std::fs::read_dir(dir).map_err(|source| ParseError::Directory {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            matches!(
                path.extension().and_then(|ext| ext.to_str()),
                Some("sca") | Some("vec")
            )
        })
        .collect();
    paths.sort();
    load_files(&paths)
}
