//! Line classification: one tagged variant per recognized line shape.
//!
//! The grammar is whitespace-delimited tokens, one record per physical line.
//! Classification never looks across lines; the assembler owns run-block
//! structure.

use regex::Regex;
use std::fmt;
use thiserror::Error;

/// An entity path token, e.g. `DatabaseNetwork.table[3]`.
///
/// The entity class is the final path segment, the bracketed integer is the
/// entity index. A path without a bracket gets index 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityPath {
    /// Entity class (final path segment, original casing).
    pub class: String,
    /// Bracketed entity index, 0 when absent.
    pub index: u32,
}

/// One classified input line.
#[derive(Debug, Clone, PartialEq)]
pub enum LineToken {
    /// `itervar <factor> <value>` — one experimental factor level.
    Itervar {
        /// Factor name.
        factor: String,
        /// Raw level token.
        value: String,
    },
    /// `attr <key> <value>` — run metadata (replication index lives here).
    Attr {
        /// Attribute key.
        key: String,
        /// Raw attribute value.
        value: String,
    },
    /// `scalar <entity-path> <metric> <value>` — one scalar result.
    Scalar {
        /// Parsed entity path.
        entity: EntityPath,
        /// Metric name (original casing; normalized at record time).
        metric: String,
        /// Scalar value.
        value: f64,
    },
    /// `vector <id> <entity-path> <metric>:vector <type>` — channel
    /// declaration binding a numeric id.
    VectorDecl {
        /// Channel id.
        id: u64,
        /// Parsed entity path.
        entity: EntityPath,
        /// Metric name with any `:vector` suffix stripped.
        metric: String,
    },
    /// `<id> <seq> <time> <value>` — one sample for a declared channel.
    VectorData {
        /// Channel id.
        id: u64,
        /// Sample time.
        time: f64,
        /// Sample value.
        value: f64,
    },
    /// Anything else; skipped without a diagnostic.
    Other,
}

/// Why a recognized line was dropped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiagnosticReason {
    /// A recognized keyword with too few tokens after it.
    #[error("`{keyword}` line has too few tokens")]
    TooFewTokens {
        /// The line's leading keyword.
        keyword: &'static str,
    },
    /// A field that must be numeric failed to parse.
    #[error("field `{field}` is not a valid number")]
    InvalidNumber {
        /// Which field failed.
        field: &'static str,
    },
    /// `attr repetition` carried a non-integer value.
    #[error("repetition attribute is not a non-negative integer")]
    InvalidRepetition,
}

/// A dropped-line diagnostic, keyed by file and line number.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    /// Source file (or synthetic source name).
    pub file: String,
    /// 1-based line number.
    pub line: usize,
    /// Why the line was dropped.
    pub reason: DiagnosticReason,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}: {}", self.file, self.line, self.reason)
    }
}

/// Stateless line classifier with a pre-compiled entity-path pattern.
pub(crate) struct LineClassifier {
    entity_re: Regex,
}

impl LineClassifier {
    pub(crate) fn new() -> Self {
        // Final path segment, optional bracketed index.
        let entity_re = Regex::new(r"^(?:.*\.)?([A-Za-z_][A-Za-z0-9_-]*)(?:\[(\d+)\])?$")
            .expect("entity path pattern is valid");
        Self { entity_re }
    }

    /// Classify one line. `Err` means the line started like a recognized
    /// record but was malformed and must be dropped with a diagnostic.
    pub(crate) fn classify(&self, line: &str) -> Result<LineToken, DiagnosticReason> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(LineToken::Other);
        }
        let mut tokens = line.split_whitespace();
        let first = tokens.next().unwrap_or_default();
        let rest: Vec<&str> = tokens.collect();

        match first {
            "itervar" => match rest.as_slice() {
                [factor, value, ..] => Ok(LineToken::Itervar {
                    factor: factor.to_string(),
                    value: value.to_string(),
                }),
                _ => Err(DiagnosticReason::TooFewTokens { keyword: "itervar" }),
            },
            "attr" => match rest.as_slice() {
                [key, value, ..] => Ok(LineToken::Attr {
                    key: key.to_string(),
                    // attr values may contain spaces; keep the tail intact
                    value: join_tail(value, &rest[2..]),
                }),
                _ => Err(DiagnosticReason::TooFewTokens { keyword: "attr" }),
            },
            "scalar" => match rest.as_slice() {
                [path, metric, value, ..] => {
                    let value: f64 = value
                        .parse()
                        .map_err(|_| DiagnosticReason::InvalidNumber { field: "value" })?;
                    Ok(LineToken::Scalar {
                        entity: self.entity_path(path),
                        metric: metric.to_string(),
                        value,
                    })
                }
                _ => Err(DiagnosticReason::TooFewTokens { keyword: "scalar" }),
            },
            "vector" => match rest.as_slice() {
                [id, path, metric, ..] => {
                    let id: u64 = id
                        .parse()
                        .map_err(|_| DiagnosticReason::InvalidNumber { field: "id" })?;
                    let metric = metric.strip_suffix(":vector").unwrap_or(metric);
                    Ok(LineToken::VectorDecl {
                        id,
                        entity: self.entity_path(path),
                        metric: metric.to_string(),
                    })
                }
                _ => Err(DiagnosticReason::TooFewTokens { keyword: "vector" }),
            },
            _ if first.bytes().all(|b| b.is_ascii_digit()) => {
                // `<id> <seq> <time> <value>` sample line
                match rest.as_slice() {
                    [seq, time, value, ..] => {
                        let id: u64 = first
                            .parse()
                            .map_err(|_| DiagnosticReason::InvalidNumber { field: "id" })?;
                        let _: u64 = seq
                            .parse()
                            .map_err(|_| DiagnosticReason::InvalidNumber { field: "seq" })?;
                        let time: f64 = time
                            .parse()
                            .map_err(|_| DiagnosticReason::InvalidNumber { field: "time" })?;
                        let value: f64 = value
                            .parse()
                            .map_err(|_| DiagnosticReason::InvalidNumber { field: "value" })?;
                        Ok(LineToken::VectorData { id, time, value })
                    }
                    _ => Err(DiagnosticReason::TooFewTokens { keyword: "sample" }),
                }
            }
            _ => Ok(LineToken::Other),
        }
    }

    fn entity_path(&self, token: &str) -> EntityPath {
        match self.entity_re.captures(token) {
            Some(caps) => {
                let class = caps.get(1).map(|m| m.as_str()).unwrap_or(token).to_string();
                let index = caps
                    .get(2)
                    .and_then(|m| m.as_str().parse().ok())
                    .unwrap_or(0);
                EntityPath { class, index }
            }
            None => EntityPath {
                class: token.to_string(),
                index: 0,
            },
        }
    }
}

fn join_tail(head: &str, tail: &[&str]) -> String {
    if tail.is_empty() {
        head.to_string()
    } else {
        let mut out = head.to_string();
        for part in tail {
            out.push(' ');
            out.push_str(part);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(line: &str) -> Result<LineToken, DiagnosticReason> {
        LineClassifier::new().classify(line)
    }

    #[test]
    fn test_itervar_line() {
        assert_eq!(
            classify("itervar N 100").unwrap(),
            LineToken::Itervar {
                factor: "N".to_string(),
                value: "100".to_string()
            }
        );
    }

    #[test]
    fn test_scalar_line_with_indexed_path() {
        let token = classify("scalar DatabaseNetwork.table[3] table.utilization 0.243").unwrap();
        assert_eq!(
            token,
            LineToken::Scalar {
                entity: EntityPath {
                    class: "table".to_string(),
                    index: 3
                },
                metric: "table.utilization".to_string(),
                value: 0.243,
            }
        );
    }

    #[test]
    fn test_scalar_path_without_bracket() {
        let token = classify("scalar Network.server totalJobs 42").unwrap();
        match token {
            LineToken::Scalar { entity, .. } => {
                assert_eq!(entity.class, "server");
                assert_eq!(entity.index, 0);
            }
            other => panic!("unexpected token {other:?}"),
        }
    }

    #[test]
    fn test_scalar_bad_value_is_diagnostic_not_zero() {
        assert_eq!(
            classify("scalar Net.table[0] throughput twelve").unwrap_err(),
            DiagnosticReason::InvalidNumber { field: "value" }
        );
    }

    #[test]
    fn test_vector_decl_strips_suffix() {
        let token = classify("vector 7 Net.table[2] waitTime:vector ETV").unwrap();
        assert_eq!(
            token,
            LineToken::VectorDecl {
                id: 7,
                entity: EntityPath {
                    class: "table".to_string(),
                    index: 2
                },
                metric: "waitTime".to_string(),
            }
        );
    }

    #[test]
    fn test_vector_data_tab_and_space_separated() {
        let expected = LineToken::VectorData {
            id: 7,
            time: 12.5,
            value: 0.004,
        };
        assert_eq!(classify("7\t113\t12.5\t0.004").unwrap(), expected);
        assert_eq!(classify("7 113 12.5 0.004").unwrap(), expected);
    }

    #[test]
    fn test_short_recognized_lines_are_malformed() {
        assert!(classify("scalar Net.table[0] throughput").is_err());
        assert!(classify("itervar N").is_err());
        assert!(classify("7\t113\t12.5").is_err());
    }

    #[test]
    fn test_unrecognized_lines_are_skipped() {
        assert_eq!(classify("version 2").unwrap(), LineToken::Other);
        assert_eq!(classify("run General-0-2026").unwrap(), LineToken::Other);
        assert_eq!(classify("").unwrap(), LineToken::Other);
        assert_eq!(
            classify("par DatabaseNetwork.user[0] lambda 0.25").unwrap(),
            LineToken::Other
        );
    }
}
