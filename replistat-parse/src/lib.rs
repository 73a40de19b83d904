#![warn(missing_docs)]
//! Replistat Parse - Result File Parser
//!
//! Converts the textual output of simulation runs into normalized `Run`
//! records. Two line-oriented formats are supported:
//! - **Scalar format**: `scalar <entity-path> <metric> <value>` result lines
//!   plus `itervar <factor> <value>` / `attr <key> <value>` run metadata
//! - **Vector format**: `vector <id> <entity-path> <metric>:vector <type>`
//!   channel declarations plus `<id> <seq> <time> <value>` sample lines
//!
//! Parsing is tolerant: unrecognized line shapes are skipped, malformed
//! numeric fields drop the line with a recorded diagnostic (never coerced to
//! zero), and a file that fails to read fails alone. The one hard error is a
//! duplicate run identity, which would silently corrupt downstream
//! statistics if merged.

mod assemble;
mod line;
mod reader;

pub use assemble::{parse_str, FileParse};
pub use line::{Diagnostic, DiagnosticReason, EntityPath, LineToken};
pub use reader::{load_dir, load_files, parse_file, FailedFile, ParseError, ParseOutcome};
