//! Run-block assembly.
//!
//! A file normally holds one coherent `itervar`/`attr` metadata block and
//! therefore one run. Re-assigning an already-set metadata key (or
//! re-declaring an existing vector id) closes the current block and opens a
//! new one, which keeps parsing associative over file concatenation.
//!
//! Vector declarations and their data may arrive in any order within a
//! block: data lines are buffered and attached when the block closes, so
//! "undeclared id" means "never declared in this block".

use crate::line::{Diagnostic, DiagnosticReason, EntityPath, LineClassifier, LineToken};
use fxhash::FxHashMap;
use replistat_core::{FactorValue, Run, ScalarKey, TimeSeries};
use tracing::debug;

/// Everything parsed out of one file: zero or more runs plus the dropped-line
/// diagnostics. Partial success is the default mode.
#[derive(Debug, Default)]
pub struct FileParse {
    /// Runs in file order.
    pub runs: Vec<Run>,
    /// Dropped-line diagnostics, keyed by file + line number.
    pub diagnostics: Vec<Diagnostic>,
}

/// Parse the text of one result file.
///
/// `source` is the file-provided identity used to key runs that carry no
/// metadata; additional run blocks in the same file get an `#<ordinal>`
/// suffix so their identities stay distinct.
pub fn parse_str(text: &str, source: &str) -> FileParse {
    let classifier = LineClassifier::new();
    let mut assembler = RunAssembler::new(source);
    for (index, raw) in text.lines().enumerate() {
        match classifier.classify(raw) {
            Ok(token) => assembler.feed(index + 1, token),
            Err(reason) => assembler.diagnose(index + 1, reason),
        }
    }
    assembler.finish()
}

/// Accumulates classified lines into run blocks.
struct RunAssembler {
    source: String,
    block: Block,
    finished: Vec<Run>,
    diagnostics: Vec<Diagnostic>,
    skipped_samples: usize,
}

#[derive(Default)]
struct Block {
    run: Run,
    declarations: FxHashMap<u64, ScalarKey>,
    samples: Vec<(u64, f64, f64)>,
}

impl Block {
    fn is_empty(&self) -> bool {
        self.run.factors.is_empty()
            && self.run.repetition.is_none()
            && self.run.attrs.is_empty()
            && self.run.scalars.is_empty()
            && self.declarations.is_empty()
            && self.samples.is_empty()
    }
}

impl RunAssembler {
    fn new(source: &str) -> Self {
        Self {
            source: source.to_string(),
            block: Block::default(),
            finished: Vec::new(),
            diagnostics: Vec::new(),
            skipped_samples: 0,
        }
    }

    fn feed(&mut self, line: usize, token: LineToken) {
        match token {
            LineToken::Itervar { factor, value } => {
                if self.block.run.factors.contains(&factor) {
                    self.close_block();
                }
                self.block.run.factors.set(factor, FactorValue::parse(&value));
            }
            LineToken::Attr { key, value } => self.feed_attr(line, key, value),
            LineToken::Scalar {
                entity,
                metric,
                value,
            } => {
                let key = scalar_key(&entity, &metric);
                self.block.run.scalars.insert(key, value);
            }
            LineToken::VectorDecl { id, entity, metric } => {
                if self.block.declarations.contains_key(&id) {
                    self.close_block();
                }
                self.block
                    .declarations
                    .insert(id, scalar_key(&entity, &metric));
            }
            LineToken::VectorData { id, time, value } => {
                self.block.samples.push((id, time, value));
            }
            LineToken::Other => {}
        }
    }

    fn feed_attr(&mut self, line: usize, key: String, value: String) {
        let is_repetition = matches!(key.to_ascii_lowercase().as_str(), "repetition" | "replication");
        if is_repetition {
            if self.block.run.repetition.is_some() {
                self.close_block();
            }
            match value.parse::<u32>() {
                Ok(rep) => {
                    self.block.run.repetition = Some(rep);
                    return;
                }
                Err(_) => {
                    // fall through: keep the raw attr, record the problem
                    self.diagnose(line, DiagnosticReason::InvalidRepetition);
                }
            }
        }
        if self.block.run.attrs.contains_key(&key) {
            self.close_block();
        }
        self.block.run.attrs.insert(key, value);
    }

    fn diagnose(&mut self, line: usize, reason: DiagnosticReason) {
        self.diagnostics.push(Diagnostic {
            file: self.source.clone(),
            line,
            reason,
        });
    }

    fn close_block(&mut self) {
        let block = std::mem::take(&mut self.block);
        if block.is_empty() {
            return;
        }
        let ordinal = self.finished.len();
        let mut run = block.run;
        run.source = if ordinal == 0 {
            self.source.clone()
        } else {
            format!("{}#{ordinal}", self.source)
        };
        for (id, time, value) in block.samples {
            match block.declarations.get(&id) {
                Some(key) => run
                    .vectors
                    .entry(key.clone())
                    .or_insert_with(TimeSeries::new)
                    .push(time, value),
                None => self.skipped_samples += 1,
            }
        }
        for series in run.vectors.values_mut() {
            series.finalize();
        }
        self.finished.push(run);
    }

    fn finish(mut self) -> FileParse {
        self.close_block();
        if self.skipped_samples > 0 {
            debug!(
                source = %self.source,
                skipped = self.skipped_samples,
                "skipped samples referencing undeclared vector ids"
            );
        }
        FileParse {
            runs: self.finished,
            diagnostics: self.diagnostics,
        }
    }
}

fn scalar_key(entity: &EntityPath, metric: &str) -> ScalarKey {
    ScalarKey::new(&entity.class, entity.index, metric)
}
