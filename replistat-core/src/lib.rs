#![warn(missing_docs)]
//! Replistat Core - Result Record Model
//!
//! This crate provides the normalized in-memory representation of simulation
//! runs:
//! - `Run`: one execution of the simulated system (factor levels, replication
//!   index, scalar results, time-series results)
//! - `Configuration`: a run's factor-level mapping with the replication index
//!   removed; runs sharing a configuration are its replications
//! - `RunSet`: an append-only run collection that rejects duplicate
//!   (configuration, replication) identities instead of silently merging them
//!
//! No computation lives here; the analysis crates consume these records.

mod run;
mod set;

pub use run::{Configuration, FactorValue, Run, RunIdentity, ScalarKey, TimeSeries};
pub use set::{RunSet, RunSetError};
