//! ensembler: offline prediction for decision-tree ensembles.
//!
//! This crate reproduces, entirely in-process, the predictions a remote ML
//! platform computes for its decision-tree and gradient-boosted ensembles,
//! working from a downloaded JSON model description. Tree traversal and
//! vote combination are pure functions over immutable, already-loaded
//! structures: no I/O, no blocking, safe for concurrent callers.
//!
//! ```ignore
//! use ensembler::describe::ModelDescription;
//! use ensembler::tree::MissingStrategy;
//!
//! let description: ModelDescription = serde_json::from_str(&downloaded)?;
//! let ensemble = description.build()?;
//! let result = ensemble.predict(&input, None, MissingStrategy::LastPrediction)?;
//! ```

pub mod describe;
pub mod ensemble;
pub mod fields;
pub mod multivote;
pub mod predicate;
pub mod tree;
