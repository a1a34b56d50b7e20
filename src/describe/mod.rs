//! Model-description loading.
//!
//! The remote platform describes a downloaded ensemble as JSON. This module
//! deserializes that schema losslessly ([`json`]) and converts it into the
//! native engine types ([`convert`]), validating the description up front:
//! configuration errors (unknown optypes or operators, predicates that
//! reference fields missing from the field map) are fatal at load time and
//! never surface per record.
//!
//! Construction is two-phase: parse a [`ModelDescription`] with serde, then
//! call [`ModelDescription::build`] to obtain an [`crate::ensemble::Ensemble`].
//! The engine itself assumes fully loaded inputs and never blocks.

mod convert;
mod json;

pub use convert::ConversionError;
pub use json::{
    BoostingDescriptor, FieldDescriptor, ModelDescription, NodeDescriptor, PredicateDescriptor,
    TreeDescriptor,
};
