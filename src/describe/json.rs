//! Parsed JSON model-description types.
//!
//! These structs mirror the platform's schema as shipped, including its
//! loose spots: a predicate may be the literal `true`, a single clause
//! object, or a list of clauses; predicate values may be numbers, strings,
//! booleans, or null; distribution categories may be strings or numbers.
//! Normalization happens in [`super::convert`], not here.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;

/// A full downloaded model description for a tree ensemble.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelDescription {
    pub objective_field: String,
    pub fields: HashMap<String, FieldDescriptor>,
    #[serde(default)]
    pub boosting: Option<BoostingDescriptor>,
    pub models: Vec<TreeDescriptor>,
}

/// One field entry of the description's field map.
#[derive(Debug, Clone, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    pub optype: String,
    #[serde(default)]
    pub term_analysis: Option<TermAnalysisDescriptor>,
    #[serde(default)]
    pub item_analysis: Option<ItemAnalysisDescriptor>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TermAnalysisDescriptor {
    #[serde(default)]
    pub case_sensitive: bool,
    #[serde(default)]
    pub token_mode: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ItemAnalysisDescriptor {
    #[serde(default)]
    pub separator: Option<String>,
}

/// Ensemble-level boosting block. Present iff the ensemble is boosted.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BoostingDescriptor {
    #[serde(default)]
    pub lambda: Option<f64>,
    /// Scalar offset (boosted regression).
    #[serde(default)]
    pub offset: Option<f64>,
    /// Per-class offsets (boosted classification).
    #[serde(default)]
    pub offsets: Option<HashMap<String, f64>>,
    /// Declared category order of the objective field.
    #[serde(default)]
    pub categories: Vec<String>,
}

/// One member tree.
#[derive(Debug, Clone, Deserialize)]
pub struct TreeDescriptor {
    pub root: NodeDescriptor,
    /// Boosting shrinkage weight.
    #[serde(default)]
    pub weight: Option<f64>,
    /// Class this boosted tree votes for.
    #[serde(default)]
    pub objective_class: Option<String>,
}

/// One tree node as described by the platform.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeDescriptor {
    #[serde(default)]
    pub predicate: PredicateSetDescriptor,
    pub output: Value,
    #[serde(default)]
    pub confidence: Option<f64>,
    /// `[["category", count], ...]`; categories may also be numbers.
    #[serde(default)]
    pub distribution: Option<Vec<(Value, f64)>>,
    #[serde(default)]
    pub count: Option<f64>,
    #[serde(default)]
    pub g_sum: Option<f64>,
    #[serde(default)]
    pub h_sum: Option<f64>,
    #[serde(default)]
    pub children: Vec<NodeDescriptor>,
}

/// A node guard: one clause or an ordered conjunction of clauses.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PredicateSetDescriptor {
    One(PredicateDescriptor),
    Many(Vec<PredicateDescriptor>),
}

impl Default for PredicateSetDescriptor {
    fn default() -> Self {
        Self::One(PredicateDescriptor::default())
    }
}

impl PredicateSetDescriptor {
    /// Flatten to a clause slice regardless of shape.
    pub fn clauses(&self) -> Vec<&PredicateDescriptor> {
        match self {
            Self::One(clause) => vec![clause],
            Self::Many(clauses) => clauses.iter().collect(),
        }
    }
}

/// A single predicate clause: the literal `true` sentinel or an operator
/// applied to a field and a value (with an optional term for text/items
/// fields).
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PredicateDescriptor {
    Sentinel(bool),
    Clause {
        operator: String,
        field: String,
        value: Value,
        #[serde(default)]
        term: Option<String>,
    },
}

impl Default for PredicateDescriptor {
    fn default() -> Self {
        Self::Sentinel(true)
    }
}
