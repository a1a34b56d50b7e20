//! Decision tree structures and traversal.
//!
//! Two node shapes share this module: [`TreeNode`] for plain decision-tree
//! ensembles and [`BoostedTreeNode`] for gradient-boosted ensembles, which
//! carries gradient partial sums instead of a class distribution. Both are
//! built once at load time and traversed read-only, so concurrent
//! predictions over the same tree are safe.

mod boosted;
mod standard;

pub use boosted::{BoostedTree, BoostedTreeNode, PartialSums};
pub use standard::{Traversal, TreeNode};

// =============================================================================
// Shared types
// =============================================================================

/// Policy for handling an input record missing a field required by a split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissingStrategy {
    /// Stop at the current node and return its own output.
    #[default]
    LastPrediction,
    /// Split the record fractionally across the unresolved branches
    /// (boosted trees only; see [`BoostedTreeNode::predict_proportional`]).
    Proportional,
}

impl MissingStrategy {
    /// Parse the integer code used by the model description.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::LastPrediction),
            1 => Some(Self::Proportional),
            _ => None,
        }
    }
}

/// The value a tree predicts at a node.
#[derive(Debug, Clone, PartialEq)]
pub enum LeafOutput {
    Numeric(f64),
    Category(String),
}

impl LeafOutput {
    #[inline]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Numeric(f) => Some(*f),
            Self::Category(_) => None,
        }
    }

    #[inline]
    pub fn as_category(&self) -> Option<&str> {
        match self {
            Self::Category(s) => Some(s),
            Self::Numeric(_) => None,
        }
    }
}

impl std::fmt::Display for LeafOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Numeric(v) => write!(f, "{}", v),
            Self::Category(s) => write!(f, "{}", s),
        }
    }
}
