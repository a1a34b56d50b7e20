//! Ensemble driver: evaluate every tree and combine the votes.
//!
//! One [`Ensemble`] owns its immutable trees and field map, so `predict` is
//! re-entrant and safe to call concurrently. Per-tree evaluation is
//! independent and runs as a parallel map; the vote `order` is assigned by
//! original tree index, not completion order, so tie-breaking stays
//! deterministic regardless of scheduling.

use std::collections::HashMap;

use rayon::prelude::*;

use crate::fields::{Fields, InputError};
use crate::multivote::{
    BoostingOffsets, BoostingParams, CombinationMethod, Combined, CombineError, MultiVote,
    Prediction,
};
use crate::tree::{BoostedTree, LeafOutput, MissingStrategy, TreeNode};

// =============================================================================
// Ensemble
// =============================================================================

/// Ensemble-level boosting metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct BoostingMeta {
    pub offsets: BoostingOffsets,
    /// Regularization constant for proportional gradient predictions.
    pub lambda: f64,
    /// Declared category order of the objective field.
    pub class_order: Vec<String>,
}

/// The trees of an ensemble, by kind.
#[derive(Debug, Clone)]
pub enum EnsembleKind {
    /// Plain decision-tree ensemble combined by voting.
    Standard { trees: Vec<TreeNode> },
    /// Gradient-boosted ensemble combined by weighted sums and softmax.
    Boosted {
        trees: Vec<BoostedTree>,
        boosting: BoostingMeta,
    },
}

/// A loaded, immutable ensemble ready for prediction.
#[derive(Debug, Clone)]
pub struct Ensemble {
    pub kind: EnsembleKind,
    pub fields: Fields,
    pub objective_field: String,
}

/// Error raised by [`Ensemble::predict`]. A prediction either fully
/// succeeds or fails atomically; there are no partial results.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PredictError {
    #[error(transparent)]
    Input(#[from] InputError),
    #[error(transparent)]
    Combine(#[from] CombineError),
}

impl Ensemble {
    /// Number of member trees.
    pub fn num_trees(&self) -> usize {
        match &self.kind {
            EnsembleKind::Standard { trees } => trees.len(),
            EnsembleKind::Boosted { trees, .. } => trees.len(),
        }
    }

    /// Whether this is a gradient-boosted ensemble.
    pub fn is_boosted(&self) -> bool {
        matches!(self.kind, EnsembleKind::Boosted { .. })
    }

    /// Predict for one input record.
    ///
    /// The input may be keyed by field id or field name. For boosted
    /// ensembles the requested `method` is ignored and the boosting
    /// combination applies; otherwise the caller's method (default
    /// plurality) is used. The result is the vote combiner's output,
    /// unmodified.
    pub fn predict(
        &self,
        input: &HashMap<String, serde_json::Value>,
        method: Option<CombinationMethod>,
        strategy: MissingStrategy,
    ) -> Result<Combined, PredictError> {
        let votes = self.collect_votes(input, strategy)?;
        let method = method.unwrap_or(CombinationMethod::Plurality);
        Ok(votes.combine(&method)?)
    }

    /// Evaluate every tree and return the uncombined vote list. Each vote
    /// carries the traversal path of the tree that produced it.
    pub fn collect_votes(
        &self,
        input: &HashMap<String, serde_json::Value>,
        strategy: MissingStrategy,
    ) -> Result<MultiVote, PredictError> {
        let cast = self.fields.cast_input(input)?;

        let votes = match &self.kind {
            EnsembleKind::Standard { trees } => {
                let votes: Vec<Prediction> = trees
                    .par_iter()
                    .enumerate()
                    .map(|(index, tree)| {
                        let traversal = tree.predict(&cast, &self.fields, strategy);
                        Prediction {
                            value: traversal.output,
                            confidence: traversal.confidence,
                            distribution: (!traversal.distribution.is_empty())
                                .then_some(traversal.distribution),
                            count: traversal.count,
                            path: traversal.path,
                            order: Some(index),
                            weight: None,
                            objective_class: None,
                        }
                    })
                    .collect();
                MultiVote::new(votes)
            }
            EnsembleKind::Boosted { trees, boosting } => {
                let votes: Vec<Prediction> = trees
                    .par_iter()
                    .enumerate()
                    .map(|(index, tree)| {
                        let value = tree.predict(&cast, &self.fields, strategy);
                        Prediction {
                            value: LeafOutput::Numeric(value),
                            confidence: None,
                            distribution: None,
                            count: 0.0,
                            path: Vec::new(),
                            order: Some(index),
                            weight: Some(tree.weight),
                            objective_class: tree.objective_class.clone(),
                        }
                    })
                    .collect();
                MultiVote::new(votes).with_boosting(BoostingParams {
                    offsets: boosting.offsets.clone(),
                    class_order: boosting.class_order.clone(),
                })
            }
        };

        Ok(votes)
    }
}
