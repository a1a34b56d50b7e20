//! Gradient-boosted tree nodes and proportional missing-value handling.

use crate::fields::{CastInput, Fields, OpType};
use crate::predicate::Predicate;

use super::MissingStrategy;

/// A node in a gradient-boosted tree.
///
/// Unlike plain tree nodes, each boosted node is guarded by a single
/// predicate and carries gradient/hessian partial sums instead of a class
/// distribution.
#[derive(Debug, Clone, PartialEq)]
pub struct BoostedTreeNode {
    pub predicate: Predicate,
    pub output: f64,
    pub g_sum: f64,
    pub h_sum: f64,
    pub count: f64,
    pub children: Vec<BoostedTreeNode>,
}

/// Gradient statistics merged over the branches a record reaches.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PartialSums {
    pub g: f64,
    pub h: f64,
    pub count: f64,
}

impl BoostedTreeNode {
    pub fn leaf(output: f64, g_sum: f64, h_sum: f64, count: f64) -> Self {
        Self {
            predicate: Predicate::Always,
            output,
            g_sum,
            h_sum,
            count,
            children: Vec::new(),
        }
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// The single field the children split on, if any.
    fn split_field(&self) -> Option<&str> {
        self.children.iter().find_map(|c| c.predicate.field())
    }

    /// Last-prediction walk: descend the first child whose predicate holds,
    /// stop at the current node when none does.
    fn last_prediction(&self, input: &CastInput, fields: &Fields) -> f64 {
        let mut node = self;
        'walk: loop {
            for child in &node.children {
                if child.predicate.evaluate(input, fields) {
                    node = child;
                    continue 'walk;
                }
            }
            break;
        }
        node.output
    }

    /// Proportional traversal: merge gradient statistics over every branch
    /// the record could take.
    ///
    /// When the splitting field is present in the input — or the split
    /// cannot be ambiguous because a child tests for missingness outright or
    /// the field is a text/items field — this is an ordinary single-branch
    /// descent. The rule string of the taken branch is appended to `path`
    /// at most once, and never after the first ambiguous split has been
    /// seen. When the splitting field is genuinely absent, `missing_found`
    /// is set and ALL children are descended, summing their returned
    /// statistics: the record is treated as a probabilistic mixture over the
    /// unresolved split.
    pub fn predict_proportional(
        &self,
        input: &CastInput,
        fields: &Fields,
        path: &mut Vec<String>,
        missing_found: &mut bool,
    ) -> PartialSums {
        if self.is_leaf() {
            return PartialSums {
                g: self.g_sum,
                h: self.h_sum,
                count: self.count,
            };
        }

        if self.is_single_branch(input, fields) {
            for child in &self.children {
                if child.predicate.evaluate(input, fields) {
                    if !*missing_found {
                        let rule = child.predicate.to_rule();
                        if !path.contains(&rule) {
                            path.push(rule);
                        }
                    }
                    return child.predict_proportional(input, fields, path, missing_found);
                }
            }
            // No child matched: the walk ends here with this node's sums.
            PartialSums {
                g: self.g_sum,
                h: self.h_sum,
                count: self.count,
            }
        } else {
            *missing_found = true;
            let mut total = PartialSums::default();
            for child in &self.children {
                let part = child.predict_proportional(input, fields, path, missing_found);
                total.g += part.g;
                total.h += part.h;
                total.count += part.count;
            }
            total
        }
    }

    /// Whether the split below this node resolves to a single branch.
    ///
    /// Missing-value predicates cover the null-valued comparisons of the
    /// source description: those normalize to [`Predicate::Missing`] at
    /// build time.
    fn is_single_branch(&self, input: &CastInput, fields: &Fields) -> bool {
        let Some(field) = self.split_field() else {
            return true;
        };
        if input.contains(field) {
            return true;
        }
        if self
            .children
            .iter()
            .any(|c| matches!(c.predicate, Predicate::Missing { .. }))
        {
            return true;
        }
        matches!(
            fields.get(field).map(|spec| spec.optype),
            Some(OpType::Text | OpType::Items)
        )
    }
}

/// A boosted tree plus its per-tree boosting metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct BoostedTree {
    pub root: BoostedTreeNode,
    /// Shrinkage weight applied to this tree's vote.
    pub weight: f64,
    /// Class this tree votes for; `None` for boosted regression.
    pub objective_class: Option<String>,
    /// Ensemble regularization constant used to turn gradient sums into a
    /// prediction under the proportional strategy.
    pub lambda: f64,
}

impl BoostedTree {
    /// Per-tree prediction for one input record.
    pub fn predict(&self, input: &CastInput, fields: &Fields, strategy: MissingStrategy) -> f64 {
        match strategy {
            MissingStrategy::LastPrediction => self.root.last_prediction(input, fields),
            MissingStrategy::Proportional => {
                let mut path = Vec::new();
                let mut missing_found = false;
                let sums = self
                    .root
                    .predict_proportional(input, fields, &mut path, &mut missing_found);
                -sums.g / (sums.h + self.lambda)
            }
        }
    }
}
