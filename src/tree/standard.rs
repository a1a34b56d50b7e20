//! Plain decision-tree nodes and last-prediction traversal.

use crate::fields::{CastInput, Fields};
use crate::predicate::PredicateSet;

use super::{LeafOutput, MissingStrategy};

/// A node in a plain decision tree.
///
/// Each node carries the predicate set guarding entry into it, its own
/// output (used when traversal stops here), and its children in the order
/// the model declares them. A leaf has no children. Sibling predicate sets
/// are mutually exclusive by construction on the platform side; if they are
/// not (corrupt data), the first match in child order wins.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeNode {
    pub predicates: PredicateSet,
    pub output: LeafOutput,
    pub confidence: Option<f64>,
    /// Category label to training-instance count pairs observed here.
    pub distribution: Vec<(String, f64)>,
    pub count: f64,
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    /// Create a leaf node with no distribution.
    pub fn leaf(output: LeafOutput, confidence: Option<f64>, count: f64) -> Self {
        Self {
            predicates: PredicateSet::always(),
            output,
            confidence,
            distribution: Vec::new(),
            count,
            children: Vec::new(),
        }
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Traverse from this node with the last-prediction strategy.
    ///
    /// At each node the children's guards are evaluated in order and the
    /// first true child is descended into, appending its rule string to the
    /// path. When no child guard holds (including because required fields
    /// are missing) the walk stops and the current node's own output is
    /// returned. The proportional strategy has no distinct meaning for
    /// plain trees, so both strategies take this path.
    pub fn predict(
        &self,
        input: &CastInput,
        fields: &Fields,
        _strategy: MissingStrategy,
    ) -> Traversal {
        let mut node = self;
        let mut path = Vec::new();
        let mut depth = 1;

        'walk: loop {
            for child in &node.children {
                if child.predicates.evaluate(input, fields) {
                    path.push(child.predicates.to_rule());
                    node = child;
                    depth += 1;
                    continue 'walk;
                }
            }
            break;
        }

        Traversal {
            output: node.output.clone(),
            confidence: node.confidence,
            distribution: node.distribution.clone(),
            count: node.count,
            path,
            depth,
        }
    }
}

/// Result of one tree traversal.
#[derive(Debug, Clone, PartialEq)]
pub struct Traversal {
    pub output: LeafOutput,
    pub confidence: Option<f64>,
    pub distribution: Vec<(String, f64)>,
    pub count: f64,
    /// One rule string per descended edge; `path.len() == depth - 1`.
    pub path: Vec<String>,
    /// Number of nodes visited, counting the root as 1.
    pub depth: usize,
}
