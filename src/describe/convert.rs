//! Conversion from parsed description types to native engine types.

use std::collections::HashMap;

use serde_json::Value;

use crate::ensemble::{BoostingMeta, Ensemble, EnsembleKind};
use crate::fields::{FieldSpec, Fields, ItemAnalysis, OpType, TermAnalysis, TokenMode};
use crate::multivote::BoostingOffsets;
use crate::predicate::{Operator, Predicate, PredicateSet, PredicateValue};
use crate::tree::{BoostedTree, BoostedTreeNode, LeafOutput, TreeNode};

use super::json::{
    FieldDescriptor, ModelDescription, NodeDescriptor, PredicateDescriptor, TreeDescriptor,
};

/// Error type for model-description conversion. All variants are fatal
/// configuration errors raised at load time.
#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    #[error("model description contains no trees")]
    EmptyEnsemble,
    #[error("field {field} declares unknown optype '{optype}'")]
    UnknownOpType { field: String, optype: String },
    #[error("field {field} declares unknown token mode '{token_mode}'")]
    UnknownTokenMode { field: String, token_mode: String },
    #[error("unknown predicate operator '{0}'")]
    UnknownOperator(String),
    #[error("predicate references field {0} which is not in the field map")]
    UnknownField(String),
    #[error("objective field {0} is not in the field map")]
    UnknownObjective(String),
    #[error("predicate on field {field} has a value incompatible with its optype")]
    BadPredicateValue { field: String },
    #[error("the literal false is not a valid predicate")]
    FalsePredicate,
    #[error("node output {0} cannot be interpreted as a prediction value")]
    BadOutput(Value),
    #[error("boosted tree node may carry at most one non-sentinel predicate clause")]
    CompoundBoostedPredicate,
}

impl ModelDescription {
    /// Validate the description and build an inference-ready [`Ensemble`].
    pub fn build(&self) -> Result<Ensemble, ConversionError> {
        let fields = build_fields(&self.fields)?;
        if !fields.contains(&self.objective_field) {
            return Err(ConversionError::UnknownObjective(
                self.objective_field.clone(),
            ));
        }
        if self.models.is_empty() {
            return Err(ConversionError::EmptyEnsemble);
        }

        let kind = match &self.boosting {
            Some(boosting) => {
                let lambda = boosting.lambda.unwrap_or(0.0);
                let trees = self
                    .models
                    .iter()
                    .map(|model| convert_boosted_tree(model, &fields, lambda))
                    .collect::<Result<Vec<BoostedTree>, ConversionError>>()?;
                let offsets = match (&boosting.offsets, boosting.offset) {
                    (Some(per_class), _) => BoostingOffsets::PerClass(per_class.clone()),
                    (None, Some(scalar)) => BoostingOffsets::Scalar(scalar),
                    (None, None) => BoostingOffsets::Scalar(0.0),
                };
                EnsembleKind::Boosted {
                    trees,
                    boosting: BoostingMeta {
                        offsets,
                        lambda,
                        class_order: boosting.categories.clone(),
                    },
                }
            }
            None => {
                let trees = self
                    .models
                    .iter()
                    .map(|model| convert_node(&model.root, &fields))
                    .collect::<Result<Vec<TreeNode>, ConversionError>>()?;
                EnsembleKind::Standard { trees }
            }
        };

        Ok(Ensemble {
            kind,
            fields,
            objective_field: self.objective_field.clone(),
        })
    }
}

// =============================================================================
// Fields
// =============================================================================

fn build_fields(
    descriptors: &HashMap<String, FieldDescriptor>,
) -> Result<Fields, ConversionError> {
    let mut specs = HashMap::with_capacity(descriptors.len());
    for (id, descriptor) in descriptors {
        let optype = OpType::from_symbol(&descriptor.optype).ok_or_else(|| {
            ConversionError::UnknownOpType {
                field: id.clone(),
                optype: descriptor.optype.clone(),
            }
        })?;
        let term_analysis = descriptor
            .term_analysis
            .as_ref()
            .map(|analysis| {
                let token_mode = match &analysis.token_mode {
                    Some(symbol) => TokenMode::from_symbol(symbol).ok_or_else(|| {
                        ConversionError::UnknownTokenMode {
                            field: id.clone(),
                            token_mode: symbol.clone(),
                        }
                    })?,
                    None => TokenMode::default(),
                };
                Ok(TermAnalysis {
                    case_sensitive: analysis.case_sensitive,
                    token_mode,
                })
            })
            .transpose()?;
        let item_analysis = descriptor.item_analysis.as_ref().map(|analysis| {
            analysis
                .separator
                .as_ref()
                .map(|separator| ItemAnalysis {
                    separator: separator.clone(),
                })
                .unwrap_or_default()
        });

        specs.insert(
            id.clone(),
            FieldSpec {
                name: descriptor.name.clone(),
                optype,
                term_analysis,
                item_analysis,
            },
        );
    }
    Ok(Fields::new(specs))
}

// =============================================================================
// Predicates
// =============================================================================

fn convert_predicate(
    descriptor: &PredicateDescriptor,
    fields: &Fields,
) -> Result<Predicate, ConversionError> {
    match descriptor {
        PredicateDescriptor::Sentinel(true) => Ok(Predicate::Always),
        PredicateDescriptor::Sentinel(false) => Err(ConversionError::FalsePredicate),
        PredicateDescriptor::Clause {
            operator,
            field,
            value,
            term,
        } => {
            let op = Operator::from_symbol(operator)
                .ok_or_else(|| ConversionError::UnknownOperator(operator.clone()))?;
            let spec = fields
                .get(field)
                .ok_or_else(|| ConversionError::UnknownField(field.clone()))?;

            // A null value means "is the field missing": `=` matches absent
            // fields, `!=` matches present ones.
            if value.is_null() {
                return Ok(Predicate::Missing {
                    field: field.clone(),
                    negated: op == Operator::NotEq,
                });
            }

            if let Some(term) = term {
                let threshold =
                    value
                        .as_f64()
                        .ok_or_else(|| ConversionError::BadPredicateValue {
                            field: field.clone(),
                        })?;
                return Ok(Predicate::Term {
                    op,
                    field: field.clone(),
                    term: term.clone(),
                    value: threshold,
                });
            }

            // An array value is the membership list of an `in` predicate.
            let value = match value {
                Value::Array(items) => items
                    .iter()
                    .map(|item| convert_scalar_value(item, spec.optype))
                    .collect::<Option<Vec<PredicateValue>>>()
                    .map(PredicateValue::List),
                other => convert_scalar_value(other, spec.optype),
            }
            .ok_or_else(|| ConversionError::BadPredicateValue {
                field: field.clone(),
            })?;

            Ok(Predicate::Compare {
                op,
                field: field.clone(),
                value,
            })
        }
    }
}

fn convert_scalar_value(value: &Value, optype: OpType) -> Option<PredicateValue> {
    match optype {
        OpType::Numeric => match value {
            Value::Number(n) => n.as_f64().map(PredicateValue::Number),
            Value::String(s) => s.trim().parse::<f64>().ok().map(PredicateValue::Number),
            _ => None,
        },
        _ => match value {
            Value::String(s) => Some(PredicateValue::Text(s.clone())),
            Value::Number(n) => Some(PredicateValue::Text(n.to_string())),
            Value::Bool(b) => Some(PredicateValue::Text(b.to_string())),
            _ => None,
        },
    }
}

fn convert_predicate_set(
    node: &NodeDescriptor,
    fields: &Fields,
) -> Result<PredicateSet, ConversionError> {
    let predicates = node
        .predicate
        .clauses()
        .into_iter()
        .map(|clause| convert_predicate(clause, fields))
        .collect::<Result<Vec<Predicate>, ConversionError>>()?;
    Ok(PredicateSet::new(predicates))
}

// =============================================================================
// Trees
// =============================================================================

fn convert_output(output: &Value) -> Result<LeafOutput, ConversionError> {
    match output {
        Value::Number(n) => n
            .as_f64()
            .map(LeafOutput::Numeric)
            .ok_or_else(|| ConversionError::BadOutput(output.clone())),
        Value::String(s) => Ok(LeafOutput::Category(s.clone())),
        Value::Bool(b) => Ok(LeafOutput::Category(b.to_string())),
        _ => Err(ConversionError::BadOutput(output.clone())),
    }
}

fn category_label(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn convert_node(node: &NodeDescriptor, fields: &Fields) -> Result<TreeNode, ConversionError> {
    let predicates = convert_predicate_set(node, fields)?;
    let output = convert_output(&node.output)?;
    let distribution: Vec<(String, f64)> = node
        .distribution
        .iter()
        .flatten()
        .map(|(category, count)| (category_label(category), *count))
        .collect();
    // The description may omit count on internal nodes; the distribution
    // total is the same figure.
    let count = node
        .count
        .unwrap_or_else(|| distribution.iter().map(|(_, c)| c).sum());
    let children = node
        .children
        .iter()
        .map(|child| convert_node(child, fields))
        .collect::<Result<Vec<TreeNode>, ConversionError>>()?;

    Ok(TreeNode {
        predicates,
        output,
        confidence: node.confidence,
        distribution,
        count,
        children,
    })
}

fn convert_boosted_node(
    node: &NodeDescriptor,
    fields: &Fields,
) -> Result<BoostedTreeNode, ConversionError> {
    let clauses = node.predicate.clauses();
    let mut predicates = clauses
        .into_iter()
        .map(|clause| convert_predicate(clause, fields))
        .filter(|predicate| !matches!(predicate, Ok(Predicate::Always)))
        .collect::<Result<Vec<Predicate>, ConversionError>>()?;
    if predicates.len() > 1 {
        return Err(ConversionError::CompoundBoostedPredicate);
    }
    let predicate = predicates.pop().unwrap_or(Predicate::Always);

    let output = match &node.output {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        other => return Err(ConversionError::BadOutput(other.clone())),
    };
    let children = node
        .children
        .iter()
        .map(|child| convert_boosted_node(child, fields))
        .collect::<Result<Vec<BoostedTreeNode>, ConversionError>>()?;

    Ok(BoostedTreeNode {
        predicate,
        output,
        g_sum: node.g_sum.unwrap_or(0.0),
        h_sum: node.h_sum.unwrap_or(0.0),
        count: node.count.unwrap_or(0.0),
        children,
    })
}

fn convert_boosted_tree(
    model: &TreeDescriptor,
    fields: &Fields,
    lambda: f64,
) -> Result<BoostedTree, ConversionError> {
    Ok(BoostedTree {
        root: convert_boosted_node(&model.root, fields)?,
        weight: model.weight.unwrap_or(1.0),
        objective_class: model.objective_class.clone(),
        lambda,
    })
}
