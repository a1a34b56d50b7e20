//! Node predicates: per-field conditions guarding tree branches.
//!
//! Every branch of a decision tree is guarded by a predicate (or a
//! conjunction of them, see [`PredicateSet`]). Besides evaluation against an
//! input row, predicates render themselves as the LISP-like filter clauses
//! the upstream platform uses for dataset filters, e.g.
//! `(= (f "000004") 183)` or `(missing? "00001e")`. The textual form is an
//! external contract and is reproduced verbatim.

use crate::fields::{CastInput, FieldValue, Fields, ItemAnalysis, OpType, TermAnalysis, TokenMode};

// =============================================================================
// Operators
// =============================================================================

/// Comparison operator of a predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    In,
}

impl Operator {
    /// Parse the operator symbol used by the model description.
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "=" | "==" => Some(Self::Eq),
            "!=" | "/=" => Some(Self::NotEq),
            "<" => Some(Self::Lt),
            "<=" => Some(Self::LtEq),
            ">" => Some(Self::Gt),
            ">=" => Some(Self::GtEq),
            "in" => Some(Self::In),
            _ => None,
        }
    }

    /// The symbol used in rendered rules.
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::NotEq => "!=",
            Self::Lt => "<",
            Self::LtEq => "<=",
            Self::Gt => ">",
            Self::GtEq => ">=",
            Self::In => "in",
        }
    }

    /// Apply the operator to two numbers.
    #[inline]
    pub fn apply_numeric(&self, left: f64, right: f64) -> bool {
        match self {
            Self::Eq | Self::In => left == right,
            Self::NotEq => left != right,
            Self::Lt => left < right,
            Self::LtEq => left <= right,
            Self::Gt => left > right,
            Self::GtEq => left >= right,
        }
    }

    /// Apply the operator to two strings. Ordering operators are not defined
    /// for categorical values and evaluate false.
    #[inline]
    pub fn apply_text(&self, left: &str, right: &str) -> bool {
        match self {
            Self::Eq | Self::In => left == right,
            Self::NotEq => left != right,
            Self::Lt | Self::LtEq | Self::Gt | Self::GtEq => false,
        }
    }
}

// =============================================================================
// Predicates
// =============================================================================

/// The literal a predicate compares against.
#[derive(Debug, Clone, PartialEq)]
pub enum PredicateValue {
    Number(f64),
    Text(String),
    /// Membership list for the `in` operator.
    List(Vec<PredicateValue>),
}

impl PredicateValue {
    /// Render the value as it appears in a filter clause.
    fn to_literal(&self) -> String {
        match self {
            Self::Number(f) => format_number(*f),
            Self::Text(s) => format!("\"{}\"", s),
            Self::List(items) => {
                let rendered: Vec<String> = items.iter().map(Self::to_literal).collect();
                format!("({})", rendered.join(" "))
            }
        }
    }
}

/// A single field-level condition.
///
/// The root-node sentinel is the explicit [`Predicate::Always`] variant, and
/// "field is absent" checks are the explicit [`Predicate::Missing`] variant,
/// so there is no shared singleton object and no null-valued comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Always true. Guards root nodes.
    Always,
    /// True iff the field is absent from the input (present when `negated`).
    Missing { field: String, negated: bool },
    /// Bag-of-words condition: the number of occurrences of `term` in the
    /// field's tokenization, compared against `value`.
    Term {
        op: Operator,
        field: String,
        term: String,
        value: f64,
    },
    /// Plain comparison of the field's value against a literal.
    Compare {
        op: Operator,
        field: String,
        value: PredicateValue,
    },
}

impl Predicate {
    /// Field id this predicate tests, if any.
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::Always => None,
            Self::Missing { field, .. }
            | Self::Term { field, .. }
            | Self::Compare { field, .. } => Some(field),
        }
    }

    /// Evaluate against a cast input row.
    ///
    /// Missing-field semantics: `!=` is satisfied against any concrete
    /// value, `=` fails, and numeric comparisons fail; only a
    /// [`Predicate::Missing`] clause can match an absent field.
    pub fn evaluate(&self, input: &CastInput, fields: &Fields) -> bool {
        match self {
            Self::Always => true,
            Self::Missing { field, negated } => input.contains(field) == *negated,
            Self::Term {
                op,
                field,
                term,
                value,
            } => {
                let Some(field_value) = input.get(field) else {
                    return matches!(op, Operator::NotEq);
                };
                let text = match field_value {
                    FieldValue::Text(s) => s.as_str(),
                    // Casting guarantees text fields carry strings; anything
                    // else cannot match a term.
                    FieldValue::Number(_) => return matches!(op, Operator::NotEq),
                };
                let count = occurrence_count(text, term, field, fields);
                op.apply_numeric(count as f64, *value)
            }
            Self::Compare { op, field, value } => {
                let Some(field_value) = input.get(field) else {
                    return matches!(op, Operator::NotEq);
                };
                match (field_value, value) {
                    (FieldValue::Number(l), PredicateValue::Number(r)) => op.apply_numeric(*l, *r),
                    (FieldValue::Text(l), PredicateValue::Text(r)) => op.apply_text(l, r),
                    (input_value, PredicateValue::List(items)) => {
                        let member = items.iter().any(|item| match (input_value, item) {
                            (FieldValue::Number(l), PredicateValue::Number(r)) => l == r,
                            (FieldValue::Text(l), PredicateValue::Text(r)) => l == r,
                            _ => false,
                        });
                        match op {
                            Operator::In | Operator::Eq => member,
                            Operator::NotEq => !member,
                            _ => false,
                        }
                    }
                    // Type mismatch between input and model (corrupt data):
                    // only inequality can hold.
                    _ => matches!(op, Operator::NotEq),
                }
            }
        }
    }

    /// Render the filter clause for this predicate.
    pub fn to_rule(&self) -> String {
        match self {
            Self::Always => "true".to_string(),
            Self::Missing {
                field,
                negated: false,
            } => format!("(missing? \"{}\")", field),
            Self::Missing {
                field,
                negated: true,
            } => format!("(not (missing? \"{}\"))", field),
            Self::Term {
                op,
                field,
                term,
                value,
            } => format!(
                "({} (occurrences (f \"{}\") \"{}\") {})",
                op.symbol(),
                field,
                term,
                format_number(*value)
            ),
            Self::Compare { op, field, value } => {
                format!("({} (f \"{}\") {})", op.symbol(), field, value.to_literal())
            }
        }
    }
}

/// Count occurrences of `term` in `text` according to the field's term or
/// item analysis options.
fn occurrence_count(text: &str, term: &str, field: &str, fields: &Fields) -> usize {
    let spec = fields.get(field);
    match spec.map(|s| s.optype) {
        Some(OpType::Items) => {
            let default = ItemAnalysis::default();
            let analysis = spec
                .and_then(|s| s.item_analysis.as_ref())
                .unwrap_or(&default);
            count_items(text, term, analysis)
        }
        _ => {
            let default = TermAnalysis::default();
            let analysis = spec
                .and_then(|s| s.term_analysis.as_ref())
                .unwrap_or(&default);
            count_terms(text, term, analysis)
        }
    }
}

/// Count term occurrences in free text.
fn count_terms(text: &str, term: &str, analysis: &TermAnalysis) -> usize {
    let (text, term) = if analysis.case_sensitive {
        (text.to_string(), term.to_string())
    } else {
        (text.to_lowercase(), term.to_lowercase())
    };

    let token_count = || {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .filter(|t| *t == term)
            .count()
    };
    let full_term_count = || usize::from(text.trim() == term);

    match analysis.token_mode {
        TokenMode::Tokens => token_count(),
        TokenMode::FullTerms => full_term_count(),
        TokenMode::All => token_count().max(full_term_count()),
    }
}

/// Count item occurrences in a separated item list.
fn count_items(text: &str, item: &str, analysis: &ItemAnalysis) -> usize {
    text.split(analysis.separator.as_str())
        .map(str::trim)
        .filter(|t| *t == item)
        .count()
}

/// Integral values print without a trailing `.0` (`183`, not `183.0`).
fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

// =============================================================================
// Predicate sets
// =============================================================================

/// An AND-conjunction of predicates guarding entry into a tree node.
///
/// Evaluation short-circuits on the first false predicate. A set with zero
/// non-sentinel predicates always evaluates true.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PredicateSet {
    predicates: Vec<Predicate>,
}

impl PredicateSet {
    pub fn new(predicates: Vec<Predicate>) -> Self {
        Self { predicates }
    }

    /// The root-node sentinel set.
    pub fn always() -> Self {
        Self {
            predicates: vec![Predicate::Always],
        }
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    /// Whether the set contains no non-sentinel predicates.
    pub fn is_trivial(&self) -> bool {
        self.predicates.iter().all(|p| matches!(p, Predicate::Always))
    }

    /// True iff every contained predicate evaluates true.
    pub fn evaluate(&self, input: &CastInput, fields: &Fields) -> bool {
        self.predicates.iter().all(|p| p.evaluate(input, fields))
    }

    /// Render the conjunction, preserving the original predicate order.
    /// Single clauses render bare; multiple clauses join as
    /// `(and clause1 clause2 ...)`.
    pub fn to_rule(&self) -> String {
        let clauses: Vec<String> = self
            .predicates
            .iter()
            .filter(|p| !matches!(p, Predicate::Always))
            .map(Predicate::to_rule)
            .collect();
        match clauses.len() {
            0 => "true".to_string(),
            1 => clauses.into_iter().next().unwrap_or_default(),
            _ => format!("(and {})", clauses.join(" ")),
        }
    }
}
