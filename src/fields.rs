//! Field metadata and input casting.
//!
//! A model description carries a map from opaque field ids (e.g. `"000004"`)
//! to field specifications. Callers may key their input rows by field id or
//! by field name; [`Fields`] resolves both and casts every value to the
//! field's declared type before any tree sees it.

use std::collections::HashMap;

// =============================================================================
// Field specifications
// =============================================================================

/// Declared type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpType {
    Numeric,
    Categorical,
    Text,
    Items,
    DateTime,
}

impl OpType {
    /// Parse the optype symbol used by the model description.
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "numeric" => Some(Self::Numeric),
            "categorical" => Some(Self::Categorical),
            "text" => Some(Self::Text),
            "items" => Some(Self::Items),
            "datetime" => Some(Self::DateTime),
            _ => None,
        }
    }
}

/// How term occurrences are counted for a text field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TokenMode {
    /// Count matching tokens only.
    Tokens,
    /// Match the whole field value against the term.
    FullTerms,
    /// Take the larger of the token count and the full-term match.
    #[default]
    All,
}

impl TokenMode {
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "tokens_only" => Some(Self::Tokens),
            "full_terms_only" => Some(Self::FullTerms),
            "all" => Some(Self::All),
            _ => None,
        }
    }
}

/// Term-counting options for a text field.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TermAnalysis {
    pub case_sensitive: bool,
    pub token_mode: TokenMode,
}

/// Item-splitting options for an items field.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemAnalysis {
    pub separator: String,
}

impl Default for ItemAnalysis {
    fn default() -> Self {
        Self {
            separator: ",".to_string(),
        }
    }
}

/// Specification of a single field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub name: String,
    pub optype: OpType,
    pub term_analysis: Option<TermAnalysis>,
    pub item_analysis: Option<ItemAnalysis>,
}

impl FieldSpec {
    /// Create a spec with no text/items options.
    pub fn new(name: impl Into<String>, optype: OpType) -> Self {
        Self {
            name: name.into(),
            optype,
            term_analysis: None,
            item_analysis: None,
        }
    }
}

// =============================================================================
// Fields map
// =============================================================================

/// Error raised when caller input cannot be matched or cast to the model's
/// fields. Input is never silently coerced.
#[derive(Debug, Clone, thiserror::Error)]
pub enum InputError {
    #[error("input key '{0}' matches neither a field id nor a field name")]
    UnknownField(String),
    #[error("value '{value}' for numeric field {field} is not a number")]
    NotNumeric { field: String, value: String },
    #[error("value for field {field} has an unsupported JSON type")]
    UnsupportedValue { field: String },
    #[error("value for numeric field {field} is not finite")]
    NotFinite { field: String },
}

/// Immutable field map with bidirectional id/name resolution.
#[derive(Debug, Clone, Default)]
pub struct Fields {
    specs: HashMap<String, FieldSpec>,
    by_name: HashMap<String, String>,
}

impl Fields {
    pub fn new(specs: HashMap<String, FieldSpec>) -> Self {
        let by_name = specs
            .iter()
            .map(|(id, spec)| (spec.name.clone(), id.clone()))
            .collect();
        Self { specs, by_name }
    }

    /// Look up a field spec by id.
    #[inline]
    pub fn get(&self, id: &str) -> Option<&FieldSpec> {
        self.specs.get(id)
    }

    /// Whether a field id exists.
    #[inline]
    pub fn contains(&self, id: &str) -> bool {
        self.specs.contains_key(id)
    }

    /// Resolve a key that may be either a field id or a field name.
    pub fn resolve<'a>(&'a self, key: &'a str) -> Option<&'a str> {
        if self.specs.contains_key(key) {
            Some(key)
        } else {
            self.by_name.get(key).map(String::as_str)
        }
    }

    /// Field id for a given field name.
    pub fn id_for_name(&self, name: &str) -> Option<&str> {
        self.by_name.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Normalize an input row to field ids and cast every value to its
    /// field's declared type. `null` values are dropped (treated as missing).
    pub fn cast_input(
        &self,
        input: &HashMap<String, serde_json::Value>,
    ) -> Result<CastInput, InputError> {
        let mut values = HashMap::with_capacity(input.len());
        for (key, value) in input {
            if value.is_null() {
                continue;
            }
            let id = self
                .resolve(key)
                .ok_or_else(|| InputError::UnknownField(key.clone()))?;
            let spec = &self.specs[id];
            let cast = cast_value(id, spec.optype, value)?;
            values.insert(id.to_string(), cast);
        }
        Ok(CastInput { values })
    }
}

fn cast_value(
    id: &str,
    optype: OpType,
    value: &serde_json::Value,
) -> Result<FieldValue, InputError> {
    use serde_json::Value;
    match optype {
        OpType::Numeric => match value {
            Value::Number(n) => {
                let f = n.as_f64().ok_or_else(|| InputError::NotFinite {
                    field: id.to_string(),
                })?;
                if !f.is_finite() {
                    return Err(InputError::NotFinite {
                        field: id.to_string(),
                    });
                }
                Ok(FieldValue::Number(f))
            }
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|f| f.is_finite())
                .map(FieldValue::Number)
                .ok_or_else(|| InputError::NotNumeric {
                    field: id.to_string(),
                    value: s.clone(),
                }),
            _ => Err(InputError::UnsupportedValue {
                field: id.to_string(),
            }),
        },
        OpType::Categorical | OpType::Text | OpType::Items | OpType::DateTime => match value {
            Value::String(s) => Ok(FieldValue::Text(s.clone())),
            Value::Number(n) => Ok(FieldValue::Text(format_numeric(n))),
            Value::Bool(b) => Ok(FieldValue::Text(b.to_string())),
            _ => Err(InputError::UnsupportedValue {
                field: id.to_string(),
            }),
        },
    }
}

/// Integral JSON numbers print without a trailing `.0` so categorical
/// comparisons against e.g. `3` behave the same keyed as `3` or `"3"`.
fn format_numeric(n: &serde_json::Number) -> String {
    if let Some(i) = n.as_i64() {
        i.to_string()
    } else {
        n.to_string()
    }
}

// =============================================================================
// Cast input
// =============================================================================

/// A single input value after casting.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Number(f64),
    Text(String),
}

impl FieldValue {
    #[inline]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(f) => Some(*f),
            Self::Text(_) => None,
        }
    }

    #[inline]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Number(_) => None,
        }
    }
}

/// An input row normalized to field ids with all values cast.
///
/// Read-only once built; traversal never mutates caller data.
#[derive(Debug, Clone, Default)]
pub struct CastInput {
    values: HashMap<String, FieldValue>,
}

impl CastInput {
    /// Build directly from id-keyed values (used by tests and embedders that
    /// bypass JSON input).
    pub fn from_values(values: HashMap<String, FieldValue>) -> Self {
        Self { values }
    }

    #[inline]
    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.values.get(field)
    }

    #[inline]
    pub fn contains(&self, field: &str) -> bool {
        self.values.contains_key(field)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
