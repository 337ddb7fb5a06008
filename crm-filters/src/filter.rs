//! Filter rows and their payloads.

use crm_fields::{FieldShape, Value};
use serde::{Deserialize, Serialize};

use crate::operator::{Conjunction, FilterOperator};

/// The comparison payload of a filter row.
///
/// Deserialized untagged: a JSON array is a `List`, an object with `min` and
/// `max` is a `Range`, anything else is a `Single` value. A missing payload
/// is `Single(Null)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    List(Vec<Value>),
    Range { min: Value, max: Value },
    Single(Value),
}

impl Default for FilterValue {
    fn default() -> Self {
        FilterValue::Single(Value::Null)
    }
}

impl FilterValue {
    pub fn range(min: impl Into<Value>, max: impl Into<Value>) -> Self {
        FilterValue::Range {
            min: min.into(),
            max: max.into(),
        }
    }

    pub fn list<I, V>(items: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        FilterValue::List(items.into_iter().map(Into::into).collect())
    }

    pub fn as_single(&self) -> Option<&Value> {
        match self {
            FilterValue::Single(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_range(&self) -> Option<(&Value, &Value)> {
        match self {
            FilterValue::Range { min, max } => Some((min, max)),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            FilterValue::List(items) => Some(items),
            _ => None,
        }
    }
}

impl From<Value> for FilterValue {
    fn from(value: Value) -> Self {
        FilterValue::Single(value)
    }
}

/// One predicate row of a smart list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    /// Built-in attribute name or `customField:<definition id>`
    pub field: String,
    pub operator: FilterOperator,
    #[serde(default)]
    pub value: FilterValue,
    /// Ignored on the first row
    #[serde(default)]
    pub conjunction: Conjunction,
}

impl Filter {
    pub fn new(
        field: impl Into<String>,
        operator: FilterOperator,
        value: impl Into<FilterValue>,
    ) -> Self {
        Self {
            field: field.into(),
            operator,
            value: value.into(),
            conjunction: Conjunction::And,
        }
    }

    /// A row that tests only for emptiness.
    pub fn empty(field: impl Into<String>) -> Self {
        Self::new(field, FilterOperator::IsEmpty, FilterValue::default())
    }

    pub fn not_empty(field: impl Into<String>) -> Self {
        Self::new(field, FilterOperator::IsNotEmpty, FilterValue::default())
    }

    /// Join this row to the previous ones with `or`.
    pub fn or(mut self) -> Self {
        self.conjunction = Conjunction::Or;
        self
    }

    pub fn and(mut self) -> Self {
        self.conjunction = Conjunction::And;
        self
    }

    pub fn is_legal_for(&self, shape: FieldShape) -> bool {
        self.operator.is_legal_for(shape)
    }
}
