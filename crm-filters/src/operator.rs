//! Filter operators, conjunctions and the operator × shape legality table.

use std::fmt;
use std::str::FromStr;

use crm_fields::FieldShape;
use serde::{Deserialize, Serialize};

/// Comparison applied by one filter row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FilterOperator {
    Equals,
    NotEquals,
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
    IsEmpty,
    IsNotEmpty,
    GreaterThan,
    LessThan,
    Between,
    InList,
    NotInList,
    DaysAgo,
    DaysFromNow,
}

impl FilterOperator {
    pub const ALL: [FilterOperator; 15] = [
        FilterOperator::Equals,
        FilterOperator::NotEquals,
        FilterOperator::Contains,
        FilterOperator::NotContains,
        FilterOperator::StartsWith,
        FilterOperator::EndsWith,
        FilterOperator::IsEmpty,
        FilterOperator::IsNotEmpty,
        FilterOperator::GreaterThan,
        FilterOperator::LessThan,
        FilterOperator::Between,
        FilterOperator::InList,
        FilterOperator::NotInList,
        FilterOperator::DaysAgo,
        FilterOperator::DaysFromNow,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOperator::Equals => "equals",
            FilterOperator::NotEquals => "notEquals",
            FilterOperator::Contains => "contains",
            FilterOperator::NotContains => "notContains",
            FilterOperator::StartsWith => "startsWith",
            FilterOperator::EndsWith => "endsWith",
            FilterOperator::IsEmpty => "isEmpty",
            FilterOperator::IsNotEmpty => "isNotEmpty",
            FilterOperator::GreaterThan => "greaterThan",
            FilterOperator::LessThan => "lessThan",
            FilterOperator::Between => "between",
            FilterOperator::InList => "inList",
            FilterOperator::NotInList => "notInList",
            FilterOperator::DaysAgo => "daysAgo",
            FilterOperator::DaysFromNow => "daysFromNow",
        }
    }

    /// `isEmpty` and `isNotEmpty` look only at the field.
    pub fn ignores_payload(&self) -> bool {
        matches!(self, FilterOperator::IsEmpty | FilterOperator::IsNotEmpty)
    }

    pub fn is_legal_for(&self, shape: FieldShape) -> bool {
        legal_operators(shape).contains(self)
    }
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilterOperator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FilterOperator::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| format!("unknown filter operator: {s}"))
    }
}

const STRING_OPERATORS: &[FilterOperator] = &[
    FilterOperator::Equals,
    FilterOperator::NotEquals,
    FilterOperator::Contains,
    FilterOperator::NotContains,
    FilterOperator::StartsWith,
    FilterOperator::EndsWith,
    FilterOperator::IsEmpty,
    FilterOperator::IsNotEmpty,
    FilterOperator::InList,
    FilterOperator::NotInList,
];

const NUMBER_OPERATORS: &[FilterOperator] = &[
    FilterOperator::Equals,
    FilterOperator::NotEquals,
    FilterOperator::GreaterThan,
    FilterOperator::LessThan,
    FilterOperator::Between,
    FilterOperator::IsEmpty,
    FilterOperator::IsNotEmpty,
];

const DATE_OPERATORS: &[FilterOperator] = &[
    FilterOperator::GreaterThan,
    FilterOperator::LessThan,
    FilterOperator::Between,
    FilterOperator::DaysAgo,
    FilterOperator::DaysFromNow,
    FilterOperator::IsEmpty,
    FilterOperator::IsNotEmpty,
];

const ARRAY_OPERATORS: &[FilterOperator] = &[
    FilterOperator::Contains,
    FilterOperator::NotContains,
    FilterOperator::IsEmpty,
    FilterOperator::IsNotEmpty,
];

const BOOLEAN_OPERATORS: &[FilterOperator] = &[
    FilterOperator::Equals,
    FilterOperator::NotEquals,
    FilterOperator::IsEmpty,
    FilterOperator::IsNotEmpty,
];

/// Operators a filter row may use against a field of `shape`.
pub fn legal_operators(shape: FieldShape) -> &'static [FilterOperator] {
    match shape {
        FieldShape::String => STRING_OPERATORS,
        FieldShape::Number => NUMBER_OPERATORS,
        FieldShape::Date => DATE_OPERATORS,
        FieldShape::Array => ARRAY_OPERATORS,
        FieldShape::Boolean => BOOLEAN_OPERATORS,
    }
}

/// How a row combines with the result of the rows before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Conjunction {
    #[default]
    And,
    Or,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operator_names_are_camel_case() {
        for op in FilterOperator::ALL {
            let json = serde_json::to_string(&op).unwrap();
            assert_eq!(json, format!("\"{}\"", op.as_str()));
            assert_eq!(op.as_str().parse::<FilterOperator>(), Ok(op));
        }
        assert!("equal".parse::<FilterOperator>().is_err());
    }

    #[test]
    fn legality_table() {
        assert!(FilterOperator::StartsWith.is_legal_for(FieldShape::String));
        assert!(!FilterOperator::StartsWith.is_legal_for(FieldShape::Array));
        assert!(FilterOperator::Between.is_legal_for(FieldShape::Number));
        assert!(!FilterOperator::Equals.is_legal_for(FieldShape::Date));
        assert!(FilterOperator::DaysAgo.is_legal_for(FieldShape::Date));
        assert!(!FilterOperator::InList.is_legal_for(FieldShape::Number));
        assert!(FilterOperator::Equals.is_legal_for(FieldShape::Boolean));
        assert!(!FilterOperator::Contains.is_legal_for(FieldShape::Boolean));
    }

    #[test]
    fn every_shape_allows_emptiness_checks() {
        for shape in [
            FieldShape::String,
            FieldShape::Number,
            FieldShape::Date,
            FieldShape::Array,
            FieldShape::Boolean,
        ] {
            assert!(FilterOperator::IsEmpty.is_legal_for(shape));
            assert!(FilterOperator::IsNotEmpty.is_legal_for(shape));
        }
    }

    #[test]
    fn conjunction_defaults_to_and() {
        assert_eq!(Conjunction::default(), Conjunction::And);
        let or: Conjunction = serde_json::from_str("\"or\"").unwrap();
        assert_eq!(or, Conjunction::Or);
    }
}
