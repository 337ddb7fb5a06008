//! Filter evaluation.
//!
//! Rows fold left to right with no precedence: `a AND b OR c` is
//! `(a AND b) OR c`. A row that cannot be evaluated (unknown field, an
//! operator the field's shape does not support, a payload of the wrong kind)
//! is `false`, so one bad row never aborts a scan.

use chrono::{DateTime, Duration, Utc};
use crm_fields::{FieldShape, Value};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::trace;

use crate::filter::{Filter, FilterValue};
use crate::operator::{Conjunction, FilterOperator};
use crate::record::FieldAccessor;

/// Why a row cannot be evaluated against a record layout.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FilterError {
    #[error("filter {index}: unknown field '{field}'")]
    UnknownField { index: usize, field: String },

    #[error("filter {index}: operator {operator} is not supported for {shape} field '{field}'")]
    IllegalOperator {
        index: usize,
        field: String,
        operator: FilterOperator,
        shape: FieldShape,
    },

    #[error("filter {index}: operator {operator} expects {expected}")]
    MalformedValue {
        index: usize,
        operator: FilterOperator,
        expected: &'static str,
    },
}

/// Evaluate `filters` against `record` using the current time.
pub fn evaluate<A: FieldAccessor + ?Sized>(filters: &[Filter], record: &A) -> bool {
    evaluate_at(filters, record, Utc::now())
}

/// Evaluate with an explicit `now` for `daysAgo` and `daysFromNow`.
///
/// An empty list matches every record. The first row's conjunction is ignored.
pub fn evaluate_at<A: FieldAccessor + ?Sized>(
    filters: &[Filter],
    record: &A,
    now: DateTime<Utc>,
) -> bool {
    let mut rows = filters.iter();
    let Some(first) = rows.next() else {
        return true;
    };
    rows.fold(matches(first, record, now), |acc, row| match row.conjunction {
        Conjunction::And => acc && matches(row, record, now),
        Conjunction::Or => acc || matches(row, record, now),
    })
}

/// Evaluate a single row.
pub fn matches<A: FieldAccessor + ?Sized>(filter: &Filter, record: &A, now: DateTime<Utc>) -> bool {
    let Some(shape) = record.shape(&filter.field) else {
        trace!(field = %filter.field, "unknown filter field");
        return false;
    };
    if !filter.operator.is_legal_for(shape) {
        trace!(
            field = %filter.field,
            operator = %filter.operator,
            %shape,
            "illegal filter operator"
        );
        return false;
    }
    let value = record.value(&filter.field).unwrap_or(&Value::Null);

    let outcome = match filter.operator {
        FilterOperator::IsEmpty => Some(value.is_empty()),
        FilterOperator::IsNotEmpty => Some(!value.is_empty()),
        op => match shape {
            FieldShape::String => string_op(op, value, &filter.value),
            FieldShape::Number => number_op(op, value, &filter.value),
            FieldShape::Date => date_op(op, value, &filter.value, now),
            FieldShape::Array => array_op(op, value, &filter.value),
            FieldShape::Boolean => boolean_op(op, value, &filter.value),
        },
    };
    outcome.unwrap_or_else(|| {
        trace!(field = %filter.field, operator = %filter.operator, "filter row not evaluable");
        false
    })
}

/// Report every row that would fail closed against `layout`.
///
/// Only field shapes are consulted, so a record with placeholder values works
/// as a layout.
pub fn check<A: FieldAccessor + ?Sized>(filters: &[Filter], layout: &A) -> Vec<FilterError> {
    filters
        .iter()
        .enumerate()
        .filter_map(|(index, filter)| {
            let Some(shape) = layout.shape(&filter.field) else {
                return Some(FilterError::UnknownField {
                    index,
                    field: filter.field.clone(),
                });
            };
            if !filter.operator.is_legal_for(shape) {
                return Some(FilterError::IllegalOperator {
                    index,
                    field: filter.field.clone(),
                    operator: filter.operator,
                    shape,
                });
            }
            expected_payload(filter.operator, shape, &filter.value).map(|expected| {
                FilterError::MalformedValue {
                    index,
                    operator: filter.operator,
                    expected,
                }
            })
        })
        .collect()
}

/// `Some(description)` when `payload` is the wrong kind for `operator`.
fn expected_payload(
    operator: FilterOperator,
    shape: FieldShape,
    payload: &FilterValue,
) -> Option<&'static str> {
    use FilterOperator::*;
    let ok = match (operator, shape) {
        (IsEmpty | IsNotEmpty, _) => true,
        (InList | NotInList, _) => payload
            .as_list()
            .is_some_and(|items| items.iter().all(|v| v.as_text().is_some())),
        (Between, FieldShape::Number) => payload
            .as_range()
            .is_some_and(|(min, max)| number_of(min).is_some() && number_of(max).is_some()),
        (Between, _) => payload
            .as_range()
            .is_some_and(|(min, max)| is_date(min) && is_date(max)),
        (DaysAgo | DaysFromNow, _) | (_, FieldShape::Number) => {
            payload.as_single().and_then(number_of).is_some()
        }
        (_, FieldShape::Date) => payload.as_single().and_then(Value::as_date_millis).is_some(),
        (_, FieldShape::Boolean) => payload.as_single().and_then(bool_of).is_some(),
        (Contains | NotContains, FieldShape::Array) => match payload {
            FilterValue::Single(v) => v.as_text().is_some(),
            FilterValue::List(items) => items.iter().all(|v| v.as_text().is_some()),
            FilterValue::Range { .. } => false,
        },
        _ => payload.as_single().and_then(Value::as_text).is_some(),
    };
    if ok {
        return None;
    }
    Some(match operator {
        InList | NotInList => "a list of strings",
        Between => "a {min, max} range",
        DaysAgo | DaysFromNow => "a number of days",
        _ => match shape {
            FieldShape::Number => "a number",
            FieldShape::Date => "a date",
            FieldShape::Boolean => "true or false",
            _ => "a string",
        },
    })
}

fn is_date(value: &Value) -> bool {
    value.as_date_millis().is_some()
}

/// Numbers, and numeric strings as typed into a filter form.
fn number_of(value: &Value) -> Option<f64> {
    value.as_number().or_else(|| {
        value
            .as_text()?
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|n| n.is_finite())
    })
}

fn bool_of(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Text(s) if s.eq_ignore_ascii_case("true") => Some(true),
        Value::Text(s) if s.eq_ignore_ascii_case("false") => Some(false),
        _ => None,
    }
}

fn string_op(op: FilterOperator, value: &Value, payload: &FilterValue) -> Option<bool> {
    let field = match value {
        Value::Null => "",
        Value::Text(s) => s.as_str(),
        _ => return None,
    };
    match op {
        FilterOperator::InList | FilterOperator::NotInList => {
            let items = payload.as_list()?;
            let found = items.iter().any(|item| item.as_text() == Some(field));
            Some(found == (op == FilterOperator::InList))
        }
        _ => {
            let needle = payload.as_single()?.as_text()?;
            let (haystack, lowered) = (field.to_lowercase(), needle.to_lowercase());
            match op {
                FilterOperator::Equals => Some(field == needle),
                FilterOperator::NotEquals => Some(field != needle),
                FilterOperator::Contains => Some(haystack.contains(&lowered)),
                FilterOperator::NotContains => Some(!haystack.contains(&lowered)),
                FilterOperator::StartsWith => Some(haystack.starts_with(&lowered)),
                FilterOperator::EndsWith => Some(haystack.ends_with(&lowered)),
                _ => None,
            }
        }
    }
}

fn number_op(op: FilterOperator, value: &Value, payload: &FilterValue) -> Option<bool> {
    let n = value.as_number()?;
    match op {
        FilterOperator::Between => {
            let (min, max) = payload.as_range()?;
            Some(number_of(min)? <= n && n <= number_of(max)?)
        }
        _ => {
            let target = number_of(payload.as_single()?)?;
            match op {
                FilterOperator::Equals => Some(n == target),
                FilterOperator::NotEquals => Some(n != target),
                FilterOperator::GreaterThan => Some(n > target),
                FilterOperator::LessThan => Some(n < target),
                _ => None,
            }
        }
    }
}

fn date_op(
    op: FilterOperator,
    value: &Value,
    payload: &FilterValue,
    now: DateTime<Utc>,
) -> Option<bool> {
    let at = value.as_date_millis()?;
    match op {
        FilterOperator::Between => {
            let (min, max) = payload.as_range()?;
            Some(min.as_date_millis()? <= at && at <= max.as_date_millis()?)
        }
        FilterOperator::DaysAgo | FilterOperator::DaysFromNow => {
            let days = number_of(payload.as_single()?)?;
            let offset = Duration::try_milliseconds((days * 86_400_000.0) as i64)?;
            if op == FilterOperator::DaysAgo {
                Some(at <= now.checked_sub_signed(offset)?.timestamp_millis())
            } else {
                Some(at >= now.checked_add_signed(offset)?.timestamp_millis())
            }
        }
        _ => {
            let target = payload.as_single()?.as_date_millis()?;
            match op {
                FilterOperator::GreaterThan => Some(at > target),
                FilterOperator::LessThan => Some(at < target),
                _ => None,
            }
        }
    }
}

fn array_op(op: FilterOperator, value: &Value, payload: &FilterValue) -> Option<bool> {
    let items: &[String] = match value {
        Value::Null => &[],
        Value::StringList(items) => items,
        _ => return None,
    };
    let contains = match payload {
        FilterValue::Single(needle) => {
            let needle = needle.as_text()?;
            items.iter().any(|i| i == needle)
        }
        FilterValue::List(needles) => {
            let needles = needles
                .iter()
                .map(Value::as_text)
                .collect::<Option<Vec<_>>>()?;
            needles.iter().all(|n| items.iter().any(|i| i == n))
        }
        FilterValue::Range { .. } => return None,
    };
    match op {
        FilterOperator::Contains => Some(contains),
        FilterOperator::NotContains => Some(!contains),
        _ => None,
    }
}

fn boolean_op(op: FilterOperator, value: &Value, payload: &FilterValue) -> Option<bool> {
    let flag = match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        _ => return None,
    };
    let target = bool_of(payload.as_single()?)?;
    match op {
        FilterOperator::Equals => Some(flag == target),
        FilterOperator::NotEquals => Some(flag != target),
        _ => None,
    }
}

/// An ordered filter list with evaluation helpers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilterSet {
    filters: Vec<Filter>,
}

impl FilterSet {
    pub fn new(filters: Vec<Filter>) -> Self {
        Self { filters }
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn matches<A: FieldAccessor + ?Sized>(&self, record: &A) -> bool {
        evaluate(&self.filters, record)
    }

    pub fn matches_at<A: FieldAccessor + ?Sized>(&self, record: &A, now: DateTime<Utc>) -> bool {
        evaluate_at(&self.filters, record, now)
    }

    /// Records that satisfy the set, evaluated at a single `now`.
    pub fn filter<'a, A, I>(&'a self, records: I) -> impl Iterator<Item = A> + 'a
    where
        A: FieldAccessor + 'a,
        I: IntoIterator<Item = A>,
        I::IntoIter: 'a,
    {
        let now = Utc::now();
        records
            .into_iter()
            .filter(move |record| evaluate_at(&self.filters, record, now))
    }

    pub fn check<A: FieldAccessor + ?Sized>(&self, layout: &A) -> Vec<FilterError> {
        check(&self.filters, layout)
    }
}

impl From<Vec<Filter>> for FilterSet {
    fn from(filters: Vec<Filter>) -> Self {
        Self::new(filters)
    }
}
