//! Filter predicate engine for CRM records
//!
//! A filter is an ordered list of rows `(field, operator, value, conjunction)`
//! evaluated against a record. Fields are resolved through [`FieldAccessor`],
//! so built-in attributes and `customField:<definition id>` keys are handled
//! identically; each field declares a [`FieldShape`](crm_fields::FieldShape)
//! that decides which operators are legal.
//!
//! Evaluation never fails: rows that cannot be evaluated are `false`. Use
//! [`check`] to surface those rows to whoever authored them.

pub mod eval;
pub mod filter;
pub mod operator;
pub mod record;

pub use eval::{check, evaluate, evaluate_at, matches, FilterError, FilterSet};
pub use filter::{Filter, FilterValue};
pub use operator::{legal_operators, Conjunction, FilterOperator};
pub use record::{FieldAccessor, Record};
