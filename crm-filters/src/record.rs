//! Field access for filter evaluation.
//!
//! The engine never looks at entities directly. It asks a [`FieldAccessor`]
//! for the declared shape and current value of a field name, so built-in
//! attributes and `customField:<id>` entries resolve the same way.

use crm_fields::{CustomFieldEntry, FieldShape, Value};
use indexmap::IndexMap;

/// Resolves field names to declared shapes and values.
pub trait FieldAccessor {
    /// Declared shape, or `None` when the field is unknown.
    fn shape(&self, field: &str) -> Option<FieldShape>;

    /// Current value. `None` for unknown fields; unset known fields may
    /// return `None` or `Null`.
    fn value(&self, field: &str) -> Option<&Value>;
}

#[derive(Debug, Clone, PartialEq)]
struct RecordField {
    shape: FieldShape,
    value: Value,
}

/// A flat, in-memory record of named fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: IndexMap<String, RecordField>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(
        mut self,
        name: impl Into<String>,
        shape: FieldShape,
        value: impl Into<Value>,
    ) -> Self {
        self.insert(name, shape, value);
        self
    }

    pub fn with_text(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.with_field(name, FieldShape::String, Value::Text(value.into()))
    }

    pub fn with_number(self, name: impl Into<String>, value: f64) -> Self {
        self.with_field(name, FieldShape::Number, Value::Number(value))
    }

    /// Epoch millis or a parseable date string.
    pub fn with_date(self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with_field(name, FieldShape::Date, value)
    }

    pub fn with_list<I, S>(self, name: impl Into<String>, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let items = items.into_iter().map(Into::into).collect::<Vec<String>>();
        self.with_field(name, FieldShape::Array, Value::StringList(items))
    }

    pub fn with_bool(self, name: impl Into<String>, value: bool) -> Self {
        self.with_field(name, FieldShape::Boolean, Value::Bool(value))
    }

    /// Add or replace a field.
    pub fn insert(&mut self, name: impl Into<String>, shape: FieldShape, value: impl Into<Value>) {
        self.fields.insert(
            name.into(),
            RecordField {
                shape,
                value: value.into(),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }
}

impl FieldAccessor for Record {
    fn shape(&self, field: &str) -> Option<FieldShape> {
        self.fields.get(field).map(|f| f.shape)
    }

    fn value(&self, field: &str) -> Option<&Value> {
        self.fields.get(field).map(|f| &f.value)
    }
}

impl Extend<CustomFieldEntry> for Record {
    fn extend<T: IntoIterator<Item = CustomFieldEntry>>(&mut self, entries: T) {
        for entry in entries {
            self.insert(entry.key, entry.shape, entry.value);
        }
    }
}

impl FromIterator<CustomFieldEntry> for Record {
    fn from_iter<T: IntoIterator<Item = CustomFieldEntry>>(entries: T) -> Self {
        let mut record = Record::new();
        record.extend(entries);
        record
    }
}

impl<A: FieldAccessor + ?Sized> FieldAccessor for &A {
    fn shape(&self, field: &str) -> Option<FieldShape> {
        (**self).shape(field)
    }

    fn value(&self, field: &str) -> Option<&Value> {
        (**self).value(field)
    }
}
