//! Value-shape contracts per field type.

use crate::types::FieldType;
use crate::value::Value;

/// First validation gate: does `value` have the runtime shape `field_type` accepts?
///
/// Null is accepted for number and currency (an unset amount); emptiness for
/// every other type is handled by the required check before this runs.
pub fn is_value_shape_correct(field_type: FieldType, value: &Value) -> bool {
    match field_type {
        FieldType::Text
        | FieldType::Textarea
        | FieldType::Url
        | FieldType::Email
        | FieldType::Phone
        | FieldType::Select => matches!(value, Value::Text(_)),
        FieldType::Number | FieldType::Currency => match value {
            Value::Number(n) => n.is_finite(),
            Value::Null => true,
            _ => false,
        },
        FieldType::Date => match value {
            Value::Number(n) => n.is_finite(),
            Value::Text(_) => true,
            _ => false,
        },
        FieldType::Checkbox => matches!(value, Value::Bool(_)),
        FieldType::Multiselect => matches!(value, Value::StringList(_)),
    }
}

/// The value a freshly rendered input holds before the user types anything.
pub fn default_value_for_type(field_type: FieldType) -> Value {
    match field_type {
        FieldType::Text
        | FieldType::Textarea
        | FieldType::Url
        | FieldType::Email
        | FieldType::Phone
        | FieldType::Select => Value::Text(String::new()),
        FieldType::Number | FieldType::Currency | FieldType::Date => Value::Null,
        FieldType::Checkbox => Value::Bool(false),
        FieldType::Multiselect => Value::StringList(Vec::new()),
    }
}
