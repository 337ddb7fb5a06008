//! Display formatting and input coercion for field values.
//!
//! `format` turns a stored value into the string a record panel shows;
//! `coerce` parses what a user typed (or a previously formatted string) back
//! into a typed value. Formatting a coerced formatted value yields the same
//! display string.

use std::fmt::Write;

use chrono::{DateTime, Utc};

use crate::config::DisplayConfig;
use crate::model::default_value_for_type;
use crate::types::{CustomFieldDefinition, FieldType};
use crate::value::{millis_to_datetime, parse_date_millis, Value};

/// Formats and coerces values using the configured display conventions.
#[derive(Debug, Clone, Default)]
pub struct FieldFormatter {
    config: DisplayConfig,
}

impl FieldFormatter {
    pub fn new(config: DisplayConfig) -> Self {
        Self { config }
    }

    /// Render `value` for display. Empty values render as an empty string.
    pub fn format(&self, value: &Value, definition: &CustomFieldDefinition) -> String {
        if value.is_empty() {
            return String::new();
        }
        match (definition.field_type, value) {
            (FieldType::Number, Value::Number(n)) => format_number(*n),
            (FieldType::Currency, Value::Number(n)) => {
                format_currency(*n, &self.config.currency_symbol)
            }
            (FieldType::Date, v) => match v.as_date_millis().and_then(millis_to_datetime) {
                Some(dt) => format_date(&dt, &self.config.date_format),
                None => v.to_string(),
            },
            (FieldType::Checkbox, Value::Bool(true)) => "Yes".to_string(),
            (FieldType::Checkbox, Value::Bool(false)) => "No".to_string(),
            (FieldType::Select, Value::Text(choice)) => {
                definition.option_label(choice).to_string()
            }
            (FieldType::Multiselect, Value::StringList(choices)) => choices
                .iter()
                .map(|c| definition.option_label(c))
                .collect::<Vec<_>>()
                .join(", "),
            (_, v) => v.to_string(),
        }
    }

    /// Parse raw input into a value of the definition's type.
    ///
    /// Input that cannot be interpreted is kept as text so the validation
    /// engine reports it as a type mismatch.
    pub fn coerce(&self, raw: &str, definition: &CustomFieldDefinition) -> Value {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return default_value_for_type(definition.field_type);
        }
        match definition.field_type {
            FieldType::Number | FieldType::Currency => {
                let cleaned: String = trimmed
                    .replace(self.config.currency_symbol.as_str(), "")
                    .chars()
                    .filter(|c| *c != ',' && !c.is_whitespace())
                    .collect();
                cleaned
                    .parse::<f64>()
                    .ok()
                    .filter(|n| n.is_finite())
                    .map(Value::Number)
                    .unwrap_or_else(|| Value::Text(raw.to_string()))
            }
            FieldType::Date => parse_date_millis(trimmed)
                .or_else(|| parse_with_format(trimmed, &self.config.date_format))
                .map(|ms| Value::Number(ms as f64))
                .unwrap_or_else(|| Value::Text(raw.to_string())),
            FieldType::Checkbox => match trimmed.to_ascii_lowercase().as_str() {
                "yes" | "true" | "1" | "on" => Value::Bool(true),
                "no" | "false" | "0" | "off" => Value::Bool(false),
                _ => Value::Text(raw.to_string()),
            },
            FieldType::Select => Value::Text(option_value_for(definition, trimmed)),
            FieldType::Multiselect => Value::StringList(
                trimmed
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(|s| option_value_for(definition, s))
                    .collect(),
            ),
            FieldType::Text
            | FieldType::Textarea
            | FieldType::Url
            | FieldType::Email
            | FieldType::Phone => Value::Text(raw.to_string()),
        }
    }
}

/// Format with the default display configuration.
pub fn format_field_value(value: &Value, definition: &CustomFieldDefinition) -> String {
    FieldFormatter::default().format(value, definition)
}

/// Coerce with the default display configuration.
pub fn coerce_input(raw: &str, definition: &CustomFieldDefinition) -> Value {
    FieldFormatter::default().coerce(raw, definition)
}

/// Map an option label (or value) typed by a user to the stored option value.
fn option_value_for(definition: &CustomFieldDefinition, input: &str) -> String {
    definition
        .options()
        .iter()
        .find(|o| o.value == input)
        .or_else(|| definition.options().iter().find(|o| o.label == input))
        .map(|o| o.value.clone())
        .unwrap_or_else(|| input.to_string())
}

/// Render a timestamp, falling back to ISO dates when the configured format is invalid.
fn format_date(dt: &DateTime<Utc>, format: &str) -> String {
    let mut out = String::new();
    if write!(out, "{}", dt.format(format)).is_err() {
        return dt.format("%Y-%m-%d").to_string();
    }
    out
}

fn parse_with_format(input: &str, format: &str) -> Option<i64> {
    chrono::NaiveDate::parse_from_str(input, format)
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().timestamp_millis())
}

/// `1234567.5` → `1,234,567.5`
fn format_number(n: f64) -> String {
    let raw = crate::value::plain_number(n.abs());
    let (int_part, frac_part) = match raw.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (raw.as_str(), None),
    };
    let mut out = String::new();
    if n < 0.0 {
        out.push('-');
    }
    out.push_str(&group_thousands(int_part));
    if let Some(frac) = frac_part {
        out.push('.');
        out.push_str(frac);
    }
    out
}

/// `-1234.5` → `-$1,234.50`
fn format_currency(n: f64, symbol: &str) -> String {
    let fixed = format!("{:.2}", n.abs());
    let (int_part, frac_part) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));
    let sign = if n < 0.0 && fixed != "0.00" { "-" } else { "" };
    format!("{sign}{symbol}{}.{frac_part}", group_thousands(int_part))
}

fn group_thousands(digits: &str) -> String {
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return digits.to_string();
    }
    let len = digits.len();
    let mut out = String::with_capacity(len + len / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
