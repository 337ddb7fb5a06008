//! Validation engine: checks untyped values against a field definition.
//!
//! Checks run in a fixed order and stop at the first failure:
//!
//! 1. required gate
//! 2. empty, not required → accepted without further checks
//! 3. value shape for the field type
//! 4. type-specific constraints (bounds, patterns, options, dates)
//!
//! Author-supplied patterns are compiled with the `regex` crate, which
//! guarantees linear-time matching, under the size limits from
//! [`ValidationConfig`]. A stored pattern that does not compile is treated as
//! no constraint.

use dashmap::DashMap;
use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use tracing::warn;

use crate::config::ValidationConfig;
use crate::error::{ValidationError, ValidationErrorKind};
use crate::model::is_value_shape_correct;
use crate::types::{CustomFieldDefinition, FieldType};
use crate::value::{parse_date_millis, plain_number, Value};

static EMAIL_SHAPE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$")
        .expect("email shape pattern is valid")
});

/// Validates values against definitions, caching compiled patterns.
pub struct ValidationEngine {
    config: ValidationConfig,
    patterns: DashMap<String, Option<Regex>>,
}

impl Default for ValidationEngine {
    fn default() -> Self {
        Self::new(ValidationConfig::default())
    }
}

impl ValidationEngine {
    pub fn new(config: ValidationConfig) -> Self {
        Self {
            config,
            patterns: DashMap::new(),
        }
    }

    /// Validate `value` against `definition`, failing fast on the first violation.
    pub fn validate(
        &self,
        value: &Value,
        definition: &CustomFieldDefinition,
    ) -> Result<(), ValidationError> {
        let fail = |kind, message: String| {
            Err(ValidationError::new(&definition.name, kind, message))
        };
        let label = &definition.label;

        if value.is_empty() {
            if definition.is_required {
                return fail(
                    ValidationErrorKind::Required,
                    format!("{label} is required"),
                );
            }
            return Ok(());
        }

        if !is_value_shape_correct(definition.field_type, value) {
            return fail(
                ValidationErrorKind::TypeMismatch,
                format!("{label} must be {}", expected_shape(definition.field_type)),
            );
        }

        match definition.field_type {
            FieldType::Number | FieldType::Currency => self.check_number(value, definition),
            FieldType::Text
            | FieldType::Textarea
            | FieldType::Url
            | FieldType::Email
            | FieldType::Phone => self.check_text(value, definition),
            FieldType::Select => check_select(value, definition),
            FieldType::Multiselect => check_multiselect(value, definition),
            FieldType::Date => check_date(value, definition),
            // Shape check already guarantees a boolean.
            FieldType::Checkbox => Ok(()),
        }
    }

    /// Validate several values, collecting one error per failing field.
    pub fn validate_many<'a, I>(&self, pairs: I) -> Vec<ValidationError>
    where
        I: IntoIterator<Item = (&'a Value, &'a CustomFieldDefinition)>,
    {
        pairs
            .into_iter()
            .filter_map(|(value, def)| self.validate(value, def).err())
            .collect()
    }

    fn check_number(
        &self,
        value: &Value,
        definition: &CustomFieldDefinition,
    ) -> Result<(), ValidationError> {
        let Some(n) = value.as_number() else {
            return Ok(());
        };
        let Some(rules) = &definition.validation else {
            return Ok(());
        };
        let label = &definition.label;

        if let Some(min) = rules.min {
            if n < min {
                return Err(out_of_range(
                    definition,
                    format!("{label} must be at least {}", plain_number(min)),
                ));
            }
        }
        if let Some(max) = rules.max {
            if n > max {
                return Err(out_of_range(
                    definition,
                    format!("{label} must be at most {}", plain_number(max)),
                ));
            }
        }
        Ok(())
    }

    fn check_text(
        &self,
        value: &Value,
        definition: &CustomFieldDefinition,
    ) -> Result<(), ValidationError> {
        let Some(text) = value.as_text() else {
            return Ok(());
        };
        let label = &definition.label;

        if let Some(rules) = &definition.validation {
            let length = text.chars().count() as f64;
            if let Some(min) = rules.min {
                if length < min {
                    return Err(out_of_range(
                        definition,
                        format!("{label} must be at least {} characters", plain_number(min)),
                    ));
                }
            }
            if let Some(max) = rules.max {
                if length > max {
                    return Err(out_of_range(
                        definition,
                        format!("{label} must be at most {} characters", plain_number(max)),
                    ));
                }
            }
            if let Some(pattern) = &rules.pattern {
                if let Some(regex) = self.compiled(pattern, definition) {
                    if !regex.is_match(text) {
                        let message = rules
                            .message
                            .clone()
                            .unwrap_or_else(|| format!("{label} has an invalid format"));
                        return Err(ValidationError::new(
                            &definition.name,
                            ValidationErrorKind::InvalidPattern,
                            message,
                        ));
                    }
                }
            }
        }

        match definition.field_type {
            FieldType::Email if !EMAIL_SHAPE.is_match(text) => Err(ValidationError::new(
                &definition.name,
                ValidationErrorKind::InvalidPattern,
                format!("{label} must be a valid email address"),
            )),
            FieldType::Url if url::Url::parse(text).is_err() => Err(ValidationError::new(
                &definition.name,
                ValidationErrorKind::InvalidPattern,
                format!("{label} must be a valid URL"),
            )),
            _ => Ok(()),
        }
    }

    /// Compiled form of `pattern`, or `None` when it does not compile.
    fn compiled(&self, pattern: &str, definition: &CustomFieldDefinition) -> Option<Regex> {
        if let Some(entry) = self.patterns.get(pattern) {
            return entry.clone();
        }
        let compiled = RegexBuilder::new(pattern)
            .size_limit(self.config.regex_size_limit)
            .dfa_size_limit(self.config.regex_dfa_size_limit)
            .build();
        let compiled = match compiled {
            Ok(regex) => Some(regex),
            Err(e) => {
                warn!(
                    field = %definition.name,
                    id = %definition.id,
                    %e,
                    "invalid validation pattern, skipping pattern check"
                );
                None
            }
        };
        self.patterns.insert(pattern.to_string(), compiled.clone());
        compiled
    }
}

fn out_of_range(definition: &CustomFieldDefinition, default_message: String) -> ValidationError {
    let message = definition
        .validation
        .as_ref()
        .and_then(|v| v.message.clone())
        .unwrap_or(default_message);
    ValidationError::new(&definition.name, ValidationErrorKind::OutOfRange, message)
}

fn check_select(value: &Value, definition: &CustomFieldDefinition) -> Result<(), ValidationError> {
    match value.as_text() {
        Some(choice) if definition.option(choice).is_some() => Ok(()),
        Some(choice) => Err(invalid_option(definition, choice)),
        None => Ok(()),
    }
}

fn check_multiselect(
    value: &Value,
    definition: &CustomFieldDefinition,
) -> Result<(), ValidationError> {
    let choices = value.as_list().unwrap_or_default();
    match choices.iter().find(|c| definition.option(c).is_none()) {
        Some(bad) => Err(invalid_option(definition, bad)),
        None => Ok(()),
    }
}

fn invalid_option(definition: &CustomFieldDefinition, choice: &str) -> ValidationError {
    ValidationError::new(
        &definition.name,
        ValidationErrorKind::InvalidOption,
        format!(
            "\"{choice}\" is not a valid option for {}",
            definition.label
        ),
    )
}

fn check_date(value: &Value, definition: &CustomFieldDefinition) -> Result<(), ValidationError> {
    let valid = match value {
        Value::Number(n) => n.is_finite(),
        Value::Text(s) => parse_date_millis(s).is_some(),
        _ => true,
    };
    if valid {
        return Ok(());
    }
    Err(ValidationError::new(
        &definition.name,
        ValidationErrorKind::TypeMismatch,
        format!("{} must be a valid date", definition.label),
    ))
}

fn expected_shape(field_type: FieldType) -> &'static str {
    match field_type {
        FieldType::Number | FieldType::Currency => "a number",
        FieldType::Date => "a date",
        FieldType::Checkbox => "true or false",
        FieldType::Multiselect => "a list of options",
        FieldType::Select => "a single option",
        _ => "text",
    }
}
