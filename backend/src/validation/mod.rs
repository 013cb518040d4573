//! Declarative, data-driven record validation.
//!
//! A schema's rule table is an ordered list of `(field, check, message)`
//! entries. Every rule is evaluated independently and every failing message
//! is collected, so one pass reports everything wrong with a row.
//!
//! # Checks
//!
//! | Check               | Fails when                                          |
//! |---------------------|-----------------------------------------------------|
//! | `required`          | value absent or empty text                          |
//! | `max_length`        | display text longer than `max` characters           |
//! | `pattern`           | display text does not match the regex               |
//! | `range`             | number below `min` or above `max` (inclusive)       |
//! | `greater_than_zero` | number `<= 0`                                       |
//! | `one_of`            | value not in `values` (case-insensitive)            |
//! | `not_equal`         | value equals field `other`                          |
//! | `not_before`        | date earlier than date field `other`                |
//!
//! Absent values pass every check except `required`. Fields flagged
//! `required` in the schema get an implicit presence check ahead of the
//! rule table.
//!
//! # Message templates
//!
//! Messages may use `{field}`, `{value}`, `{min}`, `{max}`, `{values}` and
//! `{other}`. Field placeholders render the field label.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{SchemaError, SchemaResult};
use crate::models::{FieldValue, ImportRecord, ValidationOutcome};
use crate::schema::RecordSchema;

/// Message for a required field left blank. Shared with the materializer.
pub fn missing_required_message(label: &str) -> String {
    format!("missing required field `{}`", label)
}

/// What a rule checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Check {
    Required,
    MaxLength {
        max: usize,
    },
    Pattern {
        pattern: String,
    },
    Range {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max: Option<f64>,
    },
    GreaterThanZero,
    OneOf {
        values: Vec<String>,
    },
    NotEqual {
        other: String,
    },
    NotBefore {
        other: String,
    },
}

impl Check {
    fn default_message(&self) -> &'static str {
        match self {
            Check::Required => "`{field}` is required",
            Check::MaxLength { .. } => "`{field}` must be at most {max} characters",
            Check::Pattern { .. } => "`{field}` has an invalid format: `{value}`",
            Check::Range { min: Some(_), max: Some(_) } => "`{field}` must be between {min} and {max}",
            Check::Range { min: Some(_), max: None } => "`{field}` must be at least {min}",
            Check::Range { .. } => "`{field}` must be at most {max}",
            Check::GreaterThanZero => "`{field}` must be greater than zero",
            Check::OneOf { .. } => "`{field}` must be one of: {values}",
            Check::NotEqual { .. } => "`{field}` must differ from `{other}`",
            Check::NotBefore { .. } => "`{field}` must not be before `{other}`",
        }
    }
}

/// One entry of a rule table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    /// Field the rule is attached to.
    pub field: String,
    pub check: Check,
    /// Message template overriding the check's default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Rule {
    pub fn new(field: impl Into<String>, check: Check) -> Self {
        Self {
            field: field.into(),
            check,
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Every field name the rule reads.
    pub fn referenced_fields(&self) -> Vec<&str> {
        match &self.check {
            Check::NotEqual { other } | Check::NotBefore { other } => {
                vec![self.field.as_str(), other.as_str()]
            }
            _ => vec![self.field.as_str()],
        }
    }
}

/// A rule with its regex (if any) compiled.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    rule: Rule,
    pattern: Option<Regex>,
}

impl CompiledRule {
    pub fn compile(rule: Rule) -> SchemaResult<Self> {
        let pattern = match &rule.check {
            Check::Pattern { pattern } => Some(Regex::new(pattern).map_err(|e| {
                SchemaError::InvalidPattern {
                    field: rule.field.clone(),
                    message: e.to_string(),
                }
            })?),
            _ => None,
        };
        Ok(Self { rule, pattern })
    }

    pub fn rule(&self) -> &Rule {
        &self.rule
    }

    /// Evaluate against a record; `Some(message)` on failure.
    pub fn evaluate(&self, schema: &RecordSchema, record: &ImportRecord) -> Option<String> {
        let value = record.get(&self.rule.field);

        let failed = match (&self.rule.check, value) {
            (Check::Required, value) => value.map_or(true, FieldValue::is_empty),
            (_, None) => false,
            (Check::MaxLength { max }, Some(v)) => v.to_string().chars().count() > *max,
            (Check::Pattern { .. }, Some(v)) => self
                .pattern
                .as_ref()
                .is_some_and(|re| !re.is_match(&v.to_string())),
            (Check::Range { min, max }, Some(v)) => v.as_f64().is_some_and(|n| {
                min.is_some_and(|m| n < m) || max.is_some_and(|m| n > m)
            }),
            (Check::GreaterThanZero, Some(v)) => v.as_f64().is_some_and(|n| n <= 0.0),
            (Check::OneOf { values }, Some(v)) => {
                let text = v.to_string();
                !values.iter().any(|allowed| allowed.eq_ignore_ascii_case(text.trim()))
            }
            (Check::NotEqual { other }, Some(v)) => record.get(other) == Some(v),
            (Check::NotBefore { other }, Some(v)) => {
                match (v.as_date(), record.get(other).and_then(FieldValue::as_date)) {
                    (Some(date), Some(earliest)) => date < earliest,
                    _ => false,
                }
            }
        };

        failed.then(|| self.message(schema, value))
    }

    fn message(&self, schema: &RecordSchema, value: Option<&FieldValue>) -> String {
        let template = self
            .rule
            .message
            .as_deref()
            .unwrap_or_else(|| self.rule.check.default_message());

        let mut message = template
            .replace("{field}", schema.label_of(&self.rule.field))
            .replace("{value}", &value.map(|v| v.to_string()).unwrap_or_default());

        match &self.rule.check {
            Check::MaxLength { max } => {
                message = message.replace("{max}", &max.to_string());
            }
            Check::Range { min, max } => {
                message = message
                    .replace("{min}", &min.map(|m| m.to_string()).unwrap_or_default())
                    .replace("{max}", &max.map(|m| m.to_string()).unwrap_or_default());
            }
            Check::OneOf { values } => {
                message = message.replace("{values}", &values.join(", "));
            }
            Check::NotEqual { other } | Check::NotBefore { other } => {
                message = message.replace("{other}", schema.label_of(other));
            }
            _ => {}
        }

        message
    }
}

/// Validate a record: implicit required checks, then the rule table.
///
/// Pure function of `(schema, record)`.
pub fn validate(schema: &RecordSchema, record: &ImportRecord) -> ValidationOutcome {
    let mut errors: Vec<String> = schema
        .fields()
        .iter()
        .filter(|f| f.required)
        .filter(|f| record.get(&f.name).map_or(true, FieldValue::is_empty))
        .map(|f| missing_required_message(f.label()))
        .collect();

    errors.extend(
        schema
            .rules()
            .iter()
            .filter_map(|rule| rule.evaluate(schema, record)),
    );

    ValidationOutcome::from_errors(errors)
}

/// Quick check: true when the record passes.
pub fn is_valid(schema: &RecordSchema, record: &ImportRecord) -> bool {
    validate(schema, record).is_pass()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FieldKind;
    use crate::schema::{FieldDescriptor, SchemaDefinition};
    use chrono::NaiveDate;

    fn schema() -> RecordSchema {
        RecordSchema::compile(SchemaDefinition {
            name: "transport-order".into(),
            description: String::new(),
            fields: vec![
                FieldDescriptor::new("order_number", FieldKind::Text)
                    .with_label("Order Number")
                    .required(),
                FieldDescriptor::new("from_yard_id", FieldKind::Integer).with_label("From Yard Id"),
                FieldDescriptor::new("to_yard_id", FieldKind::Integer).with_label("To Yard Id"),
                FieldDescriptor::new("pickup_date", FieldKind::Date).with_label("Pickup Date"),
                FieldDescriptor::new("delivery_date", FieldKind::Date).with_label("Delivery Date"),
                FieldDescriptor::new("priority", FieldKind::Code).with_label("Priority"),
                FieldDescriptor::new("distance_km", FieldKind::Decimal).with_label("Distance Km"),
            ],
            rules: vec![
                Rule::new("order_number", Check::MaxLength { max: 8 }),
                Rule::new(
                    "order_number",
                    Check::Pattern { pattern: "^[A-Za-z0-9 ]+$".into() },
                )
                .with_message("`{field}` may only contain letters, digits and spaces"),
                Rule::new("from_yard_id", Check::GreaterThanZero),
                Rule::new("to_yard_id", Check::NotEqual { other: "from_yard_id".into() }),
                Rule::new("delivery_date", Check::NotBefore { other: "pickup_date".into() }),
                Rule::new(
                    "priority",
                    Check::OneOf { values: vec!["LOW".into(), "NORMAL".into(), "HIGH".into()] },
                ),
                Rule::new("distance_km", Check::Range { min: Some(0.0), max: Some(5000.0) }),
            ],
        })
        .unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> FieldValue {
        FieldValue::Date(NaiveDate::from_ymd_opt(y, m, d).unwrap())
    }

    fn good_record(schema: &RecordSchema) -> ImportRecord {
        let mut record = schema.new_record();
        record.set("order_number", FieldValue::Text("TO 1001".into()));
        record.set("from_yard_id", FieldValue::Integer(1));
        record.set("to_yard_id", FieldValue::Integer(2));
        record.set("pickup_date", date(2024, 5, 1));
        record.set("delivery_date", date(2024, 5, 3));
        record.set("priority", FieldValue::Code("HIGH".into()));
        record.set("distance_km", FieldValue::Decimal(412.5));
        record
    }

    #[test]
    fn test_conforming_record_passes() {
        let schema = schema();
        assert!(is_valid(&schema, &good_record(&schema)));
    }

    #[test]
    fn test_absent_optional_values_pass() {
        let schema = schema();
        let mut record = schema.new_record();
        record.set("order_number", FieldValue::Text("A1".into()));
        assert_eq!(validate(&schema, &record), ValidationOutcome::Pass);
    }

    #[test]
    fn test_missing_required_names_field() {
        let schema = schema();
        let record = schema.new_record();
        let outcome = validate(&schema, &record);
        assert_eq!(
            outcome.errors(),
            ["missing required field `Order Number`".to_string()]
        );
    }

    #[test]
    fn test_pattern_rule_message() {
        let schema = schema();
        let mut record = good_record(&schema);
        record.set("order_number", FieldValue::Text("TO#1".into()));
        let outcome = validate(&schema, &record);
        assert_eq!(
            outcome.errors(),
            ["`Order Number` may only contain letters, digits and spaces".to_string()]
        );
    }

    #[test]
    fn test_collects_all_errors_in_rule_order() {
        let schema = schema();
        let mut record = good_record(&schema);
        record.set("order_number", FieldValue::Text("TOO-LONG-123".into()));
        record.set("from_yard_id", FieldValue::Integer(0));
        record.set("to_yard_id", FieldValue::Integer(0));
        record.set("delivery_date", date(2024, 4, 30));
        record.set("priority", FieldValue::Code("ASAP".into()));
        record.set("distance_km", FieldValue::Decimal(9000.0));

        let outcome = validate(&schema, &record);
        assert_eq!(
            outcome.errors(),
            [
                "`Order Number` must be at most 8 characters".to_string(),
                "`Order Number` may only contain letters, digits and spaces".to_string(),
                "`From Yard Id` must be greater than zero".to_string(),
                "`To Yard Id` must differ from `From Yard Id`".to_string(),
                "`Delivery Date` must not be before `Pickup Date`".to_string(),
                "`Priority` must be one of: LOW, NORMAL, HIGH".to_string(),
                "`Distance Km` must be between 0 and 5000".to_string(),
            ]
        );
    }

    #[test]
    fn test_range_bounds_are_inclusive() {
        let schema = schema();
        let mut record = good_record(&schema);
        record.set("distance_km", FieldValue::Decimal(5000.0));
        assert!(is_valid(&schema, &record));
        record.set("distance_km", FieldValue::Decimal(0.0));
        assert!(is_valid(&schema, &record));
        record.set("distance_km", FieldValue::Decimal(-0.5));
        assert!(!is_valid(&schema, &record));
    }

    #[test]
    fn test_one_of_is_case_insensitive() {
        let schema = schema();
        let mut record = good_record(&schema);
        record.set("priority", FieldValue::Code("normal".into()));
        assert!(is_valid(&schema, &record));
    }

    #[test]
    fn test_one_sided_range_messages() {
        let rule = Rule::new("distance_km", Check::Range { min: None, max: Some(10.0) });
        let schema = schema();
        let compiled = CompiledRule::compile(rule).unwrap();
        let mut record = good_record(&schema);
        record.set("distance_km", FieldValue::Decimal(11.0));
        assert_eq!(
            compiled.evaluate(&schema, &record).as_deref(),
            Some("`Distance Km` must be at most 10")
        );
    }

    #[test]
    fn test_check_json_shape() {
        let rule: Rule = serde_json::from_str(
            r#"{ "field": "priority", "check": { "type": "one_of", "values": ["LOW"] } }"#,
        )
        .unwrap();
        assert!(matches!(rule.check, Check::OneOf { .. }));
        assert!(rule.message.is_none());
    }
}
