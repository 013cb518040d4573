//! Record schemas: field descriptors plus a declarative rule table.
//!
//! A schema is written as JSON (see `schemas/`), deserialized into a
//! [`SchemaDefinition`] and compiled once into a [`RecordSchema`]. Compiling
//! checks that rule fields exist, that no two fields share a normalized
//! header, and builds every regex up front so validation never fails on a
//! bad pattern.
//!
//! ```json
//! {
//!   "name": "vehicle",
//!   "fields": [
//!     { "name": "vin", "label": "VIN", "kind": "text", "required": true },
//!     { "name": "yard_id", "label": "Yard Id", "kind": "integer", "required": true }
//!   ],
//!   "rules": [
//!     { "field": "yard_id", "check": { "type": "greater_than_zero" } }
//!   ]
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{SchemaError, SchemaResult};
use crate::models::{FieldKind, ImportRecord, ValidationOutcome};
use crate::transform::mapper::normalize_header;
use crate::validation::{self, CompiledRule, Rule};

/// Static description of one record field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDescriptor {
    /// Technical name, used as the JSON key downstream.
    pub name: String,
    /// Display name used for headers and messages (defaults to `name`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub kind: FieldKind,
    #[serde(default)]
    pub required: bool,
    /// Other header spellings accepted when matching by header.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            label: None,
            kind,
            required: false,
            aliases: Vec::new(),
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    pub fn label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.name)
    }

    /// Every normalized spelling that maps onto this field.
    pub fn normalized_names(&self) -> Vec<String> {
        let mut names = vec![normalize_header(&self.name), normalize_header(self.label())];
        names.extend(self.aliases.iter().map(|a| normalize_header(a)));
        names.dedup();
        names
    }

    /// Whether an already-normalized header refers to this field.
    pub fn matches_header(&self, normalized: &str) -> bool {
        self.normalized_names().iter().any(|n| n == normalized)
    }
}

/// Serializable form of a schema, as stored in JSON files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub fields: Vec<FieldDescriptor>,
    #[serde(default)]
    pub rules: Vec<Rule>,
}

/// A compiled, read-only record schema.
#[derive(Debug)]
pub struct RecordSchema {
    name: String,
    description: String,
    fields: Vec<FieldDescriptor>,
    rules: Vec<CompiledRule>,
}

impl RecordSchema {
    /// Check and compile a definition.
    pub fn compile(definition: SchemaDefinition) -> SchemaResult<Self> {
        if definition.fields.is_empty() {
            return Err(SchemaError::NoFields(definition.name));
        }

        let mut seen: HashMap<String, &str> = HashMap::new();
        for field in &definition.fields {
            for normalized in field.normalized_names() {
                if let Some(owner) = seen.insert(normalized, &field.name) {
                    if owner != field.name {
                        return Err(SchemaError::DuplicateField {
                            schema: definition.name.clone(),
                            field: field.name.clone(),
                        });
                    }
                }
            }
        }

        let known = |name: &str| definition.fields.iter().any(|f| f.name == name);
        let rules = definition
            .rules
            .iter()
            .map(|rule| {
                for referenced in rule.referenced_fields() {
                    if !known(referenced) {
                        return Err(SchemaError::UnknownField {
                            rule_field: rule.field.clone(),
                            field: referenced.to_string(),
                        });
                    }
                }
                CompiledRule::compile(rule.clone())
            })
            .collect::<SchemaResult<Vec<_>>>()?;

        Ok(Self {
            name: definition.name,
            description: definition.description,
            fields: definition.fields,
            rules,
        })
    }

    /// Deserialize and compile a JSON schema.
    pub fn from_json(json: &str) -> SchemaResult<Self> {
        let definition: SchemaDefinition = serde_json::from_str(json)?;
        Self::compile(definition)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Field descriptors in declaration order.
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Display label of a field, falling back to the raw name.
    pub fn label_of<'a>(&'a self, name: &'a str) -> &'a str {
        self.field(name).map(FieldDescriptor::label).unwrap_or(name)
    }

    pub fn rules(&self) -> &[CompiledRule] {
        &self.rules
    }

    /// Empty record with one slot per field.
    pub fn new_record(&self) -> ImportRecord {
        ImportRecord::new(&self.name, self.fields.iter().map(|f| f.name.as_str()))
    }

    /// Validate a record against this schema's rule table.
    pub fn validate(&self, record: &ImportRecord) -> ValidationOutcome {
        validation::validate(self, record)
    }

    /// Serializable view, used for listings.
    pub fn definition(&self) -> SchemaDefinition {
        SchemaDefinition {
            name: self.name.clone(),
            description: self.description.clone(),
            fields: self.fields.clone(),
            rules: self.rules.iter().map(|r| r.rule().clone()).collect(),
        }
    }
}
