//! Schema Registry - Built-in and on-disk record schemas
//!
//! The built-in schemas are embedded at compile time. Extra schemas can be
//! loaded from a directory of `*.json` files; a file whose schema name
//! matches a built-in one replaces it.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use once_cell::sync::Lazy;

use crate::api::logs::{log_success, log_warning};
use crate::error::{SchemaError, SchemaResult};
use crate::schema::RecordSchema;

const VEHICLE_SCHEMA: &str = include_str!("../../schemas/vehicle.json");
const YARD_LOCATION_SCHEMA: &str = include_str!("../../schemas/yard-location.json");
const TRANSPORT_ORDER_SCHEMA: &str = include_str!("../../schemas/transport-order.json");

static BUILTIN: Lazy<SchemaRegistry> = Lazy::new(|| {
    let mut registry = SchemaRegistry::empty();
    for json in [VEHICLE_SCHEMA, YARD_LOCATION_SCHEMA, TRANSPORT_ORDER_SCHEMA] {
        registry.register(RecordSchema::from_json(json).expect("Invalid embedded schema"));
    }
    registry
});

/// Compiled schemas by name.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: BTreeMap<String, Arc<RecordSchema>>,
}

impl SchemaRegistry {
    /// Registry with no schema at all.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The embedded schemas.
    pub fn builtin() -> &'static SchemaRegistry {
        &BUILTIN
    }

    /// Built-in schemas plus every schema in `dir`.
    pub fn with_dir(dir: impl AsRef<Path>) -> SchemaResult<Self> {
        let mut registry = Self::builtin().clone();
        registry.load_dir(dir)?;
        Ok(registry)
    }

    /// Load every `*.json` schema in a directory.
    ///
    /// A missing directory loads nothing. An invalid schema file is an error.
    pub fn load_dir(&mut self, dir: impl AsRef<Path>) -> SchemaResult<usize> {
        let dir = dir.as_ref();
        if !dir.exists() {
            log_warning(format!("Schema directory {} not found", dir.display()));
            return Ok(0);
        }

        let mut paths: Vec<_> = fs::read_dir(dir)?
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|e| e == "json"))
            .collect();
        paths.sort();

        for path in &paths {
            let content = fs::read_to_string(path)?;
            let schema = RecordSchema::from_json(&content)?;
            log_success(format!("Loaded schema '{}' from {}", schema.name(), path.display()));
            self.register(schema);
        }

        Ok(paths.len())
    }

    /// Add or replace a schema.
    pub fn register(&mut self, schema: RecordSchema) {
        self.schemas.insert(schema.name().to_string(), Arc::new(schema));
    }

    pub fn get(&self, name: &str) -> Option<Arc<RecordSchema>> {
        self.schemas.get(name).cloned()
    }

    /// Like [`get`](Self::get), but unknown names are an error.
    pub fn require(&self, name: &str) -> SchemaResult<Arc<RecordSchema>> {
        self.get(name).ok_or_else(|| SchemaError::NotFound(name.to_string()))
    }

    /// All schemas, sorted by name.
    pub fn list(&self) -> Vec<Arc<RecordSchema>> {
        self.schemas.values().cloned().collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.schemas.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}
