//! The model registry.
use std::collections::HashMap;

use anyhow::Result;

use dres_descriptor::{ApiPolicy, Descriptor};

use crate::ModelDefinition;

/// Everything the serving layer needs to know about one reconciled table.
#[derive(Clone, Debug)]
pub struct ModelEntry {
    model: ModelDefinition,
    api_policy: ApiPolicy,
    restricted_fields: Vec<String>,
}

impl ModelEntry {
    pub fn get_model(&self) -> &ModelDefinition {
        &self.model
    }

    pub fn get_api_policy(&self) -> &ApiPolicy {
        &self.api_policy
    }

    pub fn get_restricted_fields(&self) -> &[String] {
        &self.restricted_fields
    }
}

/// An explicit registry of synthesized models, keyed by table name.
///
/// One instance is owned by the reconciliation engine and injected wherever models are needed; there is
/// deliberately no process-global registry to fall back on, which keeps concurrent engine instances (and
/// tests) isolated from each other.
#[derive(Debug, Default)]
pub struct ModelRegistry {
    entries: HashMap<String, ModelEntry>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Default::default()
    }

    /// Synthesize the model for a descriptor and (re)register it, replacing any previous entry for the
    /// same table.  Safe to call repeatedly with identical input; returns the synthesized model.
    pub fn register(&mut self, descriptor: &Descriptor) -> Result<ModelDefinition> {
        let model = ModelDefinition::synthesize(descriptor)?;
        self.entries.insert(
            descriptor.get_table_name().to_string(),
            ModelEntry {
                model: model.clone(),
                api_policy: descriptor.get_api_policy().clone(),
                restricted_fields: descriptor.get_restricted_fields().to_vec(),
            },
        );
        Ok(model)
    }

    pub fn get(&self, table_name: &str) -> Option<&ModelEntry> {
        self.entries.get(table_name)
    }

    pub fn contains(&self, table_name: &str) -> bool {
        self.entries.contains_key(table_name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ModelEntry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Table names in sorted order, for deterministic logging.
    pub fn table_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.keys().map(|k| k.as_str()).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use dres_descriptor::Verb;
    use pretty_assertions::assert_eq;

    fn descriptor(table: &str, secured: bool) -> Descriptor {
        let doc = serde_json::json!({
            "api": {"resource": table, "methods": [{"get": {"enabled": true, "secured": secured, "grants": []}}]},
            "datastore": {
                "tablename": table,
                "restricted_fields": ["internal_notes"],
                "schema": {
                    "fields": [{"name": "id", "type": "integer"}],
                    "primaryKey": "id"
                }
            }
        });
        Descriptor::parse(&doc, "").expect("Descriptor should parse")
    }

    #[test]
    fn registers_and_exposes_policy() {
        let mut registry = ModelRegistry::new();
        registry.register(&descriptor("providers", false)).unwrap();

        assert!(registry.contains("providers"));
        let entry = registry.get("providers").unwrap();
        assert_eq!(entry.get_model().get_table_name(), "providers");
        assert!(!entry.get_api_policy().is_secured(Verb::Get));
        assert_eq!(
            entry.get_restricted_fields(),
            &["internal_notes".to_string()]
        );
    }

    #[test]
    fn reregistration_replaces_the_entry() {
        let mut registry = ModelRegistry::new();
        registry.register(&descriptor("providers", false)).unwrap();
        registry.register(&descriptor("providers", true)).unwrap();

        assert_eq!(registry.len(), 1);
        let entry = registry.get("providers").unwrap();
        assert!(entry.get_api_policy().is_secured(Verb::Get));
    }

    #[test]
    fn table_names_are_sorted() {
        let mut registry = ModelRegistry::new();
        registry.register(&descriptor("zebras", false)).unwrap();
        registry.register(&descriptor("apples", false)).unwrap();
        assert_eq!(registry.table_names(), vec!["apples", "zebras"]);
    }
}
