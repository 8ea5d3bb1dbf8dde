//! Parsed descriptor documents.
//!
//! A descriptor document has two halves: `datastore`, which declares the table name, field schema and
//! restricted fields, and `api`, which declares the per-verb policy.  Change detection is driven by a
//! checksum over the `datastore.schema` value only; flipping a verb's `secured` flag deliberately does not
//! invalidate the model checksum.
use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde::Deserialize;
use sha2::{Digest, Sha256};

/// Reasons a descriptor document can be rejected.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum DescriptorError {
    #[error("{origin}: descriptor is missing '{path}'")]
    MissingPath { origin: String, path: &'static str },

    #[error("{origin}: '{path}' is malformed: {message}")]
    Malformed {
        origin: String,
        path: &'static str,
        message: String,
    },

    #[error("{origin}: api.methods[0] declares no verbs")]
    NoVerbs { origin: String },
}

/// The HTTP verbs a descriptor may declare policy for.
#[derive(Copy, Clone, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub enum Verb {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Verb {
    fn from_key(key: &str) -> Option<Verb> {
        Some(match key {
            "get" => Verb::Get,
            "post" => Verb::Post,
            "put" => Verb::Put,
            "patch" => Verb::Patch,
            "delete" => Verb::Delete,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Get => "get",
            Verb::Post => "post",
            Verb::Put => "put",
            Verb::Patch => "patch",
            Verb::Delete => "delete",
        }
    }
}

/// Per-verb enable/secure flags, plus the grants the identity provider is expected to check.
///
/// The engine carries these as plain data; enforcement belongs to the serving layer.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
pub struct VerbRule {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub secured: bool,
    #[serde(default)]
    pub grants: Vec<String>,
}

/// A custom sub-resource (many-to-many glue).  Carried as data only; the engine never interprets it.
#[derive(Clone, Debug, Deserialize)]
pub struct CustomResource {
    pub resource: String,
    #[serde(default)]
    pub methods: serde_json::Value,
}

/// The per-verb API policy from `api.methods[0]`.
#[derive(Clone, Debug, Default)]
pub struct ApiPolicy {
    verbs: BTreeMap<Verb, VerbRule>,
    custom: Vec<CustomResource>,
}

impl ApiPolicy {
    fn parse(methods: &serde_json::Value, source: &str) -> Result<ApiPolicy, DescriptorError> {
        let object = methods
            .as_object()
            .ok_or_else(|| DescriptorError::Malformed {
                origin: source.to_string(),
                path: "api.methods[0]",
                message: "expected an object".to_string(),
            })?;

        let mut verbs = BTreeMap::new();
        let mut custom = vec![];
        for (key, value) in object {
            if key == "custom" {
                custom = serde_json::from_value(value.clone()).map_err(|e| {
                    DescriptorError::Malformed {
                        origin: source.to_string(),
                        path: "api.methods[0].custom",
                        message: e.to_string(),
                    }
                })?;
                continue;
            }

            match Verb::from_key(key) {
                Some(verb) => {
                    let rule = serde_json::from_value(value.clone()).map_err(|e| {
                        DescriptorError::Malformed {
                            origin: source.to_string(),
                            path: "api.methods[0]",
                            message: format!("{}: {}", key, e),
                        }
                    })?;
                    verbs.insert(verb, rule);
                }
                None => {
                    log::debug!("{}: ignoring unknown method key '{}'", source, key);
                }
            }
        }

        if verbs.is_empty() {
            return Err(DescriptorError::NoVerbs {
                origin: source.to_string(),
            });
        }

        Ok(ApiPolicy { verbs, custom })
    }

    pub fn rule(&self, verb: Verb) -> Option<&VerbRule> {
        self.verbs.get(&verb)
    }

    /// Whether the verb is declared and enabled.
    pub fn is_enabled(&self, verb: Verb) -> bool {
        self.rule(verb).map(|r| r.enabled).unwrap_or(false)
    }

    /// Whether the verb requires authentication.  Undeclared verbs report secured, erring closed.
    pub fn is_secured(&self, verb: Verb) -> bool {
        self.rule(verb).map(|r| r.secured).unwrap_or(true)
    }

    pub fn iter_verbs(&self) -> impl Iterator<Item = (Verb, &VerbRule)> {
        self.verbs.iter().map(|(v, r)| (*v, r))
    }

    pub fn iter_custom(&self) -> impl Iterator<Item = &CustomResource> {
        self.custom.iter()
    }
}

/// Extra constraints on a field.  Only `required` matters to the engine.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct Constraints {
    #[serde(default)]
    pub required: bool,
}

/// One field of the table schema.
#[derive(Clone, Debug, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub constraints: Constraints,
}

impl FieldSpec {
    /// A field is required if either the top-level flag or the constraints block says so.
    pub fn is_required(&self) -> bool {
        self.required || self.constraints.required
    }
}

/// A foreign key declaration: which local fields reference which fields of another resource.
#[derive(Clone, Debug, Deserialize)]
pub struct ForeignKeySpec {
    #[serde(deserialize_with = "one_or_many")]
    pub fields: Vec<String>,
    pub reference: ForeignKeyReference,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ForeignKeyReference {
    pub resource: String,
    #[serde(deserialize_with = "one_or_many")]
    pub fields: Vec<String>,
}

/// The typed view of `datastore.schema`.
#[derive(Clone, Debug, Deserialize)]
pub struct TableSchema {
    pub fields: Vec<FieldSpec>,
    #[serde(rename = "primaryKey", default, deserialize_with = "one_or_many")]
    pub primary_key: Vec<String>,
    #[serde(rename = "foreignKeys", default)]
    pub foreign_keys: Vec<ForeignKeySpec>,
}

/// The schema allows either a single string or a list wherever field names appear.
fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) => vec![s],
        OneOrMany::Many(v) => v,
    })
}

/// A validated, read-only view over one descriptor document.
///
/// Constructed fresh on every reconciliation pass and never mutated.  The original document is retained
/// verbatim so it can be persisted alongside the checksum and replayed after a restart.
#[derive(Clone, Debug)]
pub struct Descriptor {
    table_name: String,
    resource_name: String,
    schema: TableSchema,
    api_policy: ApiPolicy,
    restricted_fields: Vec<String>,
    source_identifier: String,
    document: serde_json::Value,
    checksum: String,
}

impl Descriptor {
    /// Parse and validate a descriptor document.
    ///
    /// `source_identifier` is the file name for file-loaded descriptors; pass `""` for inline documents
    /// and one will be synthesized from the table name.
    pub fn parse(
        document: &serde_json::Value,
        source_identifier: &str,
    ) -> Result<Descriptor, DescriptorError> {
        let source = if source_identifier.is_empty() {
            "<inline>".to_string()
        } else {
            source_identifier.to_string()
        };

        let table_name = document
            .pointer("/datastore/tablename")
            .and_then(|v| v.as_str())
            .ok_or_else(|| DescriptorError::MissingPath {
                origin: source.clone(),
                path: "datastore.tablename",
            })?
            .to_string();

        let schema_value =
            document
                .pointer("/datastore/schema")
                .ok_or_else(|| DescriptorError::MissingPath {
                    origin: source.clone(),
                    path: "datastore.schema",
                })?;
        let schema: TableSchema =
            serde_json::from_value(schema_value.clone()).map_err(|e| DescriptorError::Malformed {
                origin: source.clone(),
                path: "datastore.schema",
                message: e.to_string(),
            })?;

        let resource_name = document
            .pointer("/api/resource")
            .and_then(|v| v.as_str())
            .ok_or_else(|| DescriptorError::MissingPath {
                origin: source.clone(),
                path: "api.resource",
            })?
            .to_string();

        let methods =
            document
                .pointer("/api/methods/0")
                .ok_or_else(|| DescriptorError::MissingPath {
                    origin: source.clone(),
                    path: "api.methods[0]",
                })?;
        let api_policy = ApiPolicy::parse(methods, &source)?;

        let restricted_fields = match document.pointer("/datastore/restricted_fields") {
            None => vec![],
            Some(v) => {
                serde_json::from_value(v.clone()).map_err(|e| DescriptorError::Malformed {
                    origin: source.clone(),
                    path: "datastore.restricted_fields",
                    message: e.to_string(),
                })?
            }
        };

        let checksum = schema_checksum(schema_value).map_err(|e| DescriptorError::Malformed {
            origin: source.clone(),
            path: "datastore.schema",
            message: format!("canonical serialization failed: {}", e),
        })?;

        let source_identifier = if source_identifier.is_empty() {
            format!("{}.json", table_name)
        } else {
            source_identifier.to_string()
        };

        Ok(Descriptor {
            table_name,
            resource_name,
            schema,
            api_policy,
            restricted_fields,
            source_identifier,
            document: document.clone(),
            checksum,
        })
    }

    pub fn get_table_name(&self) -> &str {
        &self.table_name
    }

    pub fn get_resource_name(&self) -> &str {
        &self.resource_name
    }

    pub fn get_schema(&self) -> &TableSchema {
        &self.schema
    }

    pub fn get_api_policy(&self) -> &ApiPolicy {
        &self.api_policy
    }

    pub fn get_restricted_fields(&self) -> &[String] {
        &self.restricted_fields
    }

    /// File name this descriptor was loaded from, or `<tablename>.json` for inline descriptors.
    pub fn get_source_identifier(&self) -> &str {
        &self.source_identifier
    }

    /// The raw document, as persisted next to the checksum for replay.
    pub fn get_document(&self) -> &serde_json::Value {
        &self.document
    }

    /// Hex digest of the canonical field schema.  Stable across key ordering, calls and restarts.
    pub fn checksum(&self) -> &str {
        &self.checksum
    }
}

/// SHA-256 over the RFC 8785 canonical serialization of the schema value.
fn schema_checksum(schema_value: &serde_json::Value) -> Result<String, serde_json::Error> {
    let canonical = serde_jcs::to_string(schema_value)?;
    let digest = Sha256::digest(canonical.as_bytes());

    let mut checksum = String::with_capacity(64);
    for byte in digest {
        // Writing to a String can't fail.
        let _ = write!(checksum, "{:02x}", byte);
    }
    Ok(checksum)
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn credentials_doc() -> serde_json::Value {
        serde_json::json!({
            "api": {
                "resource": "credentials",
                "methods": [{
                    "get": {"enabled": true, "secured": false, "grants": []},
                    "post": {"enabled": true, "secured": true, "grants": ["admin"]}
                }]
            },
            "datastore": {
                "tablename": "credentials",
                "restricted_fields": ["secret"],
                "schema": {
                    "fields": [
                        {"name": "id", "type": "integer", "required": true},
                        {"name": "credential_name", "type": "string", "required": true}
                    ],
                    "primaryKey": "id"
                }
            }
        })
    }

    #[test]
    fn parses_a_valid_document() {
        let descriptor = Descriptor::parse(&credentials_doc(), "credentials.json").unwrap();
        assert_eq!(descriptor.get_table_name(), "credentials");
        assert_eq!(descriptor.get_resource_name(), "credentials");
        assert_eq!(descriptor.get_source_identifier(), "credentials.json");
        assert_eq!(descriptor.get_restricted_fields(), &["secret".to_string()]);
        assert_eq!(descriptor.get_schema().fields.len(), 2);
        assert_eq!(descriptor.get_schema().primary_key, vec!["id".to_string()]);
        assert!(descriptor.get_api_policy().is_enabled(Verb::Get));
        assert!(!descriptor.get_api_policy().is_secured(Verb::Get));
        assert!(descriptor.get_api_policy().is_secured(Verb::Post));
        // Undeclared verbs err closed.
        assert!(!descriptor.get_api_policy().is_enabled(Verb::Delete));
        assert!(descriptor.get_api_policy().is_secured(Verb::Delete));
    }

    #[test]
    fn inline_documents_get_a_synthesized_source() {
        let descriptor = Descriptor::parse(&credentials_doc(), "").unwrap();
        assert_eq!(descriptor.get_source_identifier(), "credentials.json");
    }

    #[test]
    fn missing_tablename_is_an_error() {
        let mut doc = credentials_doc();
        doc.pointer_mut("/datastore")
            .unwrap()
            .as_object_mut()
            .unwrap()
            .remove("tablename");
        let err = Descriptor::parse(&doc, "x.json").unwrap_err();
        assert!(matches!(
            err,
            DescriptorError::MissingPath {
                path: "datastore.tablename",
                ..
            }
        ));
    }

    #[test]
    fn errors_name_the_originating_file() {
        let err = Descriptor::parse(&serde_json::json!({}), "broken.json").unwrap_err();
        assert!(err.to_string().starts_with("broken.json:"));

        let err = Descriptor::parse(&serde_json::json!({}), "").unwrap_err();
        assert!(err.to_string().starts_with("<inline>:"));
    }

    #[test]
    fn missing_schema_is_an_error() {
        let mut doc = credentials_doc();
        doc.pointer_mut("/datastore")
            .unwrap()
            .as_object_mut()
            .unwrap()
            .remove("schema");
        assert!(Descriptor::parse(&doc, "x.json").is_err());
    }

    #[test]
    fn no_verbs_is_an_error() {
        let mut doc = credentials_doc();
        *doc.pointer_mut("/api/methods/0").unwrap() = serde_json::json!({"custom": []});
        let err = Descriptor::parse(&doc, "x.json").unwrap_err();
        assert!(matches!(err, DescriptorError::NoVerbs { .. }));
    }

    #[test]
    fn restricted_fields_default_to_empty() {
        let mut doc = credentials_doc();
        doc.pointer_mut("/datastore")
            .unwrap()
            .as_object_mut()
            .unwrap()
            .remove("restricted_fields");
        let descriptor = Descriptor::parse(&doc, "x.json").unwrap();
        assert!(descriptor.get_restricted_fields().is_empty());
    }

    #[test]
    fn primary_key_accepts_a_list() {
        let mut doc = credentials_doc();
        *doc.pointer_mut("/datastore/schema/primaryKey").unwrap() = serde_json::json!(["id"]);
        let descriptor = Descriptor::parse(&doc, "x.json").unwrap();
        assert_eq!(descriptor.get_schema().primary_key, vec!["id".to_string()]);
    }

    #[test]
    fn checksum_ignores_textual_key_order() {
        let a: serde_json::Value = serde_json::from_str(
            r#"{"fields": [{"name": "id", "type": "integer", "required": true}], "primaryKey": "id"}"#,
        )
        .unwrap();
        let b: serde_json::Value = serde_json::from_str(
            r#"{"primaryKey": "id", "fields": [{"required": true, "type": "integer", "name": "id"}]}"#,
        )
        .unwrap();
        assert_eq!(
            schema_checksum(&a).unwrap(),
            schema_checksum(&b).unwrap()
        );
    }

    #[test]
    fn checksum_covers_the_schema_only() {
        let base = Descriptor::parse(&credentials_doc(), "x.json").unwrap();

        // Flipping a verb flag must not move the checksum.
        let mut policy_changed = credentials_doc();
        *policy_changed
            .pointer_mut("/api/methods/0/get/secured")
            .unwrap() = serde_json::json!(true);
        let policy_changed = Descriptor::parse(&policy_changed, "x.json").unwrap();
        assert_eq!(base.checksum(), policy_changed.checksum());

        // Adding a field must.
        let mut field_added = credentials_doc();
        field_added
            .pointer_mut("/datastore/schema/fields")
            .unwrap()
            .as_array_mut()
            .unwrap()
            .push(serde_json::json!({"name": "issuer", "type": "string"}));
        let field_added = Descriptor::parse(&field_added, "x.json").unwrap();
        assert_ne!(base.checksum(), field_added.checksum());
    }

    fn field_type_strategy() -> impl Strategy<Value = &'static str> {
        prop_oneof![
            Just("string"),
            Just("integer"),
            Just("number"),
            Just("boolean"),
            Just("datetime"),
        ]
    }

    proptest! {
        /// Same schema in, same checksum out, across repeated parses.
        #[test]
        fn checksum_is_deterministic(
            specs in proptest::collection::vec((field_type_strategy(), any::<bool>()), 1..8)
        ) {
            let fields: Vec<serde_json::Value> = specs
                .iter()
                .enumerate()
                .map(|(i, (field_type, required))| {
                    serde_json::json!({"name": format!("f{}", i), "type": field_type, "required": required})
                })
                .collect();
            let doc = serde_json::json!({
                "api": {"resource": "things", "methods": [{"get": {"enabled": true, "secured": false, "grants": []}}]},
                "datastore": {"tablename": "things", "schema": {"fields": fields, "primaryKey": "f0"}}
            });

            let first = Descriptor::parse(&doc, "things.json").unwrap();
            let reparsed: serde_json::Value =
                serde_json::from_str(&serde_json::to_string(&doc).unwrap()).unwrap();
            let second = Descriptor::parse(&reparsed, "things.json").unwrap();
            prop_assert_eq!(first.checksum(), second.checksum());
        }
    }
}
