//! Document Builder (§4.3): given a resource URI, a property set, and an
//! authorization context, returns the structured document a Search-Engine
//! index should hold for that resource.

use crate::auth_groups::AllowedGroups;
use crate::error::{IndexSyncError, IndexSyncResult};
use crate::gateway::TriplestoreGateway;
use crate::model::{Literal, PropertyDefinition, PropertyPath, Term, TypeCatalog, TypeDefinition};
use crate::text_extract::CachedExtraction;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;

/// Implicit `uuid` field every built document gets unless the type
/// definition already declares one (§4.3 step 2).
const MU_UUID_PREDICATE: &str = "http://mu.semte.ch/vocabularies/core/uuid";

/// A built Search-Engine document: a flat or nested JSON object.
pub type Document = Map<String, Value>;

/// Collaborators and filesystem configuration the Document Builder needs for
/// attachment handling (§4.3, §6 "Filesystem layout").
pub struct DocumentBuilder {
    pub gateway: Arc<dyn TriplestoreGateway>,
    pub catalog: Arc<TypeCatalog>,
    pub extractor: Arc<dyn CachedExtraction>,
    pub attachment_base: PathBuf,
    pub maximum_file_size: u64,
    /// IRI scheme prefix stripped from an attachment IRI before joining it to
    /// `attachment_base` (e.g. `share://`).
    pub attachment_iri_scheme: String,
}

impl DocumentBuilder {
    /// `build(uri, index_definition, auth) → Document` (§4.3).
    pub async fn build(
        &self,
        uri: &str,
        type_def: &TypeDefinition,
        groups: &AllowedGroups,
    ) -> IndexSyncResult<Document> {
        if type_def.is_composite() {
            self.build_composite(uri, type_def, groups).await
        } else {
            self.build_properties(uri, &type_def.properties, groups).await
        }
    }

    async fn build_composite(
        &self,
        uri: &str,
        type_def: &TypeDefinition,
        groups: &AllowedGroups,
    ) -> IndexSyncResult<Document> {
        let resource_types = self.resource_rdf_types(uri, groups).await?;
        let mut merged: Value = Value::Null;
        for sub in self.catalog.composite_sub_definitions(&type_def.type_name) {
            if !sub.rdf_types.iter().any(|t| resource_types.contains(t)) {
                continue;
            }
            let sub_doc = self.build_properties(uri, &sub.properties, groups).await?;
            merged = smart_merge(merged, Value::Object(sub_doc))?;
        }
        match merged {
            Value::Object(map) => Ok(map),
            Value::Null => Ok(Document::new()),
            other => Err(IndexSyncError::Internal(format!("composite merge produced non-object: {other}"))),
        }
    }

    async fn resource_rdf_types(&self, uri: &str, groups: &AllowedGroups) -> IndexSyncResult<Vec<String>> {
        let query = format!("SELECT DISTINCT ?type WHERE {{ <{uri}> a ?type . }}");
        let rows = self.gateway.select_scoped(&query, groups).await?;
        Ok(rows.into_iter().filter_map(|row| row.get("type").map(Term::value).map(str::to_string)).collect())
    }

    async fn build_properties(
        &self,
        uri: &str,
        properties: &HashMap<String, PropertyDefinition>,
        groups: &AllowedGroups,
    ) -> IndexSyncResult<Document> {
        let mut doc = Document::new();
        for (field_name, def) in properties {
            let value = self.build_field(uri, def, groups).await?;
            doc.insert(field_name.clone(), value);
        }
        if !properties.contains_key("uuid") {
            let uuid_path = PropertyPath::new(vec![crate::model::PropertyStep::forward(MU_UUID_PREDICATE)]);
            let value = self.build_simple(uri, &uuid_path, groups).await?;
            doc.insert("uuid".to_string(), value);
        }
        Ok(doc)
    }

    async fn build_field(
        &self,
        uri: &str,
        def: &PropertyDefinition,
        groups: &AllowedGroups,
    ) -> IndexSyncResult<Value> {
        match def {
            PropertyDefinition::Simple { path } => self.build_simple(uri, path, groups).await,
            PropertyDefinition::LanguageString { path } => self.build_language_string(uri, path, groups).await,
            PropertyDefinition::Attachment { path } => self.build_attachment(uri, path, groups).await,
            PropertyDefinition::Nested { path, properties } => {
                self.build_nested(uri, path, properties, groups).await
            }
        }
    }

    async fn build_simple(&self, uri: &str, path: &PropertyPath, groups: &AllowedGroups) -> IndexSyncResult<Value> {
        let chain = path.to_sparql_chain(&format!("<{uri}>"), "?v");
        let query = format!("SELECT DISTINCT ?v WHERE {{ {chain} }}");
        let rows = self.gateway.select_scoped(&query, groups).await?;
        let values: Vec<Value> =
            rows.into_iter().filter_map(|row| row.get("v").map(|t| Value::from(t.coerce()))).collect();
        Ok(denumerate(values))
    }

    async fn build_language_string(
        &self,
        uri: &str,
        path: &PropertyPath,
        groups: &AllowedGroups,
    ) -> IndexSyncResult<Value> {
        let chain = path.to_sparql_chain(&format!("<{uri}>"), "?v");
        let query = format!("SELECT DISTINCT ?v ?lang WHERE {{ {chain} BIND(LANG(?v) AS ?lang) }}");
        let rows = self.gateway.select_scoped(&query, groups).await?;
        let mut buckets: HashMap<String, Vec<Value>> = HashMap::new();
        for row in rows {
            let Some(v) = row.get("v") else { continue };
            let lang = row
                .get("lang")
                .map(|t| t.value().to_string())
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "default".to_string());
            buckets.entry(lang).or_default().push(Value::from(v.coerce()));
        }
        let mut bucket_map = Map::new();
        for (lang, mut values) in buckets {
            values.dedup_by(|a, b| a == b);
            bucket_map.insert(lang, denumerate(values));
        }
        Ok(Value::Array(vec![Value::Object(bucket_map)]))
    }

    async fn build_attachment(
        &self,
        uri: &str,
        path: &PropertyPath,
        groups: &AllowedGroups,
    ) -> IndexSyncResult<Value> {
        let chain = path.to_sparql_chain(&format!("<{uri}>"), "?v");
        let query = format!("SELECT DISTINCT ?v WHERE {{ {chain} }}");
        let rows = self.gateway.select_scoped(&query, groups).await?;
        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let Some(file_iri) = row.get("v") else { continue };
            let content = self.extract_attachment_content(file_iri.value()).await;
            let mut entry = Map::new();
            entry.insert("content".to_string(), content.map(Value::from).unwrap_or(Value::Null));
            entries.push(Value::Object(entry));
        }
        Ok(denumerate(entries))
    }

    async fn extract_attachment_content(&self, file_iri: &str) -> Option<String> {
        let relative = file_iri.strip_prefix(self.attachment_iri_scheme.as_str()).unwrap_or(file_iri);
        let path = self.attachment_base.join(relative.trim_start_matches('/'));
        let metadata = match tokio::fs::metadata(&path).await {
            Ok(m) => m,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(error = %e, path = %path.display(), "failed to stat attachment");
                }
                return None;
            }
        };
        if metadata.len() > self.maximum_file_size {
            return None;
        }
        let bytes = match tokio::fs::read(&path).await {
            Ok(b) => b,
            Err(e) => {
                warn!(error = %e, path = %path.display(), "failed to read attachment");
                return None;
            }
        };
        self.extractor.extract_cached(&path, &bytes).await
    }

    async fn build_nested(
        &self,
        uri: &str,
        path: &PropertyPath,
        properties: &HashMap<String, PropertyDefinition>,
        groups: &AllowedGroups,
    ) -> IndexSyncResult<Value> {
        let chain = path.to_sparql_chain(&format!("<{uri}>"), "?v");
        let query = format!("SELECT DISTINCT ?v WHERE {{ {chain} }}");
        let rows = self.gateway.select_scoped(&query, groups).await?;
        let mut docs = Vec::with_capacity(rows.len());
        for row in rows {
            let Some(related) = row.get("v") else { continue };
            let related_uri = related.value();
            let mut sub_doc = Box::pin(self.build_properties(related_uri, properties, groups)).await?;
            sub_doc.insert("uri".to_string(), Value::from(related_uri.to_string()));
            docs.push(Value::Object(sub_doc));
        }
        Ok(denumerate(docs))
    }
}

/// `denumerate` (§4.3.2): empty list → null; singleton → the element;
/// otherwise the list unchanged.
pub fn denumerate(values: Vec<Value>) -> Value {
    match values.len() {
        0 => Value::Null,
        1 => values.into_iter().next().expect("length checked above"),
        _ => Value::Array(values),
    }
}

/// `smart_merge` (§4.3.1): recursive merge of two document maps/values.
pub fn smart_merge(a: Value, b: Value) -> IndexSyncResult<Value> {
    match (a, b) {
        (Value::Null, other) | (other, Value::Null) => Ok(other),
        (Value::Array(mut a_list), Value::Array(b_list)) => {
            a_list.extend(b_list);
            Ok(Value::Array(dedup_values(a_list)))
        }
        (Value::Array(mut list), scalar @ (Value::String(_) | Value::Number(_) | Value::Bool(_))) => {
            list.push(scalar);
            Ok(Value::Array(dedup_values(list)))
        }
        (scalar @ (Value::String(_) | Value::Number(_) | Value::Bool(_)), Value::Array(mut list)) => {
            list.insert(0, scalar);
            Ok(Value::Array(dedup_values(list)))
        }
        (Value::Object(a_map), Value::Object(b_map)) => {
            let mut merged = a_map;
            for (key, b_val) in b_map {
                let next = match merged.remove(&key) {
                    Some(a_val) => smart_merge(a_val, b_val)?,
                    None => b_val,
                };
                merged.insert(key, next);
            }
            Ok(Value::Object(merged))
        }
        (a_scalar, b_scalar) if is_scalar(&a_scalar) && is_scalar(&b_scalar) => {
            if a_scalar == b_scalar {
                Ok(a_scalar)
            } else {
                Ok(Value::Array(vec![a_scalar, b_scalar]))
            }
        }
        (a_other, b_other) => Err(IndexSyncError::MergeConflict {
            field: String::new(),
            left: a_other.to_string(),
            right: b_other.to_string(),
        }),
    }
}

fn is_scalar(v: &Value) -> bool {
    matches!(v, Value::String(_) | Value::Number(_) | Value::Bool(_))
}

fn dedup_values(values: Vec<Value>) -> Vec<Value> {
    let mut out: Vec<Value> = Vec::with_capacity(values.len());
    for v in values {
        if !out.contains(&v) {
            out.push(v);
        }
    }
    out
}
