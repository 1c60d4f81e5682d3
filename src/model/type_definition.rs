//! Config Model (§4.1): typed view of index definitions — types, rdf_type(s),
//! property paths, and nested/composite/language/attachment property kinds.

use super::property_path::PropertyPath;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single field's mapping from an RDF shape to a document value (§3 "Property Definition").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PropertyDefinition {
    Simple {
        path: PropertyPath,
    },
    LanguageString {
        path: PropertyPath,
    },
    Attachment {
        path: PropertyPath,
    },
    Nested {
        path: PropertyPath,
        properties: HashMap<String, PropertyDefinition>,
    },
}

impl PropertyDefinition {
    pub fn path(&self) -> &PropertyPath {
        match self {
            PropertyDefinition::Simple { path }
            | PropertyDefinition::LanguageString { path }
            | PropertyDefinition::Attachment { path }
            | PropertyDefinition::Nested { path, .. } => path,
        }
    }

    pub fn nested_properties(&self) -> Option<&HashMap<String, PropertyDefinition>> {
        match self {
            PropertyDefinition::Nested { properties, .. } => Some(properties),
            _ => None,
        }
    }
}

/// One indexed type: a relation between RDF types, a flat/nested property map,
/// and (for composite indexes) the sibling types it fuses with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeDefinition {
    pub type_name: String,
    pub rdf_types: Vec<String>,
    pub properties: HashMap<String, PropertyDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub composite_types: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mappings: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<serde_json::Value>,
}

impl TypeDefinition {
    pub fn is_composite(&self) -> bool {
        self.composite_types.as_ref().is_some_and(|c| !c.is_empty())
    }
}

/// All flattened property paths reachable from `properties`: for `nested`
/// properties, the parent path is composed with every path reachable in the
/// nested property map, recursively (§4.1 "full_property_paths_for").
pub fn flatten_paths(properties: &HashMap<String, PropertyDefinition>) -> Vec<PropertyPath> {
    let mut paths = Vec::new();
    for def in properties.values() {
        match def {
            PropertyDefinition::Nested { path, properties: inner } => {
                for sub_path in flatten_paths(inner) {
                    paths.push(path.concat(&sub_path));
                }
                // A nested property with no sub-paths still contributes its own path.
                if inner.is_empty() {
                    paths.push(path.clone());
                }
            }
            other => paths.push(other.path().clone()),
        }
    }
    paths
}

/// The in-memory catalog of all configured type definitions (§4.1).
#[derive(Debug, Clone, Default)]
pub struct TypeCatalog {
    pub definitions: HashMap<String, TypeDefinition>,
}

impl TypeCatalog {
    pub fn new(definitions: HashMap<String, TypeDefinition>) -> Self {
        TypeCatalog { definitions }
    }

    pub fn get(&self, type_name: &str) -> Option<&TypeDefinition> {
        self.definitions.get(type_name)
    }

    /// All flattened property paths for a type, composing sub-definitions for
    /// composite indexes.
    pub fn full_property_paths_for(&self, type_name: &str) -> Vec<PropertyPath> {
        let Some(def) = self.get(type_name) else { return Vec::new() };
        if def.is_composite() {
            self.composite_sub_definitions(type_name)
                .into_iter()
                .flat_map(|sub| flatten_paths(&sub.properties))
                .collect()
        } else {
            flatten_paths(&def.properties)
        }
    }

    /// True if `iri` is one of this type's `rdf_types` (§4.1 "matches_type?").
    pub fn matches_type(&self, type_name: &str, iri: &str) -> bool {
        self.related_rdf_types(type_name).iter().any(|t| t == iri)
    }

    /// True if `iri` (forward) or `^iri` (inverse) appears at any position in
    /// any flattened property path (§4.1 "matches_property?").
    pub fn matches_property(&self, type_name: &str, iri: &str) -> bool {
        self.full_property_paths_for(type_name)
            .iter()
            .any(|p| p.contains(iri))
    }

    /// All flattened paths containing `iri` at any position.
    pub fn paths_containing(&self, type_name: &str, iri: &str) -> Vec<PropertyPath> {
        self.full_property_paths_for(type_name)
            .into_iter()
            .filter(|p| p.contains(iri))
            .collect()
    }

    /// The rdf_types considered authoritative for this type's membership:
    /// its own `rdf_types`, unioned over sub-definitions for a composite index.
    pub fn related_rdf_types(&self, type_name: &str) -> Vec<String> {
        let Some(def) = self.get(type_name) else { return Vec::new() };
        if def.is_composite() {
            let mut out: Vec<String> = Vec::new();
            for sub in self.composite_sub_definitions(type_name) {
                for t in &sub.rdf_types {
                    if !out.contains(t) {
                        out.push(t.clone());
                    }
                }
            }
            out
        } else {
            def.rdf_types.clone()
        }
    }

    pub fn is_composite_index(&self, type_name: &str) -> bool {
        self.get(type_name).is_some_and(TypeDefinition::is_composite)
    }

    /// The sub-definitions fused by a composite index, in declared order.
    pub fn composite_sub_definitions(&self, type_name: &str) -> Vec<&TypeDefinition> {
        let Some(def) = self.get(type_name) else { return Vec::new() };
        let Some(sub_names) = &def.composite_types else { return Vec::new() };
        sub_names.iter().filter_map(|n| self.get(n)).collect()
    }

    /// All type_names whose `rdf_types` include `iri` (used for `rdf:type` delta triples).
    pub fn type_names_for_rdf_type(&self, iri: &str) -> Vec<String> {
        self.definitions
            .keys()
            .filter(|name| self.related_rdf_types(name).iter().any(|t| t == iri))
            .cloned()
            .collect()
    }

    /// All type_names whose flattened property paths mention `predicate` (forward or inverse).
    pub fn type_names_for_property(&self, predicate: &str) -> Vec<String> {
        self.definitions
            .keys()
            .filter(|name| self.matches_property(name, predicate))
            .cloned()
            .collect()
    }
}
