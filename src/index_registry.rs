//! Index Registry (§4.4): the in-memory catalog of indexes keyed by
//! `(type_name, allowed_groups)`, persisted to the triplestore, owning the
//! per-index lifecycle state machine (§3 "Index", §5 "Locks").

use crate::auth_groups::AllowedGroups;
use crate::error::{IndexSyncError, IndexSyncResult};
use crate::gateway::TriplestoreGateway;
use crate::model::Term;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// `invalid ──ensure──▶ invalid`, `invalid ──update──▶ updating ──success──▶ valid`
/// (`└─fail──▶ invalid`), `valid ──invalidate──▶ invalid` (§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexStatus {
    Invalid,
    Updating,
    Valid,
}

/// One registered index: `(uri, name, type_name, allowed_groups, used_groups, status)` (§3).
/// Owns the mutex that serializes its own rebuilds (§5 "Per-Index mutex").
pub struct Index {
    pub uri: String,
    pub name: String,
    pub type_name: String,
    pub allowed_groups: AllowedGroups,
    pub used_groups: AllowedGroups,
    status: parking_lot::RwLock<IndexStatus>,
    pub rebuild_lock: tokio::sync::Mutex<()>,
}

impl Index {
    pub fn status(&self) -> IndexStatus {
        *self.status.read()
    }

    pub fn set_status(&self, status: IndexStatus) {
        *self.status.write() = status;
    }
}

/// Deterministic index name: a hash over `type_name` and the canonical
/// (sorted) serialization of `allowed_groups`. `used_groups` does not
/// participate (§3, §9 open question — mirrors the observed source behavior).
pub fn generate_index_name(type_name: &str, allowed_groups: &AllowedGroups) -> String {
    let mut hasher = Sha256::new();
    hasher.update(type_name.as_bytes());
    hasher.update(b"\0");
    hasher.update(allowed_groups.canonical_key().as_bytes());
    format!("{}-{:x}", type_name, hasher.finalize())
}

const SEARCH_GRAPH: &str = "http://mu.semte.ch/graphs/authorization";
const SEARCH_INDEX_TYPE: &str = "http://mu.semte.ch/vocabularies/search#ElasticsearchIndex";
const MU_UUID: &str = "http://mu.semte.ch/vocabularies/core/uuid";
const SEARCH_OBJECT_TYPE: &str = "http://mu.semte.ch/vocabularies/search#objectType";
const SEARCH_INDEX_NAME: &str = "http://mu.semte.ch/vocabularies/search#indexName";
const SEARCH_ALLOWED_GROUP: &str = "http://mu.semte.ch/vocabularies/search#hasAllowedGroup";
const SEARCH_USED_GROUP: &str = "http://mu.semte.ch/vocabularies/search#hasUsedGroup";

/// In-memory `type_name → (group_key → Index)` catalog. The registry mutex
/// guards only structural mutation (insert/remove); a rebuild in progress
/// never holds it (§5).
pub struct IndexRegistry {
    entries: parking_lot::Mutex<HashMap<String, HashMap<String, Arc<Index>>>>,
    gateway: Arc<dyn TriplestoreGateway>,
    persist_indexes: bool,
}

impl IndexRegistry {
    pub fn new(gateway: Arc<dyn TriplestoreGateway>, persist_indexes: bool) -> Self {
        IndexRegistry { entries: parking_lot::Mutex::new(HashMap::new()), gateway, persist_indexes }
    }

    pub fn get(&self, type_name: &str, allowed_groups: &AllowedGroups) -> Option<Arc<Index>> {
        self.entries.lock().get(type_name)?.get(&allowed_groups.canonical_key()).cloned()
    }

    /// All indexes currently registered for a type, regardless of group key.
    pub fn all_for_type(&self, type_name: &str) -> Vec<Arc<Index>> {
        self.entries.lock().get(type_name).map(|m| m.values().cloned().collect()).unwrap_or_default()
    }

    /// Ensures a cache entry exists, creating it (in state `invalid`) if absent.
    pub fn ensure_cache_entry(
        &self,
        type_name: &str,
        allowed_groups: &AllowedGroups,
        used_groups: &AllowedGroups,
    ) -> Arc<Index> {
        let key = allowed_groups.canonical_key();
        let mut entries = self.entries.lock();
        let by_group = entries.entry(type_name.to_string()).or_default();
        if let Some(existing) = by_group.get(&key) {
            return existing.clone();
        }
        let name = generate_index_name(type_name, allowed_groups);
        let index = Arc::new(Index {
            uri: format!("http://mu.semte.ch/services/search-index/{}", uuid::Uuid::new_v4()),
            name,
            type_name: type_name.to_string(),
            allowed_groups: allowed_groups.clone(),
            used_groups: used_groups.clone(),
            status: parking_lot::RwLock::new(IndexStatus::Invalid),
            rebuild_lock: tokio::sync::Mutex::new(()),
        });
        by_group.insert(key, index.clone());
        index
    }

    pub fn remove(&self, type_name: &str, allowed_groups: &AllowedGroups) -> Option<Arc<Index>> {
        let mut entries = self.entries.lock();
        let by_group = entries.get_mut(type_name)?;
        let removed = by_group.remove(&allowed_groups.canonical_key());
        if by_group.is_empty() {
            entries.remove(type_name);
        }
        removed
    }

    /// Loads every persisted index row from the triplestore into the cache,
    /// without touching Search-Engine state (§4.4 "initialize").
    pub async fn load_from_triplestore(&self) -> IndexSyncResult<()> {
        if !self.persist_indexes {
            return Ok(());
        }
        let query = format!(
            "SELECT DISTINCT ?index ?uuid ?type_name ?index_name WHERE {{
               GRAPH <{SEARCH_GRAPH}> {{
                 ?index a <{SEARCH_INDEX_TYPE}> ;
                        <{MU_UUID}> ?uuid ;
                        <{SEARCH_OBJECT_TYPE}> ?type_name ;
                        <{SEARCH_INDEX_NAME}> ?index_name .
               }}
             }}"
        );
        let rows = self.gateway.select_sudo(&query).await?;
        for row in rows {
            let (Some(index_uri), Some(type_name), Some(index_name)) =
                (row.get("index"), row.get("type_name"), row.get("index_name"))
            else {
                continue;
            };
            let (allowed_groups, used_groups) =
                self.load_groups_for(index_uri.value()).await.unwrap_or_default();
            let key = allowed_groups.canonical_key();
            let mut entries = self.entries.lock();
            let by_group = entries.entry(type_name.value().to_string()).or_default();
            by_group.entry(key).or_insert_with(|| {
                Arc::new(Index {
                    uri: index_uri.value().to_string(),
                    name: index_name.value().to_string(),
                    type_name: type_name.value().to_string(),
                    allowed_groups,
                    used_groups,
                    status: parking_lot::RwLock::new(IndexStatus::Invalid),
                    rebuild_lock: tokio::sync::Mutex::new(()),
                })
            });
        }
        debug!(count = self.entries.lock().values().map(HashMap::len).sum::<usize>(), "loaded index catalog");
        Ok(())
    }

    async fn load_groups_for(&self, index_uri: &str) -> IndexSyncResult<(AllowedGroups, AllowedGroups)> {
        let query = format!(
            "SELECT ?allowed ?used WHERE {{
               GRAPH <{SEARCH_GRAPH}> {{
                 OPTIONAL {{ <{index_uri}> <{SEARCH_ALLOWED_GROUP}> ?allowed . }}
                 OPTIONAL {{ <{index_uri}> <{SEARCH_USED_GROUP}> ?used . }}
               }}
             }}"
        );
        let rows = self.gateway.select_sudo(&query).await?;
        let mut allowed = Vec::new();
        let mut used = Vec::new();
        for row in rows {
            if let Some(v) = row.get("allowed") {
                if let Ok(g) = serde_json::from_str(v.value()) {
                    allowed.push(g);
                }
            }
            if let Some(v) = row.get("used") {
                if let Ok(g) = serde_json::from_str(v.value()) {
                    used.push(g);
                }
            }
        }
        Ok((AllowedGroups::new(allowed), AllowedGroups::new(used)))
    }

    /// Writes a catalog row for `index` under the authorization graph (§6).
    pub async fn persist(&self, index: &Index) -> IndexSyncResult<()> {
        if !self.persist_indexes {
            return Ok(());
        }
        let uuid = index
            .uri
            .rsplit('/')
            .next()
            .ok_or_else(|| IndexSyncError::Internal("index uri missing uuid segment".into()))?;
        let allowed_literals: String = index
            .allowed_groups
            .iter()
            .map(|g| format!("<{}> <{SEARCH_ALLOWED_GROUP}> {} .", index.uri, sparql_string(&serde_json::to_string(g)?)))
            .collect();
        let used_literals: String = index
            .used_groups
            .iter()
            .map(|g| format!("<{}> <{SEARCH_USED_GROUP}> {} .", index.uri, sparql_string(&serde_json::to_string(g)?)))
            .collect();
        let update = format!(
            "INSERT DATA {{ GRAPH <{SEARCH_GRAPH}> {{
               <{}> a <{SEARCH_INDEX_TYPE}> ;
                    <{MU_UUID}> {} ;
                    <{SEARCH_OBJECT_TYPE}> {} ;
                    <{SEARCH_INDEX_NAME}> {} .
               {allowed_literals} {used_literals}
             }} }}",
            index.uri,
            sparql_string(uuid),
            sparql_string(&index.type_name),
            sparql_string(&index.name),
        );
        self.gateway.update_sudo(&update).await
    }

    /// Removes a catalog row (§4.4 "remove_index").
    pub async fn unpersist(&self, index: &Index) -> IndexSyncResult<()> {
        if !self.persist_indexes {
            return Ok(());
        }
        let update = format!(
            "DELETE WHERE {{ GRAPH <{SEARCH_GRAPH}> {{ <{}> ?p ?o . }} }}",
            index.uri
        );
        self.gateway.update_sudo(&update).await
    }

    /// Removes every persisted index row (used when `persist_indexes` is
    /// false at startup, to clear stale state left by a previous run).
    pub async fn clear_persisted(&self) -> IndexSyncResult<Vec<(String, String)>> {
        let query = format!(
            "SELECT ?index ?index_name WHERE {{
               GRAPH <{SEARCH_GRAPH}> {{ ?index a <{SEARCH_INDEX_TYPE}> ; <{SEARCH_INDEX_NAME}> ?index_name . }}
             }}"
        );
        let rows = self.gateway.select_sudo(&query).await?;
        let mut removed = Vec::with_capacity(rows.len());
        for row in rows {
            let (Some(index_uri), Some(index_name)) = (row.get("index"), row.get("index_name")) else { continue };
            let delete = format!("DELETE WHERE {{ GRAPH <{SEARCH_GRAPH}> {{ <{}> ?p ?o . }} }}", index_uri.value());
            self.gateway.update_sudo(&delete).await?;
            removed.push((index_uri.value().to_string(), index_name.value().to_string()));
        }
        Ok(removed)
    }
}

fn sparql_string(s: &str) -> String {
    Term::plain_literal(s).to_sparql_term()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth_groups::GroupDescriptor;
    use crate::gateway::Bindings;
    use async_trait::async_trait;

    struct NullGateway;

    #[async_trait]
    impl TriplestoreGateway for NullGateway {
        async fn select_scoped(&self, _query: &str, _groups: &AllowedGroups) -> IndexSyncResult<Vec<Bindings>> {
            Ok(vec![])
        }
        async fn ask_scoped(&self, _query: &str, _groups: &AllowedGroups) -> IndexSyncResult<bool> {
            Ok(false)
        }
        async fn select_sudo(&self, _query: &str) -> IndexSyncResult<Vec<Bindings>> {
            Ok(vec![])
        }
        async fn update_sudo(&self, _query: &str) -> IndexSyncResult<()> {
            Ok(())
        }
    }

    #[test]
    fn index_name_is_permutation_independent() {
        let a = AllowedGroups::new(vec![GroupDescriptor::new("b"), GroupDescriptor::new("a")]);
        let b = AllowedGroups::new(vec![GroupDescriptor::new("a"), GroupDescriptor::new("b")]);
        assert_eq!(generate_index_name("document", &a), generate_index_name("document", &b));
    }

    #[test]
    fn index_name_differs_across_types() {
        let g = AllowedGroups::new(vec![GroupDescriptor::new("a")]);
        assert_ne!(generate_index_name("document", &g), generate_index_name("person", &g));
    }

    #[test]
    fn index_name_ignores_used_groups() {
        // `used_groups` is not an input to `generate_index_name` at all;
        // confirm two calls with identical args are stable regardless of
        // any caller-side used_groups bookkeeping.
        let g = AllowedGroups::new(vec![GroupDescriptor::new("a")]);
        assert_eq!(generate_index_name("document", &g), generate_index_name("document", &g));
    }

    #[test]
    fn ensure_cache_entry_starts_invalid_and_is_idempotent() {
        let gateway = Arc::new(NullGateway);
        let registry = IndexRegistry::new(gateway, false);
        let groups = AllowedGroups::new(vec![GroupDescriptor::new("a")]);
        let first = registry.ensure_cache_entry("document", &groups, &AllowedGroups::default());
        let second = registry.ensure_cache_entry("document", &groups, &AllowedGroups::default());
        assert_eq!(first.status(), IndexStatus::Invalid);
        assert!(Arc::ptr_eq(&first, &second));
    }
}
