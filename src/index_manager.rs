//! Index Manager (§4.4): creates/ensures/removes indexes in the registry and
//! Search Engine, and orchestrates full rebuilds.

use crate::auth_groups::AllowedGroups;
use crate::document_builder::DocumentBuilder;
use crate::error::{IndexSyncError, IndexSyncResult};
use crate::index_registry::{Index, IndexRegistry, IndexStatus};
use crate::model::TypeCatalog;
use crate::search_engine::SearchEngine;
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Rebuild throughput controls (§6 "Configuration (recognized keys)").
#[derive(Debug, Clone, Copy)]
pub struct RebuildLimits {
    pub number_of_threads: usize,
    pub batch_size: usize,
    pub max_batches: usize,
}

impl Default for RebuildLimits {
    fn default() -> Self {
        RebuildLimits { number_of_threads: 4, batch_size: 100, max_batches: usize::MAX }
    }
}

pub struct IndexManager {
    pub registry: Arc<IndexRegistry>,
    search_engine: Arc<dyn SearchEngine>,
    document_builder: Arc<DocumentBuilder>,
    catalog: Arc<TypeCatalog>,
    additive_indexes: bool,
    limits: RebuildLimits,
    default_index_settings: Option<Value>,
}

impl IndexManager {
    pub fn new(
        registry: Arc<IndexRegistry>,
        search_engine: Arc<dyn SearchEngine>,
        document_builder: Arc<DocumentBuilder>,
        catalog: Arc<TypeCatalog>,
        additive_indexes: bool,
        limits: RebuildLimits,
        default_index_settings: Option<Value>,
    ) -> Self {
        IndexManager { registry, search_engine, document_builder, catalog, additive_indexes, limits, default_index_settings }
    }

    /// §4.4 "initialize": loads or clears persisted catalog state, then
    /// eagerly ensures and rebuilds every `eager_indexing_groups × type_definitions` pair.
    pub async fn initialize(&self, persist_indexes: bool, eager_indexing_groups: &[AllowedGroups]) -> IndexSyncResult<()> {
        if persist_indexes {
            self.registry.load_from_triplestore().await?;
        } else {
            let removed = self.registry.clear_persisted().await?;
            for (_, index_name) in &removed {
                if let Err(e) = self.search_engine.delete_index(index_name).await {
                    warn!(error = %e, index = %index_name, "failed to delete stale search-engine index at startup");
                }
            }
        }

        for type_name in self.catalog.definitions.keys() {
            for groups in eager_indexing_groups {
                let index = self.ensure_index(type_name, groups, &AllowedGroups::default()).await?;
                if index.status() != IndexStatus::Valid {
                    self.update(&index).await;
                }
            }
        }
        Ok(())
    }

    /// §4.4 "Ensure": compute the canonical name, ensure a catalog row, a
    /// cache entry, and a Search-Engine index exist.
    pub async fn ensure_index(
        &self,
        type_name: &str,
        allowed_groups: &AllowedGroups,
        used_groups: &AllowedGroups,
    ) -> IndexSyncResult<Arc<Index>> {
        let index = self.registry.ensure_cache_entry(type_name, allowed_groups, used_groups);
        self.registry.persist(&index).await?;

        if !self.search_engine.index_exists(&index.name).await? {
            let type_def = self.catalog.get(type_name);
            let mappings = type_def.and_then(|d| d.mappings.as_ref());
            let settings = type_def
                .and_then(|d| d.settings.as_ref())
                .or(self.default_index_settings.as_ref());
            self.search_engine.create_index(&index.name, mappings, settings).await?;
        }
        Ok(index)
    }

    /// §4.4 "fetch_indexes_for": the set of indexes a given type/scope maps
    /// to, each refreshed to `valid` or reported `invalid`.
    pub async fn fetch_indexes_for(
        &self,
        type_name: &str,
        allowed_groups: &AllowedGroups,
        used_groups: &AllowedGroups,
    ) -> IndexSyncResult<Vec<Arc<Index>>> {
        let group_sets = if self.additive_indexes {
            allowed_groups.singleton_subsets()
        } else {
            vec![allowed_groups.clone()]
        };

        let mut indexes = Vec::with_capacity(group_sets.len());
        for groups in group_sets {
            let index = self.ensure_index(type_name, &groups, used_groups).await?;
            if index.status() != IndexStatus::Valid {
                self.update(&index).await;
            }
            indexes.push(index);
        }
        Ok(indexes)
    }

    /// §4.4 "remove_index": deletes the catalog entry and the underlying
    /// Search-Engine index.
    pub async fn remove_index(&self, type_name: &str, allowed_groups: &AllowedGroups) -> IndexSyncResult<()> {
        let Some(index) = self.registry.remove(type_name, allowed_groups) else {
            return Ok(());
        };
        self.registry.unpersist(&index).await?;
        self.search_engine.delete_index(&index.name).await
    }

    /// §4.4 "Update": under the per-index mutex, `invalid → updating`, clear
    /// the Search-Engine index, full-rebuild, refresh, `updating → valid`.
    /// Any failure leaves the index `invalid` and logs (§7).
    pub async fn update(&self, index: &Arc<Index>) {
        let _guard = index.rebuild_lock.lock().await;
        if index.status() == IndexStatus::Valid {
            return;
        }
        index.set_status(IndexStatus::Updating);

        match self.rebuild(index).await {
            Ok(count) => {
                index.set_status(IndexStatus::Valid);
                info!(index = %index.name, type_name = %index.type_name, documents = count, "rebuild complete");
            }
            Err(e) => {
                index.set_status(IndexStatus::Invalid);
                error!(index = %index.name, type_name = %index.type_name, error = %e, "rebuild failed");
            }
        }
    }

    async fn rebuild(&self, index: &Arc<Index>) -> IndexSyncResult<usize> {
        self.search_engine.clear_index(&index.name).await?;

        let Some(type_def) = self.catalog.get(&index.type_name) else {
            return Err(IndexSyncError::Config(format!("unknown type_name: {}", index.type_name)));
        };
        let rdf_types = self.catalog.related_rdf_types(&index.type_name);
        if rdf_types.is_empty() {
            return Err(IndexSyncError::Config(format!("type {} has no rdf_types", index.type_name)));
        }

        let resources = self.fetch_resources(&rdf_types, &index.allowed_groups).await?;
        let mut indexed = 0usize;
        for (batch_num, chunk) in resources.chunks(self.limits.batch_size.max(1)).enumerate() {
            if batch_num >= self.limits.max_batches {
                warn!(
                    index = %index.name,
                    max_batches = self.limits.max_batches,
                    remaining = resources.len() - indexed,
                    "rebuild truncated at configured max_batches"
                );
                break;
            }
            self.rebuild_batch(chunk, type_def, index, &mut indexed).await?;
        }
        self.search_engine.refresh_index(&index.name).await?;
        Ok(indexed)
    }

    async fn rebuild_batch(
        &self,
        resources: &[String],
        type_def: &crate::model::TypeDefinition,
        index: &Arc<Index>,
        indexed: &mut usize,
    ) -> IndexSyncResult<()> {
        let semaphore = Arc::new(tokio::sync::Semaphore::new(self.limits.number_of_threads.max(1)));
        let mut tasks = Vec::with_capacity(resources.len());
        for uri in resources {
            let permit = semaphore.clone().acquire_owned().await.map_err(|e| IndexSyncError::Internal(e.to_string()))?;
            let builder = self.document_builder.clone();
            let type_def = type_def.clone();
            let groups = index.allowed_groups.clone();
            let uri = uri.clone();
            tasks.push(tokio::spawn(async move {
                let _permit = permit;
                let doc = builder.build(&uri, &type_def, &groups).await;
                (uri, doc)
            }));
        }

        for task in tasks {
            let (uri, result) = task.await.map_err(|e| IndexSyncError::Internal(e.to_string()))?;
            match result {
                Ok(doc) => {
                    self.search_engine.upsert_document(&index.name, &uri, &Value::Object(doc)).await?;
                    *indexed += 1;
                }
                Err(e) => {
                    // A single document's failure does not abort the rebuild (§7).
                    warn!(uri = %uri, error = %e, "skipping document during rebuild");
                }
            }
        }
        Ok(())
    }

    async fn fetch_resources(&self, rdf_types: &[String], groups: &AllowedGroups) -> IndexSyncResult<Vec<String>> {
        let values = rdf_types.iter().map(|t| format!("<{t}>")).collect::<Vec<_>>().join(" ");
        let query = format!("SELECT DISTINCT ?s WHERE {{ ?s a ?type . FILTER(?type IN ({values})) }}");
        let rows = self.document_builder.gateway.select_scoped(&query, groups).await?;
        Ok(rows.into_iter().filter_map(|row| row.get("s").map(|t| t.value().to_string())).collect())
    }
}
