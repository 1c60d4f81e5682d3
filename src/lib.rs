//! # indexsync
//!
//! Keeps a full-text search index (the Search Engine) continuously
//! consistent with an RDF triplestore by observing delta messages and
//! mirroring their effect into per-type, per-authorization-group search
//! indexes. Also supports rebuilding an index from scratch on demand.
//!
//! ## Pipeline
//!
//! ```text
//! Delta message
//!     -> Delta Router          maps triples to affected (type, subject) pairs
//!     -> Update Handler        coalescing queue + worker pool
//!     -> Index Registry        resolves the index set for (type, groups)
//!     -> Document Builder      rebuilds the document under each index's auth
//!     -> Search Engine         upsert/delete
//! ```
//!
//! Index lifecycle and full rebuilds are owned by the Index Manager, backed
//! by the Index Registry's in-memory catalog (persisted to the triplestore
//! when configured).
//!
//! ## Module organization
//!
//! | Module | Responsibility |
//! |---|---|
//! | [`model`] | RDF terms, triples, property paths, type definitions |
//! | [`auth_groups`] | Authorization-group sets and their canonical form |
//! | [`config`] | Typed, figment-layered configuration |
//! | [`error`] | Crate-wide error enum |
//! | [`gateway`] | Triplestore SPARQL access (scoped + sudo) |
//! | [`search_engine`] | Search-Engine client contract |
//! | [`text_extract`] | Attachment text extraction + cache |
//! | [`document_builder`] | Resource -> structured document |
//! | [`index_registry`] | Index catalog + lifecycle state machine |
//! | [`index_manager`] | Index creation, rebuilds, removal |
//! | [`delta_router`] | Delta message -> update jobs |
//! | [`update_handler`] | Coalescing queue + worker pool |

pub mod auth_groups;
pub mod config;
pub mod delta_router;
pub mod document_builder;
pub mod error;
pub mod gateway;
pub mod index_manager;
pub mod index_registry;
pub mod logging;
pub mod model;
pub mod search_engine;
pub mod text_extract;
pub mod update_handler;

use std::sync::Arc;

use auth_groups::AllowedGroups;
use config::Config;
use document_builder::DocumentBuilder;
use error::IndexSyncResult;
use gateway::{HttpSparqlGateway, TriplestoreGateway};
use index_manager::{IndexManager, RebuildLimits};
use index_registry::IndexRegistry;
use model::TypeCatalog;
use search_engine::{HttpSearchEngine, SearchEngine};
use text_extract::{CachedExtraction, CachingExtractor, HttpTextExtractor};
use update_handler::{CoalescingQueue, UpdateHandler};

/// Every collaborator the delta-driven pipeline needs, wired from a loaded
/// [`Config`]. This is the composition root the process binary, and
/// hermetic integration tests that substitute fakes for `gateway` and
/// `search_engine`, both build on.
pub struct Pipeline {
    pub config: Config,
    pub catalog: Arc<TypeCatalog>,
    pub gateway: Arc<dyn TriplestoreGateway>,
    pub search_engine: Arc<dyn SearchEngine>,
    pub document_builder: Arc<DocumentBuilder>,
    pub registry: Arc<IndexRegistry>,
    pub index_manager: Arc<IndexManager>,
    pub update_handler: Arc<UpdateHandler>,
}

impl Pipeline {
    /// Wires the production collaborators (HTTP triplestore gateway, HTTP
    /// Search-Engine client, HTTP text extractor behind a filesystem cache)
    /// from a loaded [`Config`] (§10.5 "Process bootstrap").
    pub fn from_config(config: Config) -> Self {
        let catalog = Arc::new(TypeCatalog::new(config.indexing.type_definitions.clone()));

        let gateway: Arc<dyn TriplestoreGateway> = Arc::new(HttpSparqlGateway::new(
            config.triplestore.query_endpoint.clone(),
            config.triplestore.update_endpoint.clone(),
            std::time::Duration::from_secs(config.triplestore.timeout_secs),
        ));

        let search_engine: Arc<dyn SearchEngine> = Arc::new(HttpSearchEngine::new(
            config.search_engine.base_url.clone(),
            std::time::Duration::from_secs(config.search_engine.timeout_secs),
        ));

        let extractor_impl = HttpTextExtractor::new(
            config.text_extraction.endpoint.clone(),
            std::time::Duration::from_secs(config.text_extraction.timeout_secs),
        );
        let extractor: Arc<dyn CachedExtraction> =
            Arc::new(CachingExtractor::new(extractor_impl, config.text_extraction.cache_base.clone()));

        let document_builder = Arc::new(DocumentBuilder {
            gateway: gateway.clone(),
            catalog: catalog.clone(),
            extractor,
            attachment_base: config.indexing.attachment_path_base.clone(),
            maximum_file_size: config.indexing.maximum_file_size,
            attachment_iri_scheme: config.indexing.attachment_iri_scheme.clone(),
        });

        let registry = Arc::new(IndexRegistry::new(gateway.clone(), config.indexing.persist_indexes));

        let limits = RebuildLimits {
            number_of_threads: config.indexing.number_of_threads,
            batch_size: config.indexing.batch_size,
            max_batches: config.indexing.max_batches,
        };
        let index_manager = Arc::new(IndexManager::new(
            registry.clone(),
            search_engine.clone(),
            document_builder.clone(),
            catalog.clone(),
            config.indexing.additive_indexes,
            limits,
            config.indexing.default_index_settings.clone(),
        ));

        let queue = Arc::new(CoalescingQueue::new(config.indexing.queue_capacity));
        let update_handler = Arc::new(UpdateHandler::new(
            queue,
            index_manager.clone(),
            document_builder.clone(),
            search_engine.clone(),
            gateway.clone(),
            catalog.clone(),
            config.indexing.worker_count,
        ));

        Pipeline { config, catalog, gateway, search_engine, document_builder, registry, index_manager, update_handler }
    }

    /// §4.4 "initialize": loads or clears the persisted catalog, then
    /// eagerly ensures and rebuilds `eager_indexing_groups x type_definitions`.
    pub async fn initialize(&self) -> IndexSyncResult<()> {
        let eager: Vec<AllowedGroups> = self.config.indexing.eager_indexing_groups.clone();
        self.index_manager.initialize(self.config.indexing.persist_indexes, &eager).await
    }

    /// Spawns the Update Handler's worker pool. Returns the join handles so
    /// the caller can await them during shutdown.
    pub fn spawn_workers(&self) -> Vec<tokio::task::JoinHandle<()>> {
        self.update_handler.spawn_workers()
    }

    /// Parses a delta message and routes each triple to an Update Job,
    /// enqueuing every job onto the coalescing queue (§4.5, §4.6).
    pub async fn ingest_delta(&self, delta: &model::DeltaMessage) {
        let jobs = delta_router::route_delta(delta, &self.catalog, self.gateway.as_ref()).await;
        for job in jobs {
            self.update_handler.queue.enqueue(job).await;
        }
    }
}
