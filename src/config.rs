//! Configuration System (§6 "Configuration (recognized keys)").
//!
//! Hierarchical loading from:
//! - config.toml (base configuration)
//! - config.local.toml (git-ignored local overrides)
//! - environment variables (`INDEXSYNC_*`, `__`-separated for nesting)

use crate::auth_groups::AllowedGroups;
use crate::model::TypeDefinition;
use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub triplestore: TriplestoreConfig,
    pub search_engine: SearchEngineConfig,
    pub text_extraction: TextExtractionConfig,
    pub indexing: IndexingConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// SPARQL 1.1 Query/Update endpoints (§6 "Triplestore protocol").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriplestoreConfig {
    pub query_endpoint: String,
    pub update_endpoint: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Search-Engine HTTP client settings (§6 "Search Engine contract").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchEngineConfig {
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Text Extractor client + cache settings (§4.3.3, §6 "Filesystem layout").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextExtractionConfig {
    pub endpoint: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    pub cache_base: PathBuf,
}

/// Everything the Config Model, Index Registry/Manager, and Update Handler
/// need (§6 "Configuration (recognized keys)").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingConfig {
    pub type_definitions: HashMap<String, TypeDefinition>,
    #[serde(default)]
    pub persist_indexes: bool,
    #[serde(default)]
    pub additive_indexes: bool,
    #[serde(default)]
    pub eager_indexing_groups: Vec<AllowedGroups>,
    #[serde(default = "default_number_of_threads")]
    pub number_of_threads: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_batches")]
    pub max_batches: usize,
    pub attachment_path_base: PathBuf,
    #[serde(default = "default_attachment_iri_scheme")]
    pub attachment_iri_scheme: String,
    #[serde(default)]
    pub default_index_settings: Option<serde_json::Value>,
    #[serde(default = "default_maximum_file_size")]
    pub maximum_file_size: u64,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_max_delta_body_bytes")]
    pub max_delta_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig { bind_address: default_bind_address(), max_delta_body_bytes: default_max_delta_body_bytes() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig { level: default_log_level(), format: default_log_format() }
    }
}

fn default_timeout_secs() -> u64 {
    30
}
fn default_number_of_threads() -> usize {
    num_cpus::get()
}
fn default_batch_size() -> usize {
    100
}
fn default_max_batches() -> usize {
    usize::MAX
}
fn default_attachment_iri_scheme() -> String {
    "share://".to_string()
}
fn default_maximum_file_size() -> u64 {
    20 * 1024 * 1024
}
fn default_queue_capacity() -> usize {
    10_000
}
fn default_worker_count() -> usize {
    num_cpus::get()
}
fn default_bind_address() -> String {
    "0.0.0.0:8080".to_string()
}
fn default_max_delta_body_bytes() -> usize {
    16 * 1024 * 1024
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "text".to_string()
}

impl Config {
    /// Merges, in order: `config.toml`, `config.local.toml`,
    /// `INDEXSYNC_*` environment variables (`__`-separated for nesting).
    pub fn load() -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file("config.toml"))
            .merge(Toml::file("config.local.toml"))
            .merge(Env::prefixed("INDEXSYNC_").split("__"))
            .extract()
    }

    pub fn from_file(path: &str) -> Result<Self, figment::Error> {
        Figment::new().merge(Toml::file(path)).merge(Env::prefixed("INDEXSYNC_").split("__")).extract()
    }
}

/// A runnable development configuration: single-threaded rebuilds,
/// `persist_indexes = false`, a local Elasticsearch and triplestore on
/// `localhost` (§10.1).
impl Default for Config {
    fn default() -> Self {
        Config {
            triplestore: TriplestoreConfig {
                query_endpoint: "http://localhost:8890/sparql".to_string(),
                update_endpoint: "http://localhost:8890/sparql".to_string(),
                timeout_secs: default_timeout_secs(),
            },
            search_engine: SearchEngineConfig {
                base_url: "http://localhost:9200".to_string(),
                timeout_secs: default_timeout_secs(),
            },
            text_extraction: TextExtractionConfig {
                endpoint: "http://localhost:8890/extract".to_string(),
                timeout_secs: default_timeout_secs(),
                cache_base: PathBuf::from("/tmp/indexsync-cache"),
            },
            indexing: IndexingConfig {
                type_definitions: HashMap::new(),
                persist_indexes: false,
                additive_indexes: false,
                eager_indexing_groups: Vec::new(),
                number_of_threads: 1,
                batch_size: default_batch_size(),
                max_batches: default_max_batches(),
                attachment_path_base: PathBuf::from("/tmp/indexsync-attachments"),
                attachment_iri_scheme: default_attachment_iri_scheme(),
                default_index_settings: None,
                maximum_file_size: default_maximum_file_size(),
                queue_capacity: default_queue_capacity(),
                worker_count: default_worker_count(),
            },
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_toml() -> &'static str {
        r#"
        [triplestore]
        query_endpoint = "http://db:8890/sparql"
        update_endpoint = "http://db:8890/sparql-auth"

        [search_engine]
        base_url = "http://search:9200"

        [text_extraction]
        endpoint = "http://extractor:8080"
        cache_base = "/data/cache"

        [indexing]
        attachment_path_base = "/data/attachments"
        "#
    }

    #[test]
    fn loads_minimal_config_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, minimal_toml()).unwrap();
        let config: Config = Config::from_file(path.to_str().unwrap()).unwrap();
        assert_eq!(config.triplestore.query_endpoint, "http://db:8890/sparql");
        assert!(!config.indexing.persist_indexes);
        assert!(!config.indexing.additive_indexes);
        assert_eq!(config.indexing.batch_size, 100);
        assert_eq!(config.indexing.maximum_file_size, 20 * 1024 * 1024);
        assert_eq!(config.server.bind_address, "0.0.0.0:8080");
    }

    #[test]
    fn env_override_splits_on_double_underscore() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, minimal_toml()).unwrap();
        std::env::set_var("INDEXSYNC_INDEXING__BATCH_SIZE", "7");
        let config: Config = Figment::new()
            .merge(Toml::file(path.to_str().unwrap()))
            .merge(Env::prefixed("INDEXSYNC_").split("__"))
            .extract()
            .unwrap();
        std::env::remove_var("INDEXSYNC_INDEXING__BATCH_SIZE");
        assert_eq!(config.indexing.batch_size, 7);
    }
}
