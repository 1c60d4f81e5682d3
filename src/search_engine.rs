//! Search Engine contract (§6): the narrow set of operations the core
//! requires from the inverted-index service, plus a production HTTP client.

use crate::error::IndexSyncError;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

/// Everything Index Manager and Update Handler need from the Search Engine.
/// `delete_document` on a missing id must not be fatal (§6).
#[async_trait]
pub trait SearchEngine: Send + Sync {
    async fn index_exists(&self, name: &str) -> Result<bool, IndexSyncError>;

    async fn create_index(
        &self,
        name: &str,
        mappings: Option<&Value>,
        settings: Option<&Value>,
    ) -> Result<(), IndexSyncError>;

    async fn delete_index(&self, name: &str) -> Result<(), IndexSyncError>;

    async fn clear_index(&self, name: &str) -> Result<(), IndexSyncError>;

    async fn refresh_index(&self, name: &str) -> Result<(), IndexSyncError>;

    async fn upsert_document(&self, name: &str, id: &str, body: &Value) -> Result<(), IndexSyncError>;

    /// Must swallow "not found" as success (§6, §7).
    async fn delete_document(&self, name: &str, id: &str) -> Result<(), IndexSyncError>;
}

/// Production client for an Elasticsearch-compatible HTTP search engine.
pub struct HttpSearchEngine {
    client: reqwest::Client,
    base_url: String,
}

impl HttpSearchEngine {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client configuration is static and known-valid");
        HttpSearchEngine { client, base_url: base_url.into() }
    }

    fn index_url(&self, name: &str) -> String {
        format!("{}/{name}", self.base_url.trim_end_matches('/'))
    }

    fn document_url(&self, name: &str, id: &str) -> String {
        format!("{}/{name}/_doc/{id}", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl SearchEngine for HttpSearchEngine {
    async fn index_exists(&self, name: &str) -> Result<bool, IndexSyncError> {
        let resp = self.client.head(self.index_url(name)).send().await?;
        Ok(resp.status().is_success())
    }

    async fn create_index(
        &self,
        name: &str,
        mappings: Option<&Value>,
        settings: Option<&Value>,
    ) -> Result<(), IndexSyncError> {
        let mut body = serde_json::Map::new();
        if let Some(m) = mappings {
            body.insert("mappings".to_string(), m.clone());
        }
        if let Some(s) = settings {
            body.insert("settings".to_string(), s.clone());
        }
        let resp = self.client.put(self.index_url(name)).json(&Value::Object(body)).send().await?;
        if resp.status().is_success() || resp.status() == reqwest::StatusCode::BAD_REQUEST {
            // A 400 here is almost always "resource_already_exists_exception"; idempotent create.
            Ok(())
        } else {
            Err(IndexSyncError::Transport(format!("create_index {name} failed: {}", resp.status())))
        }
    }

    async fn delete_index(&self, name: &str) -> Result<(), IndexSyncError> {
        let resp = self.client.delete(self.index_url(name)).send().await?;
        if resp.status().is_success() || resp.status() == reqwest::StatusCode::NOT_FOUND {
            Ok(())
        } else {
            Err(IndexSyncError::Transport(format!("delete_index {name} failed: {}", resp.status())))
        }
    }

    async fn clear_index(&self, name: &str) -> Result<(), IndexSyncError> {
        let url = format!("{}/_delete_by_query", self.index_url(name));
        let resp = self.client.post(url).json(&serde_json::json!({ "query": { "match_all": {} } })).send().await?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(IndexSyncError::Transport(format!("clear_index {name} failed: {}", resp.status())))
        }
    }

    async fn refresh_index(&self, name: &str) -> Result<(), IndexSyncError> {
        let url = format!("{}/_refresh", self.index_url(name));
        let resp = self.client.post(url).send().await?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(IndexSyncError::Transport(format!("refresh_index {name} failed: {}", resp.status())))
        }
    }

    async fn upsert_document(&self, name: &str, id: &str, body: &Value) -> Result<(), IndexSyncError> {
        let resp = self.client.put(self.document_url(name, id)).json(body).send().await?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(IndexSyncError::Transport(format!("upsert_document {name}/{id} failed: {}", resp.status())))
        }
    }

    async fn delete_document(&self, name: &str, id: &str) -> Result<(), IndexSyncError> {
        let resp = self.client.delete(self.document_url(name, id)).send().await?;
        if resp.status().is_success() || resp.status() == reqwest::StatusCode::NOT_FOUND {
            Ok(())
        } else {
            Err(IndexSyncError::Transport(format!("delete_document {name}/{id} failed: {}", resp.status())))
        }
    }
}

/// Hermetic in-memory fake (§10.4): backs cross-module integration tests
/// with no real network I/O.
pub mod testing {
    use super::SearchEngine;
    use crate::error::IndexSyncError;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::Value;
    use std::collections::HashMap;

    #[derive(Default)]
    pub struct InMemorySearchEngine {
        indexes: Mutex<HashMap<String, HashMap<String, Value>>>,
    }

    impl InMemorySearchEngine {
        pub fn new() -> Self {
            InMemorySearchEngine::default()
        }

        pub fn document(&self, index: &str, id: &str) -> Option<Value> {
            self.indexes.lock().get(index).and_then(|docs| docs.get(id).cloned())
        }

        pub fn document_count(&self, index: &str) -> usize {
            self.indexes.lock().get(index).map_or(0, HashMap::len)
        }

        pub fn index_names(&self) -> Vec<String> {
            self.indexes.lock().keys().cloned().collect()
        }
    }

    #[async_trait]
    impl SearchEngine for InMemorySearchEngine {
        async fn index_exists(&self, name: &str) -> Result<bool, IndexSyncError> {
            Ok(self.indexes.lock().contains_key(name))
        }

        async fn create_index(
            &self,
            name: &str,
            _mappings: Option<&Value>,
            _settings: Option<&Value>,
        ) -> Result<(), IndexSyncError> {
            self.indexes.lock().entry(name.to_string()).or_default();
            Ok(())
        }

        async fn delete_index(&self, name: &str) -> Result<(), IndexSyncError> {
            self.indexes.lock().remove(name);
            Ok(())
        }

        async fn clear_index(&self, name: &str) -> Result<(), IndexSyncError> {
            if let Some(docs) = self.indexes.lock().get_mut(name) {
                docs.clear();
            }
            Ok(())
        }

        async fn refresh_index(&self, _name: &str) -> Result<(), IndexSyncError> {
            Ok(())
        }

        async fn upsert_document(&self, name: &str, id: &str, body: &Value) -> Result<(), IndexSyncError> {
            self.indexes.lock().entry(name.to_string()).or_default().insert(id.to_string(), body.clone());
            Ok(())
        }

        async fn delete_document(&self, name: &str, id: &str) -> Result<(), IndexSyncError> {
            if let Some(docs) = self.indexes.lock().get_mut(name) {
                docs.remove(id);
            }
            Ok(())
        }
    }
}
