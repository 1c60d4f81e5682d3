//! Error kinds for the delta-driven index maintenance pipeline (§7).

/// The core error type threaded through the Triplestore Gateway, Document
/// Builder, Index Registry/Manager, Delta Router, and Update Handler.
#[derive(Debug, thiserror::Error)]
pub enum IndexSyncError {
    /// Fatal at startup; not retried.
    #[error("config error: {0}")]
    Config(String),

    /// Network/protocol failure talking to the triplestore or Search Engine.
    /// Retried at Update Handler granularity with bounded backoff.
    #[error("transport error: {0}")]
    Transport(String),

    /// The server rejected the query itself (malformed SPARQL, 4xx/5xx body).
    #[error("query error: {0}")]
    Query(String),

    /// Missing or invalid authorization-group scope on a scoped query.
    #[error("auth error: {0}")]
    Auth(String),

    /// Search-Engine reported the target document/index as absent.
    #[error("not found: {0}")]
    NotFound(String),

    /// Smart-merge encountered two incompatible values for the same key.
    #[error("merge conflict on field {field}: {left} vs {right}")]
    MergeConflict { field: String, left: String, right: String },

    /// The external text extractor failed or returned malformed output.
    #[error("extractor error: {0}")]
    Extractor(String),

    /// Catch-all for invariant violations that should never surface to a caller.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<reqwest::Error> for IndexSyncError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_status() {
            IndexSyncError::Query(e.to_string())
        } else {
            IndexSyncError::Transport(e.to_string())
        }
    }
}

impl From<serde_json::Error> for IndexSyncError {
    fn from(e: serde_json::Error) -> Self {
        IndexSyncError::Internal(format!("json: {e}"))
    }
}

impl From<std::io::Error> for IndexSyncError {
    fn from(e: std::io::Error) -> Self {
        IndexSyncError::Internal(format!("io: {e}"))
    }
}

pub type IndexSyncResult<T> = Result<T, IndexSyncError>;
