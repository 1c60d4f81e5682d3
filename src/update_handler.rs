//! Update Handler (§4.6): a bounded coalescing queue plus a worker pool that
//! turns `(subject, type_name, op)` jobs into Document Builder calls and
//! Search-Engine writes.

use crate::delta_router::{JobOp, UpdateJob};
use crate::document_builder::DocumentBuilder;
use crate::gateway::TriplestoreGateway;
use crate::index_manager::IndexManager;
use crate::index_registry::Index;
use crate::model::TypeCatalog;
use crate::search_engine::SearchEngine;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};
use tracing::{error, warn};

type QueueKey = (String, String);

struct QueueState {
    order: VecDeque<QueueKey>,
    pending: HashMap<QueueKey, UpdateJob>,
}

/// Bounded FIFO-on-first-enqueue queue that collapses duplicate
/// `(subject, type_name)` keys, last-writer-wins at dequeue time (§4.6, §9).
pub struct CoalescingQueue {
    state: Mutex<QueueState>,
    capacity: usize,
    item_ready: Notify,
    capacity_freed: Notify,
}

impl CoalescingQueue {
    pub fn new(capacity: usize) -> Self {
        CoalescingQueue {
            state: Mutex::new(QueueState { order: VecDeque::new(), pending: HashMap::new() }),
            capacity: capacity.max(1),
            item_ready: Notify::new(),
            capacity_freed: Notify::new(),
        }
    }

    /// Blocks when the queue is at capacity and `job`'s key is not already
    /// pending (§5 "Backpressure"). Enqueuing an existing key only updates
    /// its op, never growing the queue or moving it in FIFO order (§9).
    pub async fn enqueue(&self, job: UpdateJob) {
        let key = (job.subject_iri.clone(), job.type_name.clone());
        loop {
            let mut state = self.state.lock().await;
            if state.pending.contains_key(&key) {
                state.pending.insert(key, job);
                drop(state);
                self.item_ready.notify_one();
                return;
            }
            if state.order.len() >= self.capacity {
                drop(state);
                self.capacity_freed.notified().await;
                continue;
            }
            state.order.push_back(key.clone());
            state.pending.insert(key, job);
            drop(state);
            self.item_ready.notify_one();
            return;
        }
    }

    pub async fn dequeue(&self) -> UpdateJob {
        loop {
            {
                let mut state = self.state.lock().await;
                if let Some(key) = state.order.pop_front() {
                    let job = state.pending.remove(&key).expect("order and pending are kept in sync");
                    drop(state);
                    self.capacity_freed.notify_waiters();
                    return job;
                }
            }
            self.item_ready.notified().await;
        }
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.order.len()
    }
}

/// Coalescing queue + worker pool (§4.6). Workers run independently; jobs for
/// distinct keys may complete out of order across them (§5 "Ordering").
pub struct UpdateHandler {
    pub queue: Arc<CoalescingQueue>,
    index_manager: Arc<IndexManager>,
    document_builder: Arc<DocumentBuilder>,
    search_engine: Arc<dyn SearchEngine>,
    gateway: Arc<dyn TriplestoreGateway>,
    catalog: Arc<TypeCatalog>,
    worker_count: usize,
}

impl UpdateHandler {
    pub fn new(
        queue: Arc<CoalescingQueue>,
        index_manager: Arc<IndexManager>,
        document_builder: Arc<DocumentBuilder>,
        search_engine: Arc<dyn SearchEngine>,
        gateway: Arc<dyn TriplestoreGateway>,
        catalog: Arc<TypeCatalog>,
        worker_count: usize,
    ) -> Self {
        UpdateHandler { queue, index_manager, document_builder, search_engine, gateway, catalog, worker_count: worker_count.max(1) }
    }

    /// Spawns the worker pool; each worker loops until the handle is dropped.
    pub fn spawn_workers(self: &Arc<Self>) -> Vec<tokio::task::JoinHandle<()>> {
        (0..self.worker_count)
            .map(|id| {
                let this = self.clone();
                tokio::spawn(async move { this.worker_loop(id).await })
            })
            .collect()
    }

    async fn worker_loop(&self, _worker_id: usize) {
        loop {
            let job = self.queue.dequeue().await;
            self.process_job(&job).await;
        }
    }

    async fn process_job(&self, job: &UpdateJob) {
        let indexes = self.index_manager.registry.all_for_type(&job.type_name);
        for index in indexes {
            self.apply_to_index(job, &index).await;
        }
    }

    async fn apply_to_index(&self, job: &UpdateJob, index: &Arc<Index>) {
        let Some(type_def) = self.catalog.get(&job.type_name) else {
            warn!(type_name = %job.type_name, "update job references unknown type_name");
            return;
        };
        let rdf_types = self.catalog.related_rdf_types(&job.type_name);
        let type_filter = rdf_types.iter().map(|t| format!("<{t}>")).collect::<Vec<_>>().join(" ");
        let ask_query = format!("ASK {{ <{}> a ?type . FILTER(?type IN ({type_filter})) }}", job.subject_iri);

        let exists = match self.gateway.ask_scoped(&ask_query, &index.allowed_groups).await {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, subject = %job.subject_iri, index = %index.name, "existence check failed, skipping job for this index");
                return;
            }
        };

        match job.op {
            JobOp::Update => {
                if !exists {
                    // Authorization scope excludes this resource, or it was deleted since enqueue.
                    return;
                }
                match self.document_builder.build(&job.subject_iri, type_def, &index.allowed_groups).await {
                    Ok(doc) => {
                        if let Err(e) =
                            self.search_engine.upsert_document(&index.name, &job.subject_iri, &Value::Object(doc)).await
                        {
                            error!(error = %e, subject = %job.subject_iri, index = %index.name, "upsert failed");
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, subject = %job.subject_iri, index = %index.name, "document build failed");
                    }
                }
            }
            JobOp::Delete => {
                if exists {
                    // Still visible under this index's auth context; not actually gone.
                    return;
                }
                if let Err(e) = self.search_engine.delete_document(&index.name, &job.subject_iri).await {
                    warn!(error = %e, subject = %job.subject_iri, index = %index.name, "delete failed");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(subject: &str, type_name: &str, op: JobOp) -> UpdateJob {
        UpdateJob { subject_iri: subject.to_string(), type_name: type_name.to_string(), op }
    }

    #[tokio::test]
    async fn duplicate_key_collapses_to_latest_op() {
        let queue = CoalescingQueue::new(10);
        queue.enqueue(job("http://ex/doc5", "document", JobOp::Update)).await;
        queue.enqueue(job("http://ex/doc5", "document", JobOp::Delete)).await;
        assert_eq!(queue.len().await, 1);
        let dequeued = queue.dequeue().await;
        assert_eq!(dequeued.op, JobOp::Delete);
    }

    #[tokio::test]
    async fn distinct_keys_preserve_first_enqueue_order() {
        let queue = CoalescingQueue::new(10);
        queue.enqueue(job("http://ex/a", "document", JobOp::Update)).await;
        queue.enqueue(job("http://ex/b", "document", JobOp::Update)).await;
        let first = queue.dequeue().await;
        let second = queue.dequeue().await;
        assert_eq!(first.subject_iri, "http://ex/a");
        assert_eq!(second.subject_iri, "http://ex/b");
    }

    #[tokio::test]
    async fn enqueue_blocks_until_capacity_frees() {
        let queue = Arc::new(CoalescingQueue::new(1));
        queue.enqueue(job("http://ex/a", "document", JobOp::Update)).await;

        let queue2 = queue.clone();
        let blocked = tokio::spawn(async move {
            queue2.enqueue(job("http://ex/b", "document", JobOp::Update)).await;
        });

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!blocked.is_finished());

        queue.dequeue().await;
        blocked.await.unwrap();
        assert_eq!(queue.len().await, 1);
    }
}
