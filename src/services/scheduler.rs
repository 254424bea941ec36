//! Coalescing reindex queue: one worker task per project.
//!
//! Requests arriving while a build runs are drained together once it ends
//! and answered by a single follow-up build, so a burst costs at most two
//! builds. Builds run on the worker task; a caller that stops waiting does
//! not cancel them.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::indexer::{IndexReport, Indexer};
use crate::error::IndexError;

type Reply = oneshot::Sender<Result<IndexReport, IndexError>>;

struct Worker {
    requests: mpsc::UnboundedSender<Option<Reply>>,
    builds: Arc<AtomicU64>,
    handle: JoinHandle<()>,
}

pub struct ReindexScheduler {
    indexer: Arc<Indexer>,
    workers: Mutex<HashMap<String, Worker>>,
}

impl ReindexScheduler {
    pub fn new(indexer: Arc<Indexer>) -> Self {
        Self {
            indexer,
            workers: Mutex::new(HashMap::new()),
        }
    }

    fn workers(&self) -> MutexGuard<'_, HashMap<String, Worker>> {
        self.workers.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn enqueue(&self, project_id: &str, reply: Option<Reply>) -> Result<(), IndexError> {
        if !self.indexer.projects().exists(project_id) {
            return Err(IndexError::ProjectNotFound(project_id.to_string()));
        }

        let mut workers = self.workers();
        let worker = workers
            .entry(project_id.to_string())
            .or_insert_with(|| spawn_worker(self.indexer.clone(), project_id.to_string()));
        worker
            .requests
            .send(reply)
            .map_err(|_| IndexError::WorkerStopped(project_id.to_string()))
    }

    /// Request a rebuild and wait for the build that covers it.
    pub async fn reindex(&self, project_id: &str) -> Result<IndexReport, IndexError> {
        let (tx, rx) = oneshot::channel();
        self.enqueue(project_id, Some(tx))?;
        rx.await
            .map_err(|_| IndexError::WorkerStopped(project_id.to_string()))?
    }

    /// Request a rebuild without waiting for it.
    pub fn trigger(&self, project_id: &str) -> Result<(), IndexError> {
        self.enqueue(project_id, None)
    }

    /// Builds started for `project_id` since its worker was created.
    pub fn builds_started(&self, project_id: &str) -> u64 {
        self.workers()
            .get(project_id)
            .map(|w| w.builds.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    /// Stop accepting requests for a project. Queued requests still finish.
    pub fn remove(&self, project_id: &str) {
        self.workers().remove(project_id);
    }

    /// Close every queue and wait for in-flight builds to finish.
    pub async fn shutdown(&self) {
        let handles: Vec<JoinHandle<()>> = self
            .workers()
            .drain()
            .map(|(_, worker)| worker.handle)
            .collect();
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "reindex worker ended abnormally");
            }
        }
    }
}

fn spawn_worker(indexer: Arc<Indexer>, project_id: String) -> Worker {
    let (tx, mut rx) = mpsc::unbounded_channel::<Option<Reply>>();
    let builds = Arc::new(AtomicU64::new(0));
    let counter = builds.clone();

    let handle = tokio::spawn(async move {
        while let Some(first) = rx.recv().await {
            let mut waiters = vec![first];
            while let Ok(more) = rx.try_recv() {
                waiters.push(more);
            }

            counter.fetch_add(1, Ordering::SeqCst);
            debug!(project = %project_id, coalesced = waiters.len(), "starting reindex");
            let result = indexer.build(&project_id).await;

            for waiter in waiters.into_iter().flatten() {
                let _ = waiter.send(result.clone());
            }
        }
        debug!(project = %project_id, "reindex worker stopped");
    });

    Worker {
        requests: tx,
        builds,
        handle,
    }
}
