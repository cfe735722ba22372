//! Manages the state of long-running, asynchronous background jobs.
//!
//! Mapping runs execute outside the request/response cycle; the client gets
//! a job id back immediately and polls for progress. The components here
//! track that state:
//! - `JobsState`: a clonable, thread-safe struct holding the status of all
//!   jobs, injected into the Actix application state in `main.rs`.
//! - `JobUpdate`: a message struct background workers use to report status
//!   changes back to the central state manager.
//! - `start_job_updater`: a long-running task listening for `JobUpdate`
//!   messages on an MPSC channel and updating the shared `JobsState`.

use common::jobs::JobStatus;
use std::{collections::HashMap, sync::Arc};
use tokio::sync::{mpsc, RwLock};

/// A thread-safe, shareable container for the state of all background jobs.
#[derive(Clone)]
pub struct JobsState {
    /// Map from job id to its current status: the single source of truth,
    /// read concurrently by status polling and written by the updater task.
    pub jobs: Arc<RwLock<HashMap<String, JobStatus>>>,

    /// Sender half of the update channel. Workers push `JobUpdate`s here
    /// instead of taking the write lock themselves.
    pub tx: mpsc::Sender<JobUpdate>,
}

impl JobsState {
    /// Create the shared state plus the receiver `start_job_updater` should
    /// be spawned with.
    pub fn new(buffer: usize) -> (JobsState, mpsc::Receiver<JobUpdate>) {
        let (tx, rx) = mpsc::channel(buffer);
        (
            JobsState {
                jobs: Arc::new(RwLock::new(HashMap::new())),
                tx,
            },
            rx,
        )
    }
}

/// A status update for a specific background job.
#[derive(Debug)]
pub struct JobUpdate {
    pub(crate) job_id: String,
    pub(crate) status: JobStatus,
}

impl JobUpdate {
    pub fn new(job_id: impl Into<String>, status: JobStatus) -> Self {
        Self {
            job_id: job_id.into(),
            status,
        }
    }
}

/// Run the central job state updater until every sender is gone.
pub async fn start_job_updater(state: JobsState, mut rx: mpsc::Receiver<JobUpdate>) {
    while let Some(update) = rx.recv().await {
        let mut jobs = state.jobs.write().await;
        jobs.insert(update.job_id.clone(), update.status);
    }
}
