//! # Mapping Run Start Service
//!
//! This module provides the `POST /api/mapping/start` endpoint, which kicks
//! off a background job that maps one order: every extracted item is joined
//! against the configured master dataset and the deliverables (merged CSV,
//! Excel, optional template-rendered special CSV) are written to the blob
//! store.
//!
//! ## Workflow:
//!
//! 1.  **HTTP Request**: the `process` handler receives a
//!     `StartMappingRequest` carrying the `order_id`.
//!
//! 2.  **Job Scheduling**: `schedule_mapping_job` creates a job id, sets the
//!     initial status to `Pending` in the shared `JobsState`, returns the id
//!     to the client for polling, and spawns a Tokio task to manage the
//!     job's lifecycle.
//!
//! 3.  **Background Processing**: the spawned task runs `mapping_blocking`
//!     through `tokio::task::spawn_blocking`, keeping the CPU-bound join
//!     and render work off the async runtime.
//!
//! 4.  **Run Guard**: an order with an active run is refused; the order's
//!     status row moves PENDING -> RUNNING -> COMPLETED/FAILED around the
//!     run. At most one mapping run per order is ever in flight.
//!
//! 5.  **Progress Reporting**: the worker sends `MappingUpdate` messages
//!     back to the async context. Per-item progress becomes a percentage;
//!     failures carry the causing message, which stays visible to the user
//!     through the status endpoint.

use crate::db;
use crate::job_controller::state::{JobUpdate, JobsState};
use crate::mapping::run::run_order_mapping;
use crate::storage::SharedStore;
use crate::store;
use actix_web::{web, HttpResponse, Responder};
use common::jobs::JobStatus;
use common::requests::StartMappingRequest;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Internal progress message from the blocking worker to the async task
/// that owns the job.
#[derive(Debug)]
pub enum MappingUpdate {
    /// Updates the overall status of the job (e.g. to Failed).
    Job(JobStatus),
    /// Reports that one item finished mapping, for percentage progress.
    Item { done: usize, total: usize },
}

/// The Actix web handler for `POST /api/mapping/start`.
pub(crate) async fn process(
    state: web::Data<JobsState>,
    blobs: web::Data<SharedStore>,
    payload: web::Json<StartMappingRequest>,
) -> impl Responder {
    match schedule_mapping_job(state, blobs.get_ref().clone(), payload.into_inner()).await {
        Ok(job_id) => HttpResponse::Ok().json(serde_json::json!({ "job_id": job_id })),
        Err(err) => HttpResponse::InternalServerError().body(err),
    }
}

/// Schedules the mapping job to run in the background and returns its id.
async fn schedule_mapping_job(
    state: web::Data<JobsState>,
    blobs: SharedStore,
    req: StartMappingRequest,
) -> Result<String, String> {
    let job_id = Uuid::new_v4().to_string();
    // Immediately register the job as Pending.
    state
        .jobs
        .write()
        .await
        .insert(job_id.clone(), JobStatus::Pending);

    let tx = state.tx.clone(); // Channel to the central job updater.
    let job_id_clone = job_id.clone();
    let order_id = req.order_id;

    tokio::spawn(async move {
        // Dedicated channel for this job's updates.
        let (map_tx, mut map_rx) = mpsc::channel::<MappingUpdate>(100);

        // Listener task: translates MappingUpdates into JobUpdates for the
        // central job controller.
        let job_updater_tx = tx.clone();
        let job_id_for_updater = job_id_clone.clone();
        tokio::spawn(async move {
            while let Some(update) = map_rx.recv().await {
                let status = match update {
                    MappingUpdate::Job(job_status) => job_status,
                    MappingUpdate::Item { done, total } => {
                        let progress = if total > 0 {
                            (done as f32 / total as f32 * 100.0) as u32
                        } else {
                            0
                        };
                        JobStatus::InProgress(progress)
                    }
                };

                let _ = job_updater_tx
                    .send(JobUpdate::new(job_id_for_updater.clone(), status))
                    .await;
            }
        });

        // Execute the synchronous mapping work on a dedicated thread.
        let order_id_for_blocking = order_id.clone();
        let handle = tokio::task::spawn_blocking(move || {
            mapping_blocking(map_tx, &order_id_for_blocking, blobs)
        });

        match handle.await {
            Ok(Ok(summary)) => {
                let _ = tx
                    .send(JobUpdate::new(job_id_clone, JobStatus::Completed(summary)))
                    .await;
            }
            Ok(Err(e)) => {
                let _ = tx
                    .send(JobUpdate::new(job_id_clone, JobStatus::Failed(e)))
                    .await;
            }
            Err(e) => {
                let _ = tx
                    .send(JobUpdate::new(
                        job_id_clone,
                        JobStatus::Failed(format!("Task join error: {}", e)),
                    ))
                    .await;
            }
        }
    });

    Ok(job_id)
}

/// The synchronous mapping worker, run via `spawn_blocking`.
///
/// Guards the at-most-one-run-per-order invariant through the order status
/// row, delegates the pipeline to `run_order_mapping`, and records the
/// terminal COMPLETED/FAILED state with the causing message preserved.
fn mapping_blocking(
    tx: mpsc::Sender<MappingUpdate>,
    order_id: &str,
    blobs: SharedStore,
) -> Result<String, String> {
    let _ = tx.blocking_send(MappingUpdate::Job(JobStatus::InProgress(0)));

    let conn = db::open().map_err(|e| e.to_string())?;

    let order = store::get_order(&conn, order_id).map_err(|e| e.to_string())?;
    if order.status == "RUNNING" {
        let err_msg = format!("Order '{}' already has an active mapping run", order_id);
        let _ = tx.blocking_send(MappingUpdate::Job(JobStatus::Failed(err_msg.clone())));
        return Err(err_msg);
    }
    store::set_order_status(&conn, order_id, "RUNNING").map_err(|e| e.to_string())?;

    let progress = |done: usize, total: usize| {
        let _ = tx.blocking_send(MappingUpdate::Item { done, total });
    };

    match run_order_mapping(&conn, blobs.as_ref(), order_id, &progress) {
        Ok(outcome) => {
            store::set_order_status(&conn, order_id, "COMPLETED").map_err(|e| e.to_string())?;
            Ok(format!(
                "Mapped {} item(s), {} matched",
                outcome.items_mapped, outcome.matched
            ))
        }
        Err(err) => {
            let err_msg = err.to_string();
            // Preserve the failure on the order itself; other orders are
            // unaffected.
            let _ = store::set_order_status(&conn, order_id, "FAILED");
            let _ = tx.blocking_send(MappingUpdate::Job(JobStatus::Failed(err_msg.clone())));
            Err(err_msg)
        }
    }
}
