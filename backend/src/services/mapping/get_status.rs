use crate::job_controller::state::JobsState;
use actix_web::{web, Responder};

/// Handler for `GET /api/mapping/status/{job_id}`.
///
/// Returns the job's current `JobStatus` from the shared state. A failed
/// run carries the causing message, so the client can show the user why
/// the order ended up `FAILED`.
pub(crate) async fn process(
    job_id: web::Path<String>,
    state: web::Data<JobsState>,
) -> impl Responder {
    let jobs = state.jobs.read().await;
    if let Some(status) = jobs.get(&job_id.into_inner()) {
        actix_web::HttpResponse::Ok().json(status)
    } else {
        actix_web::HttpResponse::NotFound().body("Job ID not found")
    }
}
