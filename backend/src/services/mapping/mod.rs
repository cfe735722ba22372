mod get_status;
mod start;

use actix_web::web::{get, post, scope};
use actix_web::Scope;

const API_PATH: &str = "/api/mapping";

/// Configures and returns the Actix `Scope` for mapping-run routes.
pub fn configure_routes() -> Scope {
    scope(API_PATH)
        // Route to start a mapping run for one order.
        .route("/start", post().to(start::process))
        // Route to poll the status of a scheduled run.
        .route("/status/{job_id}", get().to(get_status::process))
}
