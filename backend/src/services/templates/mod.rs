//! # Mapping Template Service Module
//!
//! Aggregates the admin-facing endpoints for managing mapping templates and
//! output template documents under `/api/templates`. Everything here is
//! validated before persistence: a template or document that fails its
//! checks is rejected with the full list of problems and never stored.
//!
//! ## Registered routes:
//!
//! *   **`POST /save`** — create or update a `MappingTemplate`. The config
//!     is validated as a whole (join keys, attachment rules, output meta)
//!     and rejected with an aggregated message on any issue.
//! *   **`GET /list`** — all stored mapping templates.
//! *   **`GET /{template_id}`** — one mapping template.
//! *   **`DELETE /{template_id}`** — remove a mapping template.
//! *   **`POST /document`** — upload an output template document
//!     ("special CSV" definition); validated, then stored in the blob store
//!     under a key derived from its name and version.

mod delete;
mod document;
mod get;
mod save;

use actix_web::web::{delete, get, post, scope};
use actix_web::Scope;

const API_PATH: &str = "/api/templates";

/// Configures and returns the Actix `Scope` for all template-related routes.
pub fn configure_routes() -> Scope {
    scope(API_PATH)
        .route("/save", post().to(save::process))
        .route("/list", get().to(get::list))
        .route("/document", post().to(document::process))
        .route("/{template_id}", get().to(get::process))
        .route("/{template_id}", delete().to(delete::process))
}
