//! Master dataset endpoints: uploading the reference CSV that extracted
//! records are joined against, and previewing it for the admin UI.
//!
//! The provided routes are:
//! - `POST /api/master/upload`: multipart/form-data upload. It expects a
//!   `json` field carrying the `MasterUpload` metadata and a `file` field
//!   with the CSV data. The header row is validated, the content is hashed,
//!   and the blob lands at `master/{dataset_id}_{md5}.csv`.
//! - `POST /api/master/preview`: returns `{headers, row_count}` for a
//!   stored master CSV without building a join index. This is the
//!   lightweight path the admin UI uses while configuring join keys.

mod preview;
mod upload;

use actix_web::web::{post, scope};
use actix_web::Scope;

const API_PATH: &str = "/api/master";

/// Configures and returns the Actix scope for master dataset routes.
pub fn configure_routes() -> Scope {
    scope(API_PATH)
        .route("/upload", post().to(upload::process))
        .route("/preview", post().to(preview::process))
}
