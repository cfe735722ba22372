//! Mapping default endpoints: binding a (company, document type, item type)
//! triple to a template, with an optional config override.

mod save;

use actix_web::web::{post, scope};
use actix_web::Scope;

const API_PATH: &str = "/api/defaults";

/// Configures and returns the Actix `Scope` for mapping-default routes.
pub fn configure_routes() -> Scope {
    scope(API_PATH).route("/save", post().to(save::process))
}
