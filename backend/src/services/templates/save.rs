use actix_web::{web, HttpResponse, Responder};
use common::model::config::MappingTemplate;

use crate::db;
use crate::error::{MappingError, Result};
use crate::mapping::validate;
use crate::store;

/// Handler for `POST /api/templates/save`.
///
/// Validation happens before anything touches the database, so a broken
/// config can never be picked up by a later mapping run.
pub(crate) async fn process(payload: web::Json<MappingTemplate>) -> impl Responder {
    match save_mapping_template(&payload) {
        Ok(()) => HttpResponse::Ok().body("Mapping template saved"),
        Err(MappingError::Config(message)) => HttpResponse::BadRequest().body(message),
        Err(err) => {
            HttpResponse::InternalServerError().body(format!("Error saving template: {}", err))
        }
    }
}

fn save_mapping_template(template: &MappingTemplate) -> Result<()> {
    validate::validate_template(template)?;
    let conn = db::open()?;
    store::save_template(&conn, template)
}
