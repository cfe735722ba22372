use actix_web::{web, HttpResponse, Responder};
use common::model::config::MappingDefault;

use crate::db;
use crate::error::{MappingError, Result};
use crate::mapping::validate;
use crate::store;

/// Handler for `POST /api/defaults/save`.
///
/// Creation is an upsert keyed on (company, doctype, item_type): saving the
/// same triple twice replaces the earlier binding. The merged effective
/// config (template plus override) is validated before anything persists.
pub(crate) async fn process(payload: web::Json<MappingDefault>) -> impl Responder {
    match save_mapping_default(&payload) {
        Ok(()) => HttpResponse::Ok().body("Mapping default saved"),
        Err(MappingError::Config(message)) => HttpResponse::BadRequest().body(message),
        Err(MappingError::NotFound(what)) => HttpResponse::NotFound().body(what),
        Err(err) => {
            HttpResponse::InternalServerError().body(format!("Error saving default: {}", err))
        }
    }
}

fn save_mapping_default(default: &MappingDefault) -> Result<()> {
    let conn = db::open()?;
    let template = store::get_template(&conn, &default.template_id)?;
    validate::validate_default(default, &template)?;
    store::upsert_default(&conn, default)
}
