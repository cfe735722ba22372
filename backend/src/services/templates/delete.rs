use actix_web::{web, HttpResponse, Responder};

use crate::db;
use crate::error::{MappingError, Result};
use crate::store;

/// Handler for `DELETE /api/templates/{template_id}`.
pub(crate) async fn process(template_id: web::Path<String>) -> impl Responder {
    match delete_mapping_template(&template_id) {
        Ok(()) => HttpResponse::Ok().body("Mapping template deleted"),
        Err(MappingError::NotFound(what)) => HttpResponse::NotFound().body(what),
        Err(err) => {
            HttpResponse::InternalServerError().body(format!("Error deleting template: {}", err))
        }
    }
}

fn delete_mapping_template(template_id: &str) -> Result<()> {
    let conn = db::open()?;
    store::delete_template(&conn, template_id)
}
