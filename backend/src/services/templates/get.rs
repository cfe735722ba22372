use actix_web::{web, HttpResponse, Responder};
use common::model::config::MappingTemplate;

use crate::db;
use crate::error::{MappingError, Result};
use crate::store;

/// Handler for `GET /api/templates/{template_id}`.
pub(crate) async fn process(template_id: web::Path<String>) -> impl Responder {
    match get_mapping_template(&template_id) {
        Ok(template) => HttpResponse::Ok().json(template),
        Err(MappingError::NotFound(what)) => HttpResponse::NotFound().body(what),
        Err(err) => {
            HttpResponse::InternalServerError().body(format!("Error retrieving template: {}", err))
        }
    }
}

/// Handler for `GET /api/templates/list`.
pub(crate) async fn list() -> impl Responder {
    match list_mapping_templates() {
        Ok(templates) => HttpResponse::Ok().json(templates),
        Err(err) => {
            HttpResponse::InternalServerError().body(format!("Error listing templates: {}", err))
        }
    }
}

fn get_mapping_template(template_id: &str) -> Result<MappingTemplate> {
    let conn = db::open()?;
    store::get_template(&conn, template_id)
}

fn list_mapping_templates() -> Result<Vec<MappingTemplate>> {
    let conn = db::open()?;
    store::list_templates(&conn)
}
