use actix_web::{web, HttpResponse, Responder};
use common::model::template::TemplateDocument;

use crate::error::{MappingError, Result};
use crate::storage::SharedStore;
use crate::template::document;

/// Handler for `POST /api/templates/document`.
///
/// Accepts an output template document as JSON, validates it (all problems
/// reported at once), and stores it under a name+version derived blob key.
/// Placeholder references are checked again at run time against the actual
/// mapped columns of the order being rendered.
pub(crate) async fn process(
    blobs: web::Data<SharedStore>,
    payload: web::Json<TemplateDocument>,
) -> impl Responder {
    match store_document(blobs.get_ref(), &payload) {
        Ok(path) => HttpResponse::Ok().json(serde_json::json!({ "path": path })),
        Err(MappingError::Config(message)) => HttpResponse::BadRequest().body(message),
        Err(err) => {
            HttpResponse::InternalServerError().body(format!("Error storing document: {}", err))
        }
    }
}

fn store_document(blobs: &SharedStore, document_payload: &TemplateDocument) -> Result<String> {
    document::validate(document_payload, None)?;
    let data = serde_json::to_vec_pretty(document_payload)?;
    blobs.put(&document::storage_key(document_payload), &data)
}
