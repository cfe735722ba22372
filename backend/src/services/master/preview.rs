use actix_web::{web, HttpResponse, Responder};
use common::requests::PreviewMasterRequest;

use crate::error::MappingError;
use crate::mapping::master;
use crate::storage::SharedStore;

/// Handler for `POST /api/master/preview`.
///
/// Runs the loader's headers-only path on a blocking thread; no join index
/// is built.
pub(crate) async fn process(
    blobs: web::Data<SharedStore>,
    payload: web::Json<PreviewMasterRequest>,
) -> impl Responder {
    let store = blobs.get_ref().clone();
    let path = payload.into_inner().path;

    let handle =
        tokio::task::spawn_blocking(move || master::headers_only(store.as_ref(), &path));

    match handle.await {
        Ok(Ok(preview)) => HttpResponse::Ok().json(preview),
        Ok(Err(MappingError::NotFound(what))) => HttpResponse::NotFound().body(what),
        Ok(Err(MappingError::Format(message))) => HttpResponse::BadRequest().body(message),
        Ok(Err(err)) => HttpResponse::InternalServerError().body(err.to_string()),
        Err(join_err) => {
            HttpResponse::InternalServerError().body(format!("Task join error: {}", join_err))
        }
    }
}
