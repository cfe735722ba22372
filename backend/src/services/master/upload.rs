// Rust
use actix_multipart::Multipart;
use actix_web::{web, HttpResponse, Responder};
use common::requests::MasterUpload;
use futures_util::StreamExt;
use md5::Context;
use regex::Regex;
use serde_json::from_slice;

use crate::storage::SharedStore;

/// Validate each CSV header cell.
/// - `header_str` is the raw header line (without trailing CR/LF).
/// - `header_re` is the precompiled regex used to validate each cell.
fn validate_header_cells(
    header_str: &str,
    header_re: &Regex,
) -> Result<(), Box<dyn std::error::Error>> {
    for cell in header_str.split(',') {
        let mut f = cell.trim();
        // remove surrounding quotes if any
        if f.starts_with('"') && f.ends_with('"') && f.len() >= 2 {
            f = &f[1..f.len() - 1];
        }
        if f.is_empty() {
            return Err("CSV header cells must not be empty".into());
        }
        if !header_re.is_match(f) {
            return Err(
                "CSV header cells may only contain letters, digits, spaces, '-' and '_'".into(),
            );
        }
    }
    Ok(())
}

/// HTTP handler wrapper that converts the internal result to an
/// `HttpResponse`.
///
/// - On success: `200 OK` with the stored path and content hash as JSON.
/// - On failure: `400 Bad Request` with the error message.
pub(crate) async fn process(blobs: web::Data<SharedStore>, payload: Multipart) -> impl Responder {
    match upload_master_csv(blobs.get_ref().clone(), payload).await {
        Ok(response) => HttpResponse::Ok().json(response),
        Err(e) => HttpResponse::BadRequest().body(format!("Error: {}", e)),
    }
}

/// Receives a `MasterUpload` JSON part followed by the CSV file part,
/// validates the header row, and stores the blob under a key derived from
/// the dataset id and the uploaded content's MD5 hash. Re-uploading
/// identical content therefore lands on the same key.
async fn upload_master_csv(
    blobs: SharedStore,
    mut payload: Multipart,
) -> Result<serde_json::Value, Box<dyn std::error::Error>> {
    let mut upload: Option<MasterUpload> = None;
    let mut md5_hasher = Context::new();
    let mut content: Option<Vec<u8>> = None;

    while let Some(item) = payload.next().await {
        let mut field = item?;
        let field_name = field
            .content_disposition()
            .and_then(|cd| cd.get_name().map(|n| n.to_string()));

        match field_name.as_deref() {
            Some("file") => {
                let filename = field
                    .content_disposition()
                    .and_then(|cd| cd.get_filename().map(|f| f.to_string()))
                    .unwrap_or_default();
                if !filename.ends_with(".csv") {
                    return Err("The file must end with .csv".into());
                }
                if upload.is_none() {
                    return Err("MasterUpload JSON must be sent before the file".into());
                }

                let mut bytes = Vec::new();
                while let Some(chunk) = field.next().await {
                    let chunk = chunk?;
                    // Hash the uploaded bytes as they arrive.
                    md5_hasher.consume(&chunk);
                    bytes.extend_from_slice(&chunk);
                }

                // Regex to validate header cells: letters, marks, digits,
                // spaces, hyphen, underscore.
                let header_re = Regex::new(r"^[\p{L}\p{M}\p{N}\s\-_]+$")
                    .map_err(|e| format!("Regex error: {}", e))?;
                let header_end = bytes
                    .iter()
                    .position(|&b| b == b'\n')
                    .unwrap_or(bytes.len());
                let mut header_line = bytes[..header_end].to_vec();
                if header_line.ends_with(&[b'\r']) {
                    header_line.pop();
                }
                let header_str =
                    String::from_utf8(header_line).map_err(|_| "Header is not valid UTF-8")?;
                validate_header_cells(&header_str, &header_re)?;

                content = Some(bytes);
            }

            Some("json") => {
                let mut bytes = Vec::new();
                while let Some(chunk) = field.next().await {
                    bytes.extend_from_slice(&chunk?);
                }
                let meta: MasterUpload = from_slice(&bytes)?;

                let id_re = Regex::new(r"^[A-Za-z0-9._-]+$")
                    .map_err(|e| format!("Regex error: {}", e))?;
                if !id_re.is_match(&meta.dataset_id) {
                    return Err(
                        "dataset_id may only contain alphanumerics, '.', '-' and '_'".into(),
                    );
                }
                upload = Some(meta);
            }

            _ => {}
        }
    }

    let upload = upload.ok_or("Missing MasterUpload metadata")?;
    let content = content.ok_or("Missing file")?;

    let digest = format!("{:x}", md5_hasher.finalize());
    let path = format!("master/{}_{}.csv", upload.dataset_id, digest);
    let replaced = blobs.exists(&path);
    blobs.put(&path, &content)?;

    Ok(serde_json::json!({
        "path": path,
        "md5": digest,
        "replaced": replaced,
    }))
}
