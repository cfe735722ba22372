mod db;
mod error;
mod job_controller;
mod mapping;
mod output;
mod services;
mod storage;
mod store;
mod template;

use std::sync::Arc;

use actix_web::{web, App, HttpServer};
use env_logger::Env;
use log::info;

use crate::job_controller::state::JobsState;
use crate::storage::{LocalBlobStore, SharedStore};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init_from_env(Env::default().default_filter_or("info"));
    let host = "127.0.0.1";
    let port = 8080;

    // Make sure the schema exists before any handler opens a connection.
    let conn = db::open().map_err(std::io::Error::other)?;
    db::init_schema(&conn).map_err(std::io::Error::other)?;
    drop(conn);

    let blobs: SharedStore = Arc::new(LocalBlobStore::new("./blobs"));

    // Initialize job controller state and start the updater task.
    let (jobs_state, rx) = JobsState::new(100);
    let updater_state = jobs_state.clone();
    tokio::spawn(async move {
        job_controller::state::start_job_updater(updater_state, rx).await;
    });

    info!("Server running at http://{}:{}", host, port);

    HttpServer::new(move || {
        App::new()
            .app_data(web::JsonConfig::default().limit(10 * 1024 * 1024)) // 10 MB
            .app_data(web::Data::new(jobs_state.clone()))
            .app_data(web::Data::new(blobs.clone()))
            .service(services::templates::configure_routes())
            .service(services::defaults::configure_routes())
            .service(services::master::configure_routes())
            .service(services::mapping::configure_routes())
    })
    .bind((host, port))?
    .run()
    .await
}
