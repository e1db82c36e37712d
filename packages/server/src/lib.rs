#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Actix-Web API server for the landwatch change-detection pipeline.
//!
//! `POST /search` takes a coordinate, fetches the three most recent
//! satellite captures for it, re-hosts them durably, runs a vision-model
//! comparison, and answers with the stored URLs plus the normalized
//! change report. The spool directory for in-flight downloads is served
//! at `/public` as a convenience; files there are deleted once their
//! transfer completes and no consumer may rely on them.

mod handlers;
mod models;

use std::sync::Arc;

use actix_cors::Cors;
use actix_files::Files;
use actix_web::{App, HttpServer, middleware, web};
use landwatch_archive::{ArchiveClient, ArchiveConfig};
use landwatch_pipeline::Pipeline;
use landwatch_storage::{StorageClient, StorageConfig};
use landwatch_vision::VisionConfig;
use landwatch_vision::openai::OpenAiVision;

/// Shared application state.
pub struct AppState {
    /// The acquisition-and-analysis pipeline, shared across requests.
    pub pipeline: Pipeline,
}

/// Starts the landwatch API server.
///
/// Loads all collaborator configuration from the environment once,
/// wires the production pipeline, and starts the Actix-Web HTTP server.
/// This is a regular async function — the caller provides the async
/// runtime (e.g. via `#[actix_web::main]`).
///
/// # Errors
///
/// Returns an `std::io::Result` error if the HTTP server fails to bind
/// or encounters a runtime error.
///
/// # Panics
///
/// Panics if required configuration environment variables are missing
/// or the spool directory cannot be created.
#[allow(clippy::future_not_send)]
pub async fn run_server() -> std::io::Result<()> {
    pretty_env_logger::init_custom_env("RUST_LOG");

    log::info!("Loading configuration...");
    let archive_config = ArchiveConfig::from_env().expect("Failed to load archive configuration");
    let storage_config = StorageConfig::from_env().expect("Failed to load storage configuration");
    let vision_config = VisionConfig::from_env().expect("Failed to load vision configuration");

    let spool_dir = storage_config.spool_dir.clone();
    std::fs::create_dir_all(&spool_dir).expect("Failed to create spool directory");

    let http = reqwest::Client::new();
    let pipeline = Pipeline::new(
        Arc::new(ArchiveClient::new(archive_config, http.clone())),
        Arc::new(StorageClient::new(storage_config, http.clone())),
        Arc::new(OpenAiVision::new(vision_config, http)),
    );

    let state = web::Data::new(AppState { pipeline });

    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(3000);

    log::info!("Starting server on {bind_addr}:{port}");

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .app_data(state.clone())
            .route("/search", web::post().to(handlers::search))
            .route("/health", web::get().to(handlers::health))
            // Serve in-flight spool files (implementation convenience)
            .service(Files::new("/public", spool_dir.clone()))
    })
    .bind((bind_addr, port))?
    .run()
    .await
}
