pub mod archive;
pub mod catalog;
pub mod config;
pub mod database;
pub mod error;
pub mod handlers;
pub mod label;
pub mod locks;
pub mod models;
pub mod naming;
pub mod paths;
pub mod services;
pub mod state;
pub mod storage;
pub mod utils;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::HeaderValue,
    routing::{get, post},
};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::warn;

use crate::{config::Config, handlers::{files, projects, sections}, state::AppState};

/// Room for the multipart framing and text fields around the file itself.
const FORM_OVERHEAD: usize = 1024 * 1024;

fn cors_layer(config: &Config) -> CorsLayer {
    if config.cors_permissive {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }

    let origins: Vec<HeaderValue> = config
        .frontend_urls
        .iter()
        .filter_map(|url| match HeaderValue::from_str(url.trim_end_matches('/')) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin '{}'", url);
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}

/// The full HTTP surface over `state`.
pub fn build_router(state: AppState) -> Router {
    let body_limit = usize::try_from(state.config.max_file_size)
        .unwrap_or(usize::MAX)
        .saturating_add(FORM_OVERHEAD);

    let project_routes = Router::new()
        .route("/", get(projects::list_projects).post(projects::create_project))
        .route(
            "/{id}",
            get(projects::get_project)
                .put(projects::update_project)
                .delete(projects::delete_project),
        )
        .route("/{id}/sections", get(projects::list_sections))
        .route("/{id}/search", get(projects::search_project))
        .route("/export-project-files/{id}", get(projects::export_project_files))
        .route("/export-project-qr/{id}", get(projects::export_project_qr));

    let section_routes = Router::new()
        .route("/addsections", post(sections::add_sections))
        .route(
            "/{id}",
            get(sections::get_section)
                .put(sections::rename_section)
                .delete(sections::delete_section),
        )
        .route("/{id}/files", get(sections::list_files))
        .route("/export/{id}", get(sections::export_section_files))
        .route("/export-qr/{id}", get(sections::export_section_qr));

    let file_routes = Router::new()
        .route("/upload", post(files::upload_file))
        .route("/checkFileName", get(files::check_file_name))
        .route(
            "/files/{id}",
            get(files::get_file)
                .put(files::update_file)
                .delete(files::delete_file),
        )
        .route("/files/{id}/tags", get(files::get_file_tags))
        .route("/files/{id}/regenerate-label", post(files::regenerate_label))
        .route("/download-file/{id}", get(files::download_file))
        .route("/download/{id}", get(files::download_folder));

    let cors = cors_layer(&state.config);

    Router::new()
        .route("/health", get(handlers::health_check))
        .nest("/api/projects", project_routes)
        .nest("/api/sections", section_routes)
        .nest("/api/uploadFile", file_routes)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
