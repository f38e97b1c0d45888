use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::Response,
};

use super::zip_attachment;
use crate::{
    error::AppError,
    models::{AddSectionsRequest, FileWithSize, MessageResponse, RenameSectionRequest, Section},
    services::{self, files::ExportKind},
    state::AppState,
};

pub async fn add_sections(
    State(state): State<AppState>,
    Json(request): Json<AddSectionsRequest>,
) -> Result<(StatusCode, Json<Vec<Section>>), AppError> {
    let created =
        services::sections::add_sections(&state, request.project_id, request.section_names).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn get_section(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<Section>, AppError> {
    Ok(Json(services::load_section(&state, id).await?))
}

pub async fn rename_section(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(request): Json<RenameSectionRequest>,
) -> Result<Json<Section>, AppError> {
    let section = services::sections::rename_section(&state, id, &request.section_name).await?;
    Ok(Json(section))
}

pub async fn delete_section(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<MessageResponse>, AppError> {
    services::sections::delete_section(&state, id).await?;
    Ok(Json(MessageResponse {
        message: format!("Section {} deleted", id),
    }))
}

pub async fn list_files(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<Vec<FileWithSize>>, AppError> {
    Ok(Json(services::files::list_with_sizes(&state, id).await?))
}

pub async fn export_section_files(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Response, AppError> {
    let (name, bytes) = services::files::export_section(&state, id, ExportKind::Originals).await?;
    Ok(zip_attachment(bytes, &name))
}

pub async fn export_section_qr(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Response, AppError> {
    let (name, bytes) = services::files::export_section(&state, id, ExportKind::Labels).await?;
    Ok(zip_attachment(bytes, &name))
}
