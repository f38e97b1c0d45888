use axum::{
    Json,
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::Response,
};

use super::{multipart_error, zip_attachment};
use crate::{
    error::AppError,
    models::{MessageResponse, Project, SearchHit, SearchQuery, Section},
    services::{
        self,
        files::ExportKind,
        projects::ImageUpload,
    },
    state::AppState,
};

/// Fields of the project create/update form.
#[derive(Default)]
struct ProjectForm {
    name: Option<String>,
    image: Option<ImageUpload>,
}

async fn read_project_form(mut multipart: Multipart) -> Result<ProjectForm, AppError> {
    let mut form = ProjectForm::default();
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "projectName" => {
                form.name = Some(field.text().await.map_err(multipart_error)?);
            }
            "projectImage" => {
                let filename = field.file_name().map(str::to_string);
                let data = field.bytes().await.map_err(multipart_error)?;
                // Browsers send an empty part when no image was picked
                if let Some(filename) = filename.filter(|f| !f.is_empty()) {
                    if !data.is_empty() {
                        form.image = Some(ImageUpload { filename, data });
                    }
                }
            }
            _ => {}
        }
    }
    Ok(form)
}

pub async fn list_projects(State(state): State<AppState>) -> Result<Json<Vec<Project>>, AppError> {
    Ok(Json(state.catalog.list_projects().await?))
}

pub async fn get_project(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<Project>, AppError> {
    Ok(Json(services::load_project(&state, id).await?))
}

/// Create a project from a multipart form with `projectName` and an optional
/// `projectImage`.
pub async fn create_project(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<Project>), AppError> {
    let form = read_project_form(multipart).await?;
    let name = form
        .name
        .ok_or_else(|| AppError::Validation("Project name is required".into()))?;
    let project = services::projects::create_project(&state, &name, form.image).await?;
    Ok((StatusCode::CREATED, Json(project)))
}

pub async fn update_project(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    multipart: Multipart,
) -> Result<Json<Project>, AppError> {
    let form = read_project_form(multipart).await?;
    let project =
        services::projects::update_project(&state, id, form.name.as_deref(), form.image).await?;
    Ok(Json(project))
}

pub async fn delete_project(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<MessageResponse>, AppError> {
    services::projects::delete_project(&state, id).await?;
    Ok(Json(MessageResponse {
        message: format!("Project {} deleted", id),
    }))
}

pub async fn list_sections(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<Vec<Section>>, AppError> {
    services::load_project(&state, id).await?;
    Ok(Json(state.catalog.list_sections(id).await?))
}

/// Files of a project matching `term` by name, section name or tag.
pub async fn search_project(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<SearchHit>>, AppError> {
    services::load_project(&state, id).await?;
    let term = query.term.trim();
    if term.is_empty() {
        return Err(AppError::Validation("Search term is required".into()));
    }
    Ok(Json(state.catalog.search_project(id, term).await?))
}

pub async fn export_project_files(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Response, AppError> {
    let (name, bytes) = services::files::export_project(&state, id, ExportKind::Originals).await?;
    Ok(zip_attachment(bytes, &name))
}

pub async fn export_project_qr(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Response, AppError> {
    let (name, bytes) = services::files::export_project(&state, id, ExportKind::Labels).await?;
    Ok(zip_attachment(bytes, &name))
}
