use axum::{
    Json,
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::Response,
};

use super::{attachment, multipart_error, zip_attachment};
use crate::{
    error::AppError,
    models::{CheckFileNameQuery, ExistsResponse, FileResponse, MessageResponse},
    services::files::{self, FileChanges, Payload, SectionRef, UploadRequest},
    state::AppState,
    utils::normalize_tags,
};

/// Every field the upload and update forms may carry.
#[derive(Default)]
struct FileForm {
    payload: Option<Payload>,
    file_name: Option<String>,
    /// `None` when no `tags` field was sent at all.
    tags: Option<Vec<String>>,
    section_id: Option<String>,
    project_name: Option<String>,
    section_name: Option<String>,
}

async fn read_file_form(mut multipart: Multipart) -> Result<FileForm, AppError> {
    let mut form = FileForm::default();
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let filename = field.file_name().map(str::to_string).unwrap_or_default();
                let data = field.bytes().await.map_err(multipart_error)?;
                if !filename.is_empty() || !data.is_empty() {
                    form.payload = Some(Payload { filename, data });
                }
            }
            "fileName" => form.file_name = Some(field.text().await.map_err(multipart_error)?),
            "tags" | "tags[]" => {
                let value = field.text().await.map_err(multipart_error)?;
                form.tags.get_or_insert_with(Vec::new).push(value);
            }
            "sectionId" => form.section_id = Some(field.text().await.map_err(multipart_error)?),
            "projectName" => form.project_name = Some(field.text().await.map_err(multipart_error)?),
            "sectionName" => form.section_name = Some(field.text().await.map_err(multipart_error)?),
            _ => {}
        }
    }
    Ok(form)
}

fn section_ref(form: &FileForm) -> Result<SectionRef, AppError> {
    if let Some(raw) = form.section_id.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let id = raw
            .parse()
            .map_err(|_| AppError::BadRequest(format!("Invalid sectionId '{}'", raw)))?;
        return Ok(SectionRef::Id(id));
    }
    match (&form.project_name, &form.section_name) {
        (Some(project), Some(section)) if !project.trim().is_empty() && !section.trim().is_empty() => {
            Ok(SectionRef::Names {
                project: project.clone(),
                section: section.clone(),
            })
        }
        _ => Err(AppError::Validation(
            "sectionId, or projectName and sectionName, are required".into(),
        )),
    }
}

/// Upload a file into a section using multipart/form-data.
pub async fn upload_file(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<FileResponse>), AppError> {
    let form = read_file_form(multipart).await?;
    let target = section_ref(&form)?;
    let payload = form
        .payload
        .filter(|p| !p.data.is_empty())
        .ok_or_else(|| AppError::BadRequest("No file provided".into()))?;

    let request = UploadRequest {
        payload,
        display_name: form.file_name,
        tags: normalize_tags(form.tags.unwrap_or_default()),
        target,
    };
    let response = files::upload(&state, request).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn check_file_name(
    State(state): State<AppState>,
    Query(query): Query<CheckFileNameQuery>,
) -> Result<Json<ExistsResponse>, AppError> {
    let (Some(name), Some(section_id)) = (query.file_name, query.section_id) else {
        return Err(AppError::Validation(
            "fileName and sectionId are required".into(),
        ));
    };
    let exists = files::name_exists(&state, section_id, &name).await?;
    Ok(Json(ExistsResponse { exists }))
}

pub async fn get_file(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<FileResponse>, AppError> {
    Ok(Json(files::get(&state, id).await?))
}

pub async fn get_file_tags(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<Vec<String>>, AppError> {
    Ok(Json(files::tags(&state, id).await?))
}

/// Rename a file, replace its tags or payload; the label is re-rendered.
pub async fn update_file(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    multipart: Multipart,
) -> Result<Json<FileResponse>, AppError> {
    let form = read_file_form(multipart).await?;
    let changes = FileChanges {
        display_name: form.file_name,
        tags: form.tags.map(normalize_tags),
        payload: form.payload.filter(|p| !p.data.is_empty()),
    };
    Ok(Json(files::update(&state, id, changes).await?))
}

pub async fn regenerate_label(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<FileResponse>, AppError> {
    Ok(Json(files::regenerate(&state, id).await?))
}

pub async fn delete_file(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<MessageResponse>, AppError> {
    files::delete(&state, id).await?;
    Ok(Json(MessageResponse {
        message: format!("File {} deleted", id),
    }))
}

/// Serve the original bytes; this is the URL encoded in every QR code.
pub async fn download_file(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Response, AppError> {
    let (basename, bytes) = files::read_payload(&state, id).await?;
    let content_type = mime_guess::from_path(&basename).first_or_octet_stream();
    Ok(attachment(bytes, &basename, content_type.as_ref()))
}

/// Zip of the file's folder (payload and label).
pub async fn download_folder(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Response, AppError> {
    let (name, bytes) = files::zip_folder(&state, id).await?;
    Ok(zip_attachment(bytes, &name))
}
