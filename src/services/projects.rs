use std::path::PathBuf;

use bytes::Bytes;
use chrono::Utc;
use tracing::{error, info, warn};

use super::{labels::refresh_labels, load_project, sections::rebase_files};
use crate::{
    catalog::{NewProject, ProjectUpdate},
    error::{AppError, AppResult},
    models::Project,
    naming::generate_opaque_id,
    paths::validate_segment,
    state::AppState,
    utils::get_file_extension,
};

/// An image uploaded alongside a project form.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub filename: String,
    pub data: Bytes,
}

/// Store a project image under `project_img/` with a generated name and
/// return the absolute path and the path to persist.
async fn store_image(state: &AppState, image: &ImageUpload) -> AppResult<(PathBuf, String)> {
    if image.data.len() as u64 > state.config.max_file_size {
        return Err(AppError::PayloadTooLarge(format!(
            "Image size {} exceeds maximum limit of {} bytes",
            image.data.len(),
            state.config.max_file_size
        )));
    }

    let extension = get_file_extension(&image.filename)
        .ok_or_else(|| AppError::BadRequest("Invalid image extension".into()))?;
    if !state.config.allowed_image_extensions.contains(&extension) {
        return Err(AppError::UnsupportedMediaType(format!(
            "Image extension .{} is not allowed",
            extension
        )));
    }
    if image::guess_format(&image.data).is_err() {
        return Err(AppError::UnsupportedMediaType(
            "Uploaded project image is not a recognised image".into(),
        ));
    }

    let suffix: [u8; 4] = rand::random();
    let filename = format!(
        "projectImage-{}-{}.{}",
        Utc::now().timestamp_millis(),
        hex::encode(suffix),
        extension
    );
    let path = state.paths.project_images_dir().join(filename);
    state.storage.write(&path, &image.data).await?;
    let stored = state.paths.to_db_relative(&path)?;
    Ok((path, stored))
}

async fn remove_stored(state: &AppState, stored: &str, what: &str) {
    match state.paths.to_absolute(stored) {
        Ok(abs) => match state.storage.remove_file(&abs).await {
            Ok(true) => {}
            Ok(false) => warn!("{} {:?} was already gone", what, abs),
            Err(e) => error!("Failed to remove {} {:?}: {}", what, abs, e),
        },
        Err(e) => warn!("{} path '{}' ignored: {}", what, stored, e),
    }
}

/// Create a project with a fresh folder id and an optional image.
pub async fn create_project(
    state: &AppState,
    name: &str,
    image: Option<ImageUpload>,
) -> AppResult<Project> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::Validation("Project name is required".into()));
    }
    if state.catalog.project_name_taken(name, None).await? {
        return Err(AppError::Conflict(format!(
            "Project name '{}' already exists",
            name
        )));
    }

    let folder_name = generate_opaque_id();
    let dir = state.paths.dir_for(&[folder_name.as_str()])?;
    tokio::fs::create_dir_all(&dir).await?;

    let stored_image = match &image {
        Some(image) => match store_image(state, image).await {
            Ok((_, stored)) => Some(stored),
            Err(e) => {
                let _ = state.storage.remove_tree(&dir).await;
                return Err(e);
            }
        },
        None => None,
    };

    let new = NewProject {
        name: name.to_string(),
        folder_name,
        image: stored_image.clone(),
    };
    match state.catalog.insert_project(new).await {
        Ok(project) => {
            info!(
                project_id = project.id,
                project_name = %project.project_name,
                image = ?project.project_image,
                "Project created"
            );
            Ok(project)
        }
        Err(e) => {
            let _ = state.storage.remove_tree(&dir).await;
            if let Some(stored) = &stored_image {
                remove_stored(state, stored, "project image").await;
            }
            Err(e)
        }
    }
}

/// Rename and/or re-image a project.
///
/// A blank or missing name keeps the current one. The new image is stored
/// before the row is updated and the replaced one removed after. A legacy
/// project (directory named after the project) has its directory moved and
/// every stored path below it rewritten in the same transaction as the
/// rename. After a rename every label in the project is regenerated.
pub async fn update_project(
    state: &AppState,
    project_id: i32,
    new_name: Option<&str>,
    image: Option<ImageUpload>,
) -> AppResult<Project> {
    let _guard = state.locks.lock_project(project_id).await;
    let project = load_project(state, project_id).await?;

    let name = new_name
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or(&project.project_name)
        .to_string();
    let renaming = name != project.project_name;
    if !renaming && image.is_none() {
        return Ok(project);
    }
    if renaming && state.catalog.project_name_taken(&name, Some(project.id)).await? {
        return Err(AppError::Conflict(format!(
            "Project name '{}' already exists",
            name
        )));
    }

    let new_image = match &image {
        Some(image) => Some(store_image(state, image).await?),
        None => None,
    };

    let mut moved = None;
    let mut file_paths = Vec::new();
    if renaming && project.is_legacy() {
        let prepared = async {
            validate_segment(&name)?;
            let old_dir = state.paths.project_dir(&project)?;
            let new_dir = state.paths.dir_for(&[name.as_str()])?;
            let files = state.catalog.list_project_files(project.id).await?;
            if state.storage.exists(&old_dir).await {
                state.storage.move_dir(&old_dir, &new_dir).await?;
                moved = Some((old_dir, new_dir));
            }
            file_paths = rebase_files(
                &files,
                &state.paths.stored_prefix(&[project.folder_segment()]),
                &state.paths.stored_prefix(&[name.as_str()]),
            );
            AppResult::Ok(())
        }
        .await;
        if let Err(e) = prepared {
            if let Some((path, _)) = &new_image {
                let _ = state.storage.remove_file(path).await;
            }
            return Err(e);
        }
    }

    let update = ProjectUpdate {
        name: name.clone(),
        image: new_image
            .as_ref()
            .map(|(_, stored)| stored.clone())
            .or_else(|| project.project_image.clone()),
        file_paths,
    };
    let updated = match state.catalog.update_project(project.id, update).await {
        Ok(updated) => updated,
        Err(e) => {
            if let Some((old_dir, new_dir)) = &moved {
                if let Err(undo) = state.storage.move_dir(new_dir, old_dir).await {
                    error!(
                        "Could not move {:?} back to {:?} after failed rename: {}",
                        new_dir, old_dir, undo
                    );
                }
            }
            if let Some((path, _)) = &new_image {
                let _ = state.storage.remove_file(path).await;
            }
            return Err(e);
        }
    };

    if new_image.is_some() {
        if let Some(old) = &project.project_image {
            remove_stored(state, old, "replaced project image").await;
        }
        info!(project_id, image = ?updated.project_image, "Project image replaced");
    }

    if renaming {
        info!(
            project_id,
            from = %project.project_name,
            to = %updated.project_name,
            moved = moved.is_some(),
            "Project renamed"
        );
        let sections = state.catalog.list_sections(project.id).await?;
        let files = state.catalog.list_project_files(project.id).await?;
        let refreshed = refresh_labels(state, &updated, &sections, files).await;
        info!(project_id, refreshed, "Project labels refreshed");
    }

    Ok(updated)
}

/// Delete a project row (cascading to sections, files and tags), then its
/// image and folder.
pub async fn delete_project(state: &AppState, project_id: i32) -> AppResult<()> {
    let guard = state.locks.lock_project(project_id).await;
    let project = load_project(state, project_id).await?;

    state.catalog.delete_project(project.id).await?;

    if let Some(image) = &project.project_image {
        remove_stored(state, image, "project image").await;
    }
    match state.paths.project_dir(&project) {
        Ok(dir) => match state.storage.remove_tree(&dir).await {
            Ok(true) => {}
            Ok(false) => warn!("Project folder {:?} was already gone", dir),
            Err(e) => error!("Failed to remove project folder {:?}: {}", dir, e),
        },
        Err(e) => error!(project_id, "Project folder not resolvable: {}", e),
    }

    drop(guard);
    state.locks.forget_project(project_id);
    info!(project_id, project_name = %project.project_name, "Project deleted");
    Ok(())
}
