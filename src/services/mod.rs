//! Lifecycle operations behind the HTTP handlers. Every mutation touching a
//! project's subtree takes that project's lock, writes to the filesystem
//! first and commits the catalog second.

pub mod files;
pub mod labels;
pub mod projects;
pub mod sections;

use std::path::PathBuf;

use crate::{
    error::{AppError, AppResult},
    models::{FileEntry, Project, Section},
    state::AppState,
};

pub(crate) async fn load_project(state: &AppState, id: i32) -> AppResult<Project> {
    state
        .catalog
        .get_project(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Project {} not found", id)))
}

pub(crate) async fn load_section(state: &AppState, id: i32) -> AppResult<Section> {
    state
        .catalog
        .get_section(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Section {} not found", id)))
}

pub(crate) async fn load_file(state: &AppState, id: i32) -> AppResult<FileEntry> {
    state
        .catalog
        .get_file(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("File {} not found", id)))
}

/// A file with the section and project it lives in.
#[derive(Debug, Clone)]
pub(crate) struct FileContext {
    pub project: Project,
    pub section: Section,
    pub file: FileEntry,
}

pub(crate) async fn load_file_context(state: &AppState, file_id: i32) -> AppResult<FileContext> {
    let file = load_file(state, file_id).await?;
    let section = load_section(state, file.section_id).await?;
    let project = load_project(state, section.project_id).await?;
    Ok(FileContext {
        project,
        section,
        file,
    })
}

/// Directory holding a file's payload and label.
///
/// Normally the resolved `<project>/<section>/<file folder>` directory. A
/// file row without a folder id keeps whatever directory its stored payload
/// is in, so renaming it never strands the payload.
pub(crate) fn file_directory(state: &AppState, ctx: &FileContext) -> AppResult<PathBuf> {
    if ctx.file.folder_name.as_deref().is_none_or(|f| f.trim().is_empty()) {
        if let Some(stored) = &ctx.file.path_file {
            let payload = state.paths.to_absolute(stored)?;
            if let Some(parent) = payload.parent() {
                return Ok(parent.to_path_buf());
            }
        }
    }
    Ok(state
        .paths
        .file_dir(&ctx.project, &ctx.section, ctx.file.folder_segment())?)
}
