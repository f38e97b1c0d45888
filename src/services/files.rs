use std::path::PathBuf;

use bytes::Bytes;
use tracing::{error, info, warn};

use super::{FileContext, file_directory, labels::regenerate_label, load_file_context, load_project, load_section};
use crate::{
    archive::{ArchiveEntry, build_zip_blocking, zip_directory},
    catalog::{FileUpdate, NewFile},
    error::{AppError, AppResult},
    models::{FileEntry, FileResponse, FileWithSize, Section},
    naming::{generate_opaque_id, is_opaque_id},
    paths::label_file_name,
    state::AppState,
    utils::{sanitize_file_stem, stem_of, upload_basename},
};

/// The bytes of an uploaded file and the name the client sent with them.
#[derive(Debug, Clone)]
pub struct Payload {
    pub filename: String,
    pub data: Bytes,
}

/// Which section an upload goes into.
#[derive(Debug, Clone)]
pub enum SectionRef {
    Id(i32),
    Names { project: String, section: String },
}

#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub payload: Payload,
    pub display_name: Option<String>,
    pub tags: Vec<String>,
    pub target: SectionRef,
}

#[derive(Debug, Clone, Default)]
pub struct FileChanges {
    pub display_name: Option<String>,
    /// `None` keeps the tag set, `Some` replaces it.
    pub tags: Option<Vec<String>>,
    pub payload: Option<Payload>,
}

fn check_size(state: &AppState, payload: &Payload) -> AppResult<()> {
    let size = payload.data.len() as u64;
    if size > state.config.max_file_size {
        error!(
            "File size {} exceeds maximum limit of {} bytes",
            size, state.config.max_file_size
        );
        return Err(AppError::PayloadTooLarge(format!(
            "File size {} exceeds maximum limit of {} bytes",
            size, state.config.max_file_size
        )));
    }
    if payload.filename.trim().is_empty() {
        return Err(AppError::BadRequest("Uploaded file has no name".into()));
    }
    Ok(())
}

async fn resolve_section(state: &AppState, target: &SectionRef) -> AppResult<Section> {
    match target {
        SectionRef::Id(id) => load_section(state, *id).await,
        SectionRef::Names { project, section } => {
            let project_row = state
                .catalog
                .find_project_by_name(project.trim())
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Project '{}' not found", project)))?;
            state
                .catalog
                .find_section_by_name(project_row.id, section.trim())
                .await?
                .ok_or_else(|| {
                    AppError::NotFound(format!(
                        "Section '{}' not found in project '{}'",
                        section, project
                    ))
                })
        }
    }
}

async fn with_tags(state: &AppState, file: FileEntry) -> AppResult<FileResponse> {
    let tags = state.catalog.file_tags(file.id).await?;
    Ok(FileResponse { file, tags })
}

/// Store an upload in a fresh folder, record it, then render its label.
///
/// A label failure does not undo the upload: the row is returned with a
/// null `url_qr_code` and can be repaired with [`regenerate`].
pub async fn upload(state: &AppState, request: UploadRequest) -> AppResult<FileResponse> {
    check_size(state, &request.payload)?;
    let display_name = request
        .display_name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| stem_of(&upload_basename(&request.payload.filename)));
    if display_name.trim().is_empty() {
        return Err(AppError::Validation("File name is required".into()));
    }

    let project_id = resolve_section(state, &request.target).await?.project_id;
    let _guard = state.locks.lock_project(project_id).await;
    let section = resolve_section(state, &request.target).await?;
    let project = load_project(state, section.project_id).await?;

    let folder_name = generate_opaque_id();
    let dir = state
        .paths
        .resolve_file_dir(&project, &section, &folder_name)
        .await?;
    let payload_path = dir.join(upload_basename(&request.payload.filename));
    let stored = async {
        state.storage.write(&payload_path, &request.payload.data).await?;
        AppResult::Ok(state.paths.to_db_relative(&payload_path)?)
    }
    .await;
    let path_file = match stored {
        Ok(path_file) => path_file,
        Err(e) => {
            let _ = state.storage.remove_tree(&dir).await;
            return Err(e);
        }
    };

    let new = NewFile {
        section_id: section.id,
        name: display_name,
        folder_name,
        path_file,
        tags: request.tags,
    };
    let file = match state.catalog.insert_file(new).await {
        Ok(file) => file,
        Err(e) => {
            let _ = state.storage.remove_tree(&dir).await;
            return Err(e);
        }
    };
    info!(
        file_id = file.id,
        section_id = section.id,
        path_file = ?file.path_file,
        size = request.payload.data.len(),
        "File uploaded"
    );

    let ctx = FileContext {
        project,
        section,
        file,
    };
    let file = match regenerate_label(state, &ctx).await {
        Ok(file) => file,
        Err(e) => {
            error!(file_id = ctx.file.id, "Label generation failed, file stored without QR code: {}", e);
            ctx.file
        }
    };
    with_tags(state, file).await
}

/// Rename a file, replace its tags and/or its payload, then regenerate its
/// label. The folder id never changes; a replacement payload is written into
/// the same folder before the old one is removed.
pub async fn update(state: &AppState, file_id: i32, changes: FileChanges) -> AppResult<FileResponse> {
    if let Some(payload) = &changes.payload {
        check_size(state, payload)?;
    }

    let project_id = load_file_context(state, file_id).await?.project.id;
    let _guard = state.locks.lock_project(project_id).await;
    let ctx = load_file_context(state, file_id).await?;

    let name = changes
        .display_name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or(&ctx.file.name)
        .to_string();

    let dir = file_directory(state, &ctx)?;
    let mut replaced = None;
    let mut written = None;
    let mut path_file = ctx.file.path_file.clone();
    if let Some(payload) = &changes.payload {
        let new_path = dir.join(upload_basename(&payload.filename));
        state.storage.write(&new_path, &payload.data).await?;
        let stored = state.paths.to_db_relative(&new_path)?;
        if path_file.as_deref() != Some(stored.as_str()) {
            replaced = path_file.take();
            written = Some(new_path);
        }
        path_file = Some(stored);
    }

    let update = FileUpdate {
        name,
        path_file,
        path_pdf: ctx.file.path_pdf.clone(),
        url_qr_code: ctx.file.url_qr_code.clone(),
        tags: changes.tags,
    };
    let updated = match state.catalog.update_file(file_id, update).await {
        Ok(updated) => updated,
        Err(e) => {
            if let Some(written) = &written {
                let _ = state.storage.remove_file(written).await;
            }
            return Err(e);
        }
    };

    if let Some(old) = replaced {
        match state.paths.to_absolute(&old) {
            Ok(abs) => {
                if let Err(e) = state.storage.remove_file(&abs).await {
                    warn!("Failed to remove replaced payload {:?}: {}", abs, e);
                }
            }
            Err(e) => warn!("Replaced payload path '{}' ignored: {}", old, e),
        }
    }

    info!(
        file_id,
        from = %ctx.file.name,
        to = %updated.name,
        path_file = ?updated.path_file,
        "File updated"
    );

    let ctx = FileContext {
        file: updated,
        ..ctx
    };
    let file = regenerate_label(state, &ctx).await?;
    with_tags(state, file).await
}

/// Re-render a file's label under its current names.
pub async fn regenerate(state: &AppState, file_id: i32) -> AppResult<FileResponse> {
    let project_id = load_file_context(state, file_id).await?.project.id;
    let _guard = state.locks.lock_project(project_id).await;
    let ctx = load_file_context(state, file_id).await?;
    let file = regenerate_label(state, &ctx).await?;
    with_tags(state, file).await
}

/// Delete a file row (and its tags), then its payload, its label and its
/// folder once empty.
pub async fn delete(state: &AppState, file_id: i32) -> AppResult<()> {
    let project_id = load_file_context(state, file_id).await?.project.id;
    let _guard = state.locks.lock_project(project_id).await;
    let ctx = load_file_context(state, file_id).await?;
    let dir = file_directory(state, &ctx);

    state.catalog.delete_file(file_id).await?;

    let label = ctx.file.path_pdf.as_ref().filter(|pdf| Some(*pdf) != ctx.file.path_file.as_ref());
    for stored in [ctx.file.path_file.as_ref(), label].into_iter().flatten() {
        match state.paths.to_absolute(stored) {
            Ok(abs) => match state.storage.remove_file(&abs).await {
                Ok(true) => {}
                Ok(false) => warn!("{:?} was already gone", abs),
                Err(e) => error!("Failed to remove {:?}: {}", abs, e),
            },
            Err(e) => warn!("Stored path '{}' ignored: {}", stored, e),
        }
    }
    // Only a folder id names a folder the file owns; a legacy payload may sit
    // directly in its section's folder
    let owns_folder = ctx.file.folder_name.as_deref().is_some_and(is_opaque_id);
    match dir {
        Ok(dir) if owns_folder => {
            if let Err(e) = state.storage.remove_dir_if_empty(&dir).await {
                warn!("Failed to remove file folder {:?}: {}", dir, e);
            }
        }
        Ok(dir) => info!(file_id, "Keeping shared folder {:?}", dir),
        Err(e) => warn!(file_id, "File folder not resolvable: {}", e),
    }

    info!(
        file_id,
        name = %ctx.file.name,
        path_file = ?ctx.file.path_file,
        path_pdf = ?ctx.file.path_pdf,
        "File deleted"
    );
    Ok(())
}

pub async fn get(state: &AppState, file_id: i32) -> AppResult<FileResponse> {
    let file = super::load_file(state, file_id).await?;
    with_tags(state, file).await
}

pub async fn tags(state: &AppState, file_id: i32) -> AppResult<Vec<String>> {
    super::load_file(state, file_id).await?;
    state.catalog.file_tags(file_id).await
}

pub async fn name_exists(state: &AppState, section_id: i32, name: &str) -> AppResult<bool> {
    state.catalog.file_name_exists(section_id, name.trim()).await
}

/// Files of a section with the size of each payload on disk.
pub async fn list_with_sizes(state: &AppState, section_id: i32) -> AppResult<Vec<FileWithSize>> {
    load_section(state, section_id).await?;
    let files = state.catalog.list_files(section_id).await?;
    let mut out = Vec::with_capacity(files.len());
    for file in files {
        let size = match file.path_file.as_deref().map(|p| state.paths.to_absolute(p)) {
            Some(Ok(abs)) => state.storage.size_of(&abs).await,
            _ => 0,
        };
        out.push(FileWithSize { file, size });
    }
    Ok(out)
}

/// Original bytes of a file and the name to download them as.
pub async fn read_payload(state: &AppState, file_id: i32) -> AppResult<(String, Bytes)> {
    let file = super::load_file(state, file_id).await?;
    let stored = file
        .path_file
        .as_deref()
        .ok_or_else(|| AppError::NotFound(format!("File {} has no stored payload", file_id)))?;
    let abs = state.paths.to_absolute(stored)?;
    let bytes = state.storage.read(&abs).await?;
    let basename = abs
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| format!("file-{}", file_id));
    info!(file_id, path = %stored, "Payload served");
    Ok((basename, bytes))
}

/// Zip of everything in a file's folder, with the archive's download name.
pub async fn zip_folder(state: &AppState, file_id: i32) -> AppResult<(String, Vec<u8>)> {
    let ctx = load_file_context(state, file_id).await?;
    let dir = file_directory(state, &ctx)?;
    if !state.storage.exists(&dir).await {
        return Err(AppError::NotFound(format!("Folder of file {} not found on disk", file_id)));
    }
    let (bytes, written) = zip_directory(dir).await?;
    info!(file_id, entries = written, "File folder zipped");
    Ok((format!("{}.zip", sanitize_file_stem(&ctx.file.name)), bytes))
}

/// What an export bundles for each file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKind {
    Originals,
    Labels,
}

/// Archive entry for one file, named after display names. `prefix` is the
/// section display name for project-wide exports.
fn export_entry(state: &AppState, file: &FileEntry, prefix: Option<&str>, kind: ExportKind) -> Option<ArchiveEntry> {
    let (stored, name) = match kind {
        ExportKind::Originals => {
            let stored = file.path_file.as_deref()?;
            let basename = upload_basename(stored);
            (stored, format!("{}/{}", sanitize_file_stem(&file.name), basename))
        }
        ExportKind::Labels => (file.path_pdf.as_deref()?, label_file_name(&file.name)),
    };
    let source: PathBuf = match state.paths.to_absolute(stored) {
        Ok(source) => source,
        Err(e) => {
            warn!(file_id = file.id, "Export skips '{}': {}", stored, e);
            return None;
        }
    };
    let name = match prefix {
        Some(prefix) => format!("{}/{}", sanitize_file_stem(prefix), name),
        None => name,
    };
    Some(ArchiveEntry::new(name, source))
}

async fn export(entries: Vec<ArchiveEntry>, scope: &str) -> AppResult<Vec<u8>> {
    if entries.is_empty() {
        return Err(AppError::NotFound(format!("No files to export in {}", scope)));
    }
    let (bytes, written) = build_zip_blocking(entries).await?;
    if written == 0 {
        return Err(AppError::NotFound(format!("No files to export in {}", scope)));
    }
    info!(scope, entries = written, "Export served");
    Ok(bytes)
}

/// Zip of a section's originals or labels, with the archive's download name.
pub async fn export_section(state: &AppState, section_id: i32, kind: ExportKind) -> AppResult<(String, Vec<u8>)> {
    let section = load_section(state, section_id).await?;
    let files = state.catalog.list_files(section.id).await?;
    let entries = files
        .iter()
        .filter_map(|f| export_entry(state, f, None, kind))
        .collect();
    let bytes = export(entries, &format!("section {}", section.id)).await?;
    Ok((archive_name(&section.section_name, kind), bytes))
}

/// Zip of a project's originals or labels, grouped by section.
pub async fn export_project(state: &AppState, project_id: i32, kind: ExportKind) -> AppResult<(String, Vec<u8>)> {
    let project = load_project(state, project_id).await?;
    let sections = state.catalog.list_sections(project.id).await?;
    let files = state.catalog.list_project_files(project.id).await?;
    let entries = files
        .iter()
        .filter_map(|f| {
            let section = sections.iter().find(|s| s.id == f.section_id)?;
            export_entry(state, f, Some(&section.section_name), kind)
        })
        .collect();
    let bytes = export(entries, &format!("project {}", project.id)).await?;
    Ok((archive_name(&project.project_name, kind), bytes))
}

fn archive_name(display: &str, kind: ExportKind) -> String {
    match kind {
        ExportKind::Originals => format!("{}_files.zip", sanitize_file_stem(display)),
        ExportKind::Labels => format!("{}_qr.zip", sanitize_file_stem(display)),
    }
}
