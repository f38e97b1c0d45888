use std::collections::BTreeMap;

use tracing::{error, info, warn};

use super::{labels::refresh_labels, load_project, load_section};
use crate::{
    catalog::{FilePathUpdate, NewSection, SectionUpdate},
    error::{AppError, AppResult},
    models::{FileEntry, Section},
    naming::generate_opaque_id,
    paths::{rebase_stored_path, validate_segment},
    state::AppState,
};

/// Create several sections in one project. Blank names are ignored; if any
/// name is already used (or repeated in the request) nothing is created.
pub async fn add_sections(
    state: &AppState,
    project_id: i32,
    names: Vec<String>,
) -> AppResult<Vec<Section>> {
    let _guard = state.locks.lock_project(project_id).await;
    let project = load_project(state, project_id).await?;

    let names: Vec<String> = names
        .into_iter()
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .collect();
    if names.is_empty() {
        return Err(AppError::Validation(
            "At least one section name is required".into(),
        ));
    }

    let mut errors = BTreeMap::new();
    for (i, name) in names.iter().enumerate() {
        if names[..i].contains(name) {
            errors.insert(name.clone(), format!("Section name '{}' is repeated", name));
        } else if state.catalog.find_section_by_name(project_id, name).await?.is_some() {
            errors.insert(
                name.clone(),
                format!("Section name '{}' is already in use", name),
            );
        }
    }
    if !errors.is_empty() {
        return Err(AppError::NameConflicts(errors));
    }

    let mut new_sections = Vec::with_capacity(names.len());
    let mut created_dirs = Vec::with_capacity(names.len());
    for name in names {
        let folder_name = generate_opaque_id();
        let dir = state.paths.dir_for(&[project.folder_segment(), folder_name.as_str()])?;
        if let Err(e) = tokio::fs::create_dir_all(&dir).await {
            remove_dirs(state, &created_dirs).await;
            return Err(e.into());
        }
        created_dirs.push(dir);
        new_sections.push(NewSection { name, folder_name });
    }

    match state.catalog.insert_sections(project_id, new_sections).await {
        Ok(created) => {
            for section in &created {
                info!(
                    project_id,
                    section_id = section.id,
                    section_name = %section.section_name,
                    "Section created"
                );
            }
            Ok(created)
        }
        Err(e) => {
            remove_dirs(state, &created_dirs).await;
            Err(e)
        }
    }
}

async fn remove_dirs(state: &AppState, dirs: &[std::path::PathBuf]) {
    for dir in dirs {
        if let Err(e) = state.storage.remove_tree(dir).await {
            warn!("Failed to remove {:?} after aborted create: {}", dir, e);
        }
    }
}

/// Rewrite the stored paths of `files` from one directory prefix to another.
pub(crate) fn rebase_files(
    files: &[FileEntry],
    old_prefix: &[String],
    new_prefix: &[String],
) -> Vec<FilePathUpdate> {
    files
        .iter()
        .filter_map(|file| {
            let rebase = |p: &Option<String>| {
                p.as_deref()
                    .map(|p| rebase_stored_path(p, old_prefix, new_prefix).unwrap_or_else(|| p.to_string()))
            };
            let path_file = rebase(&file.path_file);
            let path_pdf = rebase(&file.path_pdf);
            (path_file != file.path_file || path_pdf != file.path_pdf).then(|| FilePathUpdate {
                file_id: file.id,
                path_file,
                path_pdf,
            })
        })
        .collect()
}

/// Rename a section.
///
/// A section with a folder id only changes its name. A legacy section whose
/// directory is its name has the directory moved first and every stored path
/// below it rewritten in the same catalog transaction; if that commit fails
/// the directory is moved back. Labels of the section's files are then
/// regenerated so their breadcrumb shows the new name.
pub async fn rename_section(state: &AppState, section_id: i32, new_name: &str) -> AppResult<Section> {
    let new_name = new_name.trim();
    if new_name.is_empty() {
        return Err(AppError::Validation("Section name is required".into()));
    }

    let project_id = load_section(state, section_id).await?.project_id;
    let _guard = state.locks.lock_project(project_id).await;
    let section = load_section(state, section_id).await?;
    if section.section_name == new_name {
        return Ok(section);
    }

    if let Some(other) = state
        .catalog
        .find_section_by_name(section.project_id, new_name)
        .await?
    {
        if other.id != section.id {
            return Err(AppError::Conflict(format!(
                "Section name '{}' is already in use",
                new_name
            )));
        }
    }

    let project = load_project(state, section.project_id).await?;
    let files = state.catalog.list_files(section.id).await?;

    let mut moved = None;
    let mut file_paths = Vec::new();
    if section.is_legacy() {
        validate_segment(new_name)?;
        let old_dir = state.paths.section_dir(&project, &section)?;
        let new_dir = state.paths.dir_for(&[project.folder_segment(), new_name])?;
        if state.storage.exists(&old_dir).await {
            state.storage.move_dir(&old_dir, &new_dir).await?;
            moved = Some((old_dir, new_dir));
        }
        file_paths = rebase_files(
            &files,
            &state.paths.stored_prefix(&[project.folder_segment(), section.folder_segment()]),
            &state.paths.stored_prefix(&[project.folder_segment(), new_name]),
        );
    }

    let update = SectionUpdate {
        name: new_name.to_string(),
        file_paths,
    };
    let renamed = match state.catalog.update_section(section.id, update).await {
        Ok(renamed) => renamed,
        Err(e) => {
            if let Some((old_dir, new_dir)) = &moved {
                if let Err(undo) = state.storage.move_dir(new_dir, old_dir).await {
                    error!(
                        "Could not move {:?} back to {:?} after failed rename: {}",
                        new_dir, old_dir, undo
                    );
                }
            }
            return Err(e);
        }
    };

    info!(
        section_id,
        from = %section.section_name,
        to = %renamed.section_name,
        moved = moved.is_some(),
        "Section renamed"
    );

    let files = state.catalog.list_files(section.id).await?;
    let refreshed = refresh_labels(state, &project, std::slice::from_ref(&renamed), files).await;
    info!(section_id, refreshed, "Section labels refreshed");

    Ok(renamed)
}

/// Delete a section row (cascading to its files and tags), then its folder.
pub async fn delete_section(state: &AppState, section_id: i32) -> AppResult<()> {
    let project_id = load_section(state, section_id).await?.project_id;
    let _guard = state.locks.lock_project(project_id).await;
    let section = load_section(state, section_id).await?;
    let project = load_project(state, section.project_id).await?;

    state.catalog.delete_section(section.id).await?;

    match state.paths.section_dir(&project, &section) {
        Ok(dir) => match state.storage.remove_tree(&dir).await {
            Ok(true) => {}
            Ok(false) => warn!("Section folder {:?} was already gone", dir),
            Err(e) => error!("Failed to remove section folder {:?}: {}", dir, e),
        },
        Err(e) => error!(section_id, "Section folder not resolvable: {}", e),
    }

    info!(section_id, section_name = %section.section_name, "Section deleted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(id: i32, path_file: &str, path_pdf: Option<&str>) -> FileEntry {
        FileEntry {
            id,
            section_id: 1,
            name: "a".into(),
            folder_name: None,
            path_file: Some(path_file.into()),
            path_pdf: path_pdf.map(str::to_string),
            url_qr_code: None,
            created_at: None,
            updated_at: None,
        }
    }

    fn prefix(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn only_files_under_the_old_prefix_are_rebased() {
        let files = vec![
            file(1, "uploads/Server/Rack1/a/a.png", Some("uploads/Server/Rack1/a/a_qr.pdf")),
            file(2, "uploads/Server/Rack10/b/b.png", None),
        ];
        let updates = rebase_files(
            &files,
            &prefix(&["uploads", "Server", "Rack1"]),
            &prefix(&["uploads", "Server", "Rack1-new"]),
        );
        assert_eq!(
            updates,
            vec![FilePathUpdate {
                file_id: 1,
                path_file: Some("uploads/Server/Rack1-new/a/a.png".into()),
                path_pdf: Some("uploads/Server/Rack1-new/a/a_qr.pdf".into()),
            }]
        );
    }
}
