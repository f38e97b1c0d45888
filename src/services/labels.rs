use tracing::{error, info, warn};

use super::{FileContext, file_directory};
use crate::{
    error::AppResult,
    label::{LabelContent, write_label},
    models::{FileEntry, Project, Section},
    paths::label_file_name_beside,
    state::AppState,
};

/// Render the label of a file under its current names and record it.
///
/// The new PDF is written before the old one is removed, so a failed render
/// leaves the previous label (and the row pointing at it) intact. The label
/// never takes the payload's name, and an old label path that now holds the
/// payload is left alone. The QR payload depends only on the file id.
pub(crate) async fn regenerate_label(state: &AppState, ctx: &FileContext) -> AppResult<FileEntry> {
    let dir = file_directory(state, ctx)?;
    tokio::fs::create_dir_all(&dir).await?;
    let target = dir.join(label_file_name_beside(
        &ctx.file.name,
        ctx.file.path_file.as_deref(),
    ));

    let url = state.download_url(ctx.file.id);
    let content = LabelContent {
        url: url.clone(),
        display_name: ctx.file.name.clone(),
        project_name: ctx.project.project_name.clone(),
        section_name: ctx.section.section_name.clone(),
        tags: state.catalog.file_tags(ctx.file.id).await?,
    };
    write_label(target.clone(), content).await?;

    let path_pdf = state.paths.to_db_relative(&target)?;
    let updated = state.catalog.set_label(ctx.file.id, &url, &path_pdf).await?;

    let stale = ctx
        .file
        .path_pdf
        .as_deref()
        .filter(|old| *old != path_pdf && Some(*old) != ctx.file.path_file.as_deref());
    if let Some(old) = stale {
        match state.paths.to_absolute(old) {
            Ok(abs) => {
                if let Err(e) = state.storage.remove_file(&abs).await {
                    warn!("Failed to remove stale label {:?}: {}", abs, e);
                }
            }
            Err(e) => warn!("Stale label path '{}' ignored: {}", old, e),
        }
    }

    info!(file_id = ctx.file.id, path_pdf = %path_pdf, "Label regenerated");
    Ok(updated)
}

/// Regenerate the labels of every file in `files` after a rename. Failures
/// are logged per file and do not stop the batch; returns how many labels
/// were rewritten.
pub(crate) async fn refresh_labels(
    state: &AppState,
    project: &Project,
    sections: &[Section],
    files: Vec<FileEntry>,
) -> usize {
    let mut refreshed = 0;
    for file in files {
        let Some(section) = sections.iter().find(|s| s.id == file.section_id) else {
            warn!(file_id = file.id, "File has no loaded section, label not refreshed");
            continue;
        };
        let ctx = FileContext {
            project: project.clone(),
            section: section.clone(),
            file,
        };
        match regenerate_label(state, &ctx).await {
            Ok(_) => refreshed += 1,
            Err(e) => error!(file_id = ctx.file.id, "Label refresh failed: {}", e),
        }
    }
    refreshed
}
