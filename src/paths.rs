//! Mapping between entity identity and locations on disk.
//!
//! The tree under the uploads root is
//! `<project>/<section>/<file folder>/<payload>` where each directory segment
//! is the row's opaque `folder_name`, or its display name for rows created
//! before folder ids were introduced. Paths persisted in the database are
//! forward-slash separated and relative to the application root.

use std::path::{Component, Path, PathBuf};

use thiserror::Error;
use tokio::fs;

use crate::models::{Project, Section};
use crate::utils::sanitize_file_stem;

#[derive(Debug, Error)]
pub enum PathError {
    #[error("Path {0} is outside the application root")]
    OutsideRoot(String),

    #[error("Stored path '{0}' is not a plain relative path")]
    InvalidStoredPath(String),

    #[error("'{0}' cannot be used as a directory name")]
    InvalidSegment(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Directory under the uploads root holding project thumbnails.
const PROJECT_IMAGES_DIR: &str = "project_img";

/// Directory segment for a row: its folder id when present, else its name.
pub fn effective_segment<'a>(folder_name: Option<&'a str>, name: &'a str) -> &'a str {
    match folder_name.map(str::trim) {
        Some(folder) if !folder.is_empty() => folder,
        _ => name,
    }
}

/// Reject anything that would not stay a single directory level.
pub fn validate_segment(segment: &str) -> Result<&str, PathError> {
    let invalid = segment.is_empty()
        || segment == "."
        || segment == ".."
        || segment.contains(['/', '\\', '\0']);
    if invalid {
        return Err(PathError::InvalidSegment(segment.to_string()));
    }
    Ok(segment)
}

/// File name of the label PDF generated for a display name.
pub fn label_file_name(display_name: &str) -> String {
    format!("{}_qr.pdf", sanitize_file_stem(display_name))
}

/// Label file name for a display name that never coincides with the file's
/// payload, which shares the folder. `payload` is the stored payload path.
pub fn label_file_name_beside(display_name: &str, payload: Option<&str>) -> String {
    let name = label_file_name(display_name);
    let payload_name = payload.and_then(|p| p.rsplit(['/', '\\']).next());
    match payload_name {
        Some(taken) if taken.eq_ignore_ascii_case(&name) => {
            format!("{}_qr_label.pdf", sanitize_file_stem(display_name))
        }
        _ => name,
    }
}

#[derive(Debug, Clone)]
pub struct PathMapper {
    app_root: PathBuf,
    /// Uploads root relative to `app_root`, one entry per directory level.
    uploads: Vec<String>,
}

impl PathMapper {
    pub fn new(app_root: impl Into<PathBuf>, uploads_dir: &str) -> Self {
        let uploads = uploads_dir
            .split(['/', '\\'])
            .filter(|s| !s.is_empty() && *s != ".")
            .map(str::to_string)
            .collect();
        Self {
            app_root: app_root.into(),
            uploads,
        }
    }

    pub fn app_root(&self) -> &Path {
        &self.app_root
    }

    pub fn uploads_root(&self) -> PathBuf {
        self.uploads
            .iter()
            .fold(self.app_root.clone(), |acc, s| acc.join(s))
    }

    /// Where project thumbnails live.
    pub fn project_images_dir(&self) -> PathBuf {
        self.uploads_root().join(PROJECT_IMAGES_DIR)
    }

    /// Join validated segments under the uploads root. Every resolution of a
    /// project, section or file directory goes through here, whether the
    /// segments are folder ids or legacy names. The thumbnail directory is
    /// never a project directory.
    pub fn dir_for(&self, segments: &[&str]) -> Result<PathBuf, PathError> {
        if segments
            .first()
            .is_some_and(|s| s.trim().eq_ignore_ascii_case(PROJECT_IMAGES_DIR))
        {
            return Err(PathError::InvalidSegment(segments[0].to_string()));
        }
        let mut dir = self.uploads_root();
        for segment in segments {
            dir.push(validate_segment(segment)?);
        }
        Ok(dir)
    }

    pub fn project_dir(&self, project: &Project) -> Result<PathBuf, PathError> {
        self.dir_for(&[project.folder_segment()])
    }

    pub fn section_dir(&self, project: &Project, section: &Section) -> Result<PathBuf, PathError> {
        self.dir_for(&[project.folder_segment(), section.folder_segment()])
    }

    pub fn file_dir(
        &self,
        project: &Project,
        section: &Section,
        file_folder: &str,
    ) -> Result<PathBuf, PathError> {
        self.dir_for(&[
            project.folder_segment(),
            section.folder_segment(),
            file_folder,
        ])
    }

    /// Resolve a file's directory and create it (and any missing parents).
    pub async fn resolve_file_dir(
        &self,
        project: &Project,
        section: &Section,
        file_folder: &str,
    ) -> Result<PathBuf, PathError> {
        let dir = self.file_dir(project, section, file_folder)?;
        fs::create_dir_all(&dir).await?;
        Ok(dir)
    }

    /// Path to persist for `abs`: relative to the application root, `/`
    /// separated on every platform.
    pub fn to_db_relative(&self, abs: &Path) -> Result<String, PathError> {
        let rel = abs
            .strip_prefix(&self.app_root)
            .map_err(|_| PathError::OutsideRoot(abs.display().to_string()))?;

        let mut parts = Vec::new();
        for component in rel.components() {
            match component {
                Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
                Component::CurDir => {}
                _ => return Err(PathError::OutsideRoot(abs.display().to_string())),
            }
        }
        if parts.is_empty() {
            return Err(PathError::OutsideRoot(abs.display().to_string()));
        }
        Ok(parts.join("/"))
    }

    /// Inverse of [`Self::to_db_relative`]. Backslashes written by older
    /// Windows deployments are accepted as separators.
    pub fn to_absolute(&self, stored: &str) -> Result<PathBuf, PathError> {
        let segments = stored_segments(stored)?;
        Ok(segments
            .iter()
            .fold(self.app_root.clone(), |acc, s| acc.join(s)))
    }

    /// Stored-path prefix (`uploads/<a>/<b>`) of a directory under the
    /// uploads root, given its segments.
    pub fn stored_prefix(&self, segments: &[&str]) -> Vec<String> {
        self.uploads
            .iter()
            .cloned()
            .chain(segments.iter().map(|s| s.to_string()))
            .collect()
    }
}

fn stored_segments(stored: &str) -> Result<Vec<&str>, PathError> {
    if stored.starts_with('/') || stored.starts_with('\\') {
        return Err(PathError::InvalidStoredPath(stored.to_string()));
    }
    let segments: Vec<&str> = stored
        .split(['/', '\\'])
        .filter(|s| !s.is_empty() && *s != ".")
        .collect();
    // A drive prefix such as `C:` in the first segment would make the join absolute.
    if segments.is_empty() || segments[0].contains(':') || segments.iter().any(|s| *s == "..") {
        return Err(PathError::InvalidStoredPath(stored.to_string()));
    }
    Ok(segments)
}

/// Swap the leading `old_prefix` segments of a stored path for `new_prefix`.
///
/// Matching is per segment, so renaming `Rack1` leaves `Rack10/...` alone.
/// Returns `None` when the path does not start with `old_prefix`.
pub fn rebase_stored_path(stored: &str, old_prefix: &[String], new_prefix: &[String]) -> Option<String> {
    let segments = stored_segments(stored).ok()?;
    if segments.len() < old_prefix.len()
        || !segments.iter().zip(old_prefix).all(|(a, b)| *a == b.as_str())
    {
        return None;
    }
    let rebased: Vec<&str> = new_prefix
        .iter()
        .map(String::as_str)
        .chain(segments[old_prefix.len()..].iter().copied())
        .collect();
    Some(rebased.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project(name: &str, folder: Option<&str>) -> Project {
        Project {
            id: 1,
            project_name: name.into(),
            folder_name: folder.map(str::to_string),
            project_image: None,
            created_at: None,
            updated_at: None,
        }
    }

    fn section(name: &str, folder: Option<&str>) -> Section {
        Section {
            id: 1,
            project_id: 1,
            section_name: name.into(),
            folder_name: folder.map(str::to_string),
            created_at: None,
            updated_at: None,
        }
    }

    #[test]
    fn thumbnail_directory_is_not_a_project_directory() {
        let mapper = PathMapper::new("/srv/app", "uploads");
        let legacy = project("project_img", None);
        assert!(matches!(
            mapper.project_dir(&legacy),
            Err(PathError::InvalidSegment(_))
        ));
        assert!(mapper.dir_for(&["p1", "project_img"]).is_ok());
    }

    #[test]
    fn label_name_steps_aside_for_a_payload_of_the_same_name() {
        assert_eq!(label_file_name_beside("report", None), "report_qr.pdf");
        assert_eq!(
            label_file_name_beside("report", Some("uploads/p1/s1/f1/diagram.png")),
            "report_qr.pdf"
        );
        assert_eq!(
            label_file_name_beside("report", Some("uploads/p1/s1/f1/report_qr.pdf")),
            "report_qr_label.pdf"
        );
        assert_eq!(
            label_file_name_beside("Report", Some("uploads/p1/s1/f1/REPORT_QR.PDF")),
            "Report_qr_label.pdf"
        );
    }

    #[test]
    fn folder_id_wins_over_name() {
        assert_eq!(effective_segment(Some("abc"), "Server"), "abc");
        assert_eq!(effective_segment(None, "Server"), "Server");
        assert_eq!(effective_segment(Some(""), "Server"), "Server");
        assert_eq!(effective_segment(Some("  "), "Server"), "Server");
    }

    #[test]
    fn file_dir_uses_folder_ids_and_legacy_names() {
        let mapper = PathMapper::new("/srv/app", "uploads");
        let dir = mapper
            .file_dir(&project("Server", Some("p1")), &section("Rack1", None), "f1")
            .unwrap();
        assert_eq!(dir, PathBuf::from("/srv/app/uploads/p1/Rack1/f1"));
    }

    #[test]
    fn segments_cannot_escape_the_tree() {
        let mapper = PathMapper::new("/srv/app", "uploads");
        assert!(mapper.dir_for(&["..", "x"]).is_err());
        assert!(mapper.dir_for(&["a/b"]).is_err());
        assert!(mapper.dir_for(&[""]).is_err());
    }

    #[test]
    fn db_relative_paths_use_forward_slashes() {
        let mapper = PathMapper::new("/srv/app", "uploads");
        let abs = mapper.dir_for(&["p1", "s1", "f1"]).unwrap().join("diagram.png");
        assert_eq!(
            mapper.to_db_relative(&abs).unwrap(),
            "uploads/p1/s1/f1/diagram.png"
        );
        assert!(mapper.to_db_relative(Path::new("/etc/passwd")).is_err());
    }

    #[test]
    fn relative_app_root_round_trips() {
        let mapper = PathMapper::new(".", "uploads");
        let abs = mapper.dir_for(&["p", "s", "f"]).unwrap().join("a.txt");
        let stored = mapper.to_db_relative(&abs).unwrap();
        assert_eq!(stored, "uploads/p/s/f/a.txt");
        assert_eq!(mapper.to_absolute(&stored).unwrap(), abs);
    }

    #[test]
    fn stored_paths_resolve_under_root() {
        let mapper = PathMapper::new("/srv/app", "uploads");
        assert_eq!(
            mapper.to_absolute("uploads\\p\\s\\f\\a.txt").unwrap(),
            PathBuf::from("/srv/app/uploads/p/s/f/a.txt")
        );
        assert!(mapper.to_absolute("../secret").is_err());
        assert!(mapper.to_absolute("/etc/passwd").is_err());
        assert!(mapper.to_absolute("").is_err());
    }

    #[test]
    fn rebase_matches_whole_segments() {
        let old = vec!["uploads".to_string(), "Rack1".to_string()];
        let new = vec!["uploads".to_string(), "Rack1-new".to_string()];
        assert_eq!(
            rebase_stored_path("uploads/Rack1/f/a.png", &old, &new).as_deref(),
            Some("uploads/Rack1-new/f/a.png")
        );
        assert_eq!(rebase_stored_path("uploads/Rack10/f/a.png", &old, &new), None);
    }

    #[test]
    fn label_names_are_filesystem_safe() {
        assert_eq!(label_file_name("diagram"), "diagram_qr.pdf");
        assert_eq!(label_file_name("a/b"), "a_b_qr.pdf");
    }

    #[tokio::test]
    async fn resolve_file_dir_creates_directories() {
        let tmp = tempfile::tempdir().unwrap();
        let mapper = PathMapper::new(tmp.path(), "uploads");
        let dir = mapper
            .resolve_file_dir(&project("P", Some("p1")), &section("S", Some("s1")), "f1")
            .await
            .unwrap();
        assert!(dir.is_dir());
        // Idempotent.
        mapper
            .resolve_file_dir(&project("P", Some("p1")), &section("S", Some("s1")), "f1")
            .await
            .unwrap();
    }
}
