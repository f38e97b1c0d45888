use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use chrono::NaiveDateTime;

use crate::paths::effective_segment;

fn has_no_folder(folder_name: Option<&str>) -> bool {
    folder_name.map(str::trim).is_none_or(str::is_empty)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Project {
    pub id: i32,
    pub project_name: String,
    /// Opaque directory name; `None` for rows created before folder ids existed.
    pub folder_name: Option<String>,
    pub project_image: Option<String>,
    pub created_at: Option<NaiveDateTime>,
    pub updated_at: Option<NaiveDateTime>,
}

impl Project {
    /// Directory segment under the uploads root.
    pub fn folder_segment(&self) -> &str {
        effective_segment(self.folder_name.as_deref(), &self.project_name)
    }

    /// Whether the on-disk directory is named after `project_name`
    /// (row predates folder ids).
    pub fn is_legacy(&self) -> bool {
        has_no_folder(self.folder_name.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Section {
    pub id: i32,
    pub project_id: i32,
    pub section_name: String,
    pub folder_name: Option<String>,
    pub created_at: Option<NaiveDateTime>,
    pub updated_at: Option<NaiveDateTime>,
}

impl Section {
    pub fn folder_segment(&self) -> &str {
        effective_segment(self.folder_name.as_deref(), &self.section_name)
    }

    pub fn is_legacy(&self) -> bool {
        has_no_folder(self.folder_name.as_deref())
    }
}

/// A stored upload. Named `FileEntry` to stay clear of `std::fs::File`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct FileEntry {
    pub id: i32,
    pub section_id: i32,
    pub name: String,
    pub folder_name: Option<String>,
    pub path_file: Option<String>,
    pub path_pdf: Option<String>,
    pub url_qr_code: Option<String>,
    pub created_at: Option<NaiveDateTime>,
    pub updated_at: Option<NaiveDateTime>,
}

impl FileEntry {
    pub fn folder_segment(&self) -> &str {
        effective_segment(self.folder_name.as_deref(), &self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Tag {
    pub id: i32,
    pub file_id: i32,
    pub tag_name: String,
}

/// A file row together with its tags, as returned by the file endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileResponse {
    #[serde(flatten)]
    pub file: FileEntry,
    pub tags: Vec<String>,
}

/// A file row with the size of its payload on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileWithSize {
    #[serde(flatten)]
    pub file: FileEntry,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct SearchHit {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub file: FileEntry,
    pub section_name: String,
    pub project_name: String,
}

#[derive(Debug, Deserialize)]
pub struct AddSectionsRequest {
    #[serde(rename = "projectId")]
    pub project_id: i32,
    #[serde(rename = "sectionNames")]
    pub section_names: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct RenameSectionRequest {
    pub section_name: String,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub term: String,
}

#[derive(Debug, Deserialize)]
pub struct CheckFileNameQuery {
    #[serde(rename = "fileName")]
    pub file_name: Option<String>,
    #[serde(rename = "sectionId")]
    pub section_id: Option<i32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ExistsResponse {
    pub exists: bool,
}
