// Persistence of projects, sections, files and tags
mod memory;
mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::{
    config::Config,
    database::init_db,
    error::AppResult,
    models::{FileEntry, Project, SearchHit, Section},
};

pub use memory::MemoryCatalog;
pub use postgres::PgCatalog;

#[derive(Debug, Clone)]
pub struct NewProject {
    pub name: String,
    pub folder_name: String,
    pub image: Option<String>,
}

/// Full replacement of a project's mutable columns, applied atomically
/// together with any stored-path rewrites of its files.
#[derive(Debug, Clone)]
pub struct ProjectUpdate {
    pub name: String,
    pub image: Option<String>,
    pub file_paths: Vec<FilePathUpdate>,
}

#[derive(Debug, Clone)]
pub struct NewSection {
    pub name: String,
    pub folder_name: String,
}

#[derive(Debug, Clone)]
pub struct SectionUpdate {
    pub name: String,
    pub file_paths: Vec<FilePathUpdate>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilePathUpdate {
    pub file_id: i32,
    pub path_file: Option<String>,
    pub path_pdf: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewFile {
    pub section_id: i32,
    pub name: String,
    pub folder_name: String,
    pub path_file: String,
    pub tags: Vec<String>,
}

/// New values for a file row. `tags: None` leaves the tag set alone; `Some`
/// replaces it (tags not listed are deleted, new ones inserted).
#[derive(Debug, Clone)]
pub struct FileUpdate {
    pub name: String,
    pub path_file: Option<String>,
    pub path_pdf: Option<String>,
    pub url_qr_code: Option<String>,
    pub tags: Option<Vec<String>>,
}

/// Relational store behind the service. Deleting a project or section
/// removes every row below it; deleting a file removes its tags.
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn list_projects(&self) -> AppResult<Vec<Project>>;
    async fn get_project(&self, id: i32) -> AppResult<Option<Project>>;
    async fn find_project_by_name(&self, name: &str) -> AppResult<Option<Project>>;
    /// Whether another project (not `except`) already uses `name`.
    async fn project_name_taken(&self, name: &str, except: Option<i32>) -> AppResult<bool>;
    async fn insert_project(&self, new: NewProject) -> AppResult<Project>;
    /// Fails with `Conflict` if the name is taken and `NotFound` if the row is gone.
    async fn update_project(&self, id: i32, update: ProjectUpdate) -> AppResult<Project>;
    async fn delete_project(&self, id: i32) -> AppResult<bool>;

    async fn list_sections(&self, project_id: i32) -> AppResult<Vec<Section>>;
    async fn get_section(&self, id: i32) -> AppResult<Option<Section>>;
    async fn find_section_by_name(&self, project_id: i32, name: &str) -> AppResult<Option<Section>>;
    /// All-or-nothing insert of several sections into one project.
    async fn insert_sections(&self, project_id: i32, new: Vec<NewSection>) -> AppResult<Vec<Section>>;
    async fn update_section(&self, id: i32, update: SectionUpdate) -> AppResult<Section>;
    async fn delete_section(&self, id: i32) -> AppResult<bool>;

    async fn get_file(&self, id: i32) -> AppResult<Option<FileEntry>>;
    async fn list_files(&self, section_id: i32) -> AppResult<Vec<FileEntry>>;
    async fn list_project_files(&self, project_id: i32) -> AppResult<Vec<FileEntry>>;
    async fn file_name_exists(&self, section_id: i32, name: &str) -> AppResult<bool>;
    /// Inserts the row and its tags; `url_qr_code` and `path_pdf` start empty.
    async fn insert_file(&self, new: NewFile) -> AppResult<FileEntry>;
    async fn set_label(&self, id: i32, url_qr_code: &str, path_pdf: &str) -> AppResult<FileEntry>;
    async fn update_file(&self, id: i32, update: FileUpdate) -> AppResult<FileEntry>;
    async fn delete_file(&self, id: i32) -> AppResult<bool>;
    /// Tag names in insertion order.
    async fn file_tags(&self, file_id: i32) -> AppResult<Vec<String>>;
    /// Files of a project whose name, section name or a tag contains `term`,
    /// case-insensitively, each once, ordered by id.
    async fn search_project(&self, project_id: i32, term: &str) -> AppResult<Vec<SearchHit>>;
}

pub type SharedCatalog = Arc<dyn Catalog>;

// Initialize the catalog backend based on config
pub async fn init_catalog(config: &Config) -> anyhow::Result<SharedCatalog> {
    match &config.database_url {
        Some(url) => {
            info!("Initializing Postgres catalog");
            let pool = init_db(url, config.database_max_connections).await?;
            Ok(Arc::new(PgCatalog::new(pool)))
        }
        None => {
            warn!("DATABASE_URL not set, using the in-memory catalog; nothing survives a restart");
            Ok(Arc::new(MemoryCatalog::new()))
        }
    }
}
