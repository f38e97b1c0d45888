use crate::catalog::SharedCatalog;
use crate::config::Config;
use crate::locks::EntityLocks;
use crate::paths::PathMapper;
use crate::storage::LocalStorage;

/// Central application state shared across all Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Projects, sections, files and tags.
    pub catalog: SharedCatalog,

    /// Filesystem access below the uploads root.
    pub storage: LocalStorage,

    /// Entity identity to on-disk and DB-stored paths.
    pub paths: PathMapper,

    pub locks: EntityLocks,

    /// Application configuration loaded from environment variables or `.env`.
    pub config: Config,
}

impl AppState {
    /// Wire the state for a loaded config and catalog, creating the uploads
    /// tree if needed.
    pub async fn new(config: Config, catalog: SharedCatalog) -> anyhow::Result<Self> {
        let paths = PathMapper::new(config.app_root.clone(), &config.uploads_dir);
        let storage = LocalStorage::new(paths.uploads_root(), &paths.project_images_dir()).await?;
        Ok(Self {
            catalog,
            storage,
            paths,
            locks: EntityLocks::new(),
            config,
        })
    }

    /// Permanent download URL of a file, embedded in its QR code.
    pub fn download_url(&self, file_id: i32) -> String {
        format!(
            "{}/api/uploadFile/download-file/{}",
            self.config.base_url, file_id
        )
    }
}
