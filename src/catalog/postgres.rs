use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};

use super::{Catalog, FilePathUpdate, FileUpdate, NewFile, NewProject, NewSection, ProjectUpdate, SectionUpdate};
use crate::{
    error::{AppError, AppResult},
    models::{FileEntry, Project, SearchHit, Section},
};

/// Postgres-backed catalog. Cascades are enforced by the schema's
/// `ON DELETE CASCADE` foreign keys.
#[derive(Debug, Clone)]
pub struct PgCatalog {
    pool: PgPool,
}

impl PgCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn conflict_on_unique(err: sqlx::Error, message: impl FnOnce() -> String) -> AppError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => AppError::Conflict(message()),
        _ => AppError::Database(err),
    }
}

/// Escape LIKE metacharacters so the search term matches literally.
fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

async fn project_name_taken_tx(
    tx: &mut Transaction<'_, Postgres>,
    name: &str,
    except: i32,
) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS (SELECT 1 FROM project WHERE project_name = $1 AND id <> $2)",
    )
    .bind(name)
    .bind(except)
    .fetch_one(&mut **tx)
    .await
}

async fn rewrite_file_paths(
    tx: &mut Transaction<'_, Postgres>,
    updates: &[FilePathUpdate],
) -> Result<(), sqlx::Error> {
    for update in updates {
        sqlx::query(
            "UPDATE file SET path_file = $2, path_pdf = $3, updated_at = NOW() WHERE id = $1",
        )
        .bind(update.file_id)
        .bind(&update.path_file)
        .bind(&update.path_pdf)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

async fn insert_tags(
    tx: &mut Transaction<'_, Postgres>,
    file_id: i32,
    tags: &[String],
) -> Result<(), sqlx::Error> {
    for tag in tags {
        sqlx::query("INSERT INTO tag (file_id, tag_name) VALUES ($1, $2)")
            .bind(file_id)
            .bind(tag)
            .execute(&mut **tx)
            .await?;
    }
    Ok(())
}

/// Make the file's tag set equal to `tags`: delete what is no longer listed,
/// insert what is new, leave the rest (and their ids) untouched.
async fn sync_tags(
    tx: &mut Transaction<'_, Postgres>,
    file_id: i32,
    tags: &[String],
) -> Result<(), sqlx::Error> {
    let existing: Vec<String> =
        sqlx::query_scalar("SELECT tag_name FROM tag WHERE file_id = $1 ORDER BY id")
            .bind(file_id)
            .fetch_all(&mut **tx)
            .await?;

    for stale in existing.iter().filter(|t| !tags.contains(t)) {
        sqlx::query("DELETE FROM tag WHERE file_id = $1 AND tag_name = $2")
            .bind(file_id)
            .bind(stale)
            .execute(&mut **tx)
            .await?;
    }

    let fresh: Vec<String> = tags
        .iter()
        .filter(|t| !existing.contains(t))
        .cloned()
        .collect();
    insert_tags(tx, file_id, &fresh).await
}

#[async_trait]
impl Catalog for PgCatalog {
    async fn list_projects(&self) -> AppResult<Vec<Project>> {
        Ok(sqlx::query_as::<_, Project>("SELECT * FROM project ORDER BY id")
            .fetch_all(&self.pool)
            .await?)
    }

    async fn get_project(&self, id: i32) -> AppResult<Option<Project>> {
        Ok(sqlx::query_as::<_, Project>("SELECT * FROM project WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_project_by_name(&self, name: &str) -> AppResult<Option<Project>> {
        Ok(sqlx::query_as::<_, Project>("SELECT * FROM project WHERE project_name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn project_name_taken(&self, name: &str, except: Option<i32>) -> AppResult<bool> {
        Ok(sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM project WHERE project_name = $1 AND ($2::INT IS NULL OR id <> $2))",
        )
        .bind(name)
        .bind(except)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn insert_project(&self, new: NewProject) -> AppResult<Project> {
        sqlx::query_as::<_, Project>(
            "INSERT INTO project (project_name, folder_name, project_image) VALUES ($1, $2, $3) RETURNING *",
        )
        .bind(&new.name)
        .bind(&new.folder_name)
        .bind(&new.image)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, || format!("Project name '{}' already exists", new.name)))
    }

    async fn update_project(&self, id: i32, update: ProjectUpdate) -> AppResult<Project> {
        let mut tx = self.pool.begin().await?;

        let exists: Option<i32> = sqlx::query_scalar("SELECT id FROM project WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Err(AppError::NotFound(format!("Project {} not found", id)));
        }

        if project_name_taken_tx(&mut tx, &update.name, id).await? {
            return Err(AppError::Conflict(format!(
                "Project name '{}' already exists",
                update.name
            )));
        }

        let project = sqlx::query_as::<_, Project>(
            "UPDATE project SET project_name = $2, project_image = $3, updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(&update.name)
        .bind(&update.image)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| conflict_on_unique(e, || format!("Project name '{}' already exists", update.name)))?;

        rewrite_file_paths(&mut tx, &update.file_paths).await?;

        tx.commit().await?;
        Ok(project)
    }

    async fn delete_project(&self, id: i32) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM project WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_sections(&self, project_id: i32) -> AppResult<Vec<Section>> {
        Ok(sqlx::query_as::<_, Section>("SELECT * FROM section WHERE project_id = $1 ORDER BY id")
            .bind(project_id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn get_section(&self, id: i32) -> AppResult<Option<Section>> {
        Ok(sqlx::query_as::<_, Section>("SELECT * FROM section WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_section_by_name(&self, project_id: i32, name: &str) -> AppResult<Option<Section>> {
        Ok(sqlx::query_as::<_, Section>(
            "SELECT * FROM section WHERE project_id = $1 AND section_name = $2",
        )
        .bind(project_id)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn insert_sections(&self, project_id: i32, new: Vec<NewSection>) -> AppResult<Vec<Section>> {
        let mut tx = self.pool.begin().await?;
        let mut created = Vec::with_capacity(new.len());

        for section in &new {
            let row = sqlx::query_as::<_, Section>(
                "INSERT INTO section (project_id, section_name, folder_name) VALUES ($1, $2, $3) RETURNING *",
            )
            .bind(project_id)
            .bind(&section.name)
            .bind(&section.folder_name)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| conflict_on_unique(e, || format!("Section name '{}' is already in use", section.name)))?;
            created.push(row);
        }

        tx.commit().await?;
        Ok(created)
    }

    async fn update_section(&self, id: i32, update: SectionUpdate) -> AppResult<Section> {
        let mut tx = self.pool.begin().await?;

        let project_id: Option<i32> =
            sqlx::query_scalar("SELECT project_id FROM section WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        let project_id = project_id.ok_or_else(|| AppError::NotFound(format!("Section {} not found", id)))?;

        let taken: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM section WHERE project_id = $1 AND section_name = $2 AND id <> $3)",
        )
        .bind(project_id)
        .bind(&update.name)
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;
        if taken {
            return Err(AppError::Conflict(format!(
                "Section name '{}' is already in use",
                update.name
            )));
        }

        let section = sqlx::query_as::<_, Section>(
            "UPDATE section SET section_name = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(&update.name)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| conflict_on_unique(e, || format!("Section name '{}' is already in use", update.name)))?;

        rewrite_file_paths(&mut tx, &update.file_paths).await?;

        tx.commit().await?;
        Ok(section)
    }

    async fn delete_section(&self, id: i32) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM section WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_file(&self, id: i32) -> AppResult<Option<FileEntry>> {
        Ok(sqlx::query_as::<_, FileEntry>("SELECT * FROM file WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_files(&self, section_id: i32) -> AppResult<Vec<FileEntry>> {
        Ok(sqlx::query_as::<_, FileEntry>("SELECT * FROM file WHERE section_id = $1 ORDER BY id")
            .bind(section_id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn list_project_files(&self, project_id: i32) -> AppResult<Vec<FileEntry>> {
        Ok(sqlx::query_as::<_, FileEntry>(
            "SELECT f.* FROM file f JOIN section s ON f.section_id = s.id WHERE s.project_id = $1 ORDER BY f.id",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn file_name_exists(&self, section_id: i32, name: &str) -> AppResult<bool> {
        Ok(sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM file WHERE section_id = $1 AND name = $2)",
        )
        .bind(section_id)
        .bind(name)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn insert_file(&self, new: NewFile) -> AppResult<FileEntry> {
        let mut tx = self.pool.begin().await?;

        let file = sqlx::query_as::<_, FileEntry>(
            "INSERT INTO file (section_id, name, folder_name, path_file, url_qr_code, path_pdf) \
             VALUES ($1, $2, $3, $4, NULL, NULL) RETURNING *",
        )
        .bind(new.section_id)
        .bind(&new.name)
        .bind(&new.folder_name)
        .bind(&new.path_file)
        .fetch_one(&mut *tx)
        .await?;

        insert_tags(&mut tx, file.id, &new.tags).await?;

        tx.commit().await?;
        Ok(file)
    }

    async fn set_label(&self, id: i32, url_qr_code: &str, path_pdf: &str) -> AppResult<FileEntry> {
        sqlx::query_as::<_, FileEntry>(
            "UPDATE file SET url_qr_code = $2, path_pdf = $3, updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(url_qr_code)
        .bind(path_pdf)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("File {} not found", id)))
    }

    async fn update_file(&self, id: i32, update: FileUpdate) -> AppResult<FileEntry> {
        let mut tx = self.pool.begin().await?;

        let file = sqlx::query_as::<_, FileEntry>(
            "UPDATE file SET name = $2, path_file = $3, path_pdf = $4, url_qr_code = $5, updated_at = NOW() \
             WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(&update.name)
        .bind(&update.path_file)
        .bind(&update.path_pdf)
        .bind(&update.url_qr_code)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("File {} not found", id)))?;

        if let Some(tags) = &update.tags {
            sync_tags(&mut tx, id, tags).await?;
        }

        tx.commit().await?;
        Ok(file)
    }

    async fn delete_file(&self, id: i32) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM file WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn file_tags(&self, file_id: i32) -> AppResult<Vec<String>> {
        Ok(sqlx::query_scalar::<_, String>("SELECT tag_name FROM tag WHERE file_id = $1 ORDER BY id")
            .bind(file_id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn search_project(&self, project_id: i32, term: &str) -> AppResult<Vec<SearchHit>> {
        Ok(sqlx::query_as::<_, SearchHit>(
            r#"
            SELECT DISTINCT ON (f.id) f.*, s.section_name, p.project_name
            FROM file f
            JOIN section s ON f.section_id = s.id
            JOIN project p ON s.project_id = p.id
            LEFT JOIN tag t ON f.id = t.file_id
            WHERE p.id = $1 AND (
                f.name ILIKE $2 ESCAPE '\' OR
                s.section_name ILIKE $2 ESCAPE '\' OR
                t.tag_name ILIKE $2 ESCAPE '\'
            )
            ORDER BY f.id
            "#,
        )
        .bind(project_id)
        .bind(like_pattern(term))
        .fetch_all(&self.pool)
        .await?)
    }
}
