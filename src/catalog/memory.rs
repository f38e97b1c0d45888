use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};

use super::{Catalog, FilePathUpdate, FileUpdate, NewFile, NewProject, NewSection, ProjectUpdate, SectionUpdate};
use crate::{
    error::{AppError, AppResult},
    models::{FileEntry, Project, SearchHit, Section, Tag},
};

#[derive(Debug, Default)]
struct Tables {
    next_id: i32,
    projects: BTreeMap<i32, Project>,
    sections: BTreeMap<i32, Section>,
    files: BTreeMap<i32, FileEntry>,
    tags: BTreeMap<i32, Tag>,
}

impl Tables {
    fn next_id(&mut self) -> i32 {
        self.next_id += 1;
        self.next_id
    }

    fn apply_paths(&mut self, updates: &[FilePathUpdate], now: NaiveDateTime) {
        for update in updates {
            if let Some(file) = self.files.get_mut(&update.file_id) {
                file.path_file = update.path_file.clone();
                file.path_pdf = update.path_pdf.clone();
                file.updated_at = Some(now);
            }
        }
    }

    fn tags_of(&self, file_id: i32) -> Vec<String> {
        self.tags
            .values()
            .filter(|t| t.file_id == file_id)
            .map(|t| t.tag_name.clone())
            .collect()
    }

    fn insert_tags(&mut self, file_id: i32, tags: &[String]) {
        for tag in tags {
            let id = self.next_id();
            self.tags.insert(
                id,
                Tag {
                    id,
                    file_id,
                    tag_name: tag.clone(),
                },
            );
        }
    }

    fn remove_file_rows(&mut self, file_id: i32) {
        self.files.remove(&file_id);
        self.tags.retain(|_, t| t.file_id != file_id);
    }

    fn remove_section_rows(&mut self, section_id: i32) {
        self.sections.remove(&section_id);
        let files: Vec<i32> = self
            .files
            .values()
            .filter(|f| f.section_id == section_id)
            .map(|f| f.id)
            .collect();
        for file_id in files {
            self.remove_file_rows(file_id);
        }
    }

    fn section_name_taken(&self, project_id: i32, name: &str, except: Option<i32>) -> bool {
        self.sections
            .values()
            .any(|s| s.project_id == project_id && s.section_name == name && Some(s.id) != except)
    }
}

/// Catalog kept in process memory. Used when no database is configured and
/// by the tests; it enforces the same uniqueness and cascade rules as the
/// Postgres schema.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    tables: Mutex<Tables>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> AppResult<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| AppError::Internal("catalog lock poisoned".to_string()))
    }
}

fn now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

#[async_trait]
impl Catalog for MemoryCatalog {
    async fn list_projects(&self) -> AppResult<Vec<Project>> {
        Ok(self.tables()?.projects.values().cloned().collect())
    }

    async fn get_project(&self, id: i32) -> AppResult<Option<Project>> {
        Ok(self.tables()?.projects.get(&id).cloned())
    }

    async fn find_project_by_name(&self, name: &str) -> AppResult<Option<Project>> {
        Ok(self
            .tables()?
            .projects
            .values()
            .find(|p| p.project_name == name)
            .cloned())
    }

    async fn project_name_taken(&self, name: &str, except: Option<i32>) -> AppResult<bool> {
        Ok(self
            .tables()?
            .projects
            .values()
            .any(|p| p.project_name == name && Some(p.id) != except))
    }

    async fn insert_project(&self, new: NewProject) -> AppResult<Project> {
        let mut tables = self.tables()?;
        if tables.projects.values().any(|p| p.project_name == new.name) {
            return Err(AppError::Conflict(format!(
                "Project name '{}' already exists",
                new.name
            )));
        }
        let id = tables.next_id();
        let ts = now();
        let project = Project {
            id,
            project_name: new.name,
            folder_name: Some(new.folder_name),
            project_image: new.image,
            created_at: Some(ts),
            updated_at: Some(ts),
        };
        tables.projects.insert(id, project.clone());
        Ok(project)
    }

    async fn update_project(&self, id: i32, update: ProjectUpdate) -> AppResult<Project> {
        let mut tables = self.tables()?;
        if !tables.projects.contains_key(&id) {
            return Err(AppError::NotFound(format!("Project {} not found", id)));
        }
        if tables
            .projects
            .values()
            .any(|p| p.project_name == update.name && p.id != id)
        {
            return Err(AppError::Conflict(format!(
                "Project name '{}' already exists",
                update.name
            )));
        }

        let ts = now();
        tables.apply_paths(&update.file_paths, ts);
        let project = tables
            .projects
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Project {} not found", id)))?;
        project.project_name = update.name;
        project.project_image = update.image;
        project.updated_at = Some(ts);
        Ok(project.clone())
    }

    async fn delete_project(&self, id: i32) -> AppResult<bool> {
        let mut tables = self.tables()?;
        if tables.projects.remove(&id).is_none() {
            return Ok(false);
        }
        let sections: Vec<i32> = tables
            .sections
            .values()
            .filter(|s| s.project_id == id)
            .map(|s| s.id)
            .collect();
        for section_id in sections {
            tables.remove_section_rows(section_id);
        }
        Ok(true)
    }

    async fn list_sections(&self, project_id: i32) -> AppResult<Vec<Section>> {
        Ok(self
            .tables()?
            .sections
            .values()
            .filter(|s| s.project_id == project_id)
            .cloned()
            .collect())
    }

    async fn get_section(&self, id: i32) -> AppResult<Option<Section>> {
        Ok(self.tables()?.sections.get(&id).cloned())
    }

    async fn find_section_by_name(&self, project_id: i32, name: &str) -> AppResult<Option<Section>> {
        Ok(self
            .tables()?
            .sections
            .values()
            .find(|s| s.project_id == project_id && s.section_name == name)
            .cloned())
    }

    async fn insert_sections(&self, project_id: i32, new: Vec<NewSection>) -> AppResult<Vec<Section>> {
        let mut tables = self.tables()?;
        if !tables.projects.contains_key(&project_id) {
            return Err(AppError::NotFound(format!("Project {} not found", project_id)));
        }
        for (i, section) in new.iter().enumerate() {
            let repeated = new[..i].iter().any(|s| s.name == section.name);
            if repeated || tables.section_name_taken(project_id, &section.name, None) {
                return Err(AppError::Conflict(format!(
                    "Section name '{}' is already in use",
                    section.name
                )));
            }
        }

        let ts = now();
        let mut created = Vec::with_capacity(new.len());
        for section in new {
            let id = tables.next_id();
            let row = Section {
                id,
                project_id,
                section_name: section.name,
                folder_name: Some(section.folder_name),
                created_at: Some(ts),
                updated_at: Some(ts),
            };
            tables.sections.insert(id, row.clone());
            created.push(row);
        }
        Ok(created)
    }

    async fn update_section(&self, id: i32, update: SectionUpdate) -> AppResult<Section> {
        let mut tables = self.tables()?;
        let project_id = tables
            .sections
            .get(&id)
            .map(|s| s.project_id)
            .ok_or_else(|| AppError::NotFound(format!("Section {} not found", id)))?;
        if tables.section_name_taken(project_id, &update.name, Some(id)) {
            return Err(AppError::Conflict(format!(
                "Section name '{}' is already in use",
                update.name
            )));
        }

        let ts = now();
        tables.apply_paths(&update.file_paths, ts);
        let section = tables
            .sections
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Section {} not found", id)))?;
        section.section_name = update.name;
        section.updated_at = Some(ts);
        Ok(section.clone())
    }

    async fn delete_section(&self, id: i32) -> AppResult<bool> {
        let mut tables = self.tables()?;
        if !tables.sections.contains_key(&id) {
            return Ok(false);
        }
        tables.remove_section_rows(id);
        Ok(true)
    }

    async fn get_file(&self, id: i32) -> AppResult<Option<FileEntry>> {
        Ok(self.tables()?.files.get(&id).cloned())
    }

    async fn list_files(&self, section_id: i32) -> AppResult<Vec<FileEntry>> {
        Ok(self
            .tables()?
            .files
            .values()
            .filter(|f| f.section_id == section_id)
            .cloned()
            .collect())
    }

    async fn list_project_files(&self, project_id: i32) -> AppResult<Vec<FileEntry>> {
        let tables = self.tables()?;
        Ok(tables
            .files
            .values()
            .filter(|f| {
                tables
                    .sections
                    .get(&f.section_id)
                    .is_some_and(|s| s.project_id == project_id)
            })
            .cloned()
            .collect())
    }

    async fn file_name_exists(&self, section_id: i32, name: &str) -> AppResult<bool> {
        Ok(self
            .tables()?
            .files
            .values()
            .any(|f| f.section_id == section_id && f.name == name))
    }

    async fn insert_file(&self, new: NewFile) -> AppResult<FileEntry> {
        let mut tables = self.tables()?;
        if !tables.sections.contains_key(&new.section_id) {
            return Err(AppError::NotFound(format!("Section {} not found", new.section_id)));
        }
        let id = tables.next_id();
        let ts = now();
        let file = FileEntry {
            id,
            section_id: new.section_id,
            name: new.name,
            folder_name: Some(new.folder_name),
            path_file: Some(new.path_file),
            path_pdf: None,
            url_qr_code: None,
            created_at: Some(ts),
            updated_at: Some(ts),
        };
        tables.files.insert(id, file.clone());
        tables.insert_tags(id, &new.tags);
        Ok(file)
    }

    async fn set_label(&self, id: i32, url_qr_code: &str, path_pdf: &str) -> AppResult<FileEntry> {
        let mut tables = self.tables()?;
        let file = tables
            .files
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("File {} not found", id)))?;
        file.url_qr_code = Some(url_qr_code.to_string());
        file.path_pdf = Some(path_pdf.to_string());
        file.updated_at = Some(now());
        Ok(file.clone())
    }

    async fn update_file(&self, id: i32, update: FileUpdate) -> AppResult<FileEntry> {
        let mut tables = self.tables()?;
        let file = tables
            .files
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("File {} not found", id)))?;
        file.name = update.name;
        file.path_file = update.path_file;
        file.path_pdf = update.path_pdf;
        file.url_qr_code = update.url_qr_code;
        file.updated_at = Some(now());
        let file = file.clone();

        if let Some(tags) = update.tags {
            tables
                .tags
                .retain(|_, t| t.file_id != id || tags.contains(&t.tag_name));
            let existing = tables.tags_of(id);
            let fresh: Vec<String> = tags.into_iter().filter(|t| !existing.contains(t)).collect();
            tables.insert_tags(id, &fresh);
        }
        Ok(file)
    }

    async fn delete_file(&self, id: i32) -> AppResult<bool> {
        let mut tables = self.tables()?;
        if !tables.files.contains_key(&id) {
            return Ok(false);
        }
        tables.remove_file_rows(id);
        Ok(true)
    }

    async fn file_tags(&self, file_id: i32) -> AppResult<Vec<String>> {
        Ok(self.tables()?.tags_of(file_id))
    }

    async fn search_project(&self, project_id: i32, term: &str) -> AppResult<Vec<SearchHit>> {
        let tables = self.tables()?;
        let Some(project) = tables.projects.get(&project_id) else {
            return Ok(Vec::new());
        };
        let needle = term.to_lowercase();
        let matches = |s: &str| s.to_lowercase().contains(&needle);

        let hits = tables
            .files
            .values()
            .filter_map(|file| {
                let section = tables.sections.get(&file.section_id)?;
                if section.project_id != project_id {
                    return None;
                }
                let hit = matches(&file.name)
                    || matches(&section.section_name)
                    || tables.tags_of(file.id).iter().any(|t| matches(t));
                hit.then(|| SearchHit {
                    file: file.clone(),
                    section_name: section.section_name.clone(),
                    project_name: project.project_name.clone(),
                })
            })
            .collect();
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded() -> (MemoryCatalog, Project, Section, FileEntry) {
        let catalog = MemoryCatalog::new();
        let project = catalog
            .insert_project(NewProject {
                name: "Server".into(),
                folder_name: "p".repeat(32),
                image: None,
            })
            .await
            .unwrap();
        let section = catalog
            .insert_sections(
                project.id,
                vec![NewSection {
                    name: "Rack1".into(),
                    folder_name: "s".repeat(32),
                }],
            )
            .await
            .unwrap()
            .remove(0);
        let file = catalog
            .insert_file(NewFile {
                section_id: section.id,
                name: "diagram".into(),
                folder_name: "f".repeat(32),
                path_file: "uploads/p/s/f/diagram.png".into(),
                tags: vec!["infra".into(), "v1".into()],
            })
            .await
            .unwrap();
        (catalog, project, section, file)
    }

    #[tokio::test]
    async fn duplicate_project_names_conflict() {
        let (catalog, _, _, _) = seeded().await;
        let err = catalog
            .insert_project(NewProject {
                name: "Server".into(),
                folder_name: "x".into(),
                image: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn section_batch_is_all_or_nothing() {
        let (catalog, project, _, _) = seeded().await;
        let err = catalog
            .insert_sections(
                project.id,
                vec![
                    NewSection { name: "Rack2".into(), folder_name: "a".into() },
                    NewSection { name: "Rack1".into(), folder_name: "b".into() },
                ],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(catalog.list_sections(project.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn tag_replacement_keeps_unchanged_tags_in_order() {
        let (catalog, _, _, file) = seeded().await;
        catalog
            .update_file(
                file.id,
                FileUpdate {
                    name: file.name.clone(),
                    path_file: file.path_file.clone(),
                    path_pdf: None,
                    url_qr_code: None,
                    tags: Some(vec!["v1".into(), "rack".into()]),
                },
            )
            .await
            .unwrap();
        assert_eq!(catalog.file_tags(file.id).await.unwrap(), vec!["v1", "rack"]);
    }

    #[tokio::test]
    async fn deleting_a_project_cascades() {
        let (catalog, project, section, file) = seeded().await;
        assert!(catalog.delete_project(project.id).await.unwrap());
        assert!(catalog.get_section(section.id).await.unwrap().is_none());
        assert!(catalog.get_file(file.id).await.unwrap().is_none());
        assert!(catalog.file_tags(file.id).await.unwrap().is_empty());
        assert!(!catalog.delete_project(project.id).await.unwrap());
    }

    #[tokio::test]
    async fn search_matches_names_sections_and_tags_once() {
        let (catalog, project, _, file) = seeded().await;
        let by_tag = catalog.search_project(project.id, "INFRA").await.unwrap();
        assert_eq!(by_tag.len(), 1);
        assert_eq!(by_tag[0].file.id, file.id);
        assert_eq!(by_tag[0].section_name, "Rack1");

        let by_section = catalog.search_project(project.id, "rack").await.unwrap();
        assert_eq!(by_section.len(), 1);
        assert!(catalog.search_project(project.id, "nothing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn section_rename_rewrites_paths_in_one_step() {
        let (catalog, _, section, file) = seeded().await;
        catalog
            .update_section(
                section.id,
                SectionUpdate {
                    name: "Rack1-new".into(),
                    file_paths: vec![FilePathUpdate {
                        file_id: file.id,
                        path_file: Some("uploads/p/t/f/diagram.png".into()),
                        path_pdf: None,
                    }],
                },
            )
            .await
            .unwrap();
        let reloaded = catalog.get_file(file.id).await.unwrap().unwrap();
        assert_eq!(reloaded.path_file.as_deref(), Some("uploads/p/t/f/diagram.png"));
    }
}
