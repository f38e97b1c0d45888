//! Zip bundles served by the download and export endpoints.

use std::collections::HashSet;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::warn;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::utils::sanitize_file_stem;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Archive task failed: {0}")]
    Task(String),
}

/// A file on disk and the name it gets inside the archive.
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    pub name: String,
    pub source: PathBuf,
}

impl ArchiveEntry {
    pub fn new(name: impl Into<String>, source: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
        }
    }
}

/// Relative entry path with every segment made safe to extract: no
/// absolute prefix, no `.` or `..`, no empty levels.
fn entry_path(name: &str) -> String {
    let segments: Vec<String> = name
        .split(['/', '\\'])
        .filter(|s| !s.trim().is_empty())
        .map(sanitize_file_stem)
        .collect();
    if segments.is_empty() {
        return "file".to_string();
    }
    segments.join("/")
}

/// Make `name` unique among `taken` by suffixing ` (2)`, ` (3)`, ... before
/// the extension.
fn unique_name(name: &str, taken: &mut HashSet<String>) -> String {
    if taken.insert(name.to_string()) {
        return name.to_string();
    }
    let (stem, ext) = match name.rfind('.') {
        Some(dot) if dot > 0 && !name[dot..].contains('/') => (&name[..dot], &name[dot..]),
        _ => (name, ""),
    };
    let mut n = 2;
    loop {
        let candidate = format!("{} ({}){}", stem, n, ext);
        if taken.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

/// Build a zip from `entries`. Sources that are missing are skipped with a
/// warning; returns the archive and how many entries made it in.
pub fn build_zip(entries: &[ArchiveEntry]) -> Result<(Vec<u8>, usize), ArchiveError> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut taken = HashSet::new();
    let mut written = 0;

    for entry in entries {
        let content = match std::fs::read(&entry.source) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Skipping missing archive entry {:?}", entry.source);
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        let name = unique_name(&entry_path(&entry.name), &mut taken);
        writer.start_file(name, options)?;
        writer.write_all(&content)?;
        written += 1;
    }

    let cursor = writer.finish()?;
    Ok((cursor.into_inner(), written))
}

/// Entries for every regular file below `dir`, named relative to it.
pub fn directory_entries(dir: &Path) -> Result<Vec<ArchiveEntry>, ArchiveError> {
    let mut entries = Vec::new();
    let mut pending = vec![(dir.to_path_buf(), String::new())];
    while let Some((current, prefix)) = pending.pop() {
        for item in std::fs::read_dir(&current)? {
            let item = item?;
            let name = format!("{}{}", prefix, item.file_name().to_string_lossy());
            if item.file_type()?.is_dir() {
                pending.push((item.path(), format!("{}/", name)));
            } else {
                entries.push(ArchiveEntry::new(name, item.path()));
            }
        }
    }
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}

/// [`build_zip`] on the blocking pool.
pub async fn build_zip_blocking(entries: Vec<ArchiveEntry>) -> Result<(Vec<u8>, usize), ArchiveError> {
    tokio::task::spawn_blocking(move || build_zip(&entries))
        .await
        .map_err(|e| ArchiveError::Task(e.to_string()))?
}

/// Zip a whole directory on the blocking pool.
pub async fn zip_directory(dir: PathBuf) -> Result<(Vec<u8>, usize), ArchiveError> {
    tokio::task::spawn_blocking(move || {
        let entries = directory_entries(&dir)?;
        build_zip(&entries)
    })
    .await
    .map_err(|e| ArchiveError::Task(e.to_string()))?
}
