//! Upload tasks and the first-deploy seed walk.

use std::path::{Path, PathBuf};

use quire_core::PublishCredentials;

use crate::error::{io_err, PublishError};

/// One file's pending transfer to the object store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTask {
    /// Absolute path of the file in the live tree.
    pub file: PathBuf,
    /// Path relative to the live root; becomes the object key.
    pub rel_path: PathBuf,
    pub credentials: PublishCredentials,
}

impl UploadTask {
    /// `None` when `file` is not inside `live_root`.
    pub fn new(live_root: &Path, file: &Path, credentials: &PublishCredentials) -> Option<Self> {
        let rel = file.strip_prefix(live_root).ok()?;
        if rel.as_os_str().is_empty() {
            return None;
        }
        Some(Self {
            file: file.to_path_buf(),
            rel_path: rel.to_path_buf(),
            credentials: credentials.clone(),
        })
    }

    /// Object key: the relative path with forward slashes.
    pub fn key(&self) -> String {
        self.rel_path
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }
}

/// One task for every non-directory entry under `live_root`, in sorted
/// order. Used once per site, right after its first mirror.
pub fn seed_tasks(
    live_root: &Path,
    credentials: &PublishCredentials,
) -> Result<Vec<UploadTask>, PublishError> {
    let mut files = Vec::new();
    collect_files(live_root, &mut files)?;
    files.sort();
    Ok(files
        .iter()
        .filter_map(|file| UploadTask::new(live_root, file, credentials))
        .collect())
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), PublishError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(io_err(dir, err)),
    };
    for entry in entries {
        let entry = entry.map_err(|e| io_err(dir, e))?;
        let ty = entry.file_type().map_err(|e| io_err(entry.path(), e))?;
        if ty.is_dir() {
            collect_files(&entry.path(), out)?;
        } else {
            out.push(entry.path());
        }
    }
    Ok(())
}
