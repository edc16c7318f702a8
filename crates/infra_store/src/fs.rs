//! Atomic file primitives
//!
//! Every artefact is written to a temp file in the target directory, synced,
//! then moved into place, so readers never see a partial document:
//!
//! - `atomic_write` renames over the target (replaceable artefacts)
//! - `write_new` hard-links into place and fails if the target exists
//!   (append-only artefacts such as dossier versions)

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::StoreError;

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Temp files start with a dot and carry `.tmp.`; listings skip them
pub fn is_temp_name(name: &str) -> bool {
    name.starts_with('.') && name.contains(".tmp.")
}

fn temp_path(target: &Path) -> Result<PathBuf, StoreError> {
    let parent = target.parent().ok_or_else(|| {
        StoreError::io(target, io::Error::new(io::ErrorKind::InvalidInput, "no parent dir"))
    })?;
    let file_name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(parent.join(format!(
        ".{}.tmp.{}.{}",
        file_name,
        std::process::id(),
        TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
    )))
}

fn write_temp(target: &Path, content: &[u8]) -> Result<PathBuf, StoreError> {
    let temp = temp_path(target)?;
    let result = (|| {
        let mut file = fs::File::create(&temp)?;
        file.write_all(content)?;
        file.sync_all()
    })();
    if let Err(e) = result {
        let _ = fs::remove_file(&temp);
        return Err(StoreError::io(&temp, e));
    }
    Ok(temp)
}

fn sync_parent(target: &Path) {
    if let Some(parent) = target.parent() {
        if let Ok(dir) = fs::File::open(parent) {
            let _ = dir.sync_all();
        }
    }
}

/// Replaces `target` atomically: temp file, fsync, rename, fsync parent dir
pub fn atomic_write(target: &Path, content: &[u8]) -> Result<(), StoreError> {
    let temp = write_temp(target, content)?;
    if let Err(e) = fs::rename(&temp, target) {
        let _ = fs::remove_file(&temp);
        return Err(StoreError::io(target, e));
    }
    sync_parent(target);
    Ok(())
}

/// Creates `target` atomically; `AlreadyExists` if it is already present
pub fn write_new(target: &Path, content: &[u8]) -> Result<(), StoreError> {
    let temp = write_temp(target, content)?;
    let linked = fs::hard_link(&temp, target);
    let _ = fs::remove_file(&temp);
    match linked {
        Ok(()) => {
            sync_parent(target);
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            Err(StoreError::AlreadyExists(target.to_path_buf()))
        }
        Err(e) => Err(StoreError::io(target, e)),
    }
}

pub fn encode<T: Serialize>(path: &Path, value: &T) -> Result<Vec<u8>, StoreError> {
    serde_json::to_vec_pretty(value).map_err(|e| StoreError::serialization(path, e))
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, StoreError> {
    let bytes = fs::read(path).map_err(|e| StoreError::io(path, e))?;
    serde_json::from_slice(&bytes).map_err(|e| StoreError::serialization(path, e))
}

/// Like `read_json`, but a missing file is `None`
pub fn read_json_opt<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    match read_json(path) {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

pub fn ensure_dir(path: &Path) -> Result<(), StoreError> {
    fs::create_dir_all(path).map_err(|e| StoreError::io(path, e))
}

/// File names in `dir`, without temp files; a missing directory is empty
pub fn list_file_names(dir: &Path) -> Result<Vec<String>, StoreError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(StoreError::io(dir, e)),
    };
    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| StoreError::io(dir, e))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if !is_temp_name(&name) {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}
