use std::fs;
use std::io::Write;
use std::path::Path;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::warn;

use crate::error::RefgenError;

pub fn absolute_utf8(path: &Utf8Path) -> Result<Utf8PathBuf, RefgenError> {
    let absolute = std::path::absolute(path.as_std_path())
        .map_err(|err| RefgenError::Filesystem(format!("resolve {path}: {err}")))?;
    Utf8PathBuf::from_path_buf(absolute)
        .map_err(|p| RefgenError::Filesystem(format!("non-utf8 path {}", p.display())))
}

pub fn ensure_parent_dir(path: &Utf8Path) -> Result<Utf8PathBuf, RefgenError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent.to_path_buf(),
        _ => Utf8PathBuf::from("."),
    };
    fs::create_dir_all(parent.as_std_path())
        .map_err(|err| RefgenError::Filesystem(format!("create {parent}: {err}")))?;
    Ok(parent)
}

/// Write through a sibling temp file so `path` never holds partial content.
pub fn write_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), RefgenError> {
    let parent = ensure_parent_dir(path)?;
    let mut temp = tempfile::Builder::new()
        .prefix(".refgen")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| RefgenError::Filesystem(err.to_string()))?;
    temp.write_all(content)
        .and_then(|_| temp.flush())
        .map_err(|err| RefgenError::Filesystem(format!("write {path}: {err}")))?;
    temp.persist(path.as_std_path())
        .map_err(|err| RefgenError::Filesystem(format!("persist {path}: {err}")))?;
    Ok(())
}

/// True (with a warning) when `path` exists and must not be overwritten.
pub fn refuse_existing(path: &Path) -> bool {
    if path.exists() {
        warn!(path = %path.display(), "file already exists; it will not be overwritten");
        return true;
    }
    false
}

pub fn remove_if_exists(path: &Utf8Path) -> Result<(), RefgenError> {
    match fs::remove_file(path.as_std_path()) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(RefgenError::Filesystem(format!("remove {path}: {err}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolute_paths_are_rooted() {
        let abs = absolute_utf8(Utf8Path::new("genomes/x.fasta")).unwrap();
        assert!(abs.is_absolute());
        assert!(abs.ends_with("genomes/x.fasta"));
    }

    #[test]
    fn refuse_and_remove() {
        let temp = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(temp.path().join("a.txt")).unwrap();
        assert!(!refuse_existing(path.as_std_path()));
        write_atomic(&path, b"x").unwrap();
        assert!(refuse_existing(path.as_std_path()));
        remove_if_exists(&path).unwrap();
        remove_if_exists(&path).unwrap();
        assert!(!path.as_std_path().exists());
    }
}
