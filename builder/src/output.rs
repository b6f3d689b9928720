// Licensed under the Apache-2.0 license

use std::io::{self, Write};
use std::path::Path;

use tempfile::NamedTempFile;

use crate::error::{BuildError, Result};

/// Writes `data` to `path` so that `path` either keeps its previous contents
/// or holds all of `data`. The temporary file lives in the destination
/// directory so the final rename never crosses filesystems.
pub fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    write_atomic_all(&[(path, data)])
}

/// Writes a group of files that belong together. Every file is staged
/// before any is renamed into place, and files already renamed are removed
/// again if a later one cannot be, so a failed run leaves none of them.
pub fn write_atomic_all(files: &[(&Path, &[u8])]) -> Result<()> {
    for (i, (path, _)) in files.iter().enumerate() {
        if files[..i].iter().any(|(other, _)| other == path) {
            return Err(BuildError::io(
                path,
                io::Error::new(io::ErrorKind::InvalidInput, "path is written twice"),
            ));
        }
        if path.is_dir() {
            return Err(BuildError::io(
                path,
                io::Error::other("destination is a directory"),
            ));
        }
    }

    let staged = files
        .iter()
        .map(|(path, data)| stage(path, data).map(|tmp| (tmp, *path)))
        .collect::<Result<Vec<_>>>()?;

    let mut persisted: Vec<&Path> = Vec::with_capacity(staged.len());
    for (tmp, path) in staged {
        if let Err(e) = tmp.persist(path) {
            for done in persisted {
                let _ = std::fs::remove_file(done);
            }
            return Err(BuildError::io(path, e.error));
        }
        persisted.push(path);
    }
    Ok(())
}

fn stage(path: &Path, data: &[u8]) -> Result<NamedTempFile> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| BuildError::io(dir, e))?;
    tmp.write_all(data).map_err(|e| BuildError::io(tmp.path(), e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| BuildError::io(tmp.path(), e))?;
    Ok(tmp)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_replaces_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("image.bin");
        std::fs::write(&path, b"old contents").unwrap();

        write_atomic(&path, &[0xFF; 16]).unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), vec![0xFF; 16]);
        let leftovers = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn test_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("no-such-dir").join("image.bin");
        assert!(matches!(
            write_atomic(&path, b"data"),
            Err(BuildError::IoFailure { .. })
        ));
        assert!(!path.exists());
    }

    #[test]
    fn test_group_rejects_directory_destination() {
        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join("meta.bin");
        let json = dir.path().join("meta.json");
        std::fs::create_dir(&json).unwrap();

        let result = write_atomic_all(&[(bin.as_path(), &b"block"[..]), (json.as_path(), &b"{}"[..])]);
        assert!(matches!(result, Err(BuildError::IoFailure { path, .. }) if path == json));
        assert!(!bin.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_group_rejects_repeated_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meta.json");
        assert!(write_atomic_all(&[(path.as_path(), &b"block"[..]), (path.as_path(), &b"{}"[..])]).is_err());
        assert!(!path.exists());
    }

    #[test]
    fn test_group_writes_all() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.bin");
        let b = dir.path().join("b.json");
        write_atomic_all(&[(a.as_path(), &b"one"[..]), (b.as_path(), &b"two"[..])]).unwrap();
        assert_eq!(std::fs::read(&a).unwrap(), b"one");
        assert_eq!(std::fs::read(&b).unwrap(), b"two");
    }
}
