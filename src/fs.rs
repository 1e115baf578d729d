// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

use crate::error::{Error, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Suffix for single-file replacements (DH parameters).
pub const TMP_SUFFIX: &str = "tmp";

/// Suffix for paired replacements (default certificate and key).
pub const NEW_SUFFIX: &str = "new";

/// Name of the probe file used to check that a directory is writable.
pub const WRITE_PROBE: &str = ".check_writable";

/// Path of the temporary sibling `<target>.<suffix>`.
pub fn sibling_path(target: &Path, suffix: &str) -> Result<PathBuf> {
    let name = target
        .file_name()
        .ok_or_else(|| Error::InvalidPath(target.to_path_buf()))?;
    let mut temp_name = name.to_os_string();
    temp_name.push(".");
    temp_name.push(suffix);
    Ok(target.with_file_name(temp_name))
}

/// A complete file written beside its target, waiting to be renamed into place.
///
/// Dropping an uncommitted `StagedFile` removes the temporary file, so the
/// target is only ever the old complete content or the new complete content.
#[derive(Debug)]
pub struct StagedFile {
    temp: PathBuf,
    target: PathBuf,
    committed: bool,
}

impl StagedFile {
    /// Write `contents` to `<target>.<suffix>` and flush it to disk.
    pub fn write(target: &Path, suffix: &str, contents: &[u8]) -> Result<Self> {
        let temp = sibling_path(target, suffix)?;
        let staged = Self {
            temp,
            target: target.to_path_buf(),
            committed: false,
        };

        let mut file = fs::File::create(&staged.temp).map_err(|e| Error::WriteFile {
            path: staged.temp.clone(),
            source: e,
        })?;
        file.write_all(contents).map_err(|e| Error::WriteFile {
            path: staged.temp.clone(),
            source: e,
        })?;
        file.sync_all().map_err(|e| Error::WriteFile {
            path: staged.temp.clone(),
            source: e,
        })?;

        Ok(staged)
    }

    /// Same as [`StagedFile::write`] but the temporary file is created owner-only.
    pub fn write_secret(target: &Path, suffix: &str, contents: &[u8]) -> Result<Self> {
        let temp = sibling_path(target, suffix)?;
        let staged = Self {
            temp,
            target: target.to_path_buf(),
            committed: false,
        };
        write_secret_file(&staged.temp, contents)?;
        Ok(staged)
    }

    pub fn temp_path(&self) -> &Path {
        &self.temp
    }

    /// Atomically rename the staged file over its target.
    pub fn commit(mut self) -> Result<()> {
        fs::rename(&self.temp, &self.target).map_err(|e| Error::WriteFile {
            path: self.target.clone(),
            source: e,
        })?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if !self.committed {
            // Only clean up if it still exists
            if self.temp.exists() {
                let _ = fs::remove_file(&self.temp);
            }
        }
    }
}

/// Atomically write data to a file through `<path>.<suffix>` and rename.
pub fn atomic_write(path: &Path, suffix: &str, contents: &[u8]) -> Result<()> {
    StagedFile::write(path, suffix, contents)?.commit()
}

#[cfg(unix)]
pub fn write_secret_file(path: &Path, contents: &[u8]) -> Result<()> {
    use std::fs::OpenOptions;
    use std::os::unix::fs::OpenOptionsExt;

    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
        .map_err(|e| Error::WriteFile {
            path: path.to_path_buf(),
            source: e,
        })?;

    file.write_all(contents).map_err(|e| Error::WriteFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    file.sync_all().map_err(|e| Error::WriteFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    Ok(())
}

#[cfg(not(unix))]
pub fn write_secret_file(path: &Path, contents: &[u8]) -> Result<()> {
    fs::write(path, contents).map_err(|e| Error::WriteFile {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(())
}

/// Check that `dir` accepts new files by creating and removing a probe file.
pub fn probe_writable(dir: &Path) -> std::io::Result<()> {
    let probe = dir.join(WRITE_PROBE);
    fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&probe)?;
    fs::remove_file(&probe)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_sibling_path() {
        let path = Path::new("/etc/nginx/certs/dhparam.pem");
        assert_eq!(
            sibling_path(path, TMP_SUFFIX).unwrap(),
            PathBuf::from("/etc/nginx/certs/dhparam.pem.tmp")
        );
        assert_eq!(
            sibling_path(Path::new("default.key"), NEW_SUFFIX).unwrap(),
            PathBuf::from("default.key.new")
        );
    }

    #[test]
    fn test_sibling_path_rejects_root() {
        assert!(matches!(
            sibling_path(Path::new("/"), TMP_SUFFIX),
            Err(Error::InvalidPath(_))
        ));
    }

    #[test]
    fn test_atomic_write_replaces_target() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("dhparam.pem");
        fs::write(&target, b"old").unwrap();

        atomic_write(&target, TMP_SUFFIX, b"new").unwrap();

        assert_eq!(fs::read(&target).unwrap(), b"new");
        assert!(!dir.path().join("dhparam.pem.tmp").exists());
    }

    #[test]
    fn test_uncommitted_stage_is_removed() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("default.crt");
        fs::write(&target, b"old").unwrap();

        let staged = StagedFile::write(&target, NEW_SUFFIX, b"new").unwrap();
        let temp = staged.temp_path().to_path_buf();
        assert!(temp.exists());
        drop(staged);

        // Target untouched, temp gone
        assert!(!temp.exists());
        assert_eq!(fs::read(&target).unwrap(), b"old");
    }

    #[cfg(unix)]
    #[test]
    fn test_secret_stage_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let target = dir.path().join("default.key");
        let staged = StagedFile::write_secret(&target, NEW_SUFFIX, b"key").unwrap();
        let mode = fs::metadata(staged.temp_path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        staged.commit().unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"key");
    }

    #[test]
    fn test_probe_writable() {
        let dir = TempDir::new().unwrap();
        assert!(probe_writable(dir.path()).is_ok());
        assert!(!dir.path().join(WRITE_PROBE).exists());
        assert!(probe_writable(&dir.path().join("missing")).is_err());
    }
}
