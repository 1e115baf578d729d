// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

//! Ownership and permission policy for files in the certificate directory.

use crate::config::OwnershipConfig;
use crate::error::{Error, Result};
use std::path::Path;
use tracing::{debug, warn};

/// Applies the configured owner/mode policy to a path.
///
/// Implementations must be idempotent: applying twice is the same as once.
pub trait OwnershipPolicy {
    fn apply(&self, path: &Path) -> Result<()>;
}

/// Apply `policy` to `path`, logging instead of failing.
///
/// Ownership drift never aborts provisioning.
pub fn apply_or_warn(policy: &dyn OwnershipPolicy, path: &Path) {
    if let Err(e) = policy.apply(path) {
        warn!(path = %path.display(), error = %e, "Could not apply ownership policy");
    }
}

/// Private files get the file mode with group and other bits cleared.
pub fn is_private_file(path: &Path) -> bool {
    path.extension().map(|e| e == "key").unwrap_or(false)
}

/// chown/chmod based policy.
#[derive(Debug, Clone, Copy)]
pub struct FileOwnership {
    config: OwnershipConfig,
}

impl FileOwnership {
    pub fn new(config: OwnershipConfig) -> Self {
        Self { config }
    }

    /// Mode expected for `path` given whether it is a directory.
    pub fn expected_mode(&self, path: &Path, is_dir: bool) -> u32 {
        if is_dir {
            self.config.folders_perms
        } else if is_private_file(path) {
            self.config.files_perms & 0o700
        } else {
            self.config.files_perms
        }
    }
}

#[cfg(unix)]
impl OwnershipPolicy for FileOwnership {
    fn apply(&self, path: &Path) -> Result<()> {
        use std::os::unix::fs::{MetadataExt, PermissionsExt};

        let metadata = match std::fs::metadata(path) {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "Skipping ownership policy, path does not exist");
                return Ok(());
            }
            Err(e) => {
                return Err(Error::Permissions {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
        };

        let uid = self.config.uid.filter(|uid| *uid != metadata.uid());
        let gid = self
            .config
            .effective_gid()
            .filter(|gid| *gid != metadata.gid());
        if uid.is_some() || gid.is_some() {
            debug!(path = %path.display(), ?uid, ?gid, "Changing ownership");
            std::os::unix::fs::chown(path, uid, gid).map_err(|e| Error::Permissions {
                path: path.to_path_buf(),
                source: e,
            })?;
        }

        let expected = self.expected_mode(path, metadata.is_dir());
        let current = metadata.permissions().mode() & 0o7777;
        if current != expected {
            debug!(
                path = %path.display(),
                from = %format!("{:o}", current),
                to = %format!("{:o}", expected),
                "Changing permissions"
            );
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(expected)).map_err(
                |e| Error::Permissions {
                    path: path.to_path_buf(),
                    source: e,
                },
            )?;
        }

        Ok(())
    }
}

#[cfg(not(unix))]
impl OwnershipPolicy for FileOwnership {
    fn apply(&self, _path: &Path) -> Result<()> {
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn mode_of(path: &Path) -> u32 {
        fs::metadata(path).unwrap().permissions().mode() & 0o7777
    }

    #[test]
    fn test_private_file_detection() {
        assert!(is_private_file(Path::new("/etc/nginx/certs/default.key")));
        assert!(!is_private_file(Path::new("/etc/nginx/certs/default.crt")));
        assert!(!is_private_file(Path::new("/etc/nginx/certs/dhparam.pem")));
    }

    #[test]
    fn test_apply_sets_file_modes() {
        let dir = TempDir::new().unwrap();
        let cert = dir.path().join("default.crt");
        let key = dir.path().join("default.key");
        fs::write(&cert, "cert").unwrap();
        fs::write(&key, "key").unwrap();
        fs::set_permissions(&cert, fs::Permissions::from_mode(0o600)).unwrap();
        fs::set_permissions(&key, fs::Permissions::from_mode(0o666)).unwrap();

        let policy = FileOwnership::new(OwnershipConfig::default());
        policy.apply(&cert).unwrap();
        policy.apply(&key).unwrap();

        assert_eq!(mode_of(&cert), 0o644);
        assert_eq!(mode_of(&key), 0o600);
    }

    #[test]
    fn test_apply_sets_folder_mode() {
        let dir = TempDir::new().unwrap();
        let sub = dir.path().join("certs");
        fs::create_dir(&sub).unwrap();
        fs::set_permissions(&sub, fs::Permissions::from_mode(0o700)).unwrap();

        let policy = FileOwnership::new(OwnershipConfig {
            folders_perms: 0o750,
            ..OwnershipConfig::default()
        });
        policy.apply(&sub).unwrap();
        assert_eq!(mode_of(&sub), 0o750);
    }

    #[test]
    fn test_apply_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("dhparam.pem");
        fs::write(&file, "params").unwrap();

        let policy = FileOwnership::new(OwnershipConfig::default());
        policy.apply(&file).unwrap();
        policy.apply(&file).unwrap();
        assert_eq!(mode_of(&file), 0o644);
        assert_eq!(fs::read_to_string(&file).unwrap(), "params");
    }

    #[test]
    fn test_apply_missing_path_is_ok() {
        let dir = TempDir::new().unwrap();
        let policy = FileOwnership::new(OwnershipConfig::default());
        assert!(policy.apply(&dir.path().join("absent.pem")).is_ok());
    }

    #[test]
    fn test_apply_current_owner_needs_no_privilege() {
        use std::os::unix::fs::MetadataExt;

        let dir = TempDir::new().unwrap();
        let file = dir.path().join("dhparam.pem");
        fs::write(&file, "params").unwrap();
        let meta = fs::metadata(&file).unwrap();

        // Re-applying the current owner is a no-op even for unprivileged users
        let policy = FileOwnership::new(OwnershipConfig {
            uid: Some(meta.uid()),
            gid: Some(meta.gid()),
            ..OwnershipConfig::default()
        });
        assert!(policy.apply(&file).is_ok());
    }
}
