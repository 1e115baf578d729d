// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

pub const DEFAULT_DHPARAM_BITS: &str = "4096";
pub const DEFAULT_DOCKER_HOST: &str = "unix:///var/run/docker.sock";
pub const DEFAULT_CERTS_DIR: &str = "/etc/nginx/certs";
pub const DEFAULT_ACME_DIR: &str = "/etc/acme.sh";
pub const DEFAULT_HTML_DIR: &str = "/usr/share/nginx/html";
pub const DEFAULT_FILES_PERMS: u32 = 0o644;
pub const DEFAULT_FOLDERS_PERMS: u32 = 0o755;

pub const DHPARAM_FILE: &str = "dhparam.pem";
pub const DEFAULT_CERT_FILE: &str = "default.crt";
pub const DEFAULT_KEY_FILE: &str = "default.key";

/// Runtime options for one entrypoint run.
#[derive(Debug, Clone)]
pub struct Config {
    /// Validated when the DH provisioner runs, after the skip flag
    pub dhparam_bits: String,
    pub dhparam_skip: bool,
    pub create_default_cert: bool,
    pub debug: bool,
    pub docker_host: String,
    /// Explicit proxy container name or ID
    pub nginx_proxy_container: Option<String>,
    /// Explicit docker-gen container name or ID
    pub docker_gen_container: Option<String>,
    pub ownership: OwnershipConfig,
}

/// Owner and mode policy applied to every artifact the provisioners touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OwnershipConfig {
    /// `None` leaves the current owner in place
    pub uid: Option<u32>,
    /// `None` follows `uid`
    pub gid: Option<u32>,
    pub files_perms: u32,
    pub folders_perms: u32,
}

impl Default for OwnershipConfig {
    fn default() -> Self {
        Self {
            uid: None,
            gid: None,
            files_perms: DEFAULT_FILES_PERMS,
            folders_perms: DEFAULT_FOLDERS_PERMS,
        }
    }
}

impl OwnershipConfig {
    /// Group to apply: explicit gid, else the owner's id.
    pub fn effective_gid(&self) -> Option<u32> {
        self.gid.or(self.uid)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dhparam_bits: DEFAULT_DHPARAM_BITS.to_string(),
            dhparam_skip: false,
            create_default_cert: true,
            debug: false,
            docker_host: DEFAULT_DOCKER_HOST.to_string(),
            nginx_proxy_container: None,
            docker_gen_container: None,
            ownership: OwnershipConfig::default(),
        }
    }
}

/// `unix:///path` to `/path`; `None` for any other scheme.
pub fn unix_socket_path(host: &str) -> Option<PathBuf> {
    host.strip_prefix("unix://").map(PathBuf::from)
}

#[derive(Debug, Clone)]
pub struct Paths {
    pub certs: PathBuf,
    pub dhparam: PathBuf,
    pub default_cert: PathBuf,
    pub default_key: PathBuf,
    pub acme_state: PathBuf,
    pub html: PathBuf,
    /// On-disk reference catalog; the embedded one is used when unset
    pub dhparam_reference: Option<PathBuf>,
}

impl Default for Paths {
    fn default() -> Self {
        Self::new(
            Path::new(DEFAULT_CERTS_DIR),
            Path::new(DEFAULT_ACME_DIR),
            Path::new(DEFAULT_HTML_DIR),
        )
    }
}

impl Paths {
    pub fn new(certs: &Path, acme_state: &Path, html: &Path) -> Self {
        Self {
            dhparam: certs.join(DHPARAM_FILE),
            default_cert: certs.join(DEFAULT_CERT_FILE),
            default_key: certs.join(DEFAULT_KEY_FILE),
            certs: certs.to_path_buf(),
            acme_state: acme_state.to_path_buf(),
            html: html.to_path_buf(),
            dhparam_reference: None,
        }
    }

    pub fn with_dhparam_reference(mut self, dir: Option<PathBuf>) -> Self {
        self.dhparam_reference = dir;
        self
    }
}

/// Parse a boolean option the way container environments spell them.
pub fn parse_flag(value: &str) -> std::result::Result<bool, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" | "" => Ok(false),
        other => Err(format!("'{}' is not a boolean (use true or false)", other)),
    }
}

/// Parse an octal permission string such as `644` or `0750`.
pub fn parse_mode(value: &str) -> std::result::Result<u32, String> {
    let value = value.trim();
    if !(3..=4).contains(&value.len()) || !value.chars().all(|c| ('0'..='7').contains(&c)) {
        return Err(format!(
            "'{}' is not a valid permission mode (expected 3 or 4 octal digits)",
            value
        ));
    }
    u32::from_str_radix(value, 8).map_err(|e| e.to_string())
}

/// Parse an owner or group: `root` or a numeric id.
pub fn parse_id(value: &str) -> std::result::Result<u32, String> {
    let value = value.trim();
    if value == "root" {
        return Ok(0);
    }
    value
        .parse::<u32>()
        .map_err(|_| format!("'{}' must be 'root' or a numeric id", value))
}

/// Validate combinations that can't be checked value by value.
pub fn validate(config: &Config) -> Result<()> {
    if config.ownership.files_perms & 0o7000 != 0 {
        return Err(Error::Config(format!(
            "FILES_PERMS {:o} must not set setuid, setgid or sticky bits",
            config.ownership.files_perms
        )));
    }
    if config.docker_host.trim().is_empty() {
        return Err(Error::Config("DOCKER_HOST cannot be empty".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.dhparam_bits, "4096");
        assert!(!config.dhparam_skip);
        assert!(config.create_default_cert);
        assert_eq!(
            unix_socket_path(&config.docker_host),
            Some(PathBuf::from("/var/run/docker.sock"))
        );
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_docker_socket_tcp_host() {
        let config = Config {
            docker_host: "tcp://10.0.0.1:2376".into(),
            ..Config::default()
        };
        assert_eq!(unix_socket_path(&config.docker_host), None);
    }

    #[test]
    fn test_paths_layout() {
        let paths = Paths::default();
        assert_eq!(paths.dhparam, PathBuf::from("/etc/nginx/certs/dhparam.pem"));
        assert_eq!(
            paths.default_cert,
            PathBuf::from("/etc/nginx/certs/default.crt")
        );
        assert_eq!(
            paths.default_key,
            PathBuf::from("/etc/nginx/certs/default.key")
        );
        assert!(paths.dhparam_reference.is_none());
    }

    #[test]
    fn test_parse_flag() {
        assert_eq!(parse_flag("true"), Ok(true));
        assert_eq!(parse_flag("True"), Ok(true));
        assert_eq!(parse_flag("1"), Ok(true));
        assert_eq!(parse_flag("yes"), Ok(true));
        assert_eq!(parse_flag("false"), Ok(false));
        assert_eq!(parse_flag("0"), Ok(false));
        assert_eq!(parse_flag(""), Ok(false));
        assert!(parse_flag("maybe").is_err());
    }

    #[test]
    fn test_parse_mode() {
        assert_eq!(parse_mode("644"), Ok(0o644));
        assert_eq!(parse_mode("0750"), Ok(0o750));
        assert!(parse_mode("64").is_err());
        assert!(parse_mode("888").is_err());
        assert!(parse_mode("rwxr-xr-x").is_err());
    }

    #[test]
    fn test_parse_id() {
        assert_eq!(parse_id("root"), Ok(0));
        assert_eq!(parse_id("1000"), Ok(1000));
        assert!(parse_id("nginx").is_err());
        assert!(parse_id("-1").is_err());
    }

    #[test]
    fn test_effective_gid_follows_uid() {
        let ownership = OwnershipConfig {
            uid: Some(1000),
            ..OwnershipConfig::default()
        };
        assert_eq!(ownership.effective_gid(), Some(1000));

        let ownership = OwnershipConfig {
            uid: Some(1000),
            gid: Some(33),
            ..OwnershipConfig::default()
        };
        assert_eq!(ownership.effective_gid(), Some(33));
    }

    #[test]
    fn test_validate_rejects_special_bits() {
        let mut config = Config::default();
        config.ownership.files_perms = 0o4755;
        assert!(matches!(validate(&config), Err(Error::Config(_))));
    }
}
