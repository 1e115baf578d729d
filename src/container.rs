// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

//! Container runtime collaborator: peer discovery, signals and exec.

use crate::error::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Label that designates the proxy container.
pub const NGINX_PROXY_LABEL: &str = "com.github.nginx-proxy.nginx";

/// Label that designates the docker-gen container.
pub const DOCKER_GEN_LABEL: &str = "com.github.nginx-proxy.docker-gen";

/// Present in the environment of images that run docker-gen.
pub const DOCKER_GEN_ENV_MARKER: &str = "DOCKER_GEN_VERSION";

static MOUNTINFO_CID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"/containers/([[:xdigit:]]{64})/").expect("invalid mountinfo regex")
});

static CGROUP_CID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"docker[/-]([[:xdigit:]]{64})").expect("invalid cgroup regex")
});

/// The parts of `docker inspect` output the gate needs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerInfo {
    pub id: String,
    #[serde(default)]
    pub config: ContainerConfig,
    #[serde(default)]
    pub host_config: HostConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerConfig {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub env: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HostConfig {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub volumes_from: Vec<String>,
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

impl ContainerInfo {
    /// Whether this container runs docker-gen itself (two-container setup).
    pub fn runs_docker_gen(&self) -> bool {
        self.config
            .env
            .iter()
            .any(|var| var.split('=').next() == Some(DOCKER_GEN_ENV_MARKER))
    }

    /// Containers given to `--volumes-from`, without the `:ro`/`:rw` suffix.
    pub fn volumes_from(&self) -> impl Iterator<Item = &str> {
        self.host_config
            .volumes_from
            .iter()
            .map(|source| source.split(':').next().unwrap_or(source))
    }
}

/// Operations the startup gate and the reloader need from the runtime.
pub trait ContainerRuntime {
    /// Inspect a container by name or ID; `None` if it doesn't exist.
    fn inspect(&self, reference: &str) -> Result<Option<ContainerInfo>>;

    /// ID of the first running container carrying `label`.
    fn find_by_label(&self, label: &str) -> Result<Option<String>>;

    /// Send `signal` (e.g. `HUP`) to a container.
    fn signal(&self, container: &str, signal: &str) -> Result<()>;

    /// Run `command` inside a container and wait for it.
    fn exec(&self, container: &str, command: &[&str]) -> Result<()>;
}

/// Runtime backed by the `docker` CLI talking to `DOCKER_HOST`.
#[derive(Debug, Clone)]
pub struct DockerCli {
    program: PathBuf,
    host: String,
}

impl DockerCli {
    pub fn new(program: impl Into<PathBuf>, host: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            host: host.into(),
        }
    }

    fn run(&self, args: &[&str]) -> Result<std::process::Output> {
        Command::new(&self.program)
            .arg("--host")
            .arg(&self.host)
            .args(args)
            .output()
            .map_err(|e| {
                Error::Runtime(format!(
                    "Failed to run {}: {}",
                    self.program.display(),
                    e
                ))
            })
    }

    fn run_checked(&self, args: &[&str]) -> Result<String> {
        let output = self.run(args)?;
        if !output.status.success() {
            return Err(Error::Command {
                command: format!("{} {}", self.program.display(), args.join(" ")),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl ContainerRuntime for DockerCli {
    fn inspect(&self, reference: &str) -> Result<Option<ContainerInfo>> {
        let output = self.run(&["inspect", "--type", "container", reference])?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("No such") {
                return Ok(None);
            }
            return Err(Error::Command {
                command: format!("docker inspect {}", reference),
                stderr: stderr.trim().to_string(),
            });
        }
        parse_inspect(&output.stdout)
    }

    fn find_by_label(&self, label: &str) -> Result<Option<String>> {
        let filter = format!("label={}", label);
        let stdout = self.run_checked(&["ps", "--no-trunc", "--quiet", "--filter", &filter])?;
        Ok(stdout
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(String::from))
    }

    fn signal(&self, container: &str, signal: &str) -> Result<()> {
        self.run_checked(&["kill", "--signal", signal, container])?;
        Ok(())
    }

    fn exec(&self, container: &str, command: &[&str]) -> Result<()> {
        let mut args = vec!["exec", container];
        args.extend_from_slice(command);
        self.run_checked(&args)?;
        Ok(())
    }
}

/// Parse `docker inspect` output (a JSON array with at most one element).
pub fn parse_inspect(stdout: &[u8]) -> Result<Option<ContainerInfo>> {
    let containers: Vec<ContainerInfo> = serde_json::from_slice(stdout)
        .map_err(|e| Error::Runtime(format!("Unexpected docker inspect output: {}", e)))?;
    Ok(containers.into_iter().next())
}

/// Our own container ID from `/proc/self/mountinfo`, falling back to
/// `/proc/self/cgroup` (cgroup v1).
pub fn self_container_id(proc_root: &Path) -> Option<String> {
    let from = |file: &str, re: &Regex| {
        std::fs::read_to_string(proc_root.join("self").join(file))
            .ok()
            .and_then(|content| {
                re.captures(&content)
                    .and_then(|caps| caps.get(1))
                    .map(|m| m.as_str().to_string())
            })
    };
    from("mountinfo", &MOUNTINFO_CID).or_else(|| from("cgroup", &CGROUP_CID))
}

/// Mount points listed in a mountinfo document (field 5, octal escapes decoded).
pub fn mount_points(mountinfo: &str) -> Vec<PathBuf> {
    mountinfo
        .lines()
        .filter_map(|line| line.split_whitespace().nth(4))
        .map(|field| PathBuf::from(unescape_mount_path(field)))
        .collect()
}

fn unescape_mount_path(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        // \ooo escapes for space, tab, newline and backslash
        if bytes[i] == b'\\' && i + 4 <= bytes.len() {
            let digits = &bytes[i + 1..i + 4];
            let is_octal = digits[0] <= b'3' && digits.iter().all(|b| (b'0'..=b'7').contains(b));
            if is_octal {
                out.push(digits.iter().fold(0u8, |acc, b| acc * 8 + (b - b'0')));
                i += 4;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}
