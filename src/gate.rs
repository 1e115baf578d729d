// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

//! Startup preconditions checked before any provisioner runs.
//!
//! Failures are fatal and returned as [`Error`]s; advisories are logged and
//! collected in the [`GateReport`].

use crate::config::{unix_socket_path, Config, Paths};
use crate::container::{
    mount_points, self_container_id, ContainerInfo, ContainerRuntime, DOCKER_GEN_LABEL,
    NGINX_PROXY_LABEL,
};
use crate::error::{Error, Result};
use crate::fs::probe_writable;
use crate::reload::{ContainerReloader, Generator};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Inputs of the startup gate.
#[derive(Debug, Clone)]
pub struct GateSettings {
    pub docker_host: String,
    pub nginx_proxy_container: Option<String>,
    pub docker_gen_container: Option<String>,
    /// Must exist and be writable
    pub required_dirs: Vec<PathBuf>,
    /// Problems are only reported
    pub advisory_dirs: Vec<PathBuf>,
    pub proc_root: PathBuf,
}

impl GateSettings {
    pub fn from_config(config: &Config, paths: &Paths) -> Self {
        Self {
            docker_host: config.docker_host.clone(),
            nginx_proxy_container: config.nginx_proxy_container.clone(),
            docker_gen_container: config.docker_gen_container.clone(),
            required_dirs: vec![paths.certs.clone(), paths.acme_state.clone()],
            advisory_dirs: vec![paths.html.clone()],
            proc_root: PathBuf::from("/proc"),
        }
    }

    fn docker_socket(&self) -> Option<PathBuf> {
        unix_socket_path(&self.docker_host)
    }
}

/// Non-fatal findings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advisory {
    SocketUnreadable { path: PathBuf },
    SocketUnreachable { path: PathBuf, reason: String },
    NotMounted { path: PathBuf },
    MountCheckUnavailable { path: PathBuf },
    DirectoryUnusable { path: PathBuf, reason: String },
}

impl fmt::Display for Advisory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Advisory::SocketUnreadable { path } => write!(
                f,
                "Docker host socket at {0} might not be readable. Please check user permissions.\n\
                 If you are in a SELinux environment, try using: '-v /var/run/docker.sock:{0}:z'",
                path.display()
            ),
            Advisory::SocketUnreachable { path, reason } => write!(
                f,
                "Docker host socket at {} refused the connection ({}). Restrictive access control may block it.",
                path.display(),
                reason
            ),
            Advisory::NotMounted { path } => {
                write!(f, "'{}' does not appear to be a mounted volume.", path.display())
            }
            Advisory::MountCheckUnavailable { path } => write!(
                f,
                "Can't check if '{}' is a mounted volume without mount information.",
                path.display()
            ),
            Advisory::DirectoryUnusable { path, reason } => {
                write!(f, "'{}' is not usable: {}", path.display(), reason)
            }
        }
    }
}

/// How a peer container was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Discovery {
    Explicit,
    Label,
    VolumesFrom,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerContainer {
    pub id: String,
    pub discovered_by: Discovery,
}

/// Everything the gate established, passed on to the provisioners.
#[derive(Debug, Clone)]
pub struct GateReport {
    pub self_container: Option<String>,
    pub proxy: PeerContainer,
    pub generator: Generator,
    pub advisories: Vec<Advisory>,
}

impl GateReport {
    /// Reloader targeting the discovered containers.
    pub fn reloader<'a>(&self, runtime: &'a dyn ContainerRuntime) -> ContainerReloader<'a> {
        ContainerReloader::new(
            runtime,
            Some(self.proxy.id.clone()),
            Some(self.generator.clone()),
        )
    }
}

pub struct StartupGate<'a> {
    settings: GateSettings,
    runtime: &'a dyn ContainerRuntime,
}

impl<'a> StartupGate<'a> {
    pub fn new(settings: GateSettings, runtime: &'a dyn ContainerRuntime) -> Self {
        Self { settings, runtime }
    }

    /// Run every check in order: socket, peer containers, directories.
    pub fn run(&self) -> Result<GateReport> {
        let mut advisories = Vec::new();

        self.check_socket(&mut advisories)?;

        let self_container = self_container_id(&self.settings.proc_root);
        match &self_container {
            Some(id) => debug!(container = %id, "Found own container id"),
            None => debug!("Own container id not found"),
        }
        let (proxy, generator) = self.discover(self_container.as_deref())?;

        self.check_directories(&mut advisories)?;

        Ok(GateReport {
            self_container,
            proxy,
            generator,
            advisories,
        })
    }

    #[cfg(unix)]
    fn check_socket(&self, advisories: &mut Vec<Advisory>) -> Result<()> {
        use std::os::unix::fs::FileTypeExt;
        use std::os::unix::net::UnixStream;

        let Some(path) = self.settings.docker_socket() else {
            debug!(host = %self.settings.docker_host, "Docker host is not a unix socket, skipping socket check");
            return Ok(());
        };

        let is_socket = std::fs::metadata(&path)
            .map(|m| m.file_type().is_socket())
            .unwrap_or(false);
        if !is_socket {
            let exists = std::fs::symlink_metadata(&path).is_ok();
            if exists && std::fs::File::open(&path).is_err() {
                advise(advisories, Advisory::SocketUnreadable { path: path.clone() });
            }
            return Err(Error::DockerSocketMissing { path });
        }

        if let Err(e) = UnixStream::connect(&path) {
            advise(
                advisories,
                Advisory::SocketUnreachable {
                    path,
                    reason: e.to_string(),
                },
            );
        }
        Ok(())
    }

    #[cfg(not(unix))]
    fn check_socket(&self, _advisories: &mut Vec<Advisory>) -> Result<()> {
        match self.settings.docker_socket() {
            Some(path) if !path.exists() => Err(Error::DockerSocketMissing { path }),
            _ => Ok(()),
        }
    }

    fn discover(&self, self_container: Option<&str>) -> Result<(PeerContainer, Generator)> {
        let proxy = self.discover_proxy(self_container)?;

        // A missing generator is reported before a missing proxy
        let generator = match self.discover_docker_gen()? {
            Some(docker_gen) => {
                info!(container = %docker_gen.id, by = ?docker_gen.discovered_by, "Found docker-gen container");
                Generator::Separate(docker_gen.id)
            }
            None => match &proxy {
                Some((info, _)) if info.runs_docker_gen() => {
                    debug!(container = %info.id, "docker-gen runs inside the nginx-proxy container");
                    Generator::Embedded
                }
                _ => return Err(Error::DockerGenNotFound),
            },
        };

        let (info, discovered_by) = proxy.ok_or(Error::ProxyContainerNotFound)?;
        info!(container = %info.id, by = ?discovered_by, "Found nginx-proxy container");

        Ok((
            PeerContainer {
                id: info.id,
                discovered_by,
            },
            generator,
        ))
    }

    fn discover_proxy(
        &self,
        self_container: Option<&str>,
    ) -> Result<Option<(ContainerInfo, Discovery)>> {
        if let Some(reference) = &self.settings.nginx_proxy_container {
            return Ok(self
                .runtime
                .inspect(reference)?
                .map(|info| (info, Discovery::Explicit)));
        }

        if let Some(id) = self.runtime.find_by_label(NGINX_PROXY_LABEL)? {
            if let Some(info) = self.runtime.inspect(&id)? {
                return Ok(Some((info, Discovery::Label)));
            }
        }

        if let Some(own) = self_container {
            if let Some(own) = self.runtime.inspect(own)? {
                for source in own.volumes_from() {
                    if let Some(info) = self.runtime.inspect(source)? {
                        return Ok(Some((info, Discovery::VolumesFrom)));
                    }
                }
            }
        }

        Ok(None)
    }

    fn discover_docker_gen(&self) -> Result<Option<PeerContainer>> {
        if let Some(reference) = &self.settings.docker_gen_container {
            return Ok(self.runtime.inspect(reference)?.map(|info| PeerContainer {
                id: info.id,
                discovered_by: Discovery::Explicit,
            }));
        }

        Ok(self
            .runtime
            .find_by_label(DOCKER_GEN_LABEL)?
            .map(|id| PeerContainer {
                id,
                discovered_by: Discovery::Label,
            }))
    }

    fn check_directories(&self, advisories: &mut Vec<Advisory>) -> Result<()> {
        let mountinfo = self.settings.proc_root.join("self").join("mountinfo");
        let mounts = std::fs::read_to_string(mountinfo)
            .ok()
            .map(|content| mount_points(&content));

        for dir in &self.settings.required_dirs {
            self.check_mounted(dir, mounts.as_deref(), advisories);
            if !dir.is_dir() {
                return Err(Error::DirectoryMissing { path: dir.clone() });
            }
            probe_writable(dir).map_err(|e| Error::DirectoryNotWritable {
                path: dir.clone(),
                source: e,
            })?;
        }

        for dir in &self.settings.advisory_dirs {
            let usable = std::fs::read_dir(dir)
                .map(|_| ())
                .and_then(|_| probe_writable(dir));
            if let Err(e) = usable {
                advise(
                    advisories,
                    Advisory::DirectoryUnusable {
                        path: dir.clone(),
                        reason: e.to_string(),
                    },
                );
            }
        }

        Ok(())
    }

    fn check_mounted(&self, dir: &Path, mounts: Option<&[PathBuf]>, advisories: &mut Vec<Advisory>) {
        match mounts {
            Some(mounts) if mounts.iter().any(|m| m == dir) => {}
            Some(_) => advise(advisories, Advisory::NotMounted { path: dir.to_path_buf() }),
            None => advise(
                advisories,
                Advisory::MountCheckUnavailable {
                    path: dir.to_path_buf(),
                },
            ),
        }
    }
}

fn advise(advisories: &mut Vec<Advisory>, advisory: Advisory) {
    warn!("{}", advisory);
    advisories.push(advisory);
}
