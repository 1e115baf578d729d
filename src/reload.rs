// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

//! Proxy reload after an artifact changed on disk.

use crate::container::ContainerRuntime;
use crate::error::{Error, Result};
use tracing::{debug, info, warn};

/// Command run inside a proxy container that embeds docker-gen.
pub const EMBEDDED_RELOAD_COMMAND: [&str; 3] = [
    "sh",
    "-c",
    "/app/docker-entrypoint.sh /usr/local/bin/docker-gen /app/nginx.tmpl /etc/nginx/conf.d/default.conf; /usr/sbin/nginx -s reload",
];

pub trait ProxyReloader {
    fn reload(&self) -> Result<()>;
}

/// Trigger a reload; failures are logged and never abort provisioning.
pub fn reload_or_warn(reloader: &dyn ProxyReloader) {
    if let Err(e) = reloader.reload() {
        warn!(error = %e, "Proxy reload failed");
    }
}

/// Used when the startup gate was bypassed and no proxy is known.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoReload;

impl ProxyReloader for NoReload {
    fn reload(&self) -> Result<()> {
        debug!("Startup checks were skipped, not reloading the proxy");
        Ok(())
    }
}

/// Where the config generator runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Generator {
    /// A dedicated docker-gen container
    Separate(String),
    /// docker-gen runs inside the proxy container
    Embedded,
}

/// Reload through the container runtime, following the proxy topology.
pub struct ContainerReloader<'a> {
    runtime: &'a dyn ContainerRuntime,
    proxy: Option<String>,
    generator: Option<Generator>,
}

impl<'a> ContainerReloader<'a> {
    pub fn new(
        runtime: &'a dyn ContainerRuntime,
        proxy: Option<String>,
        generator: Option<Generator>,
    ) -> Self {
        Self {
            runtime,
            proxy,
            generator,
        }
    }
}

impl ProxyReloader for ContainerReloader<'_> {
    fn reload(&self) -> Result<()> {
        match (&self.generator, &self.proxy) {
            (Some(Generator::Separate(docker_gen)), proxy) => {
                info!(container = %docker_gen, "Reloading nginx docker-gen");
                self.runtime.signal(docker_gen, "HUP")?;
                // Certificates may change without a config change, so reload nginx too
                if let Some(proxy) = proxy {
                    info!(container = %proxy, "Reloading nginx");
                    self.runtime.signal(proxy, "HUP")?;
                }
                Ok(())
            }
            (_, Some(proxy)) => {
                info!(container = %proxy, "Reloading nginx proxy");
                self.runtime.exec(proxy, &EMBEDDED_RELOAD_COMMAND)
            }
            (_, None) => Err(Error::ReloadUnavailable),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeRuntime, RuntimeCall};

    #[test]
    fn test_separate_generator_signals_both() {
        let runtime = FakeRuntime::default();
        let reloader = ContainerReloader::new(
            &runtime,
            Some("nginx".into()),
            Some(Generator::Separate("docker-gen".into())),
        );
        reloader.reload().unwrap();
        assert_eq!(
            runtime.calls(),
            vec![
                RuntimeCall::Signal("docker-gen".into(), "HUP".into()),
                RuntimeCall::Signal("nginx".into(), "HUP".into()),
            ]
        );
    }

    #[test]
    fn test_separate_generator_without_proxy() {
        let runtime = FakeRuntime::default();
        let reloader =
            ContainerReloader::new(&runtime, None, Some(Generator::Separate("docker-gen".into())));
        reloader.reload().unwrap();
        assert_eq!(
            runtime.calls(),
            vec![RuntimeCall::Signal("docker-gen".into(), "HUP".into())]
        );
    }

    #[test]
    fn test_embedded_generator_execs_in_proxy() {
        let runtime = FakeRuntime::default();
        let reloader =
            ContainerReloader::new(&runtime, Some("nginx".into()), Some(Generator::Embedded));
        reloader.reload().unwrap();
        assert_eq!(
            runtime.calls(),
            vec![RuntimeCall::Exec(
                "nginx".into(),
                EMBEDDED_RELOAD_COMMAND.iter().map(|s| s.to_string()).collect()
            )]
        );
    }

    #[test]
    fn test_no_proxy_is_unavailable() {
        let runtime = FakeRuntime::default();
        let reloader = ContainerReloader::new(&runtime, None, None);
        assert!(matches!(reloader.reload(), Err(Error::ReloadUnavailable)));
        assert!(runtime.calls().is_empty());
    }

    #[test]
    fn test_reload_or_warn_swallows_errors() {
        let runtime = FakeRuntime::default();
        let reloader = ContainerReloader::new(&runtime, None, None);
        reload_or_warn(&reloader);
        assert!(NoReload.reload().is_ok());
    }
}
