// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

use clap::error::ErrorKind;
use clap::{ArgAction, Parser};
use companion_preflight::config::{
    self, parse_flag, parse_id, parse_mode, DEFAULT_ACME_DIR, DEFAULT_CERTS_DIR,
    DEFAULT_DHPARAM_BITS, DEFAULT_DOCKER_HOST, DEFAULT_HTML_DIR,
};
use companion_preflight::ownership::apply_or_warn;
use companion_preflight::{
    Config, DefaultCertProvisioner, DhParamProvisioner, DockerCli, Error, FileOwnership,
    GateSettings, NoReload, OwnershipConfig, Paths, ProxyReloader, ReferenceCatalog, Result,
    RsaSelfSigned, StartupGate,
};
use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::Command;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Prepare TLS artifacts for nginx-proxy, then run the companion daemon.
#[derive(Parser, Debug)]
#[command(name = "companion-preflight", author, version, about, long_about = None)]
struct Cli {
    /// Diffie-Hellman group size: 2048, 3072 or 4096
    #[arg(long, env = "DHPARAM_BITS", default_value = DEFAULT_DHPARAM_BITS)]
    dhparam_bits: String,

    /// Leave dhparam.pem alone
    #[arg(long, env = "DHPARAM_SKIP", action = ArgAction::Set, value_parser = parse_flag,
          default_value = "false", num_args = 0..=1, default_missing_value = "true")]
    dhparam_skip: bool,

    /// Create the fallback default certificate
    #[arg(long, env = "CREATE_DEFAULT_CERTIFICATE", action = ArgAction::Set, value_parser = parse_flag,
          default_value = "true", num_args = 0..=1, default_missing_value = "true")]
    create_default_certificate: bool,

    /// Verbose logging
    #[arg(long, env = "DEBUG", action = ArgAction::Set, value_parser = parse_flag,
          default_value = "false", num_args = 0..=1, default_missing_value = "true")]
    debug: bool,

    /// Container runtime endpoint
    #[arg(long, env = "DOCKER_HOST", default_value = DEFAULT_DOCKER_HOST)]
    docker_host: String,

    /// nginx-proxy container name or ID
    #[arg(long, env = "NGINX_PROXY_CONTAINER")]
    nginx_proxy_container: Option<String>,

    /// docker-gen container name or ID (three-container setup)
    #[arg(long, env = "NGINX_DOCKER_GEN_CONTAINER")]
    docker_gen_container: Option<String>,

    /// Owner of generated files (`root` or numeric uid)
    #[arg(long, env = "FILES_UID", value_parser = parse_id)]
    files_uid: Option<u32>,

    /// Group of generated files (defaults to the owner)
    #[arg(long, env = "FILES_GID", value_parser = parse_id)]
    files_gid: Option<u32>,

    /// Mode of generated files (octal)
    #[arg(long, env = "FILES_PERMS", value_parser = parse_mode,
          default_value = "644")]
    files_perms: u32,

    /// Mode of created directories (octal)
    #[arg(long, env = "FOLDERS_PERMS", value_parser = parse_mode,
          default_value = "755")]
    folders_perms: u32,

    /// Certificate directory shared with nginx-proxy
    #[arg(long, env = "CERTS_DIR", default_value = DEFAULT_CERTS_DIR)]
    certs_dir: PathBuf,

    /// ACME client state directory
    #[arg(long, env = "ACME_STATE_DIR", default_value = DEFAULT_ACME_DIR)]
    acme_dir: PathBuf,

    /// Challenge webroot shared with nginx-proxy
    #[arg(long, env = "HTML_DIR", default_value = DEFAULT_HTML_DIR)]
    html_dir: PathBuf,

    /// Directory with ffdhe<bits>.pem files replacing the built-in groups
    #[arg(long, env = "DHPARAM_REFERENCE_DIR")]
    dhparam_reference_dir: Option<PathBuf>,

    /// Container runtime client
    #[arg(long, env = "DOCKER_CLI", default_value = "docker")]
    docker_cli: PathBuf,

    /// Skip the socket, container and volume checks
    #[arg(long, env = "SKIP_STARTUP_CHECKS", action = ArgAction::Set, value_parser = parse_flag,
          default_value = "false", num_args = 0..=1, default_missing_value = "true")]
    skip_startup_checks: bool,

    /// Command to run once provisioning is done
    #[arg(last = true)]
    command: Vec<String>,
}

impl Cli {
    fn config(&self) -> Config {
        Config {
            dhparam_bits: self.dhparam_bits.clone(),
            dhparam_skip: self.dhparam_skip,
            create_default_cert: self.create_default_certificate,
            debug: self.debug,
            docker_host: self.docker_host.clone(),
            nginx_proxy_container: non_empty(&self.nginx_proxy_container),
            docker_gen_container: non_empty(&self.docker_gen_container),
            ownership: OwnershipConfig {
                uid: self.files_uid,
                gid: self.files_gid,
                files_perms: self.files_perms,
                folders_perms: self.folders_perms,
            },
        }
    }

    fn paths(&self) -> Paths {
        Paths::new(&self.certs_dir, &self.acme_dir, &self.html_dir)
            .with_dhparam_reference(self.dhparam_reference_dir.clone())
    }
}

/// Container env files often set variables to an empty string.
fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}

fn init_tracing(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .init();
}

fn main() {
    // Reset SIGPIPE to default behavior (exit) instead of panic
    #[cfg(unix)]
    unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_DFL);
    }

    // Bad option values are configuration errors: exit 1 like the others
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => e.exit(),
        Err(e) => {
            let _ = e.print();
            std::process::exit(1);
        }
    };
    init_tracing(cli.debug);

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = cli.config();
    let paths = cli.paths();
    config::validate(&config)?;

    let runtime = DockerCli::new(&cli.docker_cli, &config.docker_host);
    let report = if cli.skip_startup_checks {
        info!("Skipping startup checks");
        None
    } else {
        Some(StartupGate::new(GateSettings::from_config(&config, &paths), &runtime).run()?)
    };

    let container_reloader = report.as_ref().map(|report| report.reloader(&runtime));
    let reloader: &dyn ProxyReloader = match &container_reloader {
        Some(reloader) => reloader,
        None => &NoReload,
    };

    let catalog = match &paths.dhparam_reference {
        Some(dir) => ReferenceCatalog::load_dir(dir)?,
        None => ReferenceCatalog::bundled(),
    };
    let ownership = FileOwnership::new(config.ownership);
    apply_or_warn(&ownership, &paths.certs);

    let dhparam = DhParamProvisioner::new(&catalog, &paths.dhparam, &ownership, reloader)
        .ensure_dhparam(&config.dhparam_bits, config.dhparam_skip)?;
    debug!(outcome = ?dhparam, "Diffie-Hellman parameters done");

    if config.create_default_cert {
        let generator = RsaSelfSigned::default();
        let outcome = DefaultCertProvisioner::new(&paths, &generator, &ownership, reloader)
            .ensure_default_cert()?;
        debug!(outcome = ?outcome, "Default certificate done");
    }

    if cli.command.is_empty() {
        return Ok(());
    }
    exec(&cli.command)
}

/// Replace this process with the daemon command.
#[cfg(unix)]
fn exec(command: &[String]) -> Result<()> {
    use std::os::unix::process::CommandExt;

    info!(command = %command.join(" "), "Starting");
    let source = Command::new(&command[0]).args(&command[1..]).exec();
    Err(Error::Exec {
        command: command.join(" "),
        source,
    })
}

#[cfg(not(unix))]
fn exec(command: &[String]) -> Result<()> {
    info!(command = %command.join(" "), "Starting");
    let status = Command::new(&command[0])
        .args(&command[1..])
        .status()
        .map_err(|source| Error::Exec {
            command: command.join(" "),
            source,
        })?;
    std::process::exit(status.code().unwrap_or(1));
}
