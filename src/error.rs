// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Unsupported DHPARAM_BITS size: {0}. Supported values are 2048, 3072, or 4096 (default).")]
    UnsupportedDhBits(String),

    #[error("No reference Diffie-Hellman group for {0} bits in the catalog")]
    MissingReference(u32),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to read file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write file {path}: {source}")]
    WriteFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to set ownership or permissions on {path}: {source}")]
    Permissions {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid path: {0}")]
    InvalidPath(PathBuf),

    #[error("Certificate generation failed: {0}")]
    CertGen(#[from] rcgen::Error),

    #[error("Private key generation failed: {0}")]
    KeyGen(String),

    #[error("Failed to parse certificate: {0}")]
    CertParse(String),

    #[error("You need to share your Docker host socket with a volume at {path}.\nTypically you should run your container with: '-v /var/run/docker.sock:{path}:ro'")]
    DockerSocketMissing { path: PathBuf },

    #[error("Can't get docker-gen container id!\nIf you are running a three containers setup, check that you are doing one of the following:\n\t- Set the NGINX_DOCKER_GEN_CONTAINER env var to the name of the docker-gen container.\n\t- Label the docker-gen container to use with 'com.github.nginx-proxy.docker-gen'.")]
    DockerGenNotFound,

    #[error("Can't get nginx-proxy container id!\nCheck that you are doing one of the following:\n\t- Use the --volumes-from option to mount volumes from the nginx-proxy container.\n\t- Set the NGINX_PROXY_CONTAINER env var to the name of the nginx-proxy container.\n\t- Label the nginx-proxy container to use with 'com.github.nginx-proxy.nginx'.")]
    ProxyContainerNotFound,

    #[error("Can't access the '{path}' directory!\nCheck that '{path}' is declared as a writable volume.")]
    DirectoryMissing { path: PathBuf },

    #[error("Can't write to the '{path}' directory: {source}\nCheck that '{path}' is exported as a writable volume.")]
    DirectoryNotWritable {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Container runtime error: {0}")]
    Runtime(String),

    #[error("Command failed: {command}\n{stderr}")]
    Command { command: String, stderr: String },

    #[error("Can't reload nginx-proxy: no proxy container known")]
    ReloadUnavailable,

    #[error("Failed to exec '{command}': {source}")]
    Exec {
        command: String,
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
