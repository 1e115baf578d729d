// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

//! Startup provisioning for an ACME companion container running next to
//! nginx-proxy: Diffie-Hellman parameters and the fallback default certificate.
//!
//! ```rust,no_run
//! use companion_preflight::{
//!     DefaultCertProvisioner, DhParamProvisioner, FileOwnership, NoReload, Paths,
//!     ReferenceCatalog, RsaSelfSigned,
//! };
//!
//! let paths = Paths::default();
//! let catalog = ReferenceCatalog::bundled();
//! let ownership = FileOwnership::new(Default::default());
//!
//! DhParamProvisioner::new(&catalog, &paths.dhparam, &ownership, &NoReload)
//!     .ensure_dhparam("4096", false)?;
//!
//! let generator = RsaSelfSigned::default();
//! DefaultCertProvisioner::new(&paths, &generator, &ownership, &NoReload)
//!     .ensure_default_cert()?;
//! # Ok::<(), companion_preflight::Error>(())
//! ```

/// Self-signed certificate generation.
pub mod cert;
/// Configuration handling.
pub mod config;
/// Container runtime access.
pub mod container;
/// Fallback default certificate.
pub mod default_cert;
/// Diffie-Hellman parameter provisioning.
pub mod dhparam;
/// Error types.
pub mod error;
/// Filesystem utilities.
pub mod fs;
/// Startup precondition checks.
pub mod gate;
/// File owner and mode policy.
pub mod ownership;
/// Proxy reload.
pub mod reload;
/// X.509 certificate parsing.
pub mod x509;

#[cfg(test)]
mod testing;

pub use cert::{CertGenerator, GeneratedCert, RsaSelfSigned, DEFAULT_CERT_COMMON_NAME};
pub use config::{Config, OwnershipConfig, Paths};
pub use container::{ContainerInfo, ContainerRuntime, DockerCli};
pub use default_cert::{DefaultCertOutcome, DefaultCertProvisioner, MIN_VALIDITY_SECS};
pub use dhparam::{DhBits, DhParamOutcome, DhParamProvisioner, Provenance, ReferenceCatalog};
pub use error::{Error, Result};
pub use gate::{Advisory, GateReport, GateSettings, StartupGate};
pub use ownership::{FileOwnership, OwnershipPolicy};
pub use reload::{ContainerReloader, Generator, NoReload, ProxyReloader};
pub use x509::{parse_cert_file, parse_cert_pem, CertInfo};
