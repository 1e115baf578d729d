// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

//! Self-signed fallback certificate served for hosts without a real one.
//!
//! A default pair is ours when its subject CN is [`DEFAULT_CERT_COMMON_NAME`];
//! only ours is ever regenerated, and only when it is missing or has less than
//! [`MIN_VALIDITY_SECS`] left.

use crate::cert::{CertGenerator, DEFAULT_CERT_COMMON_NAME, DEFAULT_CERT_DAYS};
use crate::config::Paths;
use crate::error::Result;
use crate::fs::{StagedFile, NEW_SUFFIX};
use crate::ownership::{apply_or_warn, OwnershipPolicy};
use crate::reload::{reload_or_warn, ProxyReloader};
use crate::x509::{parse_cert_file, CertInfo};
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Three months: 60 x 60 x 24 x 30 x 3.
pub const MIN_VALIDITY_SECS: i64 = 7_776_000;

/// What is on disk at the default certificate paths.
#[derive(Debug, Clone)]
pub enum CertState {
    /// Certificate or key (or both) absent
    Missing,
    /// Both present; `None` when the certificate couldn't be parsed
    Present(Option<CertInfo>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Generate,
    KeepCurrent,
    KeepUserProvided,
}

/// Decision table; the first matching row wins.
pub fn decide(state: &CertState, marker: &str, min_validity: i64, now: i64) -> Action {
    match state {
        CertState::Missing => Action::Generate,
        CertState::Present(Some(info)) if info.common_name.as_deref() == Some(marker) => {
            if info.seconds_remaining_at(now) >= min_validity {
                Action::KeepCurrent
            } else {
                Action::Generate
            }
        }
        CertState::Present(_) => Action::KeepUserProvided,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefaultCertOutcome {
    /// No pair existed; one was generated
    Created,
    /// Our pair was close to expiry and was replaced
    Renewed { seconds_remaining: i64 },
    /// Our pair is still valid long enough
    Current { seconds_remaining: i64 },
    /// Somebody else's pair; left alone
    UserProvided { common_name: Option<String> },
    /// Generation failed; existing files untouched and no reload
    GenerationFailed,
}

pub struct DefaultCertProvisioner<'a> {
    cert_path: PathBuf,
    key_path: PathBuf,
    common_name: String,
    validity_days: u32,
    min_validity_secs: i64,
    generator: &'a dyn CertGenerator,
    ownership: &'a dyn OwnershipPolicy,
    reloader: &'a dyn ProxyReloader,
}

impl<'a> DefaultCertProvisioner<'a> {
    pub fn new(
        paths: &Paths,
        generator: &'a dyn CertGenerator,
        ownership: &'a dyn OwnershipPolicy,
        reloader: &'a dyn ProxyReloader,
    ) -> Self {
        Self {
            cert_path: paths.default_cert.clone(),
            key_path: paths.default_key.clone(),
            common_name: DEFAULT_CERT_COMMON_NAME.to_string(),
            validity_days: DEFAULT_CERT_DAYS,
            min_validity_secs: MIN_VALIDITY_SECS,
            generator,
            ownership,
            reloader,
        }
    }

    pub fn inspect(&self) -> CertState {
        if !self.cert_path.exists() || !self.key_path.exists() {
            return CertState::Missing;
        }
        match parse_cert_file(&self.cert_path) {
            Ok(info) => {
                debug!(
                    path = %self.cert_path.display(),
                    common_name = ?info.common_name,
                    expires = %info.expiry_string(),
                    "A default certificate is present"
                );
                CertState::Present(Some(info))
            }
            Err(e) => {
                debug!(path = %self.cert_path.display(), error = %e, "Default certificate is unreadable");
                CertState::Present(None)
            }
        }
    }

    /// Create or renew our default pair when needed.
    ///
    /// Ownership policy is applied to both paths whatever the decision.
    pub fn ensure_default_cert(&self) -> Result<DefaultCertOutcome> {
        let state = self.inspect();
        let now = time::OffsetDateTime::now_utc().unix_timestamp();
        let action = decide(&state, &self.common_name, self.min_validity_secs, now);

        let outcome = match (action, &state) {
            (Action::Generate, _) => match self.generate_and_install() {
                Ok(()) => {
                    info!(
                        key = %self.key_path.display(),
                        cert = %self.cert_path.display(),
                        "A default key and certificate have been created"
                    );
                    reload_or_warn(self.reloader);
                    match &state {
                        CertState::Present(Some(info)) => DefaultCertOutcome::Renewed {
                            seconds_remaining: info.seconds_remaining_at(now),
                        },
                        _ => DefaultCertOutcome::Created,
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Default certificate generation failed, keeping existing files");
                    DefaultCertOutcome::GenerationFailed
                }
            },
            (Action::KeepCurrent, CertState::Present(Some(info))) => {
                debug!("The self generated default certificate is still valid for more than three months. Skipping default certificate creation.");
                DefaultCertOutcome::Current {
                    seconds_remaining: info.seconds_remaining_at(now),
                }
            }
            (_, state) => {
                debug!("The default certificate is user provided. Skipping default certificate creation.");
                let common_name = match state {
                    CertState::Present(Some(info)) => info.common_name.clone(),
                    _ => None,
                };
                DefaultCertOutcome::UserProvided { common_name }
            }
        };

        apply_or_warn(self.ownership, &self.key_path);
        apply_or_warn(self.ownership, &self.cert_path);
        Ok(outcome)
    }

    /// Generate both files beside their targets, then rename them into place.
    /// Nothing is renamed unless both were written.
    fn generate_and_install(&self) -> Result<()> {
        let generated = self
            .generator
            .generate(&self.common_name, self.validity_days)?;
        let key = StagedFile::write_secret(&self.key_path, NEW_SUFFIX, generated.key_pem.as_bytes())?;
        let cert = StagedFile::write(&self.cert_path, NEW_SUFFIX, generated.cert_pem.as_bytes())?;
        key.commit()?;
        cert.commit()
    }
}
