// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

//! Diffie-Hellman parameter provisioning from the RFC 7919 groups.
//!
//! The active `dhparam.pem` is classified by comparing its SHA-256 fingerprint
//! against every bundled group, not only the requested one. A match means the
//! file was written by us (possibly at another size) and may be replaced; no
//! match means an operator supplied it and it is never overwritten.

use crate::error::{Error, Result};
use crate::fs::{atomic_write, TMP_SUFFIX};
use crate::ownership::{apply_or_warn, OwnershipPolicy};
use crate::reload::{reload_or_warn, ProxyReloader};
use sha2::{Digest, Sha256};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info, warn};

/// Supported RFC 7919 group sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DhBits {
    Ffdhe2048,
    Ffdhe3072,
    Ffdhe4096,
}

impl DhBits {
    pub const ALL: [DhBits; 3] = [DhBits::Ffdhe2048, DhBits::Ffdhe3072, DhBits::Ffdhe4096];

    pub fn bits(self) -> u32 {
        match self {
            DhBits::Ffdhe2048 => 2048,
            DhBits::Ffdhe3072 => 3072,
            DhBits::Ffdhe4096 => 4096,
        }
    }

    /// File name of the group in the reference directory.
    pub fn file_name(self) -> String {
        format!("ffdhe{}.pem", self.bits())
    }
}

impl TryFrom<u32> for DhBits {
    type Error = Error;

    fn try_from(bits: u32) -> Result<Self> {
        match bits {
            2048 => Ok(DhBits::Ffdhe2048),
            3072 => Ok(DhBits::Ffdhe3072),
            4096 => Ok(DhBits::Ffdhe4096),
            other => Err(Error::UnsupportedDhBits(other.to_string())),
        }
    }
}

impl FromStr for DhBits {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        value
            .trim()
            .parse::<u32>()
            .map_err(|_| Error::UnsupportedDhBits(value.to_string()))
            .and_then(DhBits::try_from)
    }
}

impl fmt::Display for DhBits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.bits())
    }
}

/// SHA-256 digest of a file's content.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    pub fn of(content: &[u8]) -> Self {
        Self(Sha256::digest(content).into())
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self)
    }
}

/// One bundled parameter set.
#[derive(Debug, Clone)]
pub struct ReferenceParams {
    pub bits: DhBits,
    pub content: Cow<'static, [u8]>,
    pub fingerprint: Fingerprint,
}

impl ReferenceParams {
    pub fn new(bits: DhBits, content: impl Into<Cow<'static, [u8]>>) -> Self {
        let content = content.into();
        let fingerprint = Fingerprint::of(&content);
        Self {
            bits,
            content,
            fingerprint,
        }
    }
}

/// Immutable catalog of reference parameter sets, fingerprinted at load.
#[derive(Debug, Clone)]
pub struct ReferenceCatalog {
    entries: BTreeMap<DhBits, ReferenceParams>,
}

impl ReferenceCatalog {
    /// The RFC 7919 groups embedded in the binary.
    pub fn bundled() -> Self {
        Self::from_entries([
            (
                DhBits::Ffdhe2048,
                Cow::Borrowed(&include_bytes!("../dhparam/ffdhe2048.pem")[..]),
            ),
            (
                DhBits::Ffdhe3072,
                Cow::Borrowed(&include_bytes!("../dhparam/ffdhe3072.pem")[..]),
            ),
            (
                DhBits::Ffdhe4096,
                Cow::Borrowed(&include_bytes!("../dhparam/ffdhe4096.pem")[..]),
            ),
        ])
    }

    /// Load `ffdhe{2048,3072,4096}.pem` from a directory. All three must exist.
    pub fn load_dir(dir: &Path) -> Result<Self> {
        let mut entries = Vec::with_capacity(DhBits::ALL.len());
        for bits in DhBits::ALL {
            let path = dir.join(bits.file_name());
            let content = std::fs::read(&path).map_err(|e| Error::ReadFile {
                path: path.clone(),
                source: e,
            })?;
            entries.push((bits, Cow::Owned(content)));
        }
        Ok(Self::from_entries(entries))
    }

    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (DhBits, Cow<'static, [u8]>)>,
    {
        let entries = entries
            .into_iter()
            .map(|(bits, content)| (bits, ReferenceParams::new(bits, content)))
            .collect();
        Self { entries }
    }

    pub fn get(&self, bits: DhBits) -> Option<&ReferenceParams> {
        self.entries.get(&bits)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ReferenceParams> {
        self.entries.values()
    }

    /// Size of the reference entry whose fingerprint equals `fingerprint`.
    ///
    /// Checks every entry, so a file written for another size is still
    /// recognised as ours.
    pub fn classify(&self, fingerprint: &Fingerprint) -> Option<DhBits> {
        self.iter()
            .find(|entry| entry.fingerprint == *fingerprint)
            .map(|entry| entry.bits)
    }
}

/// Who produced the active parameters file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    Absent,
    ToolGenerated(DhBits),
    UserProvided,
}

/// What `ensure_dhparam` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DhParamOutcome {
    /// Skip flag set; nothing was read or written
    Skipped,
    /// Active file already holds the requested group
    AlreadyCurrent(DhBits),
    /// Active file is not one of ours and was left alone
    UserProvided,
    /// No active file existed; the requested group was written
    Installed(DhBits),
    /// One of our files at another size was replaced
    Replaced { previous: DhBits, current: DhBits },
}

impl DhParamOutcome {
    pub fn wrote_file(&self) -> bool {
        matches!(
            self,
            DhParamOutcome::Installed(_) | DhParamOutcome::Replaced { .. }
        )
    }
}

pub struct DhParamProvisioner<'a> {
    catalog: &'a ReferenceCatalog,
    target: PathBuf,
    ownership: &'a dyn OwnershipPolicy,
    reloader: &'a dyn ProxyReloader,
}

impl<'a> DhParamProvisioner<'a> {
    pub fn new(
        catalog: &'a ReferenceCatalog,
        target: impl Into<PathBuf>,
        ownership: &'a dyn OwnershipPolicy,
        reloader: &'a dyn ProxyReloader,
    ) -> Self {
        Self {
            catalog,
            target: target.into(),
            ownership,
            reloader,
        }
    }

    /// Classify the active file at the target path.
    ///
    /// A target that exists but can't be read is treated as user-provided.
    pub fn provenance(&self) -> Provenance {
        match std::fs::read(&self.target) {
            Ok(content) => match self.catalog.classify(&Fingerprint::of(&content)) {
                Some(bits) => Provenance::ToolGenerated(bits),
                None => Provenance::UserProvided,
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Provenance::Absent,
            Err(e) => {
                warn!(path = %self.target.display(), error = %e, "Can't read the active Diffie-Hellman group, leaving it alone");
                Provenance::UserProvided
            }
        }
    }

    /// Make the active parameters file hold the `requested_bits` group unless
    /// skipped or user-provided.
    ///
    /// Fails only on an unsupported size (or when the replacement can't be written).
    pub fn ensure_dhparam(&self, requested_bits: &str, skip: bool) -> Result<DhParamOutcome> {
        if skip {
            info!("Skipping Diffie-Hellman group setup");
            return Ok(DhParamOutcome::Skipped);
        }

        let requested = DhBits::from_str(requested_bits)?;
        let reference = self
            .catalog
            .get(requested)
            .ok_or(Error::MissingReference(requested.bits()))?;
        debug!(
            bits = %requested,
            fingerprint = %reference.fingerprint,
            "Expected Diffie-Hellman group"
        );

        let previous = match self.provenance() {
            Provenance::Absent => None,
            Provenance::ToolGenerated(bits) if bits == requested => {
                debug!(path = %self.target.display(), bits = %bits, "Diffie-Hellman group already in place");
                apply_or_warn(self.ownership, &self.target);
                return Ok(DhParamOutcome::AlreadyCurrent(bits));
            }
            Provenance::ToolGenerated(bits) => {
                info!(
                    path = %self.target.display(),
                    from = %bits,
                    to = %requested,
                    "Replacing Diffie-Hellman group of a different size"
                );
                Some(bits)
            }
            Provenance::UserProvided => {
                apply_or_warn(self.ownership, &self.target);
                info!(
                    path = %self.target.display(),
                    "A custom dhparam.pem file is present, skipping Diffie-Hellman group setup"
                );
                return Ok(DhParamOutcome::UserProvided);
            }
        };

        atomic_write(&self.target, TMP_SUFFIX, &reference.content)?;
        info!(
            path = %self.target.display(),
            bits = %requested,
            "The RFC7919 Diffie-Hellman group has been written"
        );
        apply_or_warn(self.ownership, &self.target);
        reload_or_warn(self.reloader);

        Ok(match previous {
            None => DhParamOutcome::Installed(requested),
            Some(previous) => DhParamOutcome::Replaced {
                previous,
                current: requested,
            },
        })
    }
}
