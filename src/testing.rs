// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

//! Recording collaborators shared by the unit tests.

use crate::cert::{self_signed, CertGenerator, GeneratedCert};
use crate::container::{ContainerInfo, ContainerRuntime};
use crate::error::{Error, Result};
use crate::ownership::OwnershipPolicy;
use crate::reload::ProxyReloader;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Default)]
pub struct RecordingOwnership {
    applied: RefCell<Vec<PathBuf>>,
}

impl RecordingOwnership {
    pub fn applied(&self) -> Vec<PathBuf> {
        self.applied.borrow().clone()
    }
}

impl OwnershipPolicy for RecordingOwnership {
    fn apply(&self, path: &Path) -> Result<()> {
        self.applied.borrow_mut().push(path.to_path_buf());
        Ok(())
    }
}

#[derive(Default)]
pub struct CountingReloader {
    count: Cell<usize>,
}

impl CountingReloader {
    pub fn count(&self) -> usize {
        self.count.get()
    }
}

impl ProxyReloader for CountingReloader {
    fn reload(&self) -> Result<()> {
        self.count.set(self.count.get() + 1);
        Ok(())
    }
}

/// ECDSA keys keep tests fast; the provisioner doesn't care about the key type.
#[derive(Default)]
pub struct FastGenerator {
    calls: Cell<usize>,
}

impl FastGenerator {
    pub fn calls(&self) -> usize {
        self.calls.get()
    }
}

impl CertGenerator for FastGenerator {
    fn generate(&self, common_name: &str, days: u32) -> Result<GeneratedCert> {
        self.calls.set(self.calls.get() + 1);
        let key_pair = rcgen::KeyPair::generate()?;
        self_signed(&key_pair, common_name, days)
    }
}

pub struct FailingGenerator;

impl CertGenerator for FailingGenerator {
    fn generate(&self, _common_name: &str, _days: u32) -> Result<GeneratedCert> {
        Err(Error::KeyGen("entropy source unavailable".into()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeCall {
    Signal(String, String),
    Exec(String, Vec<String>),
}

/// In-memory container runtime.
#[derive(Default)]
pub struct FakeRuntime {
    /// Keyed by every reference (name or id) that resolves to the container
    containers: HashMap<String, ContainerInfo>,
    labels: HashMap<String, String>,
    calls: RefCell<Vec<RuntimeCall>>,
}

impl FakeRuntime {
    pub fn with_container(mut self, names: &[&str], info: ContainerInfo) -> Self {
        self.containers.insert(info.id.clone(), info.clone());
        for name in names {
            self.containers.insert(name.to_string(), info.clone());
        }
        self
    }

    pub fn with_label(mut self, label: &str, id: &str) -> Self {
        self.labels.insert(label.to_string(), id.to_string());
        self
    }

    pub fn calls(&self) -> Vec<RuntimeCall> {
        self.calls.borrow().clone()
    }
}

impl ContainerRuntime for FakeRuntime {
    fn inspect(&self, reference: &str) -> Result<Option<ContainerInfo>> {
        Ok(self.containers.get(reference).cloned())
    }

    fn find_by_label(&self, label: &str) -> Result<Option<String>> {
        Ok(self.labels.get(label).cloned())
    }

    fn signal(&self, container: &str, signal: &str) -> Result<()> {
        self.calls
            .borrow_mut()
            .push(RuntimeCall::Signal(container.into(), signal.into()));
        Ok(())
    }

    fn exec(&self, container: &str, command: &[&str]) -> Result<()> {
        self.calls.borrow_mut().push(RuntimeCall::Exec(
            container.into(),
            command.iter().map(|s| s.to_string()).collect(),
        ));
        Ok(())
    }
}
