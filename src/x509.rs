// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

//! Parse X.509 certificates without shelling out to openssl.

use crate::error::{Error, Result};
use std::path::Path;
use x509_parser::prelude::*;

#[derive(Debug, Clone)]
pub struct CertInfo {
    pub not_after_timestamp: i64,
    pub not_before_timestamp: i64,
    pub common_name: Option<String>,
}

impl CertInfo {
    /// Seconds until expiry relative to `now` (negative once expired).
    pub fn seconds_remaining_at(&self, now: i64) -> i64 {
        self.not_after_timestamp - now
    }

    pub fn seconds_remaining(&self) -> i64 {
        self.seconds_remaining_at(::time::OffsetDateTime::now_utc().unix_timestamp())
    }

    pub fn expiry_string(&self) -> String {
        match ::time::OffsetDateTime::from_unix_timestamp(self.not_after_timestamp) {
            Ok(dt) => format!("{}-{:02}-{:02}", dt.year(), dt.month() as u8, dt.day()),
            Err(_) => "Invalid date".to_string(),
        }
    }
}

pub fn parse_cert_file(path: &Path) -> Result<CertInfo> {
    let pem_data = std::fs::read_to_string(path).map_err(|e| Error::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;
    parse_cert_pem(&pem_data)
}

pub fn parse_cert_pem(pem_str: &str) -> Result<CertInfo> {
    let pem = ::pem::parse(pem_str)
        .map_err(|e| Error::CertParse(format!("Failed to parse PEM: {}", e)))?;

    if pem.tag() != "CERTIFICATE" {
        return Err(Error::CertParse(format!(
            "Expected CERTIFICATE, got {}",
            pem.tag()
        )));
    }

    let (_, cert) = X509Certificate::from_der(pem.contents())
        .map_err(|e| Error::CertParse(format!("Invalid X.509: {}", e)))?;

    let common_name = cert
        .subject()
        .iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .map(String::from);

    Ok(CertInfo {
        not_after_timestamp: cert.validity().not_after.timestamp(),
        not_before_timestamp: cert.validity().not_before.timestamp(),
        common_name,
    })
}
