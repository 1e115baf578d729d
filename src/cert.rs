// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

use crate::error::{Error, Result};
use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair};
use rsa::pkcs8::{EncodePrivateKey, LineEnding};
use rsa::RsaPrivateKey;

/// Subject common name that marks a default certificate as ours.
pub const DEFAULT_CERT_COMMON_NAME: &str = "acme-companion";

/// Validity of a freshly generated default certificate.
pub const DEFAULT_CERT_DAYS: u32 = 365;

pub const DEFAULT_KEY_BITS: usize = 4096;

/// A generated certificate with its private key.
pub struct GeneratedCert {
    /// The certificate in PEM format.
    pub cert_pem: String,
    /// The private key in PEM format (PKCS#8).
    pub key_pem: String,
}

/// Produces a self-signed certificate/key pair for a common name.
pub trait CertGenerator {
    fn generate(&self, common_name: &str, days: u32) -> Result<GeneratedCert>;
}

/// RSA key, SHA-256 signature, self-signed.
#[derive(Debug, Clone, Copy)]
pub struct RsaSelfSigned {
    key_bits: usize,
}

impl Default for RsaSelfSigned {
    fn default() -> Self {
        Self {
            key_bits: DEFAULT_KEY_BITS,
        }
    }
}

impl RsaSelfSigned {
    pub fn with_key_bits(key_bits: usize) -> Self {
        Self { key_bits }
    }

    pub fn key_bits(&self) -> usize {
        self.key_bits
    }
}

impl CertGenerator for RsaSelfSigned {
    fn generate(&self, common_name: &str, days: u32) -> Result<GeneratedCert> {
        let key_pair = generate_rsa_key(self.key_bits)?;
        self_signed(&key_pair, common_name, days)
    }
}

/// Generate an RSA key and load it for rcgen (signs with PKCS#1 v1.5 SHA-256).
fn generate_rsa_key(bits: usize) -> Result<KeyPair> {
    let mut rng = rsa::rand_core::OsRng;
    let private_key =
        RsaPrivateKey::new(&mut rng, bits).map_err(|e| Error::KeyGen(e.to_string()))?;
    let key_pem = private_key
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| Error::KeyGen(e.to_string()))?;
    Ok(KeyPair::from_pem(&key_pem)?)
}

/// Build a self-signed certificate with `CN=<common_name>` for `key_pair`.
pub fn self_signed(key_pair: &KeyPair, common_name: &str, days: u32) -> Result<GeneratedCert> {
    validate_days(days)?;

    let mut params = CertificateParams::default();
    params.distinguished_name = DistinguishedName::new();
    params
        .distinguished_name
        .push(DnType::CommonName, common_name);

    let now = time::OffsetDateTime::now_utc();
    params.not_before = now;
    params.not_after = now + time::Duration::days(days as i64);

    let cert = params.self_signed(key_pair)?;

    Ok(GeneratedCert {
        cert_pem: cert.pem(),
        key_pem: key_pair.serialize_pem(),
    })
}

pub fn validate_days(days: u32) -> Result<()> {
    if days == 0 {
        return Err(Error::Config("certificate validity cannot be 0 days".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::x509::parse_cert_pem;

    #[test]
    fn test_validate_days() {
        assert!(validate_days(0).is_err());
        assert!(validate_days(1).is_ok());
        assert!(validate_days(DEFAULT_CERT_DAYS).is_ok());
    }

    #[test]
    fn test_default_generator_is_rsa_4096() {
        assert_eq!(RsaSelfSigned::default().key_bits(), 4096);
    }

    #[test]
    fn test_self_signed_subject_and_validity() {
        let key = KeyPair::generate().unwrap();
        let generated = self_signed(&key, DEFAULT_CERT_COMMON_NAME, DEFAULT_CERT_DAYS).unwrap();

        let info = parse_cert_pem(&generated.cert_pem).unwrap();
        assert_eq!(info.common_name.as_deref(), Some(DEFAULT_CERT_COMMON_NAME));
        assert!(info.seconds_remaining() > 364 * 86_400);
        assert!(generated.key_pem.contains("PRIVATE KEY"));
    }

    #[test]
    fn test_self_signed_rejects_zero_days() {
        let key = KeyPair::generate().unwrap();
        assert!(self_signed(&key, DEFAULT_CERT_COMMON_NAME, 0).is_err());
    }

    // Smaller key than production keeps debug-build keygen time reasonable
    #[test]
    fn test_rsa_generator_signs_with_sha256() {
        use x509_parser::prelude::*;

        let generated = RsaSelfSigned::with_key_bits(2048)
            .generate(DEFAULT_CERT_COMMON_NAME, 30)
            .unwrap();

        let pem = ::pem::parse(&generated.cert_pem).unwrap();
        let (_, cert) = X509Certificate::from_der(pem.contents()).unwrap();
        assert_eq!(
            cert.signature_algorithm.algorithm,
            x509_parser::oid_registry::OID_PKCS1_SHA256WITHRSA
        );

        // The key must load back as an RSA signing key
        let key = KeyPair::from_pem(&generated.key_pem).unwrap();
        assert_eq!(key.algorithm(), &rcgen::PKCS_RSA_SHA256);
    }
}
