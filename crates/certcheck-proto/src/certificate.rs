//! Parsed X.509 certificate
//!
//! [`Certificate`] owns the DER encoding together with the raw spans that the
//! OCSP and signature code needs byte-exact (subject and issuer Names, the
//! SubjectPublicKeyInfo, the serial INTEGER contents and tbsCertificate).
//! Human-readable fields come from `x509-parser`.

use std::fmt;

use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use sha1::{Digest, Sha1};
use x509_parser::extensions::ParsedExtension;
use x509_parser::num_bigint::BigUint;
use x509_parser::prelude::*;

use crate::signature::{verify_signature, SignatureError};

/// Certificate decoding failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CertificateError {
    #[error("certificate structure: {0}")]
    Structure(String),

    #[error("trailing data after certificate")]
    TrailingData,

    #[error("certificate fields: {0}")]
    Fields(String),
}

/// One certificate extension as encoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extension {
    /// extnID contents octets
    pub oid: Vec<u8>,
    pub critical: bool,
    /// extnValue OCTET STRING contents
    pub value: Vec<u8>,
}

/// An X.509 certificate
#[derive(Clone)]
pub struct Certificate {
    der: Vec<u8>,
    tbs: Vec<u8>,
    signature_algorithm: Vec<u8>,
    signature: Vec<u8>,
    raw_serial: Vec<u8>,
    raw_issuer: Vec<u8>,
    raw_subject: Vec<u8>,
    spki: Vec<u8>,
    key_bits: Vec<u8>,
    key_hash: Vec<u8>,
    serial: BigUint,
    subject: String,
    issuer: String,
    common_name: Option<String>,
    not_before: DateTime<Utc>,
    not_after: DateTime<Utc>,
    extensions: Vec<Extension>,
    ocsp_signing: bool,
}

impl Certificate {
    /// Parse a DER-encoded certificate. Trailing bytes are rejected.
    pub fn from_der(der: &[u8]) -> Result<Self, CertificateError> {
        let (rest, parsed) =
            parse_x509_certificate(der).map_err(|e| CertificateError::Structure(e.to_string()))?;
        if !rest.is_empty() {
            return Err(CertificateError::TrailingData);
        }

        let tbs = &parsed.tbs_certificate;
        let spki = parsed.public_key();
        let key_bits: &[u8] = &spki.subject_public_key.data;

        let common_name = parsed
            .subject()
            .iter_common_name()
            .next()
            .and_then(|cn| cn.as_str().ok())
            .map(str::to_string);

        let ocsp_signing = parsed.extensions().iter().any(|ext| {
            matches!(ext.parsed_extension(), ParsedExtension::ExtendedKeyUsage(eku) if eku.ocsp_signing)
        });

        let extensions = parsed
            .extensions()
            .iter()
            .map(|ext| Extension {
                oid: ext.oid.as_bytes().to_vec(),
                critical: ext.critical,
                value: ext.value.to_vec(),
            })
            .collect();

        Ok(Self {
            der: der.to_vec(),
            tbs: tbs.as_ref().to_vec(),
            signature_algorithm: parsed.signature_algorithm.algorithm.as_bytes().to_vec(),
            signature: parsed.signature_value.data.to_vec(),
            raw_serial: tbs.raw_serial().to_vec(),
            raw_issuer: parsed.issuer().as_raw().to_vec(),
            raw_subject: parsed.subject().as_raw().to_vec(),
            spki: spki.raw.to_vec(),
            key_bits: key_bits.to_vec(),
            key_hash: Sha1::digest(key_bits).to_vec(),
            serial: parsed.serial.clone(),
            subject: parsed.subject().to_string(),
            issuer: parsed.issuer().to_string(),
            common_name,
            not_before: asn1_time_to_chrono(&parsed.validity().not_before)?,
            not_after: asn1_time_to_chrono(&parsed.validity().not_after)?,
            extensions,
            ocsp_signing,
        })
    }

    /// Complete DER encoding
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// Serial number INTEGER contents exactly as encoded
    pub fn raw_serial(&self) -> &[u8] {
        &self.raw_serial
    }

    pub fn serial(&self) -> &BigUint {
        &self.serial
    }

    /// Uppercase hexadecimal serial without separators
    pub fn serial_hex(&self) -> String {
        format!("{:X}", self.serial)
    }

    /// Encoded issuer Name
    pub fn raw_issuer(&self) -> &[u8] {
        &self.raw_issuer
    }

    /// Encoded subject Name
    pub fn raw_subject(&self) -> &[u8] {
        &self.raw_subject
    }

    /// Encoded SubjectPublicKeyInfo
    pub fn spki(&self) -> &[u8] {
        &self.spki
    }

    /// subjectPublicKey BIT STRING contents
    pub fn public_key_bits(&self) -> &[u8] {
        &self.key_bits
    }

    /// SHA-1 over the subjectPublicKey BIT STRING contents, as used by
    /// OCSP `byKey` responder IDs
    pub fn key_hash(&self) -> &[u8] {
        &self.key_hash
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn common_name(&self) -> Option<&str> {
        self.common_name.as_deref()
    }

    pub fn not_before(&self) -> DateTime<Utc> {
        self.not_before
    }

    pub fn not_after(&self) -> DateTime<Utc> {
        self.not_after
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.not_before <= now && now <= self.not_after
    }

    /// Extensions in certificate order
    pub fn extensions(&self) -> &[Extension] {
        &self.extensions
    }

    /// First extension with the given extnID contents octets
    pub fn extension(&self, oid: &[u8]) -> Option<&Extension> {
        self.extensions.iter().find(|ext| ext.oid == oid)
    }

    /// Whether the certificate carries the id-kp-OCSPSigning extended key usage
    pub fn has_ocsp_signing(&self) -> bool {
        self.ocsp_signing
    }

    /// Whether `issuer`'s name matches this certificate's issuer field
    pub fn is_issued_by_name(&self, issuer: &Certificate) -> bool {
        self.raw_issuer == issuer.raw_subject
    }

    /// Verify this certificate's signature with `issuer`'s public key
    pub fn verify_issued_by(&self, issuer: &Certificate) -> Result<(), SignatureError> {
        verify_signature(
            issuer.spki(),
            &self.signature_algorithm,
            &self.tbs,
            &self.signature,
        )
    }

    pub fn summary(&self) -> CertificateSummary {
        CertificateSummary {
            common_name: self.common_name.clone(),
            subject: self.subject.clone(),
            issuer: self.issuer.clone(),
            serial_hex: self.serial_hex(),
            not_before: self.not_before,
            not_after: self.not_after,
        }
    }
}

impl fmt::Debug for Certificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Certificate")
            .field("subject", &self.subject)
            .field("issuer", &self.issuer)
            .field("serial", &self.serial_hex())
            .finish_non_exhaustive()
    }
}

impl PartialEq for Certificate {
    fn eq(&self, other: &Self) -> bool {
        self.der == other.der
    }
}

impl Eq for Certificate {}

/// Identifying fields reported with every check result
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CertificateSummary {
    pub common_name: Option<String>,
    pub subject: String,
    pub issuer: String,
    pub serial_hex: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
}

/// Convert ASN1Time to chrono DateTime
fn asn1_time_to_chrono(time: &ASN1Time) -> Result<DateTime<Utc>, CertificateError> {
    Utc.timestamp_opt(time.timestamp(), 0)
        .single()
        .ok_or_else(|| CertificateError::Fields("validity time out of range".to_string()))
}
