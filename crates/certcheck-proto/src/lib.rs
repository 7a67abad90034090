//! Certificate revocation checking primitives
//!
//! This crate holds the byte-level half of a PKCS#12 → OCSP revocation
//! check. It performs no I/O: callers fetch issuer certificates and OCSP
//! responses themselves and feed the bytes back in.
//!
//! # Pipeline
//!
//! ```text
//! PKCS#12 bytes + password
//!        │  pkcs12::decode
//!        ▼
//! Certificate ──aia::extract_aia_urls──▶ caIssuers URL, OCSP URL
//!        │                                   │ (caller fetches)
//!        │          issuer::parse_issuer_body ◀┘
//!        ▼
//! CertId::new ─▶ OcspRequest::encode ─▶ (caller sends) ─▶ OcspResponse::parse
//!                                                            │
//!                       ocsp::validate_response ◀────────────┘
//!                                │
//!                                ▼
//!                  classify::CheckResult (good / revoked / unknown / error)
//! ```
//!
//! # Example
//!
//! ```no_run
//! use certcheck_proto::{aia, pkcs12};
//!
//! # fn example(bytes: &[u8]) -> Result<(), certcheck_proto::CheckError> {
//! let decoded = pkcs12::decode(bytes, "secret")?;
//! let urls = aia::extract_aia_urls(&decoded.certificate);
//! println!("OCSP responder: {:?}", urls.ocsp);
//! # Ok(())
//! # }
//! ```

pub mod aia;
pub mod asn1;
pub mod certificate;
pub mod classify;
pub mod der;
pub mod error;
pub mod issuer;
pub mod ocsp;
pub mod oids;
pub mod pkcs12;
pub mod pkcs7;
pub mod signature;

pub use aia::{extract_aia_urls, AiaUrls};
pub use certificate::{Certificate, CertificateError, CertificateSummary};
pub use classify::{classify, CheckResult, Classification};
pub use error::{CheckError, ErrorKind, MissingAia, UntrustReason};
pub use issuer::{parse_issuer_body, select_issuer, verify_issuer};
pub use ocsp::{
    validate_response, CertId, CertStatus, HashAlgorithm, OcspRequest, OcspResponse,
    RevocationReason, ValidatedStatus, ValidationOptions,
};
pub use pkcs12::DecodedContainer;
