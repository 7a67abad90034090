//! Issuer certificate decoding and selection
//!
//! A caIssuers endpoint may answer with a DER certificate, a PEM file holding
//! one or more certificates, or a PKCS#7 certs-only bundle. When more than one
//! certificate arrives, the one that actually issued the subject is chosen.

use tracing::debug;
use x509_parser::pem::parse_x509_pem;

use crate::certificate::Certificate;
use crate::error::{CheckError, UntrustReason};
use crate::pkcs7;

const PEM_MARKER: &[u8] = b"-----BEGIN";

/// Decode every certificate in an issuer response body
pub fn parse_issuer_body(body: &[u8]) -> Result<Vec<Certificate>, CheckError> {
    let unusable = |msg: String| CheckError::IssuerUnreachable(msg);

    let ders: Vec<Vec<u8>> = if contains(body, PEM_MARKER) {
        pem_blocks(body)?
    } else {
        vec![body.to_vec()]
    };

    let mut certificates = Vec::new();
    for der in ders {
        if pkcs7::is_signed_data(&der) {
            let bundled = pkcs7::certificates(&der)
                .map_err(|e| unusable(format!("invalid PKCS#7 bundle: {}", e)))?;
            for cert in bundled {
                certificates.push(
                    Certificate::from_der(cert)
                        .map_err(|e| unusable(format!("invalid bundled certificate: {}", e)))?,
                );
            }
        } else {
            certificates.push(
                Certificate::from_der(&der)
                    .map_err(|e| unusable(format!("response is not a certificate: {}", e)))?,
            );
        }
    }

    if certificates.is_empty() {
        return Err(unusable("response carried no certificates".to_string()));
    }
    Ok(certificates)
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|window| window == needle)
}

fn pem_blocks(body: &[u8]) -> Result<Vec<Vec<u8>>, CheckError> {
    let mut blocks = Vec::new();
    let mut rest = body;
    while contains(rest, PEM_MARKER) {
        let (remaining, pem) = parse_x509_pem(rest).map_err(|e| {
            CheckError::IssuerUnreachable(format!("invalid PEM in issuer response: {}", e))
        })?;
        match pem.label.as_str() {
            "CERTIFICATE" | "X509 CERTIFICATE" | "PKCS7" | "CERTIFICATE CHAIN" => {
                blocks.push(pem.contents)
            }
            other => debug!(label = other, "ignoring PEM block in issuer response"),
        }
        if remaining.len() == rest.len() {
            break;
        }
        rest = remaining;
    }
    Ok(blocks)
}

/// Pick the certificate that issued `subject` out of `candidates`
///
/// A candidate must carry the subject's issuer name and verify the subject's
/// signature. Falls back to the first name match when none verifies; the
/// caller's [`verify_issuer`] then reports the failure.
pub fn select_issuer<'a>(
    subject: &Certificate,
    candidates: &'a [Certificate],
) -> Option<&'a Certificate> {
    let mut by_name = candidates
        .iter()
        .filter(|candidate| subject.is_issued_by_name(candidate))
        .peekable();
    let first = by_name.peek().copied();
    by_name
        .find(|candidate| subject.verify_issued_by(candidate).is_ok())
        .or(first)
}

/// Confirm that `issuer` signed `subject`
pub fn verify_issuer(subject: &Certificate, issuer: &Certificate) -> Result<(), CheckError> {
    if !subject.is_issued_by_name(issuer) {
        debug!(
            subject_issuer = %subject.issuer(),
            issuer_subject = %issuer.subject(),
            "issuer name mismatch"
        );
        return Err(CheckError::UntrustedResponse(
            UntrustReason::IssuerSignatureInvalid,
        ));
    }
    subject.verify_issued_by(issuer).map_err(|e| {
        debug!(error = %e, "issuer signature check failed");
        CheckError::UntrustedResponse(UntrustReason::IssuerSignatureInvalid)
    })
}
