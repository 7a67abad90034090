//! OCSP response validation
//!
//! A response is accepted only when, in this order:
//!
//! 1. its `responseStatus` is `successful`
//! 2. it carries a SingleResponse whose CertID matches the subject
//! 3. it is signed by the issuer, or by a delegated responder certificate
//!    that the issuer signed, that carries id-kp-OCSPSigning and that is
//!    within its validity period
//! 4. `thisUpdate` is not in the future and `nextUpdate`, when present, is not
//!    in the past (both allowing the configured clock skew)
//! 5. a nonce echoed by the responder equals the one sent

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use super::request::{CertId, HashAlgorithm};
use super::response::{BasicResponse, CertStatus, OcspResponse, ResponderId, ResponseStatus};
use crate::certificate::Certificate;
use crate::error::{CheckError, UntrustReason};
use crate::signature::{verify_signature, SignatureError};

/// Inputs that are not part of the response itself
#[derive(Debug, Clone)]
pub struct ValidationOptions {
    pub now: DateTime<Utc>,
    /// Tolerance applied to both freshness bounds
    pub clock_skew: Duration,
    /// Nonce sent with the request, if any
    pub expected_nonce: Option<Vec<u8>>,
}

impl ValidationOptions {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            now,
            clock_skew: Duration::zero(),
            expected_nonce: None,
        }
    }

    pub fn with_clock_skew(mut self, skew: Duration) -> Self {
        self.clock_skew = skew;
        self
    }

    pub fn with_nonce(mut self, nonce: Option<Vec<u8>>) -> Self {
        self.expected_nonce = nonce;
        self
    }
}

/// Who signed an accepted response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponderKind {
    Issuer,
    /// Delegated responder, identified by its subject
    Delegated(String),
}

/// A status that survived every validation step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedStatus {
    pub status: CertStatus,
    pub this_update: DateTime<Utc>,
    pub next_update: Option<DateTime<Utc>>,
    pub produced_at: DateTime<Utc>,
    pub responder: ResponderKind,
}

/// Validate `response` for `subject` issued by `issuer`
pub fn validate_response(
    response: &OcspResponse,
    subject: &Certificate,
    issuer: &Certificate,
    options: &ValidationOptions,
) -> Result<ValidatedStatus, CheckError> {
    let basic = match (response.status, &response.basic) {
        (ResponseStatus::Successful, Some(basic)) => basic,
        (ResponseStatus::Successful, None) => {
            return Err(CheckError::OcspMalformedResponse(
                "missing response body".to_string(),
            ))
        }
        (status, _) => return Err(CheckError::UntrustedResponse(untrust_reason(status))),
    };

    let single = find_matching(basic, subject, issuer)?;

    let responder = verify_responder(basic, issuer, options.now)?;

    let this_update = single.this_update;
    if this_update > options.now + options.clock_skew {
        return Err(CheckError::StaleResponse(format!(
            "thisUpdate {} is in the future",
            this_update.to_rfc3339()
        )));
    }
    if let Some(next_update) = single.next_update {
        if next_update < options.now - options.clock_skew {
            return Err(CheckError::StaleResponse(format!(
                "nextUpdate {} has passed",
                next_update.to_rfc3339()
            )));
        }
    }

    if let (Some(sent), Some(echoed)) = (&options.expected_nonce, &basic.nonce) {
        if sent != echoed {
            return Err(CheckError::UntrustedResponse(UntrustReason::NonceMismatch));
        }
    }

    Ok(ValidatedStatus {
        status: single.status.clone(),
        this_update,
        next_update: single.next_update,
        produced_at: basic.produced_at,
        responder,
    })
}

fn untrust_reason(status: ResponseStatus) -> UntrustReason {
    match status {
        ResponseStatus::MalformedRequest => UntrustReason::MalformedRequest,
        ResponseStatus::InternalError => UntrustReason::InternalError,
        ResponseStatus::TryLater => UntrustReason::TryLater,
        ResponseStatus::SigRequired => UntrustReason::SigRequired,
        ResponseStatus::Unauthorized | ResponseStatus::Successful => UntrustReason::Unauthorized,
    }
}

/// Find the SingleResponse for `subject`, recomputing the CertID hashes with
/// whatever digest the responder used
fn find_matching<'a>(
    basic: &'a BasicResponse,
    subject: &Certificate,
    issuer: &Certificate,
) -> Result<&'a super::response::SingleResponse, CheckError> {
    for single in &basic.responses {
        let ours = CertId::new(subject, issuer, single.cert_id.hash_algorithm);
        if same_certificate(&ours, &single.cert_id) {
            return Ok(single);
        }
    }

    let ours = CertId::new(subject, issuer, HashAlgorithm::Sha1);
    Err(CheckError::CertificateMismatch {
        serial: ours.serial_hex(),
    })
}

fn same_certificate(ours: &CertId, theirs: &CertId) -> bool {
    ours.issuer_name_hash == theirs.issuer_name_hash
        && ours.issuer_key_hash == theirs.issuer_key_hash
        && strip_sign_octet(&ours.serial) == strip_sign_octet(&theirs.serial)
}

fn strip_sign_octet(serial: &[u8]) -> &[u8] {
    match serial {
        [0, rest @ ..] if !rest.is_empty() => rest,
        _ => serial,
    }
}

fn identifies(responder_id: &ResponderId, cert: &Certificate) -> bool {
    match responder_id {
        ResponderId::ByName(name) => name.as_slice() == cert.raw_subject(),
        ResponderId::ByKey(hash) => hash.as_slice() == cert.key_hash(),
    }
}

fn signature_error(err: SignatureError) -> CheckError {
    match err {
        SignatureError::UnsupportedAlgorithm => {
            CheckError::UntrustedResponse(UntrustReason::UnsupportedSignatureAlgorithm)
        }
        SignatureError::MalformedKey | SignatureError::Invalid => {
            CheckError::UntrustedResponse(UntrustReason::ResponseSignatureInvalid)
        }
    }
}

/// Identify the signer and verify the response signature
fn verify_responder(
    basic: &BasicResponse,
    issuer: &Certificate,
    now: DateTime<Utc>,
) -> Result<ResponderKind, CheckError> {
    let verify_with = |signer: &Certificate| {
        verify_signature(
            signer.spki(),
            &basic.signature_algorithm,
            &basic.tbs_response_data,
            &basic.signature,
        )
        .map_err(signature_error)
    };

    if identifies(&basic.responder_id, issuer) {
        verify_with(issuer)?;
        return Ok(ResponderKind::Issuer);
    }

    let delegate = basic
        .embedded_certificates()
        .into_iter()
        .find(|cert| identifies(&basic.responder_id, cert))
        .ok_or(CheckError::UntrustedResponse(UntrustReason::UnknownResponder))?;

    if !delegate.is_issued_by_name(issuer) || delegate.verify_issued_by(issuer).is_err() {
        debug!(responder = %delegate.subject(), "responder certificate not signed by issuer");
        return Err(CheckError::UntrustedResponse(
            UntrustReason::ResponderNotAuthorized,
        ));
    }
    if !delegate.has_ocsp_signing() {
        debug!(responder = %delegate.subject(), "responder certificate lacks OCSPSigning");
        return Err(CheckError::UntrustedResponse(
            UntrustReason::ResponderNotAuthorized,
        ));
    }
    if !delegate.is_valid_at(now) {
        return Err(CheckError::UntrustedResponse(
            UntrustReason::ResponderCertificateExpired,
        ));
    }

    verify_with(&delegate)?;
    Ok(ResponderKind::Delegated(delegate.subject().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_sign_octet() {
        assert_eq!(strip_sign_octet(&[0x00, 0xC0]), &[0xC0]);
        assert_eq!(strip_sign_octet(&[0x00]), &[0x00]);
        assert_eq!(strip_sign_octet(&[0x10, 0x02]), &[0x10, 0x02]);
    }

    #[test]
    fn test_untrust_reasons_follow_status() {
        assert_eq!(untrust_reason(ResponseStatus::TryLater), UntrustReason::TryLater);
        assert_eq!(untrust_reason(ResponseStatus::Unauthorized), UntrustReason::Unauthorized);
        assert_eq!(untrust_reason(ResponseStatus::SigRequired), UntrustReason::SigRequired);
    }
}
