//! OCSP request encoding and response validation against OpenSSL output
//!
//! Requests in `tests/pki/ocsp/*.req.der` were written by `openssl ocsp
//! -reqout`; responses by `openssl ocsp -index ... -respout`.

use std::path::PathBuf;

use certcheck_proto::ocsp::{
    validate_response, CertId, CertStatus, HashAlgorithm, OcspRequest, OcspResponse,
    ResponderId, ResponderKind, ResponseStatus, RevocationReason, ValidationOptions,
};
use certcheck_proto::{Certificate, CheckError, ErrorKind, UntrustReason};
use chrono::{Duration, TimeZone, Utc};

fn fixture(path: &str) -> Vec<u8> {
    let full = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/pki").join(path);
    std::fs::read(&full).unwrap_or_else(|e| panic!("read {}: {}", full.display(), e))
}

fn cert(name: &str) -> Certificate {
    Certificate::from_der(&fixture(&format!("certs/{}.der", name))).expect("fixture certificate")
}

fn response(name: &str) -> OcspResponse {
    OcspResponse::parse(&fixture(&format!("ocsp/{}", name))).expect("fixture response")
}

fn now() -> ValidationOptions {
    ValidationOptions::at(Utc::now())
}

fn validate(name: &str, subject: &str) -> Result<ResponderKind, CheckError> {
    validate_response(&response(name), &cert(subject), &cert("ca"), &now()).map(|v| v.responder)
}

#[test]
fn test_request_matches_openssl_sha1() {
    let cert_id = CertId::new(&cert("alice"), &cert("ca"), HashAlgorithm::Sha1);
    let encoded = OcspRequest::new(cert_id).encode();
    assert_eq!(encoded, fixture("ocsp/alice.req.der"));
}

#[test]
fn test_request_matches_openssl_sha256() {
    let cert_id = CertId::new(&cert("alice"), &cert("ca"), HashAlgorithm::Sha256);
    let encoded = OcspRequest::new(cert_id).encode();
    assert_eq!(encoded, fixture("ocsp/alice-sha256.req.der"));
}

#[test]
fn test_request_for_every_subject() {
    let ca = cert("ca");
    for name in ["mallory", "ghost", "bundle"] {
        let cert_id = CertId::new(&cert(name), &ca, HashAlgorithm::Sha1);
        assert_eq!(
            OcspRequest::new(cert_id).encode(),
            fixture(&format!("ocsp/{}.req.der", name)),
            "{}",
            name
        );
    }
}

#[test]
fn test_openssl_request_parses_back() {
    let parsed = OcspRequest::parse(&fixture("ocsp/alice.req.der")).expect("parse");
    assert_eq!(parsed.cert_id.serial_hex(), "C0FFEE01");
    assert_eq!(parsed.cert_id.hash_algorithm, HashAlgorithm::Sha1);
    assert!(parsed.nonce.is_none());
}

#[test]
fn test_parse_good_response() {
    let parsed = response("good.der");
    assert_eq!(parsed.status, ResponseStatus::Successful);

    let basic = parsed.basic.expect("basic response");
    assert_eq!(basic.responses.len(), 1);
    assert_eq!(basic.responses[0].status, CertStatus::Good);
    assert_eq!(basic.responses[0].cert_id.serial_hex(), "C0FFEE01");
    assert!(basic.responses[0].next_update.is_some());
    assert!(matches!(basic.responder_id, ResponderId::ByName(ref name) if name == cert("ca").raw_subject()));
    assert_eq!(basic.embedded_certificates(), vec![cert("ca")]);
}

#[test]
fn test_good_response_validates() {
    let validated =
        validate_response(&response("good.der"), &cert("alice"), &cert("ca"), &now()).expect("valid");
    assert_eq!(validated.status, CertStatus::Good);
    assert_eq!(validated.responder, ResponderKind::Issuer);
    assert!(validated.next_update.is_some());
}

#[test]
fn test_sha256_cert_id_validates() {
    let validated = validate_response(
        &response("good-sha256.der"),
        &cert("alice"),
        &cert("ca"),
        &now(),
    )
    .expect("valid");
    assert_eq!(validated.status, CertStatus::Good);
}

#[test]
fn test_revoked_response() {
    let validated = validate_response(&response("revoked.der"), &cert("mallory"), &cert("ca"), &now())
        .expect("valid");
    assert_eq!(
        validated.status,
        CertStatus::Revoked {
            revocation_time: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            reason: Some(RevocationReason::KeyCompromise),
        }
    );
}

#[test]
fn test_unknown_response() {
    let validated = validate_response(&response("unknown.der"), &cert("ghost"), &cert("ca"), &now())
        .expect("valid");
    assert_eq!(validated.status, CertStatus::Unknown);
}

#[test]
fn test_delegated_responder_by_key() {
    let parsed = response("delegated.der");
    let basic = parsed.basic.as_ref().expect("basic");
    assert_eq!(
        basic.responder_id,
        ResponderId::ByKey(cert("responder").key_hash().to_vec())
    );

    let responder = validate("delegated.der", "alice").expect("delegated responder accepted");
    assert!(matches!(responder, ResponderKind::Delegated(ref subject) if subject.contains("Certcheck OCSP Responder")));
}

#[test]
fn test_missing_next_update_is_accepted() {
    let validated = validate_response(
        &response("no-next-update.der"),
        &cert("alice"),
        &cert("ca"),
        &now(),
    )
    .expect("valid");
    assert_eq!(validated.next_update, None);
    assert_eq!(validated.status, CertStatus::Good);
}

#[test]
fn test_stale_response() {
    let parsed = response("stale.der");
    let single = &parsed.basic.as_ref().expect("basic").responses[0];
    let next_update = single.next_update.expect("nextUpdate");

    let late = ValidationOptions::at(next_update + Duration::hours(1));
    let err = validate_response(&parsed, &cert("alice"), &cert("ca"), &late).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StaleResponse);

    // Skew large enough to cover the gap
    let tolerant = late.clone().with_clock_skew(Duration::hours(2));
    assert!(validate_response(&parsed, &cert("alice"), &cert("ca"), &tolerant).is_ok());

    let within = ValidationOptions::at(single.this_update + Duration::seconds(30));
    assert!(validate_response(&parsed, &cert("alice"), &cert("ca"), &within).is_ok());
}

#[test]
fn test_response_from_the_future() {
    let parsed = response("good.der");
    let this_update = parsed.basic.as_ref().expect("basic").responses[0].this_update;

    let early = ValidationOptions::at(this_update - Duration::hours(1));
    let err = validate_response(&parsed, &cert("alice"), &cert("ca"), &early).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StaleResponse);
}

#[test]
fn test_rogue_signer_with_issuer_name() {
    assert_eq!(
        validate("rogue.der", "alice").unwrap_err(),
        CheckError::UntrustedResponse(UntrustReason::ResponseSignatureInvalid)
    );
}

#[test]
fn test_delegate_not_signed_by_issuer() {
    assert_eq!(
        validate("rogue-delegated.der", "alice").unwrap_err(),
        CheckError::UntrustedResponse(UntrustReason::ResponderNotAuthorized)
    );
}

#[test]
fn test_delegate_without_ocsp_signing() {
    assert_eq!(
        validate("no-eku.der", "alice").unwrap_err(),
        CheckError::UntrustedResponse(UntrustReason::ResponderNotAuthorized)
    );
}

#[test]
fn test_expired_delegate() {
    let parsed = response("delegated.der");
    let responder = cert("responder");
    let after_expiry = ValidationOptions::at(responder.not_after() + Duration::days(1));
    assert_eq!(
        validate_response(&parsed, &cert("alice"), &cert("ca"), &after_expiry).unwrap_err(),
        CheckError::UntrustedResponse(UntrustReason::ResponderCertificateExpired)
    );
}

#[test]
fn test_response_for_another_certificate() {
    let err = validate("good.der", "mallory").unwrap_err();
    assert_eq!(
        err,
        CheckError::CertificateMismatch {
            serial: "1002".to_string()
        }
    );
}

#[test]
fn test_response_checked_against_wrong_issuer() {
    let err = validate_response(&response("good.der"), &cert("alice"), &cert("rogue"), &now())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CertificateMismatch);
}

#[test]
fn test_error_statuses() {
    assert_eq!(
        validate("unauthorized.der", "alice").unwrap_err(),
        CheckError::UntrustedResponse(UntrustReason::Unauthorized)
    );
    assert_eq!(
        validate("try-later.der", "alice").unwrap_err(),
        CheckError::UntrustedResponse(UntrustReason::TryLater)
    );
}

#[test]
fn test_garbage_is_malformed() {
    let err = OcspResponse::parse(&fixture("ocsp/garbage.der")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::OcspMalformedResponse);
}

#[test]
fn test_truncated_response_is_malformed() {
    let bytes = fixture("ocsp/good.der");
    for len in [1, bytes.len() / 2, bytes.len() - 1] {
        let err = OcspResponse::parse(&bytes[..len]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OcspMalformedResponse, "len {}", len);
    }
}

#[test]
fn test_tampered_signature_is_rejected() {
    let mut bytes = fixture("ocsp/good.der");
    let parsed = OcspResponse::parse(&bytes).expect("parse");
    let signature = parsed.basic.expect("basic").signature;

    let position = bytes
        .windows(signature.len())
        .position(|window| window == signature.as_slice())
        .expect("signature bytes present");
    bytes[position + signature.len() / 2] ^= 0x01;

    let tampered = OcspResponse::parse(&bytes).expect("still well formed");
    assert_eq!(
        validate_response(&tampered, &cert("alice"), &cert("ca"), &now()).unwrap_err(),
        CheckError::UntrustedResponse(UntrustReason::ResponseSignatureInvalid)
    );
}

#[test]
fn test_fleet_responses_validate() {
    let ca = cert("ca");
    for (serial, expect_good) in [("2000", true), ("2001", false), ("2063", false)] {
        let parsed = OcspResponse::parse(&fixture(&format!("fleet/{}.ocsp", serial))).expect("parse");
        let basic = parsed.basic.as_ref().expect("basic");
        assert!(basic.certs.is_empty(), "fleet responses carry no certificates");
        assert_eq!(basic.responses[0].cert_id.serial_hex(), serial);

        let status = &basic.responses[0].status;
        if expect_good {
            assert_eq!(status, &CertStatus::Good);
        } else {
            assert!(matches!(
                status,
                CertStatus::Revoked {
                    reason: Some(RevocationReason::Superseded),
                    ..
                }
            ));
        }
        // Signed by the CA itself
        assert!(matches!(basic.responder_id, ResponderId::ByName(ref n) if n == ca.raw_subject()));
    }
}
