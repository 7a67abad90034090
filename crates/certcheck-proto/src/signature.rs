//! Signature verification over raw signed spans
//!
//! Each supported combination of public-key algorithm and signature algorithm
//! maps onto one *ring* verification algorithm.

use asn1_rs::Tag;
use ring::signature;
use x509_parser::prelude::{FromDer, SubjectPublicKeyInfo};
use x509_parser::x509::AlgorithmIdentifier;

use crate::oids;

/// Signature verification failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("unsupported signature algorithm")]
    UnsupportedAlgorithm,

    #[error("malformed public key")]
    MalformedKey,

    #[error("invalid signature")]
    Invalid,
}

/// Named curve OID contents for EC keys
fn curve<'a>(key_algorithm: &AlgorithmIdentifier<'a>) -> Option<&'a [u8]> {
    let params = key_algorithm.parameters.as_ref()?;
    if params.tag() != Tag::Oid {
        return None;
    }
    Some(params.data)
}

fn select_algorithm(
    key_algorithm: &AlgorithmIdentifier<'_>,
    signature_algorithm: &[u8],
) -> Option<&'static dyn signature::VerificationAlgorithm> {
    let key_oid = key_algorithm.algorithm.as_bytes();

    if key_oid == oids::RSA_ENCRYPTION {
        return match signature_algorithm {
            s if s == oids::SHA256_WITH_RSA => Some(&signature::RSA_PKCS1_2048_8192_SHA256),
            s if s == oids::SHA384_WITH_RSA => Some(&signature::RSA_PKCS1_2048_8192_SHA384),
            s if s == oids::SHA512_WITH_RSA => Some(&signature::RSA_PKCS1_2048_8192_SHA512),
            s if s == oids::SHA1_WITH_RSA => {
                Some(&signature::RSA_PKCS1_2048_8192_SHA1_FOR_LEGACY_USE_ONLY)
            }
            _ => None,
        };
    }

    if key_oid == oids::EC_PUBLIC_KEY {
        let curve = curve(key_algorithm)?;
        return match (curve, signature_algorithm) {
            (c, s) if c == oids::SECP256R1 && s == oids::ECDSA_WITH_SHA256 => {
                Some(&signature::ECDSA_P256_SHA256_ASN1)
            }
            (c, s) if c == oids::SECP256R1 && s == oids::ECDSA_WITH_SHA384 => {
                Some(&signature::ECDSA_P256_SHA384_ASN1)
            }
            (c, s) if c == oids::SECP384R1 && s == oids::ECDSA_WITH_SHA256 => {
                Some(&signature::ECDSA_P384_SHA256_ASN1)
            }
            (c, s) if c == oids::SECP384R1 && s == oids::ECDSA_WITH_SHA384 => {
                Some(&signature::ECDSA_P384_SHA384_ASN1)
            }
            _ => None,
        };
    }

    if key_oid == oids::ED25519 && signature_algorithm == oids::ED25519 {
        return Some(&signature::ED25519);
    }

    None
}

/// Verify `signature` over `message` with the key in `spki_der`
///
/// # Arguments
/// * `spki_der` - Signer's SubjectPublicKeyInfo, DER-encoded
/// * `signature_algorithm` - Signature AlgorithmIdentifier OID contents
/// * `message` - The exact signed bytes
/// * `signature` - Signature BIT STRING contents
pub fn verify_signature(
    spki_der: &[u8],
    signature_algorithm: &[u8],
    message: &[u8],
    signature: &[u8],
) -> Result<(), SignatureError> {
    let spki = match SubjectPublicKeyInfo::from_der(spki_der) {
        Ok((rest, spki)) if rest.is_empty() => spki,
        _ => return Err(SignatureError::MalformedKey),
    };
    let algorithm = select_algorithm(&spki.algorithm, signature_algorithm)
        .ok_or(SignatureError::UnsupportedAlgorithm)?;

    signature::UnparsedPublicKey::new(algorithm, &spki.subject_public_key.data)
        .verify(message, signature)
        .map_err(|_| SignatureError::Invalid)
}
