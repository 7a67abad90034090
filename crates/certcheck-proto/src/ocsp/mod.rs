//! OCSP (Online Certificate Status Protocol) Support - RFC 6960
//!
//! This module implements OCSP request building, response parsing, and
//! response validation for a single end-entity certificate.
//!
//! ## Request/Response Flow:
//!
//! 1. **Build Request**: [`CertId::new`] hashes the issuer's name and key, then
//!    [`OcspRequest::encode`] produces the DER request
//! 2. **Transport**: the caller POSTs (or GETs) the request to the responder
//! 3. **Parse Response**: [`OcspResponse::parse`] decodes the DER response,
//!    keeping `tbsResponseData` byte-exact for signature checking
//! 4. **Validate**: [`validate_response`] checks status, CertID, signature,
//!    responder authorization, freshness and nonce
//!
//! ## ASN.1 Structures (RFC 6960):
//!
//! ```asn1
//! OCSPResponse ::= SEQUENCE {
//!     responseStatus      OCSPResponseStatus,
//!     responseBytes       [0] EXPLICIT ResponseBytes OPTIONAL
//! }
//!
//! BasicOCSPResponse ::= SEQUENCE {
//!     tbsResponseData     ResponseData,
//!     signatureAlgorithm  AlgorithmIdentifier,
//!     signature           BIT STRING,
//!     certs               [0] EXPLICIT SEQUENCE OF Certificate OPTIONAL
//! }
//!
//! SingleResponse ::= SEQUENCE {
//!     certID              CertID,
//!     certStatus          CertStatus,
//!     thisUpdate          GeneralizedTime,
//!     nextUpdate          [0] EXPLICIT GeneralizedTime OPTIONAL,
//!     singleExtensions    [1] EXPLICIT Extensions OPTIONAL
//! }
//! ```

mod request;
mod response;
mod validate;

pub use request::{CertId, HashAlgorithm, OcspRequest, NONCE_LEN};
pub use response::{
    BasicResponse, CertStatus, OcspResponse, ResponderId, ResponseStatus, RevocationReason,
    SingleResponse,
};
pub use validate::{validate_response, ResponderKind, ValidatedStatus, ValidationOptions};

use asn1_rs::Tag;

use crate::asn1::{Asn1Error, Element};
use crate::oids;

/// Find the nonce in an `[n] EXPLICIT Extensions`
///
/// The extnValue normally wraps the nonce in its own OCTET STRING; responders
/// that put the bare value there are accepted too.
pub(crate) fn find_nonce(extensions: &Element<'_>) -> Result<Option<Vec<u8>>, Asn1Error> {
    let list = extensions
        .explicit_inner("extensions")?
        .expect(Tag::Sequence, "extensions")?;

    for extension in list.children() {
        let mut fields = extension?.expect(Tag::Sequence, "extension")?.children();
        let id = fields.required("extension id")?.oid()?;
        fields.optional(|e| e.is_universal(Tag::Boolean))?;
        let value = fields.expect(Tag::OctetString, "extension value")?.octets()?;
        fields.finish("extension")?;

        if id.as_bytes() == oids::OCSP_NONCE {
            let nonce = match der_parser::parse_der(&value) {
                Ok((rest, inner)) if rest.is_empty() && inner.tag() == Tag::OctetString => inner
                    .as_slice()
                    .map(<[u8]>::to_vec)
                    .unwrap_or_else(|_| value.to_vec()),
                _ => value.to_vec(),
            };
            return Ok(Some(nonce));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asn1::Rules;
    use crate::der::{self, tag};

    fn extensions(value: &[u8]) -> Vec<u8> {
        let extension = der::sequence(&[&der::oid(oids::OCSP_NONCE), &der::octet_string(value)]);
        der::explicit(2, &der::sequence(&[&extension]))
    }

    fn nonce(encoded: &[u8]) -> Option<Vec<u8>> {
        let element = Element::parse_single(encoded, Rules::Der, "extensions").unwrap();
        find_nonce(&element).unwrap()
    }

    #[test]
    fn test_wrapped_nonce() {
        let encoded = extensions(&der::octet_string(&[0xAA; 16]));
        assert_eq!(nonce(&encoded), Some(vec![0xAA; 16]));
    }

    #[test]
    fn test_bare_nonce() {
        let encoded = extensions(&[0x01, 0x02, 0x03]);
        assert_eq!(nonce(&encoded), Some(vec![0x01, 0x02, 0x03]));
    }

    #[test]
    fn test_other_extensions_are_skipped() {
        let other = der::sequence(&[
            &der::oid(&[0x55, 0x1D, 0x13]),
            &der::tlv(tag::BOOLEAN, &[0xFF]),
            &der::octet_string(&der::sequence(&[])),
        ]);
        let encoded = der::explicit(2, &der::sequence(&[&other]));
        assert_eq!(nonce(&encoded), None);
    }
}
