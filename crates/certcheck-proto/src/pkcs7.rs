//! PKCS#7 certs-only bundles
//!
//! caIssuers URLs frequently serve a degenerate SignedData (`.p7c`) carrying
//! the issuer and sometimes its own chain. Only the `certificates` field is
//! read; signer infos are ignored.
//!
//! ```asn1
//! ContentInfo ::= SEQUENCE {
//!     contentType  OBJECT IDENTIFIER (signedData),
//!     content      [0] EXPLICIT SignedData
//! }
//!
//! SignedData ::= SEQUENCE {
//!     version           INTEGER,
//!     digestAlgorithms  SET OF AlgorithmIdentifier,
//!     encapContentInfo  SEQUENCE,
//!     certificates      [0] IMPLICIT SET OF Certificate OPTIONAL,
//!     crls              [1] IMPLICIT SET OF CRL OPTIONAL,
//!     signerInfos       SET OF SignerInfo
//! }
//! ```

use asn1_rs::Tag;

use crate::asn1::{Asn1Error, Element, Rules};
use crate::oids;

/// Whether `der` is a ContentInfo wrapping SignedData
pub fn is_signed_data(der: &[u8]) -> bool {
    let Ok((info, _)) = Element::parse(der, Rules::Ber) else {
        return false;
    };
    info.is_universal(Tag::Sequence)
        && info
            .children()
            .next()
            .and_then(Result::ok)
            .is_some_and(|oid| oid.is_oid(oids::PKCS7_SIGNED_DATA))
}

/// Encodings of every certificate in a SignedData bundle, in order
pub fn certificates(der: &[u8]) -> Result<Vec<&[u8]>, Asn1Error> {
    let info = Element::parse_single(der, Rules::Ber, "PKCS#7 bundle")?
        .expect(Tag::Sequence, "content info")?;
    let mut info = info.children();

    if !info.required("content type")?.is_oid(oids::PKCS7_SIGNED_DATA) {
        return Err(Asn1Error::Invalid("PKCS#7 content type"));
    }
    let content = info.required("content")?;
    if !content.is_context(0) {
        return Err(Asn1Error::UnexpectedTag("signed data"));
    }
    let signed_data = content
        .explicit_inner("signed data")?
        .expect(Tag::Sequence, "signed data")?;
    let mut fields = signed_data.children();

    fields.expect(Tag::Integer, "version")?;
    fields.expect(Tag::Set, "digest algorithms")?;
    fields.expect(Tag::Sequence, "encapsulated content")?;

    let mut found = Vec::new();
    if let Some(certs) = fields.optional_context(0)? {
        for cert in certs.children() {
            let cert = cert?;
            // Attribute and other certificate choices use context tags
            if cert.is_universal(Tag::Sequence) {
                found.push(cert.raw());
            }
        }
    }

    Ok(found)
}
