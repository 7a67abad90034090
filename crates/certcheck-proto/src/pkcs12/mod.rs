//! PKCS#12 container decoding (RFC 7292)
//!
//! Opens a password-protected PFX and extracts the end-entity certificate
//! together with any other certificates bundled alongside it. Private keys are
//! never returned; key bags are inspected for their `localKeyId` so the
//! certificate belonging to the key can be picked out. A container without
//! MacData has its shrouded key bags decrypted and discarded, which is then
//! the only check of the password.
//!
//! ```asn1
//! PFX ::= SEQUENCE {
//!     version     INTEGER {v3(3)},
//!     authSafe    ContentInfo,
//!     macData     MacData OPTIONAL
//! }
//!
//! MacData ::= SEQUENCE {
//!     mac         DigestInfo,
//!     macSalt     OCTET STRING,
//!     iterations  INTEGER DEFAULT 1
//! }
//!
//! AuthenticatedSafe ::= SEQUENCE OF ContentInfo
//! SafeContents ::= SEQUENCE OF SafeBag
//!
//! SafeBag ::= SEQUENCE {
//!     bagId          OBJECT IDENTIFIER,
//!     bagValue       [0] EXPLICIT ANY,
//!     bagAttributes  SET OF PKCS12Attribute OPTIONAL
//! }
//! ```
//!
//! Containers are read under BER: Windows and macOS exporters write
//! indefinite lengths and segmented OCTET STRINGs.
//!
//! # Failure reporting
//!
//! Every failure, whether a structural problem, an unsupported algorithm or a
//! wrong password, surfaces as [`CheckError::InvalidContainer`]. When the
//! structure is rejected before any key derivation has run, an equivalent
//! derivation is still performed so that rejection time does not reveal
//! which case occurred.

mod cipher;
pub mod kdf;

use std::borrow::Cow;

use asn1_rs::Tag;
use tracing::debug;
use zeroize::Zeroizing;

use crate::asn1::{AlgorithmIdentifier, Asn1Error, Element, Rules};
use crate::certificate::Certificate;
use crate::error::CheckError;
use crate::oids;
use kdf::{KeyPurpose, MacDigest};

pub use cipher::MAX_ITERATIONS;

/// Containers larger than this are rejected unless a limit is given
pub const DEFAULT_MAX_CONTAINER_SIZE: usize = 1024 * 1024;

/// SafeContents may nest through safeContentsBag up to this depth
const MAX_NESTING: usize = 4;

/// Internal decoding failure, never exposed past [`decode`]
#[derive(Debug, thiserror::Error)]
pub(crate) enum ContainerError {
    #[error("structure: {0}")]
    Asn1(#[from] Asn1Error),

    #[error("unsupported PFX version {0}")]
    UnsupportedVersion(u64),

    #[error("unsupported content type")]
    UnsupportedContentType,

    #[error("unsupported algorithm")]
    UnsupportedAlgorithm,

    #[error("unsupported algorithm parameters")]
    UnsupportedParameters,

    #[error("MAC verification failed")]
    MacMismatch,

    #[error("decryption failed")]
    Decrypt,

    #[error("no certificate bag")]
    NoCertificate,

    #[error("certificate bag does not hold a valid certificate")]
    BadCertificate,

    #[error("container exceeds {0} bytes")]
    TooLarge(usize),
}

/// One way of turning the caller's password into key material
pub(crate) struct Password {
    /// Raw UTF-8 octets, used by PBES2
    utf8: Zeroizing<Vec<u8>>,
    /// BMPString with two-byte terminator, used by the PKCS#12 KDF
    bmp: Zeroizing<Vec<u8>>,
}

impl Password {
    /// Candidate encodings. An empty password is tried both as the encoded
    /// empty string and as absent.
    fn candidates(password: &str) -> Vec<Password> {
        let utf8 = Zeroizing::new(password.as_bytes().to_vec());
        let mut bmp = Zeroizing::new(Vec::with_capacity(password.len() * 2 + 2));
        for unit in password.encode_utf16() {
            bmp.extend_from_slice(&unit.to_be_bytes());
        }
        bmp.extend_from_slice(&[0, 0]);

        if password.is_empty() {
            vec![
                Password {
                    utf8: utf8.clone(),
                    bmp,
                },
                Password {
                    utf8,
                    bmp: Zeroizing::new(Vec::new()),
                },
            ]
        } else {
            vec![Password { utf8, bmp }]
        }
    }

    pub(crate) fn utf8(&self) -> &[u8] {
        &self.utf8
    }

    pub(crate) fn bmp(&self) -> &[u8] {
        &self.bmp
    }
}

/// Certificates recovered from a container
#[derive(Debug, Clone)]
pub struct DecodedContainer {
    /// The end-entity certificate
    pub certificate: Certificate,
    /// Every other certificate found, in container order
    pub bundled: Vec<Certificate>,
}

impl DecodedContainer {
    /// DER of the end-entity certificate
    pub fn der(&self) -> &[u8] {
        self.certificate.der()
    }
}

/// Decode a PKCS#12 container with the default size limit
pub fn decode(bytes: &[u8], password: &str) -> Result<DecodedContainer, CheckError> {
    decode_with_limit(bytes, password, DEFAULT_MAX_CONTAINER_SIZE)
}

/// Decode a PKCS#12 container, rejecting inputs over `max_size` bytes
///
/// # Arguments
/// * `bytes` - The raw container
/// * `password` - Container password, possibly empty
/// * `max_size` - Upper bound on `bytes.len()`
///
/// # Returns
/// The end-entity certificate and any bundled certificates, or
/// [`CheckError::InvalidContainer`] for every kind of failure
pub fn decode_with_limit(
    bytes: &[u8],
    password: &str,
    max_size: usize,
) -> Result<DecodedContainer, CheckError> {
    decode_container(bytes, password, max_size).map_err(|_| {
        debug!(size = bytes.len(), "container rejected");
        CheckError::InvalidContainer
    })
}

fn decode_container(
    bytes: &[u8],
    password: &str,
    max_size: usize,
) -> Result<DecodedContainer, ContainerError> {
    let candidates = Password::candidates(password);

    let pfx = match parse_pfx(bytes, max_size) {
        Ok(pfx) => pfx,
        Err(err) => {
            equalize_timing(&candidates[0]);
            return Err(err);
        }
    };

    match &pfx.mac {
        Some(mac) => {
            let password = candidates
                .iter()
                .find(|candidate| mac.verify(candidate, &pfx.auth_safe))
                .ok_or(ContainerError::MacMismatch)?;
            read_auth_safe(&pfx.auth_safe, password, false)
        }
        None => {
            let mut last_err = ContainerError::Decrypt;
            for candidate in &candidates {
                match read_auth_safe(&pfx.auth_safe, candidate, true) {
                    Ok(decoded) => return Ok(decoded),
                    Err(err) => last_err = err,
                }
            }
            Err(last_err)
        }
    }
}

/// Run one MAC key derivation with typical parameters
fn equalize_timing(password: &Password) {
    let _ = kdf::derive(
        MacDigest::Sha256,
        KeyPurpose::Mac,
        password.bmp(),
        &[0u8; 8],
        2048,
        32,
    );
}

struct Pfx<'a> {
    /// Contents of the authSafe data OCTET STRING
    auth_safe: Cow<'a, [u8]>,
    mac: Option<MacData<'a>>,
}

struct MacData<'a> {
    digest: MacDigest,
    expected: Cow<'a, [u8]>,
    salt: Cow<'a, [u8]>,
    iterations: u32,
}

impl MacData<'_> {
    fn verify(&self, password: &Password, data: &[u8]) -> bool {
        let key = kdf::derive(
            self.digest,
            KeyPurpose::Mac,
            password.bmp(),
            &self.salt,
            self.iterations,
            self.digest.output_len(),
        );
        kdf::verify_mac(self.digest, &key, data, &self.expected)
    }
}

fn parse_pfx(bytes: &[u8], max_size: usize) -> Result<Pfx<'_>, ContainerError> {
    if bytes.len() > max_size {
        return Err(ContainerError::TooLarge(max_size));
    }

    let mut pfx = Element::parse_single(bytes, Rules::Ber, "PFX")?
        .expect(Tag::Sequence, "PFX")?
        .children();

    let version = pfx.expect(Tag::Integer, "version")?.uint()?;
    if version != 3 {
        return Err(ContainerError::UnsupportedVersion(version));
    }

    // authSafe must be password-integrity `data`, not public-key `signedData`
    let auth_safe = data_content(pfx.required("authSafe")?)?;

    let mac = match pfx.next().transpose()? {
        None => None,
        Some(mac_data) => Some(parse_mac_data(mac_data)?),
    };
    pfx.finish("PFX")?;

    Ok(Pfx { auth_safe, mac })
}

fn parse_mac_data(mac_data: Element<'_>) -> Result<MacData<'_>, ContainerError> {
    let mut fields = mac_data.expect(Tag::Sequence, "MacData")?.children();

    let mut digest_info = fields.expect(Tag::Sequence, "DigestInfo")?.children();
    let algorithm = AlgorithmIdentifier::from_element(digest_info.required("digest algorithm")?)?;
    let digest =
        MacDigest::from_oid(algorithm.oid.as_bytes()).ok_or(ContainerError::UnsupportedAlgorithm)?;
    let expected = digest_info.expect(Tag::OctetString, "digest")?.octets()?;
    digest_info.finish("DigestInfo")?;

    let salt = fields.expect(Tag::OctetString, "macSalt")?.octets()?;
    let iterations = match fields.next().transpose()? {
        Some(iterations) => iterations.uint()?,
        None => 1,
    };
    fields.finish("MacData")?;
    if iterations == 0 || iterations > MAX_ITERATIONS {
        return Err(ContainerError::UnsupportedParameters);
    }

    Ok(MacData {
        digest,
        expected,
        salt,
        iterations: iterations as u32,
    })
}

/// ContentInfo of type `data`: returns the wrapped OCTET STRING contents
fn data_content(info: Element<'_>) -> Result<Cow<'_, [u8]>, ContainerError> {
    let mut fields = info.expect(Tag::Sequence, "content info")?.children();
    if !fields.required("content type")?.is_oid(oids::PKCS7_DATA) {
        return Err(ContainerError::UnsupportedContentType);
    }
    let content = fields.required("content")?;
    if !content.is_context(0) {
        return Err(Asn1Error::UnexpectedTag("data content").into());
    }
    Ok(content
        .explicit_inner("data content")?
        .expect(Tag::OctetString, "data content")?
        .octets()?)
}

#[derive(Default)]
struct BagCollector {
    certificates: Vec<(Vec<u8>, Option<Vec<u8>>)>,
    key_ids: Vec<Vec<u8>>,
}

fn read_auth_safe(
    auth_safe: &[u8],
    password: &Password,
    unlock_keys: bool,
) -> Result<DecodedContainer, ContainerError> {
    let mut collector = BagCollector::default();
    let unlock = unlock_keys.then_some(password);

    let infos = Element::parse_single(auth_safe, Rules::Ber, "AuthenticatedSafe")?
        .expect(Tag::Sequence, "AuthenticatedSafe")?;

    for info in infos.children() {
        let info = info?.expect(Tag::Sequence, "content info")?;
        let content_type = info.children().required("content type")?;

        if content_type.is_oid(oids::PKCS7_DATA) {
            let contents = data_content(info)?;
            read_safe_contents(&contents, &mut collector, unlock, 0)?;
        } else if content_type.is_oid(oids::PKCS7_ENCRYPTED_DATA) {
            let plain = decrypt_encrypted_data(&info, password)?;
            read_safe_contents(&plain, &mut collector, unlock, 0)?;
        } else {
            // envelopedData needs a private key we do not have
            debug!("skipping unsupported AuthenticatedSafe content type");
        }
    }

    select_end_entity(collector)
}

/// EncryptedData ::= SEQUENCE { version INTEGER,
///     encryptedContentInfo SEQUENCE { contentType, contentEncryptionAlgorithm,
///                                     encryptedContent [0] IMPLICIT OCTET STRING } }
fn decrypt_encrypted_data(
    info: &Element<'_>,
    password: &Password,
) -> Result<Zeroizing<Vec<u8>>, ContainerError> {
    let mut fields = info.children();
    fields.required("content type")?;
    let content = fields.required("content")?;
    if !content.is_context(0) {
        return Err(Asn1Error::UnexpectedTag("encrypted data").into());
    }
    let mut encrypted_data = content
        .explicit_inner("encrypted data")?
        .expect(Tag::Sequence, "encrypted data")?
        .children();
    encrypted_data.expect(Tag::Integer, "version")?.uint()?;

    let mut content_info = encrypted_data
        .expect(Tag::Sequence, "encrypted content info")?
        .children();
    if !content_info.required("content type")?.is_oid(oids::PKCS7_DATA) {
        return Err(ContainerError::UnsupportedContentType);
    }
    let algorithm =
        AlgorithmIdentifier::from_element(content_info.required("content encryption algorithm")?)?;
    let encrypted = content_info.required("encrypted content")?;
    if !encrypted.is_context(0) {
        return Err(Asn1Error::UnexpectedTag("encrypted content").into());
    }
    let ciphertext = encrypted.octets()?;

    cipher::decrypt(&algorithm, password, &ciphertext)
}

/// Walk one SafeContents. With `unlock` set, shrouded key bags must decrypt
/// under that password.
fn read_safe_contents(
    contents: &[u8],
    collector: &mut BagCollector,
    unlock: Option<&Password>,
    depth: usize,
) -> Result<(), ContainerError> {
    if depth > MAX_NESTING {
        return Err(Asn1Error::Invalid("nesting depth").into());
    }

    let bags = Element::parse_single(contents, Rules::Ber, "SafeContents")?
        .expect(Tag::Sequence, "SafeContents")?;

    for bag in bags.children() {
        let mut bag = bag?.expect(Tag::Sequence, "safe bag")?.children();
        let bag_id = bag.required("bag id")?.oid()?;
        let value = bag.required("bag value")?;
        if !value.is_context(0) {
            return Err(Asn1Error::UnexpectedTag("bag value").into());
        }
        let value = value.explicit_inner("bag value")?;
        let local_key_id = match bag.optional(|e| e.is_universal(Tag::Set))? {
            Some(attributes) => find_local_key_id(&attributes)?,
            None => None,
        };

        match bag_id.as_bytes() {
            id if id == oids::CERT_BAG => {
                // CertBag ::= SEQUENCE { certId OID, certValue [0] EXPLICIT OCTET STRING }
                let mut cert_bag = value.expect(Tag::Sequence, "cert bag")?.children();
                if !cert_bag.required("cert id")?.is_oid(oids::X509_CERTIFICATE) {
                    debug!("skipping non-X.509 certificate bag");
                    continue;
                }
                let cert_value = cert_bag.required("cert value")?;
                if !cert_value.is_context(0) {
                    return Err(Asn1Error::UnexpectedTag("cert value").into());
                }
                let der = cert_value
                    .explicit_inner("cert value")?
                    .expect(Tag::OctetString, "cert value")?
                    .octets()?
                    .into_owned();
                collector.certificates.push((der, local_key_id));
            }
            id if id == oids::KEY_BAG || id == oids::SHROUDED_KEY_BAG => {
                if id == oids::SHROUDED_KEY_BAG {
                    if let Some(password) = unlock {
                        unlock_shrouded_key(value, password)?;
                    }
                }
                if let Some(key_id) = local_key_id {
                    collector.key_ids.push(key_id);
                }
            }
            id if id == oids::SAFE_CONTENTS_BAG => {
                let nested = value.expect(Tag::Sequence, "nested safe contents")?;
                read_safe_contents(nested.raw(), collector, unlock, depth + 1)?;
            }
            _ => debug!("skipping unsupported safe bag"),
        }
    }

    Ok(())
}

/// EncryptedPrivateKeyInfo ::= SEQUENCE { encryptionAlgorithm AlgorithmIdentifier,
///                                        encryptedData OCTET STRING }
///
/// The decrypted PrivateKeyInfo is dropped as soon as it has been seen to
/// be a SEQUENCE.
fn unlock_shrouded_key(value: Element<'_>, password: &Password) -> Result<(), ContainerError> {
    let mut fields = value.expect(Tag::Sequence, "encrypted private key")?.children();
    let algorithm =
        AlgorithmIdentifier::from_element(fields.required("key encryption algorithm")?)?;
    let encrypted = fields.expect(Tag::OctetString, "encrypted key")?.octets()?;

    let plain = cipher::decrypt(&algorithm, password, &encrypted)?;
    Element::parse_single(&plain, Rules::Ber, "private key info")?
        .expect(Tag::Sequence, "private key info")?;
    Ok(())
}

/// PKCS12Attribute ::= SEQUENCE { attrId OID, attrValues SET OF ANY }
fn find_local_key_id(attributes: &Element<'_>) -> Result<Option<Vec<u8>>, ContainerError> {
    for attribute in attributes.children() {
        let mut attribute = attribute?.expect(Tag::Sequence, "attribute")?.children();
        if attribute.required("attribute id")?.is_oid(oids::LOCAL_KEY_ID) {
            let value = attribute
                .expect(Tag::Set, "attribute values")?
                .children()
                .expect(Tag::OctetString, "localKeyId")?;
            return Ok(Some(value.octets()?.into_owned()));
        }
    }
    Ok(None)
}

/// The certificate whose localKeyId matches a key bag wins; otherwise the
/// first certificate bag.
fn select_end_entity(collector: BagCollector) -> Result<DecodedContainer, ContainerError> {
    if collector.certificates.is_empty() {
        return Err(ContainerError::NoCertificate);
    }

    let chosen = collector
        .certificates
        .iter()
        .position(|(_, key_id)| {
            key_id
                .as_ref()
                .is_some_and(|id| collector.key_ids.contains(id))
        })
        .unwrap_or(0);

    let mut certificate = None;
    let mut bundled = Vec::with_capacity(collector.certificates.len() - 1);
    for (index, (der, _)) in collector.certificates.into_iter().enumerate() {
        let parsed = Certificate::from_der(&der).map_err(|_| ContainerError::BadCertificate)?;
        if index == chosen {
            certificate = Some(parsed);
        } else {
            bundled.push(parsed);
        }
    }

    Ok(DecodedContainer {
        certificate: certificate.ok_or(ContainerError::NoCertificate)?,
        bundled,
    })
}
