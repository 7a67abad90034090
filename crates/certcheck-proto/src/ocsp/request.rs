//! OCSP request construction
//!
//! Builds an unsigned OCSPRequest for a single certificate. Without a nonce
//! the encoding is byte-identical to `openssl ocsp -no_nonce -reqout`.

use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha384, Sha512};

use asn1_rs::Tag;

use crate::asn1::{AlgorithmIdentifier, Asn1Error, Element, Rules};
use crate::certificate::Certificate;
use crate::der;
use crate::oids;

/// Length of generated nonces in bytes
pub const NONCE_LEN: usize = 16;

/// Digest used for CertID name and key hashes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    #[default]
    Sha1,
    Sha256,
    Sha384,
    Sha512,
}

impl HashAlgorithm {
    pub fn oid(self) -> &'static [u8] {
        match self {
            HashAlgorithm::Sha1 => oids::SHA1,
            HashAlgorithm::Sha256 => oids::SHA256,
            HashAlgorithm::Sha384 => oids::SHA384,
            HashAlgorithm::Sha512 => oids::SHA512,
        }
    }

    pub fn from_oid(oid: &[u8]) -> Option<Self> {
        [
            HashAlgorithm::Sha1,
            HashAlgorithm::Sha256,
            HashAlgorithm::Sha384,
            HashAlgorithm::Sha512,
        ]
        .into_iter()
        .find(|alg| alg.oid() == oid)
    }

    pub fn digest(self, data: &[u8]) -> Vec<u8> {
        match self {
            HashAlgorithm::Sha1 => Sha1::digest(data).to_vec(),
            HashAlgorithm::Sha256 => Sha256::digest(data).to_vec(),
            HashAlgorithm::Sha384 => Sha384::digest(data).to_vec(),
            HashAlgorithm::Sha512 => Sha512::digest(data).to_vec(),
        }
    }
}

/// Identifies one certificate to the responder
///
/// ```asn1
/// CertID ::= SEQUENCE {
///     hashAlgorithm       AlgorithmIdentifier,
///     issuerNameHash      OCTET STRING,
///     issuerKeyHash       OCTET STRING,
///     serialNumber        CertificateSerialNumber
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertId {
    pub hash_algorithm: HashAlgorithm,
    /// Hash of the issuer's encoded subject Name
    pub issuer_name_hash: Vec<u8>,
    /// Hash of the issuer's subjectPublicKey BIT STRING contents
    pub issuer_key_hash: Vec<u8>,
    /// Serial INTEGER contents as encoded in the subject certificate
    pub serial: Vec<u8>,
}

impl CertId {
    /// Compute the CertID of `subject` issued by `issuer`
    pub fn new(subject: &Certificate, issuer: &Certificate, hash_algorithm: HashAlgorithm) -> Self {
        Self {
            hash_algorithm,
            issuer_name_hash: hash_algorithm.digest(issuer.raw_subject()),
            issuer_key_hash: hash_algorithm.digest(issuer.public_key_bits()),
            serial: subject.raw_serial().to_vec(),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let hash_algo = der::sequence(&[&der::oid(self.hash_algorithm.oid()), &der::null()]);
        der::sequence(&[
            &hash_algo,
            &der::octet_string(&self.issuer_name_hash),
            &der::octet_string(&self.issuer_key_hash),
            &der::integer(&self.serial),
        ])
    }

    pub(crate) fn from_element(element: Element<'_>) -> Result<Self, Asn1Error> {
        let mut fields = element.expect(Tag::Sequence, "CertID")?.children();
        let algorithm = AlgorithmIdentifier::from_element(fields.required("hash algorithm")?)?;
        let hash_algorithm = HashAlgorithm::from_oid(algorithm.oid.as_bytes())
            .ok_or(Asn1Error::Invalid("CertID hash algorithm"))?;
        let issuer_name_hash = fields
            .expect(Tag::OctetString, "issuerNameHash")?
            .contents()
            .to_vec();
        let issuer_key_hash = fields
            .expect(Tag::OctetString, "issuerKeyHash")?
            .contents()
            .to_vec();
        let serial = fields.required("serialNumber")?.integer_bytes()?.to_vec();
        fields.finish("CertID")?;
        Ok(Self {
            hash_algorithm,
            issuer_name_hash,
            issuer_key_hash,
            serial,
        })
    }

    /// Serial number as uppercase hex without leading zero octets
    pub fn serial_hex(&self) -> String {
        let trimmed = match self.serial.iter().position(|&b| b != 0) {
            Some(start) => &self.serial[start..],
            None => &self.serial[self.serial.len().saturating_sub(1)..],
        };
        trimmed.iter().map(|b| format!("{:02X}", b)).collect()
    }
}

/// An unsigned single-certificate OCSP request
///
/// ```asn1
/// OCSPRequest ::= SEQUENCE {
///     tbsRequest          TBSRequest,
///     optionalSignature   [0] EXPLICIT Signature OPTIONAL
/// }
///
/// TBSRequest ::= SEQUENCE {
///     version             [0] EXPLICIT Version DEFAULT v1,
///     requestorName       [1] EXPLICIT GeneralName OPTIONAL,
///     requestList         SEQUENCE OF Request,
///     requestExtensions   [2] EXPLICIT Extensions OPTIONAL
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OcspRequest {
    pub cert_id: CertId,
    pub nonce: Option<Vec<u8>>,
}

impl OcspRequest {
    pub fn new(cert_id: CertId) -> Self {
        Self {
            cert_id,
            nonce: None,
        }
    }

    /// Add a nonce for replay protection
    pub fn with_nonce(mut self, nonce: Vec<u8>) -> Self {
        self.nonce = Some(nonce);
        self
    }

    /// Add a fresh random nonce of [`NONCE_LEN`] bytes
    pub fn with_random_nonce(self) -> Self {
        let mut nonce = vec![0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);
        self.with_nonce(nonce)
    }

    /// DER encoding of the request
    pub fn encode(&self) -> Vec<u8> {
        let request = der::sequence(&[&self.cert_id.encode()]);
        let request_list = der::sequence(&[&request]);

        let tbs_request = match &self.nonce {
            Some(nonce) => {
                der::sequence(&[&request_list, &der::explicit(2, &nonce_extensions(nonce))])
            }
            None => der::sequence(&[&request_list]),
        };

        der::sequence(&[&tbs_request])
    }

    /// Decode a single-certificate request, for responders and test doubles
    pub fn parse(encoded: &[u8]) -> Result<Self, Asn1Error> {
        let mut request = Element::parse_single(encoded, Rules::Der, "OCSPRequest")?
            .expect(Tag::Sequence, "OCSPRequest")?
            .children();

        let mut tbs = request.expect(Tag::Sequence, "tbsRequest")?.children();
        tbs.optional_context(0)?;
        tbs.optional_context(1)?;

        let mut list = tbs.expect(Tag::Sequence, "requestList")?.children();
        let mut single = list.expect(Tag::Sequence, "request")?.children();
        let cert_id = CertId::from_element(single.required("reqCert")?)?;
        if !list.is_empty() {
            return Err(Asn1Error::Invalid("multi-certificate request"));
        }

        let nonce = match tbs.optional_context(2)? {
            Some(extensions) => super::find_nonce(&extensions)?,
            None => None,
        };

        Ok(Self { cert_id, nonce })
    }
}

/// Extensions carrying the nonce; extnValue wraps the nonce in an OCTET STRING
fn nonce_extensions(nonce: &[u8]) -> Vec<u8> {
    let extension = der::sequence(&[
        &der::oid(oids::OCSP_NONCE),
        &der::octet_string(&der::octet_string(nonce)),
    ]);
    der::sequence(&[&extension])
}
