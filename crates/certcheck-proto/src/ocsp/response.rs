//! OCSP response parsing

use chrono::{DateTime, Utc};
use serde::Serialize;

use asn1_rs::Tag;

use super::request::CertId;
use crate::asn1::{AlgorithmIdentifier, Asn1Error, Element, Rules};
use crate::error::CheckError;
use crate::oids;

/// OCSP response status codes (RFC 6960 Section 4.2.1)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseStatus {
    Successful = 0,
    MalformedRequest = 1,
    InternalError = 2,
    TryLater = 3,
    // 4 is not used
    SigRequired = 5,
    Unauthorized = 6,
}

impl ResponseStatus {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(ResponseStatus::Successful),
            1 => Some(ResponseStatus::MalformedRequest),
            2 => Some(ResponseStatus::InternalError),
            3 => Some(ResponseStatus::TryLater),
            5 => Some(ResponseStatus::SigRequired),
            6 => Some(ResponseStatus::Unauthorized),
            _ => None,
        }
    }
}

/// CRLReason (RFC 5280 Section 5.3.1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RevocationReason {
    Unspecified,
    KeyCompromise,
    CaCompromise,
    AffiliationChanged,
    Superseded,
    CessationOfOperation,
    CertificateHold,
    RemoveFromCrl,
    PrivilegeWithdrawn,
    AaCompromise,
}

impl RevocationReason {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(RevocationReason::Unspecified),
            1 => Some(RevocationReason::KeyCompromise),
            2 => Some(RevocationReason::CaCompromise),
            3 => Some(RevocationReason::AffiliationChanged),
            4 => Some(RevocationReason::Superseded),
            5 => Some(RevocationReason::CessationOfOperation),
            6 => Some(RevocationReason::CertificateHold),
            // 7 is not used
            8 => Some(RevocationReason::RemoveFromCrl),
            9 => Some(RevocationReason::PrivilegeWithdrawn),
            10 => Some(RevocationReason::AaCompromise),
            _ => None,
        }
    }
}

/// Certificate status from a SingleResponse
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CertStatus {
    Good,
    Revoked {
        revocation_time: DateTime<Utc>,
        reason: Option<RevocationReason>,
    },
    Unknown,
}

/// ResponderID ::= CHOICE { byName [1] Name, byKey [2] KeyHash }
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponderId {
    /// Encoded Name of the signer
    ByName(Vec<u8>),
    /// SHA-1 of the signer's subjectPublicKey contents
    ByKey(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SingleResponse {
    pub cert_id: CertId,
    pub status: CertStatus,
    pub this_update: DateTime<Utc>,
    pub next_update: Option<DateTime<Utc>>,
}

/// Decoded BasicOCSPResponse
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicResponse {
    /// Exact encoding of tbsResponseData, the signed bytes
    pub tbs_response_data: Vec<u8>,
    pub responder_id: ResponderId,
    pub produced_at: DateTime<Utc>,
    pub responses: Vec<SingleResponse>,
    pub nonce: Option<Vec<u8>>,
    /// Signature AlgorithmIdentifier OID contents
    pub signature_algorithm: Vec<u8>,
    pub signature: Vec<u8>,
    /// DER encodings of embedded certificates
    pub certs: Vec<Vec<u8>>,
}

/// A decoded OCSPResponse
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OcspResponse {
    pub status: ResponseStatus,
    /// Present only when `status` is `Successful`
    pub basic: Option<BasicResponse>,
}

impl OcspResponse {
    /// Parse an OCSP response from DER-encoded bytes
    ///
    /// # Arguments
    /// * `der_bytes` - DER-encoded OCSPResponse
    ///
    /// # Returns
    /// Parsed response or [`CheckError::OcspMalformedResponse`]
    pub fn parse(der_bytes: &[u8]) -> Result<Self, CheckError> {
        Self::parse_der(der_bytes)
            .map_err(|e| CheckError::OcspMalformedResponse(e.to_string()))?
            .ok_or_else(|| {
                CheckError::OcspMalformedResponse("unknown response status".to_string())
            })
    }

    fn parse_der(der_bytes: &[u8]) -> Result<Option<Self>, Asn1Error> {
        let mut response = Element::parse_single(der_bytes, Rules::Der, "OCSPResponse")?
            .expect(Tag::Sequence, "OCSPResponse")?
            .children();

        let code = response.required("responseStatus")?.enumerated()?;
        let Some(status) = u8::try_from(code).ok().and_then(ResponseStatus::from_u8) else {
            return Ok(None);
        };

        let response_bytes = response.optional_context(0)?;
        response.finish("OCSPResponse")?;

        if status != ResponseStatus::Successful {
            return Ok(Some(Self {
                status,
                basic: None,
            }));
        }

        // ResponseBytes ::= SEQUENCE { responseType OID, response OCTET STRING }
        let response_bytes = response_bytes.ok_or(Asn1Error::Missing("responseBytes"))?;
        let mut bytes = response_bytes
            .explicit_inner("responseBytes")?
            .expect(Tag::Sequence, "responseBytes")?
            .children();
        if !bytes.required("responseType")?.is_oid(oids::OCSP_BASIC) {
            return Err(Asn1Error::Invalid("response type"));
        }
        let basic = bytes.expect(Tag::OctetString, "response")?;
        bytes.finish("responseBytes")?;
        let basic = parse_basic(basic.contents())?;

        Ok(Some(Self {
            status,
            basic: Some(basic),
        }))
    }
}

fn parse_basic(der_bytes: &[u8]) -> Result<BasicResponse, Asn1Error> {
    let mut basic = Element::parse_single(der_bytes, Rules::Der, "BasicOCSPResponse")?
        .expect(Tag::Sequence, "BasicOCSPResponse")?
        .children();

    let tbs = basic.expect(Tag::Sequence, "tbsResponseData")?;
    let signature_algorithm = AlgorithmIdentifier::from_element(basic.required("signatureAlgorithm")?)?
        .oid
        .as_bytes()
        .to_vec();
    let signature = basic.required("signature")?.bit_string()?.into_owned();

    let mut certs = Vec::new();
    if let Some(explicit) = basic.optional_context(0)? {
        let list = explicit
            .explicit_inner("certs")?
            .expect(Tag::Sequence, "certs")?;
        for cert in list.children() {
            certs.push(cert?.expect(Tag::Sequence, "certificate")?.raw().to_vec());
        }
    }
    basic.finish("BasicOCSPResponse")?;

    // ResponseData ::= SEQUENCE { version [0], responderID, producedAt,
    //                             responses SEQUENCE OF SingleResponse,
    //                             responseExtensions [1] }
    let mut data = tbs.children();
    if let Some(version) = data.optional_context(0)? {
        if version.explicit_inner("version")?.uint()? != 0 {
            return Err(Asn1Error::Invalid("response version"));
        }
    }

    let responder = data.required("responderID")?;
    let responder_id = if responder.is_context(1) {
        let name = responder
            .explicit_inner("responder name")?
            .expect(Tag::Sequence, "responder name")?;
        ResponderId::ByName(name.raw().to_vec())
    } else if responder.is_context(2) {
        let key_hash = responder
            .explicit_inner("responder key")?
            .expect(Tag::OctetString, "responder key")?;
        ResponderId::ByKey(key_hash.contents().to_vec())
    } else {
        return Err(Asn1Error::Invalid("responder ID"));
    };

    let produced_at = data.required("producedAt")?.generalized_time()?;

    let mut responses = Vec::new();
    for single in data.expect(Tag::Sequence, "responses")?.children() {
        responses.push(parse_single_response(single?)?);
    }

    let nonce = match data.optional_context(1)? {
        Some(extensions) => super::find_nonce(&extensions)?,
        None => None,
    };
    data.finish("ResponseData")?;

    Ok(BasicResponse {
        tbs_response_data: tbs.raw().to_vec(),
        responder_id,
        produced_at,
        responses,
        nonce,
        signature_algorithm,
        signature,
        certs,
    })
}

fn parse_single_response(single: Element<'_>) -> Result<SingleResponse, Asn1Error> {
    let mut fields = single.expect(Tag::Sequence, "SingleResponse")?.children();
    let cert_id = CertId::from_element(fields.required("certID")?)?;
    let status = parse_cert_status(&fields.required("certStatus")?)?;

    let this_update = fields.required("thisUpdate")?.generalized_time()?;
    let next_update = match fields.optional_context(0)? {
        Some(explicit) => Some(explicit.explicit_inner("nextUpdate")?.generalized_time()?),
        None => None,
    };
    fields.optional_context(1)?;
    fields.finish("SingleResponse")?;

    Ok(SingleResponse {
        cert_id,
        status,
        this_update,
        next_update,
    })
}

/// CertStatus ::= CHOICE {
///     good        [0] IMPLICIT NULL,
///     revoked     [1] IMPLICIT RevokedInfo,
///     unknown     [2] IMPLICIT UnknownInfo }
fn parse_cert_status(status: &Element<'_>) -> Result<CertStatus, Asn1Error> {
    if status.is_context(0) && !status.is_constructed() {
        return Ok(CertStatus::Good);
    }
    if status.is_context(2) && !status.is_constructed() {
        return Ok(CertStatus::Unknown);
    }
    if !(status.is_context(1) && status.is_constructed()) {
        return Err(Asn1Error::Invalid("certificate status"));
    }

    // RevokedInfo ::= SEQUENCE { revocationTime GeneralizedTime,
    //                            revocationReason [0] EXPLICIT CRLReason OPTIONAL }
    let mut info = status.children();
    let revocation_time = info.required("revocationTime")?.generalized_time()?;
    let reason = match info.optional_context(0)? {
        Some(explicit) => u8::try_from(explicit.explicit_inner("revocationReason")?.enumerated()?)
            .ok()
            .and_then(RevocationReason::from_code),
        None => None,
    };
    info.finish("RevokedInfo")?;

    Ok(CertStatus::Revoked {
        revocation_time,
        reason,
    })
}

impl BasicResponse {
    /// Parse the embedded certificates, skipping any that do not decode
    pub fn embedded_certificates(&self) -> Vec<crate::certificate::Certificate> {
        self.certs
            .iter()
            .filter_map(|der| crate::certificate::Certificate::from_der(der).ok())
            .collect()
    }
}
