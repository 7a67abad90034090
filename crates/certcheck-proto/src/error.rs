//! Check error taxonomy
//!
//! Every stage of the pipeline fails with a [`CheckError`]. The variants map
//! one-to-one onto the stable [`ErrorKind`] names that appear in check results.

use serde::Serialize;

/// What the certificate's Authority Information Access data was missing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingAia {
    /// No AIA extension at all
    Extension,
    /// No HTTP(S) OCSP responder URL
    OcspUrl,
    /// No HTTP(S) caIssuers URL and no usable bundled issuer
    IssuerUrl,
}

impl std::fmt::Display for MissingAia {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MissingAia::Extension => write!(f, "no Authority Information Access extension"),
            MissingAia::OcspUrl => write!(f, "no HTTP OCSP responder URL"),
            MissingAia::IssuerUrl => write!(f, "no HTTP caIssuers URL and no bundled issuer"),
        }
    }
}

/// Why a response could not be trusted
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum UntrustReason {
    #[error("responder reported malformedRequest")]
    MalformedRequest,

    #[error("responder reported internalError")]
    InternalError,

    #[error("responder reported tryLater")]
    TryLater,

    #[error("responder reported sigRequired")]
    SigRequired,

    #[error("responder reported unauthorized")]
    Unauthorized,

    /// The fetched issuer did not sign the subject certificate
    #[error("issuer certificate did not sign the subject certificate")]
    IssuerSignatureInvalid,

    #[error("response signature does not verify")]
    ResponseSignatureInvalid,

    #[error("unsupported signature algorithm")]
    UnsupportedSignatureAlgorithm,

    /// Delegated responder lacks issuer signature or OCSPSigning EKU
    #[error("responder certificate is not authorized by the issuer")]
    ResponderNotAuthorized,

    #[error("responder certificate is outside its validity period")]
    ResponderCertificateExpired,

    #[error("responder identity matches neither the issuer nor an embedded certificate")]
    UnknownResponder,

    #[error("response nonce does not match the request nonce")]
    NonceMismatch,
}

/// Errors produced while checking a certificate
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CheckError {
    /// Bad container or wrong password, with no further detail
    #[error("invalid container or password")]
    InvalidContainer,

    #[error("missing AIA data: {0}")]
    MissingAiaData(MissingAia),

    #[error("issuer certificate unreachable: {0}")]
    IssuerUnreachable(String),

    #[error("OCSP transport error: {0}")]
    OcspTransportError(String),

    #[error("malformed OCSP response: {0}")]
    OcspMalformedResponse(String),

    #[error("untrusted OCSP response: {0}")]
    UntrustedResponse(UntrustReason),

    #[error("stale OCSP response: {0}")]
    StaleResponse(String),

    #[error("OCSP response has no entry for serial {serial}")]
    CertificateMismatch { serial: String },
}

impl CheckError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CheckError::InvalidContainer => ErrorKind::InvalidContainer,
            CheckError::MissingAiaData(_) => ErrorKind::MissingAiaData,
            CheckError::IssuerUnreachable(_) => ErrorKind::IssuerUnreachable,
            CheckError::OcspTransportError(_) => ErrorKind::OcspTransportError,
            CheckError::OcspMalformedResponse(_) => ErrorKind::OcspMalformedResponse,
            CheckError::UntrustedResponse(_) => ErrorKind::UntrustedResponse,
            CheckError::StaleResponse(_) => ErrorKind::StaleResponse,
            CheckError::CertificateMismatch { .. } => ErrorKind::CertificateMismatch,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}

/// Stable, serializable error category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidContainer,
    MissingAiaData,
    IssuerUnreachable,
    OcspTransportError,
    OcspMalformedResponse,
    UntrustedResponse,
    StaleResponse,
    CertificateMismatch,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidContainer => "invalid_container",
            ErrorKind::MissingAiaData => "missing_aia_data",
            ErrorKind::IssuerUnreachable => "issuer_unreachable",
            ErrorKind::OcspTransportError => "ocsp_transport_error",
            ErrorKind::OcspMalformedResponse => "ocsp_malformed_response",
            ErrorKind::UntrustedResponse => "untrusted_response",
            ErrorKind::StaleResponse => "stale_response",
            ErrorKind::CertificateMismatch => "certificate_mismatch",
        }
    }

    /// Transient network failures that a caller may retry
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::IssuerUnreachable | ErrorKind::OcspTransportError
        )
    }

    /// False for conditions that describe the certificate rather than a
    /// failed check (a certificate with no AIA data cannot be checked online).
    pub fn is_failure(&self) -> bool {
        !matches!(self, ErrorKind::MissingAiaData)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
