//! Final classification of a check
//!
//! Every outcome, successful or not, collapses into exactly one
//! [`Classification`]. A bad response is never reported as `good`.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::certificate::CertificateSummary;
use crate::error::{CheckError, ErrorKind};
use crate::ocsp::{CertStatus, RevocationReason, ValidatedStatus};

/// Outcome category of a check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Classification {
    Good,
    Revoked {
        revoked_at: DateTime<Utc>,
        reason: Option<RevocationReason>,
    },
    Unknown,
    Error {
        kind: ErrorKind,
        message: String,
    },
}

impl Classification {
    pub fn is_good(&self) -> bool {
        matches!(self, Classification::Good)
    }

    /// Process exit code: 0 good, 1 revoked, 2 unknown, 3 error
    pub fn exit_code(&self) -> i32 {
        match self {
            Classification::Good => 0,
            Classification::Revoked { .. } => 1,
            Classification::Unknown => 2,
            Classification::Error { .. } => 3,
        }
    }
}

/// Map a pipeline outcome onto its classification
pub fn classify(outcome: &Result<ValidatedStatus, CheckError>) -> Classification {
    match outcome {
        Ok(validated) => match &validated.status {
            CertStatus::Good => Classification::Good,
            CertStatus::Revoked {
                revocation_time,
                reason,
            } => Classification::Revoked {
                revoked_at: *revocation_time,
                reason: *reason,
            },
            CertStatus::Unknown => Classification::Unknown,
        },
        Err(err) => Classification::Error {
            kind: err.kind(),
            message: err.to_string(),
        },
    }
}

/// Reported result of one check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckResult {
    /// Absent when the container could not be opened
    pub certificate: Option<CertificateSummary>,
    #[serde(flatten)]
    pub status: Classification,
    /// Extra detail for operators
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
    pub checked_at: DateTime<Utc>,
}

impl CheckResult {
    pub fn new(
        certificate: Option<CertificateSummary>,
        outcome: &Result<ValidatedStatus, CheckError>,
        checked_at: DateTime<Utc>,
    ) -> Self {
        let diagnostic = match outcome {
            Ok(validated) => validated.next_update.map(|next| {
                format!(
                    "response produced {}, valid until {}",
                    validated.produced_at.to_rfc3339(),
                    next.to_rfc3339()
                )
            }),
            Err(CheckError::MissingAiaData(_)) => {
                Some("certificate cannot be checked online".to_string())
            }
            Err(err) if err.is_retryable() => Some("transient failure, retry later".to_string()),
            Err(_) => None,
        };

        Self {
            certificate,
            status: classify(outcome),
            diagnostic,
            checked_at,
        }
    }

    pub fn exit_code(&self) -> i32 {
        self.status.exit_code()
    }
}
