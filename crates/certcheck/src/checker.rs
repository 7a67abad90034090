//! The revocation check pipeline
//!
//! ```text
//! container ─▶ decode ─▶ AIA ─▶ issuer (fetched or bundled) ─▶ issuer signs subject?
//!                                                                  │
//!          CheckResult ◀─ classify ◀─ validate ◀─ OCSP exchange ◀──┘
//! ```
//!
//! Every stage either hands its output to the next or ends the check with a
//! [`CheckError`]. Checks share nothing but the configuration and the
//! stateless [`Fetcher`], so any number can run concurrently.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use certcheck_proto::ocsp::{
    validate_response, CertId, OcspRequest, OcspResponse, ValidatedStatus, ValidationOptions,
};
use certcheck_proto::pkcs12::{self, DecodedContainer};
use certcheck_proto::{
    extract_aia_urls, parse_issuer_body, select_issuer, verify_issuer, AiaUrls, Certificate,
    CheckError, CheckResult, MissingAia,
};
use chrono::Utc;
use std::sync::Arc;
use tokio::io::AsyncRead;
use tracing::{debug, info, warn};
use url::Url;
use zeroize::Zeroizing;

use crate::config::{CheckerConfig, OcspMethod};
use crate::fetch::{FetchError, FetchedBody, Fetcher, HttpFetcher};
use crate::retry::RetryPolicy;
use crate::upload::ScopedUpload;

const OCSP_REQUEST_TYPE: &str = "application/ocsp-request";
const OCSP_RESPONSE_TYPE: &str = "application/ocsp-response";
const ISSUER_ACCEPT: &str =
    "application/pkix-cert, application/pkcs7-mime, application/x-x509-ca-cert, */*";

/// Runs revocation checks
pub struct Checker {
    config: CheckerConfig,
    fetcher: Arc<dyn Fetcher>,
    retry: RetryPolicy,
}

impl Checker {
    /// Create a checker that talks HTTP with `reqwest`
    pub fn new(config: CheckerConfig) -> Result<Self, FetchError> {
        let fetcher = HttpFetcher::from_config(&config)?;
        Ok(Self::with_fetcher(config, Arc::new(fetcher)))
    }

    /// Create a checker on top of an arbitrary transport
    pub fn with_fetcher(config: CheckerConfig, fetcher: Arc<dyn Fetcher>) -> Self {
        let retry = config.retry_policy();
        Self {
            config,
            fetcher,
            retry,
        }
    }

    pub fn config(&self) -> &CheckerConfig {
        &self.config
    }

    /// Check the certificate in a PKCS#12 container
    ///
    /// Never fails: every problem is reported inside the returned
    /// [`CheckResult`].
    pub async fn check(&self, container: Vec<u8>, password: &str) -> CheckResult {
        let checked_at = Utc::now();

        let decoded = match self.decode(container, password).await {
            Ok(decoded) => decoded,
            Err(err) => {
                info!(kind = %err.kind(), "container could not be opened");
                return CheckResult::new(None, &Err(err), checked_at);
            }
        };

        let summary = decoded.certificate.summary();
        let outcome = self.run(&decoded).await;
        match &outcome {
            Ok(validated) => info!(
                serial = %summary.serial_hex,
                status = ?validated.status,
                "check complete"
            ),
            Err(err) => warn!(
                serial = %summary.serial_hex,
                kind = %err.kind(),
                error = %err,
                "check failed"
            ),
        }

        CheckResult::new(Some(summary), &outcome, checked_at)
    }

    /// Spool `reader` into scoped storage and check it
    ///
    /// The upload must arrive within the fetch timeout. The temporary file
    /// is gone by the time this returns.
    pub async fn check_reader<R>(&self, reader: R, password: &str) -> CheckResult
    where
        R: AsyncRead + Unpin,
    {
        let spooled = ScopedUpload::spool_within(
            reader,
            self.config.max_container_size_bytes,
            self.config.fetch_timeout(),
        )
        .await;
        let upload = match spooled {
            Ok(upload) => upload,
            Err(err) => {
                debug!(error = %err, "upload not accepted");
                return CheckResult::new(None, &Err(CheckError::InvalidContainer), Utc::now());
            }
        };
        self.check_upload(&upload, password).await
    }

    /// Check an already spooled upload
    pub async fn check_upload(&self, upload: &ScopedUpload, password: &str) -> CheckResult {
        match upload.read().await {
            Ok(bytes) => self.check(bytes, password).await,
            Err(err) => {
                debug!(error = %err, "upload could not be read back");
                CheckResult::new(None, &Err(CheckError::InvalidContainer), Utc::now())
            }
        }
    }

    async fn decode(
        &self,
        container: Vec<u8>,
        password: &str,
    ) -> Result<DecodedContainer, CheckError> {
        let password = Zeroizing::new(password.to_string());
        let max_size = self.config.max_container_size_bytes;

        let decoded = tokio::task::spawn_blocking(move || {
            pkcs12::decode_with_limit(&container, &password, max_size)
        })
        .await;

        match decoded {
            Ok(result) => result,
            Err(err) => {
                warn!(error = %err, "container decoding task failed");
                Err(CheckError::InvalidContainer)
            }
        }
    }

    async fn run(&self, decoded: &DecodedContainer) -> Result<ValidatedStatus, CheckError> {
        let subject = &decoded.certificate;

        let urls = extract_aia_urls(subject);
        if !urls.present {
            return Err(CheckError::MissingAiaData(MissingAia::Extension));
        }
        let ocsp_url = urls
            .ocsp
            .clone()
            .ok_or(CheckError::MissingAiaData(MissingAia::OcspUrl))?;

        let issuer = self.resolve_issuer(subject, &urls, &decoded.bundled).await?;
        verify_issuer(subject, &issuer)?;

        let cert_id = CertId::new(subject, &issuer, self.config.hash_algorithm);
        let mut request = OcspRequest::new(cert_id);
        if self.config.enable_nonce {
            request = request.with_random_nonce();
        }

        let body = self.exchange(&ocsp_url, &request.encode()).await?;
        let response = OcspResponse::parse(&body)?;

        let options = ValidationOptions::at(Utc::now())
            .with_clock_skew(self.config.clock_skew())
            .with_nonce(request.nonce.clone());
        validate_response(&response, subject, &issuer, &options)
    }

    async fn resolve_issuer(
        &self,
        subject: &Certificate,
        urls: &AiaUrls,
        bundled: &[Certificate],
    ) -> Result<Certificate, CheckError> {
        if let Some(url) = &urls.ca_issuer {
            return self.fetch_issuer(subject, url).await;
        }

        let issuer = select_issuer(subject, bundled)
            .filter(|candidate| subject.verify_issued_by(candidate).is_ok())
            .ok_or(CheckError::MissingAiaData(MissingAia::IssuerUrl))?;
        debug!(issuer = %issuer.subject(), "using issuer bundled in the container");
        Ok(issuer.clone())
    }

    async fn fetch_issuer(&self, subject: &Certificate, url: &Url) -> Result<Certificate, CheckError> {
        let fetched = self
            .retry
            .run("issuer", || self.fetcher.get(url, ISSUER_ACCEPT))
            .await
            .map_err(|e| {
                warn!(url = %url, error = %e, "issuer fetch failed");
                CheckError::IssuerUnreachable(e.to_string())
            })?;

        let candidates = parse_issuer_body(&fetched.body)?;
        let issuer = select_issuer(subject, &candidates)
            .or_else(|| candidates.first())
            .ok_or_else(|| CheckError::IssuerUnreachable("no certificate in response".to_string()))?;
        debug!(url = %url, issuer = %issuer.subject(), "issuer fetched");
        Ok(issuer.clone())
    }

    /// Send the DER request and return the DER response body
    async fn exchange(&self, url: &Url, request: &[u8]) -> Result<Vec<u8>, CheckError> {
        let fetched = match self.config.ocsp_method {
            OcspMethod::Post => match self.post_request(url, request).await {
                Err(FetchError::Status(405)) => {
                    debug!(url = %url, "responder refused POST, retrying with GET");
                    self.get_request(url, request).await
                }
                other => other,
            },
            OcspMethod::Get => self.get_request(url, request).await,
        }
        .map_err(|e| {
            warn!(url = %url, error = %e, "OCSP exchange failed");
            CheckError::OcspTransportError(e.to_string())
        })?;

        if let Some(content_type) = &fetched.content_type {
            if !content_type
                .to_ascii_lowercase()
                .starts_with(OCSP_RESPONSE_TYPE)
            {
                return Err(CheckError::OcspMalformedResponse(format!(
                    "unexpected content type {}",
                    content_type
                )));
            }
        }
        Ok(fetched.body)
    }

    async fn post_request(&self, url: &Url, request: &[u8]) -> Result<FetchedBody, FetchError> {
        self.retry
            .run("ocsp", || {
                self.fetcher
                    .post(url, OCSP_REQUEST_TYPE, request.to_vec(), OCSP_RESPONSE_TYPE)
            })
            .await
    }

    async fn get_request(&self, url: &Url, request: &[u8]) -> Result<FetchedBody, FetchError> {
        let get_url = ocsp_get_url(url, request)?;
        self.retry
            .run("ocsp", || self.fetcher.get(&get_url, OCSP_RESPONSE_TYPE))
            .await
    }
}

/// `{responder}/{url-encoded base64 of the DER request}`
pub fn ocsp_get_url(responder: &Url, request: &[u8]) -> Result<Url, FetchError> {
    let encoded = STANDARD.encode(request);
    let escaped: String = url::form_urlencoded::byte_serialize(encoded.as_bytes()).collect();

    let mut text = responder.as_str().to_string();
    if !text.ends_with('/') {
        text.push('/');
    }
    text.push_str(&escaped);
    Url::parse(&text).map_err(|e| FetchError::InvalidUrl(e.to_string()))
}
