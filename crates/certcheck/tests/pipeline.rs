//! End-to-end checks over the PKI fixtures with an in-memory transport
//!
//! The mock serves the issuer at the caIssuers URL and answers OCSP
//! requests either with one fixed fixture or, for the fleet, with the
//! response file named after the requested serial number.

use async_trait::async_trait;
use certcheck::{
    CheckResult, Checker, CheckerConfig, Classification, ErrorKind, FetchError, FetchedBody,
    Fetcher, OcspMethod,
};
use certcheck_proto::ocsp::{OcspRequest, RevocationReason};
use chrono::{TimeZone, Utc};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::task::JoinSet;
use url::Url;

const PASSWORD: &str = "correct horse battery";
const ISSUER_URL: &str = "http://ca.certcheck.test/ca.der";
const OCSP_URL: &str = "http://ocsp.certcheck.test/";
const OCSP_TYPE: &str = "application/ocsp-response";

fn fixture(path: &str) -> Vec<u8> {
    let full = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../certcheck-proto/tests/pki")
        .join(path);
    std::fs::read(&full).unwrap_or_else(|e| panic!("read {}: {}", full.display(), e))
}

type Reply = Result<FetchedBody, FetchError>;

fn ocsp_reply(name: &str) -> Reply {
    Ok(FetchedBody::new(Some(OCSP_TYPE), fixture(&format!("ocsp/{}", name))))
}

fn issuer_reply(path: &str) -> Reply {
    Ok(FetchedBody::new(Some("application/pkix-cert"), fixture(path)))
}

enum OcspMode {
    Fixed(Reply),
    /// Look up `fleet/{SERIAL}.ocsp` from the request
    BySerial,
    /// Refuse POST with 405, answer GET
    GetOnly(Reply),
}

struct MockFetcher {
    issuer: Reply,
    ocsp: OcspMode,
    issuer_calls: AtomicUsize,
    ocsp_calls: AtomicUsize,
    get_urls: Mutex<Vec<String>>,
}

impl MockFetcher {
    fn new(issuer: Reply, ocsp: OcspMode) -> Arc<Self> {
        Arc::new(Self {
            issuer,
            ocsp,
            issuer_calls: AtomicUsize::new(0),
            ocsp_calls: AtomicUsize::new(0),
            get_urls: Mutex::new(Vec::new()),
        })
    }

    fn issuer_calls(&self) -> usize {
        self.issuer_calls.load(Ordering::SeqCst)
    }

    fn ocsp_calls(&self) -> usize {
        self.ocsp_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn get(&self, url: &Url, _accept: &str) -> Result<FetchedBody, FetchError> {
        if url.as_str() == ISSUER_URL {
            self.issuer_calls.fetch_add(1, Ordering::SeqCst);
            return self.issuer.clone();
        }
        assert!(url.as_str().starts_with(OCSP_URL), "unexpected GET {}", url);
        self.ocsp_calls.fetch_add(1, Ordering::SeqCst);
        self.get_urls.lock().unwrap().push(url.to_string());
        match &self.ocsp {
            OcspMode::GetOnly(reply) | OcspMode::Fixed(reply) => reply.clone(),
            OcspMode::BySerial => Err(FetchError::Status(404)),
        }
    }

    async fn post(
        &self,
        url: &Url,
        content_type: &str,
        body: Vec<u8>,
        accept: &str,
    ) -> Result<FetchedBody, FetchError> {
        assert_eq!(url.as_str(), OCSP_URL);
        assert_eq!(content_type, "application/ocsp-request");
        assert_eq!(accept, OCSP_TYPE);
        self.ocsp_calls.fetch_add(1, Ordering::SeqCst);

        match &self.ocsp {
            OcspMode::Fixed(reply) => reply.clone(),
            OcspMode::GetOnly(_) => Err(FetchError::Status(405)),
            OcspMode::BySerial => {
                let request = OcspRequest::parse(&body).expect("checker sent a valid request");
                let serial = request.cert_id.serial_hex();
                Ok(FetchedBody::new(
                    Some(OCSP_TYPE),
                    fixture(&format!("fleet/{}.ocsp", serial)),
                ))
            }
        }
    }
}

fn config() -> CheckerConfig {
    CheckerConfig {
        retry_backoff_ms: 1,
        ..CheckerConfig::default()
    }
}

async fn check(container: &str, password: &str, fetcher: Arc<MockFetcher>) -> CheckResult {
    check_with(config(), container, password, fetcher).await
}

async fn check_with(
    config: CheckerConfig,
    container: &str,
    password: &str,
    fetcher: Arc<MockFetcher>,
) -> CheckResult {
    let checker = Checker::with_fetcher(config, fetcher);
    checker
        .check(fixture(&format!("containers/{}", container)), password)
        .await
}

fn error_kind(result: &CheckResult) -> ErrorKind {
    match &result.status {
        Classification::Error { kind, .. } => *kind,
        other => panic!("expected an error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_good_certificate() {
    let fetcher = MockFetcher::new(issuer_reply("certs/ca.der"), OcspMode::Fixed(ocsp_reply("good.der")));
    let result = check("alice-aes.p12", PASSWORD, fetcher.clone()).await;

    assert_eq!(result.status, Classification::Good);
    assert_eq!(result.exit_code(), 0);
    let summary = result.certificate.as_ref().expect("summary");
    assert_eq!(summary.common_name.as_deref(), Some("alice.example"));
    assert_eq!(summary.serial_hex, "C0FFEE01");
    assert_eq!(fetcher.issuer_calls(), 1);
    assert_eq!(fetcher.ocsp_calls(), 1);
}

#[tokio::test]
async fn test_every_container_variant_checks_good() {
    for container in ["alice-3des.p12", "alice-rc2.p12", "alice-nomac.p12", "alice-plain.p12"] {
        let fetcher =
            MockFetcher::new(issuer_reply("certs/ca.der"), OcspMode::Fixed(ocsp_reply("good.der")));
        let result = check(container, PASSWORD, fetcher).await;
        assert_eq!(result.status, Classification::Good, "{}", container);
    }

    let fetcher = MockFetcher::new(issuer_reply("certs/ca.der"), OcspMode::Fixed(ocsp_reply("good.der")));
    let result = check("alice-empty-pass.p12", "", fetcher).await;
    assert_eq!(result.status, Classification::Good);
}

#[tokio::test]
async fn test_revoked_certificate_keeps_time_and_reason() {
    let fetcher = MockFetcher::new(issuer_reply("certs/ca.der"), OcspMode::Fixed(ocsp_reply("revoked.der")));
    let result = check("mallory.p12", PASSWORD, fetcher).await;

    assert_eq!(
        result.status,
        Classification::Revoked {
            revoked_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            reason: Some(RevocationReason::KeyCompromise),
        }
    );
    assert_eq!(result.exit_code(), 1);
}

#[tokio::test]
async fn test_unknown_certificate() {
    let fetcher = MockFetcher::new(issuer_reply("certs/ca.der"), OcspMode::Fixed(ocsp_reply("unknown.der")));
    let result = check("ghost.p12", PASSWORD, fetcher).await;
    assert_eq!(result.status, Classification::Unknown);
    assert_eq!(result.exit_code(), 2);
}

#[tokio::test]
async fn test_unauthorized_responder_status() {
    let fetcher = MockFetcher::new(
        issuer_reply("certs/ca.der"),
        OcspMode::Fixed(ocsp_reply("unauthorized.der")),
    );
    let result = check("alice-aes.p12", PASSWORD, fetcher).await;

    assert_eq!(error_kind(&result), ErrorKind::UntrustedResponse);
    assert_eq!(result.exit_code(), 3);
    // The container opened, so the summary is still reported
    assert!(result.certificate.is_some());
}

#[tokio::test]
async fn test_stale_good_response_is_not_good() {
    let fetcher = MockFetcher::new(issuer_reply("certs/ca.der"), OcspMode::Fixed(ocsp_reply("stale.der")));
    let result = check("alice-aes.p12", PASSWORD, fetcher).await;
    assert_eq!(error_kind(&result), ErrorKind::StaleResponse);
}

#[tokio::test]
async fn test_delegated_responder() {
    let fetcher = MockFetcher::new(issuer_reply("certs/ca.der"), OcspMode::Fixed(ocsp_reply("delegated.der")));
    let result = check("alice-aes.p12", PASSWORD, fetcher).await;
    assert_eq!(result.status, Classification::Good);
}

#[tokio::test]
async fn test_untrusted_signers() {
    for name in ["rogue.der", "rogue-delegated.der", "no-eku.der"] {
        let fetcher = MockFetcher::new(issuer_reply("certs/ca.der"), OcspMode::Fixed(ocsp_reply(name)));
        let result = check("alice-aes.p12", PASSWORD, fetcher).await;
        assert_eq!(error_kind(&result), ErrorKind::UntrustedResponse, "{}", name);
    }
}

#[tokio::test]
async fn test_response_for_another_certificate() {
    let fetcher = MockFetcher::new(issuer_reply("certs/ca.der"), OcspMode::Fixed(ocsp_reply("good.der")));
    let result = check("mallory.p12", PASSWORD, fetcher).await;
    assert_eq!(error_kind(&result), ErrorKind::CertificateMismatch);
}

#[tokio::test]
async fn test_no_aia_extension() {
    let fetcher = MockFetcher::new(issuer_reply("certs/ca.der"), OcspMode::Fixed(ocsp_reply("good.der")));
    let result = check("noaia.p12", PASSWORD, fetcher.clone()).await;

    assert_eq!(error_kind(&result), ErrorKind::MissingAiaData);
    assert!(!ErrorKind::MissingAiaData.is_failure());
    assert!(result.diagnostic.is_some());
    assert_eq!(fetcher.issuer_calls(), 0);
    assert_eq!(fetcher.ocsp_calls(), 0);
}

#[tokio::test]
async fn test_wrong_password() {
    let fetcher = MockFetcher::new(issuer_reply("certs/ca.der"), OcspMode::Fixed(ocsp_reply("good.der")));
    let result = check("alice-aes.p12", "hunter2", fetcher.clone()).await;

    assert_eq!(error_kind(&result), ErrorKind::InvalidContainer);
    assert!(result.certificate.is_none());
    assert_eq!(fetcher.issuer_calls(), 0);

    let corrupt = check("truncated.p12", PASSWORD, fetcher).await;
    assert_eq!(corrupt.status, result.status);
}

#[tokio::test]
async fn test_issuer_not_found_is_not_retried() {
    let fetcher = MockFetcher::new(Err(FetchError::Status(404)), OcspMode::Fixed(ocsp_reply("good.der")));
    let result = check("alice-aes.p12", PASSWORD, fetcher.clone()).await;

    assert_eq!(error_kind(&result), ErrorKind::IssuerUnreachable);
    assert_eq!(fetcher.issuer_calls(), 1);
    assert_eq!(fetcher.ocsp_calls(), 0);
}

#[tokio::test]
async fn test_issuer_timeout_is_retried() {
    let fetcher = MockFetcher::new(
        Err(FetchError::Timeout(std::time::Duration::from_millis(5))),
        OcspMode::Fixed(ocsp_reply("good.der")),
    );
    let result = check("alice-aes.p12", PASSWORD, fetcher.clone()).await;

    assert_eq!(error_kind(&result), ErrorKind::IssuerUnreachable);
    assert_eq!(fetcher.issuer_calls(), 3);
}

#[tokio::test]
async fn test_issuer_body_not_a_certificate() {
    let fetcher = MockFetcher::new(
        Ok(FetchedBody::new(Some("text/html"), b"<html>oops</html>".to_vec())),
        OcspMode::Fixed(ocsp_reply("good.der")),
    );
    let result = check("alice-aes.p12", PASSWORD, fetcher).await;
    assert_eq!(error_kind(&result), ErrorKind::IssuerUnreachable);
}

#[tokio::test]
async fn test_issuer_that_did_not_sign_subject() {
    let fetcher = MockFetcher::new(issuer_reply("certs/rogue.der"), OcspMode::Fixed(ocsp_reply("good.der")));
    let result = check("alice-aes.p12", PASSWORD, fetcher.clone()).await;

    assert_eq!(error_kind(&result), ErrorKind::UntrustedResponse);
    match &result.status {
        Classification::Error { message, .. } => assert!(message.contains("did not sign")),
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(fetcher.ocsp_calls(), 0);
}

#[tokio::test]
async fn test_issuer_as_pkcs7_and_pem() {
    for path in ["bundles/ca.p7c", "bundles/chain.p7c", "certs/ca.pem"] {
        let fetcher = MockFetcher::new(issuer_reply(path), OcspMode::Fixed(ocsp_reply("good.der")));
        let result = check("alice-aes.p12", PASSWORD, fetcher).await;
        assert_eq!(result.status, Classification::Good, "{}", path);
    }
}

#[tokio::test]
async fn test_bundled_issuer_without_ca_issuers_url() {
    let fetcher = MockFetcher::new(
        Err(FetchError::Status(500)),
        OcspMode::Fixed(ocsp_reply("bundle-good.der")),
    );
    let result = check("bundle.p12", PASSWORD, fetcher.clone()).await;

    assert_eq!(result.status, Classification::Good);
    assert_eq!(fetcher.issuer_calls(), 0);
}

#[tokio::test]
async fn test_ocsp_transport_error_is_retried() {
    let fetcher = MockFetcher::new(
        issuer_reply("certs/ca.der"),
        OcspMode::Fixed(Err(FetchError::Transport("connection refused".into()))),
    );
    let result = check("alice-aes.p12", PASSWORD, fetcher.clone()).await;

    assert_eq!(error_kind(&result), ErrorKind::OcspTransportError);
    assert!(ErrorKind::OcspTransportError.is_retryable());
    assert_eq!(fetcher.ocsp_calls(), 3);
}

#[tokio::test]
async fn test_garbage_response() {
    let fetcher = MockFetcher::new(issuer_reply("certs/ca.der"), OcspMode::Fixed(ocsp_reply("garbage.der")));
    let result = check("alice-aes.p12", PASSWORD, fetcher).await;
    assert_eq!(error_kind(&result), ErrorKind::OcspMalformedResponse);
}

#[tokio::test]
async fn test_wrong_content_type() {
    let fetcher = MockFetcher::new(
        issuer_reply("certs/ca.der"),
        OcspMode::Fixed(Ok(FetchedBody::new(Some("text/html"), fixture("ocsp/good.der")))),
    );
    let result = check("alice-aes.p12", PASSWORD, fetcher).await;
    assert_eq!(error_kind(&result), ErrorKind::OcspMalformedResponse);
}

#[tokio::test]
async fn test_post_refused_falls_back_to_get() {
    let fetcher = MockFetcher::new(issuer_reply("certs/ca.der"), OcspMode::GetOnly(ocsp_reply("good.der")));
    let result = check("alice-aes.p12", PASSWORD, fetcher.clone()).await;

    assert_eq!(result.status, Classification::Good);
    assert_eq!(fetcher.ocsp_calls(), 2);
    let urls = fetcher.get_urls.lock().unwrap();
    assert_eq!(urls.len(), 1);
    assert!(urls[0].starts_with(OCSP_URL));
    assert!(urls[0].len() > OCSP_URL.len());
}

#[tokio::test]
async fn test_get_method() {
    let fetcher = MockFetcher::new(issuer_reply("certs/ca.der"), OcspMode::GetOnly(ocsp_reply("good.der")));
    let config = CheckerConfig {
        ocsp_method: OcspMethod::Get,
        ..config()
    };
    let result = check_with(config, "alice-aes.p12", PASSWORD, fetcher.clone()).await;

    assert_eq!(result.status, Classification::Good);
    assert_eq!(fetcher.ocsp_calls(), 1);
}

#[tokio::test]
async fn test_sha256_cert_id() {
    let fetcher = MockFetcher::new(issuer_reply("certs/ca.der"), OcspMode::Fixed(ocsp_reply("good-sha256.der")));
    let config = CheckerConfig {
        hash_algorithm: certcheck_proto::HashAlgorithm::Sha256,
        ..config()
    };
    let result = check_with(config, "alice-aes.p12", PASSWORD, fetcher).await;
    assert_eq!(result.status, Classification::Good);
}

#[tokio::test]
async fn test_nonce_not_echoed_is_accepted() {
    let fetcher = MockFetcher::new(issuer_reply("certs/ca.der"), OcspMode::Fixed(ocsp_reply("good.der")));
    let config = CheckerConfig {
        enable_nonce: true,
        ..config()
    };
    let result = check_with(config, "alice-aes.p12", PASSWORD, fetcher).await;
    assert_eq!(result.status, Classification::Good);
}

#[tokio::test]
async fn test_oversized_upload() {
    let fetcher = MockFetcher::new(issuer_reply("certs/ca.der"), OcspMode::Fixed(ocsp_reply("good.der")));
    let config = CheckerConfig {
        max_container_size_bytes: 512,
        ..config()
    };
    let checker = Checker::with_fetcher(config, fetcher);
    let bytes = fixture("containers/alice-aes.p12");

    let result = checker.check_reader(bytes.as_slice(), PASSWORD).await;
    assert_eq!(error_kind(&result), ErrorKind::InvalidContainer);
}

#[tokio::test]
async fn test_check_reader() {
    let fetcher = MockFetcher::new(issuer_reply("certs/ca.der"), OcspMode::Fixed(ocsp_reply("good.der")));
    let checker = Checker::with_fetcher(config(), fetcher);
    let bytes = fixture("containers/alice-aes.p12");

    let result = checker.check_reader(bytes.as_slice(), PASSWORD).await;
    assert_eq!(result.status, Classification::Good);
}

#[tokio::test]
async fn test_stalled_upload_ends_the_check() {
    let fetcher = MockFetcher::new(issuer_reply("certs/ca.der"), OcspMode::Fixed(ocsp_reply("good.der")));
    let config = CheckerConfig {
        fetch_timeout_ms: 200,
        ..config()
    };
    let checker = Checker::with_fetcher(config, fetcher.clone());

    // Two bytes of a PFX header, then nothing while the writer stays open
    let (mut writer, reader) = tokio::io::duplex(1024);
    writer.write_all(&[0x30, 0x82]).await.unwrap();

    let result = tokio::time::timeout(Duration::from_secs(2), checker.check_reader(reader, PASSWORD))
        .await
        .expect("check_reader should give up on a stalled upload");
    assert_eq!(error_kind(&result), ErrorKind::InvalidContainer);
    assert!(result.certificate.is_none());
    assert_eq!(fetcher.issuer_calls(), 0);
    assert_eq!(fetcher.ocsp_calls(), 0);
    drop(writer);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_hundred_concurrent_checks() {
    let fetcher = MockFetcher::new(issuer_reply("certs/ca.der"), OcspMode::BySerial);
    let checker = Arc::new(Checker::with_fetcher(config(), fetcher.clone()));

    let mut tasks = JoinSet::new();
    for i in 0..100u32 {
        let checker = checker.clone();
        tasks.spawn(async move {
            let container = fixture(&format!("fleet/{:03}.p12", i));
            let password = format!("fleet-{:03}", i);
            (i, checker.check(container, &password).await)
        });
    }

    let mut seen = 0;
    while let Some(joined) = tasks.join_next().await {
        let (i, result) = joined.expect("check task");
        let summary = result.certificate.as_ref().expect("summary");
        assert_eq!(
            summary.common_name.as_deref(),
            Some(format!("fleet-{:03}.example", i).as_str())
        );
        assert_eq!(summary.serial_hex, format!("{:X}", 0x2000 + i));

        if i % 2 == 0 {
            assert_eq!(result.status, Classification::Good, "fleet {}", i);
        } else {
            assert_eq!(
                result.status,
                Classification::Revoked {
                    revoked_at: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
                    reason: Some(RevocationReason::Superseded),
                },
                "fleet {}",
                i
            );
        }
        seen += 1;
    }

    assert_eq!(seen, 100);
    assert_eq!(fetcher.issuer_calls(), 100);
    assert_eq!(fetcher.ocsp_calls(), 100);
}
