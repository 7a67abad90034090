//! Certificate Revocation Checker
//!
//! This crate runs the network half of a revocation check on top of the
//! `certcheck-proto` primitives: it opens a PKCS#12 container, follows the
//! certificate's Authority Information Access URLs, fetches the issuer,
//! exchanges an OCSP request with the responder and classifies the answer.
//!
//! # Features
//!
//! - Async I/O with Tokio, each network call bounded by a timeout
//! - Pluggable transport via the [`Fetcher`] trait
//! - Bounded retries with exponential backoff for transient failures
//! - Per-check scoped upload storage
//! - JSON configuration with environment overrides
//!
//! # Example
//!
//! ```rust,no_run
//! use certcheck::{Checker, CheckerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let checker = Checker::new(CheckerConfig::default())?;
//!
//!     let container = std::fs::read("client.p12")?;
//!     let result = checker.check(container, "password").await;
//!
//!     println!("{}", serde_json::to_string_pretty(&result)?);
//!     Ok(())
//! }
//! ```

pub mod checker;
pub mod config;
pub mod fetch;
pub mod retry;
pub mod upload;

pub use certcheck_proto::{CheckError, CheckResult, Classification, ErrorKind};
pub use checker::Checker;
pub use config::{CheckerConfig, ConfigError, OcspMethod};
pub use fetch::{FetchError, FetchedBody, Fetcher, HttpFetcher};
pub use retry::RetryPolicy;
pub use upload::{ScopedUpload, UploadError};
