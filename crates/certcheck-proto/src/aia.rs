//! Authority Information Access extraction (RFC 5280 section 4.2.2.1)
//!
//! Finds where to fetch the issuer certificate (caIssuers) and where to send
//! the OCSP request. Only `http` and `https` URIs are usable; LDAP and other
//! schemes are skipped so a later HTTP entry of the same kind can win.

use tracing::debug;
use url::Url;
use x509_parser::extensions::{AuthorityInfoAccess, GeneralName};
use x509_parser::oid_registry::asn1_rs::oid;
use x509_parser::prelude::FromDer;

use crate::certificate::Certificate;
use crate::oids;

/// Usable AIA locations of a certificate
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AiaUrls {
    /// True when the certificate has an AIA extension at all
    pub present: bool,
    /// First HTTP(S) caIssuers URL
    pub ca_issuer: Option<Url>,
    /// First HTTP(S) OCSP URL
    pub ocsp: Option<Url>,
}

fn http_url(uri: &str) -> Option<Url> {
    match Url::parse(uri) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Some(url),
        Ok(url) => {
            debug!(scheme = url.scheme(), "skipping non-HTTP AIA location");
            None
        }
        Err(e) => {
            debug!(uri = uri, error = %e, "skipping unparseable AIA location");
            None
        }
    }
}

/// Extract the caIssuers and OCSP URLs from a certificate
///
/// Absence of the extension, or of either access method, is not an error:
/// the corresponding field is simply `None`.
pub fn extract_aia_urls(cert: &Certificate) -> AiaUrls {
    let mut urls = AiaUrls::default();

    let ocsp_oid = oid!(1.3.6.1.5.5.7.48.1);
    let ca_issuers_oid = oid!(1.3.6.1.5.5.7.48.2);

    for ext in cert.extensions().iter().filter(|ext| ext.oid == oids::AUTHORITY_INFO_ACCESS) {
        urls.present = true;

        let aia = match AuthorityInfoAccess::from_der(&ext.value) {
            Ok((_, aia)) => aia,
            Err(e) => {
                debug!(error = %e, "malformed AIA extension");
                continue;
            }
        };

        for access_desc in aia.accessdescs.iter() {
            let GeneralName::URI(uri) = &access_desc.access_location else {
                continue;
            };
            if access_desc.access_method == ocsp_oid && urls.ocsp.is_none() {
                urls.ocsp = http_url(uri);
            } else if access_desc.access_method == ca_issuers_oid && urls.ca_issuer.is_none() {
                urls.ca_issuer = http_url(uri);
            }
        }
    }

    urls
}
