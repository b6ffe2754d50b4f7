//! Upstream geonames access.
//!
//! The data servers reach the geonames export dump through the
//! [`GeonamesClient`] trait. The trait exists for dependency injection:
//! production uses the reqwest-backed implementation (routed through the
//! configured forward proxy); tests inject mocks that fail on demand.

use std::future::Future;

use tracing::{debug, warn};

use crate::config::Settings;

/// Base URL of the geonames export dump.
pub const GEONAMES_DUMP_URL: &str = "http://download.geonames.org/export/dump";

/// Default User-Agent for upstream requests.
const DEFAULT_USER_AGENT: &str = concat!("geoplaces/", env!("CARGO_PKG_VERSION"));

/// Errors from upstream access.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UpstreamError {
    /// Request could not be sent or the response body not read.
    #[error("HTTP error: {0}")]
    Http(String),
    /// The upstream answered with a non-success status.
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },
    /// The client itself could not be constructed.
    #[error("failed to create HTTP client: {0}")]
    Client(String),
}

/// A downloaded country archive plus the validator token it was served under.
#[derive(Debug, Clone)]
pub struct ZipDownload {
    /// Raw bytes of the `<CC>.zip` archive.
    pub bytes: Vec<u8>,
    /// Entity tag from the response, when the upstream sent one.
    pub etag: Option<String>,
}

/// Trait for asynchronous geonames dump access.
pub trait GeonamesClient: Send + Sync + 'static {
    /// Fetch the current validator token for a country's ZIP without
    /// downloading the body.
    ///
    /// Returns `None` when the upstream does not expose a token.
    fn head_etag(
        &self,
        country_code: &str,
    ) -> impl Future<Output = Result<Option<String>, UpstreamError>> + Send;

    /// Download a country's ZIP archive.
    fn fetch_zip(
        &self,
        country_code: &str,
    ) -> impl Future<Output = Result<ZipDownload, UpstreamError>> + Send;
}

/// Real geonames client backed by reqwest.
///
/// All requests go through the forward proxy from [`Settings`] when one is
/// configured.
#[derive(Clone)]
pub struct ReqwestGeonamesClient {
    client: reqwest::Client,
}

impl ReqwestGeonamesClient {
    /// Create a client from service settings (proxy, timeout).
    pub fn new(settings: &Settings) -> Result<Self, UpstreamError> {
        let mut builder = reqwest::Client::builder()
            .timeout(settings.http_timeout)
            .user_agent(DEFAULT_USER_AGENT);

        if let Some(proxy) = &settings.proxy {
            let url = format!("http://{}:{}", proxy.host, proxy.port);
            builder = builder.proxy(
                reqwest::Proxy::http(&url).map_err(|e| UpstreamError::Client(e.to_string()))?,
            );
        }

        let client = builder
            .build()
            .map_err(|e| UpstreamError::Client(e.to_string()))?;

        Ok(Self { client })
    }

    fn zip_url(country_code: &str) -> String {
        format!("{}/{}.zip", GEONAMES_DUMP_URL, country_code.to_uppercase())
    }
}

impl GeonamesClient for ReqwestGeonamesClient {
    async fn head_etag(&self, country_code: &str) -> Result<Option<String>, UpstreamError> {
        let url = Self::zip_url(country_code);
        debug!(url = %url, "HEAD request for validator token");

        let response = self
            .client
            .head(&url)
            .send()
            .await
            .map_err(|e| UpstreamError::Http(e.to_string()))?;

        if !response.status().is_success() {
            warn!(url = %url, status = response.status().as_u16(), "HEAD failed");
            return Err(UpstreamError::Status {
                status: response.status().as_u16(),
                url,
            });
        }

        Ok(extract_etag(response.headers()))
    }

    async fn fetch_zip(&self, country_code: &str) -> Result<ZipDownload, UpstreamError> {
        let url = Self::zip_url(country_code);
        debug!(url = %url, "GET country archive");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| UpstreamError::Http(e.to_string()))?;

        if !response.status().is_success() {
            warn!(url = %url, status = response.status().as_u16(), "GET failed");
            return Err(UpstreamError::Status {
                status: response.status().as_u16(),
                url,
            });
        }

        let etag = extract_etag(response.headers());
        let bytes = response
            .bytes()
            .await
            .map_err(|e| UpstreamError::Http(format!("failed to read response: {}", e)))?;

        debug!(url = %url, bytes = bytes.len(), "archive downloaded");
        Ok(ZipDownload {
            bytes: bytes.to_vec(),
            etag,
        })
    }
}

fn extract_etag(headers: &reqwest::header::HeaderMap) -> Option<String> {
    headers
        .get(reqwest::header::ETAG)
        .and_then(|value| value.to_str().ok())
        .map(String::from)
}
