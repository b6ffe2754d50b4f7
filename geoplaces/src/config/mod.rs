//! Service configuration.
//!
//! Pure data types describing where the service finds its inputs and how the
//! per-country startup pipeline behaves. Defaults match the production
//! geonames deployment; the CLI overrides individual fields from flags.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Minimum population for a place to be retained in a country index.
pub const DEFAULT_POPULATION_MIN: i64 = 500;

/// Number of download attempts before a country server gives up.
pub const DEFAULT_RETRY_LIMIT: u32 = 3;

/// Fixed backoff between download attempts.
pub const DEFAULT_RETRY_WAIT: Duration = Duration::from_millis(5000);

/// Age beyond which a cached country file is revalidated upstream.
pub const DEFAULT_CACHE_STALENESS: Duration = Duration::from_secs(24 * 60 * 60);

/// Forward proxy used for all upstream geonames requests.
#[derive(Debug, Clone)]
pub struct ProxySettings {
    /// Proxy host name or address.
    pub host: String,
    /// Proxy port.
    pub port: u16,
}

/// Complete service configuration.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Path to the geonames `countryInfo.txt` catalog file.
    pub catalog_file: PathBuf,
    /// Directory holding per-country cache files and the document store.
    pub data_dir: PathBuf,
    /// Address the HTTP surface binds to.
    pub bind_addr: SocketAddr,
    /// Forward proxy for upstream downloads, if any.
    pub proxy: Option<ProxySettings>,
    /// Minimum population for retained places.
    pub population_min: i64,
    /// Download attempts before a country server gives up.
    pub retry_limit: u32,
    /// Fixed backoff between download attempts.
    pub retry_wait: Duration,
    /// Age beyond which a cached country file is revalidated upstream.
    pub cache_staleness: Duration,
    /// Timeout for individual upstream HTTP requests.
    pub http_timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            catalog_file: PathBuf::from("data/countryInfo.txt"),
            data_dir: PathBuf::from("data"),
            bind_addr: "127.0.0.1:8080".parse().expect("static bind address"),
            proxy: None,
            population_min: DEFAULT_POPULATION_MIN,
            retry_limit: DEFAULT_RETRY_LIMIT,
            retry_wait: DEFAULT_RETRY_WAIT,
            cache_staleness: DEFAULT_CACHE_STALENESS,
            http_timeout: Duration::from_secs(30),
        }
    }
}
