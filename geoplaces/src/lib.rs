//! GeoPlaces - Geographic search over the geonames populated-places dataset
//!
//! This library provides the core functionality for a geographic search
//! service: a country manager coordinates a fleet of per-country data
//! servers, each of which downloads, filters, and caches its country's
//! populated places into an in-memory index that search requests query.
//!
//! # High-Level API
//!
//! ```ignore
//! use geoplaces::catalog::CatalogParser;
//! use geoplaces::config::Settings;
//! use geoplaces::manager::CountryManager;
//! use geoplaces::store::JsonFileStore;
//! use geoplaces::upstream::ReqwestGeonamesClient;
//!
//! let settings = Arc::new(Settings::default());
//! let catalog = CatalogParser::parse_all(File::open(&settings.catalog_file)?)?;
//! let client = Arc::new(ReqwestGeonamesClient::new(&settings)?);
//! let store = Arc::new(JsonFileStore::new(settings.data_dir.join("store"))?);
//!
//! let (handle, manager) = CountryManager::spawn(catalog, settings, client, store);
//! handle.start("GB").await?;
//! ```

pub mod catalog;
pub mod config;
pub mod format;
pub mod http;
pub mod index;
pub mod manager;
pub mod records;
pub mod server;
pub mod store;
pub mod system;
pub mod upstream;

/// Version of the GeoPlaces library and CLI.
///
/// This is synchronized across all components in the workspace.
/// The version is defined in `Cargo.toml` and injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
