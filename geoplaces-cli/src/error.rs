//! CLI error handling with user-friendly messages.

use std::fmt;
use std::process;

use geoplaces::store::StoreError;
use geoplaces::upstream::UpstreamError;

/// CLI-specific errors.
#[derive(Debug)]
pub enum CliError {
    /// Configuration problem (bad flag values, unreadable paths)
    Config(String),
    /// Catalog file could not be read or parsed
    Catalog(String),
    /// Upstream HTTP client could not be created
    Upstream(UpstreamError),
    /// Document store could not be opened
    Store(StoreError),
    /// HTTP surface could not bind
    Bind(std::io::Error),
    /// The country manager task died
    ManagerCrashed(String),
}

impl CliError {
    /// Exit the process with an error message and a non-zero code.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {}", self);

        if let CliError::Catalog(_) = self {
            eprintln!();
            eprintln!("The catalog is the geonames countryInfo.txt file:");
            eprintln!("  http://download.geonames.org/export/dump/countryInfo.txt");
            eprintln!("Download it and point --catalog at the local copy.");
        }

        process::exit(1)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::Catalog(msg) => write!(f, "Catalog error: {}", msg),
            CliError::Upstream(e) => write!(f, "Upstream client error: {}", e),
            CliError::Store(e) => write!(f, "Document store error: {}", e),
            CliError::Bind(e) => write!(f, "Could not bind HTTP listener: {}", e),
            CliError::ManagerCrashed(msg) => write!(f, "Country manager crashed: {}", msg),
        }
    }
}

impl std::error::Error for CliError {}
