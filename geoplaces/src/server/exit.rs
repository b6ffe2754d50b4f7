//! Terminal exit reasons for a country data server.

use std::path::PathBuf;

/// Why a country data server terminated.
///
/// Orderly outcomes (`Stopped`, `NoCities`) identify themselves by server
/// name; failure outcomes are attributed by the manager through the live
/// handle they arrived under.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ServerExit {
    /// Orderly shutdown.
    #[error("{name} stopped")]
    Stopped { name: String },

    /// The country holds no qualifying populated places. A normal outcome
    /// for some countries, not a failure.
    #[error("{name} holds no qualifying cities")]
    NoCities { name: String },

    /// The raw country dump was malformed.
    #[error("country file error: {reason}")]
    CountryFileError { reason: String },

    /// The on-disk cache file could not be read back.
    #[error("cached country file error: {reason}")]
    FcpCountryFileError { reason: String },

    /// The downloaded archive could not be extracted.
    #[error("country zip file error at {}: {reason}", .path.display())]
    CountryZipFileError { path: PathBuf, reason: String },

    /// Every download attempt failed.
    #[error("retry limit exceeded downloading {code}.{ext}")]
    RetryLimitExceeded { code: String, ext: String },

    /// Anything else, including worker panics.
    #[error("{0}")]
    Error(String),
}
