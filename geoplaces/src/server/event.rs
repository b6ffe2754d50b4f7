//! Events a country data server sends to the manager.
//!
//! Progress events narrate the startup pipeline; the exit event is sent by
//! the supervisor wrapper exactly once when the worker task finishes,
//! however it finishes. Events from distinct servers interleave arbitrarily
//! on the shared fleet channel; the manager applies them in arrival order.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::{ServerExit, ServerId};
use crate::index::CountryIndex;

/// Phase tag refining a country's current status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Substatus {
    CheckingForUpdate,
    CountryFileDownload,
    Init,
    CountryZipFile,
    CountryFile,
    FcpCountryFile,
    Running,
    NoCities,
    CountryFileError,
    FcpCountryFileError,
    CountryZipFileError,
    RetryLimitExceeded,
    /// Free-form tag for reasons outside the known taxonomy.
    Other(String),
}

impl fmt::Display for Substatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Substatus::CheckingForUpdate => write!(f, "checking_for_update"),
            Substatus::CountryFileDownload => write!(f, "country_file_download"),
            Substatus::Init => write!(f, "init"),
            Substatus::CountryZipFile => write!(f, "country_zip_file"),
            Substatus::CountryFile => write!(f, "country_file"),
            Substatus::FcpCountryFile => write!(f, "fcp_country_file"),
            Substatus::Running => write!(f, "running"),
            Substatus::NoCities => write!(f, "no_cities"),
            Substatus::CountryFileError => write!(f, "country_file_error"),
            Substatus::FcpCountryFileError => write!(f, "fcp_country_file_error"),
            Substatus::CountryZipFileError => write!(f, "country_zip_file_error"),
            Substatus::RetryLimitExceeded => write!(f, "retry_limit_exceeded"),
            Substatus::Other(tag) => write!(f, "{}", tag),
        }
    }
}

/// One event on the fleet channel.
#[derive(Debug, Clone)]
pub enum ServerEvent {
    /// Startup narration from a live worker.
    Progress(ProgressEvent),
    /// The worker task finished; sent by its supervisor exactly once.
    Exited { id: ServerId, exit: ServerExit },
}

/// Startup progress from a country data server.
///
/// The early update-check events identify themselves by country code (the
/// server may not have registered a handle the manager has observed yet);
/// everything later carries the server id.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// Probing the cache file and upstream validator token.
    CheckingForUpdate { code: String },
    /// A full download is required.
    Downloading { code: String },
    /// Worker is alive; progress restarts at zero.
    Init { id: ServerId, at: DateTime<Utc> },
    /// A pipeline stage finished; progress accumulates by `delta`.
    Delta {
        id: ServerId,
        substatus: Substatus,
        delta: u8,
    },
    /// An auxiliary task was spawned during startup.
    Child {
        id: ServerId,
        substatus: Substatus,
        child: String,
    },
    /// The whole build phase is complete; progress jumps to 100.
    PhaseComplete { id: ServerId, substatus: Substatus },
    /// The index is built; the country is serving searches.
    Running {
        id: ServerId,
        index: Arc<CountryIndex>,
        at: DateTime<Utc>,
    },
}
