//! Per-country status records.
//!
//! One [`CountryStatus`] exists per catalog entry for the entire process
//! lifetime. Only the manager task ever touches one; everything else reads
//! [`CountryStatusView`] snapshots.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::catalog::Country;
use crate::index::CountryIndex;
use crate::server::{server_name, ServerHandle, Substatus};

/// Lifecycle state of a country's data server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerStatus {
    Stopped,
    Starting,
    Started,
    Crashed,
}

impl fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerStatus::Stopped => write!(f, "stopped"),
            ServerStatus::Starting => write!(f, "starting"),
            ServerStatus::Started => write!(f, "started"),
            ServerStatus::Crashed => write!(f, "crashed"),
        }
    }
}

/// The manager's record for one country.
#[derive(Debug)]
pub struct CountryStatus {
    /// ISO-2 code, uppercase. Never mutates.
    pub country_code: String,
    /// Registered data-server name, derived from the code. Never mutates.
    pub server_name: String,
    pub country_name: String,
    pub continent: String,
    /// Present exactly while a data server is live (starting or started).
    pub handle: Option<ServerHandle>,
    pub status: ServerStatus,
    pub substatus: Option<Substatus>,
    /// 0..=100; 100 exactly when started, 0 when stopped.
    pub progress: u8,
    /// Opaque child task identifiers recorded during startup.
    pub children: Vec<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub startup_time: Option<Duration>,
    pub city_count: Option<usize>,
    pub mem_usage: Option<u64>,
    pub trace: bool,
    /// The loaded index, present exactly while started.
    pub index: Option<Arc<CountryIndex>>,
}

impl CountryStatus {
    /// The initial record for a catalog entry.
    pub fn initial(country: &Country) -> Self {
        Self {
            country_code: country.code.clone(),
            server_name: server_name(&country.code),
            country_name: country.name.clone(),
            continent: country.continent.clone(),
            handle: None,
            status: ServerStatus::Stopped,
            substatus: None,
            progress: 0,
            children: Vec::new(),
            started_at: None,
            startup_time: None,
            city_count: None,
            mem_usage: Some(0),
            trace: false,
            index: None,
        }
    }

    /// Whether a data server is currently live for this country.
    pub fn is_live(&self) -> bool {
        matches!(self.status, ServerStatus::Starting | ServerStatus::Started)
    }

    /// Apply an orderly stop: runtime state resets to its initial shape,
    /// identity survives.
    pub fn apply_stop(&mut self, substatus: Option<Substatus>) {
        self.handle = None;
        self.index = None;
        self.status = ServerStatus::Stopped;
        self.substatus = substatus;
        self.progress = 0;
        self.children.clear();
        self.started_at = None;
        self.startup_time = None;
        self.city_count = None;
        self.mem_usage = Some(0);
        self.trace = false;
    }

    /// Apply a crash: the record keeps its last progress for diagnostics but
    /// loses children, trace, and measurements.
    pub fn apply_crash(&mut self, substatus: Substatus) {
        self.handle = None;
        self.index = None;
        self.status = ServerStatus::Crashed;
        self.substatus = Some(substatus);
        self.children.clear();
        self.started_at = None;
        self.startup_time = None;
        self.city_count = None;
        self.mem_usage = None;
        self.trace = false;
    }

    /// Snapshot for readers outside the manager task.
    pub fn view(&self) -> CountryStatusView {
        CountryStatusView {
            country_code: self.country_code.clone(),
            server_name: self.server_name.clone(),
            country_name: self.country_name.clone(),
            continent: self.continent.clone(),
            status: self.status,
            substatus: self.substatus.as_ref().map(|s| s.to_string()),
            progress: self.progress,
            children: self.children.clone(),
            started_at: self.started_at.map(|at| at.to_rfc3339()),
            startup_time_ms: self.startup_time.map(|d| d.as_millis() as u64),
            startup_time: self.startup_time.map(crate::format::format_duration),
            city_count: self.city_count,
            mem_usage: self.mem_usage,
            trace: self.trace,
        }
    }
}

/// Immutable snapshot of one country's status.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CountryStatusView {
    pub country_code: String,
    pub server_name: String,
    pub country_name: String,
    pub continent: String,
    pub status: ServerStatus,
    pub substatus: Option<String>,
    pub progress: u8,
    pub children: Vec<String>,
    pub started_at: Option<String>,
    pub startup_time_ms: Option<u64>,
    /// Human-readable rendering of `startup_time_ms`.
    pub startup_time: Option<String>,
    pub city_count: Option<usize>,
    pub mem_usage: Option<u64>,
    pub trace: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gb() -> Country {
        Country::new("GB", "United Kingdom", "Europe")
    }

    #[test]
    fn test_initial_record_shape() {
        let status = CountryStatus::initial(&gb());
        assert_eq!(status.country_code, "GB");
        assert_eq!(status.server_name, "country_server_gb");
        assert_eq!(status.status, ServerStatus::Stopped);
        assert_eq!(status.progress, 0);
        assert!(status.handle.is_none());
        assert_eq!(status.mem_usage, Some(0));
    }

    #[test]
    fn test_stop_resets_to_initial_shape() {
        let mut status = CountryStatus::initial(&gb());
        status.status = ServerStatus::Started;
        status.progress = 100;
        status.city_count = Some(42);
        status.startup_time = Some(Duration::from_secs(3));
        status.started_at = Some(Utc::now());
        status.children.push("country_server_gb:scan:1".to_string());
        status.mem_usage = Some(9000);
        status.trace = true;

        status.apply_stop(None);

        let initial = CountryStatus::initial(&gb());
        assert_eq!(status.view(), initial.view());
    }

    #[test]
    fn test_crash_clears_measurements_but_keeps_progress() {
        let mut status = CountryStatus::initial(&gb());
        status.status = ServerStatus::Starting;
        status.progress = 30;
        status.children.push("country_server_gb:unzip:1".to_string());
        status.trace = true;

        status.apply_crash(Substatus::RetryLimitExceeded);

        assert_eq!(status.status, ServerStatus::Crashed);
        assert_eq!(status.progress, 30);
        assert!(status.children.is_empty());
        assert!(!status.trace);
        assert_eq!(status.mem_usage, None);
        assert_eq!(
            status.view().substatus.as_deref(),
            Some("retry_limit_exceeded")
        );
    }

    #[test]
    fn test_view_renders_startup_time() {
        let mut status = CountryStatus::initial(&gb());
        assert_eq!(status.view().startup_time, None);

        status.startup_time = Some(Duration::from_millis(2500));
        let view = status.view();
        assert_eq!(view.startup_time_ms, Some(2500));
        assert_eq!(view.startup_time.as_deref(), Some("2.5s"));
    }

    #[test]
    fn test_view_serializes_status_lowercase() {
        let status = CountryStatus::initial(&gb());
        let json = serde_json::to_value(status.view()).unwrap();
        assert_eq!(json["status"], "stopped");
        assert_eq!(json["country_code"], "GB");
    }
}
