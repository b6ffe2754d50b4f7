//! Wire types of the HTTP surface.

use serde::{Deserialize, Serialize};

use crate::manager::CountryStatusView;
use crate::records::CityRecord;

/// One search hit, in the wire shape clients expect.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CityObject {
    pub name: String,
    pub lat: f64,
    pub lng: f64,
    pub feature_class: String,
    pub feature_code: String,
    pub country_code: String,
    pub admin1_txt: String,
    pub admin2_txt: String,
    pub admin3_txt: String,
    pub admin4_txt: String,
    pub timezone: String,
}

impl From<&CityRecord> for CityObject {
    fn from(record: &CityRecord) -> Self {
        Self {
            name: record.name.clone(),
            lat: record.lat,
            lng: record.lng,
            feature_class: record.feature_class.to_string(),
            feature_code: record.feature_code.clone(),
            country_code: record.country_code.clone(),
            admin1_txt: record.admin1.clone(),
            admin2_txt: record.admin2.clone(),
            admin3_txt: record.admin3.clone(),
            admin4_txt: record.admin4.clone(),
            timezone: record.timezone.clone(),
        }
    }
}

/// Query parameters of `/search`.
#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub search_term: String,
    pub starts_with: Option<bool>,
    pub whole_word: Option<bool>,
}

/// Query parameters of `/cmd/:action`.
#[derive(Debug, Deserialize)]
pub struct CmdParams {
    pub code: Option<String>,
    pub value: Option<String>,
    pub direction: Option<String>,
    pub column: Option<String>,
}

/// Reply body of `/server_status`.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub country_manager_trace: bool,
    /// Process resident total, rendered in binary units.
    pub process_memory_usage: String,
    pub servers: Vec<CountryStatusView>,
}

/// Envelope every admin command reply is wrapped in.
#[derive(Debug, Clone, Serialize)]
pub struct CommandEnvelope {
    pub from_server: String,
    pub cmd: String,
    /// `ok`, `error`, or `goodbye`.
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl CommandEnvelope {
    const FROM: &'static str = "country_manager";

    pub fn ok(cmd: &str, payload: serde_json::Value) -> Self {
        Self {
            from_server: Self::FROM.to_string(),
            cmd: cmd.to_string(),
            status: "ok".to_string(),
            payload: Some(payload),
            reason: None,
        }
    }

    pub fn error(cmd: &str, reason: &str) -> Self {
        Self {
            from_server: Self::FROM.to_string(),
            cmd: cmd.to_string(),
            status: "error".to_string(),
            payload: None,
            reason: Some(reason.to_string()),
        }
    }

    pub fn goodbye(cmd: &str) -> Self {
        Self {
            from_server: Self::FROM.to_string(),
            cmd: cmd.to_string(),
            status: "goodbye".to_string(),
            payload: None,
            reason: None,
        }
    }
}
