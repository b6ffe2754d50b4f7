//! Request handlers of the admin and search surface.
//!
//! Every handler performs exactly one await against the country manager and
//! renders the reply. A vanished manager surfaces as 503 on the read paths
//! and as an error envelope on the command path.

use axum::extract::{Path, Query};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::{Extension, Json};
use serde_json::json;

use super::types::{CityObject, CmdParams, CommandEnvelope, SearchParams, StatusResponse};
use crate::format::format_bytes;
use crate::index::SearchQuery;
use crate::manager::{CountryReply, ManagerHandle, ManagerUnavailable, SortColumn, SortDirection};
use crate::system::process_resident_bytes;

/// Minimum length of a search term.
const SEARCH_TERM_MIN: usize = 3;

/// GET `/search?search_term=&starts_with=&whole_word=`
pub async fn handle_search(
    Query(params): Query<SearchParams>,
    Extension(manager): Extension<ManagerHandle>,
) -> Response {
    if params.search_term.chars().count() < SEARCH_TERM_MIN {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": format!("search_term must be at least {} characters", SEARCH_TERM_MIN)
            })),
        )
            .into_response();
    }

    let query = SearchQuery::new(
        &params.search_term,
        params.starts_with.unwrap_or(false),
        params.whole_word.unwrap_or(false),
    );

    match manager.loaded_indexes().await {
        Ok(indexes) => {
            let cities: Vec<CityObject> = indexes
                .iter()
                .flat_map(|index| index.search(&query))
                .map(CityObject::from)
                .collect();
            Json(cities).into_response()
        }
        Err(ManagerUnavailable) => StatusCode::SERVICE_UNAVAILABLE.into_response(),
    }
}

/// GET `/server_status`
pub async fn handle_server_status(Extension(manager): Extension<ManagerHandle>) -> Response {
    match manager.status().await {
        Ok(snapshot) => Json(StatusResponse {
            country_manager_trace: snapshot.trace,
            process_memory_usage: format_bytes(process_resident_bytes()),
            servers: snapshot.servers,
        })
        .into_response(),
        Err(ManagerUnavailable) => StatusCode::SERVICE_UNAVAILABLE.into_response(),
    }
}

/// GET `/server_info`
pub async fn handle_server_info() -> Html<&'static str> {
    Html(include_str!("server_info.html"))
}

/// GET `/cmd/:action?code=&value=&direction=&column=`
pub async fn handle_cmd(
    Path(action): Path<String>,
    Query(params): Query<CmdParams>,
    Extension(manager): Extension<ManagerHandle>,
) -> Json<CommandEnvelope> {
    Json(run_command(&action, params, &manager).await)
}

async fn run_command(action: &str, params: CmdParams, manager: &ManagerHandle) -> CommandEnvelope {
    match action {
        "start" => {
            let Some(code) = params.code else {
                return CommandEnvelope::error(action, "missing_country_code");
            };
            country_envelope(action, manager.start(&code).await)
        }
        "start_all" => list_envelope(action, manager.start_all().await),
        "stop" => {
            let Some(code) = params.code else {
                return CommandEnvelope::error(action, "missing_country_code");
            };
            country_envelope(action, manager.shutdown(&code).await)
        }
        "stop_all" => list_envelope(action, manager.shutdown_all().await),
        "reset" => {
            let Some(code) = params.code else {
                return CommandEnvelope::error(action, "missing_country_code");
            };
            country_envelope(action, manager.reset(&code).await)
        }
        "reset_all" => list_envelope(action, manager.reset_all().await),
        "trace" => {
            let enabled = match params.value.as_deref() {
                Some("on") => true,
                Some("off") => false,
                _ => return CommandEnvelope::error(action, "missing_trace_value"),
            };
            match params.code {
                Some(code) => {
                    country_envelope(action, manager.set_country_trace(&code, enabled).await)
                }
                None => match manager.set_trace(enabled).await {
                    Ok(enabled) => CommandEnvelope::ok(action, json!({ "trace": enabled })),
                    Err(ManagerUnavailable) => unavailable(action),
                },
            }
        }
        "sort" => {
            let direction = SortDirection::parse(params.direction.as_deref().unwrap_or_default());
            let Some(column) = params.column.as_deref().and_then(SortColumn::parse) else {
                return CommandEnvelope::error(action, "unknown_sort_column");
            };
            list_envelope(action, manager.sort(direction, column).await)
        }
        "terminate" => match manager.terminate().await {
            Ok(()) => CommandEnvelope::goodbye(action),
            Err(ManagerUnavailable) => unavailable(action),
        },
        _ => CommandEnvelope::error(action, "unknown_command"),
    }
}

fn country_envelope(
    action: &str,
    outcome: Result<CountryReply, ManagerUnavailable>,
) -> CommandEnvelope {
    match outcome {
        Ok(Ok(view)) => match serde_json::to_value(view) {
            Ok(payload) => CommandEnvelope::ok(action, payload),
            Err(e) => CommandEnvelope::error(action, &e.to_string()),
        },
        Ok(Err(reason)) => CommandEnvelope::error(action, &reason.to_string()),
        Err(ManagerUnavailable) => unavailable(action),
    }
}

fn list_envelope<T: serde::Serialize>(
    action: &str,
    outcome: Result<T, ManagerUnavailable>,
) -> CommandEnvelope {
    match outcome {
        Ok(list) => match serde_json::to_value(list) {
            Ok(payload) => CommandEnvelope::ok(action, payload),
            Err(e) => CommandEnvelope::error(action, &e.to_string()),
        },
        Err(ManagerUnavailable) => unavailable(action),
    }
}

fn unavailable(action: &str) -> CommandEnvelope {
    CommandEnvelope::error(action, "country_manager_unavailable")
}
