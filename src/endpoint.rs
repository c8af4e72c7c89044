/// HTTP endpoint for querying station readings
///
/// A small JSON API over `Monitor` for dashboards and analysis scripts.
///
/// Endpoints:
/// - GET /health - Service health check
/// - GET /stations - Station names and their candidate codes
/// - GET /reading?station=NAME&provider=hrfco&hours=6 - Latest normalized reading
/// - GET /joined?station=NAME&hours=24&limit=25 - Joined level/quality series
///
/// Requests are served one at a time; each one can take several provider
/// round trips, and the courtesy gates would serialize them anyway.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

use crate::model::{FailureReport, Provider, Reading, StationFailure, TimeRange, MAX_WINDOW_HOURS};
use crate::service::Monitor;

const DEFAULT_HOURS: i64 = 6;

// ---------------------------------------------------------------------------
// Response Types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct ReadingResponse {
    pub station: String,
    pub reading: Reading,
}

#[derive(Debug, Serialize)]
pub struct StationSummary {
    pub name: String,
    pub address: Option<String>,
    pub datum_offset_m: Option<f64>,
    pub codes: HashMap<Provider, Vec<String>>,
}

// ---------------------------------------------------------------------------
// Query parsing
// ---------------------------------------------------------------------------

/// Splits a request URL into its path and decoded query parameters.
pub fn parse_query(url: &str) -> (&str, HashMap<String, String>) {
    let (path, query) = url.split_once('?').unwrap_or((url, ""));
    let params = query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            let key = urlencoding::decode(&key.replace('+', " ")).ok()?.into_owned();
            let value = urlencoding::decode(&value.replace('+', " ")).ok()?.into_owned();
            Some((key, value))
        })
        .collect();
    (path, params)
}

fn hours_param(params: &HashMap<String, String>) -> Result<i64, String> {
    match params.get("hours") {
        None => Ok(DEFAULT_HOURS),
        Some(raw) => match raw.trim().parse::<i64>() {
            Ok(h) if (1..=MAX_WINDOW_HOURS).contains(&h) => Ok(h),
            _ => Err(format!("hours must be an integer between 1 and {}", MAX_WINDOW_HOURS)),
        },
    }
}

fn station_param(params: &HashMap<String, String>) -> Result<&str, String> {
    params
        .get("station")
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| "missing required parameter: station".to_string())
}

fn bad_request(message: String) -> (u16, serde_json::Value) {
    (400, serde_json::json!({ "error": message }))
}

fn failure_response(failure: &StationFailure) -> (u16, serde_json::Value) {
    let status = match failure {
        StationFailure::UnknownStation { .. } => 404,
        _ => 503,
    };
    let report = FailureReport::from(failure);
    (status, serde_json::to_value(&report).unwrap_or_else(|_| serde_json::json!({ "error": report.message })))
}

// ---------------------------------------------------------------------------
// Routing
// ---------------------------------------------------------------------------

/// Dispatches one request. Returns the status code and JSON body.
pub fn route(monitor: &Monitor, url: &str, now: DateTime<Utc>) -> (u16, serde_json::Value) {
    let (path, params) = parse_query(url);

    match path {
        "/health" => handle_health(monitor),
        "/stations" => handle_stations(monitor),
        "/reading" => handle_reading(monitor, &params, now),
        "/joined" => handle_joined(monitor, &params, now),
        _ => (
            404,
            serde_json::json!({
                "error": "Not found",
                "available_endpoints": ["/health", "/stations", "/reading", "/joined"]
            }),
        ),
    }
}

fn handle_health(monitor: &Monitor) -> (u16, serde_json::Value) {
    (
        200,
        serde_json::json!({
            "status": "ok",
            "service": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
            "stations": monitor.directory().len(),
        }),
    )
}

fn handle_stations(monitor: &Monitor) -> (u16, serde_json::Value) {
    let stations: Vec<StationSummary> = monitor
        .directory()
        .stations()
        .iter()
        .map(|s| StationSummary {
            name: s.name.clone(),
            address: s.address.clone(),
            datum_offset_m: s.datum_offset,
            codes: Provider::ALL
                .iter()
                .filter(|p| !s.candidates(**p).is_empty())
                .map(|p| (*p, s.candidates(*p).to_vec()))
                .collect(),
        })
        .collect();
    (200, serde_json::json!({ "stations": stations }))
}

fn handle_reading(
    monitor: &Monitor,
    params: &HashMap<String, String>,
    now: DateTime<Utc>,
) -> (u16, serde_json::Value) {
    let station = match station_param(params) {
        Ok(s) => s,
        Err(e) => return bad_request(e),
    };
    let provider = match params.get("provider") {
        None => monitor.level_provider(),
        Some(raw) => match raw.parse::<Provider>() {
            Ok(p) => p,
            Err(e) => return bad_request(e),
        },
    };
    let hours = match hours_param(params) {
        Ok(h) => h,
        Err(e) => return bad_request(e),
    };

    let range = TimeRange::trailing_hours(now, hours);
    match monitor.request_reading(station, provider, range) {
        Ok(reading) => {
            let body = ReadingResponse {
                station: station.to_string(),
                reading,
            };
            match serde_json::to_value(&body) {
                Ok(json) => (200, json),
                Err(e) => (500, serde_json::json!({ "error": e.to_string() })),
            }
        }
        Err(failure) => failure_response(&failure),
    }
}

fn handle_joined(
    monitor: &Monitor,
    params: &HashMap<String, String>,
    now: DateTime<Utc>,
) -> (u16, serde_json::Value) {
    let station = match station_param(params) {
        Ok(s) => s,
        Err(e) => return bad_request(e),
    };
    let hours = match hours_param(params) {
        Ok(h) => h,
        Err(e) => return bad_request(e),
    };
    let limit = match params.get("limit") {
        None => monitor.quality_limit(),
        Some(raw) => match raw.trim().parse::<f64>() {
            Ok(l) if l.is_finite() => l,
            _ => return bad_request("limit must be a number".to_string()),
        },
    };

    let range = TimeRange::trailing_hours(now, hours);
    match monitor.request_joined_series(station, range, limit) {
        Ok(series) => match serde_json::to_value(series.to_response()) {
            Ok(json) => (200, json),
            Err(e) => (500, serde_json::json!({ "error": e.to_string() })),
        },
        Err(failure) => failure_response(&failure),
    }
}

// ---------------------------------------------------------------------------
// HTTP Server
// ---------------------------------------------------------------------------

/// Start HTTP endpoint server on the specified port. Blocks.
pub fn start_endpoint_server(port: u16, monitor: Arc<Monitor>) -> Result<(), String> {
    let server = tiny_http::Server::http(format!("0.0.0.0:{}", port))
        .map_err(|e| format!("Failed to start HTTP server: {}", e))?;

    tracing::info!(port, "HTTP endpoint listening");

    for request in server.incoming_requests() {
        let (status, body) = if *request.method() == tiny_http::Method::Get {
            route(&monitor, request.url(), Utc::now())
        } else {
            (405, serde_json::json!({ "error": "Only GET is supported" }))
        };
        // Path only; query strings can carry station names but never keys.
        let path = request.url().split('?').next().unwrap_or("").to_string();
        tracing::debug!(path = path.as_str(), status, "request served");

        if let Err(e) = request.respond(create_response(status, &body)) {
            tracing::warn!("Failed to send response: {}", e);
        }
    }

    Ok(())
}

/// Create HTTP response with JSON body
fn create_response(status_code: u16, json: &serde_json::Value) -> tiny_http::Response<std::io::Cursor<Vec<u8>>> {
    let body = serde_json::to_string_pretty(json).unwrap_or_else(|_| "{}".to_string());

    let response = tiny_http::Response::from_data(body.into_bytes())
        .with_status_code(tiny_http::StatusCode::from(status_code));
    match tiny_http::Header::from_bytes(&b"Content-Type"[..], &b"application/json; charset=utf-8"[..]) {
        Ok(header) => response.with_header(header),
        Err(()) => response,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
