/// NIER water-quality client (public data portal).
///
/// Endpoint:
///   {base}/1480523/WaterQualityService/getRealTimeWaterQualityList
///
/// Rows are nested under `response.body.items.item`. The portal is loose
/// about that shape: `item` is a bare object when there is one row, and
/// `items` becomes an empty string when there are none. Which JSON field
/// holds the measurement and which holds the time is configuration
/// (`value_field`, `time_field`), since the service returns every measured
/// quantity in one row.
///
/// Authentication failures do not come back as JSON at all; the gateway
/// answers with an XML `OpenAPI_ServiceResponse` carrying `returnAuthMsg`.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::time::Duration;

use super::http::HttpSource;
use super::{day_bounds, json_scalar_to_raw, markup, parse_provider_timestamp, SeriesProvider};
use crate::config::ProviderSettings;
use crate::model::{FetchError, Provider, RawSample, Sampling};
use crate::retrieval::CancelToken;

pub const SERIES_PATH: &str = "1480523/WaterQualityService/getRealTimeWaterQualityList";

/// Rows requested per page. One page covers several days of hourly data.
const ROWS_PER_PAGE: u32 = 1000;

const RESULT_OK: &str = "00";
const RESULT_NO_DATA: &str = "03";

// ---------------------------------------------------------------------------
// Serde structures
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct Envelope {
    response: ResponsePart,
}

#[derive(Deserialize)]
struct ResponsePart {
    header: Header,
    #[serde(default)]
    body: Option<BodyPart>,
}

#[derive(Deserialize)]
pub(crate) struct Header {
    #[serde(rename = "resultCode")]
    pub result_code: String,
    #[serde(rename = "resultMsg", default)]
    pub result_msg: Option<String>,
}

#[derive(Deserialize)]
struct BodyPart {
    #[serde(default)]
    items: Option<Items>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Items {
    Wrapped {
        #[serde(default)]
        item: Option<OneOrMany>,
    },
    Blank(String),
}

/// The portal's "list of one is an object" convention.
#[derive(Deserialize)]
#[serde(untagged)]
pub(crate) enum OneOrMany {
    Many(Vec<Map<String, Value>>),
    One(Map<String, Value>),
}

impl OneOrMany {
    pub(crate) fn into_vec(self) -> Vec<Map<String, Value>> {
        match self {
            OneOrMany::Many(rows) => rows,
            OneOrMany::One(row) => vec![row],
        }
    }
}

// ---------------------------------------------------------------------------
// URL construction
// ---------------------------------------------------------------------------

/// Builds a water-quality series URL. The service filters by date only,
/// so the window is widened to whole provider-clock days and clipped again
/// by the retrieval engine.
pub fn build_series_url(
    settings: &ProviderSettings,
    code: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> String {
    let (first, last) = day_bounds(start, end, settings.clock_utc_offset_hours);
    let key = settings.api_key.as_deref().unwrap_or_default();
    format!(
        "{}/{}?serviceKey={}&pageNo=1&numOfRows={}&returnType=json&siteId={}&startDate={}&endDate={}",
        settings.base_url,
        SERIES_PATH,
        urlencoding::encode(key),
        ROWS_PER_PAGE,
        urlencoding::encode(code),
        first.format("%Y%m%d"),
        last.format("%Y%m%d"),
    )
}

// ---------------------------------------------------------------------------
// Response decoding
// ---------------------------------------------------------------------------

/// Recognizes the gateway's XML error document. Returns the error it
/// describes, or `None` if `body` is not one.
pub(crate) fn portal_error(body: &str) -> Option<FetchError> {
    let trimmed = body.trim_start();
    if !trimmed.starts_with('<') {
        return None;
    }
    let header = markup::blocks(trimmed, "cmmMsgHeader").into_iter().next()?;
    let message = markup::element_text(header, "returnAuthMsg")
        .or_else(|| markup::element_text(header, "errMsg"))
        .unwrap_or_else(|| "unspecified gateway error".to_string());
    let code = markup::element_text(header, "returnReasonCode").unwrap_or_default();
    Some(FetchError::MalformedResponse(format!(
        "data portal rejected request: {} {}",
        code, message
    )))
}

/// Maps a portal result code to an error, `Ok(())` for success.
pub(crate) fn check_result_code(header: &Header, context: &str) -> Result<(), FetchError> {
    let code = header.result_code.trim();
    let msg = header.result_msg.as_deref().unwrap_or("").trim();
    match code {
        RESULT_OK => Ok(()),
        RESULT_NO_DATA => Err(FetchError::EmptyResult(format!("{}: {}", context, msg))),
        other => Err(FetchError::MalformedResponse(format!(
            "{}: result code {} {}",
            context, other, msg
        ))),
    }
}

/// Decodes a water-quality response into raw samples for `value_field`.
///
/// # Errors
/// - `MalformedResponse` — XML gateway error, undecodable JSON, or a
///   non-success result code
/// - `EmptyResult` — result code 03, or no rows
pub fn parse_series_response(
    body: &str,
    code: &str,
    value_field: &str,
    time_field: &str,
    utc_offset_hours: i32,
) -> Result<Vec<RawSample>, FetchError> {
    if let Some(err) = portal_error(body) {
        return Err(err);
    }

    let envelope: Envelope = serde_json::from_str(body)
        .map_err(|e| FetchError::MalformedResponse(format!("nier: {}", e)))?;
    let context = format!("nier {}", code);
    check_result_code(&envelope.response.header, &context)?;

    let rows = match envelope.response.body.and_then(|b| b.items) {
        Some(Items::Wrapped { item: Some(item) }) => item.into_vec(),
        _ => Vec::new(),
    };
    if rows.is_empty() {
        return Err(FetchError::EmptyResult(format!("{}: no items", context)));
    }

    let total = rows.len();
    let samples: Vec<RawSample> = rows
        .iter()
        .filter_map(|row| {
            let stamp = row.get(time_field)?;
            let timestamp = parse_provider_timestamp(&json_scalar_to_raw(stamp), utc_offset_hours)?;
            let raw = row.get(value_field).map(json_scalar_to_raw).unwrap_or_default();
            Some(RawSample::new(timestamp, raw))
        })
        .collect();

    if samples.is_empty() {
        return Err(FetchError::MalformedResponse(format!(
            "{}: none of {} items had a usable '{}'",
            context, total, time_field
        )));
    }
    Ok(samples)
}

// ---------------------------------------------------------------------------
// Provider
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct NierProvider {
    settings: ProviderSettings,
    http: HttpSource,
}

impl NierProvider {
    pub fn new(settings: ProviderSettings, http: HttpSource) -> Self {
        NierProvider { settings, http }
    }

    pub fn settings(&self) -> &ProviderSettings {
        &self.settings
    }

    pub(crate) fn http(&self) -> &HttpSource {
        &self.http
    }
}

impl SeriesProvider for NierProvider {
    fn provider(&self) -> Provider {
        Provider::Nier
    }

    fn fetch_series(
        &self,
        code: &str,
        sampling: Sampling,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        timeout: Duration,
        cancel: &CancelToken,
    ) -> Result<Vec<RawSample>, FetchError> {
        if sampling != Sampling::Hourly {
            return Err(FetchError::EmptyResult(format!(
                "nier publishes hourly data only, not {}",
                sampling
            )));
        }
        let url = build_series_url(&self.settings, code, start, end);
        let body = self.http.get_text(&url, timeout, cancel)?;
        parse_series_response(
            &body,
            code,
            &self.settings.value_field,
            &self.settings.time_field,
            self.settings.clock_utc_offset_hours,
        )
    }
}
