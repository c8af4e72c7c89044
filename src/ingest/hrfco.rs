/// HRFCO water-level API client.
///
/// Handles URL construction and response decoding for the Han River Flood
/// Control Office open API:
///   {base}/{key}/waterlevel/list/{10M|1H|1D}/{code}/{start}/{end}.json
///
/// The key is a path segment, not a query parameter, so request URLs are
/// never logged. Rows arrive under `content`; timestamps are KST wall-clock
/// strings and levels are strings with leading padding (`" 2.45"`).
/// See `fixtures.rs` for sample payloads.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;

use super::http::HttpSource;
use super::{json_scalar_to_raw, parse_provider_timestamp, to_provider_clock, SeriesProvider};
use crate::config::ProviderSettings;
use crate::model::{FetchError, Provider, RawSample, Sampling};
use crate::retrieval::CancelToken;

// ---------------------------------------------------------------------------
// Serde structures
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct SeriesResponse {
    content: Option<Vec<SeriesRow>>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct SeriesRow {
    #[serde(default)]
    wlobscd: Option<String>,
    #[serde(default)]
    ymdhm: Option<String>,
    #[serde(default)]
    wl: Option<serde_json::Value>,
}

// ---------------------------------------------------------------------------
// URL construction
// ---------------------------------------------------------------------------

/// Path segment HRFCO uses for each sampling.
pub fn sampling_segment(sampling: Sampling) -> &'static str {
    match sampling {
        Sampling::TenMinutes => "10M",
        Sampling::Hourly => "1H",
        Sampling::Daily => "1D",
    }
}

/// Builds a level-series URL. The window is rendered on the provider clock;
/// daily series take dates only.
pub fn build_series_url(
    settings: &ProviderSettings,
    code: &str,
    sampling: Sampling,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> String {
    let offset = settings.clock_utc_offset_hours;
    let format = match sampling {
        Sampling::Daily => "%Y%m%d",
        _ => "%Y%m%d%H%M",
    };
    let start = to_provider_clock(start, offset).format(format).to_string();
    let end = to_provider_clock(end, offset).format(format).to_string();

    let mut url = settings.base_url.clone();
    if let Some(key) = &settings.api_key {
        url.push('/');
        url.push_str(&urlencoding::encode(key));
    }
    format!(
        "{}/waterlevel/list/{}/{}/{}/{}.json",
        url,
        sampling_segment(sampling),
        urlencoding::encode(code),
        start,
        end
    )
}

// ---------------------------------------------------------------------------
// Response decoding
// ---------------------------------------------------------------------------

/// Decodes a level-series response into raw samples.
///
/// Rows whose `wlobscd` differs from `code` are dropped: the API has been
/// seen to pad a single-station answer with neighboring gauges.
///
/// # Errors
/// - `MalformedResponse` — not JSON, or an error message in place of `content`
/// - `EmptyResult` — `content` absent or empty
/// - `MalformedResponse` — rows present but no timestamp parses
pub fn parse_series_response(
    json: &str,
    code: &str,
    utc_offset_hours: i32,
) -> Result<Vec<RawSample>, FetchError> {
    let response: SeriesResponse = serde_json::from_str(json)
        .map_err(|e| FetchError::MalformedResponse(format!("hrfco: {}", e)))?;

    let rows = match response.content {
        Some(rows) => rows,
        None => {
            if let Some(message) = response.message {
                return Err(FetchError::MalformedResponse(format!("hrfco: {}", message)));
            }
            if let Some(error) = response.error {
                return Err(FetchError::MalformedResponse(format!("hrfco: {}", error)));
            }
            return Err(FetchError::EmptyResult(format!("hrfco {}: no content", code)));
        }
    };

    if rows.is_empty() {
        return Err(FetchError::EmptyResult(format!("hrfco {}: content is empty", code)));
    }

    let total = rows.len();
    let samples: Vec<RawSample> = rows
        .into_iter()
        .filter(|row| row.wlobscd.as_deref().map_or(true, |c| c.trim() == code))
        .filter_map(|row| {
            let timestamp = parse_provider_timestamp(row.ymdhm.as_deref()?, utc_offset_hours)?;
            let raw = row.wl.as_ref().map(json_scalar_to_raw).unwrap_or_default();
            Some(RawSample::new(timestamp, raw))
        })
        .collect();

    if samples.is_empty() {
        return Err(FetchError::MalformedResponse(format!(
            "hrfco {}: none of {} rows had a usable timestamp",
            code, total
        )));
    }
    Ok(samples)
}

// ---------------------------------------------------------------------------
// Provider
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct HrfcoProvider {
    settings: ProviderSettings,
    http: HttpSource,
}

impl HrfcoProvider {
    pub fn new(settings: ProviderSettings, http: HttpSource) -> Self {
        HrfcoProvider { settings, http }
    }

    pub fn settings(&self) -> &ProviderSettings {
        &self.settings
    }

    pub(crate) fn http(&self) -> &HttpSource {
        &self.http
    }
}

impl SeriesProvider for HrfcoProvider {
    fn provider(&self) -> Provider {
        Provider::Hrfco
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
        let url = build_series_url(&self.settings, code, sampling, start, end);
        let body = self.http.get_text(&url, timeout, cancel)?;
        parse_series_response(&body, code, self.settings.clock_utc_offset_hours)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::fixtures;
    use chrono::TimeZone;

    fn settings() -> ProviderSettings {
        let mut s = ProviderSettings::defaults(Provider::Hrfco);
        s.api_key = Some("TEST-KEY".to_string());
        s
    }

    #[test]
    fn test_build_series_url_uses_kst_window() {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 3, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 5, 1, 5, 0, 0).unwrap();
        let url = build_series_url(&settings(), "1018683", Sampling::TenMinutes, start, end);
        assert_eq!(
            url,
            "http://api.hrfco.go.kr/TEST-KEY/waterlevel/list/10M/1018683/202405011200/202405011400.json"
        );
    }

    #[test]
    fn test_daily_url_uses_dates() {
        let start = Utc.with_ymd_and_hms(2024, 4, 28, 5, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 5, 1, 5, 0, 0).unwrap();
        let url = build_series_url(&settings(), "1018683", Sampling::Daily, start, end);
        assert!(url.ends_with("/1D/1018683/20240428/20240501.json"), "got {}", url);
    }

    #[test]
    fn test_parse_series_converts_clock_and_keeps_blanks() {
        let samples = parse_series_response(fixtures::HRFCO_SERIES_10M, "1018683", 9)
            .expect("fixture should decode");
        assert_eq!(samples.len(), 4);
        assert_eq!(samples[0].timestamp, Utc.with_ymd_and_hms(2024, 5, 1, 4, 30, 0).unwrap());
        assert_eq!(samples[0].raw_value, "2.41");
        assert!(
            samples.iter().any(|s| s.raw_value.is_empty()),
            "blank values are left for the engine to skip"
        );
    }

    #[test]
    fn test_rows_for_other_gauges_are_dropped() {
        let samples = parse_series_response(fixtures::HRFCO_SERIES_MIXED, "1018683", 9).unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].raw_value, "2.45");
    }

    #[test]
    fn test_empty_and_missing_content_is_empty_result() {
        assert!(matches!(
            parse_series_response(r#"{"content":[]}"#, "1018683", 9),
            Err(FetchError::EmptyResult(_))
        ));
        assert!(matches!(
            parse_series_response("{}", "1018683", 9),
            Err(FetchError::EmptyResult(_))
        ));
    }

    #[test]
    fn test_error_message_is_malformed() {
        let err = parse_series_response(fixtures::HRFCO_ERROR, "1018683", 9).unwrap_err();
        assert!(matches!(err, FetchError::MalformedResponse(_)));
        assert!(parse_series_response("<html>", "1018683", 9).is_err());
    }
}
