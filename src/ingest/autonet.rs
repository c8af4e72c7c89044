/// Automatic water-quality network client.
///
/// The network answers in tag markup rather than key-value JSON. Each
/// `<item>` carries a timestamp and numbered measurement tags (`m69`,
/// `m70`, ...); which tag holds which quantity is not published alongside
/// the data, so the mapping lives in configuration and can be checked
/// against live payloads with `check_field_mapping`.
///
/// The server clock is UTC. Timestamps are decoded with offset 0 and the
/// +9 h local correction only applies when rendering on the provider clock.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

use super::http::HttpSource;
use super::nier::portal_error;
use super::{day_bounds, markup, parse_provider_timestamp, SeriesProvider};
use crate::config::{FieldMapping, ProviderSettings};
use crate::model::{FetchError, Provider, RawSample, Sampling};
use crate::retrieval::{parse_value, CancelToken};

const ROWS_PER_PAGE: u32 = 1000;

/// Operation name for each sampling the network publishes.
pub fn operation(sampling: Sampling) -> Option<&'static str> {
    match sampling {
        Sampling::Hourly => Some("getRealTimeWaterQualityList"),
        Sampling::Daily => Some("getDailyWaterQualityList"),
        Sampling::TenMinutes => None,
    }
}

pub fn build_series_url(
    settings: &ProviderSettings,
    code: &str,
    sampling: Sampling,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Option<String> {
    let op = operation(sampling)?;
    let (first, last) = day_bounds(start, end, settings.clock_utc_offset_hours);
    let mut url = format!(
        "{}/{}?pageNo=1&numOfRows={}&siteId={}&startDate={}&endDate={}",
        settings.base_url,
        op,
        ROWS_PER_PAGE,
        urlencoding::encode(code),
        first.format("%Y%m%d"),
        last.format("%Y%m%d"),
    );
    if let Some(key) = &settings.api_key {
        url.push_str("&serviceKey=");
        url.push_str(&urlencoding::encode(key));
    }
    Some(url)
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Checks the markup envelope and returns the `<item>` blocks.
fn item_blocks<'a>(doc: &'a str, code: &str) -> Result<Vec<&'a str>, FetchError> {
    if let Some(err) = portal_error(doc) {
        return Err(err);
    }
    if !doc.trim_start().starts_with('<') {
        return Err(FetchError::MalformedResponse(format!(
            "autonet {}: expected markup payload",
            code
        )));
    }
    if let Some(result) = markup::element_text(doc, "resultCode") {
        match result.as_str() {
            "00" => {}
            "03" => return Err(FetchError::EmptyResult(format!("autonet {}: no data", code))),
            other => {
                let msg = markup::element_text(doc, "resultMsg").unwrap_or_default();
                return Err(FetchError::MalformedResponse(format!(
                    "autonet {}: result code {} {}",
                    code, other, msg
                )));
            }
        }
    }
    let items = markup::blocks(doc, "item");
    if items.is_empty() {
        return Err(FetchError::EmptyResult(format!("autonet {}: no items", code)));
    }
    Ok(items)
}

/// Decodes raw samples of the measurement `tag` from a markup payload.
///
/// A missing or self-closing measurement tag yields a blank sample; an item
/// without a parseable timestamp is skipped.
pub fn parse_series_document(
    doc: &str,
    code: &str,
    tag: &str,
    time_tag: &str,
    utc_offset_hours: i32,
) -> Result<Vec<RawSample>, FetchError> {
    let items = item_blocks(doc, code)?;
    let total = items.len();

    let samples: Vec<RawSample> = items
        .into_iter()
        .filter_map(|item| {
            let stamp = markup::element_text(item, time_tag)?;
            let timestamp = parse_provider_timestamp(&stamp, utc_offset_hours)?;
            let raw = markup::element_text(item, tag).unwrap_or_default();
            Some(RawSample::new(timestamp, raw))
        })
        .collect();

    if samples.is_empty() {
        return Err(FetchError::MalformedResponse(format!(
            "autonet {}: none of {} items had a usable <{}>",
            code, total, time_tag
        )));
    }
    Ok(samples)
}

// ---------------------------------------------------------------------------
// Field-mapping verification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FieldVerdict {
    /// Every numeric value falls inside the plausible range.
    Plausible,
    /// At least one value is outside the range; the tag likely holds
    /// another quantity.
    Suspect,
    /// The tag carried no numeric value in any item.
    Absent,
}

/// How one mapped tag fared against a live payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldCheck {
    pub quantity: String,
    pub tag: String,
    pub numeric: usize,
    pub out_of_range: usize,
    pub min_seen: Option<f64>,
    pub max_seen: Option<f64>,
    pub verdict: FieldVerdict,
}

/// Compares every configured mapping with the values found in `doc`.
pub fn check_field_mapping(
    doc: &str,
    code: &str,
    fields: &[FieldMapping],
) -> Result<Vec<FieldCheck>, FetchError> {
    let items = item_blocks(doc, code)?;

    Ok(fields
        .iter()
        .map(|field| {
            let values: Vec<f64> = items
                .iter()
                .filter_map(|item| markup::element_text(item, &field.tag))
                .filter_map(|text| parse_value(&text))
                .collect();

            let out_of_range = values
                .iter()
                .filter(|v| **v < field.plausible_min || **v > field.plausible_max)
                .count();
            let verdict = if values.is_empty() {
                FieldVerdict::Absent
            } else if out_of_range > 0 {
                FieldVerdict::Suspect
            } else {
                FieldVerdict::Plausible
            };

            FieldCheck {
                quantity: field.quantity.clone(),
                tag: field.tag.clone(),
                numeric: values.len(),
                out_of_range,
                min_seen: values.iter().copied().reduce(f64::min),
                max_seen: values.iter().copied().reduce(f64::max),
                verdict,
            }
        })
        .collect())
}

// ---------------------------------------------------------------------------
// Provider
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct AutoNetProvider {
    settings: ProviderSettings,
    http: HttpSource,
}

impl AutoNetProvider {
    pub fn new(settings: ProviderSettings, http: HttpSource) -> Self {
        AutoNetProvider { settings, http }
    }

    pub fn settings(&self) -> &ProviderSettings {
        &self.settings
    }

    /// Fetches the raw markup for a window, for field verification.
    pub fn fetch_document(
        &self,
        code: &str,
        sampling: Sampling,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        timeout: Duration,
        cancel: &CancelToken,
    ) -> Result<String, FetchError> {
        let url = build_series_url(&self.settings, code, sampling, start, end).ok_or_else(|| {
            FetchError::EmptyResult(format!("autonet does not publish {} data", sampling))
        })?;
        self.http.get_text(&url, timeout, cancel)
    }
}

impl SeriesProvider for AutoNetProvider {
    fn provider(&self) -> Provider {
        Provider::AutoNet
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
        let doc = self.fetch_document(code, sampling, start, end, timeout, cancel)?;
        parse_series_document(
            &doc,
            code,
            &self.settings.value_field,
            &self.settings.time_field,
            self.settings.clock_utc_offset_hours,
        )
    }
}
