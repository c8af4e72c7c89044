/// Full station listings from the level and quality networks.
///
/// Used to bootstrap and audit `stations.toml`: the networks renumber
/// gauges, and the listing is the only place a replacement code shows up.
///
///   HRFCO: {base}/{key}/waterlevel/info.json      → content[]
///   NIER:  {base}/1480523/WaterQualityService/getMsrstnList → getMsrstnList.item[]

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::time::Duration;

use super::hrfco::HrfcoProvider;
use super::nier::{portal_error, NierProvider, OneOrMany};
use super::json_scalar_to_raw;
use crate::model::{FetchError, Provider};
use crate::retrieval::CancelToken;

pub const NIER_LIST_PATH: &str = "1480523/WaterQualityService/getMsrstnList";

/// The listing is small enough to fetch in one page.
const NIER_LIST_ROWS: u32 = 3000;

/// One station as a network lists it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogEntry {
    pub provider: Provider,
    pub code: String,
    pub name: String,
    pub address: Option<String>,
    pub agency: Option<String>,
    pub lat: Option<String>,
    pub lon: Option<String>,
}

impl CatalogEntry {
    pub fn matches(&self, fragment: &str) -> bool {
        let needle = fragment.trim().to_lowercase();
        needle.is_empty()
            || self.name.to_lowercase().contains(&needle)
            || self
                .address
                .as_deref()
                .is_some_and(|a| a.to_lowercase().contains(&needle))
    }
}

fn text_field(row: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| row.get(*k))
        .map(json_scalar_to_raw)
        .find(|s| !s.is_empty())
}

// ---------------------------------------------------------------------------
// HRFCO
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct HrfcoInfo {
    content: Option<Vec<Map<String, Value>>>,
}

pub fn parse_hrfco_catalog(json: &str) -> Result<Vec<CatalogEntry>, FetchError> {
    let info: HrfcoInfo = serde_json::from_str(json)
        .map_err(|e| FetchError::MalformedResponse(format!("hrfco catalog: {}", e)))?;
    let rows = info
        .content
        .ok_or_else(|| FetchError::EmptyResult("hrfco catalog: no content".to_string()))?;

    Ok(rows
        .iter()
        .filter_map(|row| {
            let code = text_field(row, &["wlobscd"])?;
            Some(CatalogEntry {
                provider: Provider::Hrfco,
                name: text_field(row, &["obsnm", "station_nm"]).unwrap_or_else(|| code.clone()),
                code,
                address: text_field(row, &["addr"]),
                agency: text_field(row, &["agcnm"]),
                lat: text_field(row, &["lat"]),
                lon: text_field(row, &["lon"]),
            })
        })
        .collect())
}

pub fn fetch_hrfco_catalog(
    provider: &HrfcoProvider,
    timeout: Duration,
) -> Result<Vec<CatalogEntry>, FetchError> {
    let settings = provider.settings();
    let mut url = settings.base_url.clone();
    if let Some(key) = &settings.api_key {
        url.push('/');
        url.push_str(&urlencoding::encode(key));
    }
    url.push_str("/waterlevel/info.json");
    let body = provider.http().get_text(&url, timeout, &CancelToken::new())?;
    parse_hrfco_catalog(&body)
}

// ---------------------------------------------------------------------------
// NIER
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct NierList {
    #[serde(rename = "getMsrstnList")]
    list: Option<NierListBody>,
}

#[derive(Deserialize)]
struct NierListBody {
    #[serde(default)]
    item: Option<OneOrMany>,
}

pub fn parse_nier_catalog(body: &str) -> Result<Vec<CatalogEntry>, FetchError> {
    if let Some(err) = portal_error(body) {
        return Err(err);
    }
    let list: NierList = serde_json::from_str(body)
        .map_err(|e| FetchError::MalformedResponse(format!("nier catalog: {}", e)))?;
    let rows = list
        .list
        .and_then(|l| l.item)
        .map(OneOrMany::into_vec)
        .ok_or_else(|| FetchError::EmptyResult("nier catalog: no items".to_string()))?;

    Ok(rows
        .iter()
        .filter_map(|row| {
            let code = text_field(row, &["ptNo"])?;
            Some(CatalogEntry {
                provider: Provider::Nier,
                name: text_field(row, &["ptNm"]).unwrap_or_else(|| code.clone()),
                code,
                address: text_field(row, &["addr"]),
                agency: text_field(row, &["deptNm"]),
                lat: None,
                lon: None,
            })
        })
        .collect())
}

pub fn fetch_nier_catalog(
    provider: &NierProvider,
    timeout: Duration,
) -> Result<Vec<CatalogEntry>, FetchError> {
    let settings = provider.settings();
    let key = settings.api_key.as_deref().unwrap_or_default();
    let url = format!(
        "{}/{}?serviceKey={}&numOfRows={}&pageNo=1&returnType=json",
        settings.base_url,
        NIER_LIST_PATH,
        urlencoding::encode(key),
        NIER_LIST_ROWS
    );
    let body = provider.http().get_text(&url, timeout, &CancelToken::new())?;
    parse_nier_catalog(&body)
}

// ---------------------------------------------------------------------------
// Roster rendering
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct RosterOut {
    station: Vec<RosterRowOut>,
}

#[derive(Serialize)]
struct RosterRowOut {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    address: Option<String>,
    codes: BTreeMap<String, Vec<String>>,
}

/// Renders catalog entries as `[[station]]` rows, one per entry, ready to
/// be pasted into `stations.toml` and merged by hand.
pub fn to_roster_toml(entries: &[CatalogEntry]) -> Result<String, toml::ser::Error> {
    let station = entries
        .iter()
        .map(|e| RosterRowOut {
            name: e.name.clone(),
            address: e.address.clone(),
            codes: BTreeMap::from([(e.provider.to_string(), vec![e.code.clone()])]),
        })
        .collect();
    toml::to_string(&RosterOut { station })
}
