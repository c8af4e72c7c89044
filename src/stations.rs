/// Station directory for the river level / water quality service.
///
/// The canonical list of monitoring stations, loaded once per run from the
/// `stations.toml` roster. Each station carries its candidate codes for every
/// provider (networks assign their own identifiers, and those identifiers
/// drift), plus a write-once cell per provider recording which candidate the
/// resolver confirmed live.
///
/// Stations are stored in an arena indexed by name. The directory is
/// read-only after load apart from the resolution cells, which are
/// `OnceLock`s: concurrent workers resolving the same station race benignly,
/// and the first write wins.

use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use crate::config::{ConfigError, DatumOffset};
use crate::model::Provider;

// ---------------------------------------------------------------------------
// Roster file structures
// ---------------------------------------------------------------------------

/// Root of stations.toml.
#[derive(Debug, Deserialize)]
struct Roster {
    #[serde(default)]
    station: Vec<RosterEntry>,
}

/// One `[[station]]` row.
#[derive(Debug, Deserialize)]
struct RosterEntry {
    name: String,
    address: Option<String>,
    /// Overrides any `[[normalizer.datum_offsets]]` match for this station.
    datum_offset_m: Option<f64>,
    #[serde(default)]
    codes: RosterCodes,
}

#[derive(Debug, Default, Deserialize)]
struct RosterCodes {
    #[serde(default)]
    hrfco: Vec<String>,
    #[serde(default)]
    nier: Vec<String>,
    #[serde(default)]
    autonet: Vec<String>,
}

// ---------------------------------------------------------------------------
// Station
// ---------------------------------------------------------------------------

/// Resolution state of one station for one provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeState<'a> {
    /// Not probed yet this run.
    Pending,
    /// A candidate answered a probe.
    Live(&'a str),
    /// Every candidate was probed and none answered.
    Unresolved,
}

/// A fixed monitoring point with one name and per-provider identifiers.
#[derive(Debug)]
pub struct Station {
    pub name: String,
    pub address: Option<String>,
    /// Vertical datum correction in metres, if known for this station.
    pub datum_offset: Option<f64>,
    candidates: [Vec<String>; 3],
    resolved: [OnceLock<Option<String>>; 3],
}

impl Station {
    pub fn new(name: impl Into<String>) -> Self {
        Station {
            name: name.into(),
            address: None,
            datum_offset: None,
            candidates: Default::default(),
            resolved: Default::default(),
        }
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    pub fn with_datum_offset(mut self, offset_m: f64) -> Self {
        self.datum_offset = Some(offset_m);
        self
    }

    pub fn with_candidates<I, S>(mut self, provider: Provider, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.candidates[provider.index()] = codes
            .into_iter()
            .map(|c| {
                let code: String = c.into();
                code.trim().to_string()
            })
            .filter(|c| !c.is_empty())
            .collect();
        self
    }

    /// Candidate codes for `provider`, in the order they should be tried.
    pub fn candidates(&self, provider: Provider) -> &[String] {
        &self.candidates[provider.index()]
    }

    pub fn code_state(&self, provider: Provider) -> CodeState<'_> {
        match self.resolved[provider.index()].get() {
            None => CodeState::Pending,
            Some(Some(code)) => CodeState::Live(code),
            Some(None) => CodeState::Unresolved,
        }
    }

    /// Records a resolution outcome. Only the first write sticks; a losing
    /// concurrent write is dropped and the stored state is returned.
    pub fn record_resolution(&self, provider: Provider, code: Option<String>) -> CodeState<'_> {
        let _ = self.resolved[provider.index()].set(code);
        self.code_state(provider)
    }
}

// ---------------------------------------------------------------------------
// Directory
// ---------------------------------------------------------------------------

/// Arena of stations keyed by name.
#[derive(Debug, Default)]
pub struct Directory {
    stations: Vec<Station>,
    index: HashMap<String, usize>,
}

impl Directory {
    /// Builds a directory, rejecting blank or duplicate station names.
    pub fn from_stations(stations: Vec<Station>) -> Result<Self, ConfigError> {
        let mut index = HashMap::with_capacity(stations.len());
        for (i, station) in stations.iter().enumerate() {
            if station.name.trim().is_empty() {
                return Err(ConfigError::InvalidRoster(format!(
                    "station #{} has an empty name",
                    i + 1
                )));
            }
            if index.insert(station.name.clone(), i).is_some() {
                return Err(ConfigError::InvalidRoster(format!(
                    "duplicate station name '{}'",
                    station.name
                )));
            }
        }
        Ok(Directory { stations, index })
    }

    /// Loads the roster at `path`, applying the datum offset table.
    pub fn load(path: impl AsRef<Path>, datum_offsets: &[DatumOffset]) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::MissingDirectory(path.to_path_buf()));
        }
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&contents, datum_offsets).map_err(|e| match e {
            ConfigError::InvalidRoster(msg) => {
                ConfigError::InvalidRoster(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })
    }

    /// Parses roster TOML.
    pub fn parse(contents: &str, datum_offsets: &[DatumOffset]) -> Result<Self, ConfigError> {
        let roster: Roster =
            toml::from_str(contents).map_err(|e| ConfigError::InvalidRoster(e.to_string()))?;

        let stations = roster
            .station
            .into_iter()
            .map(|entry| {
                let name = entry.name.trim().to_string();
                let datum_offset = entry
                    .datum_offset_m
                    .or_else(|| datum_offset_for(&name, datum_offsets));

                let mut station = Station::new(name)
                    .with_candidates(Provider::Hrfco, entry.codes.hrfco)
                    .with_candidates(Provider::Nier, entry.codes.nier)
                    .with_candidates(Provider::AutoNet, entry.codes.autonet);
                station.address = entry.address.filter(|a| !a.trim().is_empty());
                station.datum_offset = datum_offset;
                station
            })
            .collect();

        Self::from_stations(stations)
    }

    pub fn find(&self, name: &str) -> Option<&Station> {
        self.index.get(name.trim()).map(|&i| &self.stations[i])
    }

    /// Stations whose name contains `fragment`, case-insensitively.
    pub fn search(&self, fragment: &str) -> Vec<&Station> {
        let needle = fragment.trim().to_lowercase();
        self.stations
            .iter()
            .filter(|s| s.name.to_lowercase().contains(&needle))
            .collect()
    }

    pub fn stations(&self) -> &[Station] {
        &self.stations
    }

    pub fn names(&self) -> Vec<String> {
        self.stations.iter().map(|s| s.name.clone()).collect()
    }

    /// Names of stations with at least one candidate code for `provider`.
    pub fn names_for(&self, provider: Provider) -> Vec<String> {
        self.stations
            .iter()
            .filter(|s| !s.candidates(provider).is_empty())
            .map(|s| s.name.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }
}

/// First datum table entry whose pattern occurs in the station name.
pub fn datum_offset_for(name: &str, table: &[DatumOffset]) -> Option<f64> {
    table
        .iter()
        .find(|entry| !entry.station_contains.is_empty() && name.contains(&entry.station_contains))
        .map(|entry| entry.offset_m)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
