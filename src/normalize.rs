/// Unit normalization for level readings.
///
/// Level networks report either depth above the gauge zero or absolute
/// elevation above the national datum, and the payload does not say which.
/// A known per-station datum offset settles it; without one, a magnitude
/// heuristic decides. The heuristic is approximate: a deep reservoir gauge
/// can legitimately read over the threshold as depth. Stations where that
/// matters should get an entry in `[[normalizer.datum_offsets]]`.

use crate::config::NormalizerConfig;
use crate::model::{Reading, Unit};
use crate::stations::Station;

#[derive(Debug, Clone, PartialEq)]
pub struct Normalizer {
    magnitude_threshold_m: f64,
}

impl Normalizer {
    pub fn new(magnitude_threshold_m: f64) -> Self {
        Normalizer { magnitude_threshold_m }
    }

    pub fn from_config(config: &NormalizerConfig) -> Self {
        Normalizer::new(config.magnitude_threshold_m)
    }

    /// Classifies `reading` for `station`. Only `value` and `unit` change.
    ///
    /// Idempotent: a reading already labelled `Depth` is returned as is.
    pub fn normalize(&self, reading: Reading, station: &Station) -> Reading {
        if reading.unit == Unit::Depth {
            return reading;
        }

        match station.datum_offset {
            Some(offset) if reading.value > offset => Reading {
                value: round_mm(reading.value - offset),
                unit: Unit::Depth,
                ..reading
            },
            // At or below the datum the value is already relative.
            Some(_) => Reading {
                unit: Unit::Depth,
                ..reading
            },
            None if reading.value < self.magnitude_threshold_m => Reading {
                unit: Unit::Depth,
                ..reading
            },
            None => Reading {
                unit: Unit::Elevation,
                ..reading
            },
        }
    }
}

impl Default for Normalizer {
    fn default() -> Self {
        Normalizer::from_config(&NormalizerConfig::default())
    }
}

fn round_mm(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}
