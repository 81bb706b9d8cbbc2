//! Row types exchanged with the loading and display collaborators.
//!
//! Notes
//! - Numeric columns are `Option<f64>`; `None` means "missing", never NaN.
//! - JSON field names match the column names used by the loaders.
//! - Numeric cells decode leniently (see `crate::utils::lenient_f64`).

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

use crate::utils::lenient_f64;

// =====================
// Keys
// =====================

/// Building key. Loaders deliver it either as text or as a bare integer
/// (project numbers); both decode to the same string form.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct BuildingId(pub String);

impl BuildingId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for BuildingId {
    fn from(value: &str) -> Self {
        BuildingId(value.to_string())
    }
}

impl Display for BuildingId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for BuildingId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct V;
        impl<'de> serde::de::Visitor<'de> for V {
            type Value = BuildingId;

            fn expecting(&self, f: &mut Formatter) -> fmt::Result {
                write!(f, "a string or integer building id")
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(BuildingId(value.to_string()))
            }

            fn visit_string<E>(self, value: String) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(BuildingId(value))
            }

            fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(BuildingId(value.to_string()))
            }

            fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(BuildingId(value.to_string()))
            }
        }

        deserializer.deserialize_any(V)
    }
}

// =====================
// Inputs
// =====================

/// Static building attributes. Immutable for the lifetime of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Building {
    pub building_id: BuildingId,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub area_m2: Option<f64>,
    /// Student count or bed capacity, whichever the loader chose.
    #[serde(default, deserialize_with = "lenient_f64")]
    pub capacity_or_occupancy: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub lat: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub lon: Option<f64>,
}

/// One metered value for one building over the period starting at `date`
/// (a calendar day or the first of a month, depending on the source).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawReading {
    pub date: NaiveDate,
    pub building_id: BuildingId,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub kwh: Option<f64>,
    /// Occupancy for the period, when the loader supplies one per reading.
    #[serde(default, deserialize_with = "lenient_f64")]
    pub capacity_or_occupancy: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub temp_mean_c: Option<f64>,
    /// Heating degree days (17 °C base) already summed over this reading's period.
    #[serde(default, deserialize_with = "lenient_f64")]
    pub hdd_17c: Option<f64>,
}

impl RawReading {
    pub fn new(date: NaiveDate, building_id: BuildingId, kwh: Option<f64>) -> Self {
        RawReading {
            date,
            building_id,
            kwh,
            capacity_or_occupancy: None,
            temp_mean_c: None,
            hdd_17c: None,
        }
    }
}

/// City-level weather for the period starting at `date`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherObservation {
    pub date: NaiveDate,
    pub city: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub temp_mean_c: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub hdd_17c: Option<f64>,
}

// =====================
// Output
// =====================

/// One building over one granularity-aligned bucket, with baseline and score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedPeriod {
    /// Bucket start.
    pub date: NaiveDate,
    pub building_id: BuildingId,
    pub kwh: Option<f64>,
    pub hdd_17c: Option<f64>,
    pub capacity_or_occupancy: Option<f64>,
    pub area_m2: Option<f64>,
    pub name: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub expected_kwh: Option<f64>,
    pub residual: Option<f64>,
    pub kwh_per_m2: Option<f64>,
    pub kwh_per_occupant: Option<f64>,
    pub z_score: Option<f64>,
}

// =====================
// Documents
// =====================

/// Everything a loader hands over in one go.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub buildings: Vec<Building>,
    pub readings: Vec<RawReading>,
    #[serde(default)]
    pub weather: Vec<WeatherObservation>,
}
