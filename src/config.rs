//! Minimal runtime configuration helpers.
//! Every knob comes from the environment (optionally seeded from a `.env` file).

use std::num::NonZeroUsize;
use std::path::PathBuf;

use crate::services::aggregate::Granularity;
use crate::services::baseline::{BaselineModel, DEFAULT_WEIGHT_HDD, DEFAULT_WEIGHT_OCCUPANCY};
use crate::services::prepare::Selection;

pub const DEFAULT_INPUT_PATH: &str = "data/input.json";
pub const DEFAULT_TOP_N: usize = 3;

#[derive(Debug, Clone)]
pub struct Config {
    /// JSON document with `buildings`, `readings` and optional `weather`.
    pub input_path: PathBuf,
    pub granularity: Granularity,
    /// Baseline coefficients (`BASELINE_WEIGHT_HDD`, `BASELINE_WEIGHT_OCCUPANCY`).
    pub baseline: BaselineModel,
    /// How many of the strongest anomalies to report.
    pub top_n: NonZeroUsize,
    /// City / year / month filter applied before aggregation.
    pub selection: Selection,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let input_path = PathBuf::from(get("INPUT_PATH").unwrap_or_else(|| DEFAULT_INPUT_PATH.to_string()));

        let granularity = match get("GRANULARITY") {
            Some(s) => s.parse::<Granularity>().map_err(|e| format!("GRANULARITY: {}", e))?,
            None => Granularity::Month,
        };

        let weight_hdd = parse_or("BASELINE_WEIGHT_HDD", get("BASELINE_WEIGHT_HDD"), DEFAULT_WEIGHT_HDD)?;
        let weight_occupancy = parse_or(
            "BASELINE_WEIGHT_OCCUPANCY",
            get("BASELINE_WEIGHT_OCCUPANCY"),
            DEFAULT_WEIGHT_OCCUPANCY,
        )?;
        if !weight_hdd.is_finite() || !weight_occupancy.is_finite() {
            return Err("baseline weights must be finite numbers".to_string());
        }

        let top_n = parse_or("TOP_N", get("TOP_N"), DEFAULT_TOP_N)?;
        let top_n = NonZeroUsize::new(top_n).ok_or_else(|| "TOP_N must be at least 1".to_string())?;

        let year = get("YEAR").map(|s| parse_value::<i32>("YEAR", &s)).transpose()?;
        let month = get("MONTH").map(|s| parse_value::<u32>("MONTH", &s)).transpose()?;
        if let Some(m) = month
            && !(1..=12).contains(&m)
        {
            return Err("MONTH must be between 1 and 12".to_string());
        }

        Ok(Config {
            input_path,
            granularity,
            baseline: BaselineModel::new(weight_hdd, weight_occupancy),
            top_n,
            selection: Selection {
                city: get("CITY"),
                year,
                month,
                ..Selection::default()
            },
        })
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, String> {
    raw.parse::<T>()
        .map_err(|_| format!("{} has an invalid value: {:?}", key, raw))
}

fn parse_or<T: std::str::FromStr>(key: &str, raw: Option<String>, default: T) -> Result<T, String> {
    match raw {
        Some(s) => parse_value(key, &s),
        None => Ok(default),
    }
}
