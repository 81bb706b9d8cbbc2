//! Input preparation done before aggregation: weather and capacity joins,
//! heating-degree-day derivation and the caller's city/date/building selection.

use chrono::{Datelike, NaiveDate};
use log::debug;
use std::collections::{BTreeMap, BTreeSet};

use crate::models::energy::{Building, BuildingId, RawReading, WeatherObservation};
use crate::utils::finite;

/// Base temperature for heating degree days.
pub const HDD_BASE_C: f64 = 17.0;

/// `max(0, 17 - temp_mean_c) * days`. Use `days = 1` for daily means and
/// [`days_in_month`] for monthly means.
pub fn heating_degree_days(temp_mean_c: Option<f64>, days: u32) -> Option<f64> {
    finite(temp_mean_c).map(|t| (HDD_BASE_C - t).max(0.0) * f64::from(days))
}

pub fn days_in_month(date: NaiveDate) -> u32 {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    let first = date.with_day(1);
    let next = NaiveDate::from_ymd_opt(year, month, 1);
    match (first, next) {
        (Some(first), Some(next)) => (next - first).num_days() as u32,
        _ => 31,
    }
}

/// Fill `temp_mean_c` / `hdd_17c` from the city weather row for each reading's date.
///
/// Values already on a reading win. When the weather row has a temperature
/// but no degree days, degree days are derived from the daily mean.
/// Readings whose building or weather row is unknown are returned unchanged.
pub fn attach_weather(
    readings: &[RawReading],
    buildings: &[Building],
    weather: &[WeatherObservation],
) -> Vec<RawReading> {
    let cities: BTreeMap<&BuildingId, &str> = buildings.iter().map(|b| (&b.building_id, b.city.as_str())).collect();
    let mut by_day: BTreeMap<(NaiveDate, &str), &WeatherObservation> = BTreeMap::new();
    for w in weather {
        by_day.entry((w.date, w.city.as_str())).or_insert(w);
    }

    let mut matched: usize = 0;
    let joined: Vec<RawReading> = readings
        .iter()
        .map(|r| {
            let mut out = r.clone();
            let observation = cities
                .get(&r.building_id)
                .and_then(|city| by_day.get(&(r.date, *city)));
            if let Some(w) = observation {
                matched += 1;
                if finite(out.temp_mean_c).is_none() {
                    out.temp_mean_c = finite(w.temp_mean_c);
                }
                if finite(out.hdd_17c).is_none() {
                    out.hdd_17c = finite(w.hdd_17c).or_else(|| heating_degree_days(w.temp_mean_c, 1));
                }
            }
            out
        })
        .collect();

    debug!(
        "Prepare: weather matched {} of {} reading(s)",
        matched,
        readings.len()
    );
    joined
}

/// Fill a missing per-reading occupancy with the building's static capacity.
pub fn attach_capacity(readings: &[RawReading], buildings: &[Building]) -> Vec<RawReading> {
    let capacity: BTreeMap<&BuildingId, Option<f64>> = buildings
        .iter()
        .map(|b| (&b.building_id, finite(b.capacity_or_occupancy)))
        .collect();

    readings
        .iter()
        .map(|r| {
            let mut out = r.clone();
            if finite(out.capacity_or_occupancy).is_none() {
                out.capacity_or_occupancy = capacity.get(&r.building_id).copied().flatten();
            }
            out
        })
        .collect()
}

/// Inclusive date window.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DateRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateRange {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from <= date && date <= self.to
    }
}

/// What the caller wants to look at. Every field is optional; an empty
/// selection keeps everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selection {
    pub city: Option<String>,
    pub year: Option<i32>,
    /// 1-12. Without `year` it selects that month in every year.
    pub month: Option<u32>,
    pub range: Option<DateRange>,
    pub building_ids: Option<BTreeSet<BuildingId>>,
}

impl Selection {
    fn restricts_buildings(&self) -> bool {
        self.city.is_some() || self.building_ids.is_some()
    }

    pub fn includes_building(&self, building: &Building) -> bool {
        let city_ok = self.city.as_deref().is_none_or(|c| c == building.city);
        let id_ok = self
            .building_ids
            .as_ref()
            .is_none_or(|ids| ids.contains(&building.building_id));
        city_ok && id_ok
    }

    pub fn includes_date(&self, date: NaiveDate) -> bool {
        self.year.is_none_or(|y| date.year() == y)
            && self.month.is_none_or(|m| date.month() == m)
            && self.range.is_none_or(|r| r.contains(date))
    }

    /// Filter both tables.
    ///
    /// Readings for buildings absent from the dimension survive only when the
    /// selection does not restrict buildings. Selected buildings that end up
    /// with no readings are left out of the returned dimension.
    pub fn apply(&self, readings: &[RawReading], buildings: &[Building]) -> (Vec<Building>, Vec<RawReading>) {
        let known: BTreeSet<&BuildingId> = buildings.iter().map(|b| &b.building_id).collect();
        let selected: BTreeSet<&BuildingId> = buildings
            .iter()
            .filter(|b| self.includes_building(b))
            .map(|b| &b.building_id)
            .collect();

        let kept: Vec<RawReading> = readings
            .iter()
            .filter(|r| self.includes_date(r.date))
            .filter(|r| {
                if known.contains(&r.building_id) {
                    selected.contains(&r.building_id)
                } else {
                    !self.restricts_buildings()
                }
            })
            .cloned()
            .collect();

        let with_readings: BTreeSet<&BuildingId> = kept.iter().map(|r| &r.building_id).collect();
        let kept_buildings: Vec<Building> = buildings
            .iter()
            .filter(|b| selected.contains(&b.building_id) && with_readings.contains(&b.building_id))
            .cloned()
            .collect();

        debug!(
            "Prepare: selection kept {} building(s) and {} of {} reading(s)",
            kept_buildings.len(),
            kept.len(),
            readings.len()
        );
        (kept_buildings, kept)
    }
}
