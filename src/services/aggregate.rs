//! Periodization, join and scoring of raw readings.
//!
//! Readings are bucketed by granularity, flow quantities (`kwh`, `hdd_17c`)
//! are summed per `(bucket, building_id)`, occupancy is taken from the first
//! reading that has one, and the result is left-joined with the building
//! dimension before the baseline and robust scores are filled in.

use chrono::{Datelike, NaiveDate};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use crate::models::energy::{AggregatedPeriod, Building, BuildingId, RawReading};
use crate::services::baseline::BaselineModel;
use crate::services::stats::robust_z_scores;
use crate::utils::{add_nullable, finite};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AggregateError {
    /// The caller asked for a bucket width other than day, month or year.
    InvalidGranularity(String),
}

impl Display for AggregateError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            AggregateError::InvalidGranularity(g) => {
                write!(f, "invalid granularity {:?} (expected day, month or year)", g)
            }
        }
    }
}

impl Error for AggregateError {}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Day,
    Month,
    Year,
}

impl Granularity {
    pub fn as_str(self) -> &'static str {
        match self {
            Granularity::Day => "day",
            Granularity::Month => "month",
            Granularity::Year => "year",
        }
    }

    /// Start of the bucket containing `date`.
    pub fn bucket_start(self, date: NaiveDate) -> NaiveDate {
        match self {
            Granularity::Day => date,
            Granularity::Month => date.with_day(1).unwrap_or(date),
            Granularity::Year => date.with_ordinal(1).unwrap_or(date),
        }
    }
}

impl Display for Granularity {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Granularity {
    type Err = AggregateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "day" => Ok(Granularity::Day),
            "month" => Ok(Granularity::Month),
            "year" => Ok(Granularity::Year),
            _ => Err(AggregateError::InvalidGranularity(s.to_string())),
        }
    }
}

/// Running totals for one `(bucket, building_id)` group.
#[derive(Debug, Default)]
struct PeriodTotals {
    kwh: Option<f64>,
    hdd_17c: Option<f64>,
    capacity_or_occupancy: Option<f64>,
}

impl PeriodTotals {
    fn push(&mut self, reading: &RawReading) {
        self.kwh = add_nullable(self.kwh, reading.kwh);
        self.hdd_17c = add_nullable(self.hdd_17c, reading.hdd_17c);
        // occupancy is a state, not a flow: summing it across days would multiply it
        if self.capacity_or_occupancy.is_none() {
            self.capacity_or_occupancy = finite(reading.capacity_or_occupancy);
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Aggregator {
    pub model: BaselineModel,
}

impl Aggregator {
    pub fn new(model: BaselineModel) -> Self {
        Aggregator { model }
    }

    /// Produce one scored row per `(bucket, building_id)` present in `readings`,
    /// ordered by bucket date then building id.
    ///
    /// Readings whose building is missing from `buildings` are kept with null
    /// name/area/coordinates. Buildings without readings produce no rows.
    /// Occupancy comes from the first reading that has one, falling back to
    /// the building's static capacity.
    pub fn aggregate(
        &self,
        readings: &[RawReading],
        buildings: &[Building],
        granularity: Granularity,
    ) -> Vec<AggregatedPeriod> {
        let groups = group_readings(readings, granularity);
        let dimension = index_buildings(buildings);

        let mut orphaned_readings: usize = 0;
        let mut rows = Vec::with_capacity(groups.len());
        for ((date, building_id), (totals, count)) in groups {
            let building = dimension.get(&building_id).copied();
            if building.is_none() {
                orphaned_readings += count;
            }
            let area_m2 = building.and_then(|b| finite(b.area_m2));
            // static capacity stands in when no reading in the group carried an occupancy
            let capacity_or_occupancy = totals
                .capacity_or_occupancy
                .or_else(|| building.and_then(|b| finite(b.capacity_or_occupancy)));
            let cols = self
                .model
                .evaluate(totals.kwh, totals.hdd_17c, capacity_or_occupancy, area_m2);

            rows.push(AggregatedPeriod {
                date,
                building_id,
                kwh: totals.kwh,
                hdd_17c: totals.hdd_17c,
                capacity_or_occupancy,
                area_m2,
                name: building.map(|b| b.name.clone()).filter(|n| !n.trim().is_empty()),
                lat: building.and_then(|b| finite(b.lat)),
                lon: building.and_then(|b| finite(b.lon)),
                expected_kwh: cols.expected_kwh,
                residual: cols.residual,
                kwh_per_m2: cols.kwh_per_m2,
                kwh_per_occupant: cols.kwh_per_occupant,
                z_score: None,
            });
        }

        if orphaned_readings > 0 {
            warn!(
                "Aggregate: {} reading(s) reference buildings missing from the dimension; kept without attributes",
                orphaned_readings
            );
        }

        score_residuals(&mut rows);
        debug!(
            "Aggregate: {} reading(s) -> {} {} period(s)",
            readings.len(),
            rows.len(),
            granularity
        );
        rows
    }

    /// Same as [`Aggregator::aggregate`] with the granularity given by name.
    pub fn aggregate_named(
        &self,
        readings: &[RawReading],
        buildings: &[Building],
        granularity: &str,
    ) -> Result<Vec<AggregatedPeriod>, AggregateError> {
        let granularity = granularity.parse::<Granularity>()?;
        Ok(self.aggregate(readings, buildings, granularity))
    }
}

/// Aggregate with the default baseline weights.
pub fn aggregate(readings: &[RawReading], buildings: &[Building], granularity: Granularity) -> Vec<AggregatedPeriod> {
    Aggregator::default().aggregate(readings, buildings, granularity)
}

fn group_readings(
    readings: &[RawReading],
    granularity: Granularity,
) -> BTreeMap<(NaiveDate, BuildingId), (PeriodTotals, usize)> {
    let mut groups: BTreeMap<(NaiveDate, BuildingId), (PeriodTotals, usize)> = BTreeMap::new();
    for reading in readings {
        let key = (granularity.bucket_start(reading.date), reading.building_id.clone());
        let (totals, count) = groups.entry(key).or_default();
        totals.push(reading);
        *count += 1;
    }
    groups
}

fn index_buildings(buildings: &[Building]) -> BTreeMap<BuildingId, &Building> {
    let mut index = BTreeMap::new();
    for b in buildings {
        if index.contains_key(&b.building_id) {
            warn!("Aggregate: duplicate building {} in dimension; keeping the first row", b.building_id);
            continue;
        }
        index.insert(b.building_id.clone(), b);
    }
    index
}

fn score_residuals(rows: &mut [AggregatedPeriod]) {
    let residuals: Vec<Option<f64>> = rows.iter().map(|r| r.residual).collect();
    for (row, z) in rows.iter_mut().zip(robust_z_scores(&residuals)) {
        row.z_score = z;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn building(id: &str, area: Option<f64>) -> Building {
        Building {
            building_id: BuildingId::from(id),
            city: "Trondheim".to_string(),
            name: format!("Trondheim Studenthus {id}"),
            area_m2: area,
            capacity_or_occupancy: Some(200.0),
            lat: Some(63.43),
            lon: Some(10.39),
        }
    }

    fn reading(date: NaiveDate, id: &str, kwh: Option<f64>, hdd: Option<f64>, occupancy: Option<f64>) -> RawReading {
        RawReading {
            hdd_17c: hdd,
            capacity_or_occupancy: occupancy,
            ..RawReading::new(date, BuildingId::from(id), kwh)
        }
    }

    #[test]
    fn bucket_boundaries() {
        let d = day(2024, 2, 29);
        assert_eq!(Granularity::Day.bucket_start(d), d);
        assert_eq!(Granularity::Month.bucket_start(d), day(2024, 2, 1));
        assert_eq!(Granularity::Year.bucket_start(d), day(2024, 1, 1));
    }

    #[test]
    fn granularity_names() {
        assert_eq!("Month".parse::<Granularity>(), Ok(Granularity::Month));
        assert_eq!(" year ".parse::<Granularity>(), Ok(Granularity::Year));
        assert!("monthly".parse::<Granularity>().is_err());
        assert_eq!("day".parse::<Granularity>(), Ok(Granularity::Day));
        assert_eq!(
            "week".parse::<Granularity>(),
            Err(AggregateError::InvalidGranularity("week".to_string()))
        );
    }

    #[test]
    fn invalid_granularity_fails_fast() {
        let readings = vec![reading(day(2024, 1, 1), "A", Some(1.0), Some(1.0), Some(1.0))];
        let err = Aggregator::default()
            .aggregate_named(&readings, &[building("A", Some(100.0))], "quarter")
            .unwrap_err();
        assert!(err.to_string().contains("quarter"));
    }

    #[test]
    fn yearly_total_equals_sum_of_daily_readings() {
        let mut readings = Vec::new();
        let mut expected = 0.0;
        let mut date = day(2023, 1, 1);
        while date.year() == 2023 {
            let kwh = 100.0 + date.ordinal() as f64;
            expected += kwh;
            readings.push(reading(date, "A", Some(kwh), Some(2.0), Some(150.0)));
            date = date.succ_opt().unwrap();
        }

        let rows = aggregate(&readings, &[building("A", Some(1000.0))], Granularity::Year);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].date, day(2023, 1, 1));
        assert_eq!(rows[0].kwh, Some(expected));
        assert_eq!(rows[0].hdd_17c, Some(730.0));
        assert_eq!(rows[0].capacity_or_occupancy, Some(150.0));
    }

    #[test]
    fn one_row_per_building_and_bucket_in_date_then_id_order() {
        let readings = vec![
            reading(day(2024, 2, 1), "B", Some(5.0), Some(1.0), Some(10.0)),
            reading(day(2024, 1, 31), "A", Some(1.0), Some(1.0), Some(10.0)),
            reading(day(2024, 1, 2), "B", Some(2.0), Some(1.0), Some(10.0)),
            reading(day(2024, 1, 1), "A", Some(3.0), Some(1.0), Some(10.0)),
        ];
        let buildings = vec![building("A", Some(10.0)), building("B", Some(10.0))];
        let rows = aggregate(&readings, &buildings, Granularity::Month);

        let keys: Vec<(NaiveDate, &str)> = rows.iter().map(|r| (r.date, r.building_id.as_str())).collect();
        assert_eq!(
            keys,
            vec![(day(2024, 1, 1), "A"), (day(2024, 1, 1), "B"), (day(2024, 2, 1), "B")]
        );
        assert_eq!(rows[0].kwh, Some(4.0));
        assert_eq!(rows[0].hdd_17c, Some(2.0));
    }

    #[test]
    fn day_granularity_merges_duplicate_readings() {
        let readings = vec![
            reading(day(2024, 3, 4), "A", Some(10.0), Some(1.0), Some(50.0)),
            reading(day(2024, 3, 4), "A", Some(15.0), Some(0.5), Some(60.0)),
        ];
        let rows = aggregate(&readings, &[building("A", Some(100.0))], Granularity::Day);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].kwh, Some(25.0));
        assert_eq!(rows[0].hdd_17c, Some(1.5));
        assert_eq!(rows[0].capacity_or_occupancy, Some(50.0));
    }

    #[test]
    fn occupancy_is_first_present_value_not_a_sum() {
        let readings = vec![
            reading(day(2024, 5, 1), "A", Some(1.0), Some(0.0), None),
            reading(day(2024, 5, 2), "A", Some(1.0), Some(0.0), Some(120.0)),
            reading(day(2024, 5, 3), "A", Some(1.0), Some(0.0), Some(130.0)),
        ];
        let rows = aggregate(&readings, &[building("A", Some(100.0))], Granularity::Month);
        assert_eq!(rows[0].capacity_or_occupancy, Some(120.0));
        assert_eq!(rows[0].expected_kwh, Some(60.0));
        assert_eq!(rows[0].kwh_per_occupant, Some(3.0 / 120.0));
    }

    #[test]
    fn readings_for_unknown_buildings_are_kept_without_attributes() {
        let readings = vec![
            reading(day(2024, 1, 1), "A", Some(10.0), Some(1.0), Some(10.0)),
            reading(day(2024, 1, 1), "GHOST", Some(20.0), Some(1.0), Some(10.0)),
        ];
        let rows = aggregate(&readings, &[building("A", Some(100.0)), building("UNUSED", None)], Granularity::Day);
        assert_eq!(rows.len(), 2);

        let ghost = rows.iter().find(|r| r.building_id.as_str() == "GHOST").expect("ghost row kept");
        assert_eq!(ghost.kwh, Some(20.0));
        assert_eq!(ghost.name, None);
        assert_eq!(ghost.area_m2, None);
        assert_eq!(ghost.lat, None);
        assert_eq!(ghost.kwh_per_m2, None);
        assert_eq!(ghost.expected_kwh, Some(35.0));
        assert!(rows.iter().all(|r| r.building_id.as_str() != "UNUSED"));
    }

    #[test]
    fn zero_area_never_yields_infinite_intensity() {
        let readings: Vec<RawReading> = (1..=28)
            .map(|d| reading(day(2024, 2, d), "A", Some(50.0), Some(3.0), Some(100.0)))
            .collect();
        for granularity in [Granularity::Day, Granularity::Month, Granularity::Year] {
            let rows = aggregate(&readings, &[building("A", Some(0.0))], granularity);
            assert!(rows.iter().all(|r| r.kwh_per_m2.is_none()));
        }
    }

    #[test]
    fn malformed_cells_blank_only_their_own_contribution() {
        let readings = vec![
            reading(day(2024, 1, 1), "A", None, Some(1.0), Some(10.0)),
            reading(day(2024, 1, 2), "A", Some(7.0), Some(f64::NAN), Some(10.0)),
            reading(day(2024, 1, 3), "B", None, None, None),
        ];
        let rows = aggregate(&readings, &[building("A", Some(7.0)), building("B", Some(1.0))], Granularity::Month);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].kwh, Some(7.0));
        assert_eq!(rows[0].hdd_17c, Some(1.0));
        assert_eq!(rows[0].kwh_per_m2, Some(1.0));

        let b = &rows[1];
        assert_eq!(b.kwh, None);
        assert_eq!(b.expected_kwh, None);
        assert_eq!(b.residual, None);
        // a single present residual collapses the scale, so every row scores 0
        assert_eq!(b.z_score, Some(0.0));
    }

    #[test]
    fn scores_residuals_across_the_whole_table() {
        let residual_targets = [-50.0, -10.0, 0.0, 10.0, 50.0];
        let ids = ["A", "B", "C", "D", "E"];
        let readings: Vec<RawReading> = ids
            .iter()
            .zip(residual_targets)
            .map(|(id, r)| reading(day(2024, 1, 1), id, Some(400.0 + r), Some(10.0), Some(200.0)))
            .collect();
        let buildings: Vec<Building> = ids.iter().map(|id| building(id, Some(100.0))).collect();

        let rows = aggregate(&readings, &buildings, Granularity::Month);
        let residuals: Vec<f64> = rows.iter().map(|r| r.residual.unwrap()).collect();
        assert_eq!(residuals, residual_targets.to_vec());
        assert_eq!(rows[2].z_score, Some(0.0));
        assert!((rows[4].z_score.unwrap() - 3.372).abs() < 1e-3);
        assert!((rows[0].z_score.unwrap() + 3.372).abs() < 1e-3);
    }

    #[test]
    fn injected_weights_change_the_baseline() {
        let readings = vec![reading(day(2024, 1, 1), "A", Some(500.0), Some(10.0), Some(100.0))];
        let rows = Aggregator::new(BaselineModel::new(20.0, 1.0)).aggregate(
            &readings,
            &[building("A", Some(100.0))],
            Granularity::Day,
        );
        assert_eq!(rows[0].expected_kwh, Some(300.0));
        assert_eq!(rows[0].residual, Some(200.0));
    }

    #[test]
    fn identical_input_gives_identical_output() {
        let readings: Vec<RawReading> = (1..=60)
            .map(|n| {
                let date = day(2024, 1, 1) + chrono::Duration::days(n);
                let id = if n % 3 == 0 { "A" } else { "B" };
                reading(date, id, Some(n as f64 * 3.5), Some((n % 7) as f64), Some(80.0))
            })
            .collect();
        let buildings = vec![building("A", Some(500.0)), building("B", Some(800.0))];
        let first = aggregate(&readings, &buildings, Granularity::Month);
        let second = aggregate(&readings, &buildings, Granularity::Month);
        assert_eq!(first, second);
    }

    #[test]
    fn empty_input_gives_empty_table() {
        assert!(aggregate(&[], &[building("A", Some(1.0))], Granularity::Year).is_empty());
    }

    #[test]
    fn building_capacity_backs_readings_without_occupancy() {
        let readings = vec![
            reading(day(2024, 1, 1), "A", Some(450.0), Some(10.0), None),
            reading(day(2024, 1, 2), "A", Some(420.0), Some(5.0), None),
            reading(day(2024, 1, 1), "B", Some(300.0), Some(10.0), Some(80.0)),
        ];
        let rows = aggregate(&readings, &[building("A", Some(100.0)), building("B", Some(100.0))], Granularity::Month);

        let a = &rows[0];
        assert_eq!(a.building_id.as_str(), "A");
        assert_eq!(a.capacity_or_occupancy, Some(200.0));
        assert_eq!(a.expected_kwh, Some(550.0));
        assert_eq!(a.residual, Some(320.0));
        assert_eq!(a.kwh_per_occupant, Some(870.0 / 200.0));
        assert!(a.z_score.is_some());

        // per-reading occupancy still wins over the static figure
        assert_eq!(rows[1].capacity_or_occupancy, Some(80.0));
    }

    #[test]
    fn unnamed_building_yields_null_name() {
        let mut unnamed = building("A", Some(100.0));
        unnamed.name = String::new();
        let readings = vec![reading(day(2024, 1, 1), "A", Some(1.0), Some(1.0), Some(1.0))];
        let rows = aggregate(&readings, &[unnamed], Granularity::Day);
        assert_eq!(rows[0].name, None);
    }
}
