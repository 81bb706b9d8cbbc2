//! Headline figures and time series over a scored period table.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::models::energy::AggregatedPeriod;
use crate::services::prepare::HDD_BASE_C;
use crate::utils::{add_nullable, mean_present};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct KpiSummary {
    pub total_kwh: Option<f64>,
    pub mean_kwh_per_m2: Option<f64>,
    pub mean_kwh_per_occupant: Option<f64>,
    pub mean_hdd_17c: Option<f64>,
    /// Mean temperature implied by the mean degree days (`17 - mean_hdd_17c`).
    pub implied_mean_temp_c: Option<f64>,
}

impl KpiSummary {
    pub fn from_periods(rows: &[AggregatedPeriod]) -> Self {
        let total_kwh = rows.iter().fold(None, |acc, r| add_nullable(acc, r.kwh));
        let mean_hdd_17c = mean_present(rows.iter().map(|r| r.hdd_17c));
        KpiSummary {
            total_kwh,
            mean_kwh_per_m2: mean_present(rows.iter().map(|r| r.kwh_per_m2)),
            mean_kwh_per_occupant: mean_present(rows.iter().map(|r| r.kwh_per_occupant)),
            mean_hdd_17c,
            implied_mean_temp_c: mean_hdd_17c.map(|hdd| HDD_BASE_C - hdd),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Kwh,
    KwhPerM2,
    KwhPerOccupant,
}

impl Metric {
    pub fn value(self, row: &AggregatedPeriod) -> Option<f64> {
        match self {
            Metric::Kwh => row.kwh,
            Metric::KwhPerM2 => row.kwh_per_m2,
            Metric::KwhPerOccupant => row.kwh_per_occupant,
        }
    }
}

/// Sum of `metric` over all rows sharing a bucket date, ascending by date.
pub fn period_totals(rows: &[AggregatedPeriod], metric: Metric) -> Vec<(NaiveDate, Option<f64>)> {
    let mut totals: BTreeMap<NaiveDate, Option<f64>> = BTreeMap::new();
    for row in rows {
        let slot = totals.entry(row.date).or_insert(None);
        *slot = add_nullable(*slot, metric.value(row));
    }
    totals.into_iter().collect()
}
