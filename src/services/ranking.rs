//! Selections over a scored period table for the display layer.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::models::energy::{AggregatedPeriod, Building, BuildingId};
use crate::utils::{finite, mean_present};

/// Largest magnitude shown for a building-level mean score.
pub const MEAN_Z_CLIP: f64 = 3.0;

/// The `n` rows with the largest `|z_score|`.
///
/// Ties are broken by `building_id`, then `date`. Rows without a score
/// rank after every scored row.
pub fn top_n(rows: &[AggregatedPeriod], n: usize) -> Vec<AggregatedPeriod> {
    let mut ranked: Vec<&AggregatedPeriod> = rows.iter().collect();
    ranked.sort_by(|a, b| by_anomaly_magnitude(a, b));
    ranked.into_iter().take(n).cloned().collect()
}

fn by_anomaly_magnitude(a: &AggregatedPeriod, b: &AggregatedPeriod) -> Ordering {
    let magnitude = |row: &AggregatedPeriod| finite(row.z_score).map(f64::abs);
    let by_score = match (magnitude(a), magnitude(b)) {
        (Some(x), Some(y)) => y.total_cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    by_score
        .then_with(|| a.building_id.cmp(&b.building_id))
        .then_with(|| a.date.cmp(&b.date))
}

/// Coarse classification of a robust z-score for colouring and labels.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyBand {
    High,
    Elevated,
    Normal,
    Reduced,
    Low,
}

impl AnomalyBand {
    pub fn from_z(z: f64) -> Self {
        if z > 1.5 {
            AnomalyBand::High
        } else if z > 0.5 {
            AnomalyBand::Elevated
        } else if z < -1.5 {
            AnomalyBand::Low
        } else if z < -0.5 {
            AnomalyBand::Reduced
        } else {
            AnomalyBand::Normal
        }
    }
}

/// Mean score per building across its periods, clipped to `[-3, 3]`.
///
/// Returned in the order of `buildings`; a building with no scored period
/// gets `0.0`.
pub fn building_mean_z(rows: &[AggregatedPeriod], buildings: &[Building]) -> Vec<(BuildingId, f64)> {
    let mut scores: BTreeMap<&BuildingId, Vec<Option<f64>>> = BTreeMap::new();
    for row in rows {
        scores.entry(&row.building_id).or_default().push(row.z_score);
    }

    buildings
        .iter()
        .map(|b| {
            let mean = scores
                .get(&b.building_id)
                .and_then(|zs| mean_present(zs.iter().copied()))
                .unwrap_or(0.0);
            (b.building_id.clone(), mean.clamp(-MEAN_Z_CLIP, MEAN_Z_CLIP))
        })
        .collect()
}
