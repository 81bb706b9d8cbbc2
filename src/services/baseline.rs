//! Expected-consumption baseline and the ratios derived from it.

use serde::{Deserialize, Serialize};

use crate::utils::finite;

pub const DEFAULT_WEIGHT_HDD: f64 = 30.0;
pub const DEFAULT_WEIGHT_OCCUPANCY: f64 = 0.5;

/// Linear baseline: `weight_hdd * hdd_17c + weight_occupancy * capacity_or_occupancy`.
///
/// The weights are tuning knobs, not physical constants; callers inject them
/// (see `crate::config::Config`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BaselineModel {
    pub weight_hdd: f64,
    pub weight_occupancy: f64,
}

impl Default for BaselineModel {
    fn default() -> Self {
        BaselineModel {
            weight_hdd: DEFAULT_WEIGHT_HDD,
            weight_occupancy: DEFAULT_WEIGHT_OCCUPANCY,
        }
    }
}

/// Derived columns for one aggregated period.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BaselineColumns {
    pub expected_kwh: Option<f64>,
    pub residual: Option<f64>,
    pub kwh_per_m2: Option<f64>,
    pub kwh_per_occupant: Option<f64>,
}

impl BaselineModel {
    pub fn new(weight_hdd: f64, weight_occupancy: f64) -> Self {
        BaselineModel {
            weight_hdd,
            weight_occupancy,
        }
    }

    /// `None` if either driver is missing; a missing baseline is never zero.
    pub fn expected_kwh(&self, hdd_17c: Option<f64>, capacity_or_occupancy: Option<f64>) -> Option<f64> {
        let hdd = finite(hdd_17c)?;
        let occupancy = finite(capacity_or_occupancy)?;
        finite(Some(self.weight_hdd * hdd + self.weight_occupancy * occupancy))
    }

    pub fn evaluate(
        &self,
        kwh: Option<f64>,
        hdd_17c: Option<f64>,
        capacity_or_occupancy: Option<f64>,
        area_m2: Option<f64>,
    ) -> BaselineColumns {
        let expected_kwh = self.expected_kwh(hdd_17c, capacity_or_occupancy);
        BaselineColumns {
            expected_kwh,
            residual: residual(kwh, expected_kwh),
            kwh_per_m2: ratio(kwh, area_m2),
            kwh_per_occupant: ratio(kwh, capacity_or_occupancy),
        }
    }
}

/// Free-function form of [`BaselineModel::expected_kwh`].
pub fn expected_kwh(
    hdd_17c: Option<f64>,
    capacity_or_occupancy: Option<f64>,
    weight_hdd: f64,
    weight_occupancy: f64,
) -> Option<f64> {
    BaselineModel::new(weight_hdd, weight_occupancy).expected_kwh(hdd_17c, capacity_or_occupancy)
}

pub fn residual(kwh: Option<f64>, expected_kwh: Option<f64>) -> Option<f64> {
    Some(finite(kwh)? - finite(expected_kwh)?)
}

/// `numerator / denominator` for a strictly positive denominator, else `None`.
pub fn ratio(numerator: Option<f64>, denominator: Option<f64>) -> Option<f64> {
    match (finite(numerator), finite(denominator)) {
        (Some(n), Some(d)) if d > 0.0 => finite(Some(n / d)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_weights() {
        let model = BaselineModel::default();
        assert_eq!(model.expected_kwh(Some(10.0), Some(200.0)), Some(400.0));
    }

    #[test]
    fn weights_are_injectable() {
        let model = BaselineModel::new(30.0, 0.6);
        assert_eq!(model.expected_kwh(Some(10.0), Some(200.0)), Some(420.0));
        assert_eq!(expected_kwh(Some(1.0), Some(1.0), 2.0, 3.0), Some(5.0));
    }

    #[test]
    fn missing_driver_means_missing_baseline() {
        let model = BaselineModel::default();
        assert_eq!(model.expected_kwh(None, Some(200.0)), None);
        assert_eq!(model.expected_kwh(Some(12.0), None), None);

        let cols = model.evaluate(Some(900.0), None, Some(200.0), Some(1000.0));
        assert_eq!(cols.expected_kwh, None);
        assert_eq!(cols.residual, None);
        assert_eq!(cols.kwh_per_m2, Some(0.9));
        assert_eq!(cols.kwh_per_occupant, Some(4.5));
    }

    #[test]
    fn residual_is_actual_minus_expected() {
        let cols = BaselineModel::default().evaluate(Some(500.0), Some(10.0), Some(200.0), Some(2000.0));
        assert_eq!(cols.expected_kwh, Some(400.0));
        assert_eq!(cols.residual, Some(100.0));
    }

    #[test]
    fn ratios_are_none_for_zero_or_missing_denominators() {
        assert_eq!(ratio(Some(100.0), Some(0.0)), None);
        assert_eq!(ratio(Some(100.0), None), None);
        assert_eq!(ratio(Some(100.0), Some(-5.0)), None);
        assert_eq!(ratio(None, Some(10.0)), None);
        assert_eq!(ratio(Some(100.0), Some(4.0)), Some(25.0));
    }
}
