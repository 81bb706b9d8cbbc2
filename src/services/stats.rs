//! Median / MAD based robust scaling.
//!
//! All entry points work on nullable samples: `None` (and any non-finite
//! value) is ignored when estimating the centre and spread, and is carried
//! through unchanged at its index in the scored output.

use log::debug;

use crate::utils::finite;

/// Makes the MAD a consistent estimator of the standard deviation for normal data.
pub const MAD_TO_SIGMA: f64 = 1.4826;

/// Median of a sample. Even counts average the two middle values.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        Some(sorted[mid])
    } else {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    }
}

/// Median absolute deviation about the median (unscaled).
pub fn median_absolute_deviation(values: &[f64]) -> Option<f64> {
    let center = median(values)?;
    let deviations: Vec<f64> = values.iter().map(|v| (v - center).abs()).collect();
    median(&deviations)
}

/// `MAD_TO_SIGMA * MAD` over the present values; `None` for an all-missing sample.
pub fn mad_scale(values: &[Option<f64>]) -> Option<f64> {
    median_absolute_deviation(&present(values)).map(|mad| MAD_TO_SIGMA * mad)
}

/// Robust z-score of every entry: `(x - median) / (1.4826 * MAD)`.
///
/// The output has the same length and order as the input. Missing entries
/// stay missing. When the scale collapses (every present value equal, a
/// majority of identical values, or nothing present) every entry, missing
/// or not, scores exactly `0.0` rather than NaN or infinity.
pub fn robust_z_scores(values: &[Option<f64>]) -> Vec<Option<f64>> {
    if values.is_empty() {
        return Vec::new();
    }

    let sample = present(values);
    let scaled = median(&sample).zip(median_absolute_deviation(&sample).map(|mad| MAD_TO_SIGMA * mad));
    let (center, scale) = match scaled {
        Some((center, scale)) if scale.is_finite() && scale > 0.0 => (center, scale),
        _ => {
            debug!(
                "Stats: degenerate scale over {} present value(s); scoring all as 0",
                sample.len()
            );
            return vec![Some(0.0); values.len()];
        }
    };

    values
        .iter()
        .map(|v| finite(*v).map(|x| (x - center) / scale))
        .collect()
}

fn present(values: &[Option<f64>]) -> Vec<f64> {
    values.iter().filter_map(|v| finite(*v)).collect()
}
