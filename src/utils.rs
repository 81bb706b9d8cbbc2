//! Numeric hygiene shared by every stage of the pipeline.
//!
//! Loaders hand us loosely typed cells (numbers, numeric strings, blanks, junk).
//! Everything that is not a finite number becomes `None` so that one bad cell
//! only blanks its own row instead of aborting the batch.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Drop non-finite values; `None` stays `None`.
pub fn finite(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

/// Coerce a raw JSON cell into a float, mapping anything unparsable to `None`.
pub fn coerce_numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => finite(n.as_f64()),
        Value::String(s) => finite(s.trim().parse::<f64>().ok()),
        Value::Null | Value::Bool(_) | Value::Array(_) | Value::Object(_) => None,
    }
}

/// `deserialize_with` adapter for nullable numeric columns.
///
/// Pair with `#[serde(default)]` so that absent columns also decode as `None`.
pub fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(coerce_numeric(&value))
}

/// Sum that treats `None` as "no contribution" but keeps an all-`None` sum as `None`.
pub fn add_nullable(total: Option<f64>, value: Option<f64>) -> Option<f64> {
    match (total, finite(value)) {
        (Some(t), Some(v)) => Some(t + v),
        (None, v) => v,
        (t, None) => t,
    }
}

/// Mean over the present values; `None` when nothing is present.
pub fn mean_present<I>(values: I) -> Option<f64>
where
    I: IntoIterator<Item = Option<f64>>,
{
    let (sum, count) = values
        .into_iter()
        .filter_map(finite)
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 { None } else { Some(sum / count as f64) }
}
