//! Per-building, per-period energy summaries with an expected-consumption
//! baseline and a robust (median/MAD) anomaly score.

pub mod models {
    pub mod energy;
}

pub mod config;
pub mod utils;
pub mod services {
    pub mod aggregate;
    pub mod baseline;
    pub mod ingest;
    pub mod kpis;
    pub mod prepare;
    pub mod ranking;
    pub mod stats;
}

pub use models::energy::{AggregatedPeriod, Building, BuildingId, Dataset, RawReading, WeatherObservation};
pub use services::aggregate::{AggregateError, Aggregator, Granularity, aggregate};
pub use services::baseline::{BaselineModel, expected_kwh};
pub use services::ranking::top_n;
pub use services::stats::robust_z_scores;
