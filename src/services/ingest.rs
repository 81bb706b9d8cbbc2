use crate::models::energy::Dataset;
use log::info;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Decode a dataset document; structural errors name the offending JSON path.
pub fn decode_dataset<R: Read>(reader: R) -> Result<Dataset, String> {
    let de = &mut serde_json::Deserializer::from_reader(reader);
    serde_path_to_error::deserialize(de).map_err(|e| format!("invalid dataset at `{}`: {}", e.path(), e.inner()))
}

pub fn load_dataset(path: &Path) -> Result<Dataset, String> {
    let file = File::open(path).map_err(|e| format!("failed to open {}: {}", path.display(), e))?;
    let dataset = decode_dataset(BufReader::new(file)).map_err(|e| format!("{}: {}", path.display(), e))?;
    info!(
        "Ingest: loaded {} building(s), {} reading(s), {} weather row(s) from {}",
        dataset.buildings.len(),
        dataset.readings.len(),
        dataset.weather.len(),
        path.display()
    );
    Ok(dataset)
}
