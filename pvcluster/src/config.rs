use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use pvcore::{PvError, Result};
use serde::de::DeserializeOwned;

/// Reads a JSON configuration file; missing fields take their defaults when
/// the target type is `#[serde(default)]`.
pub fn read_json_config<T: DeserializeOwned, P: AsRef<Path>>(path: P) -> Result<T> {
    let reader = BufReader::new(File::open(path)?);
    serde_json::from_reader(reader).map_err(|e| PvError::Serialization(e.to_string()))
}
