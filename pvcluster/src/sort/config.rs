//! Sort/filter pipeline configuration.

use std::path::Path;

use pvcore::{PvError, Result, TripletFormat};
use serde::{Deserialize, Serialize};

use crate::config::read_json_config;

/// Records held in memory per shard (20 bytes per record).
pub const DEFAULT_MAX_RECORDS_PER_SHARD: usize = 50_000_000;

/// How records are routed to shards during partitioning.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionScheme {
    /// Hash of the canonical `(min, max)` pair. Both directed forms of a pair
    /// land in the same shard.
    #[default]
    CanonicalPair,
    /// `((a.scannr mod k) + (b.scannr mod k)) mod k`, the legacy key. Both
    /// directed forms also land together (addition commutes) but pairs are
    /// spread by scan number only; kept for reproducing older shard layouts.
    ResidueSum,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SortConfig {
    /// Upper bound on records per shard and per partition buffer.
    pub max_records_per_shard: usize,
    /// Upper bound on records buffered by the k-way merge.
    pub merge_budget: usize,
    /// Workers sorting shards in parallel.
    pub num_threads: usize,
    pub input_format: TripletFormat,
    pub partition: PartitionScheme,
    /// Delete the input files after a successful run.
    pub remove_inputs: bool,
}

impl Default for SortConfig {
    fn default() -> Self {
        Self {
            max_records_per_shard: DEFAULT_MAX_RECORDS_PER_SHARD,
            merge_budget: DEFAULT_MAX_RECORDS_PER_SHARD,
            num_threads: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            input_format: TripletFormat::Binary,
            partition: PartitionScheme::CanonicalPair,
            remove_inputs: true,
        }
    }
}

impl SortConfig {
    /// Small budgets, single thread, inputs kept. Useful for tests and tiny
    /// inputs.
    pub fn with_budget(max_records_per_shard: usize) -> Self {
        Self {
            max_records_per_shard,
            merge_budget: max_records_per_shard,
            num_threads: 1,
            remove_inputs: false,
            ..Self::default()
        }
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config: SortConfig = read_json_config(path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_records_per_shard == 0 {
            return Err(PvError::config("max_records_per_shard must be > 0"));
        }
        if self.merge_budget < 2 {
            return Err(PvError::config("merge_budget must be >= 2"));
        }
        if self.num_threads == 0 {
            return Err(PvError::config("num_threads must be > 0"));
        }
        Ok(())
    }
}
