//! Out-of-core filter-and-sort of p-value triplet files.

use std::path::{Path, PathBuf};
use std::time::Instant;

use pvcore::io::mapped::MappedTriplets;
use pvcore::io::triplet_file::{estimate_records_all, write_triplets};
use pvcore::{PvError, Result, TripletFormat};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{debug, info, warn};

use crate::sort::config::SortConfig;
use crate::sort::filter::filter_and_sort;
use crate::sort::merge::{external_merge_sort, merge_sorted_runs};
use crate::sort::partition::{shard_count, shard_path, split_by_hash};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SortSummary {
    pub estimated: u64,
    pub shards: usize,
    /// Records routed into shards.
    pub routed: u64,
    /// Distinct pairs written to the result.
    pub written: u64,
    pub duplicates_dropped: u64,
    /// Largest batch sorted in memory during the shard stage.
    pub max_sorted_batch: usize,
}

/// Turns unordered, duplicated triplet files into one sorted, deduplicated
/// binary file.
///
/// Owns a fixed worker pool used for the per-shard sort stage.
pub struct PvalueSorter {
    config: SortConfig,
    pool: ThreadPool,
}

impl PvalueSorter {
    pub fn new(config: SortConfig) -> Result<Self> {
        config.validate()?;
        let pool = ThreadPoolBuilder::new()
            .num_threads(config.num_threads)
            .build()
            .map_err(|e| PvError::ThreadPool(e.to_string()))?;
        Ok(PvalueSorter { config, pool })
    }

    pub fn config(&self) -> &SortConfig {
        &self.config
    }

    /// Sorts a single binary file in place.
    pub fn filter_and_sort_file<P: AsRef<Path>>(&self, path: P) -> Result<SortSummary> {
        let path = path.as_ref();
        self.filter_and_sort(&[path], path)
    }

    /// Partitions `inputs` into shards, sorts and deduplicates every shard in
    /// parallel, then merges them into `result` (binary records).
    ///
    /// `result` may be one of the inputs. Inputs other than `result` are
    /// deleted afterwards when `remove_inputs` is set.
    pub fn filter_and_sort<P: AsRef<Path>>(&self, inputs: &[P], result: &Path) -> Result<SortSummary> {
        let start = Instant::now();
        let format = self.config.input_format;
        let budget = self.config.max_records_per_shard;

        let estimated = estimate_records_all(inputs, format);
        let shards = shard_count(estimated, budget);
        info!(estimated, shards, "partitioning p-values");

        let routed = split_by_hash(inputs, result, shards, budget, format, self.config.partition)?;
        info!(routed, elapsed_sec = start.elapsed().as_secs_f64(), "partitioning done");

        let max_sorted_batch = self.sort_shards(result, shards)?;
        info!(elapsed_sec = start.elapsed().as_secs_f64(), "shard sorting done");

        let stats = external_merge_sort(result, shards, self.config.merge_budget)?;

        if self.config.remove_inputs {
            for input in inputs {
                let input = input.as_ref();
                if input == result {
                    continue;
                }
                if let Err(e) = std::fs::remove_file(input) {
                    warn!(path = %input.display(), error = %e, "could not remove input");
                }
            }
        }

        info!(
            written = stats.written,
            duplicates_dropped = stats.duplicates_dropped,
            elapsed_sec = start.elapsed().as_secs_f64(),
            "filter and sort finished"
        );
        Ok(SortSummary {
            estimated,
            shards,
            routed,
            written: stats.written,
            duplicates_dropped: stats.duplicates_dropped,
            max_sorted_batch,
        })
    }

    /// Sorts and deduplicates every shard file on the worker pool; returns
    /// only after all shards are done, with the largest batch sorted in
    /// memory.
    fn sort_shards(&self, result: &Path, shards: usize) -> Result<usize> {
        self.pool.install(|| {
            (0..shards)
                .into_par_iter()
                .map(|shard| -> Result<usize> {
                    if shard % 10 == 0 {
                        info!(shard = shard + 1, shards, percent = (shard + 1) * 100 / shards, "sorting and filtering shard");
                    }
                    self.sort_shard(&shard_path(result, shard))
                })
                .try_reduce(|| 0, |a, b| Ok(a.max(b)))
        })
    }

    /// Sorts one shard in place. Hash routing can leave a shard above the
    /// record budget; such a shard is sorted in budget-sized runs that are
    /// merged back.
    fn sort_shard(&self, path: &Path) -> Result<usize> {
        let budget = self.config.max_records_per_shard;
        let mut reader = MappedTriplets::open(path)?;
        let records = reader.len();
        if records == 0 {
            return Ok(0);
        }

        if records <= budget {
            let filtered = filter_and_sort(reader.read_batch(records));
            drop(reader);
            debug!(path = %path.display(), before = records, after = filtered.len(), "shard filtered");
            write_triplets(path, &filtered, false, TripletFormat::Binary)?;
            return Ok(records);
        }

        let mut runs: Vec<PathBuf> = Vec::with_capacity(records.div_ceil(budget));
        let mut largest = 0;
        while !reader.is_exhausted() {
            let batch = reader.read_batch(budget);
            largest = largest.max(batch.len());
            let run = filter_and_sort(batch);
            let run_path = shard_run_path(path, runs.len());
            write_triplets(&run_path, &run, false, TripletFormat::Binary)?;
            runs.push(run_path);
        }
        // the mapping must be gone before the shard is rewritten
        drop(reader);
        warn!(path = %path.display(), records, budget, runs = runs.len(), "shard above budget, sorting in runs");
        let stats = merge_sorted_runs(&runs, path, self.config.merge_budget)?;
        debug!(path = %path.display(), before = records, after = stats.written, "shard filtered");
        Ok(largest)
    }
}

fn shard_run_path(shard: &Path, run: usize) -> PathBuf {
    let mut name = shard.as_os_str().to_os_string();
    name.push(format!(".run{}", run));
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sort::config::PartitionScheme;
    use pvcore::io::triplet_file::read_triplets;
    use pvcore::{ScanId, Triplet};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::collections::HashMap;

    fn config(budget: usize, scheme: PartitionScheme) -> SortConfig {
        SortConfig {
            num_threads: 2,
            partition: scheme,
            remove_inputs: false,
            ..SortConfig::with_budget(budget)
        }
    }

    fn random_stream(n: usize, seed: u64) -> Vec<Triplet> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n)
            .map(|_| {
                let a = ScanId::new(rng.gen_range(0..3), rng.gen_range(0..25));
                let b = ScanId::new(rng.gen_range(0..3), rng.gen_range(0..25));
                Triplet::new(a, b, rng.gen_range(0.0f32..1.0))
            })
            .collect()
    }

    #[test]
    fn test_sorted_dedup_against_in_memory_reference() {
        for scheme in [PartitionScheme::CanonicalPair, PartitionScheme::ResidueSum] {
            let dir = tempfile::tempdir().unwrap();
            let in1 = dir.path().join("a.bin");
            let in2 = dir.path().join("b.bin");
            let result = dir.path().join("sorted.bin");
            let s1 = random_stream(700, 1);
            let s2 = random_stream(500, 2);
            write_triplets(&in1, &s1, false, TripletFormat::Binary).unwrap();
            write_triplets(&in2, &s2, false, TripletFormat::Binary).unwrap();

            let sorter = PvalueSorter::new(config(100, scheme)).unwrap();
            let summary = sorter.filter_and_sort(&[&in1, &in2], &result).unwrap();
            assert_eq!(summary.shards, 12);
            assert_eq!(summary.routed, 1200);
            assert!(summary.max_sorted_batch <= 100);

            let out = read_triplets(&result, TripletFormat::Binary).unwrap();
            assert!(out.windows(2).all(|w| w[0] < w[1]));

            let mut best: HashMap<(ScanId, ScanId), f32> = HashMap::new();
            for t in s1.iter().chain(s2.iter()) {
                let e = best.entry(t.canonical_pair()).or_insert(f32::INFINITY);
                *e = e.min(t.pval);
            }
            assert_eq!(out.len(), best.len());
            assert_eq!(summary.written as usize, best.len());
            for t in &out {
                assert_eq!(best[&t.canonical_pair()], t.pval);
            }
        }
    }

    #[test]
    fn test_oversized_shard_sorted_in_runs() {
        let dir = tempfile::tempdir().unwrap();
        let result = dir.path().join("sorted.bin");
        let mut stream = random_stream(250, 9);
        stream.extend(random_stream(40, 9).iter().map(|t| Triplet::new(t.scannr2, t.scannr1, t.pval + 0.5)));
        write_triplets(shard_path(&result, 0), &stream, false, TripletFormat::Binary).unwrap();

        let sorter = PvalueSorter::new(config(60, PartitionScheme::CanonicalPair)).unwrap();
        let largest = sorter.sort_shards(&result, 1).unwrap();
        assert!(largest <= 60);

        let out = read_triplets(shard_path(&result, 0), TripletFormat::Binary).unwrap();
        assert_eq!(out, filter_and_sort(stream));
        let files: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn test_invalid_utf8_text_input_is_truncated() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.tsv");
        let result = dir.path().join("sorted.bin");
        let mut bytes = b"0:1\t0:2\t0.2\n0:3\t0:4\t0.1\n".to_vec();
        bytes.extend_from_slice(b"0:5\t\xff\xfe\t0.3\n0:7\t0:8\t0.4\n");
        std::fs::write(&input, bytes).unwrap();

        let cfg = SortConfig { input_format: TripletFormat::Text, ..config(10, PartitionScheme::CanonicalPair) };
        let summary = PvalueSorter::new(cfg).unwrap().filter_and_sort(&[&input], &result).unwrap();
        assert_eq!(summary.written, 2);
    }

    #[test]
    fn test_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.bin");
        let result = dir.path().join("sorted.bin");
        write_triplets(&input, &random_stream(400, 7), false, TripletFormat::Binary).unwrap();

        let sorter = PvalueSorter::new(config(64, PartitionScheme::CanonicalPair)).unwrap();
        sorter.filter_and_sort(&[&input], &result).unwrap();
        let first = std::fs::read(&result).unwrap();

        sorter.filter_and_sort_file(&result).unwrap();
        let second = std::fs::read(&result).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_text_input() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.tsv");
        let result = dir.path().join("sorted.bin");
        std::fs::write(&input, "0:1\t0:2\t0.2\n0:2\t0:1\t0.05\n0:3\t0:4\t0.9\n").unwrap();

        let cfg = SortConfig {
            input_format: TripletFormat::Text,
            ..config(10, PartitionScheme::CanonicalPair)
        };
        let summary = PvalueSorter::new(cfg).unwrap().filter_and_sort(&[&input], &result).unwrap();
        assert_eq!(summary.written, 2);
        let out = read_triplets(&result, TripletFormat::Binary).unwrap();
        assert_eq!(out[0].pval, 0.05);
        assert_eq!(out[1].pval, 0.9);
    }

    #[test]
    fn test_empty_and_missing_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let empty = dir.path().join("empty.bin");
        let missing = dir.path().join("missing.bin");
        let result = dir.path().join("sorted.bin");
        std::fs::write(&empty, b"").unwrap();

        let sorter = PvalueSorter::new(config(10, PartitionScheme::CanonicalPair)).unwrap();
        let summary = sorter.filter_and_sort(&[&empty, &missing], &result).unwrap();
        assert_eq!(summary.shards, 0);
        assert_eq!(summary.written, 0);
        assert_eq!(std::fs::metadata(&result).unwrap().len(), 0);
    }

    #[test]
    fn test_remove_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.bin");
        let result = dir.path().join("sorted.bin");
        write_triplets(&input, &random_stream(20, 3), false, TripletFormat::Binary).unwrap();

        let cfg = SortConfig { remove_inputs: true, ..config(10, PartitionScheme::CanonicalPair) };
        PvalueSorter::new(cfg).unwrap().filter_and_sort(&[&input], &result).unwrap();
        assert!(!input.exists());
        assert!(result.exists());
    }
}
