//! Hash partitioning of the unsorted triplet stream into shard files.

use std::path::{Path, PathBuf};

use pvcore::io::triplet_file::{estimate_records, write_triplets, TripletReader};
use pvcore::{Result, Triplet, TripletFormat};
use tracing::{info, warn};

use crate::sort::config::PartitionScheme;

/// Shard file path: `{result}.{shard}`.
pub fn shard_path(result: &Path, shard: usize) -> PathBuf {
    let mut name = result.as_os_str().to_os_string();
    name.push(format!(".{}", shard));
    PathBuf::from(name)
}

/// Number of shards for `estimated` records under `budget` records per shard.
pub fn shard_count(estimated: u64, budget: usize) -> usize {
    if estimated == 0 {
        return 0;
    }
    estimated.div_ceil(budget as u64) as usize
}

#[inline]
fn mix64(mut x: u64) -> u64 {
    // splitmix64 finalizer
    x ^= x >> 30;
    x = x.wrapping_mul(0xbf58_476d_1ce4_e5b9);
    x ^= x >> 27;
    x = x.wrapping_mul(0x94d0_49bb_1331_11eb);
    x ^ (x >> 31)
}

/// Shard index of `t` among `k` shards.
#[inline]
pub fn shard_of(t: &Triplet, k: usize, scheme: PartitionScheme) -> usize {
    match scheme {
        PartitionScheme::ResidueSum => {
            let k = k as u64;
            (((t.scannr1.scannr as u64 % k) + (t.scannr2.scannr as u64 % k)) % k) as usize
        }
        PartitionScheme::CanonicalPair => {
            let (lo, hi) = t.canonical_pair();
            let a = ((lo.file_idx as u64) << 32) | lo.scannr as u64;
            let b = ((hi.file_idx as u64) << 32) | hi.scannr as u64;
            (mix64(mix64(a) ^ b.rotate_left(17)) % k as u64) as usize
        }
    }
}

/// Streams every input into `num_shards` shard files next to `result`.
///
/// At most `buffer_size` records are held before they are routed and
/// appended. Unreadable inputs are skipped with a warning. Returns the number
/// of records routed.
pub fn split_by_hash<P: AsRef<Path>>(
    inputs: &[P],
    result: &Path,
    num_shards: usize,
    buffer_size: usize,
    format: TripletFormat,
    scheme: PartitionScheme,
) -> Result<u64> {
    if num_shards == 0 {
        return Ok(0);
    }
    // start from empty shards; stale files from an aborted run must not leak in
    for shard in 0..num_shards {
        write_triplets(shard_path(result, shard), &[], false, TripletFormat::Binary)?;
    }

    let mut buffer: Vec<Triplet> = Vec::with_capacity(buffer_size.min(1 << 20));
    let mut routed = 0u64;

    for input in inputs {
        let input = input.as_ref();
        if estimate_records(input, format) == 0 {
            continue;
        }
        let mut reader = match TripletReader::open(input, format) {
            Ok(r) => r,
            Err(e) => {
                warn!(path = %input.display(), error = %e, "could not open p-value file, skipping");
                continue;
            }
        };
        loop {
            let want = buffer_size - buffer.len();
            let n = reader.read_batch_into(want, &mut buffer)?;
            if buffer.len() >= buffer_size {
                routed += buffer.len() as u64;
                info!(routed, "hashing p-values");
                write_buffer_to_shards(&mut buffer, result, num_shards, scheme)?;
            }
            if n == 0 || reader.is_done() {
                break;
            }
        }
    }

    if !buffer.is_empty() {
        routed += buffer.len() as u64;
        write_buffer_to_shards(&mut buffer, result, num_shards, scheme)?;
    }
    Ok(routed)
}

/// Routes and appends every buffered record, leaving `buffer` empty.
fn write_buffer_to_shards(
    buffer: &mut Vec<Triplet>,
    result: &Path,
    num_shards: usize,
    scheme: PartitionScheme,
) -> Result<()> {
    let mut bins: Vec<Vec<Triplet>> = vec![Vec::new(); num_shards];
    for t in buffer.drain(..) {
        bins[shard_of(&t, num_shards, scheme)].push(t);
    }
    for (shard, bin) in bins.iter().enumerate() {
        if !bin.is_empty() {
            write_triplets(shard_path(result, shard), bin, true, TripletFormat::Binary)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pvcore::io::triplet_file::read_triplets;
    use pvcore::ScanId;

    #[test]
    fn test_shard_count() {
        assert_eq!(shard_count(0, 10), 0);
        assert_eq!(shard_count(1, 10), 1);
        assert_eq!(shard_count(10, 10), 1);
        assert_eq!(shard_count(11, 10), 2);
    }

    #[test]
    fn test_shard_path() {
        let p = shard_path(Path::new("/tmp/out.pvals"), 3);
        assert_eq!(p, PathBuf::from("/tmp/out.pvals.3"));
    }

    #[test]
    fn test_both_directions_share_a_shard() {
        for scheme in [PartitionScheme::CanonicalPair, PartitionScheme::ResidueSum] {
            for k in 1..9 {
                for a in 0..20u32 {
                    for b in 0..20u32 {
                        let fwd = Triplet::new(ScanId::new(0, a), ScanId::new(1, b), 0.1);
                        let rev = Triplet::new(ScanId::new(1, b), ScanId::new(0, a), 0.2);
                        let s = shard_of(&fwd, k, scheme);
                        assert!(s < k);
                        assert_eq!(s, shard_of(&rev, k, scheme));
                    }
                }
            }
        }
    }

    #[test]
    fn test_split_routes_everything() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.bin");
        let result = dir.path().join("out.bin");
        let triplets: Vec<Triplet> = (0..50u32)
            .map(|i| Triplet::new(ScanId::new(0, i), ScanId::new(0, i + 1), i as f32))
            .collect();
        write_triplets(&input, &triplets, false, TripletFormat::Binary).unwrap();

        let routed = split_by_hash(
            &[&input],
            &result,
            4,
            7,
            TripletFormat::Binary,
            PartitionScheme::CanonicalPair,
        )
        .unwrap();
        assert_eq!(routed, 50);

        let total: usize = (0..4)
            .map(|s| read_triplets(shard_path(&result, s), TripletFormat::Binary).unwrap().len())
            .sum();
        assert_eq!(total, 50);
    }

    #[test]
    fn test_missing_input_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.bin");
        let result = dir.path().join("out.bin");
        let routed = split_by_hash(
            &[&missing],
            &result,
            2,
            10,
            TripletFormat::Binary,
            PartitionScheme::ResidueSum,
        )
        .unwrap();
        assert_eq!(routed, 0);
    }
}
