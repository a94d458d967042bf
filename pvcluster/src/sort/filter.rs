//! In-memory deduplication of one buffer of triplets.

use itertools::Itertools;
use pvcore::Triplet;

/// Keeps the lowest p-value per unordered pair.
///
/// The result holds canonicalized triplets (`scannr1 <= scannr2`) and is
/// already in ascending total order.
pub fn filter(triplets: Vec<Triplet>) -> Vec<Triplet> {
    triplets
        .into_iter()
        .sorted_unstable()
        .dedup_by(|a, b| a.same_pair(b))
        .map(|t| t.canonicalized())
        .collect()
}

/// Filter followed by an ascending sort of the survivors.
pub fn filter_and_sort(triplets: Vec<Triplet>) -> Vec<Triplet> {
    let mut out = filter(triplets);
    out.sort_unstable();
    out
}
