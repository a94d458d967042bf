use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::data::scan_id::ScanId;

/// An undirected p-value between two scans; lower is more similar.
///
/// The endpoints are stored as produced, not canonically ordered. Comparison
/// and equality work on the canonical pair `(min, max)` followed by the
/// p-value, so `(a, b, p)` and `(b, a, p)` compare equal.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Triplet {
    pub scannr1: ScanId,
    pub scannr2: ScanId,
    pub pval: f32,
}

impl Triplet {
    pub fn new(scannr1: ScanId, scannr2: ScanId, pval: f32) -> Self {
        Triplet { scannr1, scannr2, pval }
    }

    #[inline]
    pub fn canonical_pair(&self) -> (ScanId, ScanId) {
        if self.scannr1 <= self.scannr2 {
            (self.scannr1, self.scannr2)
        } else {
            (self.scannr2, self.scannr1)
        }
    }

    /// Copy with `scannr1 <= scannr2`.
    pub fn canonicalized(&self) -> Self {
        let (lo, hi) = self.canonical_pair();
        Triplet { scannr1: lo, scannr2: hi, pval: self.pval }
    }

    /// True if both triplets describe the same unordered pair.
    #[inline]
    pub fn same_pair(&self, other: &Triplet) -> bool {
        self.canonical_pair() == other.canonical_pair()
    }

    pub fn is_self_loop(&self) -> bool {
        self.scannr1 == self.scannr2
    }
}

impl Ord for Triplet {
    fn cmp(&self, other: &Self) -> Ordering {
        self.canonical_pair()
            .cmp(&other.canonical_pair())
            .then_with(|| self.pval.total_cmp(&other.pval))
    }
}

impl PartialOrd for Triplet {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Triplet {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Triplet {}

/// Report form: `root1 root2 value`.
impl fmt::Display for Triplet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\t{}\t{}", self.scannr1, self.scannr2, self.pval)
    }
}
