use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PvError;

/// Composite identifier of a spectrum: index of the source file and the
/// scan number inside that file.
///
/// Ordering is by file index first, then scan number. Merged cluster nodes
/// get identifiers with `file_idx` equal to the merge offset (the number of
/// registered source files), so they never collide with a real scan.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ScanId {
    pub file_idx: u32,
    pub scannr: u32,
}

impl ScanId {
    pub fn new(file_idx: u32, scannr: u32) -> Self {
        ScanId { file_idx, scannr }
    }

    /// Synthetic identifier for the `counter`-th merge of a clustering run.
    pub fn merged(merge_offset: u32, counter: u32) -> Self {
        ScanId { file_idx: merge_offset, scannr: counter }
    }

    /// True if this id lies in the synthetic range starting at `merge_offset`.
    pub fn is_merged(&self, merge_offset: u32) -> bool {
        self.file_idx >= merge_offset
    }
}

impl fmt::Display for ScanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file_idx, self.scannr)
    }
}

impl FromStr for ScanId {
    type Err = PvError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || PvError::Serialization(format!("malformed scan id: {:?}", s));
        let (file_idx, scannr) = s.split_once(':').ok_or_else(bad)?;
        Ok(ScanId {
            file_idx: file_idx.trim().parse().map_err(|_| bad())?,
            scannr: scannr.trim().parse().map_err(|_| bad())?,
        })
    }
}
