//! Read-only memory mapped view over a binary triplet file with a cursor.

use std::fs::File;
use std::io;
use std::path::Path;

use memmap2::Mmap;

use crate::data::triplet::Triplet;
use crate::io::binary::{decode_record, records, RECORD_SIZE};

/// Cursor over the complete records of a mapped binary triplet file.
///
/// Records are decoded straight from the mapping. Bytes past the last
/// complete record are never read.
pub struct MappedTriplets {
    mmap: Option<Mmap>,
    num_records: usize,
    cursor: usize,
}

impl MappedTriplets {
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = File::open(path.as_ref())?;
        let len = file.metadata()?.len() as usize;
        // mapping a zero-length file fails on some platforms
        let mmap = if len >= RECORD_SIZE {
            Some(unsafe { Mmap::map(&file)? })
        } else {
            None
        };
        Ok(MappedTriplets {
            mmap,
            num_records: len / RECORD_SIZE,
            cursor: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.num_records
    }

    pub fn is_empty(&self) -> bool {
        self.num_records == 0
    }

    pub fn remaining(&self) -> usize {
        self.num_records - self.cursor
    }

    pub fn is_exhausted(&self) -> bool {
        self.cursor >= self.num_records
    }

    /// Decodes up to `max` records from the cursor and advances past them.
    pub fn read_batch(&mut self, max: usize) -> Vec<Triplet> {
        let n = max.min(self.remaining());
        let mut out = Vec::with_capacity(n);
        self.read_batch_into(n, &mut out);
        out
    }

    /// Same as [`read_batch`](Self::read_batch) but appends to `out`; returns
    /// the number of records appended.
    pub fn read_batch_into(&mut self, max: usize, out: &mut Vec<Triplet>) -> usize {
        let n = max.min(self.remaining());
        if let Some(mmap) = &self.mmap {
            let start = self.cursor * RECORD_SIZE;
            let bytes = &mmap[start..start + n * RECORD_SIZE];
            out.extend(records(bytes).map(decode_record));
        }
        self.cursor += n;
        n
    }
}

impl Iterator for MappedTriplets {
    type Item = Triplet;

    fn next(&mut self) -> Option<Triplet> {
        if self.is_exhausted() {
            return None;
        }
        let mmap = self.mmap.as_ref()?;
        let start = self.cursor * RECORD_SIZE;
        let bytes: &[u8; RECORD_SIZE] = mmap[start..start + RECORD_SIZE].try_into().ok()?;
        self.cursor += 1;
        Some(decode_record(bytes))
    }
}
