//! Sorted edge streams consumed by the clustering engine in batches.

use std::path::Path;

use pvcore::io::mapped::MappedTriplets;
use pvcore::{PvError, Result, Triplet};

/// A stream of sorted, deduplicated triplets read in waves.
pub trait EdgeSource {
    /// Up to `max` next edges; empty once the stream is exhausted.
    fn next_batch(&mut self, max: usize) -> Result<Vec<Triplet>>;

    fn has_more(&self) -> bool;
}

/// In-memory edge list.
#[derive(Clone, Debug, Default)]
pub struct VecEdgeSource {
    edges: Vec<Triplet>,
    cursor: usize,
}

impl VecEdgeSource {
    pub fn new(edges: Vec<Triplet>) -> Self {
        VecEdgeSource { edges, cursor: 0 }
    }
}

impl EdgeSource for VecEdgeSource {
    fn next_batch(&mut self, max: usize) -> Result<Vec<Triplet>> {
        let end = self.cursor.saturating_add(max).min(self.edges.len());
        let batch = self.edges[self.cursor..end].to_vec();
        self.cursor = end;
        Ok(batch)
    }

    fn has_more(&self) -> bool {
        self.cursor < self.edges.len()
    }
}

/// Binary result file of the sort pipeline, read through a memory map.
pub struct FileEdgeSource {
    reader: MappedTriplets,
}

impl FileEdgeSource {
    /// Opens the edge stream; a missing or unreadable file is fatal.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let reader = MappedTriplets::open(path).map_err(|source| PvError::MissingEdgeStream {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(FileEdgeSource { reader })
    }

    pub fn len(&self) -> usize {
        self.reader.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reader.is_empty()
    }
}

impl EdgeSource for FileEdgeSource {
    fn next_batch(&mut self, max: usize) -> Result<Vec<Triplet>> {
        Ok(self.reader.read_batch(max))
    }

    fn has_more(&self) -> bool {
        !self.reader.is_exhausted()
    }
}

impl<S: EdgeSource + ?Sized> EdgeSource for Box<S> {
    fn next_batch(&mut self, max: usize) -> Result<Vec<Triplet>> {
        (**self).next_batch(max)
    }

    fn has_more(&self) -> bool {
        (**self).has_more()
    }
}
