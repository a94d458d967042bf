//! Single-linkage clustering with poisoning, fed by a sorted edge stream.
//!
//! Edges are loaded in waves into a sparse adjacency matrix and a min-heap.
//! The heap is drained below the cutoff: a clean pop merges both endpoints
//! into a new node, a pop touching a poisoned node poisons the other endpoint
//! too and is only reported. Poisoned nodes never merge again, which stops a
//! single ambiguous edge from chaining unrelated clusters together.

use std::collections::HashMap;
use std::io;
use std::io::Write;
use std::path::Path;
use std::time::Instant;

use pvcore::{PvError, Result, ScanId, Triplet};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::cluster::matrix::{EdgeHeap, SparseEdge, SparseMatrix};
use crate::cluster::roots::{PoisonFlags, RootTable};
use crate::cluster::source::EdgeSource;
use crate::config::read_json_config;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusteringConfig {
    /// Edges pulled from the stream per wave.
    pub batch_size: usize,
    /// Log progress every this many merges.
    pub progress_interval: u32,
    /// Report poisoned edges alongside the merge tree.
    pub write_poisoned_edges: bool,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            batch_size: 50_000_000,
            progress_interval: 10_000,
            write_poisoned_edges: true,
        }
    }
}

impl ClusteringConfig {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config: ClusteringConfig = read_json_config(path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(PvError::config("batch_size must be > 0"));
        }
        if self.progress_interval == 0 {
            return Err(PvError::config("progress_interval must be > 0"));
        }
        Ok(())
    }
}

/// Result of one clustering run.
#[derive(Clone, Debug, Default)]
pub struct ClusterOutcome {
    /// `(root1, root2, value)` per merge, ascending by value.
    pub tree: Vec<Triplet>,
    /// `(min root, max root, value)` per edge touching a poisoned node,
    /// ascending by value.
    pub poisoned: Vec<Triplet>,
    pub roots: RootTable,
    pub merge_offset: u32,
    pub merges: u32,
    /// Edges read from the stream but not loaded because value >= cutoff.
    pub skipped_above_cutoff: u64,
}

impl ClusterOutcome {
    /// Original scan ids of every multi-member cluster, keyed by root.
    pub fn cluster_members(&self) -> HashMap<ScanId, Vec<ScanId>> {
        self.roots.clusters(self.merge_offset)
    }

    /// Writes the merge tree as `root1 root2 value` lines.
    pub fn write_report<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        pvcore::io::text::write_lines(writer, &self.tree)
    }

    pub fn write_poisoned<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        pvcore::io::text::write_lines(writer, &self.poisoned)
    }
}

/// One clustering run over one edge stream. Owns all of its state.
pub struct SparsePoisonedClustering<S: EdgeSource> {
    source: S,
    config: ClusteringConfig,
    merge_offset: u32,
    merge_cnt: u32,
    matrix: SparseMatrix,
    heap: EdgeHeap,
    roots: RootTable,
    /// Cluster root -> its live merged node.
    live: HashMap<ScanId, ScanId>,
    poisoned: PoisonFlags,
    tree: Vec<Triplet>,
    poisoned_edges: Vec<Triplet>,
    skipped_above_cutoff: u64,
}

impl<S: EdgeSource> SparsePoisonedClustering<S> {
    /// `merge_offset` must exceed every file index in the stream; merged
    /// nodes are minted as `(merge_offset, counter)`.
    pub fn new(source: S, merge_offset: u32, config: ClusteringConfig) -> Self {
        SparsePoisonedClustering {
            source,
            config,
            merge_offset,
            merge_cnt: 0,
            matrix: SparseMatrix::new(),
            heap: EdgeHeap::new(),
            roots: RootTable::new(),
            live: HashMap::new(),
            poisoned: PoisonFlags::new(),
            tree: Vec::new(),
            poisoned_edges: Vec::new(),
            skipped_above_cutoff: 0,
        }
    }

    /// Seeds the quarantined set, e.g. with scans shared between overlapping
    /// precursor windows.
    pub fn with_poisoned<I: IntoIterator<Item = ScanId>>(mut self, ids: I) -> Self {
        for id in ids {
            self.poisoned.poison(id);
        }
        self
    }

    pub fn poison(&mut self, id: ScanId) {
        self.poisoned.poison(id);
    }

    pub fn is_poisoned(&self, id: ScanId) -> bool {
        self.poisoned.is_poisoned(id)
    }

    /// Current live node standing for `id`'s cluster.
    fn resolve(&self, id: ScanId) -> ScanId {
        let root = self.roots.root(id);
        self.live.get(&root).copied().unwrap_or(id)
    }

    /// Loads one wave from the stream.
    ///
    /// Endpoints are resolved to their live nodes. Edges at or above the
    /// cutoff can never merge and are skipped; edges between two poisoned
    /// nodes go straight to the poisoned output.
    fn load_next_edges(&mut self, cutoff: f64) -> Result<()> {
        let batch = self.source.next_batch(self.config.batch_size)?;
        debug!(edges = batch.len(), "loading new edges");
        let mut pushed = 0usize;
        for t in batch {
            if (t.pval as f64) >= cutoff || t.pval.is_nan() {
                self.skipped_above_cutoff += 1;
                continue;
            }
            let a = self.resolve(t.scannr1);
            let b = self.resolve(t.scannr2);
            if a == b {
                continue;
            }
            if self.poisoned.is_poisoned(a) && self.poisoned.is_poisoned(b) {
                self.poisoned_edges.push(self.root_pair(a, b, t.pval));
            } else if self.matrix.insert_edge(a, b, t.pval) {
                self.heap.push(SparseEdge::new(a, b, t.pval));
                pushed += 1;
            }
        }
        self.matrix.sort_rows();
        debug!(pushed, heap = self.heap.len(), "wave loaded");
        Ok(())
    }

    fn root_pair(&self, a: ScanId, b: ScanId, value: f32) -> Triplet {
        let ra = self.roots.root(a);
        let rb = self.roots.root(b);
        Triplet::new(ra.min(rb), ra.max(rb), value)
    }

    /// Drains the edge stream below `cutoff` and returns the merge history.
    pub fn do_clustering(mut self, cutoff: f64) -> Result<ClusterOutcome> {
        info!(cutoff, "starting min-heap clustering");
        let start = Instant::now();
        let mut iterations = 0u64;

        loop {
            while self.heap.is_empty() && self.source.has_more() {
                self.load_next_edges(cutoff)?;
            }
            let Some(edge) = self.heap.peek().copied() else { break };
            if (edge.value as f64) >= cutoff {
                break;
            }
            self.heap.pop();
            iterations += 1;

            let (row, col) = (edge.row, edge.col);
            if !self.matrix.is_alive(row) || !self.matrix.is_alive(col) {
                continue;
            }
            // stale entry: the pair was lowered or already reported
            if self.matrix.edge_value(row, col) != Some(edge.value) {
                continue;
            }

            if self.poisoned.is_poisoned(row) || self.poisoned.is_poisoned(col) {
                self.poisoned.poison(row);
                self.poisoned.poison(col);
                self.poisoned_edges.push(self.root_pair(row, col, edge.value));
                self.matrix.remove_edge(row, col);
                continue;
            }

            if self.merge_cnt % self.config.progress_interval == 0 {
                info!(
                    iteration = self.merge_cnt,
                    min_row = %row,
                    min_col = %col,
                    min_value = edge.value,
                    edges_left = self.heap.len(),
                    "clustering progress"
                );
            }
            self.merge(row, col, edge.value)?;
        }

        info!(
            merges = self.merge_cnt,
            poisoned_edges = self.poisoned_edges.len(),
            iterations,
            elapsed_sec = start.elapsed().as_secs_f64(),
            "finished min-heap clustering"
        );
        // waves follow the pair order of the stream, so a later wave may merge
        // below an earlier one; stable sort keeps pop order within a wave
        self.tree.sort_by(|a, b| a.pval.total_cmp(&b.pval));
        self.poisoned_edges.sort_by(|a, b| a.pval.total_cmp(&b.pval));
        Ok(ClusterOutcome {
            tree: self.tree,
            poisoned: self.poisoned_edges,
            roots: self.roots,
            merge_offset: self.merge_offset,
            merges: self.merge_cnt,
            skipped_above_cutoff: self.skipped_above_cutoff,
        })
    }

    fn merge(&mut self, row: ScanId, col: ScanId, value: f32) -> Result<()> {
        if self.merge_cnt == u32::MAX {
            return Err(PvError::out_of_range(self.merge_cnt, "merge counter exhausted"));
        }
        // the endpoint with the smaller root plays `row`, so a cluster keeps
        // its smallest original scan id as representative
        let (row, col, row_root, col_root) = {
            let (r, c) = (self.roots.root(row), self.roots.root(col));
            if c < r { (col, row, c, r) } else { (row, col, r, c) }
        };
        let merged = ScanId::merged(self.merge_offset, self.merge_cnt);
        self.merge_cnt += 1;

        self.roots.union(merged, row_root, col_root);
        self.live.remove(&col_root);
        self.live.insert(row_root, merged);
        self.tree.push(Triplet::new(row_root, col_root, value));

        for (n, v) in self.matrix.merge_rows(row, col, merged) {
            self.heap.push(SparseEdge::new(merged, n, v));
        }
        Ok(())
    }
}
