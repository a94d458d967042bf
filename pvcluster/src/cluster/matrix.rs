//! Symmetric sparse adjacency of live cluster nodes and the candidate heap.

use std::cmp::{Ordering, Reverse};
use std::collections::hash_map::Entry;
use std::collections::{BinaryHeap, HashMap};

use ordered_float::OrderedFloat;
use pvcore::ScanId;

/// Candidate merge between two nodes, ordered by value then endpoints.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SparseEdge {
    pub row: ScanId,
    pub col: ScanId,
    pub value: f32,
}

impl SparseEdge {
    pub fn new(row: ScanId, col: ScanId, value: f32) -> Self {
        let (row, col) = if row <= col { (row, col) } else { (col, row) };
        SparseEdge { row, col, value }
    }

    fn key(&self) -> (OrderedFloat<f32>, ScanId, ScanId) {
        (OrderedFloat(self.value), self.row, self.col)
    }
}

impl Eq for SparseEdge {}

impl Ord for SparseEdge {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

impl PartialOrd for SparseEdge {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Min-heap of candidate merges.
#[derive(Debug, Default)]
pub struct EdgeHeap {
    heap: BinaryHeap<Reverse<SparseEdge>>,
}

impl EdgeHeap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, edge: SparseEdge) {
        self.heap.push(Reverse(edge));
    }

    pub fn pop(&mut self) -> Option<SparseEdge> {
        self.heap.pop().map(|Reverse(e)| e)
    }

    pub fn peek(&self) -> Option<&SparseEdge> {
        self.heap.peek().map(|Reverse(e)| e)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

#[derive(Clone, Debug)]
struct Row {
    alive: bool,
    neighbors: Vec<(ScanId, f32)>,
}

impl Row {
    fn new() -> Self {
        Row { alive: true, neighbors: Vec::new() }
    }

    fn position(&self, id: ScanId) -> Option<usize> {
        self.neighbors.iter().position(|&(n, _)| n == id)
    }

    /// Inserts or lowers the value for `id`; true if the row changed.
    fn upsert(&mut self, id: ScanId, value: f32) -> bool {
        match self.position(id) {
            Some(i) if self.neighbors[i].1 <= value => false,
            Some(i) => {
                self.neighbors[i].1 = value;
                true
            }
            None => {
                self.neighbors.push((id, value));
                true
            }
        }
    }

    fn remove(&mut self, id: ScanId) {
        self.neighbors.retain(|&(n, _)| n != id);
    }
}

/// Symmetric sparse matrix of edge values keyed by node id.
///
/// Nodes are alive until [`merge_rows`](SparseMatrix::merge_rows) folds them
/// into a new node. Unknown ids count as alive.
#[derive(Clone, Debug, Default)]
pub struct SparseMatrix {
    rows: HashMap<ScanId, Row>,
}

impl SparseMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `a -- b` or lowers its value. Self loops are ignored. Returns true
    /// if the stored value changed, i.e. a new heap entry is needed.
    pub fn insert_edge(&mut self, a: ScanId, b: ScanId, value: f32) -> bool {
        if a == b {
            return false;
        }
        let changed = self.rows.entry(a).or_insert_with(Row::new).upsert(b, value);
        if changed {
            self.rows.entry(b).or_insert_with(Row::new).upsert(a, value);
        }
        changed
    }

    pub fn remove_edge(&mut self, a: ScanId, b: ScanId) {
        if let Some(row) = self.rows.get_mut(&a) {
            row.remove(b);
        }
        if let Some(row) = self.rows.get_mut(&b) {
            row.remove(a);
        }
    }

    pub fn edge_value(&self, a: ScanId, b: ScanId) -> Option<f32> {
        let row = self.rows.get(&a)?;
        row.position(b).map(|i| row.neighbors[i].1)
    }

    /// Sorts every row's neighbors by ascending value.
    pub fn sort_rows(&mut self) {
        for row in self.rows.values_mut() {
            row.neighbors.sort_by(|x, y| x.1.total_cmp(&y.1).then(x.0.cmp(&y.0)));
        }
    }

    pub fn is_alive(&self, id: ScanId) -> bool {
        self.rows.get(&id).map_or(true, |r| r.alive)
    }

    pub fn neighbors(&self, id: ScanId) -> &[(ScanId, f32)] {
        self.rows.get(&id).map(|r| r.neighbors.as_slice()).unwrap_or(&[])
    }

    /// Number of rows, dead ones included.
    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    /// Folds rows `a` and `b` into the new node `merged`.
    ///
    /// The new row is the union of both neighbor sets with the minimum value
    /// on shared neighbors (single linkage); every neighbor's back reference
    /// is rewired to `merged`. `a` and `b` are left dead and empty. Returns
    /// the new row, sorted by value.
    pub fn merge_rows(&mut self, a: ScanId, b: ScanId, merged: ScanId) -> Vec<(ScanId, f32)> {
        let mut union: HashMap<ScanId, f32> = HashMap::new();
        for id in [a, b] {
            let row = self.rows.entry(id).or_insert_with(Row::new);
            row.alive = false;
            for (n, v) in std::mem::take(&mut row.neighbors) {
                if n == a || n == b {
                    continue;
                }
                match union.entry(n) {
                    Entry::Occupied(mut e) => {
                        if v < *e.get() {
                            e.insert(v);
                        }
                    }
                    Entry::Vacant(e) => {
                        e.insert(v);
                    }
                }
            }
        }

        for (&n, &v) in &union {
            if let Some(row) = self.rows.get_mut(&n) {
                row.neighbors.retain(|&(x, _)| x != a && x != b);
                row.neighbors.push((merged, v));
            }
        }

        let mut neighbors: Vec<(ScanId, f32)> = union.into_iter().collect();
        neighbors.sort_by(|x, y| x.1.total_cmp(&y.1).then(x.0.cmp(&y.0)));
        self.rows.insert(
            merged,
            Row { alive: true, neighbors: neighbors.clone() },
        );
        neighbors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u32) -> ScanId {
        ScanId::new(0, n)
    }

    #[test]
    fn test_heap_pops_minimum_first() {
        let mut heap = EdgeHeap::new();
        heap.push(SparseEdge::new(id(1), id(2), 0.5));
        heap.push(SparseEdge::new(id(3), id(4), 0.1));
        heap.push(SparseEdge::new(id(5), id(0), 0.1));
        assert_eq!(heap.len(), 3);
        let first = heap.pop().unwrap();
        assert_eq!((first.row, first.col), (id(0), id(5)));
        assert_eq!(heap.pop().unwrap().row, id(3));
        assert_eq!(heap.pop().unwrap().value, 0.5);
        assert!(heap.is_empty());
    }

    #[test]
    fn test_symmetric_insert_keeps_minimum() {
        let mut m = SparseMatrix::new();
        assert!(m.insert_edge(id(1), id(2), 0.4));
        assert!(!m.insert_edge(id(2), id(1), 0.6));
        assert!(m.insert_edge(id(2), id(1), 0.2));
        assert!(!m.insert_edge(id(3), id(3), 0.1));
        assert_eq!(m.edge_value(id(1), id(2)), Some(0.2));
        assert_eq!(m.edge_value(id(2), id(1)), Some(0.2));
        m.remove_edge(id(1), id(2));
        assert_eq!(m.edge_value(id(2), id(1)), None);
    }

    #[test]
    fn test_merge_rows_single_linkage() {
        let mut m = SparseMatrix::new();
        m.insert_edge(id(1), id(2), 0.1);
        m.insert_edge(id(1), id(3), 0.5);
        m.insert_edge(id(2), id(3), 0.3);
        m.insert_edge(id(2), id(4), 0.7);
        m.sort_rows();

        let merged = ScanId::merged(1, 0);
        let row = m.merge_rows(id(1), id(2), merged);
        assert_eq!(row, vec![(id(3), 0.3), (id(4), 0.7)]);
        assert!(!m.is_alive(id(1)));
        assert!(!m.is_alive(id(2)));
        assert!(m.is_alive(merged));
        assert!(m.is_alive(id(99)));

        assert_eq!(m.edge_value(id(3), merged), Some(0.3));
        assert_eq!(m.edge_value(id(4), merged), Some(0.7));
        assert_eq!(m.edge_value(id(3), id(1)), None);
        assert!(m.neighbors(id(1)).is_empty());
    }

    #[test]
    fn test_sort_rows() {
        let mut m = SparseMatrix::new();
        m.insert_edge(id(1), id(2), 0.9);
        m.insert_edge(id(1), id(3), 0.1);
        m.insert_edge(id(1), id(4), 0.5);
        m.sort_rows();
        let values: Vec<f32> = m.neighbors(id(1)).iter().map(|&(_, v)| v).collect();
        assert_eq!(values, vec![0.1, 0.5, 0.9]);
    }
}
