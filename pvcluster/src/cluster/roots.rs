//! Union-find style root table and poison flags of one clustering run.

use std::collections::{HashMap, HashSet};

use pvcore::{PvError, Result, ScanId};

/// Maps every node that took part in a merge to its cluster representative.
///
/// Representatives are the root of the `row` side of each merge. Compression
/// happens when merging: all members of the absorbed cluster are repointed
/// straight at the surviving root, so a lookup is at most one hop.
#[derive(Clone, Debug, Default)]
pub struct RootTable {
    parent: HashMap<ScanId, ScanId>,
    members: HashMap<ScanId, Vec<ScanId>>,
}

impl RootTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current representative of `id`; ids never merged are their own root.
    pub fn root(&self, id: ScanId) -> ScanId {
        self.chase(id).unwrap_or(id)
    }

    /// Like [`root`](Self::root) but reports a non-terminating chase as an
    /// error instead of falling back to `id`.
    pub fn try_root(&self, id: ScanId) -> Result<ScanId> {
        self.chase(id).ok_or_else(|| {
            PvError::out_of_range(
                ((id.file_idx as u64) << 32) | id.scannr as u64,
                format!("root chase for {} did not terminate", id),
            )
        })
    }

    // bounded chase; compression keeps real chains at length <= 1
    fn chase(&self, id: ScanId) -> Option<ScanId> {
        let mut current = id;
        for _ in 0..=self.parent.len() {
            match self.parent.get(&current) {
                Some(&next) if next != current => current = next,
                _ => return Some(current),
            }
        }
        None
    }

    pub fn set_root(&mut self, id: ScanId, root: ScanId) {
        if id != root {
            self.parent.insert(id, root);
            self.members.entry(root).or_default().push(id);
        }
    }

    /// Records the merge of the clusters rooted at `row_root` and `col_root`
    /// into the new node `merged`; `row_root` stays the representative.
    pub fn union(&mut self, merged: ScanId, row_root: ScanId, col_root: ScanId) {
        if col_root != row_root {
            let moved = self.members.remove(&col_root).unwrap_or_default();
            for &m in &moved {
                self.parent.insert(m, row_root);
            }
            self.parent.insert(col_root, row_root);
            let list = self.members.entry(row_root).or_default();
            list.extend(moved);
            list.push(col_root);
        }
        self.set_root(merged, row_root);
    }

    /// Members of each multi-node cluster (representative included), keeping
    /// only ids with `file_idx < merge_offset`, sorted ascending.
    pub fn clusters(&self, merge_offset: u32) -> HashMap<ScanId, Vec<ScanId>> {
        self.members
            .iter()
            .map(|(&root, members)| {
                let mut ids: Vec<ScanId> = members
                    .iter()
                    .copied()
                    .chain(std::iter::once(root))
                    .filter(|id| !id.is_merged(merge_offset))
                    .collect();
                ids.sort_unstable();
                ids.dedup();
                (root, ids)
            })
            .filter(|(_, ids)| ids.len() > 1)
            .collect()
    }

    /// `(node, root)` pairs, sorted by node.
    pub fn entries(&self) -> Vec<(ScanId, ScanId)> {
        let mut entries: Vec<(ScanId, ScanId)> = self.parent.iter().map(|(&n, &r)| (n, r)).collect();
        entries.sort_unstable();
        entries
    }

    pub fn from_entries<I: IntoIterator<Item = (ScanId, ScanId)>>(entries: I) -> Self {
        let mut table = RootTable::new();
        for (node, root) in entries {
            table.set_root(node, root);
        }
        table
    }

    pub fn len(&self) -> usize {
        self.parent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parent.is_empty()
    }
}

/// Sticky quarantine flags.
#[derive(Clone, Debug, Default)]
pub struct PoisonFlags {
    poisoned: HashSet<ScanId>,
}

impl PoisonFlags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn poison(&mut self, id: ScanId) {
        self.poisoned.insert(id);
    }

    pub fn is_poisoned(&self, id: ScanId) -> bool {
        self.poisoned.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.poisoned.len()
    }

    pub fn is_empty(&self) -> bool {
        self.poisoned.is_empty()
    }
}

impl FromIterator<ScanId> for PoisonFlags {
    fn from_iter<I: IntoIterator<Item = ScanId>>(iter: I) -> Self {
        PoisonFlags { poisoned: iter.into_iter().collect() }
    }
}
