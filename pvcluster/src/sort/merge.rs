//! Streaming k-way merge of sorted shard files into one result file.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, VecDeque};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use pvcore::io::binary::write_record;
use pvcore::io::mapped::MappedTriplets;
use pvcore::{Result, Triplet};
use tracing::{debug, info, warn};

use crate::sort::partition::shard_path;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub written: u64,
    /// Records dropped because an equal pair had already been written.
    pub duplicates_dropped: u64,
    /// Largest number of decoded records held at once.
    pub max_buffered: usize,
    /// Merge passes; more than one when there are more runs than the budget.
    pub passes: usize,
}

/// Sorted run being merged: its unread records stay in the mapping, a small
/// decoded window sits in memory.
struct RunCursor {
    reader: MappedTriplets,
    window: VecDeque<Triplet>,
}

impl RunCursor {
    /// Decodes up to `size` records if the window ran dry; returns how many.
    fn refill(&mut self, size: usize) -> usize {
        if !self.window.is_empty() {
            return 0;
        }
        let batch = self.reader.read_batch(size);
        let n = batch.len();
        self.window.extend(batch);
        n
    }
}

/// Merges the sorted shards `{result}.0 .. {result}.{num_shards - 1}` into
/// `result` and deletes them.
pub fn external_merge_sort(result: &Path, num_shards: usize, merge_budget: usize) -> Result<MergeStats> {
    let shards: Vec<PathBuf> = (0..num_shards).map(|shard| shard_path(result, shard)).collect();
    merge_sorted_runs(&shards, result, merge_budget)
}

/// Merges sorted run files into `output` and deletes the runs.
///
/// At most `merge_budget` decoded records are held at once (the budget is
/// raised to 2 if smaller). With more runs than that, groups of runs are
/// merged into intermediate files first. Adjacent records of the same pair
/// are written once; runs are sorted, so the first one has the lowest value.
pub fn merge_sorted_runs(runs: &[PathBuf], output: &Path, merge_budget: usize) -> Result<MergeStats> {
    let fan_in = merge_budget.max(2);
    let mut stats = MergeStats::default();
    let mut level: Vec<PathBuf> = runs.to_vec();

    while level.len() > fan_in {
        let mut next = Vec::with_capacity(level.len().div_ceil(fan_in));
        for (group_idx, group) in level.chunks(fan_in).enumerate() {
            let path = pass_path(output, stats.passes, group_idx);
            merge_group(group, &path, fan_in, &mut stats)?;
            remove_runs(group);
            next.push(path);
        }
        stats.passes += 1;
        debug!(pass = stats.passes, runs = next.len(), "intermediate merge pass done");
        level = next;
    }

    stats.written = merge_group(&level, output, fan_in, &mut stats)?;
    stats.passes += 1;
    remove_runs(&level);
    Ok(stats)
}

fn pass_path(output: &Path, pass: usize, group: usize) -> PathBuf {
    let mut name = output.as_os_str().to_os_string();
    name.push(format!(".pass{}.{}", pass, group));
    PathBuf::from(name)
}

fn remove_runs(runs: &[PathBuf]) {
    for path in runs {
        if let Err(e) = std::fs::remove_file(path) {
            debug!(path = %path.display(), error = %e, "could not remove run");
        }
    }
}

/// One heap merge of at most `budget` runs into `output`; returns the number
/// of records written.
fn merge_group(runs: &[PathBuf], output: &Path, budget: usize, stats: &mut MergeStats) -> Result<u64> {
    let mut cursors: Vec<RunCursor> = Vec::with_capacity(runs.len());
    let mut total = 0u64;
    for path in runs {
        match MappedTriplets::open(path) {
            Ok(reader) if !reader.is_empty() => {
                total += reader.len() as u64;
                cursors.push(RunCursor { reader, window: VecDeque::new() });
            }
            Ok(_) => {}
            Err(e) => warn!(path = %path.display(), error = %e, "could not open run, treating as empty"),
        }
    }

    // every cursor holds at most `window` records counting its heap head
    let window = (budget / cursors.len().max(1)).max(1);
    let mut heap: BinaryHeap<Reverse<(Triplet, usize)>> = BinaryHeap::with_capacity(cursors.len());
    let mut buffered = 0usize;
    for (idx, cursor) in cursors.iter_mut().enumerate() {
        buffered += cursor.refill(window);
        if let Some(t) = cursor.window.pop_front() {
            heap.push(Reverse((t, idx)));
        }
    }
    stats.max_buffered = stats.max_buffered.max(buffered);

    let mut writer = BufWriter::new(File::create(output)?);
    let mut last_written: Option<Triplet> = None;
    let mut written = 0u64;
    let progress_step = (total / 10).max(1);

    while let Some(Reverse((t, idx))) = heap.pop() {
        buffered -= 1;
        if last_written.is_some_and(|last| last.same_pair(&t)) {
            stats.duplicates_dropped += 1;
        } else {
            write_record(&mut writer, &t)?;
            last_written = Some(t);
            written += 1;
            if written % progress_step == 0 {
                info!(written, total, percent = written * 100 / total, "writing p-values");
            }
        }

        let cursor = &mut cursors[idx];
        let added = cursor.refill(window);
        if added > 0 {
            buffered += added;
            stats.max_buffered = stats.max_buffered.max(buffered);
        }
        if let Some(next) = cursor.window.pop_front() {
            heap.push(Reverse((next, idx)));
        }
    }
    writer.flush()?;
    Ok(written)
}
