//! Result files: report lines, the shared append-only writer and outcome
//! snapshots.

use std::fs::{File, OpenOptions};
use std::io;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use pvcore::io::text::{parse_line, write_lines};
use pvcore::{PvError, Result, ScanId, Triplet};
use serde::{Deserialize, Serialize};

use crate::cluster::poisoned::ClusterOutcome;
use crate::cluster::roots::RootTable;

/// Append-only report file shared by concurrent clustering runs.
///
/// Every [`append`](Self::append) writes its whole batch while holding the
/// lock, so lines from different runs never interleave.
pub struct SharedResultWriter {
    path: PathBuf,
    inner: Mutex<BufWriter<File>>,
}

impl SharedResultWriter {
    /// Opens `path` for appending, creating it if needed.
    pub fn append_to<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(SharedResultWriter { path, inner: Mutex::new(BufWriter::new(file)) })
    }

    /// Truncates `path` and opens it for appending.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        File::create(path.as_ref())?;
        Self::append_to(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, triplets: &[Triplet]) -> Result<()> {
        if triplets.is_empty() {
            return Ok(());
        }
        let mut writer = self.inner.lock();
        write_lines(&mut *writer, triplets)?;
        writer.flush()?;
        Ok(())
    }
}

/// Reads `root1 root2 value` lines back; stops at the first malformed line.
pub fn read_report<P: AsRef<Path>>(path: P) -> Result<Vec<Triplet>> {
    let reader = BufReader::new(File::open(path)?);
    let mut out = Vec::new();
    for line in reader.lines() {
        match parse_line(&line?) {
            Some(t) => out.push(t),
            None => break,
        }
    }
    Ok(out)
}

#[derive(Serialize, Deserialize)]
pub struct OutcomeFile {
    pub version: u32,
    pub merge_offset: u32,
    pub merges: u32,
    pub tree: Vec<Triplet>,
    pub poisoned: Vec<Triplet>,
    /// `(node, root)` pairs of the root table.
    pub roots: Vec<(ScanId, ScanId)>,
}

impl OutcomeFile {
    pub fn new(outcome: &ClusterOutcome) -> Self {
        Self {
            version: 1,
            merge_offset: outcome.merge_offset,
            merges: outcome.merges,
            tree: outcome.tree.clone(),
            poisoned: outcome.poisoned.clone(),
            roots: outcome.roots.entries(),
        }
    }

    pub fn into_outcome(self) -> ClusterOutcome {
        ClusterOutcome {
            tree: self.tree,
            poisoned: self.poisoned,
            roots: RootTable::from_entries(self.roots),
            merge_offset: self.merge_offset,
            merges: self.merges,
            skipped_above_cutoff: 0,
        }
    }
}

fn to_pv<E: std::fmt::Display>(e: E) -> PvError {
    PvError::Serialization(e.to_string())
}

// --- JSON (human-readable) ---
pub fn save_json<P: AsRef<Path>>(path: P, outcome: &ClusterOutcome) -> Result<()> {
    let mut f = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut f, &OutcomeFile::new(outcome)).map_err(to_pv)?;
    f.flush()?;
    Ok(())
}

pub fn load_json<P: AsRef<Path>>(path: P) -> Result<ClusterOutcome> {
    let f = BufReader::new(File::open(path)?);
    let file: OutcomeFile = serde_json::from_reader(f).map_err(to_pv)?;
    Ok(file.into_outcome())
}

const ZSTD_MAGIC: [u8; 4] = [0x28, 0xB5, 0x2F, 0xFD];

// --- Bincode + optional zstd compression ---
pub fn save_bincode<P: AsRef<Path>>(path: P, outcome: &ClusterOutcome, compress: bool) -> Result<()> {
    let f = File::create(path)?;
    let file = OutcomeFile::new(outcome);
    if compress {
        let mut zw = zstd::Encoder::new(f, 3)?;
        bincode::serialize_into(&mut zw, &file).map_err(to_pv)?;
        zw.finish()?;
    } else {
        let mut bw = BufWriter::new(f);
        bincode::serialize_into(&mut bw, &file).map_err(to_pv)?;
        bw.flush()?;
    }
    Ok(())
}

/// Loads a snapshot written by [`save_bincode`], compressed or not.
pub fn load_bincode<P: AsRef<Path>>(path: P) -> Result<ClusterOutcome> {
    let mut f = BufReader::new(File::open(path)?);
    let mut magic = [0u8; 4];
    let n = read_prefix(&mut f, &mut magic)?;
    let head = io::Cursor::new(magic[..n].to_vec());
    let stream = head.chain(f);
    let file: OutcomeFile = if n == 4 && magic == ZSTD_MAGIC {
        bincode::deserialize_from(zstd::Decoder::new(stream)?).map_err(to_pv)?
    } else {
        bincode::deserialize_from(stream).map_err(to_pv)?
    };
    Ok(file.into_outcome())
}

fn read_prefix<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}
