//! File level access to triplet streams in either record format.

use std::fs::{File, OpenOptions};
use std::io;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::data::triplet::Triplet;
use crate::error::Result;
use crate::io::binary::{write_records, RECORD_SIZE};
use crate::io::mapped::MappedTriplets;
use crate::io::text::{write_lines, TextTriplets};

/// Number of lines sampled to estimate the record count of a text file.
const TEXT_SAMPLE_LINES: usize = 1000;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TripletFormat {
    #[default]
    Binary,
    Text,
}

/// Batch reader over a triplet file of either format.
pub enum TripletReader {
    Binary(MappedTriplets),
    Text(TextTriplets<BufReader<File>>),
}

impl TripletReader {
    pub fn open<P: AsRef<Path>>(path: P, format: TripletFormat) -> io::Result<Self> {
        match format {
            TripletFormat::Binary => Ok(TripletReader::Binary(MappedTriplets::open(path)?)),
            TripletFormat::Text => {
                let file = File::open(path)?;
                Ok(TripletReader::Text(TextTriplets::new(BufReader::new(file))))
            }
        }
    }

    /// Appends up to `max` records to `out`, returning how many were read.
    /// Zero means the stream is exhausted.
    pub fn read_batch_into(&mut self, max: usize, out: &mut Vec<Triplet>) -> io::Result<usize> {
        match self {
            TripletReader::Binary(m) => Ok(m.read_batch_into(max, out)),
            TripletReader::Text(t) => t.read_batch_into(max, out),
        }
    }

    pub fn is_done(&self) -> bool {
        match self {
            TripletReader::Binary(m) => m.is_exhausted(),
            TripletReader::Text(t) => t.is_done(),
        }
    }
}

/// Writes `triplets` to `path`, appending or truncating.
pub fn write_triplets<P: AsRef<Path>>(
    path: P,
    triplets: &[Triplet],
    append: bool,
    format: TripletFormat,
) -> io::Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .append(append)
        .truncate(!append)
        .open(path)?;
    let mut writer = BufWriter::new(file);
    match format {
        TripletFormat::Binary => write_records(&mut writer, triplets)?,
        TripletFormat::Text => write_lines(&mut writer, triplets)?,
    }
    writer.flush()
}

/// Reads a whole triplet file into memory.
pub fn read_triplets<P: AsRef<Path>>(path: P, format: TripletFormat) -> Result<Vec<Triplet>> {
    let mut reader = TripletReader::open(path, format)?;
    let mut out = Vec::new();
    while reader.read_batch_into(usize::MAX, &mut out)? > 0 {}
    Ok(out)
}

/// Size of `path` in bytes, or `None` (with a warning) if it cannot be read.
pub fn file_size<P: AsRef<Path>>(path: P) -> Option<u64> {
    match std::fs::metadata(path.as_ref()) {
        Ok(meta) => Some(meta.len()),
        Err(e) => {
            warn!(path = %path.as_ref().display(), error = %e, "could not read any p-values");
            None
        }
    }
}

/// Approximate record count of a triplet file. Unreadable files count as 0.
///
/// Binary files are sized exactly; text files are estimated from the mean
/// line length of the first lines.
pub fn estimate_records<P: AsRef<Path>>(path: P, format: TripletFormat) -> u64 {
    let path = path.as_ref();
    let size = match file_size(path) {
        Some(s) => s,
        None => return 0,
    };
    match format {
        TripletFormat::Binary => size / RECORD_SIZE as u64,
        TripletFormat::Text => {
            let file = match File::open(path) {
                Ok(f) => f,
                Err(_) => return 0,
            };
            let mut bytes = 0u64;
            let mut lines = 0u64;
            for line in BufReader::new(file).lines().take(TEXT_SAMPLE_LINES) {
                match line {
                    // +1 for the stripped newline
                    Ok(l) => bytes += l.len() as u64 + 1,
                    Err(_) => break,
                }
                lines += 1;
            }
            if lines == 0 || bytes == 0 {
                return 0;
            }
            let estimate = (size as f64 * lines as f64 / bytes as f64).round() as u64;
            debug!(path = %path.display(), bytes_per_row = bytes as f64 / lines as f64, estimate, "estimated text records");
            estimate
        }
    }
}

pub fn estimate_records_all<P: AsRef<Path>>(paths: &[P], format: TripletFormat) -> u64 {
    paths.iter().map(|p| estimate_records(p, format)).sum()
}

/// Rewrites a binary triplet file as text.
pub fn convert_binary_to_text<P: AsRef<Path>, Q: AsRef<Path>>(binary: P, text: Q) -> Result<usize> {
    let triplets = read_triplets(binary, TripletFormat::Binary)?;
    write_triplets(text, &triplets, false, TripletFormat::Text)?;
    Ok(triplets.len())
}

/// Rewrites a text triplet file as binary records.
pub fn convert_text_to_binary<P: AsRef<Path>, Q: AsRef<Path>>(text: P, binary: Q) -> Result<usize> {
    let triplets = read_triplets(text, TripletFormat::Text)?;
    write_triplets(binary, &triplets, false, TripletFormat::Binary)?;
    Ok(triplets.len())
}
