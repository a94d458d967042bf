//! Line-delimited triplet records: `file_idx:scannr file_idx:scannr pval`,
//! separated by tabs or spaces.

use std::io;
use std::io::{BufRead, Write};

use tracing::warn;

use crate::data::scan_id::ScanId;
use crate::data::triplet::Triplet;

/// Parses one record; `None` for blank or malformed lines.
pub fn parse_line(line: &str) -> Option<Triplet> {
    let mut fields = line.split(|c| c == '\t' || c == ' ').filter(|s| !s.is_empty());
    let scannr1: ScanId = fields.next()?.parse().ok()?;
    let scannr2: ScanId = fields.next()?.parse().ok()?;
    let pval: f32 = fields.next()?.trim_end().parse().ok()?;
    Some(Triplet { scannr1, scannr2, pval })
}

pub fn write_lines<W: Write>(writer: &mut W, triplets: &[Triplet]) -> io::Result<()> {
    for t in triplets {
        writeln!(writer, "{}", t)?;
    }
    Ok(())
}

/// Streaming reader that treats the first malformed line as end of input.
pub struct TextTriplets<R: BufRead> {
    reader: R,
    line: Vec<u8>,
    line_no: usize,
    done: bool,
}

impl<R: BufRead> TextTriplets<R> {
    pub fn new(reader: R) -> Self {
        TextTriplets {
            reader,
            line: Vec::new(),
            line_no: 0,
            done: false,
        }
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Reads up to `max` records into `out`; returns how many were added.
    pub fn read_batch_into(&mut self, max: usize, out: &mut Vec<Triplet>) -> io::Result<usize> {
        let mut n = 0;
        while n < max {
            match self.next_record()? {
                Some(t) => {
                    out.push(t);
                    n += 1;
                }
                None => break,
            }
        }
        Ok(n)
    }

    fn next_record(&mut self) -> io::Result<Option<Triplet>> {
        if self.done {
            return Ok(None);
        }
        self.line.clear();
        if self.reader.read_until(b'\n', &mut self.line)? == 0 {
            self.done = true;
            return Ok(None);
        }
        self.line_no += 1;
        let parsed = match std::str::from_utf8(&self.line) {
            Ok(line) if line.trim().is_empty() => {
                self.done = true;
                return Ok(None);
            }
            Ok(line) => parse_line(line),
            Err(_) => None,
        };
        if parsed.is_none() {
            warn!(line = self.line_no, "malformed triplet line, treating as end of stream");
            self.done = true;
        }
        Ok(parsed)
    }
}

impl<R: BufRead> Iterator for TextTriplets<R> {
    type Item = io::Result<Triplet>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}
