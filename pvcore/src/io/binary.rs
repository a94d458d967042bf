//! Fixed-size little-endian triplet records.
//!
//! Layout (20 bytes): `file_idx1 u32 | scannr1 u32 | file_idx2 u32 | scannr2 u32 | pval f32`.

use std::io;
use std::io::Write;

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};

use crate::data::scan_id::ScanId;
use crate::data::triplet::Triplet;

pub const RECORD_SIZE: usize = 20;

#[inline]
pub fn decode_record(bytes: &[u8; RECORD_SIZE]) -> Triplet {
    Triplet {
        scannr1: ScanId::new(LittleEndian::read_u32(&bytes[0..4]), LittleEndian::read_u32(&bytes[4..8])),
        scannr2: ScanId::new(LittleEndian::read_u32(&bytes[8..12]), LittleEndian::read_u32(&bytes[12..16])),
        pval: LittleEndian::read_f32(&bytes[16..20]),
    }
}

/// Decodes every complete record; a trailing partial record is ignored.
pub fn decode_records(bytes: &[u8]) -> Vec<Triplet> {
    records(bytes).map(decode_record).collect()
}

/// Splits `bytes` into whole records.
pub fn records(bytes: &[u8]) -> impl Iterator<Item = &[u8; RECORD_SIZE]> {
    bytes.chunks_exact(RECORD_SIZE).filter_map(|chunk| chunk.try_into().ok())
}

pub fn write_record<W: Write>(writer: &mut W, triplet: &Triplet) -> io::Result<()> {
    writer.write_u32::<LittleEndian>(triplet.scannr1.file_idx)?;
    writer.write_u32::<LittleEndian>(triplet.scannr1.scannr)?;
    writer.write_u32::<LittleEndian>(triplet.scannr2.file_idx)?;
    writer.write_u32::<LittleEndian>(triplet.scannr2.scannr)?;
    writer.write_f32::<LittleEndian>(triplet.pval)
}

pub fn write_records<W: Write>(writer: &mut W, triplets: &[Triplet]) -> io::Result<()> {
    for t in triplets {
        write_record(writer, t)?;
    }
    Ok(())
}
