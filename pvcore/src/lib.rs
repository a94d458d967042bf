// identifiers and records
pub mod data {
    pub mod scan_id;
    pub mod triplet;
}

// record codecs and file access
pub mod io {
    pub mod binary;
    pub mod mapped;
    pub mod text;
    pub mod triplet_file;
}

pub mod error;
pub mod file_list;

// Re-export commonly used types
pub use data::scan_id::ScanId;
pub use data::triplet::Triplet;
pub use error::{PvError, Result};
pub use io::triplet_file::TripletFormat;
