//! Registry of spectrum source files; owns the `ScanId` file-index space.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::data::scan_id::ScanId;
use crate::error::{PvError, Result};

/// Maps spectrum file paths to dense file indices.
///
/// The number of registered files doubles as the merge offset: identifiers
/// minted for merged cluster nodes start at that file index.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SpectrumFileList {
    index_of: HashMap<String, u32>,
    paths: Vec<String>,
}

impl SpectrumFileList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads one file path per non-blank line.
    pub fn from_list_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let mut list = SpectrumFileList::new();
        for line in content.lines().map(str::trim).filter(|l| !l.is_empty()) {
            list.add_file(line);
        }
        Ok(list)
    }

    /// Registers `path` and returns its file index. Registering a path twice
    /// returns the index from the first call.
    pub fn add_file(&mut self, path: &str) -> u32 {
        if let Some(&idx) = self.index_of.get(path) {
            return idx;
        }
        let idx = self.paths.len() as u32;
        self.paths.push(path.to_string());
        self.index_of.insert(path.to_string(), idx);
        idx
    }

    pub fn scan_id(&self, path: &str, scannr: u32) -> Result<ScanId> {
        let file_idx = self.index_of.get(path).copied().ok_or_else(|| {
            PvError::out_of_range(scannr, format!("file {:?} is not registered", path))
        })?;
        Ok(ScanId::new(file_idx, scannr))
    }

    pub fn file_path(&self, file_idx: u32) -> Result<&str> {
        self.paths
            .get(file_idx as usize)
            .map(String::as_str)
            .ok_or_else(|| PvError::out_of_range(file_idx, "file index out of range"))
    }

    pub fn file_path_of(&self, scan_id: &ScanId) -> Result<&str> {
        self.file_path(scan_id.file_idx)
    }

    pub fn file_paths(&self) -> &[String] {
        &self.paths
    }

    pub fn merge_offset(&self) -> u32 {
        self.paths.len() as u32
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}
