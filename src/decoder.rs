//! Zip container decoder

use std::io::{Cursor, Read};
use std::path::Path;

use zip::ZipArchive;

use crate::archive::{Archive, Entry};
use crate::error::DocgenError;

/// Default ceiling on the total decompressed size of one archive (256 MiB)
pub const DEFAULT_SIZE_LIMIT: u64 = 256 * 1024 * 1024;

/// Decodes a zip container into an in-memory [`Archive`]
#[derive(Debug, Clone)]
pub struct Decoder {
    /// Maximum number of decompressed bytes accepted across all entries
    size_limit: u64,
}

impl Decoder {
    /// Create a new decoder
    pub fn new() -> Self {
        Self { size_limit: DEFAULT_SIZE_LIMIT }
    }

    /// Set the decompressed size ceiling
    pub fn with_size_limit(mut self, limit: u64) -> Self {
        self.size_limit = limit;
        self
    }

    /// Decode an archive from a byte buffer
    pub fn decode(&self, bytes: &[u8]) -> Result<Archive, DocgenError> {
        let mut zip = ZipArchive::new(Cursor::new(bytes)).map_err(corrupt)?;
        let mut archive = Archive::new();
        let mut remaining = self.size_limit;

        for i in 0..zip.len() {
            let mut file = zip.by_index(i).map_err(corrupt)?;
            let name = file.name().to_string();

            if file.is_dir() {
                let mut entry = Entry::directory(name);
                entry.unix_mode = file.unix_mode();
                archive.add_entry(entry)?;
                continue;
            }

            // The declared size is untrusted; read at most one byte past the budget.
            let mut data = Vec::new();
            (&mut file)
                .take(remaining.saturating_add(1))
                .read_to_end(&mut data)
                .map_err(|e| DocgenError::CorruptArchive {
                    reason: format!("failed to inflate '{}': {}", name, e),
                })?;

            if data.len() as u64 > remaining {
                return Err(DocgenError::CorruptArchive {
                    reason: format!(
                        "decompressed size exceeds limit of {} bytes at entry '{}'",
                        self.size_limit, name
                    ),
                });
            }
            remaining -= data.len() as u64;

            let mut entry = Entry::new(name, data);
            entry.unix_mode = file.unix_mode();
            archive.add_entry(entry)?;
        }

        Ok(archive)
    }

    /// Decode an archive from a file on disk
    pub fn decode_file(&self, path: &Path) -> Result<Archive, DocgenError> {
        let bytes = std::fs::read(path)?;
        self.decode(&bytes)
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

fn corrupt(err: zip::result::ZipError) -> DocgenError {
    DocgenError::CorruptArchive { reason: err.to_string() }
}
