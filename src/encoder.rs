//! Zip container encoder

use std::io::{Cursor, Write};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

use crate::archive::{Archive, Entry};
use crate::error::DocgenError;

/// Compression applied to every entry on serialization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionPolicy {
    /// DEFLATE at a fixed level (0-9)
    Deflated { level: u8 },
    /// No compression
    Stored,
}

impl Default for CompressionPolicy {
    fn default() -> Self {
        CompressionPolicy::Deflated { level: 6 }
    }
}

/// Encodes an archive into a zip container.
///
/// Output is reproducible: entries keep archive order and every timestamp
/// is the zip epoch, so identical archives encode to identical bytes.
#[derive(Debug, Clone, Default)]
pub struct Encoder {
    compression: CompressionPolicy,
}

impl Encoder {
    /// Create a new encoder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the compression policy
    pub fn with_compression(mut self, compression: CompressionPolicy) -> Self {
        self.compression = compression;
        self
    }

    /// Encode an archive to a byte buffer
    pub fn encode(&self, archive: &Archive) -> Result<Vec<u8>, DocgenError> {
        let cursor = self.encode_to_writer(archive, Cursor::new(Vec::new()))?;
        Ok(cursor.into_inner())
    }

    /// Encode an archive into a seekable writer, returning the writer
    pub fn encode_to_writer<W: Write + std::io::Seek>(
        &self,
        archive: &Archive,
        writer: W,
    ) -> Result<W, DocgenError> {
        let mut zip = ZipWriter::new(writer);
        for entry in archive.entries() {
            self.encode_entry(&mut zip, entry)?;
        }
        Ok(zip.finish()?)
    }

    /// Encode an archive to a file
    pub fn encode_to_file(
        &self,
        archive: &Archive,
        path: &std::path::Path,
    ) -> Result<(), DocgenError> {
        let encoded = self.encode(archive)?;
        std::fs::write(path, encoded)?;
        Ok(())
    }

    /// Encode a single entry
    fn encode_entry<W: Write + std::io::Seek>(
        &self,
        zip: &mut ZipWriter<W>,
        entry: &Entry,
    ) -> Result<(), DocgenError> {
        let mut options = self.file_options();
        if let Some(mode) = entry.unix_mode {
            options = options.unix_permissions(mode);
        }

        if entry.is_dir {
            zip.add_directory(entry.name.as_str(), options)?;
        } else {
            zip.start_file(entry.name.as_str(), options)?;
            zip.write_all(&entry.data)?;
        }
        Ok(())
    }

    fn file_options(&self) -> SimpleFileOptions {
        let options = SimpleFileOptions::default().last_modified_time(DateTime::default());
        match self.compression {
            CompressionPolicy::Deflated { level } => options
                .compression_method(CompressionMethod::Deflated)
                .compression_level(Some(level.into())),
            CompressionPolicy::Stored => options.compression_method(CompressionMethod::Stored),
        }
    }
}
