//! ZIP package holding the parts of a template or generated document

use crate::error::{Result, TemplateError};
use log::trace;
use std::collections::BTreeMap;
use std::io::{Cursor, Read, Seek, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Name of the uncompressed first entry of `OpenDocument` packages
pub const ODF_MIMETYPE_PART: &str = "mimetype";

/// In-memory package: part name → bytes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Package {
    parts: BTreeMap<String, Vec<u8>>,
}

impl Package {
    /// Create an empty package
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Read every file entry of a ZIP archive
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not a readable ZIP archive.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::from_reader(Cursor::new(bytes))
    }

    /// Read every file entry of a ZIP archive from a reader
    ///
    /// # Errors
    ///
    /// Returns an error if the content is not a readable ZIP archive.
    pub fn from_reader<R: Read + Seek>(reader: R) -> Result<Self> {
        let mut archive = ZipArchive::new(reader)?;
        let mut parts = BTreeMap::new();
        for i in 0..archive.len() {
            let mut file = archive.by_index(i)?;
            if file.is_dir() {
                continue;
            }
            let name = file.name().to_string();
            let mut content = Vec::new();
            file.read_to_end(&mut content)?;
            trace!("read part {name} ({} bytes)", content.len());
            parts.insert(name, content);
        }
        Ok(Self { parts })
    }

    /// Whether a part exists
    #[inline]
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.parts.contains_key(name)
    }

    /// Part bytes
    ///
    /// # Errors
    ///
    /// Returns `PartNotFound` if the part does not exist.
    pub fn read_part(&self, name: &str) -> Result<&[u8]> {
        self.parts
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| TemplateError::PartNotFound(name.to_string()))
    }

    /// Part content as UTF-8 text
    ///
    /// # Errors
    ///
    /// Returns `PartNotFound` if missing, `TemplateFormatInvalid` if not UTF-8.
    pub fn read_part_string(&self, name: &str) -> Result<String> {
        let bytes = self.read_part(name)?.to_vec();
        Ok(String::from_utf8(bytes)?)
    }

    /// Add a part, replacing any existing content
    pub fn create_part(&mut self, name: &str, bytes: Vec<u8>) {
        trace!("create part {name} ({} bytes)", bytes.len());
        self.parts.insert(name.to_string(), bytes);
    }

    /// Replace the content of an existing part
    ///
    /// # Errors
    ///
    /// Returns `PartNotFound` if the part does not exist.
    pub fn overwrite_part(&mut self, name: &str, bytes: Vec<u8>) -> Result<()> {
        let slot = self
            .parts
            .get_mut(name)
            .ok_or_else(|| TemplateError::PartNotFound(name.to_string()))?;
        *slot = bytes;
        Ok(())
    }

    /// Part names in sorted order
    pub fn part_names(&self) -> impl Iterator<Item = &str> {
        self.parts.keys().map(String::as_str)
    }

    /// Write the package as a ZIP archive
    ///
    /// The `mimetype` entry, if present, is written first and stored
    /// uncompressed as `OpenDocument` consumers require.
    ///
    /// # Errors
    ///
    /// Returns an error if writing the archive fails.
    pub fn write_to<W: Write>(&self, mut w: W) -> Result<()> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let deflated = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        if let Some(mimetype) = self.parts.get(ODF_MIMETYPE_PART) {
            let stored =
                SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
            zip.start_file(ODF_MIMETYPE_PART, stored)?;
            zip.write_all(mimetype)?;
        }
        for (name, bytes) in &self.parts {
            if name == ODF_MIMETYPE_PART {
                continue;
            }
            zip.start_file(name.as_str(), deflated)?;
            zip.write_all(bytes)?;
        }

        let cursor = zip.finish()?;
        w.write_all(&cursor.into_inner())?;
        Ok(())
    }

    /// Write the package into a byte vector
    ///
    /// # Errors
    ///
    /// Returns an error if writing the archive fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.write_to(&mut buf)?;
        Ok(buf)
    }
}
