use std::fs::File;
use std::io::{BufReader, Write};
use std::path::Path;
use std::sync::Arc;

use noodles_fasta::{fai, io::Indexer};

use crate::{error::FastaError, interval::ChromSizes, Result};

/// A single line of a `.fai` index
///
/// Describes where the bases of one record live in the FASTA file so that any
/// base can be located without scanning:
///
/// `byte(i) = offset + (i / line_bases) * line_width + i % line_bases`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaiEntry {
    /// Record name (first word of the header line)
    pub name: Arc<str>,
    /// Number of bases in the record
    pub length: u64,
    /// Byte offset of the first base
    pub offset: u64,
    /// Bases per line
    pub line_bases: u64,
    /// Bytes per line, including the line terminator
    pub line_width: u64,
}
impl FaiEntry {
    /// Byte offset of the base at `pos` (0-based)
    #[must_use]
    pub fn byte_offset(&self, pos: u64) -> u64 {
        if self.line_bases == 0 {
            return self.offset;
        }
        self.offset + (pos / self.line_bases) * self.line_width + pos % self.line_bases
    }

    /// Byte offset one past the last base of the record
    #[must_use]
    pub fn end_offset(&self) -> u64 {
        if self.length == 0 {
            self.offset
        } else {
            self.byte_offset(self.length - 1) + 1
        }
    }
}
impl From<&fai::Record> for FaiEntry {
    fn from(record: &fai::Record) -> Self {
        Self {
            name: String::from_utf8_lossy(record.name()).as_ref().into(),
            length: record.length(),
            offset: record.offset(),
            line_bases: record.line_bases(),
            line_width: record.line_width(),
        }
    }
}
impl From<&FaiEntry> for fai::Record {
    fn from(entry: &FaiEntry) -> Self {
        fai::Record::new(
            entry.name.as_bytes().to_vec(),
            entry.length,
            entry.offset,
            entry.line_bases,
            entry.line_width,
        )
    }
}

/// An in-memory `.fai` index of a FASTA file
#[derive(Debug, Clone, Default)]
pub struct FastaIndex {
    entries: Vec<FaiEntry>,
}
impl FastaIndex {
    /// Reads an existing `.fai` file
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut reader = File::open(path)
            .map(BufReader::new)
            .map(fai::io::Reader::new)?;
        let records: Vec<fai::Record> = reader.read_index()?.into();
        Self::from_records(&records)
    }

    /// Builds the index by scanning the raw FASTA bytes
    ///
    /// Every line of a record except the last must have the same width.
    pub fn build(bytes: &[u8]) -> Result<Self> {
        let mut indexer = Indexer::new(bytes);
        let mut records = Vec::new();
        while let Some(record) = indexer
            .index_record()
            .map_err(|e| FastaError::Indexing(e.to_string()))?
        {
            records.push(record);
        }
        Self::from_records(&records)
    }

    fn from_records(records: &[fai::Record]) -> Result<Self> {
        if records.is_empty() {
            return Err(FastaError::NoRecords.into());
        }
        Ok(Self {
            entries: records.iter().map(FaiEntry::from).collect(),
        })
    }

    /// Writes the index in `.fai` format
    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        let records: Vec<fai::Record> = self.entries.iter().map(fai::Record::from).collect();
        let index = fai::Index::from(records);
        fai::io::Writer::new(writer).write_index(&index)?;
        Ok(())
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FaiEntry> {
        self.entries.iter().find(|e| &*e.name == name)
    }

    #[must_use]
    pub fn entries(&self) -> &[FaiEntry] {
        &self.entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Chromosome size table in index order
    #[must_use]
    pub fn chrom_sizes(&self) -> ChromSizes {
        let mut sizes = ChromSizes::new();
        for entry in &self.entries {
            sizes.insert(entry.name.clone(), entry.length);
        }
        sizes
    }
}
