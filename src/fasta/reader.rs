use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use memmap2::Mmap;

use super::index::{FaiEntry, FastaIndex};
use crate::{
    error::{FastaError, RangeError},
    interval::ChromSizes,
    Result,
};

/// A memory-mapped, random access reader for a plain-text FASTA reference
///
/// The reader locates bases through a `.fai` index: `<path>.fai` is used when it
/// exists, otherwise the index is built by scanning the mapped file once.
///
/// The mapping is never mutated after construction so a single reader can be shared
/// across worker threads (e.g. behind an `Arc`) for concurrent fetches.
///
/// # Examples
///
/// ```no_run
/// use mseqgen::fasta::ReferenceGenome;
///
/// let genome = ReferenceGenome::new("hg38.fa").unwrap();
/// let seq = genome.fetch("chr1", 1_000_000, 1_000_100).unwrap();
/// assert_eq!(seq.len(), 100);
/// ```
pub struct ReferenceGenome {
    /// Memory mapped file contents
    mmap: Mmap,

    /// Location of every record in the mapped file
    index: FastaIndex,

    /// Record name to index position
    lookup: HashMap<Arc<str>, usize>,

    path: PathBuf,
}

impl ReferenceGenome {
    /// Opens and memory-maps a FASTA file
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// * The file cannot be opened or is not a regular file
    /// * The `.fai` sidecar cannot be parsed, or the file cannot be indexed
    /// * An index entry points beyond the end of the file
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        // Verify input file is a file before attempting to map
        let file = File::open(&path)?;
        if !file.metadata()?.is_file() {
            return Err(FastaError::IncompatibleFile.into());
        }

        // Safety: the file is open and won't be modified while mapped
        let mmap = unsafe { Mmap::map(&file)? };

        let fai_path = fai_path(&path);
        let index = if fai_path.exists() {
            log::debug!("Reading FASTA index {}", fai_path.display());
            FastaIndex::from_path(&fai_path)?
        } else {
            log::debug!("Indexing {}", path.display());
            FastaIndex::build(&mmap)?
        };

        Self::from_parts(mmap, index, path)
    }

    fn from_parts(mmap: Mmap, index: FastaIndex, path: PathBuf) -> Result<Self> {
        for entry in index.entries() {
            if entry.end_offset() > mmap.len() as u64 {
                return Err(FastaError::IndexOutOfBounds(entry.name.to_string()).into());
            }
        }
        let lookup = index
            .entries()
            .iter()
            .enumerate()
            .map(|(idx, entry)| (entry.name.clone(), idx))
            .collect();
        log::info!(
            "Loaded reference {} ({} sequences)",
            path.display(),
            index.len()
        );
        Ok(Self {
            mmap,
            index,
            lookup,
            path,
        })
    }

    /// Returns the index entry of a record
    pub fn entry(&self, chrom: &str) -> Result<&FaiEntry> {
        self.lookup
            .get(chrom)
            .map(|&idx| &self.index.entries()[idx])
            .ok_or_else(|| RangeError::UnknownChromosome(chrom.to_string()).into())
    }

    /// Length of a record
    pub fn chrom_len(&self, chrom: &str) -> Result<u64> {
        self.entry(chrom).map(|e| e.length)
    }

    /// Chromosome size table in file order
    #[must_use]
    pub fn chrom_sizes(&self) -> ChromSizes {
        self.index.chrom_sizes()
    }

    #[must_use]
    pub fn index(&self) -> &FastaIndex {
        &self.index
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Fetches the bases of `chrom:start-end` into `buf` (uppercased)
    ///
    /// The buffer is cleared first so it can be reused across calls.
    ///
    /// # Errors
    ///
    /// Returns [`RangeError::CoordinateOutOfRange`] if the interval is empty or exceeds
    /// the record, and [`RangeError::UnknownChromosome`] for unknown records.
    pub fn fetch_into(&self, chrom: &str, start: u64, end: u64, buf: &mut Vec<u8>) -> Result<()> {
        buf.clear();
        let entry = self.entry(chrom)?;
        if start >= end || end > entry.length {
            return Err(RangeError::CoordinateOutOfRange {
                chrom: chrom.to_string(),
                start: start as i64,
                end: end as i64,
                len: entry.length,
            }
            .into());
        }

        let lbound = entry.byte_offset(start) as usize;
        let rbound = entry.byte_offset(end - 1) as usize + 1;
        buf.reserve((end - start) as usize);
        buf.extend(
            self.mmap[lbound..rbound]
                .iter()
                .filter(|&&b| b != b'\n' && b != b'\r')
                .map(u8::to_ascii_uppercase),
        );
        Ok(())
    }

    /// Fetches the bases of `chrom:start-end` as a new buffer
    pub fn fetch(&self, chrom: &str, start: u64, end: u64) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.fetch_into(chrom, start, end, &mut buf)?;
        Ok(buf)
    }
}

/// Conventional location of the index of a FASTA file (`<path>.fai`)
#[must_use]
pub fn fai_path(path: &Path) -> PathBuf {
    let mut fai = path.as_os_str().to_owned();
    fai.push(".fai");
    PathBuf::from(fai)
}
