//! Genomic coordinates
//!
//! This module provides the coordinate types shared by the sampler, the extractor and
//! the batch processors:
//! - [`Strand`] and [`GenomicInterval`] for plain intervals
//! - [`PeakRecord`] for BED / narrowPeak entries with a summit
//! - [`SequenceWindow`] for a resolved, fixed-length window around a center
//! - [`ChromSizes`] for the chromosome length table every window is checked against
//!
//! All coordinates are 0-based and half-open.

use std::collections::HashMap;
use std::fmt;
use std::io::BufRead;
use std::path::Path;
use std::sync::Arc;

use bio::io::bed;
use serde::{Deserialize, Serialize};

use crate::{
    error::{ParseError, RangeError},
    utils::{is_skippable, is_skippable_record, open_text, row_error, tsv_reader},
    Result,
};

/// Strand of an interval or of a task's signal
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Strand {
    #[serde(rename = "+", alias = "plus", alias = "0")]
    Plus,
    #[serde(rename = "-", alias = "minus", alias = "1")]
    Minus,
    #[default]
    #[serde(rename = ".", alias = "unstranded")]
    Unstranded,
}
impl Strand {
    /// Parses the strand column of a BED file
    #[must_use]
    pub fn from_symbol(symbol: &str) -> Self {
        match symbol {
            "+" => Self::Plus,
            "-" => Self::Minus,
            _ => Self::Unstranded,
        }
    }

    #[must_use]
    pub fn is_stranded(&self) -> bool {
        !matches!(self, Self::Unstranded)
    }
}
impl fmt::Display for Strand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plus => write!(f, "+"),
            Self::Minus => write!(f, "-"),
            Self::Unstranded => write!(f, "."),
        }
    }
}

/// A 0-based half-open interval on a chromosome
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GenomicInterval {
    pub chrom: Arc<str>,
    pub start: u64,
    pub end: u64,
    pub strand: Strand,
}
impl GenomicInterval {
    pub fn new(chrom: impl Into<Arc<str>>, start: u64, end: u64, strand: Strand) -> Result<Self> {
        if start >= end {
            return Err(RangeError::EmptyInterval(start, end).into());
        }
        Ok(Self {
            chrom: chrom.into(),
            start,
            end,
            strand,
        })
    }

    #[must_use]
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// Validates the interval against the chromosome size table
    pub fn check_bounds(&self, sizes: &ChromSizes) -> Result<()> {
        let len = sizes.require(&self.chrom)?;
        if self.end > len {
            return Err(RangeError::CoordinateOutOfRange {
                chrom: self.chrom.to_string(),
                start: self.start as i64,
                end: self.end as i64,
                len,
            }
            .into());
        }
        Ok(())
    }

    #[must_use]
    pub fn overlaps(&self, chrom: &str, start: u64, end: u64) -> bool {
        &*self.chrom == chrom && self.start < end && start < self.end
    }
}

/// A peak from a BED / narrowPeak file
///
/// Only the first three columns are required. The narrowPeak layout is
/// `chrom start end name score strand signal p q summit`, where a summit of `-1`
/// (or a missing summit column) means the midpoint of the interval.
#[derive(Debug, Clone, PartialEq)]
pub struct PeakRecord {
    pub interval: GenomicInterval,
    /// Offset of the summit from `interval.start`
    pub summit: u64,
    pub name: Option<String>,
    pub score: f64,
    /// narrowPeak signal value, used as the weight in weighted peak sampling
    pub signal: f64,
}
impl PeakRecord {
    /// Absolute summit position
    #[must_use]
    pub fn summit_pos(&self) -> u64 {
        self.interval.start + self.summit
    }

    /// Converts a record read by [`bed::Reader`]
    ///
    /// narrowPeak columns 7 (signal) and 10 (summit) are taken from the auxiliary
    /// fields when present.
    ///
    /// # Arguments
    ///
    /// * `record` - The BED record
    /// * `source_name` - Name of the source file (for error messages)
    /// * `line_number` - 1-based line number (for error messages)
    pub fn from_bed_record(
        record: &bed::Record,
        source_name: &str,
        line_number: usize,
    ) -> Result<Self> {
        let (start, end) = (record.start(), record.end());
        if start >= end {
            return Err(ParseError::new(
                source_name,
                line_number,
                format!("start ({start}) must be lower than end ({end})"),
            )
            .into());
        }
        let field = |idx: usize| {
            record
                .aux(idx)
                .map(str::trim)
                .filter(|s| !s.is_empty() && *s != ".")
        };
        let parse_f64 = |value: Option<&str>| value.and_then(|s| s.trim().parse::<f64>().ok());

        let midpoint = (end - start) / 2;
        let summit = match field(9).map(|s| (s, s.parse::<i64>())) {
            None => midpoint,
            Some((_, Ok(s))) if s < 0 => midpoint,
            Some((_, Ok(s))) => s as u64,
            Some((s, Err(_))) => {
                return Err(
                    ParseError::new(source_name, line_number, format!("invalid summit: '{s}'"))
                        .into(),
                )
            }
        };

        Ok(Self {
            interval: GenomicInterval::new(
                record.chrom(),
                start,
                end,
                field(5).map_or(Strand::Unstranded, Strand::from_symbol),
            )?,
            summit,
            name: field(3).map(str::to_string),
            score: parse_f64(record.score()).unwrap_or(0.0),
            signal: parse_f64(field(6)).unwrap_or(0.0),
        })
    }

    /// Parses a single BED line
    pub fn from_bed_line(line: &str, source_name: &str, line_number: usize) -> Result<Self> {
        let mut peaks = Self::parse_bed(line.as_bytes(), source_name, &[line_number])?;
        match peaks.pop() {
            Some(peak) if peaks.is_empty() => Ok(peak),
            _ => Err(ParseError::new(source_name, line_number, "expected a single BED record").into()),
        }
    }

    /// Reads all peaks of a BED / narrowPeak file (optionally compressed)
    ///
    /// Comment, track and browser lines are skipped.
    pub fn read_bed<P: AsRef<Path>>(path: P) -> Result<Vec<Self>> {
        let source_name = path.as_ref().display().to_string();
        let mut records = String::new();
        let mut line_numbers = Vec::new();
        for (idx, line) in open_text(&path)?.lines().enumerate() {
            let line = line?;
            if is_skippable(&line) {
                continue;
            }
            records.push_str(&line);
            records.push('\n');
            line_numbers.push(idx + 1);
        }
        let peaks = Self::parse_bed(records.as_bytes(), &source_name, &line_numbers)?;
        log::debug!("Read {} peaks from {}", peaks.len(), source_name);
        Ok(peaks)
    }

    fn parse_bed(bytes: &[u8], source_name: &str, line_numbers: &[usize]) -> Result<Vec<Self>> {
        let mut reader = bed::Reader::new(bytes);
        reader
            .records()
            .enumerate()
            .map(|(idx, record)| {
                let line = line_numbers.get(idx).copied().unwrap_or(idx + 1);
                let record =
                    record.map_err(|e| ParseError::new(source_name, line, e.to_string()))?;
                Self::from_bed_record(&record, source_name, line)
            })
            .collect()
    }
}

/// Fixed lengths of the input (sequence) and output (profile) windows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowShape {
    pub input_len: u64,
    pub output_len: u64,
}
impl WindowShape {
    #[must_use]
    pub fn new(input_len: u64, output_len: u64) -> Self {
        Self {
            input_len,
            output_len,
        }
    }

    /// Bases required on either side of a center so that both windows fit
    #[must_use]
    pub fn flank(&self) -> u64 {
        self.input_len.max(self.output_len).div_ceil(2)
    }

    /// Start of a window of `len` bases centered on `center`
    fn start_of(center: i64, len: u64) -> i64 {
        center - (len / 2) as i64
    }

    /// Returns true if both windows around `center` fit into `[0, chrom_len)`
    #[must_use]
    pub fn fits(&self, center: i64, chrom_len: u64) -> bool {
        [self.input_len, self.output_len].iter().all(|&len| {
            let start = Self::start_of(center, len);
            start >= 0 && start + len as i64 <= chrom_len as i64
        })
    }
}

/// A resolved window around a (possibly jittered) center
///
/// Produced by the sampler for every batch item and consumed immediately by a batch
/// processor. `start..end` is the input (sequence) window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceWindow {
    pub chrom: Arc<str>,
    /// Center after jitter
    pub center: u64,
    pub start: u64,
    pub end: u64,
    /// Offset applied to the original center
    pub jitter: i64,
    /// Whether the window is to be reverse complemented
    pub rev_comp: bool,
    /// Whether the window is a background (non-peak) sample
    pub negative: bool,
}
impl SequenceWindow {
    /// Resolves the input window around `position + jitter`
    ///
    /// # Errors
    ///
    /// Returns [`RangeError::CoordinateOutOfRange`] if either the input or the output
    /// window would fall outside of the chromosome.
    pub fn resolve(
        chrom: Arc<str>,
        position: u64,
        jitter: i64,
        shape: WindowShape,
        chrom_len: u64,
    ) -> Result<Self> {
        let center = position as i64 + jitter;
        if !shape.fits(center, chrom_len) {
            let start = WindowShape::start_of(center, shape.input_len);
            return Err(RangeError::CoordinateOutOfRange {
                chrom: chrom.to_string(),
                start,
                end: start + shape.input_len as i64,
                len: chrom_len,
            }
            .into());
        }
        let start = WindowShape::start_of(center, shape.input_len) as u64;
        Ok(Self {
            chrom,
            center: center as u64,
            start,
            end: start + shape.input_len,
            jitter,
            rev_comp: false,
            negative: false,
        })
    }

    #[must_use]
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// The output (profile) window of `output_len` bases sharing this window's center
    #[must_use]
    pub fn output_range(&self, output_len: u64) -> (u64, u64) {
        let start = self.center - output_len / 2;
        (start, start + output_len)
    }
}
impl fmt::Display for SequenceWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}-{}", self.chrom, self.start, self.end)
    }
}

/// Ordered chromosome length table
#[derive(Debug, Clone, Default)]
pub struct ChromSizes {
    entries: Vec<(Arc<str>, u64)>,
    lookup: HashMap<Arc<str>, usize>,
}
impl ChromSizes {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a chromosome length
    pub fn insert(&mut self, chrom: impl Into<Arc<str>>, len: u64) {
        let chrom = chrom.into();
        if let Some(&idx) = self.lookup.get(&chrom) {
            self.entries[idx].1 = len;
        } else {
            self.lookup.insert(chrom.clone(), self.entries.len());
            self.entries.push((chrom, len));
        }
    }

    /// Reads a two column (chromosome, size) tab separated file
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let source_name = path.as_ref().display().to_string();
        let mut reader = tsv_reader(&path)?;
        let mut sizes = Self::new();
        for record in reader.records() {
            let record = record.map_err(|e| row_error(&source_name, &e))?;
            if is_skippable_record(&record) {
                continue;
            }
            let line = record.position().map_or(0, |p| p.line() as usize);
            let (Some(chrom), Some(size)) = (record.get(0), record.get(1)) else {
                return Err(ParseError::new(&source_name, line, "expected 2 columns").into());
            };
            let size = size.trim().parse::<u64>().map_err(|_| {
                ParseError::new(&source_name, line, format!("invalid size: '{size}'"))
            })?;
            sizes.insert(chrom.trim(), size);
        }
        Ok(sizes)
    }

    #[must_use]
    pub fn get(&self, chrom: &str) -> Option<u64> {
        self.lookup.get(chrom).map(|&idx| self.entries[idx].1)
    }

    /// Like [`ChromSizes::get`] but fails with [`RangeError::UnknownChromosome`]
    pub fn require(&self, chrom: &str) -> Result<u64> {
        self.get(chrom)
            .ok_or_else(|| RangeError::UnknownChromosome(chrom.to_string()).into())
    }

    /// Returns the shared name of a chromosome, avoiding a new allocation per window
    #[must_use]
    pub fn name(&self, chrom: &str) -> Option<Arc<str>> {
        self.lookup
            .get(chrom)
            .map(|&idx| self.entries[idx].0.clone())
    }

    #[must_use]
    pub fn contains(&self, chrom: &str) -> bool {
        self.lookup.contains_key(chrom)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Arc<str>, u64)> {
        self.entries.iter().map(|(c, l)| (c, *l))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Restricts the table to the given chromosomes (in the given order)
    ///
    /// An empty selection keeps every chromosome.
    pub fn select(&self, chroms: &[String]) -> Result<Self> {
        if chroms.is_empty() {
            return Ok(self.clone());
        }
        let mut selected = Self::new();
        for chrom in chroms {
            let len = self
                .get(chrom)
                .ok_or_else(|| crate::error::ConfigError::UnknownChromosome(chrom.clone()))?;
            selected.insert(chrom.as_str(), len);
        }
        Ok(selected)
    }
}

#[cfg(test)]
mod testing {
    use super::*;
    use anyhow::Result;
    use std::io::Write;

    #[test]
    fn test_narrowpeak_line() -> Result<()> {
        let line = "chr1\t100\t300\tpeak1\t50\t+\t12.5\t3.1\t2.0\t40";
        let peak = PeakRecord::from_bed_line(line, "test", 1)?;
        assert_eq!(&*peak.interval.chrom, "chr1");
        assert_eq!(peak.summit_pos(), 140);
        assert_eq!(peak.interval.strand, Strand::Plus);
        assert_eq!(peak.name.as_deref(), Some("peak1"));
        assert!((peak.signal - 12.5).abs() < f64::EPSILON);
        Ok(())
    }

    #[test]
    fn test_bed3_uses_midpoint() -> Result<()> {
        let peak = PeakRecord::from_bed_line("chr2\t10\t20", "test", 1)?;
        assert_eq!(peak.summit_pos(), 15);
        assert_eq!(peak.interval.strand, Strand::Unstranded);

        let peak = PeakRecord::from_bed_line("chr2\t10\t20\t.\t0\t.\t0\t0\t0\t-1", "test", 1)?;
        assert_eq!(peak.summit_pos(), 15);
        Ok(())
    }

    #[test]
    fn test_malformed_bed_line() {
        assert!(PeakRecord::from_bed_line("chr1\t10", "test", 3).is_err());
        assert!(PeakRecord::from_bed_line("chr1\tx\t20", "test", 3).is_err());
        assert!(PeakRecord::from_bed_line("chr1\t20\t20", "test", 3).is_err());
    }

    #[test]
    fn test_read_bed() -> Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        writeln!(
            file,
            "track name=peaks\n# comment\nchr1\t100\t300\tp1\t0\t-\t1.0\t0\t0\t20\nchr2\t10\t20\tp2\t0\t+\t2.0\t0\t0\t-1"
        )?;
        let peaks = PeakRecord::read_bed(file.path())?;
        assert_eq!(peaks.len(), 2);
        assert_eq!(peaks[0].summit_pos(), 120);
        assert_eq!(peaks[0].interval.strand, Strand::Minus);
        assert_eq!(peaks[1].summit_pos(), 15);

        let mut file = tempfile::NamedTempFile::new()?;
        writeln!(file, "track name=peaks\nchr1\t10\t20\nchr1\t30\t25")?;
        let err = PeakRecord::read_bed(file.path()).err();
        assert!(matches!(
            err,
            Some(crate::Error::ParseError(ParseError { line: 3, .. }))
        ));
        Ok(())
    }

    #[test]
    fn test_window_resolution() -> Result<()> {
        let shape = WindowShape::new(100, 50);
        let window = SequenceWindow::resolve("chr1".into(), 500, 0, shape, 1000)?;
        assert_eq!((window.start, window.end), (450, 550));
        assert_eq!(window.output_range(50), (475, 525));

        let window = SequenceWindow::resolve("chr1".into(), 500, -7, shape, 1000)?;
        assert_eq!(window.center, 493);
        assert_eq!(window.jitter, -7);
        assert_eq!(window.len(), 100);
        Ok(())
    }

    #[test]
    fn test_window_out_of_range() {
        let shape = WindowShape::new(100, 100);
        assert!(SequenceWindow::resolve("chr1".into(), 49, 0, shape, 1000).is_err());
        assert!(SequenceWindow::resolve("chr1".into(), 50, 0, shape, 1000).is_ok());
        assert!(SequenceWindow::resolve("chr1".into(), 950, 0, shape, 1000).is_ok());
        assert!(SequenceWindow::resolve("chr1".into(), 951, 0, shape, 1000).is_err());
        assert!(SequenceWindow::resolve("chr1".into(), 940, 20, shape, 1000).is_err());
    }

    #[test]
    fn test_chrom_sizes() -> Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        writeln!(file, "chr1\t1000\nchr2\t500\n\n# comment\nchrX\t250")?;
        let sizes = ChromSizes::from_path(file.path())?;
        assert_eq!(sizes.len(), 3);
        assert_eq!(sizes.get("chr2"), Some(500));
        assert_eq!(sizes.get("chrX"), Some(250));
        assert!(sizes.require("chr3").is_err());

        let selected = sizes.select(&["chrX".to_string(), "chr1".to_string()])?;
        let names: Vec<_> = selected.iter().map(|(c, _)| c.to_string()).collect();
        assert_eq!(names, vec!["chrX", "chr1"]);
        assert!(sizes.select(&["chr9".to_string()]).is_err());
        Ok(())
    }

    #[test]
    fn test_interval_bounds() -> Result<()> {
        let mut sizes = ChromSizes::new();
        sizes.insert("chr1", 100);
        let interval = GenomicInterval::new("chr1", 10, 100, Strand::Minus)?;
        interval.check_bounds(&sizes)?;
        let interval = GenomicInterval::new("chr1", 10, 101, Strand::Minus)?;
        assert!(interval.check_bounds(&sizes).is_err());
        assert!(GenomicInterval::new("chr1", 10, 10, Strand::Plus).is_err());
        Ok(())
    }
}
