use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use super::SignalTrack;
use crate::{
    error::{ParseError, RangeError, TrackError},
    interval::ChromSizes,
    utils::{is_skippable_record, row_error, tsv_reader},
    Result,
};

/// Sorted, non-overlapping runs of constant value on one chromosome
#[derive(Debug, Clone, Default)]
struct Runs {
    starts: Vec<u64>,
    ends: Vec<u64>,
    values: Vec<f32>,
}
impl Runs {
    fn from_records(mut records: Vec<(u64, u64, f32)>) -> std::result::Result<Self, u64> {
        records.sort_unstable_by_key(|&(start, _, _)| start);
        let mut runs = Self::default();
        for (start, end, value) in records {
            if runs.ends.last().is_some_and(|&prev| prev > start) {
                return Err(start);
            }
            runs.starts.push(start);
            runs.ends.push(end);
            runs.values.push(value);
        }
        Ok(runs)
    }

    /// Indices of the runs overlapping `start..end`
    fn overlapping(&self, start: u64, end: u64) -> impl Iterator<Item = usize> + '_ {
        let first = self.ends.partition_point(|&e| e <= start);
        (first..self.starts.len()).take_while(move |&i| self.starts[i] < end)
    }

    /// Overlap of run `i` with `start..end`
    fn clip(&self, i: usize, start: u64, end: u64) -> (u64, u64) {
        (self.starts[i].max(start), self.ends[i].min(end))
    }

    fn len(&self) -> usize {
        self.starts.len()
    }
}

/// An in-memory coverage track
///
/// Keeps the bedGraph records of every chromosome as sorted runs and answers
/// queries by binary search, so memory grows with the number of records rather
/// than with the genome length. Bases not covered by any record read as zeros.
#[derive(Debug, Clone, Default)]
pub struct CoverageTrack {
    sizes: ChromSizes,
    runs: HashMap<Arc<str>, Runs>,
}
impl CoverageTrack {
    /// Creates an all-zero track over the given chromosomes
    #[must_use]
    pub fn empty(sizes: ChromSizes) -> Self {
        Self {
            sizes,
            runs: HashMap::new(),
        }
    }

    /// Reads a bedGraph file
    ///
    /// Records on chromosomes missing from `sizes` are skipped, records extending past
    /// the end of their chromosome are clipped. Overlapping records are an error.
    pub fn from_bedgraph<P: AsRef<Path>>(path: P, sizes: &ChromSizes) -> Result<Self> {
        let source_name = path.as_ref().display().to_string();
        let mut reader = tsv_reader(&path)?;
        let mut records: HashMap<Arc<str>, Vec<(u64, u64, f32)>> = HashMap::new();
        let mut n_records = 0;
        let mut n_skipped = 0;
        let mut n_clipped = 0;

        for record in reader.records() {
            let record = record.map_err(|e| row_error(&source_name, &e))?;
            if is_skippable_record(&record) {
                continue;
            }
            let line = record.position().map_or(0, |p| p.line() as usize);
            if record.len() < 4 {
                return Err(ParseError::new(
                    &source_name,
                    line,
                    format!("expected 4 columns, found {}", record.len()),
                )
                .into());
            }
            let (Ok(start), Ok(end), Ok(value)) = (
                record[1].trim().parse::<u64>(),
                record[2].trim().parse::<u64>(),
                record[3].trim().parse::<f32>(),
            ) else {
                return Err(ParseError::new(&source_name, line, "invalid bedGraph record").into());
            };

            let Some(chrom) = sizes.name(record[0].trim()) else {
                n_skipped += 1;
                continue;
            };
            let chrom_len = sizes.get(&chrom).unwrap_or(0);
            let end = if end > chrom_len {
                n_clipped += 1;
                chrom_len
            } else {
                end
            };
            if start >= end {
                continue;
            }
            records.entry(chrom).or_default().push((start, end, value));
            n_records += 1;
        }

        let mut track = Self::empty(sizes.clone());
        for (chrom, list) in records {
            let runs = Runs::from_records(list).map_err(|pos| TrackError::OverlappingRecords {
                source_name: source_name.clone(),
                chrom: chrom.to_string(),
                pos,
            })?;
            track.runs.insert(chrom, runs);
        }

        if n_skipped > 0 {
            log::debug!("{source_name}: skipped {n_skipped} records on unselected chromosomes");
        }
        if n_clipped > 0 {
            log::warn!("{source_name}: clipped {n_clipped} records extending past their chromosome");
        }
        log::debug!("Read {n_records} bedGraph records from {source_name}");
        Ok(track)
    }

    /// Number of stored records
    #[must_use]
    pub fn num_records(&self) -> usize {
        self.runs.values().map(Runs::len).sum()
    }

    #[must_use]
    pub fn sizes(&self) -> &ChromSizes {
        &self.sizes
    }

    fn check_range(&self, chrom: &str, start: u64, end: u64) -> Result<()> {
        let len = self.sizes.require(chrom)?;
        if start > end || end > len {
            return Err(RangeError::CoordinateOutOfRange {
                chrom: chrom.to_string(),
                start: start as i64,
                end: end as i64,
                len,
            }
            .into());
        }
        Ok(())
    }
}

impl SignalTrack for CoverageTrack {
    fn chrom_len(&self, chrom: &str) -> Option<u64> {
        self.sizes.get(chrom)
    }

    fn fill(&self, chrom: &str, start: u64, end: u64, out: &mut [f32]) -> Result<()> {
        self.check_range(chrom, start, end)?;
        if out.len() as u64 != end - start {
            return Err(RangeError::CoordinateOutOfRange {
                chrom: chrom.to_string(),
                start: start as i64,
                end: end as i64,
                len: out.len() as u64,
            }
            .into());
        }
        out.fill(0.0);
        if let Some(runs) = self.runs.get(chrom) {
            for i in runs.overlapping(start, end) {
                let (lo, hi) = runs.clip(i, start, end);
                out[(lo - start) as usize..(hi - start) as usize].fill(runs.values[i]);
            }
        }
        Ok(())
    }

    fn sum(&self, chrom: &str, start: u64, end: u64) -> Result<f64> {
        self.check_range(chrom, start, end)?;
        let Some(runs) = self.runs.get(chrom) else {
            return Ok(0.0);
        };
        Ok(runs
            .overlapping(start, end)
            .map(|i| {
                let (lo, hi) = runs.clip(i, start, end);
                f64::from(runs.values[i]) * (hi - lo) as f64
            })
            .sum())
    }
}

#[cfg(test)]
mod testing {
    use super::*;
    use anyhow::Result;
    use std::io::Write;

    fn sizes() -> ChromSizes {
        let mut sizes = ChromSizes::new();
        sizes.insert("chr1", 20);
        sizes.insert("chr2", 10);
        sizes
    }

    #[test]
    fn test_bedgraph() -> Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        writeln!(
            file,
            "track type=bedGraph\nchr1\t5\t6\t3\nchr1\t2\t5\t1.5\nchr9\t0\t5\t7\nchr2\t8\t15\t2"
        )?;
        let track = CoverageTrack::from_bedgraph(file.path(), &sizes())?;
        assert_eq!(track.num_records(), 3);

        let mut out = vec![0.0; 6];
        track.fill("chr1", 1, 7, &mut out)?;
        assert_eq!(out, vec![0.0, 1.5, 1.5, 1.5, 3.0, 0.0]);

        let mut out = vec![0.0; 3];
        track.fill("chr2", 7, 10, &mut out)?;
        assert_eq!(out, vec![0.0, 2.0, 2.0]);

        assert!((track.sum("chr1", 0, 20)? - 7.5).abs() < 1e-6);
        assert!((track.sum("chr1", 3, 6)? - 6.0).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn test_query_between_records() -> Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        writeln!(file, "chr1\t0\t2\t1\nchr1\t10\t12\t4\nchr1\t15\t20\t2")?;
        let track = CoverageTrack::from_bedgraph(file.path(), &sizes())?;

        let mut out = vec![1.0; 8];
        track.fill("chr1", 2, 10, &mut out)?;
        assert_eq!(out, vec![0.0; 8]);

        let mut out = vec![0.0; 6];
        track.fill("chr1", 11, 17, &mut out)?;
        assert_eq!(out, vec![4.0, 0.0, 0.0, 0.0, 2.0, 2.0]);
        assert!((track.sum("chr1", 11, 17)? - 8.0).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn test_overlapping_records() -> Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        writeln!(file, "chr1\t0\t5\t1\nchr1\t4\t8\t2")?;
        let err = CoverageTrack::from_bedgraph(file.path(), &sizes()).err();
        assert!(matches!(
            err,
            Some(crate::Error::TrackError(TrackError::OverlappingRecords { pos: 4, .. }))
        ));
        Ok(())
    }

    #[test]
    fn test_out_of_range() {
        let track = CoverageTrack::empty(sizes());
        let mut out = vec![1.0; 5];
        assert!(track.fill("chr2", 8, 13, &mut out).is_err());
        assert!(track.fill("chrZ", 0, 5, &mut out).is_err());
        assert!(track.fill("chr1", 0, 5, &mut out).is_ok());
        assert_eq!(out, vec![0.0; 5]);
    }

    #[test]
    fn test_malformed_bedgraph() -> Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        writeln!(file, "chr1\t2\tfive\t1.5")?;
        assert!(CoverageTrack::from_bedgraph(file.path(), &sizes()).is_err());
        Ok(())
    }
}
