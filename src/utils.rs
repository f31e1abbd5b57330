use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::{error::ParseError, Result};

/// Opens a text input for line-wise reading
///
/// Compressed inputs (gzip, bzip2, xz, zstd) are detected from their magic bytes
/// and decompressed transparently.
pub fn open_text<P: AsRef<Path>>(path: P) -> Result<Box<dyn BufRead>> {
    let (handle, _format) = niffler::from_path(path.as_ref())?;
    Ok(Box::new(BufReader::new(handle)))
}

/// Returns true for lines that carry no record (blank, comments, track/browser lines)
pub fn is_skippable(line: &str) -> bool {
    let line = line.trim();
    line.is_empty()
        || line.starts_with('#')
        || line.starts_with("track")
        || line.starts_with("browser")
}

/// Opens a tab separated text input without a header row
///
/// Rows may have varying column counts and `#` comments are skipped. Track and
/// browser lines come through as single field rows, see [`is_skippable_record`].
pub fn tsv_reader<P: AsRef<Path>>(path: P) -> Result<csv::Reader<Box<dyn BufRead>>> {
    Ok(csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .comment(Some(b'#'))
        .from_reader(open_text(path)?))
}

/// Returns true for rows of a [`tsv_reader`] that carry no record
pub fn is_skippable_record(record: &csv::StringRecord) -> bool {
    record.get(0).is_none_or(is_skippable)
}

/// Converts a row level `csv` error into a [`ParseError`] naming the source
pub fn row_error(source_name: &str, err: &csv::Error) -> ParseError {
    let line = err.position().map_or(0, |p| p.line() as usize);
    ParseError::new(source_name, line, err.to_string())
}

/// Returns the largest multiple of `y` that is `<= x`, or with `smallest` set,
/// the smallest multiple of `y` that is `>= x`
///
/// # Panics
///
/// Panics if `y` is zero.
#[must_use]
pub fn round_to_multiple(x: u64, y: u64, smallest: bool) -> u64 {
    let remainder = x % y;
    if remainder == 0 {
        x
    } else if smallest {
        x - remainder + y
    } else {
        x - remainder
    }
}

#[cfg(test)]
mod testing {
    use super::*;

    #[test]
    fn test_round_to_multiple() {
        assert_eq!(round_to_multiple(100, 8, false), 96);
        assert_eq!(round_to_multiple(100, 8, true), 104);
        assert_eq!(round_to_multiple(96, 8, false), 96);
        assert_eq!(round_to_multiple(96, 8, true), 96);
        assert_eq!(round_to_multiple(3, 8, false), 0);
    }

    #[test]
    fn test_skippable_lines() {
        assert!(is_skippable(""));
        assert!(is_skippable("   "));
        assert!(is_skippable("# comment"));
        assert!(is_skippable("track type=bedGraph"));
        assert!(!is_skippable("chr1\t0\t10"));
    }

    #[test]
    fn test_tsv_reader() -> anyhow::Result<()> {
        use std::io::Write;
        let mut file = tempfile::NamedTempFile::new()?;
        writeln!(file, "track name=x\n# comment\nchr1\t10\nchr2\t20\t0.5")?;
        let mut reader = tsv_reader(file.path())?;
        let rows: Vec<csv::StringRecord> = reader
            .records()
            .filter(|r| !r.as_ref().is_ok_and(is_skippable_record))
            .collect::<std::result::Result<_, _>>()?;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].get(2), Some("0.5"));
        Ok(())
    }
}
