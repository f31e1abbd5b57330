//! # track
//!
//! Coordinate-indexed numeric tracks (signal and control coverage) aligned to the
//! reference genome.
//!
//! Tracks are read from bedGraph files (`chrom start end value`, optionally
//! compressed) and kept as sorted runs per chromosome. Bases not covered by any
//! record read as `0.0`. Any type implementing [`SignalTrack`] can be used in place of the
//! bundled [`CoverageTrack`].

mod coverage;
mod smoothing;

use auto_impl::auto_impl;

pub use coverage::CoverageTrack;
pub use smoothing::{GaussianSmoother, SmoothingParams};

use crate::Result;

/// Read access to a numeric track
///
/// Implementations must be safe to read concurrently from worker threads.
#[auto_impl(&, Box, Arc)]
pub trait SignalTrack: Send + Sync {
    /// Length of a chromosome as known by the track, `None` if unknown
    fn chrom_len(&self, chrom: &str) -> Option<u64>;

    /// Fills `out` with the values of `chrom:start-end`
    ///
    /// `out` must hold exactly `end - start` values.
    ///
    /// # Errors
    ///
    /// Fails with [`crate::error::RangeError::CoordinateOutOfRange`] if the interval
    /// exceeds the chromosome and with [`crate::error::RangeError::UnknownChromosome`]
    /// for unknown chromosomes.
    fn fill(&self, chrom: &str, start: u64, end: u64, out: &mut [f32]) -> Result<()>;

    /// Sum of the values of `chrom:start-end`
    fn sum(&self, chrom: &str, start: u64, end: u64) -> Result<f64> {
        let mut buf = vec![0.0; (end.saturating_sub(start)) as usize];
        self.fill(chrom, start, end, &mut buf)?;
        Ok(buf.iter().map(|&v| f64::from(v)).sum())
    }
}
