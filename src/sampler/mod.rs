//! # sampler
//!
//! Derives the genomic windows of every epoch.
//!
//! Candidate positions come either from peak files (each summit once, or weighted
//! draws with replacement) or from the chromosome size table (sequential tiling or
//! uniform draws). Every epoch the [`PositionSampler`]:
//!
//! 1. draws the base positions (fixed for `peaks` / `sequential`)
//! 2. applies a uniform jitter in `[-max_jitter, max_jitter]` to peak positions
//! 3. drops (or, with `replace_dropped`, re-jitters) windows that fall outside of
//!    their chromosome
//! 4. adds `floor(n * negative_sampling_rate)` background windows that do not overlap
//!    any positive window
//! 5. flags windows for reverse complement augmentation
//! 6. optionally shuffles the result

mod chrom;
mod peaks;

use std::collections::HashMap;
use std::sync::Arc;

use rand::{
    distr::{weighted::WeightedIndex, Distribution},
    seq::SliceRandom,
    Rng,
};
use serde::{Deserialize, Serialize};

pub use chrom::{random_positions, sequential_positions};
pub use peaks::peak_positions;

use crate::{
    error::{ConfigError, SampleError},
    interval::{ChromSizes, PeakRecord, SequenceWindow, WindowShape},
    Result,
};

/// Attempts to place a negative window before falling back to an overlapping one
pub const MAX_NEGATIVE_RETRIES: usize = 100;

/// A candidate center position
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub chrom: Arc<str>,
    pub pos: u64,
    /// Sampling weight (narrowPeak signal value for peaks, `1.0` otherwise)
    pub weight: f64,
}

/// How candidate positions are derived
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SamplingMode {
    /// Every peak summit once per epoch
    #[default]
    Peaks,
    /// As many draws as there are peaks, with replacement, weighted by peak signal
    WeightedPeaks,
    /// Positions every `step` bases along each chromosome
    Sequential {
        step: u64,
        #[serde(default)]
        num_positions: Option<usize>,
    },
    /// `num_positions` uniform draws per chromosome, redrawn every epoch
    Random {
        #[serde(default)]
        num_positions: Option<usize>,
    },
}
impl SamplingMode {
    /// Whether positions are derived from peak files
    #[must_use]
    pub fn uses_peaks(&self) -> bool {
        matches!(self, Self::Peaks | Self::WeightedPeaks)
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Sequential { step: 0, .. } => Err(ConfigError::ZeroStep.into()),
            Self::Random {
                num_positions: None,
            } => Err(ConfigError::UnboundedRandomSampling.into()),
            _ => Ok(()),
        }
    }
}

/// Parameters of the [`PositionSampler`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplerParams {
    pub shape: WindowShape,
    pub max_jitter: u64,
    pub negative_sampling_rate: f64,
    pub rev_comp_aug: bool,
    pub shuffle: bool,
    pub drop_duplicates: bool,
    pub replace_dropped: bool,
    pub mode: SamplingMode,
}
impl SamplerParams {
    /// Bases required on either side of a base position
    ///
    /// Peak positions reserve room for the largest jitter so that no jittered
    /// window can leave its chromosome. With `replace_dropped` only the window
    /// itself must fit, and out-of-bounds jitters are redrawn each epoch.
    #[must_use]
    pub fn flank(&self) -> u64 {
        if self.mode.uses_peaks() && !self.replace_dropped {
            self.shape.flank() + self.max_jitter
        } else {
            self.shape.flank()
        }
    }
}

#[derive(Debug, Clone)]
enum PositionSource {
    Fixed(Vec<Position>),
    Weighted {
        positions: Vec<Position>,
        index: WeightedIndex<f64>,
    },
    Random {
        num_positions: usize,
    },
}

/// Produces the resolved windows of each epoch
#[derive(Debug, Clone)]
pub struct PositionSampler {
    sizes: ChromSizes,
    params: SamplerParams,
    source: PositionSource,
}
impl PositionSampler {
    /// Creates a new sampler
    ///
    /// # Arguments
    ///
    /// * `sizes` - The selected chromosomes
    /// * `peak_sets` - Peaks of every task (ignored unless the mode uses peaks)
    /// * `params` - Sampling parameters
    ///
    /// # Errors
    ///
    /// * [`ConfigError::JitterExceedsFlank`] if the jittered window does not fit into
    ///   the longest selected chromosome
    /// * [`SampleError::EmptyPeakSet`] if no position survives filtering
    pub fn new(
        sizes: ChromSizes,
        peak_sets: &[Vec<PeakRecord>],
        params: SamplerParams,
    ) -> Result<Self> {
        params.mode.validate()?;
        let flank = params.flank();
        let longest = sizes.iter().map(|(_, len)| len).max().unwrap_or(0);
        if 2 * flank > longest {
            return Err(ConfigError::JitterExceedsFlank {
                window: params.shape.input_len.max(params.shape.output_len) as usize,
                max_jitter: params.max_jitter as usize,
                longest,
            }
            .into());
        }

        let source = match params.mode {
            SamplingMode::Peaks => PositionSource::Fixed(peak_positions(
                peak_sets,
                &sizes,
                flank,
                params.drop_duplicates,
            )?),
            SamplingMode::WeightedPeaks => {
                let positions = peak_positions(peak_sets, &sizes, flank, params.drop_duplicates)?;
                let index = peak_weights(&positions)?;
                PositionSource::Weighted { positions, index }
            }
            SamplingMode::Sequential {
                step,
                num_positions,
            } => PositionSource::Fixed(sequential_positions(&sizes, flank, step, num_positions)?),
            SamplingMode::Random { num_positions } => PositionSource::Random {
                num_positions: num_positions.ok_or(ConfigError::UnboundedRandomSampling)?,
            },
        };

        let sampler = Self {
            sizes,
            params,
            source,
        };
        if sampler.num_positions() == 0 {
            return Err(SampleError::EmptyPeakSet.into());
        }
        Ok(sampler)
    }

    /// Number of base positions drawn per epoch (before negatives)
    #[must_use]
    pub fn num_positions(&self) -> usize {
        match &self.source {
            PositionSource::Fixed(positions) | PositionSource::Weighted { positions, .. } => {
                positions.len()
            }
            PositionSource::Random { num_positions } => {
                let flank = self.params.flank();
                self.sizes.iter().filter(|(_, len)| *len >= 2 * flank).count() * num_positions
            }
        }
    }

    #[must_use]
    pub fn params(&self) -> &SamplerParams {
        &self.params
    }

    #[must_use]
    pub fn sizes(&self) -> &ChromSizes {
        &self.sizes
    }

    /// Samples the windows of one epoch
    pub fn sample_epoch<R: Rng>(&self, rng: &mut R) -> Result<Vec<SequenceWindow>> {
        let positions: Vec<Position> = match &self.source {
            PositionSource::Fixed(positions) => positions.clone(),
            PositionSource::Weighted { positions, index } => (0..positions.len())
                .map(|_| positions[index.sample(rng)].clone())
                .collect(),
            PositionSource::Random { num_positions } => {
                random_positions(&self.sizes, self.params.flank(), *num_positions, rng)
            }
        };

        let mut windows = self.resolve_positives(&positions, rng)?;
        let n_negatives =
            (windows.len() as f64 * self.params.negative_sampling_rate).floor() as usize;
        if n_negatives > 0 {
            let negatives = self.sample_negatives(&windows, n_negatives, rng)?;
            windows.extend(negatives);
        }

        if self.params.rev_comp_aug {
            for window in &mut windows {
                window.rev_comp = rng.random_bool(0.5);
            }
        }
        if self.params.shuffle {
            windows.shuffle(rng);
        }
        if windows.is_empty() {
            return Err(SampleError::EmptyPeakSet.into());
        }
        Ok(windows)
    }

    fn resolve_positives<R: Rng>(
        &self,
        positions: &[Position],
        rng: &mut R,
    ) -> Result<Vec<SequenceWindow>> {
        let max_jitter = if self.params.mode.uses_peaks() {
            self.params.max_jitter as i64
        } else {
            0
        };
        let shape = self.params.shape;
        let mut windows = Vec::with_capacity(positions.len());
        let mut n_dropped = 0;

        for position in positions {
            let chrom_len = self.sizes.require(&position.chrom)?;
            let jitter = if max_jitter > 0 {
                rng.random_range(-max_jitter..=max_jitter)
            } else {
                0
            };
            match SequenceWindow::resolve(
                position.chrom.clone(),
                position.pos,
                jitter,
                shape,
                chrom_len,
            ) {
                Ok(window) => windows.push(window),
                Err(_) if self.params.replace_dropped => {
                    let (lo, hi) = feasible_centers(shape, chrom_len);
                    let pos = position.pos as i64;
                    let lo = (lo - pos).max(-max_jitter);
                    let hi = (hi - pos).min(max_jitter);
                    if lo > hi {
                        n_dropped += 1;
                        continue;
                    }
                    let jitter = rng.random_range(lo..=hi);
                    windows.push(SequenceWindow::resolve(
                        position.chrom.clone(),
                        position.pos,
                        jitter,
                        shape,
                        chrom_len,
                    )?);
                }
                Err(_) => n_dropped += 1,
            }
        }
        if n_dropped > 0 {
            log::warn!("Dropped {n_dropped} windows outside of their chromosome");
        }
        Ok(windows)
    }

    fn sample_negatives<R: Rng>(
        &self,
        positives: &[SequenceWindow],
        n_negatives: usize,
        rng: &mut R,
    ) -> Result<Vec<SequenceWindow>> {
        let shape = self.params.shape;
        let candidates: Vec<(Arc<str>, u64, i64, i64)> = self
            .sizes
            .iter()
            .filter_map(|(chrom, len)| {
                let (lo, hi) = feasible_centers(shape, len);
                (lo <= hi).then(|| (chrom.clone(), len, lo, hi))
            })
            .collect();
        let Ok(chrom_index) =
            WeightedIndex::new(candidates.iter().map(|(_, _, lo, hi)| (hi - lo + 1) as f64))
        else {
            log::warn!("No chromosome can hold a negative window, skipping negative sampling");
            return Ok(Vec::new());
        };

        let exclusion = Exclusion::new(positives);
        let mut negatives = Vec::with_capacity(n_negatives);
        let mut n_fallback = 0;
        for _ in 0..n_negatives {
            let mut attempt = 0;
            let window = loop {
                let (chrom, len, lo, hi) = &candidates[chrom_index.sample(rng)];
                let center = rng.random_range(*lo..=*hi) as u64;
                let window = SequenceWindow::resolve(chrom.clone(), center, 0, shape, *len)?;
                attempt += 1;
                if !exclusion.overlaps(&window) {
                    break window;
                }
                if attempt >= MAX_NEGATIVE_RETRIES {
                    n_fallback += 1;
                    break window;
                }
            };
            negatives.push(SequenceWindow {
                negative: true,
                ..window
            });
        }
        if n_fallback > 0 {
            log::warn!(
                "{n_fallback} negative windows overlap a positive window after {MAX_NEGATIVE_RETRIES} attempts"
            );
        }
        log::debug!("Sampled {} negative windows", negatives.len());
        Ok(negatives)
    }
}

/// Range of centers for which both windows fit into a chromosome of `chrom_len`
///
/// The range is empty (`lo > hi`) if the chromosome is too short.
fn feasible_centers(shape: WindowShape, chrom_len: u64) -> (i64, i64) {
    let len = chrom_len as i64;
    [shape.input_len, shape.output_len]
        .iter()
        .fold((0, len), |(lo, hi), &w| {
            let half = (w / 2) as i64;
            (lo.max(half), hi.min(len - w as i64 + half))
        })
}

fn peak_weights(positions: &[Position]) -> Result<WeightedIndex<f64>> {
    let weights = positions
        .iter()
        .map(|p| if p.weight.is_finite() { p.weight.max(0.0) } else { 0.0 });
    match WeightedIndex::new(weights) {
        Ok(index) => Ok(index),
        Err(_) if !positions.is_empty() => {
            log::warn!("Peak signal values are unusable as weights, sampling uniformly");
            WeightedIndex::new(positions.iter().map(|_| 1.0))
                .map_err(|e| anyhow::anyhow!(e).into())
        }
        Err(_) => Err(SampleError::EmptyPeakSet.into()),
    }
}

/// Merged, per-chromosome positive windows
struct Exclusion {
    intervals: HashMap<Arc<str>, Vec<(u64, u64)>>,
}
impl Exclusion {
    fn new(windows: &[SequenceWindow]) -> Self {
        let mut intervals: HashMap<Arc<str>, Vec<(u64, u64)>> = HashMap::new();
        for window in windows {
            intervals
                .entry(window.chrom.clone())
                .or_default()
                .push((window.start, window.end));
        }
        for list in intervals.values_mut() {
            list.sort_unstable();
            let mut merged: Vec<(u64, u64)> = Vec::with_capacity(list.len());
            for &(start, end) in list.iter() {
                match merged.last_mut() {
                    Some(last) if start <= last.1 => last.1 = last.1.max(end),
                    _ => merged.push((start, end)),
                }
            }
            *list = merged;
        }
        Self { intervals }
    }

    fn overlaps(&self, window: &SequenceWindow) -> bool {
        let Some(list) = self.intervals.get(&window.chrom) else {
            return false;
        };
        let idx = list.partition_point(|&(_, end)| end <= window.start);
        list.get(idx).is_some_and(|&(start, _)| start < window.end)
    }
}

#[cfg(test)]
mod testing {
    use super::*;
    use anyhow::Result;
    use rand::{rngs::SmallRng, SeedableRng};

    fn params(mode: SamplingMode) -> SamplerParams {
        SamplerParams {
            shape: WindowShape::new(100, 50),
            max_jitter: 0,
            negative_sampling_rate: 0.0,
            rev_comp_aug: false,
            shuffle: false,
            drop_duplicates: false,
            replace_dropped: false,
            mode,
        }
    }

    fn sizes() -> ChromSizes {
        let mut sizes = ChromSizes::new();
        sizes.insert("chr1", 1000);
        sizes.insert("chr2", 2000);
        sizes
    }

    fn peaks(summits: &[(&str, u64)]) -> Result<Vec<PeakRecord>> {
        summits
            .iter()
            .map(|(chrom, s)| {
                let line = format!("{chrom}\t{}\t{}\t.\t0\t.\t{s}", s - 5, s + 5);
                Ok(PeakRecord::from_bed_line(&line, "test", 1)?)
            })
            .collect()
    }

    #[test]
    fn test_peaks_without_jitter() -> Result<()> {
        let sets = vec![peaks(&[("chr1", 200), ("chr1", 500), ("chr1", 800)])?];
        let sampler = PositionSampler::new(sizes(), &sets, params(SamplingMode::Peaks))?;
        let mut rng = SmallRng::seed_from_u64(0);
        let windows = sampler.sample_epoch(&mut rng)?;
        let got: Vec<_> = windows.iter().map(|w| (w.start, w.end)).collect();
        assert_eq!(got, vec![(150, 250), (450, 550), (750, 850)]);
        assert!(windows.iter().all(|w| !w.rev_comp && !w.negative));
        Ok(())
    }

    #[test]
    fn test_jitter_is_bounded() -> Result<()> {
        let sets = vec![peaks(&[("chr1", 200), ("chr1", 500), ("chr2", 1500)])?];
        let mut p = params(SamplingMode::Peaks);
        p.max_jitter = 30;
        p.shuffle = true;
        let sampler = PositionSampler::new(sizes(), &sets, p)?;
        let mut rng = SmallRng::seed_from_u64(11);
        let mut seen_nonzero = false;
        for _ in 0..20 {
            for window in sampler.sample_epoch(&mut rng)? {
                assert!(window.jitter.abs() <= 30);
                assert_eq!(window.len(), 100);
                let len = sizes().get(&window.chrom).unwrap_or(0);
                assert!(window.end <= len);
                seen_nonzero |= window.jitter != 0;
            }
        }
        assert!(seen_nonzero);
        Ok(())
    }

    #[test]
    fn test_peaks_near_edges_are_filtered() -> Result<()> {
        let sets = vec![peaks(&[("chr1", 60), ("chr1", 500)])?];
        let mut p = params(SamplingMode::Peaks);
        p.max_jitter = 20;
        let sampler = PositionSampler::new(sizes(), &sets, p)?;
        assert_eq!(sampler.num_positions(), 1);

        let sets = vec![peaks(&[("chr1", 60)])?];
        assert!(PositionSampler::new(sizes(), &sets, p).is_err());
        Ok(())
    }

    #[test]
    fn test_replace_dropped_keeps_edge_peaks() -> Result<()> {
        let sets = vec![peaks(&[("chr1", 60), ("chr1", 500)])?];
        let mut p = params(SamplingMode::Peaks);
        p.max_jitter = 50;
        p.replace_dropped = true;
        let sampler = PositionSampler::new(sizes(), &sets, p)?;
        assert_eq!(sampler.num_positions(), 2);

        let mut seen_edge_jitter = false;
        for seed in 0..50 {
            let mut rng = SmallRng::seed_from_u64(seed);
            let windows = sampler.sample_epoch(&mut rng)?;
            assert_eq!(windows.len(), 2);
            for window in &windows {
                assert_eq!(window.len(), 100);
                assert!(window.end <= 1000);
                assert!(window.jitter.abs() <= 50);
            }
            let edge = windows.iter().find(|w| w.start < 100);
            let Some(edge) = edge else {
                panic!("edge peak was dropped");
            };
            assert!(edge.jitter >= -10);
            seen_edge_jitter |= edge.jitter != 0;
        }
        assert!(seen_edge_jitter);

        p.replace_dropped = false;
        let sampler = PositionSampler::new(sizes(), &sets, p)?;
        assert_eq!(sampler.num_positions(), 1);
        Ok(())
    }

    #[test]
    fn test_jitter_exceeding_chromosomes() -> Result<()> {
        let sets = vec![peaks(&[("chr1", 500)])?];
        let mut p = params(SamplingMode::Peaks);
        p.max_jitter = 2000;
        assert!(PositionSampler::new(sizes(), &sets, p).is_err());
        Ok(())
    }

    #[test]
    fn test_negatives_do_not_overlap() -> Result<()> {
        let sets = vec![peaks(&[("chr1", 200), ("chr1", 500), ("chr2", 900), ("chr2", 1300)])?];
        let mut p = params(SamplingMode::Peaks);
        p.negative_sampling_rate = 1.5;
        let sampler = PositionSampler::new(sizes(), &sets, p)?;
        let mut rng = SmallRng::seed_from_u64(5);
        let windows = sampler.sample_epoch(&mut rng)?;
        assert_eq!(windows.len(), 4 + 6);

        let (positives, negatives): (Vec<_>, Vec<_>) = windows.iter().partition(|w| !w.negative);
        assert_eq!(negatives.len(), 6);
        let exclusion = Exclusion::new(&positives.into_iter().cloned().collect::<Vec<_>>());
        for negative in negatives {
            assert!(!exclusion.overlaps(negative));
            let len = sizes().get(&negative.chrom).unwrap_or(0);
            assert!(negative.end <= len);
        }
        Ok(())
    }

    #[test]
    fn test_weighted_peaks() -> Result<()> {
        let lines = [
            "chr1\t100\t300\t.\t0\t.\t0.0",
            "chr1\t400\t600\t.\t0\t.\t10.0",
        ];
        let sets = vec![lines
            .iter()
            .map(|l| PeakRecord::from_bed_line(l, "test", 1))
            .collect::<crate::Result<Vec<_>>>()?];
        let sampler = PositionSampler::new(sizes(), &sets, params(SamplingMode::WeightedPeaks))?;
        let mut rng = SmallRng::seed_from_u64(9);
        let windows = sampler.sample_epoch(&mut rng)?;
        assert_eq!(windows.len(), 2);
        // the zero-weight peak is never drawn
        assert!(windows.iter().all(|w| w.center == 500));
        Ok(())
    }

    #[test]
    fn test_sequential_and_random_modes() -> Result<()> {
        let sampler = PositionSampler::new(
            sizes(),
            &[],
            params(SamplingMode::Sequential {
                step: 100,
                num_positions: None,
            }),
        )?;
        // chr1: 50..=950, chr2: 50..=1950
        assert_eq!(sampler.num_positions(), 10 + 20);

        let sampler = PositionSampler::new(
            sizes(),
            &[],
            params(SamplingMode::Random {
                num_positions: Some(7),
            }),
        )?;
        let mut rng = SmallRng::seed_from_u64(1);
        assert_eq!(sampler.sample_epoch(&mut rng)?.len(), 14);

        assert!(PositionSampler::new(
            sizes(),
            &[],
            params(SamplingMode::Random {
                num_positions: None
            })
        )
        .is_err());
        Ok(())
    }

    #[test]
    fn test_rev_comp_flags() -> Result<()> {
        let summits: Vec<(&str, u64)> = (1..=15).map(|i| ("chr2", i * 100)).collect();
        let sets = vec![peaks(&summits)?];
        let mut p = params(SamplingMode::Peaks);
        p.rev_comp_aug = true;
        let sampler = PositionSampler::new(sizes(), &sets, p)?;
        let mut rng = SmallRng::seed_from_u64(2);
        let flags: Vec<bool> = sampler
            .sample_epoch(&mut rng)?
            .iter()
            .map(|w| w.rev_comp)
            .collect();
        assert!(flags.iter().any(|&f| f));
        assert!(flags.iter().any(|&f| !f));
        Ok(())
    }

    #[test]
    fn test_feasible_centers() {
        let shape = WindowShape::new(100, 50);
        assert_eq!(feasible_centers(shape, 1000), (50, 950));
        let shape = WindowShape::new(101, 50);
        // start = c - 50 >= 0 and c - 50 + 101 <= 1000
        assert_eq!(feasible_centers(shape, 1000), (50, 949));
        assert!(feasible_centers(shape, 80).0 > feasible_centers(shape, 80).1);
    }

    #[test]
    fn test_mode_serde() -> Result<()> {
        let mode: SamplingMode = serde_json::from_str(r#"{"mode": "sequential", "step": 500}"#)?;
        assert_eq!(
            mode,
            SamplingMode::Sequential {
                step: 500,
                num_positions: None
            }
        );
        let mode: SamplingMode = serde_json::from_str(r#"{"mode": "weighted_peaks"}"#)?;
        assert_eq!(mode, SamplingMode::WeightedPeaks);
        Ok(())
    }
}
