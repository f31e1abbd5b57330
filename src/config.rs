//! Generator configuration
//!
//! A [`GeneratorConfig`] is either deserialized from JSON or assembled in code with
//! [`GeneratorConfigBuilder`]. Every field of [`BatchParams`] has a default, so a
//! minimal configuration only names the reference genome and the tasks:
//!
//! ```json
//! {
//!     "reference_genome": "hg38.fa",
//!     "chroms": ["chr1", "chr2"],
//!     "tasks": [{"task_id": 0, "signal": "task0.bedGraph", "peaks": "task0.narrowPeak"}],
//!     "batch": {"batch_size": 32, "max_jitter": 64}
//! }
//! ```

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{
    error::{ConfigError, TrackError},
    interval::WindowShape,
    policy::RNG_SEED,
    sampler::{SamplerParams, SamplingMode},
    tasks::{validate_strands, Task},
    track::SmoothingParams,
    utils::round_to_multiple,
    Policy, Result,
};

/// Handling of the last, incomplete batch of an epoch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartialBatch {
    /// Yield the smaller batch
    #[default]
    Keep,
    /// Skip the remainder
    Drop,
}

/// Batching, sampling and augmentation parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchParams {
    pub batch_size: usize,
    pub input_seq_len: usize,
    pub output_len: usize,
    pub max_jitter: usize,
    pub negative_sampling_rate: f64,
    pub rev_comp_aug: bool,
    pub shuffle: bool,
    /// Worker threads, `0` uses every available CPU
    pub num_threads: usize,
    pub sampling_mode: SamplingMode,
    pub has_control: bool,
    /// One extra control channel block per smoothing setting
    pub control_smoothing: Vec<SmoothingParams>,
    pub drop_duplicates: bool,
    pub partial_batch: PartialBatch,
    /// Yield batches in plan order rather than in completion order
    pub ordered: bool,
    /// Capacity of the channel between workers and the consumer
    pub buffer_depth: usize,
    pub seed: u64,
    pub policy: Policy,
    pub replace_dropped: bool,
}
impl Default for BatchParams {
    fn default() -> Self {
        Self {
            batch_size: 64,
            input_seq_len: 2114,
            output_len: 1000,
            max_jitter: 128,
            negative_sampling_rate: 0.0,
            rev_comp_aug: true,
            shuffle: true,
            num_threads: 0,
            sampling_mode: SamplingMode::default(),
            has_control: false,
            control_smoothing: Vec::new(),
            drop_duplicates: false,
            partial_batch: PartialBatch::default(),
            ordered: true,
            buffer_depth: 4,
            seed: RNG_SEED,
            policy: Policy::default(),
            replace_dropped: false,
        }
    }
}
impl BatchParams {
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize.into());
        }
        if self.input_seq_len == 0 {
            return Err(ConfigError::ZeroLength("input_seq_len").into());
        }
        if self.output_len == 0 {
            return Err(ConfigError::ZeroLength("output_len").into());
        }
        if self.output_len > self.input_seq_len {
            return Err(ConfigError::OutputLongerThanInput {
                input: self.input_seq_len,
                output: self.output_len,
            }
            .into());
        }
        if !self.negative_sampling_rate.is_finite() || self.negative_sampling_rate < 0.0 {
            return Err(ConfigError::InvalidSamplingRate(self.negative_sampling_rate).into());
        }
        if self.buffer_depth == 0 {
            return Err(ConfigError::ZeroBufferDepth.into());
        }
        self.sampling_mode.validate()?;
        for params in &self.control_smoothing {
            params.validate()?;
        }
        Ok(())
    }

    /// Shape of the input and output windows
    #[must_use]
    pub fn shape(&self) -> WindowShape {
        WindowShape::new(self.input_seq_len as u64, self.output_len as u64)
    }

    /// Parameters handed to the position sampler
    #[must_use]
    pub fn sampler_params(&self) -> SamplerParams {
        SamplerParams {
            shape: self.shape(),
            max_jitter: self.max_jitter as u64,
            negative_sampling_rate: self.negative_sampling_rate,
            rev_comp_aug: self.rev_comp_aug,
            shuffle: self.shuffle,
            drop_duplicates: self.drop_duplicates,
            replace_dropped: self.replace_dropped,
            mode: self.sampling_mode,
        }
    }

    /// Number of batches covering `n_windows`
    #[must_use]
    pub fn num_batches(&self, n_windows: usize) -> usize {
        let smallest = self.partial_batch == PartialBatch::Keep;
        (round_to_multiple(n_windows as u64, self.batch_size as u64, smallest)
            / self.batch_size as u64) as usize
    }

    /// Resolved number of worker threads
    #[must_use]
    pub fn worker_threads(&self) -> usize {
        if self.num_threads == 0 {
            num_cpus::get()
        } else {
            self.num_threads.min(num_cpus::get())
        }
    }
}

/// Full generator configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// Reference FASTA (an adjacent `.fai` index is used when present)
    pub reference_genome: PathBuf,
    /// Two column chromosome size table, derived from the FASTA index if unset
    #[serde(default)]
    pub chrom_sizes: Option<PathBuf>,
    /// Chromosomes to sample from, every chromosome if empty
    #[serde(default)]
    pub chroms: Vec<String>,
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub batch: BatchParams,
}
impl GeneratorConfig {
    /// Reads a JSON configuration file
    ///
    /// Relative paths inside the file are resolved against the directory of the file.
    pub fn from_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = File::open(&path).map(BufReader::new)?;
        let mut config: Self = serde_json::from_reader(reader)?;
        if let Some(base) = path.as_ref().parent() {
            config.resolve_paths(base);
        }
        log::debug!("Read configuration from {}", path.as_ref().display());
        Ok(config)
    }

    fn resolve_paths(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        resolve(&mut self.reference_genome);
        if let Some(p) = self.chrom_sizes.as_mut() {
            resolve(p);
        }
        for task in &mut self.tasks {
            for p in [&mut task.signal, &mut task.control, &mut task.peaks]
                .into_iter()
                .flatten()
            {
                resolve(p);
            }
        }
    }

    /// Validates parameters and parameter combinations
    ///
    /// File existence is checked when the generator is built.
    pub fn validate(&self) -> Result<()> {
        self.batch.validate()?;
        validate_strands(&self.tasks)?;
        if self.batch.sampling_mode.uses_peaks() && self.tasks.iter().all(|t| t.peaks.is_none())
        {
            return Err(ConfigError::MissingPeaks.into());
        }
        Ok(())
    }

    /// Validation for generators that emit per-task profiles
    pub fn validate_profiles(&self) -> Result<()> {
        self.validate()?;
        if self.tasks.is_empty() {
            return Err(ConfigError::NoTasks.into());
        }
        for task in &self.tasks {
            if task.signal.is_none() {
                return Err(TrackError::MissingTrack {
                    task: task.task_id.clone(),
                    kind: "signal",
                    path: None,
                }
                .into());
            }
            if self.batch.has_control && task.control.is_none() {
                return Err(TrackError::MissingTrack {
                    task: task.task_id.clone(),
                    kind: "control",
                    path: None,
                }
                .into());
            }
        }
        Ok(())
    }
}

/// Builder for [`GeneratorConfig`]
///
/// # Examples
///
/// ```
/// # use mseqgen::{GeneratorConfigBuilder, Task, Result};
/// # fn main() -> Result<()> {
/// let config = GeneratorConfigBuilder::new("genome.fa")
///     .task(Task::new("0").with_peaks("peaks.bed"))
///     .chroms(["chr1", "chr2"])
///     .batch_size(32)
///     .input_seq_len(1000)
///     .output_len(500)
///     .build()?;
/// assert_eq!(config.batch.batch_size, 32);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct GeneratorConfigBuilder {
    config: GeneratorConfig,
}
impl GeneratorConfigBuilder {
    pub fn new(reference_genome: impl Into<PathBuf>) -> Self {
        Self {
            config: GeneratorConfig {
                reference_genome: reference_genome.into(),
                chrom_sizes: None,
                chroms: Vec::new(),
                tasks: Vec::new(),
                batch: BatchParams::default(),
            },
        }
    }

    #[must_use]
    pub fn chrom_sizes(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.chrom_sizes = Some(path.into());
        self
    }

    #[must_use]
    pub fn chroms<I, S>(mut self, chroms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.chroms = chroms.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn task(mut self, task: Task) -> Self {
        self.config.tasks.push(task);
        self
    }

    #[must_use]
    pub fn tasks(mut self, tasks: impl IntoIterator<Item = Task>) -> Self {
        self.config.tasks.extend(tasks);
        self
    }

    #[must_use]
    pub fn batch_params(mut self, batch: BatchParams) -> Self {
        self.config.batch = batch;
        self
    }

    #[must_use]
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.config.batch.batch_size = batch_size;
        self
    }

    #[must_use]
    pub fn input_seq_len(mut self, len: usize) -> Self {
        self.config.batch.input_seq_len = len;
        self
    }

    #[must_use]
    pub fn output_len(mut self, len: usize) -> Self {
        self.config.batch.output_len = len;
        self
    }

    #[must_use]
    pub fn max_jitter(mut self, max_jitter: usize) -> Self {
        self.config.batch.max_jitter = max_jitter;
        self
    }

    #[must_use]
    pub fn negative_sampling_rate(mut self, rate: f64) -> Self {
        self.config.batch.negative_sampling_rate = rate;
        self
    }

    #[must_use]
    pub fn rev_comp_aug(mut self, rev_comp_aug: bool) -> Self {
        self.config.batch.rev_comp_aug = rev_comp_aug;
        self
    }

    #[must_use]
    pub fn shuffle(mut self, shuffle: bool) -> Self {
        self.config.batch.shuffle = shuffle;
        self
    }

    #[must_use]
    pub fn num_threads(mut self, num_threads: usize) -> Self {
        self.config.batch.num_threads = num_threads;
        self
    }

    #[must_use]
    pub fn sampling_mode(mut self, mode: SamplingMode) -> Self {
        self.config.batch.sampling_mode = mode;
        self
    }

    #[must_use]
    pub fn has_control(mut self, has_control: bool) -> Self {
        self.config.batch.has_control = has_control;
        self
    }

    #[must_use]
    pub fn control_smoothing(mut self, params: impl IntoIterator<Item = SmoothingParams>) -> Self {
        self.config.batch.control_smoothing = params.into_iter().collect();
        self
    }

    #[must_use]
    pub fn drop_duplicates(mut self, drop_duplicates: bool) -> Self {
        self.config.batch.drop_duplicates = drop_duplicates;
        self
    }

    #[must_use]
    pub fn partial_batch(mut self, partial_batch: PartialBatch) -> Self {
        self.config.batch.partial_batch = partial_batch;
        self
    }

    #[must_use]
    pub fn ordered(mut self, ordered: bool) -> Self {
        self.config.batch.ordered = ordered;
        self
    }

    #[must_use]
    pub fn buffer_depth(mut self, buffer_depth: usize) -> Self {
        self.config.batch.buffer_depth = buffer_depth;
        self
    }

    #[must_use]
    pub fn seed(mut self, seed: u64) -> Self {
        self.config.batch.seed = seed;
        self
    }

    #[must_use]
    pub fn policy(mut self, policy: Policy) -> Self {
        self.config.batch.policy = policy;
        self
    }

    #[must_use]
    pub fn replace_dropped(mut self, replace_dropped: bool) -> Self {
        self.config.batch.replace_dropped = replace_dropped;
        self
    }

    /// Validates and returns the configuration
    pub fn build(self) -> Result<GeneratorConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod testing {
    use super::*;
    use anyhow::Result;
    use crate::interval::Strand;

    #[test]
    fn test_defaults() {
        let params = BatchParams::default();
        assert_eq!(params.batch_size, 64);
        assert_eq!(params.input_seq_len, 2114);
        assert_eq!(params.output_len, 1000);
        assert_eq!(params.max_jitter, 128);
        assert!(params.rev_comp_aug && params.shuffle && params.ordered);
        assert_eq!(params.sampling_mode, SamplingMode::Peaks);
        assert_eq!(params.partial_batch, PartialBatch::Keep);
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_num_batches() {
        let mut params = BatchParams {
            batch_size: 4,
            ..Default::default()
        };
        assert_eq!(params.num_batches(10), 3);
        assert_eq!(params.num_batches(8), 2);
        params.partial_batch = PartialBatch::Drop;
        assert_eq!(params.num_batches(10), 2);
        assert_eq!(params.num_batches(3), 0);
    }

    #[test]
    fn test_invalid_params() {
        let invalid = [
            BatchParams {
                batch_size: 0,
                ..Default::default()
            },
            BatchParams {
                output_len: 3000,
                ..Default::default()
            },
            BatchParams {
                negative_sampling_rate: -0.5,
                ..Default::default()
            },
            BatchParams {
                negative_sampling_rate: f64::NAN,
                ..Default::default()
            },
            BatchParams {
                buffer_depth: 0,
                ..Default::default()
            },
            BatchParams {
                sampling_mode: SamplingMode::Random {
                    num_positions: None,
                },
                ..Default::default()
            },
            BatchParams {
                control_smoothing: vec![SmoothingParams {
                    sigma: -1.0,
                    window: 10,
                }],
                ..Default::default()
            },
        ];
        for params in invalid {
            assert!(params.validate().is_err(), "{params:?}");
        }
    }

    #[test]
    fn test_from_json() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{
                "reference_genome": "genome.fa",
                "chroms": ["chr1"],
                "tasks": [{"task_id": 1, "signal": "/abs/signal.bedGraph", "peaks": "peaks.bed"}],
                "batch": {
                    "batch_size": 8,
                    "sampling_mode": {"mode": "sequential", "step": 100},
                    "control_smoothing": [{"sigma": 7.5, "window": 80}]
                }
            }"#,
        )?;
        let config = GeneratorConfig::from_json(&path)?;
        assert_eq!(config.reference_genome, dir.path().join("genome.fa"));
        assert_eq!(
            config.tasks[0].signal.as_deref(),
            Some(Path::new("/abs/signal.bedGraph"))
        );
        assert_eq!(config.tasks[0].peaks, Some(dir.path().join("peaks.bed")));
        assert_eq!(config.batch.batch_size, 8);
        assert_eq!(config.batch.input_seq_len, 2114);
        assert_eq!(config.batch.control_smoothing.len(), 1);
        config.validate()?;
        Ok(())
    }

    #[test]
    fn test_builder_validation() {
        // peak sampling without peaks
        assert!(GeneratorConfigBuilder::new("genome.fa")
            .task(Task::new("0"))
            .build()
            .is_err());

        assert!(GeneratorConfigBuilder::new("genome.fa")
            .task(Task::new("0").with_peaks("p.bed").with_strand(Strand::Plus))
            .build()
            .is_err());

        let config = GeneratorConfigBuilder::new("genome.fa")
            .sampling_mode(SamplingMode::Sequential {
                step: 10,
                num_positions: None,
            })
            .build();
        assert!(config.is_ok());
        assert!(config.is_ok_and(|c| c.validate_profiles().is_err()));

        // controls requested but not configured
        let config = GeneratorConfigBuilder::new("genome.fa")
            .task(Task::new("0").with_signal("s.bedGraph").with_peaks("p.bed"))
            .has_control(true)
            .build();
        assert!(config.is_ok_and(|c| c.validate_profiles().is_err()));
    }
}
