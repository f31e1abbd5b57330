//! # generator
//!
//! Epoch-based batch generation over a pool of worker threads.
//!
//! A [`SequenceGenerator`] owns a [`PositionSampler`] and a [`BatchProcessor`]. For
//! every epoch it takes the sampled windows (the epoch's plan), partitions them into
//! batches of `batch_size` and lets `num_threads` workers build the batches. Workers
//! pull batch indices from a shared cursor and send finished batches through a
//! bounded channel of `buffer_depth` slots, so batch construction overlaps with
//! consumption without unbounded memory growth.
//!
//! ## Lifecycle
//!
//! ```text
//! Init -> Running -> (Stopping | EarlyStopped) -> EpochBoundary -> Running | Done
//! ```
//!
//! * [`SequenceGenerator::gen`] yields batches across epochs and blocks at each epoch
//!   boundary until [`SequenceGenerator::set_ready_for_next_epoch`] is called.
//! * [`SequenceGenerator::epoch`] yields a single epoch and refuses to start a later
//!   one before the handshake.
//! * [`SequenceGenerator::set_stop`] ends iteration on the next call.
//! * [`SequenceGenerator::set_early_stopping`] lets the current epoch finish.
//!
//! The flags live in a shared [`GeneratorState`], so they can be set from another
//! thread (e.g. a training callback) through [`SequenceGenerator::state`].

mod bpnet;
mod onehot;
mod processor;
mod state;

use std::collections::BTreeMap;
use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver};
use parking_lot::{Condvar, Mutex};
use rand::{rngs::SmallRng, SeedableRng};

pub use bpnet::{BpnetBatch, BpnetProcessor};
pub use onehot::{OneHotBatch, OneHotProcessor};
pub use processor::BatchProcessor;
pub use state::{GeneratorState, Phase};

use crate::{
    config::{BatchParams, GeneratorConfig},
    error::{ConfigError, GeneratorError},
    extract::Extractor,
    fasta::ReferenceGenome,
    interval::{ChromSizes, PeakRecord, SequenceWindow},
    sampler::PositionSampler,
    tasks::is_stranded,
    Result,
};

/// Generator of one-hot encoded sequence batches
pub type OneHotGenerator = SequenceGenerator<OneHotProcessor>;

/// Generator of BPNet inputs and targets
pub type BpnetGenerator = SequenceGenerator<BpnetProcessor>;

/// Interval at which workers held back by the reorder window re-check the flags
const WINDOW_POLL: Duration = Duration::from_millis(10);

/// Derives a seed for a sub-stream of the generator
fn derive_seed(seed: u64, epoch: usize, stream: u64) -> u64 {
    seed ^ (epoch as u64 + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15)
        ^ stream.wrapping_mul(0xC2B2_AE3D_27D4_EB4F)
}

/// Seed of the per-epoch sampling stream
fn epoch_seed(seed: u64, epoch: usize) -> u64 {
    derive_seed(seed, epoch, 0)
}

/// Seed of the per-batch encoding stream
fn batch_seed(seed: u64, epoch: usize, batch: usize) -> u64 {
    derive_seed(seed, epoch, batch as u64 + 1)
}

/// Epoch-based batch generator
pub struct SequenceGenerator<P: BatchProcessor> {
    sampler: PositionSampler,
    processor: P,
    params: BatchParams,
    state: Arc<GeneratorState>,
    /// Index of the next epoch to start
    epoch: usize,
    /// Windows of the next epoch
    plan: Arc<Vec<SequenceWindow>>,
}
impl<P: BatchProcessor> SequenceGenerator<P> {
    /// Creates a new generator and samples the windows of the first epoch
    ///
    /// # Errors
    ///
    /// Fails if the parameters are invalid or if no window can be sampled.
    pub fn new(sampler: PositionSampler, processor: P, params: BatchParams) -> Result<Self> {
        params.validate()?;
        let mut rng = SmallRng::seed_from_u64(epoch_seed(params.seed, 0));
        let plan = Arc::new(sampler.sample_epoch(&mut rng)?);
        Ok(Self {
            sampler,
            processor,
            params,
            state: Arc::new(GeneratorState::new()),
            epoch: 0,
            plan,
        })
    }

    /// Number of batches in one epoch
    #[must_use]
    pub fn len(&self) -> usize {
        self.params.num_batches(self.plan.len())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of windows in one epoch
    #[must_use]
    pub fn num_windows(&self) -> usize {
        self.plan.len()
    }

    #[must_use]
    pub fn params(&self) -> &BatchParams {
        &self.params
    }

    #[must_use]
    pub fn sampler(&self) -> &PositionSampler {
        &self.sampler
    }

    /// Shared control flags of this generator
    #[must_use]
    pub fn state(&self) -> Arc<GeneratorState> {
        self.state.clone()
    }

    /// Index of the next epoch to start
    #[must_use]
    pub fn next_epoch(&self) -> usize {
        self.epoch
    }

    pub fn set_stop(&self) {
        self.state.set_stop();
    }

    pub fn set_early_stopping(&self) {
        self.state.set_early_stopping();
    }

    pub fn set_ready_for_next_epoch(&self) {
        self.state.set_ready_for_next_epoch();
    }

    /// Lazily yields batches across epochs
    ///
    /// Every epoch after the first blocks until the ready handshake. Iteration ends
    /// after a stop, or at the first epoch boundary after early stopping.
    pub fn gen(&mut self) -> Batches<'_, P> {
        Batches {
            generator: self,
            current: None,
        }
    }

    /// Yields the batches of a single epoch without blocking
    ///
    /// # Errors
    ///
    /// * [`GeneratorError::NotReadyForNextEpoch`] if this is not the first epoch and
    ///   the ready handshake has not happened
    /// * [`GeneratorError::Finished`] after a stop or early stop
    pub fn epoch(&mut self) -> Result<EpochBatches<P::Batch>> {
        self.begin_epoch(false)?
            .ok_or_else(|| GeneratorError::Finished.into())
    }

    /// Starts the next epoch, returns `None` if the generator is done
    fn begin_epoch(&mut self, wait: bool) -> Result<Option<EpochBatches<P::Batch>>> {
        if self.state.is_stopped() {
            self.state.set_phase(Phase::Done);
            return Ok(None);
        }
        if self.epoch > 0 {
            if self.state.is_early_stopping() {
                log::info!("Early stopping after {} epochs", self.epoch);
                self.state.set_phase(Phase::Done);
                return Ok(None);
            }
            let ready = if wait {
                self.state.wait_ready()
            } else {
                self.state.take_ready()
            };
            if !ready {
                if wait {
                    self.state.set_phase(Phase::Done);
                    return Ok(None);
                }
                return Err(GeneratorError::NotReadyForNextEpoch(self.epoch).into());
            }
        }

        // sample the plan of the following epoch before handing this one out
        let epoch = self.epoch;
        let mut rng = SmallRng::seed_from_u64(epoch_seed(self.params.seed, epoch + 1));
        let next_plan = Arc::new(self.sampler.sample_epoch(&mut rng)?);
        let plan = std::mem::replace(&mut self.plan, next_plan);

        self.epoch += 1;
        self.state.set_epoch(epoch);
        self.state.set_phase(Phase::Running);
        Ok(Some(self.spawn_epoch(epoch, plan)))
    }

    fn spawn_epoch(&self, epoch: usize, plan: Arc<Vec<SequenceWindow>>) -> EpochBatches<P::Batch> {
        let batch_size = self.params.batch_size;
        let n_batches = self.params.num_batches(plan.len());
        let num_threads = self.params.worker_threads().min(n_batches).max(1);
        let seed = self.params.seed;
        log::info!(
            "Starting epoch {epoch}: {} windows in {n_batches} batches on {num_threads} threads",
            plan.len()
        );

        // shared cursor over batch indices
        let cursor = Arc::new(AtomicUsize::new(0));
        let cancel = Arc::new(AtomicBool::new(false));
        let (tx, rx) = bounded(self.params.buffer_depth);
        let window = Arc::new(ReorderWindow::new(
            self.params.ordered.then_some(self.params.buffer_depth),
        ));

        // Build thread handles
        let mut handles = Vec::with_capacity(num_threads);
        for tid in 0..num_threads {
            let mut processor = self.processor.clone();
            processor.set_tid(tid);
            let plan = plan.clone();
            let cursor = cursor.clone();
            let cancel = cancel.clone();
            let window = window.clone();
            let state = self.state.clone();
            let tx = tx.clone();

            let handle = std::thread::spawn(move || loop {
                // flags are checked before every batch
                if cancel.load(Ordering::Acquire) || state.is_stopped() {
                    break;
                }
                let idx = cursor.fetch_add(1, Ordering::Relaxed);
                if idx >= n_batches || !window.admit(idx, &cancel, &state) {
                    break;
                }
                let lbound = idx * batch_size;
                let rbound = (lbound + batch_size).min(plan.len());

                let mut rng = SmallRng::seed_from_u64(batch_seed(seed, epoch, idx));
                let result = processor.process_batch(&plan[lbound..rbound], &mut rng);
                log::debug!(
                    "Worker {} built batch {idx} of epoch {epoch}",
                    processor.get_tid().unwrap_or(tid)
                );

                // the receiver is gone once the epoch is dropped
                if tx.send((idx, result)).is_err() {
                    break;
                }
            });
            handles.push(handle);
        }

        EpochBatches {
            rx: Some(rx),
            handles,
            cancel,
            window,
            state: self.state.clone(),
            ordered: self.params.ordered,
            pending: BTreeMap::new(),
            next_index: 0,
            n_batches,
            epoch,
            finished: false,
        }
    }
}

impl SequenceGenerator<OneHotProcessor> {
    /// Builds a one-hot generator from a configuration
    ///
    /// Loads the reference, the chromosome size table and the peaks of every task.
    pub fn from_config(config: &GeneratorConfig) -> Result<Self> {
        config.validate()?;
        let inputs = GeneratorInputs::load(config)?;
        let sampler = PositionSampler::new(
            inputs.sizes,
            &inputs.peak_sets,
            config.batch.sampler_params(),
        )?;
        let processor = OneHotProcessor::new(
            Extractor::new(inputs.genome),
            config.batch.policy,
            config.batch.input_seq_len,
        );
        Self::new(sampler, processor, config.batch.clone())
    }
}

impl SequenceGenerator<BpnetProcessor> {
    /// Builds a BPNet generator from a configuration
    ///
    /// Every task needs a signal track, and a control track if `has_control` is set.
    pub fn from_config(config: &GeneratorConfig) -> Result<Self> {
        config.validate_profiles()?;
        let inputs = GeneratorInputs::load(config)?;
        let extractor = Extractor::from_config(inputs.genome, config, &inputs.sizes)?;
        let sampler = PositionSampler::new(
            inputs.sizes,
            &inputs.peak_sets,
            config.batch.sampler_params(),
        )?;
        let processor = BpnetProcessor::new(
            extractor,
            config.batch.policy,
            config.batch.input_seq_len,
            config.batch.output_len,
            is_stranded(&config.tasks),
        );
        Self::new(sampler, processor, config.batch.clone())
    }
}

/// Files shared by every generator flavor
struct GeneratorInputs {
    genome: Arc<ReferenceGenome>,
    sizes: ChromSizes,
    peak_sets: Vec<Vec<PeakRecord>>,
}
impl GeneratorInputs {
    fn load(config: &GeneratorConfig) -> Result<Self> {
        let genome = Arc::new(ReferenceGenome::new(&config.reference_genome)?);

        let all_sizes = match &config.chrom_sizes {
            Some(path) => ChromSizes::from_path(path)?,
            None => genome.chrom_sizes(),
        };
        let sizes = if config.chroms.is_empty() {
            // keep the chromosomes the reference can serve
            let mut sizes = ChromSizes::new();
            for (chrom, len) in all_sizes.iter() {
                if genome.entry(chrom).is_ok() {
                    sizes.insert(chrom.clone(), len);
                } else {
                    log::debug!("Skipping {chrom}: not present in the reference");
                }
            }
            sizes
        } else {
            let sizes = all_sizes.select(&config.chroms)?;
            for (chrom, _) in sizes.iter() {
                if genome.entry(chrom).is_err() {
                    return Err(ConfigError::UnknownChromosome(chrom.to_string()).into());
                }
            }
            sizes
        };
        // every selected length must be covered by the reference
        for (chrom, len) in sizes.iter() {
            let reference = genome.chrom_len(chrom)?;
            if len > reference {
                return Err(ConfigError::ChromSizeMismatch {
                    chrom: chrom.to_string(),
                    table: len,
                    reference,
                }
                .into());
            }
        }

        let peak_sets = if config.batch.sampling_mode.uses_peaks() {
            config
                .tasks
                .iter()
                .map(crate::tasks::Task::read_peaks)
                .collect::<Result<Vec<_>>>()?
        } else {
            Vec::new()
        };
        log::info!(
            "Sampling from {} chromosomes, {} peaks",
            sizes.len(),
            peak_sets.iter().map(Vec::len).sum::<usize>()
        );
        Ok(Self {
            genome,
            sizes,
            peak_sets,
        })
    }
}

/// Keeps ordered workers within `depth` batches of the consumer
///
/// Batches finished ahead of their turn wait in the reorder buffer. Workers only
/// claim indices below `yielded + depth`, so at most `depth` batches are in flight.
struct ReorderWindow {
    /// Number of batches handed to the consumer
    yielded: Mutex<usize>,
    advanced: Condvar,
    /// `None` in unordered mode, where the channel alone bounds memory
    depth: Option<usize>,
}
impl ReorderWindow {
    fn new(depth: Option<usize>) -> Self {
        Self {
            yielded: Mutex::new(0),
            advanced: Condvar::new(),
            depth,
        }
    }

    /// Blocks until batch `idx` is within the window, returns false if cancelled
    fn admit(&self, idx: usize, cancel: &AtomicBool, state: &GeneratorState) -> bool {
        let Some(depth) = self.depth else {
            return true;
        };
        let mut yielded = self.yielded.lock();
        while idx >= *yielded + depth {
            if cancel.load(Ordering::Acquire) || state.is_stopped() {
                return false;
            }
            self.advanced.wait_for(&mut yielded, WINDOW_POLL);
        }
        true
    }

    fn advance(&self, yielded: usize) {
        *self.yielded.lock() = yielded;
        self.advanced.notify_all();
    }

    fn release(&self) {
        self.advanced.notify_all();
    }
}

/// Batches of a single epoch
///
/// Dropping the value cancels the remaining batches and joins the workers.
pub struct EpochBatches<B> {
    rx: Option<Receiver<(usize, Result<B>)>>,
    handles: Vec<JoinHandle<()>>,
    cancel: Arc<AtomicBool>,
    window: Arc<ReorderWindow>,
    state: Arc<GeneratorState>,
    ordered: bool,
    /// Batches received ahead of their turn
    pending: BTreeMap<usize, Result<B>>,
    next_index: usize,
    n_batches: usize,
    epoch: usize,
    finished: bool,
}
impl<B> EpochBatches<B> {
    /// Number of batches of this epoch
    #[must_use]
    pub fn len(&self) -> usize {
        self.n_batches
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.n_batches == 0
    }

    #[must_use]
    pub fn epoch(&self) -> usize {
        self.epoch
    }

    fn recv(&self) -> Option<(usize, Result<B>)> {
        self.rx.as_ref().and_then(|rx| rx.recv().ok())
    }

    /// Joins the workers once the channel is closed, reporting the first panic
    fn join_workers(&mut self) -> Option<crate::Error> {
        let mut panic = None;
        for (tid, handle) in self.handles.drain(..).enumerate() {
            if handle.join().is_err() && panic.is_none() {
                panic = Some(GeneratorError::WorkerPanic(tid).into());
            }
        }
        panic
    }

    fn finish(&mut self) -> Option<Result<B>> {
        self.finished = true;
        self.cancel.store(true, Ordering::Release);
        self.rx = None;
        self.window.release();
        self.join_workers().map(Err)
    }
}
impl<B> Iterator for EpochBatches<B> {
    type Item = Result<B>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        if self.state.is_stopped() {
            log::debug!("Stop requested, ending epoch {}", self.epoch);
            return self.finish();
        }

        if !self.ordered {
            return match self.recv() {
                Some((_, batch)) => {
                    self.next_index += 1;
                    Some(batch)
                }
                None => self.finish(),
            };
        }

        loop {
            if let Some(batch) = self.pending.remove(&self.next_index) {
                self.next_index += 1;
                self.window.advance(self.next_index);
                return Some(batch);
            }
            if self.next_index >= self.n_batches {
                return self.finish();
            }
            match self.recv() {
                Some((idx, batch)) => {
                    self.pending.insert(idx, batch);
                }
                None => return self.finish(),
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.n_batches.saturating_sub(self.next_index)))
    }
}
impl<B> Drop for EpochBatches<B> {
    fn drop(&mut self) {
        if !self.finished {
            self.finish();
        }
    }
}

/// Batches across epochs, see [`SequenceGenerator::gen`]
pub struct Batches<'a, P: BatchProcessor> {
    generator: &'a mut SequenceGenerator<P>,
    current: Option<EpochBatches<P::Batch>>,
}
impl<P: BatchProcessor> Iterator for Batches<'_, P> {
    type Item = Result<P::Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.generator.state.is_stopped() {
                self.current = None;
                self.generator.state.set_phase(Phase::Done);
                return None;
            }
            if let Some(batches) = self.current.as_mut() {
                if let Some(batch) = batches.next() {
                    return Some(batch);
                }
                self.current = None;
                self.generator.state.end_epoch();
                continue;
            }
            match self.generator.begin_epoch(true) {
                Ok(Some(batches)) => self.current = Some(batches),
                Ok(None) => return None,
                Err(e) => return Some(Err(e)),
            }
        }
    }
}
