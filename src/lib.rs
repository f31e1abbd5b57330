//! # mseqgen
//!
//! Multitask batch generators of one-hot encoded genomic sequence and signal profiles
//! for training sequence-to-function models such as BPNet.
//!
//! Genomic positions are derived from peak files or tiled across chromosomes, jittered
//! and resampled every epoch, extracted from a memory-mapped reference and encoded
//! into fixed-shape [`ndarray`] batches by a pool of worker threads.
//!
//! ## Overview
//!
//! * [`fasta`] - random access to the reference genome through a `.fai` index
//! * [`track`] - signal and control coverage, Gaussian smoothing
//! * [`encode`] - one-hot encoding and reverse complement transforms
//! * [`sampler`] - peak and chromosome positions, jitter and negative sampling
//! * [`generator`] - epoch lifecycle and parallel batch construction
//!
//! ## Example
//!
//! ```no_run
//! use mseqgen::{GeneratorConfig, OneHotGenerator, Result};
//!
//! fn main() -> Result<()> {
//!     let config = GeneratorConfig::from_json("config.json")?;
//!     let mut generator = OneHotGenerator::from_config(&config)?;
//!     let state = generator.state();
//!
//!     for batch in generator.gen() {
//!         let batch = batch?;
//!         println!("{:?}", batch.inputs.dim());
//!         // permit the next epoch once the training step is done
//!         state.set_ready_for_next_epoch();
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod encode;
pub mod error;
pub mod extract;
pub mod fasta;
pub mod generator;
pub mod interval;
mod policy;
pub mod prelude;
pub mod sampler;
pub mod tasks;
pub mod track;
pub mod utils;

pub use config::{BatchParams, GeneratorConfig, GeneratorConfigBuilder, PartialBatch};
pub use error::{Error, Result};
pub use generator::{
    BatchProcessor, BpnetBatch, BpnetGenerator, BpnetProcessor, EpochBatches, GeneratorState,
    OneHotBatch, OneHotGenerator, OneHotProcessor, Phase, SequenceGenerator,
};
pub use interval::{ChromSizes, GenomicInterval, PeakRecord, SequenceWindow, Strand};
pub use policy::{base_column, Policy, RNG_SEED};
pub use sampler::SamplingMode;
pub use tasks::Task;
