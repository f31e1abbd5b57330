pub use super::{
    BatchParams, BatchProcessor, BpnetGenerator, GeneratorConfig, GeneratorConfigBuilder,
    OneHotGenerator, Policy, Result, SamplingMode, SequenceGenerator, SequenceWindow, Task,
};

pub use crate::fasta::ReferenceGenome;
pub use crate::track::{CoverageTrack, SignalTrack, SmoothingParams};
