use std::path::PathBuf;

/// Custom Result type for mseqgen operations, wrapping the custom [`Error`] type
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for the mseqgen library, encompassing all possible error cases
/// that can occur while sampling, extracting, encoding and batching genomic windows.
#[derive(thiserror::Error, Debug)]
#[error(transparent)]
pub enum Error {
    /// Invalid parameters or parameter combinations
    ConfigError(#[from] ConfigError),
    /// Requested coordinates fall outside of a chromosome
    RangeError(#[from] RangeError),
    /// Errors related to signal and control tracks
    TrackError(#[from] TrackError),
    /// Errors raised while deriving positions
    SampleError(#[from] SampleError),
    /// Errors reading or indexing the reference genome
    FastaError(#[from] FastaError),
    /// Malformed lines in text inputs (BED, bedGraph, chromosome sizes, .fai)
    ParseError(#[from] ParseError),
    /// Errors raised while encoding sequences or profiles
    EncodeError(#[from] EncodeError),
    /// Errors raised by the batch generator lifecycle
    GeneratorError(#[from] GeneratorError),
    /// Standard I/O errors from the Rust standard library
    IoError(#[from] std::io::Error),
    /// Errors deserializing JSON configuration files
    JsonError(#[from] serde_json::Error),
    /// Errors opening (possibly compressed) text inputs
    NifflerError(#[from] niffler::Error),
    /// Generic errors that can occur in any part of the system
    AnyhowError(#[from] anyhow::Error),
}

/// Errors raised when validating the generator configuration
///
/// All of these abort generator construction, they are never raised mid-epoch.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Batch size must be greater than zero")]
    ZeroBatchSize,

    /// # Arguments
    /// * `&'static str` - The name of the length parameter
    #[error("Parameter `{0}` must be greater than zero")]
    ZeroLength(&'static str),

    #[error("Output length ({output}) cannot exceed the input sequence length ({input})")]
    OutputLongerThanInput { input: usize, output: usize },

    /// # Arguments
    /// * `f64` - The rejected rate
    #[error("Negative sampling rate must be a finite value >= 0, found {0}")]
    InvalidSamplingRate(f64),

    /// # Arguments
    /// * `f64` - The rejected sigma
    #[error("Smoothing sigma must be a finite value > 0, found {0}")]
    InvalidSigma(f64),

    #[error("Smoothing window must be greater than zero")]
    ZeroSmoothingWindow,

    #[error("At least one task is required")]
    NoTasks,

    /// # Arguments
    /// * `String` - The offending task id
    #[error("Stranded tasks must come in consecutive (+, -) pairs, task `{0}` breaks the pairing")]
    UnpairedStrandedTasks(String),

    #[error("Incompatible parameter pairing: random sampling requires `num_positions`")]
    UnboundedRandomSampling,

    #[error("Sampling step must be greater than zero")]
    ZeroStep,

    #[error("Buffer depth must be greater than zero")]
    ZeroBufferDepth,

    #[error("Expected one control track per signal track ({signals} signals, {controls} controls)")]
    TrackCountMismatch { signals: usize, controls: usize },

    #[error("Peak sampling requested but no task provides a peaks file")]
    MissingPeaks,

    /// # Arguments
    /// * `String` - The chromosome name
    #[error("Chromosome `{0}` is not present in the chromosome size table")]
    UnknownChromosome(String),

    /// # Fields
    /// * `chrom` - The chromosome name
    /// * `table` - Length given by the chromosome size table
    /// * `reference` - Length of the reference record
    #[error("Chromosome `{chrom}` is {table} bp in the size table but {reference} bp in the reference")]
    ChromSizeMismatch {
        chrom: String,
        table: u64,
        reference: u64,
    },

    /// The jittered window does not fit into any of the selected chromosomes
    #[error("Window of {window} bp with max_jitter {max_jitter} exceeds the longest chromosome ({longest} bp)")]
    JitterExceedsFlank {
        window: usize,
        max_jitter: usize,
        longest: u64,
    },
}

/// Errors for coordinates that fall outside of the known genome
#[derive(thiserror::Error, Debug)]
pub enum RangeError {
    /// # Fields
    /// * `chrom` - The chromosome name
    /// * `start` - Requested start (may be negative after jitter)
    /// * `end` - Requested end
    /// * `len` - Length of the chromosome
    #[error("Requested interval {chrom}:{start}-{end} is out of chromosome range (0-{len})")]
    CoordinateOutOfRange {
        chrom: String,
        start: i64,
        end: i64,
        len: u64,
    },

    /// # Arguments
    /// * `String` - The chromosome name
    #[error("Unknown chromosome: {0}")]
    UnknownChromosome(String),

    /// # Arguments
    /// * `u64` - start
    /// * `u64` - end
    #[error("Interval start ({0}) must be lower than its end ({1})")]
    EmptyInterval(u64, u64),
}

/// Errors related to signal and control tracks
#[derive(thiserror::Error, Debug)]
pub enum TrackError {
    /// # Fields
    /// * `task` - The task id requiring the track
    /// * `kind` - Either `signal` or `control`
    /// * `path` - The path that could not be found, if one was configured
    #[error("Missing {kind} track for task `{task}`{}", path.as_ref().map(|p| format!(": {}", p.display())).unwrap_or_default())]
    MissingTrack {
        task: String,
        kind: &'static str,
        path: Option<PathBuf>,
    },

    /// # Fields
    /// * `source_name` - The track file
    /// * `chrom` - Chromosome of the overlapping records
    /// * `pos` - Start of the later record
    #[error("{source_name}: overlapping records on {chrom} at {pos}")]
    OverlappingRecords {
        source_name: String,
        chrom: String,
        pos: u64,
    },
}

/// Errors raised while deriving genomic positions
#[derive(thiserror::Error, Debug)]
pub enum SampleError {
    #[error("No valid positions remain after filtering and deduplication")]
    EmptyPeakSet,
}

/// Errors reading or indexing a FASTA reference
#[derive(thiserror::Error, Debug)]
pub enum FastaError {
    #[error("File is not regular")]
    IncompatibleFile,

    #[error("No sequence records found in reference")]
    NoRecords,

    /// # Arguments
    /// * `String` - The indexer's description of the malformed record
    #[error("Reference cannot be indexed: {0}")]
    Indexing(String),

    /// # Arguments
    /// * `String` - The record name
    #[error("Index entry for `{0}` points beyond the end of the reference")]
    IndexOutOfBounds(String),
}

/// Malformed line in a text input
#[derive(thiserror::Error, Debug)]
#[error("{source_name}:{line}: {reason}")]
pub struct ParseError {
    pub source_name: String,
    pub line: usize,
    pub reason: String,
}
impl ParseError {
    pub fn new(source_name: impl Into<String>, line: usize, reason: impl Into<String>) -> Self {
        Self {
            source_name: source_name.into(),
            line,
            reason: reason.into(),
        }
    }
}

/// Errors raised while encoding sequences or transforming profiles
#[derive(thiserror::Error, Debug)]
pub enum EncodeError {
    /// # Fields
    /// * `symbol` - The unrecognized symbol
    /// * `pos` - Its position in the sequence
    #[error("Invalid nucleotide '{symbol}' at position {pos}")]
    InvalidNucleotide { symbol: char, pos: usize },

    /// # Arguments
    /// * `usize` - The channel count found
    #[error("Stranded profiles require an even number of channels, found {0}")]
    OddStrandedChannels(usize),

    #[error("Cannot encode an empty set of sequences")]
    EmptyInput,
}

/// Errors raised by the generator lifecycle
#[derive(thiserror::Error, Debug)]
pub enum GeneratorError {
    /// # Arguments
    /// * `usize` - The epoch that was requested
    #[error("Epoch {0} cannot start before `set_ready_for_next_epoch` is called")]
    NotReadyForNextEpoch(usize),

    #[error("Generator is done, no further epochs can be started")]
    Finished,

    /// # Arguments
    /// * `usize` - The worker thread id
    #[error("Worker thread {0} panicked")]
    WorkerPanic(usize),
}
