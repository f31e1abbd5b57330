use rand::rngs::SmallRng;

use crate::{interval::SequenceWindow, Result};

/// Trait for types that build batches from planned windows in parallel
///
/// Every worker thread receives its own clone of the processor, so scratch buffers
/// can live on the processor and be reused across batches.
pub trait BatchProcessor: Send + Clone + 'static {
    /// The batch type yielded to the training loop
    type Batch: Send + 'static;

    /// Builds a single batch
    ///
    /// # Arguments
    ///
    /// * `windows` - The windows of the batch, in plan order
    /// * `rng` - A generator seeded from the epoch and batch index
    fn process_batch(&mut self, windows: &[SequenceWindow], rng: &mut SmallRng)
        -> Result<Self::Batch>;

    /// Set the thread ID for this processor
    ///
    /// Each thread should call this method with its own unique ID.
    #[allow(unused_variables)]
    fn set_tid(&mut self, tid: usize) {
        // Default implementation does nothing
    }

    /// Get the thread ID for this processor
    fn get_tid(&self) -> Option<usize> {
        None
    }
}
