use ndarray::{Array3, Axis};
use rand::rngs::SmallRng;

use super::BatchProcessor;
use crate::{
    encode::{one_hot_into, reverse_complement_inplace, ALPHABET_SIZE},
    extract::Extractor,
    interval::SequenceWindow,
    Policy, Result,
};

/// One-hot encoded input sequences
#[derive(Debug, Clone)]
pub struct OneHotBatch {
    /// Inputs of shape `(batch, input_seq_len, 4)`
    pub inputs: Array3<f32>,
    /// The windows the inputs were extracted from
    pub windows: Vec<SequenceWindow>,
}
impl OneHotBatch {
    /// Number of examples in the batch
    #[must_use]
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

/// Builds [`OneHotBatch`]es from reference sequence only
#[derive(Clone)]
pub struct OneHotProcessor {
    extractor: Extractor,
    policy: Policy,
    seq_len: usize,
    /// Reusable sequence buffer
    sbuf: Vec<u8>,
    tid: Option<usize>,
}
impl OneHotProcessor {
    #[must_use]
    pub fn new(extractor: Extractor, policy: Policy, seq_len: usize) -> Self {
        Self {
            extractor,
            policy,
            seq_len,
            sbuf: Vec::with_capacity(seq_len),
            tid: None,
        }
    }
}
impl BatchProcessor for OneHotProcessor {
    type Batch = OneHotBatch;

    fn process_batch(&mut self, windows: &[SequenceWindow], rng: &mut SmallRng) -> Result<OneHotBatch> {
        let mut inputs = Array3::zeros((windows.len(), self.seq_len, ALPHABET_SIZE));
        for (window, view) in windows.iter().zip(inputs.axis_iter_mut(Axis(0))) {
            self.extractor.sequence_into(window, &mut self.sbuf)?;
            if window.rev_comp {
                reverse_complement_inplace(&mut self.sbuf);
            }
            one_hot_into(&self.sbuf, view, self.policy, rng)?;
        }
        Ok(OneHotBatch {
            inputs,
            windows: windows.to_vec(),
        })
    }

    fn set_tid(&mut self, tid: usize) {
        self.tid = Some(tid);
    }

    fn get_tid(&self) -> Option<usize> {
        self.tid
    }
}
