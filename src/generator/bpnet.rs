use ndarray::{Array2, Array3, Axis};
use rand::rngs::SmallRng;

use super::BatchProcessor;
use crate::{
    encode::{
        one_hot_into, reverse_complement_inplace, reverse_complement_profile_inplace,
        swap_strand_pairs, ALPHABET_SIZE,
    },
    extract::Extractor,
    interval::SequenceWindow,
    Policy, Result,
};

/// Inputs and targets of a BPNet training step
///
/// Log-counts are `ln(1 + total)` over the output window.
#[derive(Debug, Clone)]
pub struct BpnetBatch {
    /// One-hot sequence of shape `(batch, input_seq_len, 4)`
    pub sequence: Array3<f32>,
    /// Control profile of shape `(batch, output_len, control_channels)`, if controls
    /// are configured
    pub control_profile: Option<Array3<f32>>,
    /// Control log-counts of shape `(batch, n_tasks)`, if controls are configured
    pub control_logcounts: Option<Array2<f32>>,
    /// Target profile of shape `(batch, output_len, n_tasks)`
    pub profile: Array3<f32>,
    /// Target log-counts of shape `(batch, n_tasks)`
    pub logcounts: Array2<f32>,
    pub windows: Vec<SequenceWindow>,
}
impl BpnetBatch {
    #[must_use]
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

/// Builds [`BpnetBatch`]es from the reference and the task tracks
#[derive(Clone)]
pub struct BpnetProcessor {
    extractor: Extractor,
    policy: Policy,
    input_len: usize,
    output_len: usize,
    stranded: bool,
    sbuf: Vec<u8>,
    tbuf: Vec<f32>,
    tid: Option<usize>,
}
impl BpnetProcessor {
    /// Creates a new processor
    ///
    /// # Arguments
    ///
    /// * `extractor` - Extractor holding one signal track per task
    /// * `policy` - Handling of non-ACGT symbols
    /// * `input_len` - Length of the sequence window
    /// * `output_len` - Length of the profile window
    /// * `stranded` - Whether task channels come in `(+, -)` pairs
    #[must_use]
    pub fn new(
        extractor: Extractor,
        policy: Policy,
        input_len: usize,
        output_len: usize,
        stranded: bool,
    ) -> Self {
        Self {
            extractor,
            policy,
            input_len,
            output_len,
            stranded,
            sbuf: Vec::with_capacity(input_len),
            tbuf: Vec::with_capacity(output_len),
            tid: None,
        }
    }
}
impl BatchProcessor for BpnetProcessor {
    type Batch = BpnetBatch;

    fn process_batch(&mut self, windows: &[SequenceWindow], rng: &mut SmallRng) -> Result<BpnetBatch> {
        let n = windows.len();
        let n_tasks = self.extractor.n_tasks();
        let has_control = self.extractor.has_control();

        let mut sequence = Array3::zeros((n, self.input_len, ALPHABET_SIZE));
        let mut profile = Array3::zeros((n, self.output_len, n_tasks));
        let mut counts = Array2::zeros((n, n_tasks));
        let (mut control_profile, mut control_counts) = if has_control {
            (
                Array3::zeros((n, self.output_len, self.extractor.control_channels())),
                Array2::zeros((n, n_tasks)),
            )
        } else {
            (Array3::zeros((n, self.output_len, 0)), Array2::zeros((n, 0)))
        };

        for (i, window) in windows.iter().enumerate() {
            // sequence
            self.extractor.sequence_into(window, &mut self.sbuf)?;
            if window.rev_comp {
                reverse_complement_inplace(&mut self.sbuf);
            }
            one_hot_into(
                &self.sbuf,
                sequence.index_axis_mut(Axis(0), i),
                self.policy,
                rng,
            )?;

            // targets
            self.extractor.signal_into(
                window,
                profile.index_axis_mut(Axis(0), i),
                counts.row_mut(i),
                &mut self.tbuf,
            )?;
            if window.rev_comp {
                reverse_complement_profile_inplace(profile.index_axis_mut(Axis(0), i), self.stranded)?;
                if self.stranded {
                    swap_strand_pairs(counts.row_mut(i))?;
                }
            }

            // controls
            if has_control {
                self.extractor.control_into(
                    window,
                    control_profile.index_axis_mut(Axis(0), i),
                    control_counts.row_mut(i),
                    &mut self.tbuf,
                )?;
                if window.rev_comp {
                    reverse_complement_profile_inplace(
                        control_profile.index_axis_mut(Axis(0), i),
                        self.stranded,
                    )?;
                    if self.stranded {
                        swap_strand_pairs(control_counts.row_mut(i))?;
                    }
                }
            }
        }

        counts.mapv_inplace(f32::ln_1p);
        control_counts.mapv_inplace(f32::ln_1p);
        Ok(BpnetBatch {
            sequence,
            control_profile: has_control.then_some(control_profile),
            control_logcounts: has_control.then_some(control_counts),
            profile,
            logcounts: counts,
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
