use std::sync::Arc;

use ndarray::{ArrayViewMut1, ArrayViewMut2, Axis};

use crate::{
    config::GeneratorConfig,
    error::ConfigError,
    fasta::ReferenceGenome,
    interval::{ChromSizes, SequenceWindow},
    track::{CoverageTrack, GaussianSmoother, SignalTrack, SmoothingParams},
    Result,
};

/// Fetches sequences and track values for resolved windows
///
/// The reference and the tracks are shared read-only, so one extractor is cloned
/// into every worker thread.
#[derive(Clone)]
pub struct Extractor {
    genome: Arc<ReferenceGenome>,
    signals: Vec<Arc<dyn SignalTrack>>,
    controls: Vec<Arc<dyn SignalTrack>>,
    smoothers: Vec<GaussianSmoother>,
}
impl Extractor {
    /// Creates a sequence-only extractor
    #[must_use]
    pub fn new(genome: Arc<ReferenceGenome>) -> Self {
        Self {
            genome,
            signals: Vec::new(),
            controls: Vec::new(),
            smoothers: Vec::new(),
        }
    }

    /// Loads the signal (and, with `has_control`, control) tracks of every task
    ///
    /// # Errors
    ///
    /// Fails with [`crate::error::TrackError::MissingTrack`] if a required track is
    /// not configured or does not exist.
    pub fn from_config(
        genome: Arc<ReferenceGenome>,
        config: &GeneratorConfig,
        sizes: &ChromSizes,
    ) -> Result<Self> {
        let mut signals: Vec<Arc<dyn SignalTrack>> = Vec::with_capacity(config.tasks.len());
        let mut controls: Vec<Arc<dyn SignalTrack>> = Vec::new();
        for task in &config.tasks {
            let path = task.require_signal()?;
            signals.push(Arc::new(CoverageTrack::from_bedgraph(path, sizes)?));
            if config.batch.has_control {
                let path = task.require_control()?;
                controls.push(Arc::new(CoverageTrack::from_bedgraph(path, sizes)?));
            }
        }
        log::info!(
            "Loaded {} signal and {} control tracks",
            signals.len(),
            controls.len()
        );
        Self::new(genome)
            .with_signals(signals)
            .with_controls(controls, &config.batch.control_smoothing)
    }

    #[must_use]
    pub fn with_signals(mut self, signals: Vec<Arc<dyn SignalTrack>>) -> Self {
        self.signals = signals;
        self
    }

    /// Sets the control tracks and the smoothing passes applied to them
    ///
    /// Controls are optional, but when present there must be one per signal track.
    pub fn with_controls(
        mut self,
        controls: Vec<Arc<dyn SignalTrack>>,
        smoothing: &[SmoothingParams],
    ) -> Result<Self> {
        if !controls.is_empty() && controls.len() != self.signals.len() {
            return Err(ConfigError::TrackCountMismatch {
                signals: self.signals.len(),
                controls: controls.len(),
            }
            .into());
        }
        self.smoothers = smoothing
            .iter()
            .map(|params| GaussianSmoother::new(*params))
            .collect::<Result<_>>()?;
        self.controls = controls;
        Ok(self)
    }

    #[must_use]
    pub fn genome(&self) -> &ReferenceGenome {
        &self.genome
    }

    #[must_use]
    pub fn n_tasks(&self) -> usize {
        self.signals.len()
    }

    #[must_use]
    pub fn has_control(&self) -> bool {
        !self.controls.is_empty()
    }

    /// Channels of the control profile: raw controls plus one block per smoothing pass
    #[must_use]
    pub fn control_channels(&self) -> usize {
        if self.has_control() {
            self.controls.len() * (1 + self.smoothers.len())
        } else {
            0
        }
    }

    /// Fetches the input sequence of a window into `buf`
    pub fn sequence_into(&self, window: &SequenceWindow, buf: &mut Vec<u8>) -> Result<()> {
        self.genome
            .fetch_into(&window.chrom, window.start, window.end, buf)
    }

    /// Fetches the input sequence of a window
    pub fn sequence(&self, window: &SequenceWindow) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(window.len() as usize);
        self.sequence_into(window, &mut buf)?;
        Ok(buf)
    }

    /// Fills a `(output_len, n_tasks)` view with the signal of every task
    ///
    /// `counts` receives the per-task sum over the output window.
    pub fn signal_into(
        &self,
        window: &SequenceWindow,
        out: ArrayViewMut2<f32>,
        counts: ArrayViewMut1<f32>,
        scratch: &mut Vec<f32>,
    ) -> Result<()> {
        fill_profiles(&self.signals, window, out, counts, scratch)
    }

    /// Fills a `(output_len, control_channels)` view with the control profiles
    ///
    /// The first `n_tasks` channels hold the raw controls, followed by one block of
    /// `n_tasks` smoothed channels per smoothing pass. `counts` receives the per-task
    /// sum of the raw controls.
    pub fn control_into(
        &self,
        window: &SequenceWindow,
        out: ArrayViewMut2<f32>,
        counts: ArrayViewMut1<f32>,
        scratch: &mut Vec<f32>,
    ) -> Result<()> {
        let n = self.controls.len();
        let (mut raw, mut smoothed) = out.split_at(Axis(1), n);
        fill_profiles(&self.controls, window, raw.view_mut(), counts, scratch)?;

        let mut smooth_buf = vec![0.0; raw.nrows()];
        for (s, smoother) in self.smoothers.iter().enumerate() {
            for task in 0..n {
                scratch.clear();
                scratch.extend(raw.column(task).iter());
                smoother.smooth(scratch, &mut smooth_buf);
                smoothed
                    .column_mut(s * n + task)
                    .iter_mut()
                    .zip(&smooth_buf)
                    .for_each(|(o, v)| *o = *v);
            }
        }
        Ok(())
    }
}

fn fill_profiles(
    tracks: &[Arc<dyn SignalTrack>],
    window: &SequenceWindow,
    mut out: ArrayViewMut2<f32>,
    mut counts: ArrayViewMut1<f32>,
    scratch: &mut Vec<f32>,
) -> Result<()> {
    let output_len = out.nrows() as u64;
    let (start, end) = window.output_range(output_len);
    scratch.resize(output_len as usize, 0.0);
    for (task, track) in tracks.iter().enumerate() {
        track.fill(&window.chrom, start, end, scratch)?;
        out.column_mut(task)
            .iter_mut()
            .zip(scratch.iter())
            .for_each(|(o, v)| *o = *v);
        counts[task] = scratch.iter().sum();
    }
    Ok(())
}
