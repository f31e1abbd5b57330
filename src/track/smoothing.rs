use serde::{Deserialize, Serialize};

use crate::{error::ConfigError, Result};

/// Parameters of a Gaussian smoothing pass over a control track
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SmoothingParams {
    /// Standard deviation of the kernel (in bases)
    pub sigma: f64,
    /// Width of the kernel (in bases), rounded up to the next odd number
    pub window: usize,
}
impl SmoothingParams {
    pub fn validate(&self) -> Result<()> {
        if !self.sigma.is_finite() || self.sigma <= 0.0 {
            return Err(ConfigError::InvalidSigma(self.sigma).into());
        }
        if self.window == 0 {
            return Err(ConfigError::ZeroSmoothingWindow.into());
        }
        Ok(())
    }
}

/// A normalized, truncated Gaussian kernel
///
/// Edges are handled by reflection (`d c b a | a b c d | d c b a`), so the
/// total mass of the signal is approximately preserved.
#[derive(Debug, Clone)]
pub struct GaussianSmoother {
    params: SmoothingParams,
    kernel: Vec<f32>,
}
impl GaussianSmoother {
    pub fn new(params: SmoothingParams) -> Result<Self> {
        params.validate()?;
        let radius = params.window / 2;
        let denom = 2.0 * params.sigma * params.sigma;
        let weights: Vec<f64> = (0..=2 * radius)
            .map(|i| {
                let x = i as f64 - radius as f64;
                (-x * x / denom).exp()
            })
            .collect();
        let total: f64 = weights.iter().sum();
        let kernel = weights.iter().map(|w| (w / total) as f32).collect();
        Ok(Self { params, kernel })
    }

    #[must_use]
    pub fn params(&self) -> SmoothingParams {
        self.params
    }

    #[must_use]
    pub fn kernel(&self) -> &[f32] {
        &self.kernel
    }

    /// Convolves `input` with the kernel into `out` (same length)
    pub fn smooth(&self, input: &[f32], out: &mut [f32]) {
        debug_assert_eq!(input.len(), out.len());
        let n = input.len();
        if n == 0 {
            return;
        }
        let radius = (self.kernel.len() / 2) as i64;
        for (i, o) in out.iter_mut().enumerate() {
            *o = self
                .kernel
                .iter()
                .enumerate()
                .map(|(k, &w)| w * input[reflect(i as i64 + k as i64 - radius, n)])
                .sum();
        }
    }
}

/// Maps an out-of-range index back into `0..n` by mirroring at the edges
fn reflect(mut idx: i64, n: usize) -> usize {
    let n = n as i64;
    loop {
        if idx < 0 {
            idx = -idx - 1;
        } else if idx >= n {
            idx = 2 * n - idx - 1;
        } else {
            return idx as usize;
        }
    }
}
