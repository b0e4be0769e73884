//! Per-cell response generation: convolution of stimulus frames against a
//! shared receptive-field kernel, producing an input-current trace.

use std::sync::Arc;

use ndarray::Array1;
use serde::{Deserialize, Serialize};

use super::kernel::SpatioTemporalKernel;
use crate::error::LgnError;
use crate::space::{VisualRegion, VisualSpace};
use crate::utils::convolve_same;

/// Gain configuration turning a raw kernel response into a current (nA).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GainControl {
    /// Linear gain (nA.m²/cd).
    pub gain: f64,
    /// Optional nonlinear luminance/contrast gain control.
    pub non_linear_gain: Option<NonLinearGain>,
}

/// Parameters of the nonlinear gain-control path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NonLinearGain {
    pub luminance_gain: f64,
    pub luminance_scaler: f64,
    pub contrast_scaler: f64,
}

/// A per-neuron input-current trace: `times[i] = i * dt` against amplitudes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentTrace {
    pub times: Vec<f64>,
    pub amplitudes: Vec<f64>,
}

/// A model of the input current to an LGN relay cell: the luminance values
/// impinging on its receptive field are multiplied, in space and time, by a
/// spatio-temporal kernel; spatial summation at each time point gives a
/// current that may be injected into the relay cell.
///
/// `initialize` is called once before stimulus presentation, `view` once per
/// stimulus frame, and `response_current` once at the end of the
/// presentation.
#[derive(Debug, Clone)]
pub struct CellWithReceptiveField {
    /// Centre of the receptive field in visual space (degrees).
    x: f64,
    y: f64,
    kernel: Arc<SpatioTemporalKernel>,
    gain: GainControl,
    region: VisualRegion,
    /// Number of kernel time bins per stimulus frame.
    update_factor: usize,
    background_luminance: f64,
    // Response and per-frame statistics buffers, padded at the tail by the
    // kernel duration so view() never has to bounds-check.
    response: Vec<f64>,
    std: Vec<f64>,
    mean: Vec<f64>,
    i: usize,
}

impl CellWithReceptiveField {
    /// Create a cell centred at (`x`, `y`). `update_interval` is the frame
    /// duration of the visual space; the kernel temporal resolution must
    /// divide it exactly, otherwise the configuration is rejected.
    pub fn new(
        x: f64,
        y: f64,
        kernel: Arc<SpatioTemporalKernel>,
        gain: GainControl,
        update_interval: f64,
    ) -> Result<Self, LgnError> {
        let ratio = update_interval / kernel.temporal_resolution();
        if (ratio - ratio.round()).abs() > 1e-9 || ratio < 1.0 {
            return Err(LgnError::InvalidParameters(format!(
                "The receptive field temporal resolution ({} ms) must be an integer divisor \
                 of the visual space update interval ({} ms)",
                kernel.temporal_resolution(),
                update_interval
            )));
        }

        let region = VisualRegion {
            location_x: x,
            location_y: y,
            size_x: kernel.width(),
            size_y: kernel.height(),
        };

        Ok(CellWithReceptiveField {
            x,
            y,
            kernel,
            gain,
            region,
            update_factor: ratio.round() as usize,
            background_luminance: 0.0,
            response: vec![],
            std: vec![],
            mean: vec![],
            i: 0,
        })
    }

    pub fn position(&self) -> (f64, f64) {
        (self.x, self.y)
    }

    pub fn kernel(&self) -> &SpatioTemporalKernel {
        &self.kernel
    }

    /// Allocate the response buffers and set the initial values on the
    /// assumption that the cell was looking at a blank screen of constant
    /// luminance prior to stimulus onset (and returns to one after offset).
    pub fn initialize(&mut self, background_luminance: f64, stimulus_duration: f64) {
        let l = self.kernel.duration_steps();
        let response_length =
            (stimulus_duration / self.kernel.temporal_resolution()).ceil() as usize + l;

        self.background_luminance = background_luminance;
        self.response = vec![0.0; response_length];
        self.std = vec![0.0; response_length];
        self.mean = vec![0.0; response_length];

        // The image-dependent components are added in view(); here we add the
        // steady-state contributions of the background:
        //   R_0 = K_0.I_0 + Sum[j=1,L-1] K_j.B
        //   R_1 = K_0.I_1 + K_1.I_0 + Sum[j=2,L-1] K_j.B
        for i in 0..l.min(response_length) {
            self.response[i] += background_luminance * self.kernel.future_sum(i);
            self.response[response_length - 1 - i] +=
                background_luminance * self.kernel.past_sum(i);
        }
        self.i = 0;
    }

    /// Look at the visual space and accumulate the current frame into the
    /// response:
    ///   R_k = Sum[j=0,L-1] K_j.I_i'   with i' = (k-j) div update_factor
    ///
    /// The response array is built up one frame at a time so the full image
    /// sequence never has to be held in memory.
    pub fn view<V: VisualSpace + ?Sized>(&mut self, space: &V) -> Result<(), LgnError> {
        if self.response.is_empty() {
            return Err(LgnError::InvalidOperation(
                "view() called before initialize()".to_string(),
            ));
        }

        let patch = space.view(&self.region, self.kernel.spatial_resolution());
        let (nx, ny, _) = self.kernel.shape();
        if patch.dim() != (nx, ny) {
            return Err(LgnError::InvalidParameters(format!(
                "Frame patch shape {:?} does not match the kernel footprint ({}, {})",
                patch.dim(),
                nx,
                ny
            )));
        }

        let n = (nx * ny) as f64;
        let mean = patch.sum() / n;
        let std = (patch.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n).sqrt();
        let end = (self.i + self.update_factor).min(self.response.len());
        self.std[self.i..end].fill(std);
        self.mean[self.i..end].fill(mean);

        let flat = Array1::from_iter(patch.iter().cloned());
        let time_course = self.kernel.reshaped().dot(&flat);

        for j in self.i..self.i + self.update_factor {
            for (t, &v) in time_course.iter().enumerate() {
                if j + t < self.response.len() {
                    self.response[j + t] += v;
                }
            }
        }
        self.i += self.update_factor;
        Ok(())
    }

    /// Multiply the accumulated response by the gain to produce the current
    /// trace, stripping the trailing padding.
    pub fn response_current(&self) -> Result<CurrentTrace, LgnError> {
        let l = self.kernel.duration_steps();
        if self.response.len() < l {
            return Err(LgnError::InvalidOperation(
                "response_current() called before initialize()".to_string(),
            ));
        }
        let len = self.response.len();
        let valid = len - l;
        let dt = self.kernel.temporal_resolution();

        let amplitudes = match &self.gain.non_linear_gain {
            None => self.response[..valid]
                .iter()
                .map(|r| self.gain.gain * r)
                .collect::<Vec<_>>(),
            Some(nl) => {
                // Smooth the per-frame contrast estimate with the kernel's
                // mean-absolute temporal profile.
                let mut profile = self.kernel.mean_abs_time_profile();
                profile.reverse();
                let std = convolve_same(&self.std, &profile);

                // Luminance-driven baseline with the same edge compensation
                // as initialize(), driven by the time-varying mean.
                let ksum = self.kernel.sum();
                let mut c: Vec<f64> = self.mean.iter().map(|m| ksum * m).collect();
                let head_mean = self.mean[..l].iter().sum::<f64>() / l as f64;
                let tail_mean = self.mean[len - l..].iter().sum::<f64>() / l as f64;
                for i in 0..l {
                    c[i] += (self.background_luminance - head_mean) * self.kernel.future_sum(i);
                    c[len - 1 - i] +=
                        (self.background_luminance - tail_mean) * self.kernel.past_sum(i);
                }

                (0..valid)
                    .map(|k| {
                        let contrast_term = self.gain.gain * (self.response[k] - c[k])
                            / (nl.contrast_scaler * std[k] + 1.0);
                        let luminance_term = nl.luminance_gain * c[k]
                            / (nl.luminance_scaler * self.mean[k] + 1.0);
                        contrast_term + luminance_term
                    })
                    .collect()
            }
        };

        let times = (0..amplitudes.len()).map(|k| k as f64 * dt).collect();
        Ok(CurrentTrace { times, amplitudes })
    }
}
