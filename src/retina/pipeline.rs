//! The retina/LGN input pipeline: ON and OFF relay-cell sheets whose
//! receptive fields filter a visual stimulus into per-neuron step currents,
//! injected into an external simulator backend.

use std::collections::BTreeMap;
use std::sync::Arc;

use log::debug;
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use rayon::prelude::*;

use super::cache::{StimulusCache, StimulusCacheEntry, StimulusId};
use super::cell::{CellWithReceptiveField, GainControl};
use super::kernel::SpatioTemporalKernel;
use crate::backend::Backend;
use crate::context::RunContext;
use crate::error::LgnError;
use crate::sheet::{Population, UniformSheet};
use crate::space::{VisualRegion, VisualSpace};

pub const ON_SHEET: &str = "X_ON";
pub const OFF_SHEET: &str = "X_OFF";

/// Per-neuron Gaussian background noise, injected as a step current with
/// samples every `dt` milliseconds.
#[derive(Debug, Clone, PartialEq)]
pub struct NoiseParams {
    /// Mean noise current (nA).
    pub mean: f64,
    /// Standard deviation of the noise current (nA).
    pub stdev: f64,
    /// Sample interval (ms).
    pub dt: f64,
}

/// Configuration of the retina/LGN model.
#[derive(Debug, Clone, PartialEq)]
pub struct RetinaLgnParams {
    /// Relay-cell density per square degree of visual space, per sheet.
    pub density: f64,
    /// Extent (x, y) of the modelled visual field (degrees).
    pub size: (f64, f64),
    /// Scaler the response currents are multiplied with at injection.
    pub linear_scaler: f64,
    pub gain_control: GainControl,
    /// Keep every n-th sample of the current trace at injection; 1 keeps
    /// the trace at full temporal resolution.
    pub injection_stride: usize,
    /// Whether to capture the luminance frames shown to the retina.
    pub store_frames: bool,
    /// Optional background noise, regenerated at every injection. Cached
    /// responses never include it.
    pub noise: Option<NoiseParams>,
}

struct Channel {
    name: String,
    sheet: UniformSheet,
    kernel: Arc<SpatioTemporalKernel>,
}

/// The retina/LGN model: an ON sheet and an OFF sheet of relay cells, the
/// OFF receptive field being the negation of the ON one.
///
/// `process_input` presents a stimulus and injects the resulting currents;
/// `provide_null_input` covers the blank-screen case with a closed-form
/// steady state, skipping the convolution entirely.
pub struct RetinaLgn {
    params: RetinaLgnParams,
    context: RunContext,
    channels: Vec<Channel>,
    cache: StimulusCache,
}

impl RetinaLgn {
    pub fn new<R: Rng>(
        params: RetinaLgnParams,
        on_kernel: SpatioTemporalKernel,
        context: RunContext,
        rng: &mut R,
    ) -> Result<Self, LgnError> {
        if params.injection_stride == 0 {
            return Err(LgnError::InvalidParameters(
                "The injection stride must be at least 1".to_string(),
            ));
        }
        if let Some(noise) = &params.noise {
            // Normal::new would accept a negative standard deviation and
            // sample a mirrored distribution.
            if !noise.mean.is_finite() || !noise.stdev.is_finite() || noise.stdev < 0.0 {
                return Err(LgnError::InvalidParameters(format!(
                    "Noise requires a finite mean and a non-negative standard \
                     deviation (mean {}, stdev {})",
                    noise.mean, noise.stdev
                )));
            }
            if !(noise.dt > 0.0 && noise.dt.is_finite()) {
                return Err(LgnError::InvalidParameters(format!(
                    "The noise sample interval must be positive ({})",
                    noise.dt
                )));
            }
        }

        let (size_x, size_y) = params.size;
        let on_kernel = Arc::new(on_kernel);
        let off_kernel = Arc::new(on_kernel.negated());
        let channels = vec![
            Channel {
                name: ON_SHEET.to_string(),
                sheet: UniformSheet::new(ON_SHEET, size_x, size_y, params.density, rng)?,
                kernel: on_kernel,
            },
            Channel {
                name: OFF_SHEET.to_string(),
                sheet: UniformSheet::new(OFF_SHEET, size_x, size_y, params.density, rng)?,
                kernel: off_kernel,
            },
        ];
        let cache = StimulusCache::new(context.clone());

        Ok(RetinaLgn {
            params,
            context,
            channels,
            cache,
        })
    }

    pub fn on_sheet(&self) -> &UniformSheet {
        &self.channels[0].sheet
    }

    pub fn off_sheet(&self) -> &UniformSheet {
        &self.channels[1].sheet
    }

    /// Present a stimulus to the model and inject the resulting currents,
    /// shifted by `offset` milliseconds of absolute simulation time.
    ///
    /// Responses are looked up in the stimulus cache first, keyed on the
    /// stimulus identity with the trial number stripped, so repeated trials
    /// reuse the computed currents. `duration` is not part of the key; a
    /// stimulus presented with several durations must carry the duration as
    /// a [`StimulusId`] parameter. The returned entry holds the injected
    /// traces (without noise) and the captured retinal frames.
    pub fn process_input<V, B>(
        &mut self,
        space: &mut V,
        stimulus: &StimulusId,
        duration: f64,
        offset: f64,
        backend: &mut B,
    ) -> Result<Arc<StimulusCacheEntry>, LgnError>
    where
        V: VisualSpace + ?Sized,
        B: Backend,
    {
        debug!(
            "Presenting stimulus {} for {} ms",
            stimulus.cache_key(),
            duration
        );
        space.set_duration(duration);

        let key = stimulus.cache_key();
        let entry = match self.cache.get(&key)? {
            Some(entry) => {
                debug!("Retrieved input currents from the stimulus cache");
                entry
            }
            None => {
                debug!("Generating input currents");
                let entry = Arc::new(self.calculate_input_currents(space, duration)?);
                self.cache.insert(&key, entry.clone())?;
                entry
            }
        };

        for (c, channel) in self.channels.iter().enumerate() {
            let traces = entry.input_currents.get(&channel.name).ok_or_else(|| {
                LgnError::InvalidOperation(format!(
                    "Cached stimulus entry has no currents for sheet {}",
                    channel.name
                ))
            })?;
            let neurons = channel.sheet.local_indices();
            if traces.len() != neurons.len() {
                return Err(LgnError::InvalidOperation(format!(
                    "Cached stimulus entry has {} currents for sheet {} of local size {}",
                    traces.len(),
                    channel.name,
                    neurons.len()
                )));
            }

            let stride = self.params.injection_stride;
            for (&neuron, trace) in neurons.iter().zip(traces) {
                let times: Vec<f64> = trace
                    .times
                    .iter()
                    .step_by(stride)
                    .map(|t| t + offset)
                    .collect();
                let amplitudes: Vec<f64> = trace
                    .amplitudes
                    .iter()
                    .step_by(stride)
                    .map(|a| a * self.params.linear_scaler)
                    .collect();
                backend.inject_step_current(&channel.name, neuron, &times, &amplitudes)?;
            }
            self.inject_noise(c, &neurons, duration, offset, stimulus.trial(), backend)?;
        }

        Ok(entry)
    }

    /// Inject the steady-state response to a blank screen of the visual
    /// space's background luminance, without running the convolution. The
    /// steady state of every cell is its kernel sum times the background
    /// (passed through the luminance gain when the nonlinear path is on),
    /// constant in time, so a two-point step current suffices.
    pub fn provide_null_input<V, B>(
        &mut self,
        space: &V,
        duration: f64,
        offset: f64,
        backend: &mut B,
    ) -> Result<(), LgnError>
    where
        V: VisualSpace + ?Sized,
        B: Backend,
    {
        let background = space.background_luminance();
        let times = [offset, duration - space.update_interval() + offset];

        for (c, channel) in self.channels.iter().enumerate() {
            let ksum = channel.kernel.sum();
            let amplitude = match &self.params.gain_control.non_linear_gain {
                Some(nl) => {
                    self.params.linear_scaler * nl.luminance_gain * ksum * background
                        / (nl.luminance_scaler * background + 1.0)
                }
                None => self.params.linear_scaler * self.params.gain_control.gain * ksum * background,
            };
            debug!(
                "Injecting null input into {} with amplitude {} nA",
                channel.name, amplitude
            );

            let neurons = channel.sheet.local_indices();
            for &neuron in &neurons {
                backend.inject_step_current(
                    &channel.name,
                    neuron,
                    &times,
                    &[amplitude, amplitude],
                )?;
            }
            self.inject_noise(c, &neurons, duration, offset, None, backend)?;
        }
        Ok(())
    }

    /// Run the frame loop: one `CellWithReceptiveField` per local neuron of
    /// each sheet, viewing every frame of the presentation.
    fn calculate_input_currents<V>(
        &self,
        space: &mut V,
        duration: f64,
    ) -> Result<StimulusCacheEntry, LgnError>
    where
        V: VisualSpace + ?Sized,
    {
        let update_interval = space.update_interval();
        let background = space.background_luminance();

        debug!("Creating the receptive-field cells");
        let mut channel_cells: Vec<Vec<CellWithReceptiveField>> = Vec::new();
        for channel in &self.channels {
            let mut cells = Vec::new();
            for i in channel.sheet.local_indices() {
                let (x, y) = channel.sheet.position(i);
                let mut cell = CellWithReceptiveField::new(
                    x,
                    y,
                    channel.kernel.clone(),
                    self.params.gain_control.clone(),
                    update_interval,
                )?;
                cell.initialize(background, duration);
                cells.push(cell);
            }
            channel_cells.push(cells);
        }

        debug!("Processing frames");
        let mut retinal_input = Vec::new();
        let mut t = 0.0;
        while t < duration {
            t = space.update();
            let frame: &V = space;
            for cells in channel_cells.iter_mut() {
                cells
                    .par_iter_mut()
                    .try_for_each(|cell| cell.view(frame))?;
            }
            if self.params.store_frames {
                let field = VisualRegion {
                    location_x: 0.0,
                    location_y: 0.0,
                    size_x: self.params.size.0,
                    size_y: self.params.size.1,
                };
                retinal_input
                    .push(space.view(&field, self.channels[0].kernel.spatial_resolution()));
            }
        }

        let mut input_currents = BTreeMap::new();
        for (channel, cells) in self.channels.iter().zip(&channel_cells) {
            let traces = cells
                .iter()
                .map(|cell| cell.response_current())
                .collect::<Result<Vec<_>, _>>()?;
            input_currents.insert(channel.name.clone(), traces);
        }

        Ok(StimulusCacheEntry {
            input_currents,
            retinal_input,
        })
    }

    fn inject_noise<B: Backend>(
        &self,
        channel: usize,
        neurons: &[usize],
        duration: f64,
        offset: f64,
        trial: Option<u64>,
        backend: &mut B,
    ) -> Result<(), LgnError> {
        let noise = match &self.params.noise {
            Some(noise) => noise,
            None => return Ok(()),
        };
        let dist = Normal::new(noise.mean, noise.stdev).map_err(|e| {
            LgnError::InvalidParameters(format!("Invalid noise distribution: {}", e))
        })?;

        let num_samples = (duration / noise.dt).ceil() as usize;
        let times: Vec<f64> = (0..num_samples)
            .map(|j| j as f64 * noise.dt + offset)
            .collect();

        let name = &self.channels[channel].name;
        for &neuron in neurons {
            let mut rng = self.noise_rng(channel as u64, neuron, trial);
            let amplitudes: Vec<f64> = (0..num_samples).map(|_| dist.sample(&mut rng)).collect();
            backend.inject_step_current(name, neuron, &times, &amplitudes)?;
        }
        Ok(())
    }

    // One ChaCha stream per (sheet, neuron, trial), all derived from the run
    // seed. The noise a neuron receives does not depend on how neurons are
    // split across shards.
    fn noise_rng(&self, channel: u64, neuron: usize, trial: Option<u64>) -> ChaCha8Rng {
        let mut rng = ChaCha8Rng::seed_from_u64(self.context.base_seed());
        let stream = (trial.map_or(0, |t| t + 1) << 33) | ((neuron as u64) << 1) | channel;
        rng.set_stream(stream);
        rng
    }
}
