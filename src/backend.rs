//! Capability interface of the external simulator backend.
//!
//! The crate never talks to a concrete simulator; it only needs the four
//! operations below: a fixed time-step query, a maximum supported synaptic
//! delay, a step-current injection primitive, and a projection constructor
//! accepting an explicit connection list. A [`RecordingBackend`] reference
//! implementation captures every call and is used throughout the tests.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::connection::Connection;
use super::error::LgnError;
use super::MAX_SYNAPTIC_DELAY;

/// Synapse-model descriptor passed to the backend along with a connection
/// list. Short-term plasticity parameters follow the Tsodyks-Markram model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SynapseType {
    /// Plain static synapse.
    Static,
    /// Short-term plasticity synapse (Tsodyks-Markram).
    ShortTermPlasticity {
        u: f64,
        tau_rec: f64,
        tau_fac: f64,
        tau_psc: f64,
    },
}

impl SynapseType {
    /// Weight unit correction for this synapse model: the engine computes
    /// weights in nano-siemens, the backend's plasticity models expect
    /// micro-siemens.
    pub fn weight_scaler(&self) -> f64 {
        match self {
            SynapseType::Static => 1.0,
            SynapseType::ShortTermPlasticity { .. } => crate::STP_WEIGHT_SCALER,
        }
    }
}

/// The operations the external simulator must provide.
pub trait Backend {
    /// The fixed simulation time step (ms).
    fn time_step(&self) -> f64;

    /// The maximum supported synaptic delay (ms).
    fn max_delay(&self) -> f64 {
        MAX_SYNAPTIC_DELAY
    }

    /// Attach a step-current waveform to one neuron of a population.
    fn inject_step_current(
        &mut self,
        population: &str,
        neuron: usize,
        times: &[f64],
        amplitudes: &[f64],
    ) -> Result<(), LgnError>;

    /// Create a projection between two populations from an explicit
    /// connection list.
    fn create_projection(
        &mut self,
        source: &str,
        target: &str,
        connections: &[Connection],
        synapse: &SynapseType,
        label: &str,
    ) -> Result<(), LgnError>;
}

/// A recorded step-current injection.
#[derive(Debug, Clone, PartialEq)]
pub struct InjectedCurrent {
    pub neuron: usize,
    pub times: Vec<f64>,
    pub amplitudes: Vec<f64>,
}

/// A recorded projection.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedProjection {
    pub source: String,
    pub target: String,
    pub connections: Vec<Connection>,
    pub synapse: SynapseType,
    pub label: String,
}

/// Backend implementation that records every call instead of simulating.
#[derive(Debug, Clone)]
pub struct RecordingBackend {
    time_step: f64,
    injections: HashMap<String, Vec<InjectedCurrent>>,
    projections: Vec<RecordedProjection>,
}

impl RecordingBackend {
    pub fn new(time_step: f64) -> Self {
        RecordingBackend {
            time_step,
            injections: HashMap::new(),
            projections: Vec::new(),
        }
    }

    /// All currents injected into the given population, in injection order.
    pub fn injections(&self, population: &str) -> &[InjectedCurrent] {
        self.injections
            .get(population)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn projections(&self) -> &[RecordedProjection] {
        &self.projections
    }
}

impl Backend for RecordingBackend {
    fn time_step(&self) -> f64 {
        self.time_step
    }

    fn inject_step_current(
        &mut self,
        population: &str,
        neuron: usize,
        times: &[f64],
        amplitudes: &[f64],
    ) -> Result<(), LgnError> {
        if times.len() != amplitudes.len() {
            return Err(LgnError::BackendError(format!(
                "Step current has {} times but {} amplitudes",
                times.len(),
                amplitudes.len()
            )));
        }
        self.injections
            .entry(population.to_string())
            .or_default()
            .push(InjectedCurrent {
                neuron,
                times: times.to_vec(),
                amplitudes: amplitudes.to_vec(),
            });
        Ok(())
    }

    fn create_projection(
        &mut self,
        source: &str,
        target: &str,
        connections: &[Connection],
        synapse: &SynapseType,
        label: &str,
    ) -> Result<(), LgnError> {
        self.projections.push(RecordedProjection {
            source: source.to_string(),
            target: target.to_string(),
            connections: connections.to_vec(),
            synapse: synapse.clone(),
            label: label.to_string(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weight_scaler() {
        assert_eq!(SynapseType::Static.weight_scaler(), 1.0);
        assert_eq!(
            SynapseType::ShortTermPlasticity {
                u: 0.75,
                tau_rec: 125.0,
                tau_fac: 0.0,
                tau_psc: 3.0
            }
            .weight_scaler(),
            1000.0
        );
    }

    #[test]
    fn test_recording_backend_injection() {
        let mut backend = RecordingBackend::new(0.1);
        backend
            .inject_step_current("X_ON", 3, &[0.0, 10.0], &[0.5, 0.0])
            .unwrap();

        assert_eq!(backend.injections("X_ON").len(), 1);
        assert_eq!(backend.injections("X_ON")[0].neuron, 3);
        assert!(backend.injections("X_OFF").is_empty());

        assert_eq!(
            backend.inject_step_current("X_ON", 0, &[0.0], &[]),
            Err(LgnError::BackendError(
                "Step current has 1 times but 0 amplitudes".to_string()
            ))
        );
    }
}
