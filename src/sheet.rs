//! Neuron populations (sheets) as seen by the input pipeline and the
//! connectivity engine: a size, per-neuron positions in visual space, an
//! optional local-mask capability for sharded runs, and an optional
//! per-neuron annotation store.

use rand::distributions::{Distribution, Uniform};
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::error::LgnError;

/// A population of neurons positioned in (degrees of) visual space.
pub trait Population {
    /// Name the population is registered under in the backend.
    fn name(&self) -> &str;

    /// Number of neurons in the population.
    fn size(&self) -> usize;

    /// Position (x, y) of neuron `i` in degrees of visual space.
    fn position(&self, i: usize) -> (f64, f64);

    /// Which neurons are local to this shard, if the population supports
    /// subsetting at all. The default is that every neuron is local.
    fn local_mask(&self) -> Option<&[bool]> {
        None
    }

    /// A named per-neuron scalar annotation, if the population carries one.
    fn annotation(&self, _i: usize, _name: &str) -> Option<f64> {
        None
    }

    /// Indices of the neurons local to this shard.
    fn local_indices(&self) -> Vec<usize> {
        match self.local_mask() {
            Some(mask) => mask
                .iter()
                .enumerate()
                .filter_map(|(i, &local)| local.then_some(i))
                .collect(),
            None => (0..self.size()).collect(),
        }
    }
}

/// A sheet of neurons with uniformly random positions over a rectangle of
/// visual space, `density` neurons per square degree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UniformSheet {
    name: String,
    size_x: f64,
    size_y: f64,
    positions: Vec<(f64, f64)>,
    annotations: Vec<std::collections::HashMap<String, f64>>,
}

impl UniformSheet {
    pub fn new<R: Rng>(
        name: &str,
        size_x: f64,
        size_y: f64,
        density: f64,
        rng: &mut R,
    ) -> Result<Self, LgnError> {
        if size_x <= 0.0 || size_y <= 0.0 || density <= 0.0 {
            return Err(LgnError::InvalidParameters(
                "Sheet size and density must be positive".to_string(),
            ));
        }
        let num_neurons = (size_x * size_y * density).round() as usize;
        let dist_x = Uniform::new_inclusive(-size_x / 2.0, size_x / 2.0);
        let dist_y = Uniform::new_inclusive(-size_y / 2.0, size_y / 2.0);
        let positions = (0..num_neurons)
            .map(|_| (dist_x.sample(rng), dist_y.sample(rng)))
            .collect::<Vec<_>>();
        let annotations = vec![std::collections::HashMap::new(); num_neurons];

        Ok(UniformSheet {
            name: name.to_string(),
            size_x,
            size_y,
            positions,
            annotations,
        })
    }

    pub fn size_x(&self) -> f64 {
        self.size_x
    }

    pub fn size_y(&self) -> f64 {
        self.size_y
    }

    /// Attach a named scalar annotation to neuron `i`.
    pub fn annotate(&mut self, i: usize, name: &str, value: f64) -> Result<(), LgnError> {
        let num_neurons = self.positions.len();
        let slot = self.annotations.get_mut(i).ok_or_else(|| {
            LgnError::OutOfBounds(format!("Neuron {} not in sheet of size {}", i, num_neurons))
        })?;
        slot.insert(name.to_string(), value);
        Ok(())
    }
}

impl Population for UniformSheet {
    fn name(&self) -> &str {
        &self.name
    }

    fn size(&self) -> usize {
        self.positions.len()
    }

    fn position(&self, i: usize) -> (f64, f64) {
        self.positions[i]
    }

    fn annotation(&self, i: usize, name: &str) -> Option<f64> {
        self.annotations.get(i)?.get(name).copied()
    }
}
