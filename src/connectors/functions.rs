//! Component functions the modular connectors combine: each one maps a
//! target-neuron index to a vector of values over the whole source
//! population (connection probabilities for weights, milliseconds for
//! delays).

use crate::sheet::Population;
use crate::utils::normal_function;

/// A named component of a weight or delay expression.
pub trait ConnectorFunction {
    /// Values over the source population for target neuron `target`.
    fn evaluate(&self, target: usize) -> Vec<f64>;
}

/// The same value for every (source, target) pair.
#[derive(Debug, Clone)]
pub struct ConstantFunction {
    value: f64,
    source_size: usize,
}

impl ConstantFunction {
    pub fn new(source: &dyn Population, value: f64) -> Self {
        ConstantFunction {
            value,
            source_size: source.size(),
        }
    }
}

impl ConnectorFunction for ConstantFunction {
    fn evaluate(&self, _target: usize) -> Vec<f64> {
        vec![self.value; self.source_size]
    }
}

/// Connection probability falling off as a Gaussian of the distance between
/// the source and target neuron positions in visual space.
#[derive(Debug, Clone)]
pub struct GaussianDecayFunction {
    source_positions: Vec<(f64, f64)>,
    target_positions: Vec<(f64, f64)>,
    /// Width of the Gaussian (degrees).
    arborization_constant: f64,
    arborization_scaler: f64,
}

impl GaussianDecayFunction {
    pub fn new(
        source: &dyn Population,
        target: &dyn Population,
        arborization_constant: f64,
        arborization_scaler: f64,
    ) -> Self {
        GaussianDecayFunction {
            source_positions: positions(source),
            target_positions: positions(target),
            arborization_constant,
            arborization_scaler,
        }
    }
}

impl ConnectorFunction for GaussianDecayFunction {
    fn evaluate(&self, target: usize) -> Vec<f64> {
        let (tx, ty) = self.target_positions[target];
        self.source_positions
            .iter()
            .map(|&(sx, sy)| {
                let distance = ((sx - tx).powi(2) + (sy - ty).powi(2)).sqrt();
                self.arborization_scaler
                    * normal_function(distance, 0.0, self.arborization_constant)
            })
            .collect()
    }
}

/// An affine function of the source-target distance; with a conduction
/// velocity for the slope this yields propagation delays.
#[derive(Debug, Clone)]
pub struct LinearDistanceFunction {
    source_positions: Vec<(f64, f64)>,
    target_positions: Vec<(f64, f64)>,
    /// Value at zero distance.
    offset: f64,
    /// Increase per degree of distance.
    slope: f64,
}

impl LinearDistanceFunction {
    pub fn new(
        source: &dyn Population,
        target: &dyn Population,
        offset: f64,
        slope: f64,
    ) -> Self {
        LinearDistanceFunction {
            source_positions: positions(source),
            target_positions: positions(target),
            offset,
            slope,
        }
    }
}

impl ConnectorFunction for LinearDistanceFunction {
    fn evaluate(&self, target: usize) -> Vec<f64> {
        let (tx, ty) = self.target_positions[target];
        self.source_positions
            .iter()
            .map(|&(sx, sy)| {
                let distance = ((sx - tx).powi(2) + (sy - ty).powi(2)).sqrt();
                self.offset + self.slope * distance
            })
            .collect()
    }
}

fn positions(population: &dyn Population) -> Vec<(f64, f64)> {
    (0..population.size()).map(|i| population.position(i)).collect()
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    struct GridPopulation {
        name: String,
        positions: Vec<(f64, f64)>,
    }

    impl Population for GridPopulation {
        fn name(&self) -> &str {
            &self.name
        }

        fn size(&self) -> usize {
            self.positions.len()
        }

        fn position(&self, i: usize) -> (f64, f64) {
            self.positions[i]
        }
    }

    fn line(name: &str, n: usize) -> GridPopulation {
        GridPopulation {
            name: name.to_string(),
            positions: (0..n).map(|i| (i as f64, 0.0)).collect(),
        }
    }

    #[test]
    fn test_constant_function() {
        let source = line("src", 3);
        let f = ConstantFunction::new(&source, 0.4);
        assert_eq!(f.evaluate(0), vec![0.4, 0.4, 0.4]);
    }

    #[test]
    fn test_gaussian_decay_function() {
        let source = line("src", 3);
        let target = line("tgt", 1);
        let f = GaussianDecayFunction::new(&source, &target, 1.0, 1.0);
        let values = f.evaluate(0);

        assert_relative_eq!(values[0], normal_function(0.0, 0.0, 1.0));
        assert_relative_eq!(values[1], normal_function(1.0, 0.0, 1.0));
        // Monotonically decreasing with distance.
        assert!(values[0] > values[1] && values[1] > values[2]);
    }

    #[test]
    fn test_linear_distance_function() {
        let source = line("src", 3);
        let target = line("tgt", 1);
        let f = LinearDistanceFunction::new(&source, &target, 0.5, 2.0);
        assert_eq!(f.evaluate(0), vec![0.5, 2.5, 4.5]);
    }
}
