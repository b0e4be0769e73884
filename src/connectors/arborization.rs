//! Direct-list connectors: the caller supplies explicit weight and delay
//! matrices instead of composed component functions. Used when connectivity
//! is precomputed elsewhere (e.g. measured or fitted arborizations).

use log::debug;
use ndarray::Array2;
use rand::Rng;

use super::modular::realize;
use crate::backend::{Backend, SynapseType};
use crate::connection::Connection;
use crate::error::LgnError;
use crate::sheet::Population;
use crate::utils::sample_from_bin_distribution;
use crate::WEAK_SYNAPSE_FRACTION;

fn check_shapes(
    name: &str,
    weights: &Array2<f64>,
    delays: &Array2<f64>,
    source: &dyn Population,
    target: &dyn Population,
) -> Result<(), LgnError> {
    let expected = (source.size(), target.size());
    if weights.dim() != expected || delays.dim() != expected {
        return Err(LgnError::InvalidParameters(format!(
            "{}: weight matrix {:?} and delay matrix {:?} must both be (source, target) \
             shaped {:?}",
            name,
            weights.dim(),
            delays.dim(),
            expected
        )));
    }
    Ok(())
}

/// Realizes a weight/delay matrix as-is, after renormalizing each target
/// neuron's afferent weights to sum to `weight_factor` and pruning synapses
/// weaker than a fraction of the strongest one.
pub struct SpecificArborization {
    name: String,
    weights: Array2<f64>,
    delays: Array2<f64>,
    /// Total afferent weight each target neuron receives.
    weight_factor: f64,
    synapse: SynapseType,
}

impl SpecificArborization {
    pub fn new(
        name: &str,
        weights: Array2<f64>,
        delays: Array2<f64>,
        weight_factor: f64,
        synapse: SynapseType,
    ) -> Self {
        SpecificArborization {
            name: name.to_string(),
            weights,
            delays,
            weight_factor,
            synapse,
        }
    }

    pub fn connect<B: Backend + ?Sized>(
        &self,
        source: &dyn Population,
        target: &dyn Population,
        backend: &mut B,
    ) -> Result<usize, LgnError> {
        check_shapes(&self.name, &self.weights, &self.delays, source, target)?;

        let scaler = self.synapse.weight_scaler();
        let mut weights = self.weights.clone();
        for i in 0..target.size() {
            let column_sum: f64 = weights.column(i).sum();
            if column_sum > 0.0 {
                let factor = self.weight_factor / column_sum * scaler;
                weights.column_mut(i).mapv_inplace(|w| w * factor);
            }
        }

        let strongest = weights.iter().cloned().fold(0.0, f64::max);
        let threshold = strongest * WEAK_SYNAPSE_FRACTION;

        let mut connections = Vec::new();
        let mut pruned = 0usize;
        for ((s, i), &w) in weights.indexed_iter() {
            if w > threshold {
                connections.push(Connection::build(s, i, w, self.delays[(s, i)])?);
            } else {
                pruned += 1;
            }
        }
        debug!("{}: {} weak synapses pruned", self.name, pruned);

        realize(&self.name, source, target, &connections, &self.synapse, backend)
    }
}

/// Interprets a weight matrix as per-target connection probabilities and
/// draws `num_samples` source neurons per target, with replacement. A source
/// drawn k times gets one connection of weight
/// `weight_factor * k / num_samples`, so the expected afferent weight per
/// target is `weight_factor`.
pub struct SpecificProbabilisticArborization {
    name: String,
    weights: Array2<f64>,
    delays: Array2<f64>,
    weight_factor: f64,
    num_samples: usize,
    synapse: SynapseType,
}

impl SpecificProbabilisticArborization {
    pub fn new(
        name: &str,
        weights: Array2<f64>,
        delays: Array2<f64>,
        weight_factor: f64,
        num_samples: usize,
        synapse: SynapseType,
    ) -> Result<Self, LgnError> {
        if num_samples == 0 {
            return Err(LgnError::InvalidParameters(format!(
                "{}: num_samples must be positive",
                name
            )));
        }
        Ok(SpecificProbabilisticArborization {
            name: name.to_string(),
            weights,
            delays,
            weight_factor,
            num_samples,
            synapse,
        })
    }

    pub fn connect<B: Backend + ?Sized, R: Rng>(
        &self,
        source: &dyn Population,
        target: &dyn Population,
        backend: &mut B,
        rng: &mut R,
    ) -> Result<usize, LgnError> {
        check_shapes(&self.name, &self.weights, &self.delays, source, target)?;

        let weight_factor = self.weight_factor * self.synapse.weight_scaler();
        let mut connections = Vec::new();
        for i in 0..target.size() {
            let bins: Vec<f64> = self.weights.column(i).iter().cloned().collect();
            let samples = sample_from_bin_distribution(&bins, self.num_samples, rng);
            let mut counts = std::collections::BTreeMap::new();
            for s in samples {
                *counts.entry(s).or_insert(0usize) += 1;
            }
            for (&s, &count) in &counts {
                let weight = weight_factor * count as f64 / self.num_samples as f64;
                connections.push(Connection::build(s, i, weight, self.delays[(s, i)])?);
            }
        }

        realize(&self.name, source, target, &connections, &self.synapse, backend)
    }
}

#[cfg(test)]
mod tests {
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;
    use crate::backend::RecordingBackend;

    const SEED: u64 = 42;

    struct TestPopulation {
        name: String,
        size: usize,
    }

    impl Population for TestPopulation {
        fn name(&self) -> &str {
            &self.name
        }

        fn size(&self) -> usize {
            self.size
        }

        fn position(&self, _i: usize) -> (f64, f64) {
            (0.0, 0.0)
        }
    }

    fn population(name: &str, size: usize) -> TestPopulation {
        TestPopulation {
            name: name.to_string(),
            size,
        }
    }

    #[test]
    fn test_specific_arborization_renormalizes_and_prunes() {
        let source = population("src", 3);
        let target = population("tgt", 2);
        let mut backend = RecordingBackend::new(0.1);

        // Second column contains a synapse below 1% of the maximum after
        // renormalization.
        let weights =
            Array2::from_shape_vec((3, 2), vec![2.0, 1.0, 1.0, 0.004, 1.0, 1.0]).unwrap();
        let delays = Array2::from_elem((3, 2), 1.0);
        let connector =
            SpecificArborization::new("arbor", weights, delays, 0.1, SynapseType::Static);

        let created = connector.connect(&source, &target, &mut backend).unwrap();
        assert_eq!(created, 5);

        let connections = &backend.projections()[0].connections;
        // Surviving columns sum to weight_factor up to the pruned residue.
        let per_target: Vec<f64> = (0..2)
            .map(|i| {
                connections
                    .iter()
                    .filter(|c| c.target_id() == i)
                    .map(|c| c.weight())
                    .sum()
            })
            .collect();
        assert_relative_eq!(per_target[0], 0.1, epsilon = 1e-12);
        assert_relative_eq!(per_target[1], 0.1, epsilon = 1e-3);
        assert!(per_target[1] < 0.1);
    }

    #[test]
    fn test_specific_arborization_shape_mismatch() {
        let source = population("src", 3);
        let target = population("tgt", 2);
        let mut backend = RecordingBackend::new(0.1);

        let weights = Array2::from_elem((2, 2), 1.0);
        let delays = Array2::from_elem((2, 2), 1.0);
        let connector =
            SpecificArborization::new("arbor", weights, delays, 0.1, SynapseType::Static);
        assert!(matches!(
            connector.connect(&source, &target, &mut backend),
            Err(LgnError::InvalidParameters(_))
        ));
    }

    #[test]
    fn test_probabilistic_arborization_expected_weight() {
        let source = population("src", 4);
        let target = population("tgt", 2);
        let mut backend = RecordingBackend::new(0.1);
        let mut rng = StdRng::seed_from_u64(SEED);

        let weights = Array2::from_elem((4, 2), 1.0);
        let delays = Array2::from_elem((4, 2), 2.0);
        let connector = SpecificProbabilisticArborization::new(
            "prob_arbor",
            weights,
            delays,
            0.2,
            10_000,
            SynapseType::Static,
        )
        .unwrap();

        connector.connect(&source, &target, &mut backend, &mut rng).unwrap();
        let connections = &backend.projections()[0].connections;

        // All multiplicities together make up num_samples, so each target's
        // afferent weight is exactly weight_factor.
        for i in 0..2 {
            let total: f64 = connections
                .iter()
                .filter(|c| c.target_id() == i)
                .map(|c| c.weight())
                .sum();
            assert_abs_diff_eq!(total, 0.2, epsilon = 1e-12);
        }
        assert!(connections.iter().all(|c| c.delay() == 2.0));
    }

    #[test]
    fn test_probabilistic_arborization_requires_samples() {
        let weights = Array2::from_elem((2, 2), 1.0);
        let delays = Array2::from_elem((2, 2), 1.0);
        assert!(SpecificProbabilisticArborization::new(
            "prob_arbor",
            weights,
            delays,
            0.2,
            0,
            SynapseType::Static,
        )
        .is_err());
    }
}
