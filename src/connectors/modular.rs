//! The modular connector family: weights and delays are each computed by
//! combining named [`ConnectorFunction`] components through an arithmetic
//! expression, then realized into a discrete connection list by one of
//! several strategies (all pairs, weighted sampling, per-pair Bernoulli).

use std::collections::{BTreeMap, HashMap};

use log::{debug, info, warn};
use rand::distributions::{Distribution, Uniform};
use rand::Rng;
use rand_distr::Normal;

use super::expression::Expr;
use super::functions::ConnectorFunction;
use crate::backend::{Backend, SynapseType};
use crate::connection::Connection;
use crate::error::LgnError;
use crate::sheet::Population;
use crate::utils::sample_from_bin_distribution;

/// A scalar random variable used for per-connection base weights and
/// per-target sample counts.
#[derive(Debug, Clone)]
pub enum ValueDistribution {
    Constant(f64),
    Uniform(Uniform<f64>),
    Normal(Normal<f64>),
}

impl ValueDistribution {
    pub fn constant(value: f64) -> Self {
        ValueDistribution::Constant(value)
    }

    pub fn uniform(low: f64, high: f64) -> Result<Self, LgnError> {
        if !(low < high) {
            return Err(LgnError::InvalidParameters(format!(
                "Uniform distribution requires low < high ({} >= {})",
                low, high
            )));
        }
        Ok(ValueDistribution::Uniform(Uniform::new(low, high)))
    }

    pub fn normal(mean: f64, stdev: f64) -> Result<Self, LgnError> {
        // Normal::new only rejects non-finite values, so the sign of the
        // standard deviation has to be checked here.
        if !mean.is_finite() || !stdev.is_finite() || stdev < 0.0 {
            return Err(LgnError::InvalidParameters(format!(
                "Normal distribution requires a finite mean and a non-negative \
                 standard deviation (mean {}, stdev {})",
                mean, stdev
            )));
        }
        let dist = Normal::new(mean, stdev).map_err(|e| {
            LgnError::InvalidParameters(format!("Invalid normal distribution: {}", e))
        })?;
        Ok(ValueDistribution::Normal(dist))
    }

    pub fn sample<R: Rng>(&self, rng: &mut R) -> f64 {
        match self {
            ValueDistribution::Constant(value) => *value,
            ValueDistribution::Uniform(dist) => dist.sample(rng),
            ValueDistribution::Normal(dist) => dist.sample(rng),
        }
    }
}

/// The shared core of the modular connectors: parsed weight/delay
/// expressions over named component functions, plus the backend constraints
/// (time step, maximum delay) and the synapse model of the projection.
///
/// Weights are computed in nano-siemens; the synapse model's weight scaler
/// corrects them to the unit the backend expects. Delays are rounded to the
/// simulation time step and clamped to the backend's delay ceiling.
pub struct ModularConnector {
    name: String,
    weight_functions: BTreeMap<String, Box<dyn ConnectorFunction>>,
    delay_functions: BTreeMap<String, Box<dyn ConnectorFunction>>,
    weight_expression: Expr,
    delay_expression: Expr,
    weight_variables: Vec<String>,
    delay_variables: Vec<String>,
    time_step: f64,
    max_delay: f64,
    synapse: SynapseType,
}

impl ModularConnector {
    pub fn new<B: Backend + ?Sized>(
        name: &str,
        weight_functions: BTreeMap<String, Box<dyn ConnectorFunction>>,
        weight_expression: &str,
        delay_functions: BTreeMap<String, Box<dyn ConnectorFunction>>,
        delay_expression: &str,
        synapse: SynapseType,
        backend: &B,
    ) -> Result<Self, LgnError> {
        let weight_expression = Expr::parse(weight_expression)?;
        let delay_expression = Expr::parse(delay_expression)?;
        let weight_variables = weight_expression.free_variables();
        let delay_variables = delay_expression.free_variables();

        for variable in &weight_variables {
            if !weight_functions.contains_key(variable) {
                return Err(LgnError::UnresolvedVariable(format!(
                    "{}: weight expression variable '{}' has no configured function",
                    name, variable
                )));
            }
        }
        for variable in &delay_variables {
            if !delay_functions.contains_key(variable) {
                return Err(LgnError::UnresolvedVariable(format!(
                    "{}: delay expression variable '{}' has no configured function",
                    name, variable
                )));
            }
        }

        Ok(ModularConnector {
            name: name.to_string(),
            weight_functions,
            delay_functions,
            weight_expression,
            delay_expression,
            weight_variables,
            delay_variables,
            time_step: backend.time_step(),
            max_delay: backend.max_delay(),
            synapse,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn synapse(&self) -> &SynapseType {
        &self.synapse
    }

    /// Combined weights over the source population for target neuron `i`.
    pub fn obtain_weights(&self, i: usize, source_size: usize) -> Result<Vec<f64>, LgnError> {
        let components =
            evaluate_components(&self.weight_functions, &self.weight_variables, i);
        self.weight_expression.evaluate(&components, source_size)
    }

    /// Combined delays for target neuron `i`, rounded to the simulation time
    /// step and clamped to the backend's delay ceiling.
    pub fn obtain_delays(&self, i: usize, source_size: usize) -> Result<Vec<f64>, LgnError> {
        let raw = {
            let components =
                evaluate_components(&self.delay_functions, &self.delay_variables, i);
            self.delay_expression.evaluate(&components, source_size)?
        };
        Ok(raw
            .into_iter()
            .map(|d| {
                let rounded = (d / self.time_step).round() * self.time_step;
                if rounded > self.max_delay {
                    self.max_delay
                } else {
                    rounded
                }
            })
            .collect())
    }

    /// Realize the projection with one connection per (source, target) pair,
    /// weighted directly by the combined weight vectors.
    pub fn connect<B: Backend + ?Sized>(
        &self,
        source: &dyn Population,
        target: &dyn Population,
        backend: &mut B,
    ) -> Result<usize, LgnError> {
        let scaler = self.synapse.weight_scaler();
        let mut connections = Vec::new();
        for i in target.local_indices() {
            let weights = self.obtain_weights(i, source.size())?;
            let delays = self.obtain_delays(i, source.size())?;
            for (s, (&w, &d)) in weights.iter().zip(&delays).enumerate() {
                connections.push(Connection::build(s, i, scaler * w, d)?);
            }
        }
        realize(&self.name, source, target, &connections, &self.synapse, backend)
    }
}

fn evaluate_components(
    functions: &BTreeMap<String, Box<dyn ConnectorFunction>>,
    variables: &[String],
    target: usize,
) -> HashMap<String, Vec<f64>> {
    variables
        .iter()
        .map(|name| (name.clone(), functions[name].evaluate(target)))
        .collect()
}

/// Hand a connection list to the backend, skipping the projection entirely
/// when it is empty.
pub(crate) fn realize<B: Backend + ?Sized>(
    name: &str,
    source: &dyn Population,
    target: &dyn Population,
    connections: &[Connection],
    synapse: &SynapseType,
    backend: &mut B,
) -> Result<usize, LgnError> {
    if connections.is_empty() {
        warn!("{}: empty projection - backend projection not created", name);
        return Ok(0);
    }
    info!(
        "{}: {} connections were created, {:.2} per target neuron",
        name,
        connections.len(),
        connections.len() as f64 / target.size() as f64
    );
    backend.create_projection(source.name(), target.name(), connections, synapse, name)?;
    Ok(connections.len())
}

/// Interprets the combined weights as proportional connection probabilities
/// and draws `num_samples` source neurons per target, with replacement. A
/// source drawn k times contributes one connection of k times the base
/// weight.
pub struct SamplingProbabilisticConnector {
    base: ModularConnector,
    num_samples: ValueDistribution,
    base_weight: ValueDistribution,
}

impl SamplingProbabilisticConnector {
    pub fn new(
        base: ModularConnector,
        num_samples: ValueDistribution,
        base_weight: ValueDistribution,
    ) -> Self {
        SamplingProbabilisticConnector {
            base,
            num_samples,
            base_weight,
        }
    }

    pub fn connect<B: Backend + ?Sized, R: Rng>(
        &self,
        source: &dyn Population,
        target: &dyn Population,
        backend: &mut B,
        rng: &mut R,
    ) -> Result<usize, LgnError> {
        let scaler = self.base.synapse.weight_scaler();
        let mut connections = Vec::new();
        let mut total_samples = 0usize;

        for i in target.local_indices() {
            let weights = self.base.obtain_weights(i, source.size())?;
            let delays = self.base.obtain_delays(i, source.size())?;
            let n = self.num_samples.sample(rng).round().max(0.0) as usize;
            let counts = multiplicity(&sample_from_bin_distribution(&weights, n, rng));
            total_samples += counts.values().sum::<usize>();
            for (&s, &count) in &counts {
                let weight = scaler * self.base_weight.sample(rng) * count as f64;
                connections.push(Connection::build(s, i, weight, delays[s])?);
            }
        }

        debug!(
            "{}: {} samples drawn, {:.2} per target neuron",
            self.base.name,
            total_samples,
            total_samples as f64 / target.size() as f64
        );
        realize(
            &self.base.name,
            source,
            target,
            &connections,
            &self.base.synapse,
            backend,
        )
    }
}

/// Like [`SamplingProbabilisticConnector`], but the per-target sample count
/// is corrected by an annotation carried by the target neuron: with a fixed
/// `num_samples`, each target draws `num_samples - 2 * annotation` samples;
/// with `num_samples == 0`, the annotation alone sets the count.
pub struct AnnotationSamplingConnector {
    base: ModularConnector,
    annotation_name: String,
    num_samples: usize,
    base_weight: ValueDistribution,
}

impl AnnotationSamplingConnector {
    pub fn new(
        base: ModularConnector,
        annotation_name: &str,
        num_samples: usize,
        base_weight: ValueDistribution,
    ) -> Self {
        AnnotationSamplingConnector {
            base,
            annotation_name: annotation_name.to_string(),
            num_samples,
            base_weight,
        }
    }

    pub fn connect<B: Backend + ?Sized, R: Rng>(
        &self,
        source: &dyn Population,
        target: &dyn Population,
        backend: &mut B,
        rng: &mut R,
    ) -> Result<usize, LgnError> {
        let scaler = self.base.synapse.weight_scaler();
        let mut connections = Vec::new();

        for i in target.local_indices() {
            let annotated = target.annotation(i, &self.annotation_name).ok_or_else(|| {
                LgnError::MissingAnnotation(format!(
                    "{}: target neuron {} has no '{}' annotation",
                    self.base.name, i, self.annotation_name
                ))
            })? as usize;

            let n = if self.num_samples == 0 {
                annotated
            } else {
                if self.num_samples <= 2 * annotated {
                    return Err(LgnError::InvalidParameters(format!(
                        "{}: num_samples ({}) must exceed twice the annotated sample \
                         count ({})",
                        self.base.name,
                        self.num_samples,
                        2 * annotated
                    )));
                }
                self.num_samples - 2 * annotated
            };

            let weights = self.base.obtain_weights(i, source.size())?;
            let delays = self.base.obtain_delays(i, source.size())?;
            let counts = multiplicity(&sample_from_bin_distribution(&weights, n, rng));
            for (&s, &count) in &counts {
                let weight = scaler * self.base_weight.sample(rng) * count as f64;
                connections.push(Connection::build(s, i, weight, delays[s])?);
            }
        }

        realize(
            &self.base.name,
            source,
            target,
            &connections,
            &self.base.synapse,
            backend,
        )
    }
}

/// Interprets the combined weights as proportional connection probabilities
/// and runs one Bernoulli trial per (source, target) pair: the pair is
/// connected when its normalized probability, scaled so the mean equals
/// `connection_probability`, exceeds a uniform draw. Every realized
/// connection gets an independently sampled base weight.
pub struct SingleWeightProbabilisticConnector {
    base: ModularConnector,
    connection_probability: f64,
    base_weight: ValueDistribution,
}

impl SingleWeightProbabilisticConnector {
    pub fn new(
        base: ModularConnector,
        connection_probability: f64,
        base_weight: ValueDistribution,
    ) -> Self {
        SingleWeightProbabilisticConnector {
            base,
            connection_probability,
            base_weight,
        }
    }

    pub fn connect<B: Backend + ?Sized, R: Rng>(
        &self,
        source: &dyn Population,
        target: &dyn Population,
        backend: &mut B,
        rng: &mut R,
    ) -> Result<usize, LgnError> {
        let scaler = self.base.synapse.weight_scaler();
        let mut connections = Vec::new();

        for i in target.local_indices() {
            let weights = self.base.obtain_weights(i, source.size())?;
            let delays = self.base.obtain_delays(i, source.size())?;
            let mass: f64 = weights.iter().sum();
            if mass <= 0.0 {
                continue;
            }
            for (s, &w) in weights.iter().enumerate() {
                let probability =
                    w / mass * self.connection_probability * weights.len() as f64;
                if probability > rng.gen::<f64>() {
                    let weight = scaler * self.base_weight.sample(rng);
                    connections.push(Connection::build(s, i, weight, delays[s])?);
                }
            }
        }

        realize(
            &self.base.name,
            source,
            target,
            &connections,
            &self.base.synapse,
            backend,
        )
    }
}

// Source multiplicities of a sample drawn with replacement. The ordered map
// keeps the realized edge order deterministic.
fn multiplicity(samples: &[usize]) -> BTreeMap<usize, usize> {
    let mut counts = BTreeMap::new();
    for &s in samples {
        *counts.entry(s).or_insert(0) += 1;
    }
    counts
}
