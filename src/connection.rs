//! Module implementing the concept of a realized connection, the discrete
//! edge format handed to the simulator backend.

use serde::{Deserialize, Serialize};

use super::error::LgnError;

/// Represents a realized connection between two neurons.
///
/// The same (source, target) pair may appear several times in a connection
/// list; multiplicity is a valid encoding of sampled connection strength.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Connection {
    source_id: usize,
    /// Target ID
    target_id: usize,
    /// Connection weight
    weight: f64,
    /// Connection delay (must be non-negative)
    delay: f64,
}

impl Connection {
    /// Create a new connection with the specified parameters.
    /// Returns an error if the delay is negative.
    pub fn build(
        source_id: usize,
        target_id: usize,
        weight: f64,
        delay: f64,
    ) -> Result<Self, LgnError> {
        if delay < 0.0 {
            return Err(LgnError::InvalidParameters(
                "Connection delay must be non-negative".to_string(),
            ));
        }

        Ok(Connection {
            source_id,
            target_id,
            weight,
            delay,
        })
    }

    /// Returns the ID of the source neuron.
    pub fn source_id(&self) -> usize {
        self.source_id
    }

    /// Returns the ID of the target neuron.
    pub fn target_id(&self) -> usize {
        self.target_id
    }

    /// Returns the weight of the connection.
    pub fn weight(&self) -> f64 {
        self.weight
    }

    /// Returns the delay of the connection.
    pub fn delay(&self) -> f64 {
        self.delay
    }

    /// Set the weight of the connection.
    pub fn set_weight(&mut self, weight: f64) {
        self.weight = weight;
    }
}
