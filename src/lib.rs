//! This crate provides the input side of large-scale spiking neural-network
//! simulations of the early visual system: a retina/LGN model that filters
//! visual stimuli through spatio-temporal receptive fields to produce
//! per-neuron injected currents, and a modular connectivity engine that
//! realizes probabilistic synaptic connection lists for an external
//! simulator backend.
//!
//! # Building a receptive-field kernel
//!
//! ```rust
//! use rusty_lgn::retina::kernel::SpatioTemporalKernel;
//!
//! // A centre-surround kernel with a biphasic time course.
//! let kernel = SpatioTemporalKernel::quantize(
//!     |x, y, t| {
//!         let r2 = x * x + y * y;
//!         ((-r2).exp() - 0.5 * (-r2 / 4.0).exp()) * (t / 20.0) * (-t / 20.0).exp()
//!     },
//!     2.0, 2.0, 100.0, 0.5, 0.5, 10.0,
//! ).unwrap();
//!
//! assert_eq!(kernel.shape(), (4, 4, 10));
//! ```
//!
//! # Combining connectivity functions
//!
//! ```rust
//! use rusty_lgn::connectors::expression::Expr;
//!
//! let expr = Expr::parse("f1 * f2 + 0.5").unwrap();
//! assert_eq!(expr.free_variables(), vec!["f1".to_string(), "f2".to_string()]);
//! ```

pub mod backend;
pub mod connection;
pub mod connectors;
pub mod context;
pub mod error;
pub mod retina;
pub mod sheet;
pub mod space;
pub mod utils;

/// The maximum synaptic delay (ms) supported by the target backend. Longer
/// delays are clamped, not rejected.
pub const MAX_SYNAPTIC_DELAY: f64 = 14.4;
/// Scaler applied to all weights when short-term-plasticity synapses are
/// configured: the engine works in nano-siemens while the backend's
/// plasticity models expect micro-siemens.
pub const STP_WEIGHT_SCALER: f64 = 1000.0;
/// Synapses weaker than this fraction of the strongest synapse are pruned by
/// the direct-list connector.
pub const WEAK_SYNAPSE_FRACTION: f64 = 0.01;
