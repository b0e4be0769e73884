//! Retina/LGN input model: receptive-field kernels, per-cell response
//! generation, stimulus caching and current injection.
pub mod cache;
pub mod cell;
pub mod kernel;
pub mod pipeline;
