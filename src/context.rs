//! Immutable per-run context, one instance per simulation process.
//!
//! Components receive the context at construction instead of consulting
//! process-wide mutable state. Multi-process parallelism is external to this
//! crate; `num_shards` reports how many simulation shards are active so the
//! single-writer on-disk stimulus cache can be disabled when there is more
//! than one.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Run-wide configuration shared by all components. One per process run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunContext {
    /// Directory holding the on-disk stimulus cache.
    cache_path: PathBuf,
    /// Whether the on-disk stimulus cache is enabled at all.
    cached: bool,
    /// Number of simulation shards running in parallel (external processes).
    num_shards: usize,
    /// Base seed from which per-neuron noise streams are derived.
    base_seed: u64,
}

impl RunContext {
    pub fn new<P: Into<PathBuf>>(
        cache_path: P,
        cached: bool,
        num_shards: usize,
        base_seed: u64,
    ) -> Self {
        RunContext {
            cache_path: cache_path.into(),
            cached,
            num_shards,
            base_seed,
        }
    }

    pub fn cache_path(&self) -> &std::path::Path {
        &self.cache_path
    }

    /// The on-disk cache is single-writer: it is used only when caching is
    /// enabled and exactly one shard is active.
    pub fn disk_cache_active(&self) -> bool {
        self.cached && self.num_shards <= 1
    }

    pub fn num_shards(&self) -> usize {
        self.num_shards
    }

    pub fn base_seed(&self) -> u64 {
        self.base_seed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disk_cache_active() {
        assert!(RunContext::new("/tmp/cache", true, 1, 0).disk_cache_active());
        assert!(!RunContext::new("/tmp/cache", false, 1, 0).disk_cache_active());
        assert!(!RunContext::new("/tmp/cache", true, 4, 0).disk_cache_active());
    }
}
